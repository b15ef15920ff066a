//! Kernel logging subsystem.
//!
//! Always writes to the serial port, from the very first log call before
//! the heap or the framebuffer exist. Once the console device is ready,
//! the kernel registers a sink via [`set_console_sink`] and every record
//! is mirrored there too, so `kprintln!`/`klog::info!` output shows up
//! both over serial (for host/CI capture) and on-screen.
#![no_std]

use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicPtr, Ordering};

/// Log levels, lowest to highest severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => " INFO",
            Level::Warn => " WARN",
            Level::Error => "ERROR",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Level::Trace => "\x1b[90m", // Gray
            Level::Debug => "\x1b[36m", // Cyan
            Level::Info => "\x1b[32m",  // Green
            Level::Warn => "\x1b[33m",  // Yellow
            Level::Error => "\x1b[31m", // Red
        }
    }

    fn from_u8(v: u8) -> Level {
        match v {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            _ => Level::Error,
        }
    }
}

/// Minimum level that gets printed. Defaults to Trace (everything).
static MIN_LEVEL: AtomicU8 = AtomicU8::new(Level::Trace as u8);

/// Optional console mirror, set once the framebuffer console exists.
/// Stored as a raw fn pointer since statics can't hold `Option<fn(&str)>`
/// atomically pre-1.70 ergonomics; null means "no sink registered".
static CONSOLE_SINK: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Initialize the kernel logger (sets up the serial port).
pub fn init() {
    khal::serial::init();
}

/// Set the minimum level that will be logged. Anything below this is
/// silently dropped (used by `BootConfig`'s `log_level` boot argument).
pub fn set_min_level(level: Level) {
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Register a console sink. `f` is called with each fully rendered line
/// (including the level prefix), after the line has already gone to serial.
pub fn set_console_sink(f: fn(&str)) {
    CONSOLE_SINK.store(f as *mut (), Ordering::Relaxed);
}

/// A `core::fmt::Write` adapter that renders into a fixed-size stack buffer
/// so the console sink can receive a `&str` without heap allocation.
struct LineBuf {
    buf: [u8; 256],
    len: usize,
}

impl LineBuf {
    const fn new() -> Self {
        Self { buf: [0; 256], len: 0 }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = self.buf.len() - self.len;
        let take = s.len().min(remaining);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Log a message with a specific level.
pub fn log(level: Level, args: fmt::Arguments) {
    if level < Level::from_u8(MIN_LEVEL.load(Ordering::Relaxed)) {
        return;
    }

    khal::serial::write_str(level.color());
    khal::serial::write_str("[");
    khal::serial::write_str(level.as_str());
    khal::serial::write_str("]\x1b[0m ");
    khal::serial::write_fmt(args);
    khal::serial::write_str("\n");

    let sink = CONSOLE_SINK.load(Ordering::Relaxed);
    if !sink.is_null() {
        use fmt::Write;
        let mut line = LineBuf::new();
        let _ = write!(line, "[{}] ", level.as_str());
        let _ = line.write_fmt(args);
        let _ = line.write_str("\n");
        let f: fn(&str) = unsafe { core::mem::transmute(sink) };
        f(line.as_str());
    }
}

/// Print to serial without a level prefix or newline.
pub fn print(args: fmt::Arguments) {
    khal::serial::write_fmt(args);
}

/// Log at TRACE level
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Trace, format_args!($($arg)*))
    };
}

/// Log at DEBUG level
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Debug, format_args!($($arg)*))
    };
}

/// Log at INFO level
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Info, format_args!($($arg)*))
    };
}

/// Log at WARN level
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Warn, format_args!($($arg)*))
    };
}

/// Log at ERROR level
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log($crate::Level::Error, format_args!($($arg)*))
    };
}

/// Print without newline
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::print(format_args!($($arg)*))
    };
}

/// Print with newline
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => {{
        $crate::print(format_args!($($arg)*));
        $crate::print(format_args!("\n"));
    }};
}
