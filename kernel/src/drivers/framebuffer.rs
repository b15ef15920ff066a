//! Framebuffer text console.
//!
//! Rasterizes characters from the embedded Noto Sans Mono bitmap font
//! directly onto the boot-time linear framebuffer. Write-only: there is
//! no way to read back what's on screen, so it implements `Device::write`
//! only and leaves `read` at the trait's `Unsupported` default.

use noto_sans_mono_bitmap::{get_raster, get_raster_width, FontWeight, RasterHeight};

use crate::arch::x86_64::boot::FramebufferInfo;
use crate::fs::devfs::Device;
use crate::fs::VfsError;
use crate::sync::spinlock::SpinLock;

const FONT_WEIGHT: FontWeight = FontWeight::Regular;
const RASTER_HEIGHT: RasterHeight = RasterHeight::Size16;
const GLYPH_HEIGHT: usize = 16;

/// White text on a black background, packed as 0x00RRGGBB (bpp=32 is the
/// only framebuffer format we support).
const FG: u32 = 0x00FF_FFFF;
const BG: u32 = 0x0000_0000;

struct Console {
    addr: *mut u8,
    pitch: usize,
    width_px: usize,
    height_px: usize,
    glyph_width: usize,
    cols: usize,
    rows: usize,
    col: usize,
    row: usize,
}

// The framebuffer pointer is a fixed boot-time mapping that outlives the
// kernel; only ever touched behind `CONSOLE`'s spinlock.
unsafe impl Send for Console {}

impl Console {
    fn new(info: FramebufferInfo) -> Self {
        let glyph_width = get_raster_width(FONT_WEIGHT, RASTER_HEIGHT);
        let width_px = info.width as usize;
        let height_px = info.height as usize;
        Self {
            addr: info.address,
            pitch: info.pitch as usize,
            width_px,
            height_px,
            glyph_width,
            cols: width_px / glyph_width,
            rows: height_px / GLYPH_HEIGHT,
            col: 0,
            row: 0,
        }
    }

    fn put_pixel(&mut self, x: usize, y: usize, color: u32) {
        if x >= self.width_px || y >= self.height_px {
            return;
        }
        let offset = y * self.pitch + x * 4;
        unsafe {
            (self.addr.add(offset) as *mut u32).write_volatile(color);
        }
    }

    fn draw_glyph(&mut self, c: char) {
        let raster = get_raster(c, FONT_WEIGHT, RASTER_HEIGHT)
            .unwrap_or_else(|| get_raster(' ', FONT_WEIGHT, RASTER_HEIGHT).unwrap());
        let base_x = self.col * self.glyph_width;
        let base_y = self.row * GLYPH_HEIGHT;
        for (dy, row) in raster.raster().iter().enumerate() {
            for (dx, intensity) in row.iter().enumerate() {
                let color = if *intensity > 40 { FG } else { BG };
                self.put_pixel(base_x + dx, base_y + dy, color);
            }
        }
    }

    fn clear_cell(&mut self, col: usize, row: usize) {
        let base_x = col * self.glyph_width;
        let base_y = row * GLYPH_HEIGHT;
        for dy in 0..GLYPH_HEIGHT {
            for dx in 0..self.glyph_width {
                self.put_pixel(base_x + dx, base_y + dy, BG);
            }
        }
    }

    fn scroll(&mut self) {
        let row_bytes = self.pitch * GLYPH_HEIGHT;
        let total_bytes = self.pitch * self.height_px;
        unsafe {
            core::ptr::copy(
                self.addr.add(row_bytes),
                self.addr,
                total_bytes - row_bytes,
            );
            core::ptr::write_bytes(self.addr.add(total_bytes - row_bytes), 0, row_bytes);
        }
    }

    fn newline(&mut self) {
        self.clear_cursor();
        self.col = 0;
        if self.row + 1 >= self.rows {
            self.scroll();
        } else {
            self.row += 1;
        }
    }

    fn backspace(&mut self) {
        self.clear_cursor();
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = self.cols - 1;
        }
        self.clear_cell(self.col, self.row);
    }

    /// Draws a 2-pixel underline at the current cursor cell.
    fn draw_cursor(&mut self) {
        let base_x = self.col * self.glyph_width;
        let base_y = self.row * GLYPH_HEIGHT + GLYPH_HEIGHT - 2;
        for dy in 0..2 {
            for dx in 0..self.glyph_width {
                self.put_pixel(base_x + dx, base_y + dy, FG);
            }
        }
    }

    fn clear_cursor(&mut self) {
        let base_x = self.col * self.glyph_width;
        let base_y = self.row * GLYPH_HEIGHT + GLYPH_HEIGHT - 2;
        for dy in 0..2 {
            for dx in 0..self.glyph_width {
                self.put_pixel(base_x + dx, base_y + dy, BG);
            }
        }
    }

    fn putchar(&mut self, c: char) {
        match c {
            '\n' => self.newline(),
            '\r' => self.col = 0,
            '\x08' => self.backspace(),
            _ => {
                self.clear_cursor();
                self.draw_glyph(c);
                self.col += 1;
                if self.col >= self.cols {
                    self.newline();
                }
            }
        }
        self.draw_cursor();
    }

    fn write_str(&mut self, s: &str) {
        for c in s.chars() {
            self.putchar(c);
        }
    }
}

static CONSOLE: SpinLock<Option<Console>> = SpinLock::new(None);

/// Initializes the framebuffer console. Must run after the framebuffer
/// response is available and before anything tries to mount `console`.
pub fn init(info: FramebufferInfo) {
    *CONSOLE.lock() = Some(Console::new(info));
}

/// Mirrors one already-formatted log line onto the framebuffer. Passed
/// to `klog::set_console_sink` once the console exists.
pub fn mirror_line(line: &str) {
    if let Some(console) = CONSOLE.lock().as_mut() {
        console.write_str(line);
    }
}

/// The `console` devfs node — write-only text output.
pub struct ConsoleDevice;

impl Device for ConsoleDevice {
    fn write(&self, buf: &[u8]) -> Result<usize, VfsError> {
        let mut guard = CONSOLE.lock();
        let console = guard.as_mut().ok_or(VfsError::Unsupported)?;
        for &byte in buf {
            console.putchar(byte as char);
        }
        Ok(buf.len())
    }
}

pub static CONSOLE_DEVICE: ConsoleDevice = ConsoleDevice;
