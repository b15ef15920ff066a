//! Boot-time kernel configuration.
//!
//! Parsed once from the boot protocol's kernel command line (a tiny
//! space-separated `key=value` grammar) with compiled-in defaults for
//! anything unspecified. Malformed or unknown keys are logged and
//! skipped — a bad command line must never keep the kernel from booting.

use klog::Level;

use crate::memory::address::PAGE_SIZE;

/// Default heap window size in pages, matching `heap::HEAP_WINDOW_PAGES`.
const DEFAULT_HEAP_PAGES: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct BootConfig {
    /// Override for the kernel heap window size, in 4 KiB pages.
    pub heap_pages: usize,
    /// Minimum log level passed to `klog::set_min_level`.
    pub log_level: Level,
    /// Whether `kprintln!`/`klog` output should also be mirrored to the
    /// framebuffer console once it exists.
    pub mirror_console: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            heap_pages: DEFAULT_HEAP_PAGES,
            log_level: Level::Trace,
            mirror_console: true,
        }
    }
}

impl BootConfig {
    /// Parses `cmdline` (the boot protocol's raw command-line string, if
    /// any) over the defaults. Recognized keys: `heap_pages`, `log_level`,
    /// `mirror_console`.
    pub fn from_cmdline(cmdline: Option<&str>) -> Self {
        let mut config = Self::default();
        let Some(cmdline) = cmdline else {
            return config;
        };

        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                klog::warn!("boot config: ignoring malformed token {:?}", token);
                continue;
            };
            match key {
                "heap_pages" => match value.parse::<usize>() {
                    Ok(pages) if pages > 0 => config.heap_pages = pages,
                    _ => klog::warn!("boot config: invalid heap_pages value {:?}", value),
                },
                "log_level" => match parse_level(value) {
                    Some(level) => config.log_level = level,
                    None => klog::warn!("boot config: unknown log_level {:?}", value),
                },
                "mirror_console" => match value {
                    "true" | "1" => config.mirror_console = true,
                    "false" | "0" => config.mirror_console = false,
                    _ => klog::warn!("boot config: invalid mirror_console value {:?}", value),
                },
                other => klog::warn!("boot config: unknown key {:?}", other),
            }
        }

        config
    }

    /// Heap window size in bytes, derived from `heap_pages`.
    pub fn heap_bytes(&self) -> usize {
        self.heap_pages * PAGE_SIZE as usize
    }
}

fn parse_level(value: &str) -> Option<Level> {
    match value {
        "trace" | "Trace" => Some(Level::Trace),
        "debug" | "Debug" => Some(Level::Debug),
        "info" | "Info" => Some(Level::Info),
        "warn" | "Warn" => Some(Level::Warn),
        "error" | "Error" => Some(Level::Error),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_no_cmdline() {
        let cfg = BootConfig::from_cmdline(None);
        assert_eq!(cfg.heap_pages, DEFAULT_HEAP_PAGES);
        assert_eq!(cfg.log_level, Level::Trace);
        assert!(cfg.mirror_console);
    }

    #[test]
    fn parses_recognized_keys() {
        let cfg = BootConfig::from_cmdline(Some("heap_pages=64 log_level=warn mirror_console=false"));
        assert_eq!(cfg.heap_pages, 64);
        assert_eq!(cfg.log_level, Level::Warn);
        assert!(!cfg.mirror_console);
    }

    #[test]
    fn unknown_keys_are_ignored_not_fatal() {
        let cfg = BootConfig::from_cmdline(Some("bogus=1 heap_pages=128"));
        assert_eq!(cfg.heap_pages, 128);
    }

    #[test]
    fn malformed_token_is_ignored() {
        let cfg = BootConfig::from_cmdline(Some("justaword heap_pages=99"));
        assert_eq!(cfg.heap_pages, 99);
    }
}
