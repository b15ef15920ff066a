// =============================================================================
// MinimalOS NextGen — Kernel Utilities
// =============================================================================
//
// Shared utilities used across the entire kernel.
// These are deliberately minimal — just the essentials.
//
//   logger.rs   — kprint!/kprintln! macros (serial + framebuffer output)
//   panic.rs    — panic handler (what happens when the kernel panics)
//   config.rs   — BootConfig, parsed from the kernel command line
//   debugger.rs — register/backtrace dump on panic and on int3
// =============================================================================

pub mod config;
pub mod debugger;
pub mod logger;
pub mod panic;
