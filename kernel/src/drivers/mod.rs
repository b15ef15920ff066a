//! Kernel-space devices backing the canonical devfs nodes.
//!
//! There is no userspace in this kernel, so these aren't drivers in the
//! microkernel sense — they're ordinary kernel modules that each
//! implement [`crate::fs::devfs::Device`] and get registered with
//! [`crate::fs::devfs::DEVFS`] during bring-up.

pub mod framebuffer;
pub mod keyboard;
pub mod random;
