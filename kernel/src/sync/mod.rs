// =============================================================================
// MinimalOS NextGen — Kernel Synchronization Primitives
// =============================================================================
//
// This module provides synchronization primitives for the kernel.
// In a kernel, we can't use std::sync (there is no std). We need our own
// primitives that work in a bare-metal, interrupt-driven environment.
//
// IMPORTANT: Lock ordering rules:
//   Level 1 (innermost): PMM bitmap lock
//   Level 2: Page table lock
//   Level 3: Kernel heap lock
//   Level 4 (outermost): Scheduler run queue lock
//
// NEVER acquire a lower-level lock while holding a higher-level lock.
// Violating this can deadlock a handler against the code it interrupted.
// =============================================================================

pub mod spinlock;

