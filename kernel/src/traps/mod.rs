//! Interrupt and trap handling.
//!
//! CPU exceptions (vectors 0-18) and the two PIC IRQs this kernel
//! services (timer on vector 32, keyboard on vector 33) are dispatched
//! from [`handlers`]; [`idt`] builds the GDT/TSS/IDT that wires them up.

pub(crate) mod handlers;
mod idt;

pub use idt::init_idt;

/// Trigger a breakpoint exception for testing.
#[inline]
pub fn trigger_breakpoint() {
    unsafe {
        core::arch::asm!("int3");
    }
}
