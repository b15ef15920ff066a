//! Legacy 8259 PIC (Programmable Interrupt Controller) driver.
//!
//! IRQ 0-7 are hard-wired to vectors 0x08-0x0F by default, which overlaps
//! the CPU exception range. We remap both PICs so IRQ 0-15 land on vectors
//! 32-47, then mask every line except the two this kernel services: IRQ0
//! (timer) and IRQ1 (keyboard).

use crate::port::{inb, outb};

/// I/O port addresses for the master PIC.
const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;

/// I/O port addresses for the slave PIC.
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// ICW1: Initialization Command Word 1 - begin initialization sequence.
const ICW1_INIT: u8 = 0x10;
/// ICW1: ICW4 will be sent.
const ICW1_ICW4: u8 = 0x01;
/// ICW4: 8086/88 mode (as opposed to MCS-80/85 mode).
const ICW4_8086: u8 = 0x01;

/// Remap offset for PIC1 (IRQ 0-7 → vectors 32-39).
const PIC1_OFFSET: u8 = 32;
/// Remap offset for PIC2 (IRQ 8-15 → vectors 40-47).
const PIC2_OFFSET: u8 = 40;

/// Small I/O delay by writing to an unused port.
/// Some old hardware requires a delay between PIC commands.
#[inline]
fn io_wait() {
    unsafe {
        outb(0x80, 0);
    }
}

/// Vector assigned to IRQ0 (PIT timer) after remap.
pub const TIMER_VECTOR: u8 = PIC1_OFFSET;
/// Vector assigned to IRQ1 (PS/2 keyboard) after remap.
pub const KEYBOARD_VECTOR: u8 = PIC1_OFFSET + 1;

/// Remap the 8259 PIC interrupt vectors, then mask every IRQ except the
/// timer (IRQ0) and keyboard (IRQ1).
///
/// Leaving every other line masked avoids spurious vectors arriving at
/// an IDT slot with no handler installed.
pub fn init() {
    unsafe {
        // ICW1: Begin initialization (cascade mode, ICW4 needed)
        outb(PIC1_COMMAND, ICW1_INIT | ICW1_ICW4);
        io_wait();
        outb(PIC2_COMMAND, ICW1_INIT | ICW1_ICW4);
        io_wait();

        // ICW2: Set vector offsets
        outb(PIC1_DATA, PIC1_OFFSET);
        io_wait();
        outb(PIC2_DATA, PIC2_OFFSET);
        io_wait();

        // ICW3: Tell master PIC there is a slave PIC at IRQ2 (bit 2)
        outb(PIC1_DATA, 4);
        io_wait();
        // ICW3: Tell slave PIC its cascade identity (IRQ2 = 2)
        outb(PIC2_DATA, 2);
        io_wait();

        // ICW4: Set 8086 mode
        outb(PIC1_DATA, ICW4_8086);
        io_wait();
        outb(PIC2_DATA, ICW4_8086);
        io_wait();

        // Mask every line except IRQ0 (timer, bit 0) and IRQ1 (keyboard, bit 1).
        outb(PIC1_DATA, !0b0000_0011u8);
        outb(PIC2_DATA, 0xFF);
    }
}

/// Send End-Of-Interrupt. Vectors >= 40 (slave-owned) require an EOI to
/// the slave PIC first, then always to the master.
pub fn send_eoi(vector: u8) {
    const EOI: u8 = 0x20;
    unsafe {
        if vector >= PIC2_OFFSET {
            outb(PIC2_COMMAND, EOI);
        }
        outb(PIC1_COMMAND, EOI);
    }
}
