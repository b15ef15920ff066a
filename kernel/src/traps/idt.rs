//! IDT initialization and management.

use spin::Once;

use crate::arch::gdt::Gdt;
use crate::arch::idt::{EntryOptions, GateType, Idt};
use crate::arch::tss::Tss;

use super::handlers;

/// Global IDT instance.
static IDT: Once<Idt> = Once::new();

/// Global TSS instance.
static TSS: Once<Tss> = Once::new();

/// Global GDT instance.
static GDT: Once<Gdt> = Once::new();

/// A CPU exception handler with no hardware-pushed error code.
type ExceptionFn = extern "x86-interrupt" fn(x86_64::structures::idt::InterruptStackFrame);

/// A CPU exception handler with a hardware-pushed error code.
type ExceptionWithCodeFn =
    extern "x86-interrupt" fn(x86_64::structures::idt::InterruptStackFrame, u64);

/// Initialize the GDT, TSS, and IDT.
///
/// Order: TSS (so its address is stable before the GDT's TSS descriptor
/// is built) → GDT (loads segment registers and the task register) →
/// IDT (every entry references the GDT's kernel code selector, so it
/// must come last).
pub fn init_idt() {
    let tss_ref = TSS.call_once(|| {
        let mut tss = Tss::new();
        tss.init();
        tss
    });

    let (gdt, selectors) = Gdt::new(tss_ref);
    let gdt_ref = GDT.call_once(|| gdt);

    unsafe {
        gdt_ref.load(&selectors);
    }
    klog::debug!(
        "GDT loaded (CS={:#06x}, DS={:#06x}, TSS={:#06x})",
        selectors.kernel_code,
        selectors.kernel_data,
        selectors.tss
    );

    let mut idt = Idt::new();
    let cs = selectors.kernel_code;

    let present_interrupt = EntryOptions::new()
        .set_present(true)
        .set_gate_type(GateType::Interrupt);
    let present_trap = EntryOptions::new()
        .set_present(true)
        .set_gate_type(GateType::Trap);

    let set_noerr = |idt: &mut Idt, vector: u8, handler: ExceptionFn| {
        idt.set_handler(vector, handler as usize, cs, present_interrupt);
    };
    let set_err = |idt: &mut Idt, vector: u8, handler: ExceptionWithCodeFn| {
        idt.set_handler(vector, handler as usize, cs, present_interrupt);
    };

    set_noerr(&mut idt, 0, handlers::divide_error_handler);
    set_noerr(&mut idt, 1, handlers::debug_handler);
    set_noerr(&mut idt, 2, handlers::nmi_handler);
    idt.set_handler(3, handlers::breakpoint_handler as usize, cs, present_trap);
    set_noerr(&mut idt, 4, handlers::overflow_handler);
    set_noerr(&mut idt, 5, handlers::bound_range_handler);
    set_noerr(&mut idt, 6, handlers::invalid_opcode_handler);
    set_noerr(&mut idt, 7, handlers::device_not_available_handler);

    let double_fault_options = EntryOptions::new()
        .set_present(true)
        .set_gate_type(GateType::Interrupt)
        .set_stack_index(handlers::DOUBLE_FAULT_IST_INDEX);
    idt.set_handler(
        8,
        handlers::double_fault_handler as usize,
        cs,
        double_fault_options,
    );

    set_noerr(&mut idt, 9, handlers::coprocessor_segment_overrun_handler);
    set_err(&mut idt, 10, handlers::invalid_tss_handler);
    set_err(&mut idt, 11, handlers::segment_not_present_handler);
    set_err(&mut idt, 12, handlers::stack_segment_fault_handler);
    set_err(&mut idt, 13, handlers::general_protection_fault_handler);

    idt.set_handler(
        14,
        handlers::page_fault_handler as usize,
        cs,
        present_interrupt,
    );

    set_noerr(&mut idt, 16, handlers::x87_fp_handler);
    set_err(&mut idt, 17, handlers::alignment_check_handler);
    set_noerr(&mut idt, 18, handlers::machine_check_handler);

    idt.set_handler(
        khal::pic::TIMER_VECTOR,
        handlers::timer_handler as usize,
        cs,
        present_interrupt,
    );
    idt.set_handler(
        khal::pic::KEYBOARD_VECTOR,
        handlers::keyboard_handler as usize,
        cs,
        present_interrupt,
    );

    let idt_ref = IDT.call_once(|| idt);
    idt_ref.load();
    klog::debug!("IDT loaded");
}

/// Get a reference to the global IDT.
#[allow(dead_code)]
pub fn get_idt() -> Option<&'static Idt> {
    IDT.get()
}
