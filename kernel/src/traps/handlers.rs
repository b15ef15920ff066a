//! Interrupt and exception handlers.
//!
//! Every CPU exception funnels into [`isr_common`], which logs the
//! vector's name and any hardware error code, then panics — this kernel
//! has no way to resume from a faulted instruction. The two PIC-routed
//! IRQs we actually service (timer, keyboard) get their own handlers
//! that EOI the PIC and return normally.

use x86_64::structures::idt::{InterruptStackFrame, PageFaultErrorCode};

use crate::arch::cpu;
use crate::task::{clock, process};
use crate::util::debugger;

/// IST index (1-based) carrying the double fault handler's dedicated stack.
pub const DOUBLE_FAULT_IST_INDEX: u8 = 1;

/// Human-readable names for exception vectors 0-18, in order.
const EXCEPTION_NAMES: [&str; 19] = [
    "Divide Error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating-Point Exception",
    "Alignment Check",
    "Machine Check",
];

fn exception_name(vector: u8) -> &'static str {
    EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("Unknown Exception")
}

/// Shared body for every CPU exception that isn't handled specially:
/// log the vector's name and error code (if any), then panic. There is
/// no recovery path for a faulted instruction stream.
fn isr_common(vector: u8, frame: &InterruptStackFrame, error_code: Option<u64>) -> ! {
    match error_code {
        Some(code) => klog::error!(
            "exception {} ({}) at {:#018x}, error code {:#x}",
            vector,
            exception_name(vector),
            frame.instruction_pointer.as_u64(),
            code
        ),
        None => klog::error!(
            "exception {} ({}) at {:#018x}",
            vector,
            exception_name(vector),
            frame.instruction_pointer.as_u64()
        ),
    }
    panic!("unhandled CPU exception {} ({})", vector, exception_name(vector));
}

/// Defines an `extern "x86-interrupt"` handler for an exception that the
/// CPU does not push an error code for.
macro_rules! define_exception {
    ($name:ident, $vector:expr) => {
        pub extern "x86-interrupt" fn $name(stack_frame: InterruptStackFrame) {
            isr_common($vector, &stack_frame, None);
        }
    };
}

/// Same as [`define_exception`] but for vectors the CPU pushes an error
/// code for.
macro_rules! define_exception_with_code {
    ($name:ident, $vector:expr) => {
        pub extern "x86-interrupt" fn $name(stack_frame: InterruptStackFrame, error_code: u64) {
            isr_common($vector, &stack_frame, Some(error_code));
        }
    };
}

define_exception!(divide_error_handler, 0);
define_exception!(debug_handler, 1);
define_exception!(nmi_handler, 2);
define_exception!(overflow_handler, 4);
define_exception!(bound_range_handler, 5);
define_exception!(invalid_opcode_handler, 6);
define_exception!(device_not_available_handler, 7);
define_exception!(coprocessor_segment_overrun_handler, 9);
define_exception_with_code!(invalid_tss_handler, 10);
define_exception_with_code!(segment_not_present_handler, 11);
define_exception_with_code!(stack_segment_fault_handler, 12);
define_exception_with_code!(general_protection_fault_handler, 13);
define_exception!(x87_fp_handler, 16);
define_exception_with_code!(alignment_check_handler, 17);
define_exception!(machine_check_handler, 18);

/// Breakpoint exception handler (INT 3, a trap gate — IRQs stay enabled).
///
/// Unlike the other exceptions, this one is not fatal: it drops into the
/// debugger so a developer can inspect kernel state, then returns.
pub extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    klog::info!("breakpoint at {:#018x}", stack_frame.instruction_pointer.as_u64());
    debugger::enter(stack_frame.instruction_pointer.as_u64());
}

/// Double fault handler (INT 8). Runs on the dedicated IST1 stack because
/// the condition that triggers a double fault (a fault while delivering
/// another fault) often means the regular kernel stack is unusable.
pub extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    klog::error!(
        "DOUBLE FAULT at {:#018x}, error code {:#x}",
        stack_frame.instruction_pointer.as_u64(),
        error_code
    );
    panic!("double fault");
}

/// Page fault handler (INT 14). CR2 holds the faulting address.
pub extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    let faulting_address = cpu::read_cr2();
    klog::error!(
        "page fault at {:#018x} accessing {:#018x} ({:?})",
        stack_frame.instruction_pointer.as_u64(),
        faulting_address,
        error_code
    );
    panic!("page fault");
}

/// Timer interrupt (IRQ0, vector 32). Advances the tick counter and runs
/// the scheduler before returning — the scheduler may switch to a
/// different task's stack, in which case this handler "returns" into
/// that task instead of the one that was interrupted.
pub extern "x86-interrupt" fn timer_handler(_stack_frame: InterruptStackFrame) {
    khal::pic::send_eoi(khal::pic::TIMER_VECTOR);
    clock::tick();
    unsafe {
        process::schedule();
    }
}

/// Keyboard interrupt (IRQ1, vector 33). Reads the scancode off the PS/2
/// data port and hands it to the keyboard driver, which decodes it and
/// pushes the result into the ring buffer consumed by the `kbd` device.
pub extern "x86-interrupt" fn keyboard_handler(_stack_frame: InterruptStackFrame) {
    let scancode = khal::keyboard::read_scancode();
    crate::drivers::keyboard::on_scancode(scancode);
    khal::pic::send_eoi(khal::pic::KEYBOARD_VECTOR);
}
