// =============================================================================
// MinimalOS NextGen — Kernel Debugger
// =============================================================================
//
// A very small print-and-walk debugger, reachable from two places:
//   - the `int3` breakpoint exception (a developer dropped a breakpoint
//     in kernel code and wants to see where execution stopped)
//   - the panic handler, right before it halts the machine for good
//
// There's no interactive prompt — this isn't gdb. `enter()` prints a
// register/location snapshot, resolves the instruction pointer to the
// nearest known symbol, then walks the frame-pointer chain (`rbp`)
// printing a return-address backtrace, one frame per line, translating
// each address through the same symbol table.
//
// The symbol table (`KSYM_TABLE`) is a hand-maintained list of the
// functions most worth naming in a backtrace, sorted by address once at
// first use. It is not a substitute for loading the kernel's real symbol
// table — there's no ELF parser in here — but it is enough to turn
// "fault at 0xffffffff80212a40" into "fault at 0xffffffff80212a40
// (page_fault_handler+0x10)", which is the difference that matters at
// 3am.
// =============================================================================

use spin::Once;

use crate::traps::handlers;

/// Maximum number of frames the backtrace will print before giving up.
/// Guards against a corrupted or cyclic frame-pointer chain spinning
/// forever.
const MAX_FRAMES: usize = 32;

type Ksym = (u64, &'static str);

/// Sorted ascending by address on first access. Built from function
/// pointers rather than a linked symbol table, so it only knows about
/// the handful of entry points explicitly listed in [`raw_symbols`].
static KSYM_TABLE: Once<[Ksym; KSYM_COUNT]> = Once::new();

const KSYM_COUNT: usize = 13;

fn raw_symbols() -> [Ksym; KSYM_COUNT] {
    [
        (handlers::divide_error_handler as u64, "divide_error_handler"),
        (handlers::debug_handler as u64, "debug_handler"),
        (handlers::nmi_handler as u64, "nmi_handler"),
        (handlers::breakpoint_handler as u64, "breakpoint_handler"),
        (handlers::overflow_handler as u64, "overflow_handler"),
        (handlers::bound_range_handler as u64, "bound_range_handler"),
        (handlers::invalid_opcode_handler as u64, "invalid_opcode_handler"),
        (handlers::general_protection_fault_handler as u64, "general_protection_fault_handler"),
        (handlers::page_fault_handler as u64, "page_fault_handler"),
        (handlers::double_fault_handler as u64, "double_fault_handler"),
        (handlers::timer_handler as u64, "timer_handler"),
        (handlers::keyboard_handler as u64, "keyboard_handler"),
        (enter as u64, "debugger::enter"),
    ]
}

fn ksyms() -> &'static [Ksym; KSYM_COUNT] {
    KSYM_TABLE.call_once(|| {
        let mut table = raw_symbols();
        // Small N, correctness over cleverness.
        for i in 1..table.len() {
            let mut j = i;
            while j > 0 && table[j - 1].0 > table[j].0 {
                table.swap(j - 1, j);
                j -= 1;
            }
        }
        table
    })
}

/// Resolves `addr` to the nearest symbol at or below it, via binary
/// search over the sorted table. Returns `None` if `addr` is below the
/// lowest known symbol.
fn resolve(addr: u64) -> Option<(&'static str, u64)> {
    let table = ksyms();
    let idx = match table.binary_search_by_key(&addr, |entry| entry.0) {
        Ok(idx) => idx,
        Err(0) => return None,
        Err(idx) => idx - 1,
    };
    let (sym_addr, name) = table[idx];
    Some((name, addr - sym_addr))
}

fn print_resolved(label: &str, addr: u64) {
    match resolve(addr) {
        Some((name, 0)) => klog::info!("  {}: {:#018x} ({})", label, addr, name),
        Some((name, offset)) => klog::info!("  {}: {:#018x} ({}+{:#x})", label, addr, name, offset),
        None => klog::info!("  {}: {:#018x} (unknown)", label, addr),
    }
}

/// Reads the current `rbp`, used as the start of the frame-pointer walk.
///
/// # Safety
/// Requires the kernel to have been compiled with frame pointers kept
/// (no `-C force-frame-pointers=off`), which is the default in debug
/// builds this debugger is meant for.
unsafe fn read_rbp() -> u64 {
    let rbp: u64;
    unsafe {
        core::arch::asm!("mov {}, rbp", out(reg) rbp, options(nomem, nostack, preserves_flags));
    }
    rbp
}

/// Walks the `rbp` frame-pointer chain starting at `start_rbp`, printing
/// each saved return address (the `[rbp+8]` slot) resolved against
/// [`ksyms`]. Stops at a null or misaligned frame pointer, or after
/// [`MAX_FRAMES`] frames.
fn walk_frames(start_rbp: u64) {
    let mut rbp = start_rbp;
    for depth in 0..MAX_FRAMES {
        if rbp == 0 || rbp % 8 != 0 {
            break;
        }
        // A frame pointer this low can't be a legitimate kernel stack
        // address; treat it as the end of the chain rather than fault
        // trying to dereference it.
        if rbp < 0x1000 {
            break;
        }
        let saved_rbp = unsafe { core::ptr::read_volatile(rbp as *const u64) };
        let return_addr = unsafe { core::ptr::read_volatile((rbp + 8) as *const u64) };
        if return_addr == 0 {
            break;
        }
        print_resolved(&alloc_free_label(depth), return_addr);
        if saved_rbp <= rbp {
            break;
        }
        rbp = saved_rbp;
    }
}

/// Formats `"#<depth>"` without touching the heap — this runs from
/// panic/exception context, where the allocator may already be in a bad
/// state.
fn alloc_free_label(depth: usize) -> FrameLabel {
    FrameLabel(depth)
}

struct FrameLabel(usize);

impl core::fmt::Display for FrameLabel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reads the address of the instruction right after this call, for
/// callers (the panic handler) that want to report roughly "where" they
/// are without an exception frame handing them an exact `rip`.
#[inline(never)]
pub fn current_rip() -> u64 {
    let rip: u64;
    unsafe {
        core::arch::asm!("lea {}, [rip]", out(reg) rip, options(nomem, nostack, preserves_flags));
    }
    rip
}

/// Entry point called from the breakpoint handler and from the panic
/// handler. Prints a snapshot of `rip` resolved to its nearest symbol,
/// then the frame-pointer backtrace.
///
/// Does not halt or return control anywhere special — callers decide
/// what happens next (the breakpoint handler resumes, the panic handler
/// halts).
pub fn enter(rip: u64) {
    klog::info!("--- debugger ---");
    print_resolved("rip", rip);
    let rbp = unsafe { read_rbp() };
    klog::info!("backtrace:");
    walk_frames(rbp);
    klog::info!("--- end debugger ---");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_sorted_after_first_access() {
        let table = ksyms();
        for pair in table.windows(2) {
            assert!(pair[0].0 <= pair[1].0);
        }
    }

    #[test]
    fn resolve_exact_address_has_zero_offset() {
        let addr = handlers::page_fault_handler as u64;
        let (name, offset) = resolve(addr).expect("page_fault_handler should resolve");
        assert_eq!(name, "page_fault_handler");
        assert_eq!(offset, 0);
    }

    #[test]
    fn resolve_below_lowest_symbol_is_none() {
        assert!(resolve(0).is_none());
    }
}
