//! Task State Segment (TSS) for x86_64.
//!
//! The TSS holds the stack pointers for privilege level changes and
//! the Interrupt Stack Table (IST), used for guaranteed stack switches
//! during critical exceptions like Double Fault.

/// Size of the IST1 stack in bytes (16 KiB), used only by the double
/// fault handler — a fault that hits while the regular kernel stack is
/// itself corrupt or exhausted must still get a stack to run on.
const IST_STACK_SIZE: usize = 4096 * 4;

/// Stack storage for IST entry 1 (double fault handler).
static mut DOUBLE_FAULT_STACK: [u8; IST_STACK_SIZE] = [0; IST_STACK_SIZE];

/// The 64-bit Task State Segment.
///
/// There is no Ring 3 in this kernel, so RSP0-RSP2 are never consulted by
/// the CPU; only the IST slots matter. We still zero the RSP fields so
/// the TSS is well-formed.
#[repr(C, packed)]
pub struct Tss {
	reserved0: u32,
	rsp: [u64; 3],
	reserved1: u64,
	/// Interrupt Stack Table (IST) entries.
	/// Only IST1 (double fault) is used.
	pub ist: [u64; 7],
	reserved2: u64,
	reserved3: u16,
	/// Offset to the I/O permission bitmap from the TSS base.
	pub iomap_base: u16,
}

impl Tss {
	/// Create a new TSS with all fields zeroed.
	pub const fn new() -> Self {
		Self {
			reserved0: 0,
			rsp: [0; 3],
			reserved1: 0,
			ist: [0; 7],
			reserved2: 0,
			reserved3: 0,
			iomap_base: core::mem::size_of::<Self>() as u16,
		}
	}

	/// Point IST1 at the dedicated double-fault stack.
	pub fn init(&mut self) {
		let ist1_top = core::ptr::addr_of!(DOUBLE_FAULT_STACK) as *const u8;
		self.ist[0] = ist1_top as u64 + IST_STACK_SIZE as u64;
	}
}
