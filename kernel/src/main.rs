#![no_std]
#![no_main]

extern crate alloc;

mod arch;
mod drivers;
mod fs;
mod memory;
mod sync;
mod task;
mod traps;
mod util;

use arch::cpu;
use arch::x86_64::boot;
use memory::address::{PhysAddr, VirtAddr};
use memory::vmm::{KernelSegment, MemRegion, PageTableFlags};
use util::config::BootConfig;

// Linker-provided boundaries of the kernel image, used to build the
// segment list `vmm_init` maps with the right permissions per section.
extern "C" {
    static _text_start: u8;
    static _text_end: u8;
    static _rodata_start: u8;
    static _rodata_end: u8;
    static _data_start: u8;
    static _kernel_end: u8;
}

fn symbol_addr(sym: &u8) -> u64 {
    sym as *const u8 as u64
}

/// Kernel entry point called by the Limine bootloader.
///
/// Bring-up runs in a fixed order because almost every later step
/// depends on an earlier one: traps before anything that can fault,
/// the console before anything worth watching, physical memory before
/// virtual memory, virtual memory before the heap, the heap before the
/// scheduler and the archive index (both allocate), devices before the
/// root filesystem is mounted, the PIC unmasked only once every handler
/// it can fire is actually wired up.
#[no_mangle]
unsafe extern "C" fn _start() -> ! {
    klog::init();

    let cmdline = None; // Limine's command-line request isn't wired up yet.
    let config = BootConfig::from_cmdline(cmdline);
    klog::set_min_level(config.log_level);

    klog::info!("MinimalOS NextGen booting");

    traps::init_idt();
    khal::pic::init();

    if let Some(fb) = boot::get_framebuffer_info() {
        drivers::framebuffer::init(fb);
        if config.mirror_console {
            klog::set_console_sink(drivers::framebuffer::mirror_line);
        }
    } else {
        klog::warn!("no framebuffer available, console output is serial-only");
    }

    let hhdm_offset = boot::get_hhdm_offset();
    unsafe {
        memory::address::init_hhdm(hhdm_offset);
    }

    let memory_map = boot::get_memory_map();
    memory::pmm::init(memory_map);

    let (kernel_phys_base, kernel_virt_base) = boot::get_kernel_address();
    let reloc = kernel_virt_base.wrapping_sub(kernel_phys_base);
    let segments = [
        KernelSegment {
            virt_start: VirtAddr::new(symbol_addr(unsafe { &_text_start })),
            phys_start: PhysAddr::new(symbol_addr(unsafe { &_text_start }).wrapping_sub(reloc)),
            size: symbol_addr(unsafe { &_text_end }) - symbol_addr(unsafe { &_text_start }),
            flags: PageTableFlags::KERNEL_CODE,
        },
        KernelSegment {
            virt_start: VirtAddr::new(symbol_addr(unsafe { &_rodata_start })),
            phys_start: PhysAddr::new(symbol_addr(unsafe { &_rodata_start }).wrapping_sub(reloc)),
            size: symbol_addr(unsafe { &_rodata_end }) - symbol_addr(unsafe { &_rodata_start }),
            flags: PageTableFlags::KERNEL_RODATA,
        },
        KernelSegment {
            virt_start: VirtAddr::new(symbol_addr(unsafe { &_data_start })),
            phys_start: PhysAddr::new(symbol_addr(unsafe { &_data_start }).wrapping_sub(reloc)),
            size: symbol_addr(unsafe { &_kernel_end }) - symbol_addr(unsafe { &_data_start }),
            flags: PageTableFlags::KERNEL_DATA,
        },
    ];

    let mem_regions: alloc::vec::Vec<MemRegion> = memory_map
        .iter()
        .filter(|e| e.entry_type == limine::memory_map::EntryType::USABLE)
        .map(|e| MemRegion { base: e.base, length: e.length })
        .collect();

    memory::vmm::vmm_init(&segments, &mem_regions, hhdm_offset);
    memory::heap::init(config.heap_pages);

    task::process::sched_init();

    khal::keyboard::init();
    khal::keyboard::enable_irq();

    drivers::random::seed(cpu::read_tsc());

    fs::devfs::DEVFS.register("kbd", &drivers::keyboard::KEYBOARD_DEVICE);
    fs::devfs::DEVFS.register("console", &drivers::framebuffer::CONSOLE_DEVICE);
    fs::devfs::DEVFS.register("random", &drivers::random::RANDOM_DEVICE);
    fs::vfs::mount("/dev", &fs::devfs::DEVFS);

    if let Some((base, size)) = boot::get_ramdisk_module() {
        unsafe {
            fs::ramdisk::init(base, size);
        }
        if let Some(disk) = fs::ramdisk::get() {
            fs::tar::USTAR.init(disk);
            fs::vfs::mount("/", &fs::tar::USTAR);
        }
    } else {
        klog::warn!("no ramdisk module loaded, root filesystem is unavailable");
    }

    klog::info!("bring-up complete, entering idle loop");

    cpu::enable_interrupts();

    // The idle loop just parks the boot "task" (pid 0) between timer
    // ticks; `schedule()` runs inside the timer handler, not here.
    loop {
        cpu::halt();
    }
}
