#![no_std]
#![no_main]

extern crate alloc;

use core::panic::PanicInfo;

use alloc::sync::Arc;

use cosix_lib::condition::register_scheduler_hooks;
use cosix_lib::{klog_error, klog_info, klog_warn};

mod boot;
mod heap;
mod kernel;
mod phys;
mod rng;

use boot::BootInfo;
use kernel::KERNEL;

/// Entry point the bootloader jumps to. Boot-time wiring only (design §9
/// dependency order): heap, then the RNG and the HHDM offset the COW
/// fault resolver copies frames through, then logging, then the
/// scheduler hooks every blocking wait in the kernel reaches through,
/// then the VFS roots this boot happens to have (an initrd image, if the
/// bootloader supplied one), then a halt loop — this repo's concrete
/// `ContextSwitch`, `TickSource` and `PageDirectoryFactory` are
/// architecture-specific boundaries left unfilled here (spec.md §1), so
/// there is no real first userland thread to hand off to yet.
#[unsafe(no_mangle)]
unsafe extern "C" fn _start() -> ! {
    if !boot::base_revision_supported() {
        // Nothing can log yet without a heap-free fallback; the early
        // klog backend writes raw to COM1 regardless, so this is safe to
        // call before `heap::init`.
        klog_error!("limine base revision not supported, halting");
        halt_forever();
    }

    let info = boot::LimineBootInfo::collect();
    match info.largest_usable_region() {
        Some(region) => {
            let heap_start = (region.base + info.hhdm_offset()) as usize;
            heap::init(heap_start, region.length as usize);
        }
        None => {
            klog_error!("no usable memory region reported by bootloader, halting");
            halt_forever();
        }
    }

    cosix_lib::klog_init();
    klog_info!("cosix boot: {} usable memory region(s)", info.memory_regions().iter().filter(|r| r.usable).count());

    kernel::init(info.hhdm_offset());
    register_scheduler_hooks(&KERNEL.scheduler);

    match info.initrd() {
        Some(bytes) => {
            let image: Arc<[u8]> = Arc::from(bytes);
            // Nothing yet holds a process's root FD table open long-term
            // without a concrete `PageDirectoryFactory` to build one (out
            // of scope here); mounting just proves the image parses.
            let _root = cosix_fs::mount_initrd(image);
            klog_info!("initrd mounted, {} bytes", bytes.len());
        }
        None => klog_warn!("no initrd module supplied, booting without one"),
    }

    klog_warn!(
        "no concrete TickSource/PageDirectoryFactory registered (architecture-specific, out of scope); \
         clocks and process fork are unavailable this boot"
    );

    klog_info!("boot complete, idling");
    halt_forever();
}

fn halt_forever() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    klog_error!("panic: {info}");
    x86_64::instructions::interrupts::disable();
    halt_forever();
}
