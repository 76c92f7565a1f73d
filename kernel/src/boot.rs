//! Limine protocol requests and the boot-time memory map / initrd module
//! this kernel's own wiring needs (design: "parses the Multiboot memory
//! map and optional initrd module"). Everything genuinely hardware-
//! specific beyond this — GDT/IDT/paging bit layout, the VGA/serial
//! console, the RTC/PIT drivers — has no concrete type here, matching
//! spec.md §1.

use limine::BaseRevision;
use limine::memory_map::EntryType;
use limine::request::{HhdmRequest, MemoryMapRequest, ModuleRequest};

#[used]
#[unsafe(link_section = ".requests")]
static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[unsafe(link_section = ".requests")]
static MEMMAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
static MODULE_REQUEST: ModuleRequest = ModuleRequest::new();

pub fn base_revision_supported() -> bool {
    BASE_REVISION.is_supported()
}

/// One entry from the bootloader-reported physical memory map.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub base: u64,
    pub length: u64,
    pub usable: bool,
}

/// Everything this crate's own boot sequence reads out of the bootloader
/// handoff. Kept as a trait so a future test harness can substitute a
/// fixed memory map instead of a real bootloader response.
pub trait BootInfo {
    fn memory_regions(&self) -> &[MemoryRegion];
    fn hhdm_offset(&self) -> u64;
    fn initrd(&self) -> Option<&[u8]>;
}

const MAX_MEMORY_REGIONS: usize = 64;

/// Collected eagerly, in one pass, from the bootloader's static response
/// structures — never through `alloc`, since this runs before the heap
/// exists.
pub struct LimineBootInfo {
    regions: [MemoryRegion; MAX_MEMORY_REGIONS],
    region_count: usize,
    hhdm_offset: u64,
    initrd: Option<&'static [u8]>,
}

impl LimineBootInfo {
    pub fn collect() -> Self {
        let mut regions = [MemoryRegion { base: 0, length: 0, usable: false }; MAX_MEMORY_REGIONS];
        let mut region_count = 0;
        if let Some(response) = MEMMAP_REQUEST.get_response() {
            for entry in response.entries().iter().take(MAX_MEMORY_REGIONS) {
                regions[region_count] = MemoryRegion {
                    base: entry.base,
                    length: entry.length,
                    usable: entry.entry_type == EntryType::USABLE,
                };
                region_count += 1;
            }
        }

        let hhdm_offset = HHDM_REQUEST.get_response().map(|r| r.offset).unwrap_or(0);

        let initrd = MODULE_REQUEST.get_response().and_then(|response| {
            response.modules().first().map(|module| {
                let addr = module.addr();
                let size = module.size() as usize;
                // SAFETY: the bootloader guarantees the module's bytes are
                // mapped and live for the kernel's entire runtime.
                unsafe { core::slice::from_raw_parts(addr, size) }
            })
        });

        Self { regions, region_count, hhdm_offset, initrd }
    }

    /// The largest usable region, the candidate backing store for the
    /// kernel heap (design: heap init is the first boot step, "allocator
    /// -> clocks -> RNG -> VFS roots -> process store -> scheduler").
    pub fn largest_usable_region(&self) -> Option<MemoryRegion> {
        self.regions[..self.region_count].iter().filter(|r| r.usable).max_by_key(|r| r.length).copied()
    }
}

impl BootInfo for LimineBootInfo {
    fn memory_regions(&self) -> &[MemoryRegion] {
        &self.regions[..self.region_count]
    }

    fn hhdm_offset(&self) -> u64 {
        self.hhdm_offset
    }

    fn initrd(&self) -> Option<&[u8]> {
        self.initrd
    }
}
