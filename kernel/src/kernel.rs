//! The kernel root value (design §9: "global singletons... treat as
//! explicit context passed into subsystem constructors at boot... a
//! single `Kernel` root value"). One static instance is built here and
//! its pieces are threaded explicitly into the syscall dispatch context,
//! rather than reached for through ambient global functions.

use cosix_core::{
    BlockDevStore, ClockStore, ContextSwitch, DriverStore, FutexTable, InterfaceStore, NoopContextSwitch, ProcessStore,
    RandomStore, Scheduler,
};

use crate::phys::HhdmPhysMemory;
use crate::rng::LcgRandomSource;

/// The architecture-specific half of a cooperative context switch is out
/// of scope here (same boundary as page-table bit layout, spec.md §1);
/// `NoopContextSwitch` is what every thread on this boot actually runs
/// under until a real one exists.
static CONTEXT_SWITCH: NoopContextSwitch = NoopContextSwitch;

/// Unlike `CONTEXT_SWITCH`, a real entropy source needs no hardware this
/// crate doesn't already have, so it's registered for real (see
/// [`init`]) rather than left unfilled.
static RNG: LcgRandomSource = LcgRandomSource::new(0xC0513);

/// Same reasoning as `RNG`: copying frame contents for a copy-on-write
/// fault needs only the HHDM offset, set once in [`init`]. No page-fault
/// trap exists yet to call [`cosix_mm::handle_cow_fault`] from (that
/// needs the real IDT, out of scope here), but the trait boundary it
/// fills is ready.
pub static PHYS: HhdmPhysMemory = HhdmPhysMemory::new();

pub struct Kernel {
    pub clocks: ClockStore,
    pub random: RandomStore,
    pub futexes: FutexTable,
    pub processes: ProcessStore,
    pub drivers: DriverStore,
    pub interfaces: InterfaceStore,
    pub block_devices: BlockDevStore,
    pub scheduler: Scheduler,
}

impl Kernel {
    const fn new(context_switch: &'static dyn ContextSwitch) -> Self {
        Self {
            clocks: ClockStore::new(),
            random: RandomStore::new(),
            futexes: FutexTable::new(),
            processes: ProcessStore::new(),
            drivers: DriverStore::new(),
            interfaces: InterfaceStore::new(),
            block_devices: BlockDevStore::new(),
            scheduler: Scheduler::new(context_switch),
        }
    }
}

/// The one kernel root value for this boot (design §9 dependency order:
/// "allocator -> clocks -> RNG -> VFS roots -> process store ->
/// scheduler" — the allocator runs before this static is ever touched,
/// in [`crate::heap::init`]; everything after it is these fields, built
/// in the same order they're declared above).
pub static KERNEL: Kernel = Kernel::new(&CONTEXT_SWITCH);

/// Runtime-only setup the `const fn` constructor above can't do: wiring
/// the concrete `RandomSource` into the store (design §9 dependency order,
/// "allocator -> clocks -> RNG -> ..."), and giving the COW fault resolver
/// its HHDM offset. Must run once, early in boot, before anything calls
/// `random_get` or forks a process.
pub fn init(hhdm_offset: u64) {
    KERNEL.random.register(&RNG);
    PHYS.init(hhdm_offset);
}
