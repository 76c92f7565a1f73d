//! Process model: FD table, rights bookkeeping, address space ownership,
//! fork and exit (design §3 "Process", §4.5).
//!
//! The teacher's process/FD story is a deep C++ class hierarchy behind a
//! global `process_fd_table`; here it collapses to a single `Process`
//! holding a `BTreeMap<u32, FdMapping>` directly (design §9 "deep virtual
//! hierarchy... replace with a trait"), mirroring how `cosix_fs::fd`
//! already flattened the FD side. The address space is stored as
//! `AddressSpace<Box<dyn PageDirectory>>` so a process table can hold many
//! processes without making every caller up the stack generic over which
//! concrete page directory type backs them.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use cosix_abi::{Errno, ProcessId, Rights};
use cosix_fs::{FileDescriptor, FsResult};
use cosix_lib::error::KernelError;
use cosix_lib::{KMutex, Signaler};
use cosix_mm::{AddressSpace, FrameTable, PageDirectory};

use crate::config::MAX_FDS_PER_PROCESS;

/// One process's view of a file descriptor: the shared object plus the
/// capability mask this particular mapping currently carries (design §3
/// "FD mapping"). Two processes (or two numbers in the same process, after
/// `fd_dup`) may hold distinct `FdMapping`s pointing at the same `fd`.
#[derive(Clone)]
pub struct FdMapping {
    pub fd: Arc<dyn FileDescriptor>,
    pub rights_base: Rights,
    pub rights_inheriting: Rights,
}

/// How a process finished (design §4.5): reported to whatever observes it
/// via `exit_signaler`, e.g. a parent's `poll` subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: u8,
    pub signaled: bool,
}

fn first_free_fd(table: &BTreeMap<u32, FdMapping>) -> Option<u32> {
    let mut candidate: u32 = 0;
    for &key in table.keys() {
        if key == candidate {
            candidate += 1;
        } else if key > candidate {
            break;
        }
    }
    if (candidate as usize) < MAX_FDS_PER_PROCESS {
        Some(candidate)
    } else {
        None
    }
}

/// One process: its address space, FD table, and exit state. Thread
/// ownership lives in [`crate::thread::Thread`], which holds a `Weak`
/// pointer back here rather than the reverse, so a process can outlive an
/// exiting thread long enough to record its status.
pub struct Process {
    pub id: ProcessId,
    pub address_space: KMutex<AddressSpace<Box<dyn PageDirectory>>>,
    fd_table: KMutex<BTreeMap<u32, FdMapping>>,
    exit: KMutex<Option<ExitStatus>>,
    pub exit_signaler: Signaler,
    thread_count: AtomicU32,
}

impl Process {
    pub fn new(id: ProcessId, page_dir: Box<dyn PageDirectory>, floor: u64, ceiling: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            address_space: KMutex::new(AddressSpace::new(page_dir, floor, ceiling)),
            fd_table: KMutex::new(BTreeMap::new()),
            exit: KMutex::new(None),
            exit_signaler: Signaler::new(),
            thread_count: AtomicU32::new(0),
        })
    }

    /// Record that a new thread started running in this process.
    pub fn thread_started(&self) {
        self.thread_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a thread's exit. Returns `true` when this was the last live
    /// thread, in which case the caller must also call `exit` (design §4.6
    /// "the last thread exiting a process triggers `exit(0)`").
    pub fn thread_finished(&self) -> bool {
        self.thread_count.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Install `fd` at the lowest unused slot (design §4.4: fd numbers are
    /// assigned by the kernel, never chosen by the caller). Fails `MFile`
    /// once the table is at [`MAX_FDS_PER_PROCESS`].
    pub fn fd_install(&self, fd: Arc<dyn FileDescriptor>, rights_base: Rights, rights_inheriting: Rights) -> FsResult<u32> {
        let mut table = self.fd_table.lock();
        let num = first_free_fd(&table).ok_or(KernelError::Errno(Errno::MFile))?;
        table.insert(num, FdMapping { fd, rights_base, rights_inheriting });
        Ok(num)
    }

    /// Install `fd` at a specific slot, overwriting whatever mapping was
    /// already there. Used by `exec` to place the inherited descriptors at
    /// their fixed numbers.
    pub fn fd_install_at(
        &self,
        num: u32,
        fd: Arc<dyn FileDescriptor>,
        rights_base: Rights,
        rights_inheriting: Rights,
    ) -> FsResult<()> {
        if num as usize >= MAX_FDS_PER_PROCESS {
            return Err(KernelError::Errno(Errno::MFile));
        }
        self.fd_table.lock().insert(num, FdMapping { fd, rights_base, rights_inheriting });
        Ok(())
    }

    pub fn fd_get(&self, num: u32) -> FsResult<FdMapping> {
        self.fd_table.lock().get(&num).cloned().ok_or(KernelError::Errno(Errno::BadF))
    }

    /// Look up `num` and check it grants every right in `required`; the
    /// capability-check substrate every syscall handler goes through
    /// before touching the underlying [`FileDescriptor`] (design §4.4).
    pub fn fd_check(&self, num: u32, required: Rights) -> FsResult<Arc<dyn FileDescriptor>> {
        let mapping = self.fd_get(num)?;
        if !mapping.rights_base.grants(required) {
            return Err(KernelError::Errno(Errno::NotCapable));
        }
        Ok(mapping.fd)
    }

    pub fn fd_close(&self, num: u32) -> FsResult<()> {
        self.fd_table
            .lock()
            .remove(&num)
            .map(|_| ())
            .ok_or(KernelError::Errno(Errno::BadF))
    }

    /// `fd_dup`: a second mapping number pointing at the same object with
    /// the same rights (design §4.4).
    pub fn fd_dup(&self, num: u32) -> FsResult<u32> {
        let mapping = self.fd_get(num)?;
        let mut table = self.fd_table.lock();
        let new_num = first_free_fd(&table).ok_or(KernelError::Errno(Errno::MFile))?;
        table.insert(new_num, mapping);
        Ok(new_num)
    }

    /// `fd_replace`: `to` takes over `from`'s object and rights, and `from`
    /// stops existing as a mapping (design §4.4). Whatever `to` pointed at
    /// before is simply dropped along with its `Arc`.
    pub fn fd_replace(&self, to: u32, from: u32) -> FsResult<()> {
        let mut table = self.fd_table.lock();
        let mapping = table.remove(&from).ok_or(KernelError::Errno(Errno::BadF))?;
        table.insert(to, mapping);
        Ok(())
    }

    /// `fd_stat_put` rights update: rights may only narrow, never widen,
    /// across the mapping's lifetime (design §4.4 "monotonically
    /// non-increasing").
    pub fn fd_set_rights(&self, num: u32, rights_base: Rights, rights_inheriting: Rights) -> FsResult<()> {
        let mut table = self.fd_table.lock();
        let mapping = table.get_mut(&num).ok_or(KernelError::Errno(Errno::BadF))?;
        if !mapping.rights_base.grants(rights_base) || !mapping.rights_inheriting.grants(rights_inheriting) {
            return Err(KernelError::Errno(Errno::NotCapable));
        }
        mapping.rights_base = rights_base;
        mapping.rights_inheriting = rights_inheriting;
        Ok(())
    }

    pub fn fd_count(&self) -> usize {
        self.fd_table.lock().len()
    }

    /// Copy-on-write process fork (design §4.5, §4.7): the child gets its
    /// own FD table with every mapping cloned (the `Arc<dyn FileDescriptor>`
    /// is shared, not the underlying object) and a COW-forked address
    /// space.
    pub fn fork(&self, child_id: ProcessId, child_page_dir: Box<dyn PageDirectory>, frames: &FrameTable) -> Arc<Process> {
        let child_fds = self.fd_table.lock().clone();
        let child_space = self.address_space.lock().fork(child_page_dir, frames);

        Arc::new(Process {
            id: child_id,
            address_space: KMutex::new(child_space),
            fd_table: KMutex::new(child_fds),
            exit: KMutex::new(None),
            exit_signaler: Signaler::new(),
            thread_count: AtomicU32::new(0),
        })
    }

    /// Record the process's exit status and wake every waiter attached to
    /// `exit_signaler` (design §4.5, §4.12 `proc_exec`/poll). Idempotent: a
    /// process exits exactly once, so a second call is a no-op.
    pub fn exit(&self, status: ExitStatus) {
        let mut exit = self.exit.lock();
        if exit.is_some() {
            return;
        }
        *exit = Some(status);
        drop(exit);
        self.exit_signaler.broadcast();
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit.lock()
    }

    pub fn is_terminated(&self) -> bool {
        self.exit_status().is_some()
    }
}

/// An FD of type `process` (design §4.12 `process-terminate` subscription):
/// `proc_fork` hands the parent one of these for the child, so the parent
/// can `poll` on it rather than needing a dedicated wait syscall. Its read
/// signaler is simply the child's own termination signaler.
pub struct ProcessFd {
    process: Arc<Process>,
}

impl ProcessFd {
    pub fn new(process: Arc<Process>) -> Self {
        Self { process }
    }

    pub fn process(&self) -> &Arc<Process> {
        &self.process
    }
}

impl FileDescriptor for ProcessFd {
    fn file_type(&self) -> cosix_abi::FileType {
        cosix_abi::FileType::Process
    }

    fn flags(&self) -> cosix_abi::FdFlags {
        cosix_abi::FdFlags::empty()
    }

    fn set_flags(&self, _flags: cosix_abi::FdFlags) {}

    fn stat_get(&self) -> FsResult<cosix_abi::FileStat> {
        Ok(cosix_abi::FileStat::new(0, 0, cosix_abi::FileType::Process, 0))
    }

    fn get_read_signaler(&self) -> Option<&Signaler> {
        Some(&self.process.exit_signaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap as StdBTreeMap;
    use cosix_abi::FileType;
    use cosix_mm::FrameId;

    #[derive(Default)]
    struct FakeDir {
        entries: StdBTreeMap<u64, (FrameId, bool)>,
    }

    impl PageDirectory for FakeDir {
        fn is_mapped(&self, vaddr: u64) -> bool {
            self.entries.contains_key(&vaddr)
        }
        fn frame_of(&self, vaddr: u64) -> Option<FrameId> {
            self.entries.get(&vaddr).map(|e| e.0)
        }
        fn is_cow(&self, vaddr: u64) -> bool {
            self.entries.get(&vaddr).map(|e| e.1).unwrap_or(false)
        }
        fn protection_of(&self, _vaddr: u64) -> cosix_mm::Prot {
            cosix_mm::Prot::READ
        }
        fn map(&mut self, vaddr: u64, frame: FrameId, _prot: cosix_mm::Prot, cow: bool) {
            self.entries.insert(vaddr, (frame, cow));
        }
        fn reprotect(&mut self, _vaddr: u64, _prot: cosix_mm::Prot) {}
        fn unmap(&mut self, vaddr: u64) {
            self.entries.remove(&vaddr);
        }
        fn flush(&mut self, _vaddr: u64) {}
    }

    struct StubFd;

    impl FileDescriptor for StubFd {
        fn file_type(&self) -> FileType {
            FileType::RegularFile
        }
        fn flags(&self) -> cosix_abi::FdFlags {
            cosix_abi::FdFlags::empty()
        }
        fn set_flags(&self, _flags: cosix_abi::FdFlags) {}
    }

    fn process() -> Arc<Process> {
        Process::new(ProcessId::zeroed(), Box::new(FakeDir::default()), 0x1000, 0x10000)
    }

    #[test]
    fn install_assigns_lowest_free_slot_and_get_round_trips() {
        let p = process();
        let a = p.fd_install(Arc::new(StubFd), Rights::FD_READ, Rights::empty()).unwrap();
        let b = p.fd_install(Arc::new(StubFd), Rights::FD_READ, Rights::empty()).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        p.fd_close(0).unwrap();
        let c = p.fd_install(Arc::new(StubFd), Rights::FD_READ, Rights::empty()).unwrap();
        assert_eq!(c, 0);
    }

    #[test]
    fn check_denies_ungranted_rights() {
        let p = process();
        let num = p.fd_install(Arc::new(StubFd), Rights::FD_READ, Rights::empty()).unwrap();
        assert!(p.fd_check(num, Rights::FD_READ).is_ok());
        let err = p.fd_check(num, Rights::FD_WRITE).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::NotCapable));
    }

    #[test]
    fn get_on_missing_slot_fails_badf() {
        let p = process();
        let err = p.fd_get(7).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::BadF));
    }

    #[test]
    fn set_rights_rejects_widening() {
        let p = process();
        let num = p.fd_install(Arc::new(StubFd), Rights::FD_READ, Rights::empty()).unwrap();
        let err = p.fd_set_rights(num, Rights::FD_READ | Rights::FD_WRITE, Rights::empty()).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::NotCapable));
        assert!(p.fd_set_rights(num, Rights::empty(), Rights::empty()).is_ok());
    }

    #[test]
    fn replace_moves_mapping_and_invalidates_source() {
        let p = process();
        let from = p.fd_install(Arc::new(StubFd), Rights::FD_READ, Rights::empty()).unwrap();
        let to = p.fd_install(Arc::new(StubFd), Rights::FD_WRITE, Rights::empty()).unwrap();
        p.fd_replace(to, from).unwrap();
        assert_eq!(p.fd_get(from).unwrap_err(), KernelError::Errno(Errno::BadF));
        assert_eq!(p.fd_get(to).unwrap().rights_base, Rights::FD_READ);
    }

    #[test]
    fn dup_shares_the_same_object() {
        let p = process();
        let fd = Arc::new(StubFd);
        let a = p.fd_install(fd, Rights::FD_READ, Rights::empty()).unwrap();
        let b = p.fd_dup(a).unwrap();
        assert!(Arc::ptr_eq(&p.fd_get(a).unwrap().fd, &p.fd_get(b).unwrap().fd));
    }

    #[test]
    fn fork_shares_fd_objects_but_duplicates_the_table() {
        let parent = process();
        let fd = Arc::new(StubFd);
        let num = parent.fd_install(fd, Rights::FD_READ, Rights::empty()).unwrap();

        let frames = FrameTable::new();
        let child = parent.fork(ProcessId::zeroed(), Box::new(FakeDir::default()), &frames);

        assert!(Arc::ptr_eq(&parent.fd_get(num).unwrap().fd, &child.fd_get(num).unwrap().fd));

        parent.fd_close(num).unwrap();
        assert!(child.fd_get(num).is_ok());
    }

    #[test]
    fn exit_fires_once_and_is_idempotent() {
        let p = process();
        assert!(!p.is_terminated());
        p.exit(ExitStatus { code: 1, signaled: false });
        p.exit(ExitStatus { code: 99, signaled: true });
        assert_eq!(p.exit_status(), Some(ExitStatus { code: 1, signaled: false }));
    }

    #[test]
    fn exit_broadcast_wakes_an_attached_condition() {
        use cosix_lib::condition::{Condition, SchedulerHooks, register_scheduler_hooks};
        use core::sync::atomic::{AtomicU32, Ordering};

        struct TestHooks {
            current: AtomicU32,
        }
        impl SchedulerHooks for TestHooks {
            fn current_thread(&self) -> Option<cosix_lib::ThreadHandle> {
                Some(self.current.load(Ordering::Relaxed))
            }
            fn block_current(&self) {}
            fn wake(&self, _thread: cosix_lib::ThreadHandle) {}
        }
        static HOOKS: TestHooks = TestHooks { current: AtomicU32::new(1) };
        register_scheduler_hooks(&HOOKS);

        let p = process();
        let cond = Condition::attach(&p.exit_signaler).unwrap();
        p.exit(ExitStatus { code: 0, signaled: false });
        assert!(cond.fired());
    }

    #[test]
    fn thread_finished_reports_the_last_thread() {
        let p = process();
        p.thread_started();
        p.thread_started();
        assert!(!p.thread_finished());
        assert!(p.thread_finished());
    }

    #[test]
    fn process_fd_read_signaler_is_the_process_exit_signaler() {
        let p = process();
        let pfd = ProcessFd::new(p.clone());
        assert!(Arc::ptr_eq(&p, pfd.process()));
        assert_eq!(pfd.file_type(), FileType::Process);
        assert!(core::ptr::eq(pfd.get_read_signaler().unwrap(), &p.exit_signaler));
    }
}
