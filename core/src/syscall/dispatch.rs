//! The syscall dispatch table (design §4.4, §4.12).
//!
//! Unlike the teacher's `define_syscall!`-macro table keyed on a raw
//! `*mut InterruptFrame`, dispatch here is a plain `match` over
//! [`SyscallNo`] plus a [`SyscallPayload`] enum carrying whatever
//! non-register data (bytes, paths, structured in/out parameters) that
//! particular call needs. The trap entry in the kernel binary crate is
//! responsible for staging the right payload variant before calling in —
//! the same architecture boundary [`super::context`] documents for
//! [`SyscallArgs`] itself.

use cosix_abi::event::{Event, Subscription};
use cosix_abi::fdstat::FdStatPutFlags;
use cosix_abi::syscall::SyscallNo;
use cosix_abi::{Errno, FdStat, FileStat};

use super::context::{SyscallArgs, SyscallContext, SyscallResult};
use super::{clock_handlers, fd_handlers, file_handlers, mem_handlers, net_handlers, poll_handlers, process_handlers};

/// Whatever a syscall needs beyond six register-width arguments.
pub enum SyscallPayload<'a> {
    None,
    ReadBuf(&'a mut [u8]),
    WriteBuf(&'a [u8]),
    Path(&'a [u8]),
    TwoNames(&'a [u8], &'a [u8]),
    Readlink(&'a [u8], &'a mut [u8]),
    Readdir(&'a mut [u8], &'a mut u64),
    PathStatOut(&'a [u8], &'a mut FileStat),
    FileStatOut(&'a mut FileStat),
    FdStatOut(&'a mut FdStat),
    FdStatPut(&'a FdStat, FdStatPutFlags),
    FdCreate2Out(&'a mut u32),
    Poll(&'a [Subscription], &'a mut [Event]),
    SockRecv(&'a mut [u8], &'a mut [u32], &'a mut usize),
    SockSend(&'a [u8], &'a [u32]),
    /// `proc_exec`'s `inherited_fds[]`: the parent's fd numbers to install
    /// at positions `0..N-1` in the new image (design §4.5).
    Exec(&'a [u32]),
}

/// Decode and run one syscall. Returns `Errno::NoSys` for an unrecognised
/// number and `Errno::Inval` when the staged payload doesn't match what
/// the call expects (a trap-entry bug, not a user error, but still
/// reported rather than trusted).
pub fn dispatch(ctx: &SyscallContext, no: u32, args: &SyscallArgs, payload: SyscallPayload<'_>) -> SyscallResult {
    let Some(no) = SyscallNo::from_raw(no) else {
        return SyscallResult::err(Errno::NoSys);
    };

    use SyscallNo::*;
    match (no, payload) {
        (ClockResGet, SyscallPayload::None) => clock_handlers::clock_res_get(ctx, args),
        (ClockTimeGet, SyscallPayload::None) => clock_handlers::clock_time_get(ctx, args),
        (CondvarSignal, SyscallPayload::None) => poll_handlers::condvar_signal(ctx, args),
        (RandomGet, SyscallPayload::ReadBuf(buf)) => clock_handlers::random_get(ctx, buf),

        (FdClose, SyscallPayload::None) => fd_handlers::fd_close(ctx, args),
        (FdCreate1, SyscallPayload::None) => fd_handlers::fd_create1(ctx, args),
        (FdCreate2, SyscallPayload::FdCreate2Out(out)) => fd_handlers::fd_create2(ctx, args, out),
        (FdDatasync, SyscallPayload::None) => fd_handlers::fd_datasync(ctx, args),
        (FdDup, SyscallPayload::None) => fd_handlers::fd_dup(ctx, args),
        (FdPread, SyscallPayload::ReadBuf(buf)) => fd_handlers::fd_pread(ctx, args, buf),
        (FdPwrite, SyscallPayload::WriteBuf(buf)) => fd_handlers::fd_pwrite(ctx, args, buf),
        (FdRead, SyscallPayload::ReadBuf(buf)) => fd_handlers::fd_read(ctx, args, buf),
        (FdReplace, SyscallPayload::None) => fd_handlers::fd_replace(ctx, args),
        (FdSeek, SyscallPayload::None) => fd_handlers::fd_seek(ctx, args),
        (FdStatGet, SyscallPayload::FdStatOut(out)) => fd_handlers::fd_stat_get(ctx, args, out),
        (FdStatPut, SyscallPayload::FdStatPut(stat, which)) => fd_handlers::fd_stat_put(ctx, args, stat, which),
        (FdSync, SyscallPayload::None) => fd_handlers::fd_sync(ctx, args),
        (FdWrite, SyscallPayload::WriteBuf(buf)) => fd_handlers::fd_write(ctx, args, buf),

        (FileAdvise, SyscallPayload::None) => file_handlers::file_advise(ctx, args),
        (FileAllocate, SyscallPayload::None) => file_handlers::file_allocate(ctx, args),
        (FileCreate, SyscallPayload::Path(path)) => file_handlers::file_create(ctx, args, path),
        (FileLink, SyscallPayload::TwoNames(name, target)) => file_handlers::file_link(ctx, args, name, target),
        (FileOpen, SyscallPayload::Path(path)) => file_handlers::file_open(ctx, args, path),
        (FileReaddir, SyscallPayload::Readdir(buf, cookie)) => file_handlers::file_readdir(ctx, args, buf, cookie),
        (FileReadlink, SyscallPayload::Readlink(name, buf)) => file_handlers::file_readlink(ctx, args, name, buf),
        (FileRename, SyscallPayload::TwoNames(name, target)) => file_handlers::file_rename(ctx, args, name, target),
        (FileStatFget, SyscallPayload::FileStatOut(out)) => file_handlers::file_stat_fget(ctx, args, out),
        (FileStatFput, SyscallPayload::None) => file_handlers::file_stat_fput(ctx, args),
        (FileStatGet, SyscallPayload::PathStatOut(name, out)) => file_handlers::file_stat_get(ctx, args, name, out),
        (FileStatPut, SyscallPayload::None) => file_handlers::file_stat_put(ctx, args),
        (FileSymlink, SyscallPayload::TwoNames(target, name)) => file_handlers::file_symlink(ctx, args, target, name),
        (FileUnlink, SyscallPayload::Path(path)) => file_handlers::file_unlink(ctx, args, path),

        (LockUnlock, SyscallPayload::None) => poll_handlers::lock_unlock(ctx, args),

        (MemAdvise, SyscallPayload::None) => mem_handlers::mem_advise(ctx, args),
        (MemLock, SyscallPayload::None) => mem_handlers::mem_lock(ctx, args),
        (MemMap, SyscallPayload::None) => mem_handlers::mem_map(ctx, args),
        (MemProtect, SyscallPayload::None) => mem_handlers::mem_protect(ctx, args),
        (MemSync, SyscallPayload::None) => mem_handlers::mem_sync(ctx, args),
        (MemUnlock, SyscallPayload::None) => mem_handlers::mem_unlock(ctx, args),
        (MemUnmap, SyscallPayload::None) => mem_handlers::mem_unmap(ctx, args),

        (Poll, SyscallPayload::Poll(subs, out)) => poll_handlers::poll(ctx, subs, out),
        (PollFd, SyscallPayload::None) => poll_handlers::poll_fd(ctx, args),

        (ProcExec, SyscallPayload::Exec(inherited_fds)) => process_handlers::proc_exec(ctx, args, inherited_fds),
        (ProcExit, SyscallPayload::None) => process_handlers::proc_exit(ctx, args),
        (ProcFork, SyscallPayload::None) => process_handlers::proc_fork(ctx),
        (ProcRaise, SyscallPayload::None) => process_handlers::proc_raise(ctx, args),

        (SockAccept, SyscallPayload::None) => net_handlers::sock_accept(ctx, args),
        (SockBind, SyscallPayload::None) => net_handlers::sock_bind(ctx, args),
        (SockConnect, SyscallPayload::None) => net_handlers::sock_connect(ctx, args),
        (SockListen, SyscallPayload::None) => net_handlers::sock_listen(ctx, args),
        (SockRecv, SyscallPayload::SockRecv(buf, fd_nums, fds_received)) => {
            net_handlers::sock_recv(ctx, args, buf, fd_nums, fds_received)
        }
        (SockSend, SyscallPayload::SockSend(buf, fd_nums)) => net_handlers::sock_send(ctx, args, buf, fd_nums),
        (SockShutdown, SyscallPayload::None) => net_handlers::sock_shutdown(ctx, args),
        (SockStatGet, SyscallPayload::FileStatOut(out)) => net_handlers::sock_stat_get(ctx, args, out),

        (ThreadCreate, SyscallPayload::None) => process_handlers::thread_create(ctx),
        (ThreadExit, SyscallPayload::None) => process_handlers::thread_exit(ctx, args),
        (ThreadYield, SyscallPayload::None) => process_handlers::thread_yield(ctx),

        _ => SyscallResult::err(Errno::Inval),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::sync::Arc;

    use cosix_abi::{ProcessId, Rights};
    use cosix_fs::{FileDescriptor, ListenStore, SockKind, UnixSock};
    use cosix_mm::{BumpFrameAllocator, FrameId, FrameTable, PageDirectory, PageDirectoryFactory, Prot};

    use crate::clock::ClockStore;
    use crate::futex::FutexTable;
    use crate::process::Process;
    use crate::random::RandomStore;
    use crate::scheduler::{NoopContextSwitch, Scheduler};
    use crate::thread::ThreadState;

    #[derive(Default)]
    struct FakeDir;
    impl PageDirectory for FakeDir {
        fn is_mapped(&self, _vaddr: u64) -> bool {
            false
        }
        fn frame_of(&self, _vaddr: u64) -> Option<FrameId> {
            None
        }
        fn is_cow(&self, _vaddr: u64) -> bool {
            false
        }
        fn protection_of(&self, _vaddr: u64) -> Prot {
            Prot::NONE
        }
        fn map(&mut self, _vaddr: u64, _frame: FrameId, _prot: Prot, _cow: bool) {}
        fn reprotect(&mut self, _vaddr: u64, _prot: Prot) {}
        fn unmap(&mut self, _vaddr: u64) {}
        fn flush(&mut self, _vaddr: u64) {}
    }

    struct FakeDirFactory;
    impl PageDirectoryFactory for FakeDirFactory {
        fn new_directory(&self) -> Box<dyn PageDirectory> {
            Box::new(FakeDir)
        }
    }

    struct FixedRandom;
    impl crate::random::RandomSource for FixedRandom {
        fn fill(&self, buf: &mut [u8]) {
            buf.fill(0xAB);
        }
    }

    static CONTEXT_SWITCH: NoopContextSwitch = NoopContextSwitch;
    static RANDOM_SOURCE: FixedRandom = FixedRandom;
    static PAGE_DIRS: FakeDirFactory = FakeDirFactory;

    fn fixture() -> (Arc<Process>, Scheduler, FutexTable, ClockStore, RandomStore, FrameTable, BumpFrameAllocator, ListenStore) {
        let process = Process::new(ProcessId::zeroed(), Box::new(FakeDir), 0x1000, 0x10000);
        let scheduler = Scheduler::new(&CONTEXT_SWITCH);
        let futex = FutexTable::new();
        let clocks = ClockStore::new();
        let random = RandomStore::new();
        random.register(&RANDOM_SOURCE);
        let frames = FrameTable::new();
        let allocator = BumpFrameAllocator::new(0, 16);
        let listen_store = ListenStore::new();
        (process, scheduler, futex, clocks, random, frames, allocator, listen_store)
    }

    /// Full `bind`/`listen`/`connect`/`accept`/`send`/`recv` round trip
    /// through the dispatcher, the way a real userland stub would drive it.
    #[test]
    fn socket_round_trip_through_dispatch() {
        let (process, scheduler, futex, clocks, random, frames, allocator, listen_store) = fixture();
        let ctx = SyscallContext {
            process: &process,
            scheduler: &scheduler,
            futex: &futex,
            clocks: &clocks,
            random: &random,
            frames: &frames,
            allocator: &allocator,
            listen_store: &listen_store,
            page_dirs: &PAGE_DIRS,
        };

        let listener: Arc<dyn FileDescriptor> = UnixSock::new(SockKind::Stream, 1);
        let listener_rights = Rights::SOCK_BASE | Rights::SOCK_BIND | Rights::SOCK_LISTEN | Rights::SOCK_ACCEPT;
        let listener_fd = process.fd_install(listener, listener_rights, Rights::empty()).unwrap();

        let bind_args = SyscallArgs::new([listener_fd as u64, 1, 7, 0, 0, 0]);
        let r = dispatch(&ctx, SyscallNo::SockBind as u32, &bind_args, SyscallPayload::None);
        assert_eq!(r.error, Errno::Success);

        let listen_args = SyscallArgs::new([listener_fd as u64, 4, 0, 0, 0, 0]);
        let r = dispatch(&ctx, SyscallNo::SockListen as u32, &listen_args, SyscallPayload::None);
        assert_eq!(r.error, Errno::Success);

        let connect_args = SyscallArgs::new([1, 7, 0, 0, 0, 0]);
        let r = dispatch(&ctx, SyscallNo::SockConnect as u32, &connect_args, SyscallPayload::None);
        assert_eq!(r.error, Errno::Success);
        let client_fd = r.retval as u32;

        let accept_args = SyscallArgs::new([listener_fd as u64, 0, 0, 0, 0, 0]);
        let r = dispatch(&ctx, SyscallNo::SockAccept as u32, &accept_args, SyscallPayload::None);
        assert_eq!(r.error, Errno::Success);
        let accepted_fd = r.retval as u32;

        let send_args = SyscallArgs::new([client_fd as u64, 0, 0, 0, 0, 0]);
        let msg = b"hello";
        let r = dispatch(&ctx, SyscallNo::SockSend as u32, &send_args, SyscallPayload::SockSend(msg, &[]));
        assert_eq!(r.error, Errno::Success);
        assert_eq!(r.retval, msg.len() as u64);

        let recv_args = SyscallArgs::new([accepted_fd as u64, 0, 0, 0, 0, 0]);
        let mut buf = [0u8; 16];
        let mut fd_nums = [0u32; 4];
        let mut fds_received = 0usize;
        let r = dispatch(
            &ctx,
            SyscallNo::SockRecv as u32,
            &recv_args,
            SyscallPayload::SockRecv(&mut buf, &mut fd_nums, &mut fds_received),
        );
        assert_eq!(r.error, Errno::Success);
        assert_eq!(r.retval, msg.len() as u64);
        assert_eq!(&buf[..msg.len()], msg);
        assert_eq!(fds_received, 0);
    }

    #[test]
    fn random_get_fills_from_the_registered_source() {
        let (process, scheduler, futex, clocks, random, frames, allocator, listen_store) = fixture();
        let ctx = SyscallContext {
            process: &process,
            scheduler: &scheduler,
            futex: &futex,
            clocks: &clocks,
            random: &random,
            frames: &frames,
            allocator: &allocator,
            listen_store: &listen_store,
            page_dirs: &PAGE_DIRS,
        };

        let mut buf = [0u8; 4];
        let args = SyscallArgs::default();
        let r = dispatch(&ctx, SyscallNo::RandomGet as u32, &args, SyscallPayload::ReadBuf(&mut buf));
        assert_eq!(r.error, Errno::Success);
        assert_eq!(buf, [0xAB; 4]);
    }

    #[test]
    fn unknown_syscall_number_fails_nosys() {
        let (process, scheduler, futex, clocks, random, frames, allocator, listen_store) = fixture();
        let ctx = SyscallContext {
            process: &process,
            scheduler: &scheduler,
            futex: &futex,
            clocks: &clocks,
            random: &random,
            frames: &frames,
            allocator: &allocator,
            listen_store: &listen_store,
            page_dirs: &PAGE_DIRS,
        };
        let args = SyscallArgs::default();
        let r = dispatch(&ctx, 0xFFFF, &args, SyscallPayload::None);
        assert_eq!(r.error, Errno::NoSys);
    }

    #[test]
    fn exec_installs_inherited_fds_and_tears_down_other_threads_then_reports_nosys() {
        let (process, scheduler, futex, clocks, random, frames, allocator, listen_store) = fixture();
        let ctx = SyscallContext {
            process: &process,
            scheduler: &scheduler,
            futex: &futex,
            clocks: &clocks,
            random: &random,
            frames: &frames,
            allocator: &allocator,
            listen_store: &listen_store,
            page_dirs: &PAGE_DIRS,
        };

        let caller = scheduler.spawn(Arc::downgrade(&process));
        let sibling = scheduler.spawn(Arc::downgrade(&process));

        let elf_fd: Arc<dyn FileDescriptor> = UnixSock::new(SockKind::Stream, 2);
        let elf_num = process.fd_install(elf_fd, Rights::FD_READ, Rights::empty()).unwrap();

        let inherited: Arc<dyn FileDescriptor> = UnixSock::new(SockKind::Stream, 3);
        let inherited_num = process
            .fd_install(inherited.clone(), Rights::FD_READ | Rights::FD_WRITE, Rights::empty())
            .unwrap();

        let args = SyscallArgs::new([elf_num as u64, 0, 0, 0, 0, 0]);
        let r = dispatch(&ctx, SyscallNo::ProcExec as u32, &args, SyscallPayload::Exec(&[inherited_num]));

        assert_eq!(r.error, Errno::NoSys);
        let mapping = process.fd_get(0).unwrap();
        assert!(Arc::ptr_eq(&mapping.fd, &inherited));
        assert_eq!(mapping.rights_base, Rights::FD_READ | Rights::FD_WRITE);
        assert_eq!(sibling.state(), ThreadState::Exited);
        assert_eq!(scheduler.current().unwrap().id, caller.id);
    }

    #[test]
    fn exec_rejects_a_writable_image_fd() {
        let (process, scheduler, futex, clocks, random, frames, allocator, listen_store) = fixture();
        let ctx = SyscallContext {
            process: &process,
            scheduler: &scheduler,
            futex: &futex,
            clocks: &clocks,
            random: &random,
            frames: &frames,
            allocator: &allocator,
            listen_store: &listen_store,
            page_dirs: &PAGE_DIRS,
        };
        scheduler.spawn(Arc::downgrade(&process));

        let elf_fd: Arc<dyn FileDescriptor> = UnixSock::new(SockKind::Stream, 2);
        let elf_num = process.fd_install(elf_fd, Rights::FD_READ | Rights::FD_WRITE, Rights::empty()).unwrap();

        let args = SyscallArgs::new([elf_num as u64, 0, 0, 0, 0, 0]);
        let r = dispatch(&ctx, SyscallNo::ProcExec as u32, &args, SyscallPayload::Exec(&[]));
        assert_eq!(r.error, Errno::NotCapable);
    }

    #[test]
    fn thread_exit_releases_the_named_lock_before_the_thread_is_gone() {
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

        let (process, scheduler, futex, clocks, random, frames, allocator, listen_store) = fixture();
        let ctx = SyscallContext {
            process: &process,
            scheduler: &scheduler,
            futex: &futex,
            clocks: &clocks,
            random: &random,
            frames: &frames,
            allocator: &allocator,
            listen_store: &listen_store,
            page_dirs: &PAGE_DIRS,
        };
        scheduler.spawn(Arc::downgrade(&process));

        let signaler = futex.get_or_create(0x4000);
        let cond = Condition::attach(&signaler).unwrap();

        let args = SyscallArgs::new([0x4000, 0, 0, 0, 0, 0]);
        let r = dispatch(&ctx, SyscallNo::ThreadExit as u32, &args, SyscallPayload::None);

        assert_eq!(r.error, Errno::Success);
        assert!(cond.fired());
    }

    #[test]
    fn mismatched_payload_fails_invalid() {
        let (process, scheduler, futex, clocks, random, frames, allocator, listen_store) = fixture();
        let ctx = SyscallContext {
            process: &process,
            scheduler: &scheduler,
            futex: &futex,
            clocks: &clocks,
            random: &random,
            frames: &frames,
            allocator: &allocator,
            listen_store: &listen_store,
            page_dirs: &PAGE_DIRS,
        };
        let args = SyscallArgs::default();
        let r = dispatch(&ctx, SyscallNo::FdRead as u32, &args, SyscallPayload::None);
        assert_eq!(r.error, Errno::Inval);
    }
}
