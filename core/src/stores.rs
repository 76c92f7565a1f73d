//! Process-wide singleton registries (design §3 "every kernel 'store'...
//! process-wide singletons with `init -> serve -> teardown` lifecycles",
//! §6 "internal user-facing stores").
//!
//! Grounded in `original_source/hw/driver_store.cpp` and
//! `proc/process_store.cpp`: flat, append-only registries guarded by one
//! lock, not trees. The two *userland-visible* stores
//! (`original_source/fd/ifstoresock.cpp`, `fd/blockdevstoresock.cpp`) share
//! one shape — a datagram FD that turns a text-line command into a text
//! response plus zero or more attached FDs — generalised here into
//! [`TextCommandSock`], composed with a callback rather than subclassed
//! (design §9: "compose helpers... as a struct with a callback, not as a
//! base class").

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU16, Ordering};

use cosix_abi::iovec::copy_into_iovecs;
use cosix_abi::{Errno, FdFlags, FileStat, FileType, IoVecMut, ProcessId};
use cosix_fs::fd::{FileDescriptor, RecvResult};
use cosix_fs::{KernelError, NetworkInterface, SectorDevice};
use cosix_lib::error::KernelResult;
use cosix_lib::{KMutex, Signaler, wait_until};

use crate::process::Process;

/// A process-wide singleton registered once at boot (design §9 "treat as
/// explicit context passed into subsystem constructors at boot").
pub trait Driver: Send + Sync {}

/// Flat append-only registry of boot-time drivers. Only existence and
/// uniqueness matter here; nothing in this kernel looks drivers back up by
/// name (design: `original_source/hw/driver_store.cpp` never does either).
pub struct DriverStore {
    drivers: KMutex<Vec<Arc<dyn Driver>>>,
}

impl DriverStore {
    pub const fn new() -> Self {
        Self { drivers: KMutex::new(Vec::new()) }
    }

    /// Fails as an internal invariant, mirroring the original's
    /// `kernel_panic` on double-registration: this only ever happens from
    /// a boot-sequence bug, never from anything userland can trigger.
    pub fn register(&self, driver: Arc<dyn Driver>) -> KernelResult<()> {
        let mut drivers = self.drivers.lock();
        if drivers.iter().any(|d| Arc::ptr_eq(d, &driver)) {
            return Err(KernelError::Invariant("driver already registered"));
        }
        drivers.push(driver);
        Ok(())
    }
}

impl Default for DriverStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Looks up a live process by its 16-byte random identifier (design §4.5
/// "the process store permits lookup but never reuses an id within a
/// boot"). Holds only `Weak` references: a process's real owner is whatever
/// spawned it (its parent's `ProcessFd`, the scheduler's run queue), not
/// this store.
pub struct ProcessStore {
    processes: KMutex<Vec<Weak<Process>>>,
}

impl ProcessStore {
    pub const fn new() -> Self {
        Self { processes: KMutex::new(Vec::new()) }
    }

    pub fn register(&self, process: &Arc<Process>) -> KernelResult<()> {
        let mut processes = self.processes.lock();
        processes.retain(|p| p.upgrade().is_some());
        if processes.iter().any(|p| p.upgrade().is_some_and(|p| p.id == process.id)) {
            return Err(KernelError::Invariant("process id already registered"));
        }
        processes.push(Arc::downgrade(process));
        Ok(())
    }

    pub fn find(&self, id: ProcessId) -> Option<Arc<Process>> {
        let mut processes = self.processes.lock();
        processes.retain(|p| p.upgrade().is_some());
        processes.iter().find_map(|p| p.upgrade().filter(|p| p.id == id))
    }
}

impl Default for ProcessStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One pending command response: the text reply plus any FDs the command
/// produced, waiting for the caller's matching `sock_recv` (design §6
/// "datagram sockets with text-line commands").
struct Reply {
    data: Vec<u8>,
    fds: Vec<Arc<dyn FileDescriptor>>,
}

/// Splits `LIST`, `MAC eth0`, `COPY` into a command and an optional
/// argument, the way `original_source/fd/ifstoresock.cpp`'s `strsplit`
/// does.
fn split_command(line: &[u8]) -> (&[u8], Option<&[u8]>) {
    match line.iter().position(|&b| b == b' ') {
        Some(i) => (&line[..i], Some(&line[i + 1..])),
        None => (line, None),
    }
}

/// The shared "userland text-command socket" shape (design §9): a
/// self-contained datagram FD that feeds each `sock_send` payload to a
/// callback and makes the callback's reply available to the next
/// `sock_recv`. Unlike [`cosix_fs::UnixSock`] there is no peer: the socket
/// answers its own sender directly, matching the original's `sock_t`
/// fixed-CONNECTED pseudo-peer.
pub struct TextCommandSock {
    inode: u64,
    flags: AtomicU16,
    pending: KMutex<Option<Reply>>,
    read_signaler: Signaler,
    handler: Box<dyn Fn(&[u8], Option<&[u8]>) -> (Vec<u8>, Vec<Arc<dyn FileDescriptor>>) + Send + Sync>,
}

impl TextCommandSock {
    pub fn new(
        inode: u64,
        handler: impl Fn(&[u8], Option<&[u8]>) -> (Vec<u8>, Vec<Arc<dyn FileDescriptor>>) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            inode,
            flags: AtomicU16::new(0),
            pending: KMutex::new(None),
            read_signaler: Signaler::new(),
            handler: Box::new(handler),
        })
    }

    fn is_nonblocking(&self) -> bool {
        FdFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed)).contains(FdFlags::NONBLOCK)
    }
}

impl FileDescriptor for TextCommandSock {
    fn file_type(&self) -> FileType {
        FileType::SocketDgram
    }

    fn flags(&self) -> FdFlags {
        FdFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    fn set_flags(&self, flags: FdFlags) {
        self.flags.store(flags.bits(), Ordering::Relaxed);
    }

    fn stat_get(&self) -> cosix_fs::FsResult<FileStat> {
        Ok(FileStat::new(0, self.inode, FileType::SocketDgram, 0))
    }

    fn sock_stat_get(&self) -> cosix_fs::FsResult<FileStat> {
        self.stat_get()
    }

    fn sock_shutdown(&self, _how: cosix_fs::ShutdownHow) -> cosix_fs::FsResult<()> {
        // A command socket has no write-side state to tear down; the
        // original ignores CLOUDABI_SHUT_RD and only flips a status flag
        // on CLOUDABI_SHUT_WR that this socket never reads back either.
        Ok(())
    }

    fn sock_send(&self, iovs: &[cosix_abi::IoVec<'_>], fds: &[Arc<dyn FileDescriptor>]) -> cosix_fs::FsResult<usize> {
        if !fds.is_empty() {
            return Err(KernelError::Errno(Errno::Inval));
        }
        let total: usize = iovs.iter().map(|v| v.len()).sum();
        let mut line = Vec::with_capacity(total);
        for iov in iovs {
            line.extend_from_slice(iov.buf);
        }
        let (command, arg) = split_command(&line);
        let (data, reply_fds) = (self.handler)(command, arg);
        *self.pending.lock() = Some(Reply { data, fds: reply_fds });
        self.read_signaler.broadcast();
        Ok(total)
    }

    fn sock_recv(
        &self,
        iovs: &mut [IoVecMut<'_>],
        fd_slots: &mut [Option<Arc<dyn FileDescriptor>>],
    ) -> cosix_fs::FsResult<RecvResult> {
        loop {
            {
                let mut pending = self.pending.lock();
                if let Some(mut reply) = pending.take() {
                    let (bytes, data_truncated) = copy_into_iovecs(iovs, &reply.data);
                    let fd_count = reply.fds.len().min(fd_slots.len());
                    for (slot, fd) in fd_slots.iter_mut().zip(reply.fds.drain(..fd_count)) {
                        *slot = Some(fd);
                    }
                    return Ok(RecvResult {
                        bytes,
                        fds_received: fd_count,
                        data_truncated,
                        fds_truncated: reply.fds.len() > fd_count,
                    });
                }
            }
            if self.is_nonblocking() {
                return Err(KernelError::Errno(Errno::Again));
            }
            wait_until(&self.read_signaler, || self.pending.lock().is_some());
        }
    }

    fn get_read_signaler(&self) -> Option<&Signaler> {
        Some(&self.read_signaler)
    }
}

/// The interface store's two-value classification of a network interface
/// (design §6 `HWTYPE` response), never exposed through the CloudABI
/// syscall surface itself so it lives here rather than in `cosix-abi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwType {
    Loopback,
    Ethernet,
}

/// A network interface as the interface store sees it: metadata plus the
/// ability to send a raw frame. Implemented by the driver layer (out of
/// scope here), same boundary as [`cosix_fs::NetworkInterface`].
pub trait Interface: Send + Sync {
    fn name(&self) -> &str;
    fn mac(&self) -> &[u8];
    fn hwtype(&self) -> HwType;
    fn send_frame(&self, frame: &[u8]) -> cosix_fs::FsResult<()>;
}

/// Adapts a registered [`Interface`] to the narrower [`NetworkInterface`]
/// a [`cosix_fs::RawSock`] needs, since Rust has no trait-object upcasting
/// for arbitrary supertrait method sets on a stable toolchain.
struct InterfaceAsNetworkInterface(Arc<dyn Interface>);

impl NetworkInterface for InterfaceAsNetworkInterface {
    fn send_frame(&self, frame: &[u8]) -> cosix_fs::FsResult<()> {
        self.0.send_frame(frame)
    }
}

fn hex_mac(mac: &[u8]) -> String {
    if mac.is_empty() {
        return "00:00:00:00:00:00".to_string();
    }
    let mut s = String::with_capacity(mac.len() * 3 - 1);
    for (i, byte) in mac.iter().enumerate() {
        if i > 0 {
            s.push(':');
        }
        s.push_str(&alloc::format!("{byte:02x}"));
    }
    s
}

struct NamedInterface {
    name: String,
    iface: Arc<dyn Interface>,
}

/// Process-wide registry of network interfaces by name, and the source of
/// the `LIST`/`MAC`/`HWTYPE`/`RAWSOCK`/`PSEUDOPAIR`/`COPY` datagram command
/// protocol (design §6).
pub struct InterfaceStore {
    interfaces: KMutex<Vec<NamedInterface>>,
}

impl InterfaceStore {
    pub const fn new() -> Self {
        Self { interfaces: KMutex::new(Vec::new()) }
    }

    pub fn register(&self, name: &str, iface: Arc<dyn Interface>) -> KernelResult<()> {
        let mut interfaces = self.interfaces.lock();
        if interfaces.iter().any(|e| e.name == name) {
            return Err(KernelError::Invariant("interface name already registered"));
        }
        interfaces.push(NamedInterface { name: name.to_string(), iface });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Interface>> {
        self.interfaces.lock().iter().find(|e| e.name == name).map(|e| e.iface.clone())
    }

    fn list(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in self.interfaces.lock().iter() {
            out.extend_from_slice(entry.name.as_bytes());
            out.push(b'\n');
        }
        out
    }
}

impl Default for InterfaceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds one interface-store command socket. `next_inode` hands out a
/// fresh inode for each `COPY`/`PSEUDOPAIR` so every produced FD keeps a
/// distinct `(device, inode)` identity (design §8).
pub fn make_interface_store_sock(
    store: Arc<InterfaceStore>,
    inode: u64,
    next_inode: Arc<dyn Fn() -> u64 + Send + Sync>,
) -> Arc<TextCommandSock> {
    TextCommandSock::new(inode, move |command, arg| {
        match command {
            b"LIST" => (store.list(), Vec::new()),
            b"COPY" => {
                let copy = make_interface_store_sock(store.clone(), next_inode(), next_inode.clone());
                (b"OK".to_vec(), alloc::vec![copy as Arc<dyn FileDescriptor>])
            }
            b"PSEUDOPAIR" => {
                // The original tags the pseudo side with the requested file
                // type; this crate's `PseudoFd` always reports `Directory`
                // (see its own doc comment), so here the argument is only
                // validated, never actually applied.
                if let Some(arg) = arg {
                    if !matches!(arg, b"DIRECTORY" | b"REGULAR_FILE" | b"SOCKET_STREAM" | b"SOCKET_DGRAM") {
                        return (b"ERROR".to_vec(), Vec::new());
                    }
                }
                let (my_reverse, their_reverse) =
                    cosix_fs::UnixSock::pair(cosix_fs::SockKind::Stream, next_inode(), next_inode());
                let bridge = cosix_fs::PseudoBridge::new(my_reverse as Arc<dyn FileDescriptor>);
                let pseudo = cosix_fs::PseudoFd::new(bridge, next_inode());
                (
                    b"OK".to_vec(),
                    alloc::vec![their_reverse as Arc<dyn FileDescriptor>, pseudo as Arc<dyn FileDescriptor>],
                )
            }
            command => {
                let Some(arg) = arg.filter(|a| !a.is_empty()) else {
                    return (b"ERROR".to_vec(), Vec::new());
                };
                let Ok(name) = core::str::from_utf8(arg) else {
                    return (b"ERROR".to_vec(), Vec::new());
                };
                let Some(iface) = store.lookup(name) else {
                    return (b"NOIFACE".to_vec(), Vec::new());
                };
                match command {
                    b"MAC" => (hex_mac(iface.mac()).into_bytes(), Vec::new()),
                    b"HWTYPE" => (
                        match iface.hwtype() {
                            HwType::Loopback => b"LOOPBACK".to_vec(),
                            HwType::Ethernet => b"ETHERNET".to_vec(),
                        },
                        Vec::new(),
                    ),
                    b"RAWSOCK" => {
                        let net = Arc::new(InterfaceAsNetworkInterface(iface));
                        let sock = cosix_fs::RawSock::new(net, FdFlags::empty());
                        (b"OK".to_vec(), alloc::vec![sock as Arc<dyn FileDescriptor>])
                    }
                    _ => (b"ERROR".to_vec(), Vec::new()),
                }
            }
        }
    })
}

struct NamedBlockDev {
    name: String,
    device: Arc<dyn SectorDevice>,
}

/// Process-wide registry of block devices by name, and the source of the
/// `LIST`/`FD`/`COPY` datagram command protocol (design §6).
pub struct BlockDevStore {
    devices: KMutex<Vec<NamedBlockDev>>,
}

impl BlockDevStore {
    pub const fn new() -> Self {
        Self { devices: KMutex::new(Vec::new()) }
    }

    pub fn register(&self, name: &str, device: Arc<dyn SectorDevice>) -> KernelResult<()> {
        let mut devices = self.devices.lock();
        if devices.iter().any(|e| e.name == name) {
            return Err(KernelError::Invariant("block device name already registered"));
        }
        devices.push(NamedBlockDev { name: name.to_string(), device });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn SectorDevice>> {
        self.devices.lock().iter().find(|e| e.name == name).map(|e| e.device.clone())
    }

    fn list(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in self.devices.lock().iter() {
            out.extend_from_slice(entry.name.as_bytes());
            out.push(b'\n');
        }
        out
    }
}

impl Default for BlockDevStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds one block-device-store command socket, mirroring
/// [`make_interface_store_sock`]'s shape for the narrower `LIST`/`FD`/`COPY`
/// protocol.
pub fn make_blockdev_store_sock(
    store: Arc<BlockDevStore>,
    inode: u64,
    next_inode: Arc<dyn Fn() -> u64 + Send + Sync>,
) -> Arc<TextCommandSock> {
    TextCommandSock::new(inode, move |command, arg| match command {
        b"LIST" => (store.list(), Vec::new()),
        b"COPY" => {
            let copy = make_blockdev_store_sock(store.clone(), next_inode(), next_inode.clone());
            (b"OK".to_vec(), alloc::vec![copy as Arc<dyn FileDescriptor>])
        }
        b"FD" => {
            let Some(arg) = arg.filter(|a| !a.is_empty()) else {
                return (b"ERROR".to_vec(), Vec::new());
            };
            let Ok(name) = core::str::from_utf8(arg) else {
                return (b"ERROR".to_vec(), Vec::new());
            };
            let Some(device) = store.lookup(name) else {
                return (b"NODEV".to_vec(), Vec::new());
            };
            let fd = cosix_fs::BlockDev::new(device, FdFlags::empty());
            (b"OK".to_vec(), alloc::vec![fd as Arc<dyn FileDescriptor>])
        }
        _ => (b"ERROR".to_vec(), Vec::new()),
    })
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use cosix_abi::{IoVec, IoVecMut};
    use core::sync::atomic::AtomicU64;

    struct StubIface {
        name: String,
        mac: Vec<u8>,
        hwtype: HwType,
    }

    impl Interface for StubIface {
        fn name(&self) -> &str {
            &self.name
        }
        fn mac(&self) -> &[u8] {
            &self.mac
        }
        fn hwtype(&self) -> HwType {
            self.hwtype
        }
        fn send_frame(&self, _frame: &[u8]) -> cosix_fs::FsResult<()> {
            Ok(())
        }
    }

    fn next_inode_fn() -> Arc<dyn Fn() -> u64 + Send + Sync> {
        let counter = AtomicU64::new(1);
        Arc::new(move || counter.fetch_add(1, Ordering::Relaxed))
    }

    fn send_line(sock: &TextCommandSock, line: &[u8]) {
        sock.sock_send(&[IoVec::new(line)], &[]).unwrap();
    }

    fn recv_text(sock: &TextCommandSock) -> (alloc::string::String, RecvResult) {
        let mut buf = [0u8; 256];
        let mut fd_slots: [Option<Arc<dyn FileDescriptor>>; 4] = Default::default();
        let mut iovs = [IoVecMut::new(&mut buf)];
        let result = sock.sock_recv(&mut iovs, &mut fd_slots).unwrap();
        (alloc::string::String::from_utf8_lossy(&buf[..result.bytes]).into_owned(), result)
    }

    #[test]
    fn process_store_rejects_duplicate_id() {
        let store = ProcessStore::new();
        let page_dir: alloc::boxed::Box<dyn cosix_mm::PageDirectory> = alloc::boxed::Box::new(NoopPageDir);
        let process = Process::new(ProcessId([1; 16]), page_dir, 0, 0x1000);
        store.register(&process).unwrap();
        let err = store.register(&process).unwrap_err();
        assert_eq!(err, KernelError::Invariant("process id already registered"));
    }

    #[test]
    fn process_store_finds_registered_process() {
        let store = ProcessStore::new();
        let page_dir: alloc::boxed::Box<dyn cosix_mm::PageDirectory> = alloc::boxed::Box::new(NoopPageDir);
        let process = Process::new(ProcessId([9; 16]), page_dir, 0, 0x1000);
        store.register(&process).unwrap();
        assert!(store.find(ProcessId([9; 16])).is_some());
        assert!(store.find(ProcessId([8; 16])).is_none());
    }

    struct NoopPageDir;
    impl cosix_mm::PageDirectory for NoopPageDir {
        fn is_mapped(&self, _vaddr: u64) -> bool {
            false
        }
        fn frame_of(&self, _vaddr: u64) -> Option<cosix_mm::FrameId> {
            None
        }
        fn is_cow(&self, _vaddr: u64) -> bool {
            false
        }
        fn protection_of(&self, _vaddr: u64) -> cosix_mm::Prot {
            cosix_mm::Prot::NONE
        }
        fn map(&mut self, _vaddr: u64, _frame: cosix_mm::FrameId, _prot: cosix_mm::Prot, _cow: bool) {}
        fn reprotect(&mut self, _vaddr: u64, _prot: cosix_mm::Prot) {}
        fn unmap(&mut self, _vaddr: u64) {}
        fn flush(&mut self, _vaddr: u64) {}
    }

    #[test]
    fn interface_store_list_contains_registered_name() {
        let store = Arc::new(InterfaceStore::new());
        store
            .register("lo", Arc::new(StubIface { name: "lo".to_string(), mac: Vec::new(), hwtype: HwType::Loopback }))
            .unwrap();
        let sock = make_interface_store_sock(store, 1, next_inode_fn());
        send_line(&sock, b"LIST");
        let (text, _) = recv_text(&sock);
        assert_eq!(text, "lo\n");
    }

    #[test]
    fn interface_store_mac_of_unknown_interface_fails_noiface() {
        let store = Arc::new(InterfaceStore::new());
        let sock = make_interface_store_sock(store, 1, next_inode_fn());
        send_line(&sock, b"MAC eth0");
        let (text, _) = recv_text(&sock);
        assert_eq!(text, "NOIFACE");
    }

    #[test]
    fn interface_store_hwtype_reports_ethernet() {
        let store = Arc::new(InterfaceStore::new());
        store
            .register(
                "eth0",
                Arc::new(StubIface { name: "eth0".to_string(), mac: alloc::vec![1, 2, 3, 4, 5, 6], hwtype: HwType::Ethernet }),
            )
            .unwrap();
        let sock = make_interface_store_sock(store, 1, next_inode_fn());
        send_line(&sock, b"HWTYPE eth0");
        let (text, _) = recv_text(&sock);
        assert_eq!(text, "ETHERNET");
        send_line(&sock, b"MAC eth0");
        let (text, _) = recv_text(&sock);
        assert_eq!(text, "01:02:03:04:05:06");
    }

    #[test]
    fn interface_store_pseudopair_returns_two_fds() {
        let store = Arc::new(InterfaceStore::new());
        let sock = make_interface_store_sock(store, 1, next_inode_fn());
        send_line(&sock, b"PSEUDOPAIR");
        let (text, result) = recv_text(&sock);
        assert_eq!(text, "OK");
        assert_eq!(result.fds_received, 2);
    }

    #[test]
    fn blockdev_store_fd_of_unknown_device_fails_nodev() {
        let store = Arc::new(BlockDevStore::new());
        let sock = make_blockdev_store_sock(store, 1, next_inode_fn());
        send_line(&sock, b"FD disk0");
        let (text, _) = recv_text(&sock);
        assert_eq!(text, "NODEV");
    }

    struct StubDisk;
    impl SectorDevice for StubDisk {
        fn sector_count(&self) -> u64 {
            1
        }
        fn read_sectors(&self, _lba: u64, buf: &mut [u8]) -> cosix_fs::FsResult<()> {
            buf.fill(0);
            Ok(())
        }
    }

    #[test]
    fn blockdev_store_fd_returns_a_block_device_fd() {
        let store = Arc::new(BlockDevStore::new());
        store.register("disk0", Arc::new(StubDisk)).unwrap();
        let sock = make_blockdev_store_sock(store, 1, next_inode_fn());
        send_line(&sock, b"FD disk0");
        let (text, result) = recv_text(&sock);
        assert_eq!(text, "OK");
        assert_eq!(result.fds_received, 1);
    }

    #[test]
    fn nonblocking_recv_with_nothing_pending_fails_again() {
        let store = Arc::new(BlockDevStore::new());
        let sock = make_blockdev_store_sock(store, 1, next_inode_fn());
        sock.set_flags(FdFlags::NONBLOCK);
        let mut buf = [0u8; 16];
        let mut iovs = [IoVecMut::new(&mut buf)];
        let err = sock.sock_recv(&mut iovs, &mut []).unwrap_err();
        assert_eq!(err, KernelError::Errno(Errno::Again));
    }
}
