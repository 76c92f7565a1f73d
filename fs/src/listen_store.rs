//! Process-wide registry from `(device, inode)` to a listening Unix socket
//! (design §3 "Listen store", §4.9 "bind registers the socket... in a
//! process-wide listen store").
//!
//! Generalised from the teacher's fixed-array `MountTable`
//! (`fs/src/vfs/mount.rs`) into a growable `Vec` guarded by one lock, since
//! there is no fixed small upper bound on how many sockets a process may
//! bind, unlike the teacher's bounded mount table.

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use cosix_lib::KMutex;

use crate::unixsock::UnixSock;

struct Registration {
    device: u64,
    inode: u64,
    listener: Weak<UnixSock>,
}

/// Owned by the kernel root value (design §9 "a single `Kernel` root value
/// owns them"); one instance per boot, not per process, since this kernel's
/// process model does not isolate the abstract path namespace further.
pub struct ListenStore {
    registrations: KMutex<Vec<Registration>>,
}

impl ListenStore {
    pub const fn new() -> Self {
        Self {
            registrations: KMutex::new(Vec::new()),
        }
    }

    pub fn register(&self, device: u64, inode: u64, listener: &Arc<UnixSock>) {
        let mut regs = self.registrations.lock();
        regs.retain(|r| r.listener.upgrade().is_some());
        regs.push(Registration {
            device,
            inode,
            listener: Arc::downgrade(listener),
        });
    }

    pub fn unregister(&self, device: u64, inode: u64) {
        let mut regs = self.registrations.lock();
        regs.retain(|r| !(r.device == device && r.inode == inode));
    }

    pub fn lookup(&self, device: u64, inode: u64) -> Option<Arc<UnixSock>> {
        let regs = self.registrations.lock();
        regs.iter()
            .find(|r| r.device == device && r.inode == inode)
            .and_then(|r| r.listener.upgrade())
    }
}

impl Default for ListenStore {
    fn default() -> Self {
        Self::new()
    }
}
