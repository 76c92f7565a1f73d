//! Entropy source for `random_get` and fresh process identifiers (design
//! §4.4 syscall surface, §4.5 "16-byte random process identifier").
//!
//! Unlike [`crate::scheduler::ContextSwitch`] and [`crate::clock::TickSource`],
//! entropy hardware (RDRAND, or whatever the platform exposes) isn't on
//! design §1's out-of-scope list, and a real source doesn't need one: a
//! seeded generator needs no hardware at all. This store just holds
//! whichever implementation the kernel binary registers at boot; the
//! kernel binary crate registers a concrete one.

use cosix_abi::{Errno, ProcessId, PROCESS_ID_LEN};
use cosix_lib::error::{KernelError, KernelResult};
use cosix_lib::KMutex;

pub trait RandomSource: Sync {
    fn fill(&self, buf: &mut [u8]);
}

pub struct RandomStore {
    source: KMutex<Option<&'static dyn RandomSource>>,
}

impl RandomStore {
    pub const fn new() -> Self {
        Self { source: KMutex::new(None) }
    }

    pub fn register(&self, source: &'static dyn RandomSource) {
        *self.source.lock() = Some(source);
    }

    pub fn fill(&self, buf: &mut [u8]) -> KernelResult<()> {
        match *self.source.lock() {
            Some(source) => {
                source.fill(buf);
                Ok(())
            }
            None => Err(KernelError::Errno(Errno::NoDev)),
        }
    }

    pub fn fresh_process_id(&self) -> KernelResult<ProcessId> {
        let mut bytes = [0u8; PROCESS_ID_LEN];
        self.fill(&mut bytes)?;
        Ok(ProcessId(bytes))
    }
}

impl Default for RandomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(u8);
    impl RandomSource for FixedSource {
        fn fill(&self, buf: &mut [u8]) {
            buf.fill(self.0);
        }
    }

    #[test]
    fn unregistered_store_fails_nodev() {
        let store = RandomStore::new();
        let mut buf = [0u8; 4];
        assert_eq!(store.fill(&mut buf).unwrap_err(), KernelError::Errno(Errno::NoDev));
    }

    #[test]
    fn registered_store_fills_from_the_source() {
        static SOURCE: FixedSource = FixedSource(0x42);
        let store = RandomStore::new();
        store.register(&SOURCE);
        let mut buf = [0u8; 4];
        store.fill(&mut buf).unwrap();
        assert_eq!(buf, [0x42; 4]);
    }

    #[test]
    fn fresh_process_id_is_the_right_length() {
        static SOURCE: FixedSource = FixedSource(0x7);
        let store = RandomStore::new();
        store.register(&SOURCE);
        let id = store.fresh_process_id().unwrap();
        assert_eq!(id.0, [0x7; PROCESS_ID_LEN]);
    }
}
