//! Critical-section mutex for the single-threaded cooperative kernel.
//!
//! At most one thread ever executes kernel code at a time (design §5): there
//! is no SMP contention to arbitrate, so unlike a general-purpose kernel this
//! lock never spins waiting for another CPU. The only reentrancy hazard is an
//! interrupt handler running on top of the thread that already holds the
//! lock, so `KMutex` just disables interrupts for the duration of the
//! critical section and restores the previous flag state on drop, the same
//! technique a ticket-lock kernel uses beneath its queuing logic.
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// `cli`/`sti` are privileged instructions and cannot run in the hosted test
/// target this crate's `#[cfg(test)]` modules build for, so tests link
/// against a software stand-in that tracks the same are-enabled/disable/
/// enable contract instead of the real `x86_64::instructions::interrupts`.
#[cfg(not(test))]
mod interrupts {
    pub use x86_64::instructions::interrupts::{are_enabled, disable, enable};
}


/// Interrupt-disabling mutex. Holding two `KMutex`es nested from the same
/// thread is fine; holding the same one twice deadlocks, exactly as with any
/// non-reentrant lock.
pub struct KMutex<T> {
    locked: AtomicBool,
    poisoned: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for KMutex<T> {}
unsafe impl<T: Send> Sync for KMutex<T> {}

pub struct KMutexGuard<'a, T> {
    mutex: &'a KMutex<T>,
    interrupts_were_enabled: bool,
}

impl<T> KMutex<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            poisoned: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Force-unlock after a panic recovery, when we know the guard was lost
    /// but no code is still executing with the lock held.
    ///
    /// # Safety
    /// Caller must ensure no other code currently holds this lock.
    #[inline]
    pub unsafe fn force_unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    #[inline]
    pub fn clear_poison(&self) {
        self.poisoned.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn lock(&self) -> KMutexGuard<'_, T> {
        let interrupts_were_enabled = interrupts::are_enabled();
        interrupts::disable();

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // A single kernel thread can only re-enter its own lock through a
            // nested interrupt; there is no other owner to wait out.
            panic!("KMutex: reentrant lock from interrupt context");
        }

        KMutexGuard {
            mutex: self,
            interrupts_were_enabled,
        }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<KMutexGuard<'_, T>> {
        let interrupts_were_enabled = interrupts::are_enabled();
        interrupts::disable();

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(KMutexGuard {
                mutex: self,
                interrupts_were_enabled,
            })
        } else {
            if interrupts_were_enabled {
                interrupts::enable();
            }
            None
        }
    }
}

impl<'a, T> Deref for KMutexGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T> DerefMut for KMutexGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<'a, T> Drop for KMutexGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
        if self.interrupts_were_enabled {
            interrupts::enable();
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_grants_exclusive_access() {
        let m = KMutex::new(5);
        {
            let mut g = m.lock();
            *g += 1;
        }
        assert_eq!(*m.lock(), 6);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let m = KMutex::new(0);
        let _g = m.lock();
        assert!(m.try_lock().is_none());
    }

    #[test]
    fn poison_flag_round_trips() {
        let m = KMutex::new(0);
        assert!(!m.is_poisoned());
    }
}
