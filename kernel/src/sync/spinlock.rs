//! IRQ-safe spinlock with automatic interrupt disable/restore.
//!
//! Disables interrupts before acquiring the lock and restores the previous
//! interrupt state on drop, preventing deadlocks from IRQ handlers trying
//! to acquire an already-held lock on a single-core system.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::hal;

/// An IRQ-safe spinlock protecting data of type `T`.
///
/// Interrupts are disabled while the lock is held and the previous interrupt
/// state is restored when the guard is dropped. The kernel holds one of these
/// per subsystem table; none is ever held across a yield.
pub struct Spinlock<T> {
    lock: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Spinlock<T> {}
unsafe impl<T: Send> Send for Spinlock<T> {}

/// RAII guard for a held [`Spinlock`].
pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
    irq_was_enabled: bool,
}

impl<T> Spinlock<T> {
    /// Create a new unlocked spinlock wrapping the given data.
    pub const fn new(data: T) -> Self {
        Spinlock {
            lock: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, spinning until it becomes available.
    ///
    /// Interrupt state is saved and interrupts disabled BEFORE spinning, so
    /// a timer or device IRQ cannot fire while this CPU holds the lock.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        let was_enabled = hal::interrupts_enabled();
        hal::disable_interrupts();

        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.lock.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }

        SpinlockGuard { lock: self, irq_was_enabled: was_enabled }
    }

    /// Try to acquire the lock without blocking. Restores interrupt state
    /// on failure.
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        let was_enabled = hal::interrupts_enabled();
        hal::disable_interrupts();

        if self
            .lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinlockGuard { lock: self, irq_was_enabled: was_enabled })
        } else {
            if was_enabled {
                hal::enable_interrupts();
            }
            None
        }
    }

    /// Check if this lock is currently held.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock.load(Ordering::Relaxed)
    }
}

impl<'a, T> SpinlockGuard<'a, T> {
    /// Release the lock WITHOUT restoring the saved interrupt state.
    /// Interrupts stay disabled after this call. Used by `schedule()` to keep
    /// IF=0 from lock release through `switch_context`; the restored task's
    /// frame re-enables interrupts on its own.
    pub fn release_no_irq_restore(self) {
        self.lock.lock.store(false, Ordering::Release);
        core::mem::forget(self); // skip Drop (which would restore IF)
    }
}

impl<'a, T> Deref for SpinlockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinlockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinlockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.lock.store(false, Ordering::Release);
        // Restore interrupt state AFTER releasing the lock. For nested locks
        // the inner guard saw IF=0 and restores nothing; the outermost guard
        // restores the original state.
        if self.irq_was_enabled {
            hal::enable_interrupts();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_guards_data() {
        let lock = Spinlock::new(5u32);
        {
            let mut g = lock.lock();
            *g += 1;
        }
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = Spinlock::new(());
        let g = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(g);
        assert!(lock.try_lock().is_some());
    }
}
