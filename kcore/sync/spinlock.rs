//! Spinlock primitives
//!
//! A plain busy-wait spinlock, and an IRQ-safe variant that disables local
//! interrupts for the duration of the critical section so an interrupt
//! handler re-entering on the same hart cannot deadlock against itself.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// A simple busy-wait spinlock.
pub struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create a new spinlock.
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Try to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map(|_| SpinLockGuard { lock: self })
            .ok()
    }

    /// Acquire the lock, busy-waiting until it is available.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            crate::utils::spin(1);
        }
    }

    /// Check if the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// Guard returned by [`SpinLock::lock`].
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Snapshot of whether supervisor external interrupts were enabled before an
/// [`IrqSpinLock`] disabled them, so they can be restored exactly.
#[derive(Clone, Copy)]
struct IrqState {
    was_enabled: bool,
}

#[inline]
fn irq_disable_save() -> IrqState {
    #[cfg(target_arch = "riscv64")]
    {
        let was_enabled = riscv::register::sstatus::read().sie();
        unsafe {
            riscv::register::sstatus::clear_sie();
        }
        IrqState { was_enabled }
    }

    #[cfg(not(target_arch = "riscv64"))]
    {
        IrqState { was_enabled: false }
    }
}

#[inline]
fn irq_restore(state: IrqState) {
    #[cfg(target_arch = "riscv64")]
    {
        if state.was_enabled {
            unsafe {
                riscv::register::sstatus::set_sie();
            }
        }
    }

    #[cfg(not(target_arch = "riscv64"))]
    {
        let _ = state;
    }
}

/// A spinlock that disables local interrupts for the duration of the
/// critical section.
///
/// Per-device MSI registries (§5) are guarded by this lock so that
/// `alloc_vectors`/`free_vectors` are atomic with respect to an interrupt
/// handler on the same hart, not just other harts.
pub struct IrqSpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for IrqSpinLock<T> {}
unsafe impl<T: Send> Sync for IrqSpinLock<T> {}

impl<T> IrqSpinLock<T> {
    /// Create a new IRQ-safe spinlock.
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, disabling local interrupts first.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let irq_state = irq_disable_save();
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return IrqSpinLockGuard {
                    lock: self,
                    irq_state,
                };
            }
            crate::utils::spin(1);
        }
    }

    /// Check if the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

/// Guard returned by [`IrqSpinLock::lock`]. Restores the prior interrupt
/// state on drop, after releasing the lock.
pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    irq_state: IrqState,
}

impl<'a, T> Deref for IrqSpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for IrqSpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for IrqSpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        irq_restore(self.irq_state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spinlock_mutates_through_guard() {
        let lock = SpinLock::new(5);
        *lock.lock() += 1;
        assert_eq!(*lock.lock(), 6);
    }

    #[test]
    fn spinlock_try_lock_fails_while_held() {
        let lock = SpinLock::new(0);
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn irq_spinlock_mutates_through_guard() {
        let lock = IrqSpinLock::new(alloc::vec::Vec::<u32>::new());
        lock.lock().push(1);
        lock.lock().push(2);
        assert_eq!(&*lock.lock(), &[1, 2]);
    }
}
