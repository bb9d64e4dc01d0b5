//! Utility functions and data structures
//!
//! This module contains the small set of architecture helpers and the
//! logging plumbing shared by the rest of the crate.

pub mod log;

// Re-export commonly used utilities
pub use self::log::*;

/// Utility macros
#[macro_export]
macro_rules! align_up {
    ($addr:expr, $align:expr) => {
        (($addr + $align - 1) / $align * $align)
    };
}

#[macro_export]
macro_rules! align_down {
    ($addr:expr, $align:expr) => {
        ($addr / $align * $align)
    };
}

#[macro_export]
macro_rules! is_aligned {
    ($addr:expr, $align:expr) => {
        $addr % $align == 0
    };
}

/// Read-only memory barrier
#[inline]
pub fn rmb() {
    #[cfg(target_arch = "riscv64")]
    riscv::asm::fence(riscv::asm::Ordering::RLR, riscv::asm::Ordering::RLR);

    #[cfg(not(target_arch = "riscv64"))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::Acquire);
}

/// Write memory barrier
#[inline]
pub fn wmb() {
    #[cfg(target_arch = "riscv64")]
    riscv::asm::fence(riscv::asm::Ordering::LRW, riscv::asm::Ordering::LRW);

    #[cfg(not(target_arch = "riscv64"))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::Release);
}

/// Full memory barrier
#[inline]
pub fn mb() {
    #[cfg(target_arch = "riscv64")]
    riscv::asm::fence(riscv::asm::Ordering::RAW, riscv::asm::Ordering::RAW);

    #[cfg(not(target_arch = "riscv64"))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

/// Get a timestamp counter, used only for log lines.
#[inline]
pub fn get_timestamp() -> u64 {
    #[cfg(target_arch = "riscv64")]
    {
        riscv::register::time::read() as u64
    }

    #[cfg(not(target_arch = "riscv64"))]
    {
        0
    }
}

/// Spin for a number of iterations. Used by the IRQ-safe spinlock's
/// contended path instead of yielding, since there is no scheduler here.
#[inline]
pub fn spin(iterations: u32) {
    for _ in 0..iterations {
        #[cfg(target_arch = "riscv64")]
        riscv::asm::nop();

        #[cfg(not(target_arch = "riscv64"))]
        core::hint::spin_loop();
    }
}
