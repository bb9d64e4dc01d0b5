//! Synchronization primitives
//!
//! The MSI/IMSIC core has no suspension points (§5): the only primitive it
//! needs is a spinlock, in a plain and an IRQ-safe flavor.

use crate::Result;

pub mod spinlock;

pub use spinlock::{IrqSpinLock, SpinLock};

/// Initialize synchronization subsystem
pub fn init() -> Result<()> {
    Ok(())
}
