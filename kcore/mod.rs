//! Core subsystem
//!
//! Holds the pieces of kernel core infrastructure this crate actually
//! needs: a minimal address-type/memory-layout surface, the IRQ-domain and
//! MSI allocator, and the synchronization primitives they build on.

pub mod mm;
pub mod irq;
pub mod sync;

use crate::Result;

/// Core error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Interrupt error
    Irq(irq::Error),
    /// MSI vector allocator error
    Msi(irq::msi::Error),
    /// Invalid argument
    InvalidArgument,
    /// Resource unavailable
    ResourceUnavailable,
    /// Not implemented
    NotImplemented,
}

impl From<irq::Error> for Error {
    fn from(err: irq::Error) -> Self {
        Error::Irq(err)
    }
}

impl From<irq::msi::Error> for Error {
    fn from(err: irq::msi::Error) -> Self {
        Error::Msi(err)
    }
}

/// Initialize all core components
pub fn init() -> Result<()> {
    irq::init()?;
    sync::init()?;
    Ok(())
}

/// Get the current hart ID
pub fn cpu_id() -> usize {
    #[cfg(target_arch = "riscv64")]
    {
        riscv::register::mhartid::read() as usize
    }

    #[cfg(not(target_arch = "riscv64"))]
    {
        0
    }
}
