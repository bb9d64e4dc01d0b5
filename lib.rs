//! hartcore-msi — MSI vector allocation and RISC-V IMSIC delivery core
//!
//! This crate implements the message-signaled-interrupt subsystem of the
//! hartcore kernel: a generic power-of-two MSI vector allocator
//! (`kcore::irq::msi`) layered over a minimal IRQ-domain collaborator
//! (`kcore::irq::domain`), and a RISC-V IMSIC chip driver
//! (`drivers::platform::imsic`) that owns per-hart MMIO interrupt files and
//! dispatches pending interrupts up to it.
//!
//! Only the RISC-V target is supported; this is a single-architecture
//! subsystem extracted from a larger kernel, not the whole kernel.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub use alloc::boxed::Box;
pub use alloc::format;
pub use alloc::string::String;
pub use alloc::vec::Vec;

#[macro_use]
pub mod utils;

pub mod arch;
pub mod drivers;
pub mod kcore;

/// Crate version, forwarded from Cargo metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate-wide error type. Each subsystem keeps its own error enum and wraps
/// it in here via `From`, matching the layered-error convention used
/// throughout this codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Core subsystem error (IRQ domain, MSI allocator, synchronization).
    Core(kcore::Error),
    /// Driver subsystem error (IMSIC attach/probe/bind).
    Driver(drivers::Error),
}

impl From<kcore::Error> for Error {
    fn from(err: kcore::Error) -> Self {
        Error::Core(err)
    }
}

impl From<drivers::Error> for Error {
    fn from(err: drivers::Error) -> Self {
        Error::Driver(err)
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = ::core::result::Result<T, Error>;

/// Initialize the MSI/IMSIC core. Intended to be called once during kernel
/// bring-up, after memory management and before devices are probed.
pub fn init() -> Result<()> {
    kcore::init()?;
    drivers::init()?;
    crate::info!("hartcore-msi v{} initialized", VERSION);
    Ok(())
}
