//! Platform (device-tree-bound) drivers
//!
//! Currently holds exactly one driver: the RISC-V IMSIC chip (§4.5, §4.6).

pub mod imsic;

use crate::Result;

/// Initialize platform-specific drivers and register them with the
/// device manager's driver-binding registry.
pub fn init() -> Result<()> {
    crate::info!("initializing platform-specific drivers");

    crate::drivers::manager().register_driver(imsic::driver());

    crate::info!("platform-specific drivers initialized");
    Ok(())
}
