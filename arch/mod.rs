//! Architecture support
//!
//! This subsystem targets RISC-V only; it was extracted from a
//! multi-architecture kernel and kept to the one target it still needs.

pub mod common;
pub mod riscv64;

pub use riscv64::*;
