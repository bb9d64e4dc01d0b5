//! Address types and page-size constants
//!
//! The MSI/IMSIC core only needs to name physical and virtual addresses and
//! know the platform page size; the memory manager that actually owns
//! mappings and allocation lives outside this crate.

/// Physical address type
pub type PhysAddr = u64;

/// Virtual address type
pub type VirtAddr = u64;

/// Page size (4 KiB on RISC-V sv39/sv48)
pub const PAGE_SIZE: u64 = 4096;

/// Page shift (number of bits for page offset)
pub const PAGE_SHIFT: u32 = 12;

/// Page mask
pub const PAGE_MASK: u64 = !(PAGE_SIZE - 1);
