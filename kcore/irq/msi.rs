//! MSI vector allocation and per-device descriptor registry
//!
//! Implements the generic, chip-agnostic half of the MSI core: the
//! bit-scan helper used by dispatch (§4.2), the per-vector descriptor
//! (§3), the per-device registry (§4.3), and the power-of-two vector
//! allocator with rollback (§4.4). None of this module knows about IMSIC
//! register layout; it only talks to an [`IrqDomain`].

use alloc::vec::Vec;

use super::{IrqDomain, IrqNumber};
use crate::kcore::sync::IrqSpinLock;

/// Hard cap on the size of a single MSI allocation (§6).
pub const MSI_MAX_VECTORS: u32 = 32;

/// MSI-specific error kinds (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `min == 0`, `min > max`, `max > MSI_MAX_VECTORS`, or no power of two
    /// fits in `[min, max]`.
    InvalidArgument,
    /// The IRQ domain could not provide the requested contiguous range, or
    /// mapping creation failed partway through.
    ResourceExhausted,
}

/// Opaque, non-owning back-reference to the device a descriptor belongs
/// to. Deliberately not a pointer: per the design notes, cleanup paths must
/// never dereference the device after its registry is destroyed, and a
/// plain handle cannot be dereferenced at all.
pub type DeviceHandle = u32;

/// A composed MSI message: the opaque (address, data) pair hardware is
/// told to write to trigger the vector. Its contents are not interpreted
/// by this core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MsiMessage {
    pub address: u64,
    pub data: u32,
}

/// One allocated MSI vector (§3, component B).
#[derive(Debug, Clone)]
pub struct MsiDesc {
    device: DeviceHandle,
    hwirq: IrqNumber,
    virq: IrqNumber,
    msi_attrib: u16,
    multiple: u8,
    msg: MsiMessage,
}

impl MsiDesc {
    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    pub fn hwirq(&self) -> IrqNumber {
        self.hwirq
    }

    pub fn virq(&self) -> IrqNumber {
        self.virq
    }

    pub fn msi_attrib(&self) -> u16 {
        self.msi_attrib
    }

    /// log2 of the block size this descriptor was allocated as part of.
    /// Only meaningful for descriptors produced by [`desc_alloc`]; vectors
    /// produced by [`alloc_vectors`] leave this at 0 (§4.1, §9).
    pub fn multiple(&self) -> u8 {
        self.multiple
    }
}

/// Allocate a single, detached descriptor for a block of `nvec` vectors.
///
/// This is the dormant legacy path described in §9: `alloc_vectors` does
/// not call it, and it does not participate in any registry. It exists so
/// callers that still need one head descriptor per block (rather than one
/// descriptor per vector) have somewhere to get it.
pub fn desc_alloc(device: DeviceHandle, nvec: u32) -> core::result::Result<MsiDesc, Error> {
    if nvec == 0 || nvec > MSI_MAX_VECTORS {
        return Err(Error::InvalidArgument);
    }

    let multiple = if nvec <= 1 {
        0
    } else {
        32 - (nvec - 1).leading_zeros()
    };

    Ok(MsiDesc {
        device,
        hwirq: 0,
        virq: 0,
        msi_attrib: 0,
        multiple: multiple as u8,
        msg: MsiMessage::default(),
    })
}

/// Find-first-set over a 32-bit word (§4.2): `0` if `x == 0`, otherwise
/// `1 + index_of_lowest_set_bit(x)`.
pub fn ffs(x: u32) -> u32 {
    if x == 0 {
        return 0;
    }

    let mut v = x;
    let mut n = 1u32;

    if v & 0x0000_ffff == 0 {
        v >>= 16;
        n += 16;
    }
    if v & 0x0000_00ff == 0 {
        v >>= 8;
        n += 8;
    }
    if v & 0x0000_000f == 0 {
        v >>= 4;
        n += 4;
    }
    if v & 0x0000_0003 == 0 {
        v >>= 2;
        n += 2;
    }
    if v & 0x0000_0001 == 0 {
        n += 1;
    }

    n
}

/// Per-device MSI registry (§4.3, component C). Backed by a plain `Vec`
/// under an IRQ-safe lock rather than an intrusive sentinel list — the
/// design notes call the sentinel an implementation choice, and exclusive
/// ownership makes the reference-count in §3 load-bearing only at
/// `desc_alloc` time (it is always 1; there is exactly one owner, the
/// registry).
pub struct MsiRegistry {
    descs: IrqSpinLock<Vec<MsiDesc>>,
}

impl MsiRegistry {
    /// `msi_device_init`: allocate an empty registry for a device.
    pub fn new() -> Self {
        Self {
            descs: IrqSpinLock::new(Vec::new()),
        }
    }

    /// Number of descriptors currently reachable from this registry.
    /// Invariant (§4.3): always equals the live descriptor count.
    pub fn num_vectors(&self) -> usize {
        self.descs.lock().len()
    }

    /// Append a descriptor while already holding the lock (`list_add_locked`
    /// in §4.3's terms) — used internally by [`alloc_vectors`], which holds
    /// the lock across the whole operation.
    fn list_add_locked(descs: &mut Vec<MsiDesc>, desc: MsiDesc) {
        descs.push(desc);
    }

    /// `msi_device_cleanup`: drain every descriptor. Safe to call on an
    /// already-empty registry. Does not touch the IRQ domain; callers that
    /// need the full hwirq/virq teardown want [`free_vectors`] instead.
    pub fn cleanup(&self) {
        self.descs.lock().clear();
    }

    /// Snapshot the live descriptors for inspection (used by drivers to
    /// find the descriptor for a given hwirq, and by tests).
    pub fn snapshot(&self) -> Vec<MsiDesc> {
        self.descs.lock().clone()
    }
}

impl Default for MsiRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Size selection (§4.4 step 1, see also the suspected-bug note in §9):
/// the largest power of two `<= max_vecs`.
fn largest_power_of_two_at_most(max_vecs: u32) -> u32 {
    let mut nvec = 1u32;
    while nvec.saturating_mul(2) <= max_vecs {
        nvec *= 2;
    }
    nvec
}

/// `alloc_vectors(device, min_vecs, max_vecs, flags) -> nvec | failure`
/// (§4.4, component D).
///
/// Reserves a contiguous hwirq range from `domain`, maps each hwirq to a
/// virq, and appends one descriptor per vector to `registry`. On any
/// failure partway through, every already-created mapping is disposed and
/// the hwirq range is released before returning — the registry and domain
/// are left exactly as they were found (§8 property 5).
pub fn alloc_vectors(
    device: DeviceHandle,
    registry: &MsiRegistry,
    domain: &IrqDomain,
    min_vecs: u32,
    max_vecs: u32,
    flags: u32,
) -> core::result::Result<u32, Error> {
    if min_vecs == 0 || min_vecs > max_vecs || max_vecs > MSI_MAX_VECTORS {
        return Err(Error::InvalidArgument);
    }

    let nvec = largest_power_of_two_at_most(max_vecs);
    if nvec < min_vecs {
        return Err(Error::InvalidArgument);
    }

    let msi_attrib = (flags & 0xffff) as u16;

    let mut descs = registry.descs.lock();

    let hwirq_base = domain
        .alloc_hwirq_range(nvec)
        .map_err(|_| Error::ResourceExhausted)?;

    let mut created: Vec<MsiDesc> = Vec::with_capacity(nvec as usize);

    for i in 0..nvec {
        let hwirq = hwirq_base + i;
        let virq = domain.create_mapping(hwirq);

        if virq == 0 {
            for desc in &created {
                domain.dispose_mapping(desc.virq());
            }
            domain.free_hwirq_range(hwirq_base, nvec);
            return Err(Error::ResourceExhausted);
        }

        created.push(MsiDesc {
            device,
            hwirq,
            virq,
            msi_attrib,
            multiple: 0,
            msg: MsiMessage::default(),
        });
    }

    for desc in created {
        MsiRegistry::list_add_locked(&mut descs, desc);
    }

    Ok(nvec)
}

/// `free_vectors(device)` (§4.4): tear down every descriptor in `registry`,
/// disposing its virq mapping and releasing its single-vector hwirq range.
/// Freeing one at a time is correct; batching the contiguous range this
/// allocation produced is a permitted optimization (§4.4) this
/// implementation does not take, since `alloc_vectors` does not record
/// block boundaries once descriptors are created.
pub fn free_vectors(registry: &MsiRegistry, domain: &IrqDomain) {
    let mut descs = registry.descs.lock();
    for desc in descs.drain(..) {
        domain.dispose_mapping(desc.virq);
        domain.free_hwirq_range(desc.hwirq, 1);
    }
}

/// Copy the descriptor's last composed message into a caller buffer.
pub fn compose_msg(desc: &MsiDesc) -> MsiMessage {
    desc.msg
}

/// Store a caller-supplied message on the descriptor.
pub fn write_msg(desc: &mut MsiDesc, msg: MsiMessage) {
    desc.msg = msg;
}

/// Mask (disable) the descriptor's virq. No-op if `virq == 0`.
pub fn mask_irq(domain: &IrqDomain, desc: &MsiDesc) {
    if desc.virq != 0 {
        domain.disable_irq_nosync(desc.virq);
    }
}

/// Unmask (enable) the descriptor's virq. No-op if `virq == 0`.
pub fn unmask_irq(domain: &IrqDomain, desc: &MsiDesc) {
    if desc.virq != 0 {
        domain.enable_irq(desc.virq);
    }
}

/// SMP affinity steering is a non-goal; this is a recognized stub that
/// always succeeds.
pub fn set_affinity(_desc: &MsiDesc, _cpu_mask: u64) -> crate::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicU32, Ordering};
    use test_case::test_case;

    struct NullChip {
        unmask_calls: AtomicU32,
        mask_calls: AtomicU32,
    }

    impl NullChip {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                unmask_calls: AtomicU32::new(0),
                mask_calls: AtomicU32::new(0),
            })
        }
    }

    impl super::super::IrqChip for NullChip {
        fn name(&self) -> &'static str {
            "null"
        }
        fn irq_unmask(&self, _hwirq: IrqNumber) {
            self.unmask_calls.fetch_add(1, Ordering::Relaxed);
        }
        fn irq_mask(&self, _hwirq: IrqNumber) {
            self.mask_calls.fetch_add(1, Ordering::Relaxed);
        }
        fn irq_ack(&self, _hwirq: IrqNumber) {}
    }

    fn domain(size: u32) -> IrqDomain {
        IrqDomain::create_linear(size, NullChip::new())
    }

    #[test]
    fn ffs_matches_contract() {
        assert_eq!(ffs(0), 0);
        for k in 0..32 {
            assert_eq!(ffs(1u32 << k), k + 1);
        }
        assert_eq!(ffs(0b1100), 3);
    }

    // Scenarios S1-S3, S6 (spec §8): rejected before any domain interaction.
    #[test_case(0, 5 => Err(Error::InvalidArgument); "S1 min is zero")]
    #[test_case(5, 4 => Err(Error::InvalidArgument); "S2 min greater than max")]
    #[test_case(33, 33 => Err(Error::InvalidArgument); "S3 exceeds MSI_MAX_VECTORS")]
    #[test_case(7, 7 => Err(Error::InvalidArgument); "S6 equal bounds not a power of two")]
    fn rejects_invalid_bounds(min_vecs: u32, max_vecs: u32) -> core::result::Result<u32, Error> {
        let d = domain(64);
        let r = MsiRegistry::new();
        alloc_vectors(1, &r, &d, min_vecs, max_vecs, 0)
    }

    // Scenarios S4, S5 (spec §8): size selection picks the largest power of
    // two that is still `<= max_vecs` and `>= min_vecs`.
    #[test_case(3, 7 => 4; "S4 largest power of two below max")]
    #[test_case(8, 15 => 8; "S5 max itself is a power of two")]
    fn picks_largest_power_of_two_in_range(min_vecs: u32, max_vecs: u32) -> u32 {
        let d = domain(64);
        let r = MsiRegistry::new();
        let n = alloc_vectors(1, &r, &d, min_vecs, max_vecs, 0).unwrap();
        assert_eq!(r.num_vectors() as u32, n);

        let descs = r.snapshot();
        for (i, desc) in descs.iter().enumerate() {
            assert_ne!(desc.virq(), 0);
            if i > 0 {
                assert_eq!(desc.hwirq(), descs[i - 1].hwirq() + 1);
            }
        }
        n
    }

    #[test]
    fn free_vectors_empties_registry() {
        let d = domain(64);
        let r = MsiRegistry::new();
        for _ in 0..100 {
            for &size in &[1u32, 2, 4, 8, 16] {
                alloc_vectors(3, &r, &d, size, size, 0).unwrap();
                free_vectors(&r, &d);
                assert_eq!(r.num_vectors(), 0);
            }
        }
    }

    #[test]
    fn rollback_on_domain_exhaustion_leaves_state_untouched() {
        let d = domain(4);
        let r = MsiRegistry::new();

        // Exhaust the domain so an 8-vector request cannot be satisfied.
        let base = d.alloc_hwirq_range(4).unwrap();
        assert_eq!(base, 0);

        let before = r.num_vectors();
        let result = alloc_vectors(1, &r, &d, 8, 8, 0);
        assert_eq!(result, Err(Error::ResourceExhausted));
        assert_eq!(r.num_vectors(), before);
    }

    #[test]
    fn desc_alloc_sets_multiple_and_is_not_wired_into_registry() {
        let desc = desc_alloc(7, 5).unwrap();
        assert_eq!(desc.multiple(), 3); // ceil(log2(5)) == 3
        assert_eq!(desc.hwirq(), 0);
        assert_eq!(desc.virq(), 0);
    }

    #[test]
    fn desc_alloc_rejects_out_of_range_nvec() {
        assert_eq!(desc_alloc(0, 0), Err(Error::InvalidArgument));
        assert_eq!(desc_alloc(0, 33), Err(Error::InvalidArgument));
    }
}
