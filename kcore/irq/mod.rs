//! IRQ-domain core
//!
//! A minimal `hwirq -> virq` namespace, modeled on the Linux-style
//! `irq_domain_*`/`irq_desc` surface this crate's MSI allocator and IMSIC
//! driver are specified against (§6). Only a **linear** domain is
//! implemented: `virq`s are densely packed and `virq = hwirq + 1`, which
//! keeps `virq == 0` free to mean "unmapped" without a side table.

pub mod msi;

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::kcore::sync::SpinLock;
use crate::Result;

/// Interrupt number type, shared by hardware IDs and virtual IRQs.
pub type IrqNumber = u32;

/// IRQ-domain subsystem error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Hwirq or virq argument out of range for the domain.
    InvalidArgument,
    /// No contiguous free range of the requested size exists.
    RangeExhausted,
    /// The referenced virq has no descriptor (never mapped, or disposed).
    NotMapped,
}

/// IRQ-chip vtable: the operations a controller exposes over a mapped
/// hardware interrupt. Implemented once by the IMSIC controller (§4.5).
pub trait IrqChip: Send + Sync {
    /// Chip name, for diagnostics.
    fn name(&self) -> &'static str;
    /// Unmask / enable delivery of `hwirq`.
    fn irq_unmask(&self, hwirq: IrqNumber);
    /// Mask / disable delivery of `hwirq`.
    fn irq_mask(&self, hwirq: IrqNumber);
    /// Acknowledge `hwirq`, clearing its pending state.
    fn irq_ack(&self, hwirq: IrqNumber);
}

/// Per-hwirq bookkeeping inside a domain.
struct DomainEntry {
    mapped: bool,
    reserved: bool,
    enabled: bool,
    handler: Option<Arc<dyn Fn(IrqNumber) + Send + Sync>>,
}

impl DomainEntry {
    const fn new() -> Self {
        Self {
            mapped: false,
            reserved: false,
            enabled: false,
            handler: None,
        }
    }
}

/// A linear IRQ domain of fixed size, as created by
/// `irq_domain_create_linear` in §6.
pub struct IrqDomain {
    size: u32,
    entries: SpinLock<Vec<DomainEntry>>,
    chip: Arc<dyn IrqChip>,
}

impl IrqDomain {
    /// Create a linear domain of `size` hwirqs, `[0, size)`, backed by
    /// `chip`.
    pub fn create_linear(size: u32, chip: Arc<dyn IrqChip>) -> Self {
        let mut entries = Vec::with_capacity(size as usize);
        for _ in 0..size {
            entries.push(DomainEntry::new());
        }
        Self {
            size,
            entries: SpinLock::new(entries),
            chip,
        }
    }

    /// Domain size (number of hwirqs it can map).
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Reserve `n` consecutive, currently-unreserved hwirqs. Returns the
    /// base hwirq of the range.
    pub fn alloc_hwirq_range(&self, n: u32) -> core::result::Result<IrqNumber, Error> {
        if n == 0 || n > self.size {
            return Err(Error::InvalidArgument);
        }

        let mut entries = self.entries.lock();
        let n = n as usize;
        let mut run_start = 0usize;
        let mut run_len = 0usize;

        for i in 0..entries.len() {
            if !entries[i].reserved {
                if run_len == 0 {
                    run_start = i;
                }
                run_len += 1;
                if run_len == n {
                    for e in entries[run_start..run_start + n].iter_mut() {
                        e.reserved = true;
                    }
                    return Ok(run_start as IrqNumber);
                }
            } else {
                run_len = 0;
            }
        }

        Err(Error::RangeExhausted)
    }

    /// Release a previously reserved inclusive range `[base, base+n)`.
    pub fn free_hwirq_range(&self, base: IrqNumber, n: u32) {
        let mut entries = self.entries.lock();
        let base = base as usize;
        let n = n as usize;
        if base + n > entries.len() {
            return;
        }
        for e in entries[base..base + n].iter_mut() {
            e.reserved = false;
        }
    }

    /// Create (or return the existing) virq mapping for `hwirq`.
    /// Returns 0 on failure, matching the external contract in §6.
    pub fn create_mapping(&self, hwirq: IrqNumber) -> IrqNumber {
        if hwirq >= self.size {
            return 0;
        }

        let mut entries = self.entries.lock();
        let idx = hwirq as usize;
        if entries[idx].mapped {
            return hwirq + 1;
        }

        entries[idx].mapped = true;
        entries[idx].enabled = true;
        hwirq + 1
    }

    /// Tear down the mapping for `virq`. Safe to call after `create_mapping`,
    /// or on an already-unmapped `virq`.
    pub fn dispose_mapping(&self, virq: IrqNumber) {
        if virq == 0 {
            return;
        }
        let hwirq = virq - 1;
        if hwirq >= self.size {
            return;
        }
        let mut entries = self.entries.lock();
        entries[hwirq as usize] = DomainEntry::new();
    }

    /// Look up the virq mapped to `hwirq`, or 0 if none.
    pub fn find_mapping(&self, hwirq: IrqNumber) -> IrqNumber {
        if hwirq >= self.size {
            return 0;
        }
        let entries = self.entries.lock();
        if entries[hwirq as usize].mapped {
            hwirq + 1
        } else {
            0
        }
    }

    /// Install the handler invoked by [`generic_handle_irq`] for `virq`.
    pub fn set_handler<F>(&self, virq: IrqNumber, handler: F) -> Result<()>
    where
        F: Fn(IrqNumber) + Send + Sync + 'static,
    {
        if virq == 0 {
            return Err(crate::Error::Core(crate::kcore::Error::Irq(Error::InvalidArgument)));
        }
        let hwirq = virq - 1;
        if hwirq >= self.size {
            return Err(crate::Error::Core(crate::kcore::Error::Irq(Error::InvalidArgument)));
        }
        let mut entries = self.entries.lock();
        if !entries[hwirq as usize].mapped {
            return Err(crate::Error::Core(crate::kcore::Error::Irq(Error::NotMapped)));
        }
        entries[hwirq as usize].handler = Some(Arc::new(handler));
        Ok(())
    }

    /// Invoke the installed handler for `virq`, if any. Used by the
    /// top-level dispatch path.
    pub fn generic_handle_irq(&self, virq: IrqNumber) {
        if virq == 0 {
            return;
        }
        let hwirq = virq - 1;
        if hwirq >= self.size {
            return;
        }
        let handler = {
            let entries = self.entries.lock();
            entries[hwirq as usize].handler.clone()
        };
        if let Some(handler) = handler {
            handler(virq);
        }
    }

    /// Unmask `virq` at the chip (standard IRQ-chip `enable`/`unmask`).
    pub fn enable_irq(&self, virq: IrqNumber) {
        if virq == 0 {
            return;
        }
        let hwirq = virq - 1;
        if hwirq >= self.size {
            return;
        }
        {
            let mut entries = self.entries.lock();
            if !entries[hwirq as usize].mapped {
                return;
            }
            entries[hwirq as usize].enabled = true;
        }
        self.chip.irq_unmask(hwirq);
    }

    /// Mask `virq` at the chip without waiting for in-flight handlers to
    /// drain (standard IRQ-chip `disable`/`mask`).
    pub fn disable_irq_nosync(&self, virq: IrqNumber) {
        if virq == 0 {
            return;
        }
        let hwirq = virq - 1;
        if hwirq >= self.size {
            return;
        }
        {
            let mut entries = self.entries.lock();
            if !entries[hwirq as usize].mapped {
                return;
            }
            entries[hwirq as usize].enabled = false;
        }
        self.chip.irq_mask(hwirq);
    }

    /// The chip backing this domain, for drivers that need direct access
    /// (e.g. to acknowledge a hwirq during dispatch).
    pub fn chip(&self) -> &Arc<dyn IrqChip> {
        &self.chip
    }
}

/// Initialize interrupt handling. There is no global domain owned by this
/// module: domains are created by chip drivers (the IMSIC controller owns
/// one, per §4.5) and threaded through explicitly.
pub fn init() -> Result<()> {
    Ok(())
}
