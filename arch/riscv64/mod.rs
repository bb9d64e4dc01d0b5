//! RISC-V top-level trap glue
//!
//! This is the thin sliver of `kerneltrap`-style dispatch this crate owns:
//! the supervisor-external-interrupt case. Everything else (timers,
//! software interrupts, exceptions) belongs to the kernel that embeds this
//! crate and is out of scope here.

use crate::drivers::platform::imsic;

/// Drain every interrupt currently pending on this hart's IMSIC file and
/// re-enter the generic handler for each, exactly like a `devintr()` drain
/// loop. Called from the kernel's supervisor-external-interrupt trap path.
///
/// Returns the number of interrupts dispatched, purely for statistics; the
/// caller has no reason to branch on it.
pub fn external_interrupt_entry() -> u32 {
    let mut dispatched = 0;
    if let Some(ctrl) = imsic::controller() {
        while ctrl.handle_irq() {
            dispatched += 1;
        }
    }
    dispatched
}

/// Enable the supervisor external interrupt line (`sie.SEIE`) on this hart.
/// Does not touch the IMSIC's own delivery/threshold state, which is
/// managed separately by the controller.
pub fn enable_external_interrupts() {
    #[cfg(target_arch = "riscv64")]
    unsafe {
        riscv::register::sie::set_sext();
    }
}

/// Disable the supervisor external interrupt line on this hart.
pub fn disable_external_interrupts() {
    #[cfg(target_arch = "riscv64")]
    unsafe {
        riscv::register::sie::clear_sext();
    }
}
