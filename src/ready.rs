//! Data-ready signalling between the IRQ handler and the sampling loop.

use std::sync::atomic::{AtomicBool, Ordering};

/// Single-writer/single-reader data-ready flag.
///
/// The interrupt side does nothing but [`raise`](IrqFlag::raise) — no bus
/// traffic, no computation — so a handler firing mid-transaction cannot
/// corrupt the SPI exchange in progress. The sampling loop consumes the
/// signal with [`take`](IrqFlag::take).
#[derive(Debug, Default)]
pub struct IrqFlag {
    ready: AtomicBool,
}

impl IrqFlag {
    pub const fn new() -> Self {
        IrqFlag {
            ready: AtomicBool::new(false),
        }
    }

    /// Signal data-ready. Safe to call from an interrupt callback thread.
    pub fn raise(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Consume the signal if present.
    pub fn take(&self) -> bool {
        self.ready.swap(false, Ordering::AcqRel)
    }

    /// Drop any stale signal, e.g. right before arming a new conversion.
    pub fn clear(&self) {
        self.ready.store(false, Ordering::Release);
    }
}
