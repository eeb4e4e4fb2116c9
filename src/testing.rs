//! Hardware test doubles.
//!
//! Minimal fakes implementing the `embedded-hal` traits so the acquisition
//! core can be exercised with no board attached: a scripted SPI bus, gate
//! pins that journal every level change (for the mutual-exclusion
//! property), a delay source that can stand in for the data-ready
//! interrupt, and an in-memory calibration store. Used by the crate's own
//! unit and integration tests; not part of the device API.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, SpiBus};

use crate::calibration::CalStorage;
use crate::ready::IrqFlag;
use crate::Error;

/// One chip-select or gate-pin level change, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinEvent {
    pub label: String,
    pub high: bool,
}

impl PinEvent {
    pub fn high(label: &str) -> Self {
        PinEvent {
            label: label.to_string(),
            high: true,
        }
    }

    pub fn low(label: &str) -> Self {
        PinEvent {
            label: label.to_string(),
            high: false,
        }
    }
}

/// Shared record of everything the code under test did to the hardware.
#[derive(Debug, Default)]
pub struct Journal {
    /// Bytes clocked out, one entry per CS frame.
    pub written: Vec<Vec<u8>>,
    /// Pin level changes across every fake pin, interleaved in call order.
    pub pin_events: Vec<PinEvent>,
    /// Number of `flush` calls on the bus.
    pub flushes: usize,
}

pub type SharedJournal = Rc<RefCell<Journal>>;

/// Error type the fakes report when scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeError;

impl spi::Error for FakeError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// Scripted SPI bus: records every outgoing frame in the journal and
/// answers transfers from a reply queue (zero-filled when the queue runs
/// dry, like an idle MISO line).
pub struct FakeSpi {
    journal: SharedJournal,
    replies: Rc<RefCell<VecDeque<Vec<u8>>>>,
    fail_next: Rc<Cell<bool>>,
}

impl FakeSpi {
    pub fn new() -> Self {
        FakeSpi {
            journal: Rc::new(RefCell::new(Journal::default())),
            replies: Rc::new(RefCell::new(VecDeque::new())),
            fail_next: Rc::new(Cell::new(false)),
        }
    }

    pub fn journal(&self) -> SharedJournal {
        Rc::clone(&self.journal)
    }

    /// Handle for queueing replies after the bus has been moved into the
    /// code under test.
    pub fn replies(&self) -> Rc<RefCell<VecDeque<Vec<u8>>>> {
        Rc::clone(&self.replies)
    }

    /// Queue the MISO bytes for the next full-duplex transfer.
    pub fn push_reply(&self, bytes: &[u8]) {
        self.replies.borrow_mut().push_back(bytes.to_vec());
    }

    /// Make the next bus operation fail.
    pub fn fail_next(&self) {
        self.fail_next.set(true);
    }

    fn check_fail(&self) -> Result<(), FakeError> {
        if self.fail_next.replace(false) {
            Err(FakeError)
        } else {
            Ok(())
        }
    }

    fn fill_reply(&self, read: &mut [u8]) {
        read.fill(0);
        if let Some(reply) = self.replies.borrow_mut().pop_front() {
            let n = reply.len().min(read.len());
            read[..n].copy_from_slice(&reply[..n]);
        }
    }
}

impl Default for FakeSpi {
    fn default() -> Self {
        FakeSpi::new()
    }
}

impl spi::ErrorType for FakeSpi {
    type Error = FakeError;
}

impl SpiBus<u8> for FakeSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), FakeError> {
        self.check_fail()?;
        self.fill_reply(words);
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), FakeError> {
        self.check_fail()?;
        self.journal.borrow_mut().written.push(words.to_vec());
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), FakeError> {
        self.check_fail()?;
        self.journal.borrow_mut().written.push(write.to_vec());
        self.fill_reply(read);
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), FakeError> {
        self.check_fail()?;
        self.journal.borrow_mut().written.push(words.to_vec());
        self.fill_reply(words);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FakeError> {
        self.journal.borrow_mut().flushes += 1;
        Ok(())
    }
}

/// Output pin that journals its level changes. Never fails, matching the
/// model in which GPIO writes cannot fault.
pub struct FakePin {
    journal: SharedJournal,
    label: String,
}

impl FakePin {
    pub fn new(journal: &SharedJournal, label: &str) -> Self {
        FakePin {
            journal: Rc::clone(journal),
            label: label.to_string(),
        }
    }
}

impl digital::ErrorType for FakePin {
    type Error = core::convert::Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.journal
            .borrow_mut()
            .pin_events
            .push(PinEvent::low(&self.label));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.journal
            .borrow_mut()
            .pin_events
            .push(PinEvent::high(&self.label));
        Ok(())
    }
}

/// Delay source that only accumulates the requested time. Optionally wired
/// to an [`IrqFlag`], which it raises on every call — standing in for an
/// ADC whose conversion completes while the driver sleeps. Without the
/// flag, the conversion "never finishes" and waits run to their timeout.
#[derive(Default)]
pub struct FakeDelay {
    slept_us: Rc<Cell<u64>>,
    raise: Option<Arc<IrqFlag>>,
}

impl FakeDelay {
    /// A delay that signals data-ready whenever the driver sleeps.
    pub fn raising(flag: Arc<IrqFlag>) -> Self {
        FakeDelay {
            slept_us: Rc::new(Cell::new(0)),
            raise: Some(flag),
        }
    }

    /// Shared counter of microseconds slept so far.
    pub fn slept_us(&self) -> Rc<Cell<u64>> {
        Rc::clone(&self.slept_us)
    }
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.slept_us.set(self.slept_us.get() + u64::from(ns) / 1_000);
        if let Some(flag) = &self.raise {
            flag.raise();
        }
    }
}

/// In-memory byte store with a write journal, standing in for the EEPROM.
pub struct MemStorage {
    bytes: Vec<u8>,
    writes: Vec<(u32, Vec<u8>)>,
}

impl MemStorage {
    pub fn new() -> Self {
        MemStorage {
            bytes: vec![0u8; 512],
            writes: Vec::new(),
        }
    }

    /// Every write performed, in order, as `(address, bytes)`.
    pub fn writes(&self) -> &[(u32, Vec<u8>)] {
        &self.writes
    }
}

impl Default for MemStorage {
    fn default() -> Self {
        MemStorage::new()
    }
}

impl CalStorage for MemStorage {
    fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        let start = addr as usize;
        let end = start + buf.len();
        if end > self.bytes.len() {
            return Err(Error::Storage);
        }
        buf.copy_from_slice(&self.bytes[start..end]);
        Ok(())
    }

    fn write_bytes(&mut self, addr: u32, bytes: &[u8]) -> Result<(), Error> {
        let start = addr as usize;
        let end = start + bytes.len();
        if end > self.bytes.len() {
            return Err(Error::Storage);
        }
        self.bytes[start..end].copy_from_slice(bytes);
        self.writes.push((addr, bytes.to_vec()));
        Ok(())
    }
}
