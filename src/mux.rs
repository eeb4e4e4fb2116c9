//! Channel-select control for the 32 MOSFET gate lines.
//!
//! Each thermistor is routed into the ADC's analog front end by driving one
//! gate line HIGH. Two lines conducting at once puts two dividers in
//! parallel and corrupts the reading, so the bank enforces that the old
//! channel is driven LOW before the new one goes HIGH.

use embedded_hal::digital::OutputPin;

use crate::Error;

/// Number of multiplexed thermistor channels.
pub const CHANNEL_COUNT: usize = 32;

pub struct ChannelBank<P> {
    pins: [P; CHANNEL_COUNT],
    active: Option<usize>,
}

impl<P: OutputPin> ChannelBank<P> {
    /// Takes ownership of the 32 gate pins and drives them all LOW.
    pub fn new(pins: [P; CHANNEL_COUNT]) -> Result<Self, Error> {
        let mut bank = ChannelBank { pins, active: None };
        bank.deselect_all()?;
        Ok(bank)
    }

    /// Routes exactly one channel into the ADC. Idempotent: re-selecting the
    /// active channel leaves the pins untouched.
    pub fn select(&mut self, channel: usize) -> Result<(), Error> {
        if channel >= CHANNEL_COUNT {
            return Err(Error::InvalidChannel);
        }
        if self.active == Some(channel) {
            return Ok(());
        }
        // Break-before-make: the previous gate must stop conducting before
        // the new one opens.
        if let Some(prev) = self.active.take() {
            self.pins[prev].set_low().map_err(|_| Error::Gpio)?;
        }
        self.pins[channel].set_high().map_err(|_| Error::Gpio)?;
        self.active = Some(channel);
        Ok(())
    }

    /// Forces every gate line LOW.
    pub fn deselect_all(&mut self) -> Result<(), Error> {
        for pin in self.pins.iter_mut() {
            pin.set_low().map_err(|_| Error::Gpio)?;
        }
        self.active = None;
        Ok(())
    }

    /// Channel currently conducting, if any.
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Releases the pins.
    pub fn free(self) -> [P; CHANNEL_COUNT] {
        self.pins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePin, Journal};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn bank(journal: &Rc<RefCell<Journal>>) -> ChannelBank<FakePin> {
        let pins: [FakePin; CHANNEL_COUNT] =
            core::array::from_fn(|i| FakePin::new(journal, &format!("ch{i}")));
        ChannelBank::new(pins).unwrap()
    }

    // Replays the recorded pin events and asserts the invariant at every
    // instant: never more than one gate HIGH.
    fn assert_mutual_exclusion(journal: &Rc<RefCell<Journal>>) {
        let mut high: Vec<String> = Vec::new();
        for ev in &journal.borrow().pin_events {
            if ev.high {
                if !high.contains(&ev.label) {
                    high.push(ev.label.clone());
                }
            } else {
                high.retain(|l| l != &ev.label);
            }
            assert!(
                high.len() <= 1,
                "channels conducting simultaneously: {high:?}"
            );
        }
    }

    #[test]
    fn at_most_one_channel_high_across_call_sequences() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let mut bank = bank(&journal);
        for ch in [0usize, 5, 5, 31, 1, 0] {
            bank.select(ch).unwrap();
            assert_eq!(bank.active(), Some(ch));
        }
        bank.deselect_all().unwrap();
        bank.select(7).unwrap();
        assert_mutual_exclusion(&journal);
    }

    #[test]
    fn reselect_is_idempotent() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let mut bank = bank(&journal);
        bank.select(3).unwrap();
        let events_before = journal.borrow().pin_events.len();
        bank.select(3).unwrap();
        assert_eq!(journal.borrow().pin_events.len(), events_before);
    }

    #[test]
    fn out_of_range_channel_is_rejected() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let mut bank = bank(&journal);
        assert_eq!(bank.select(32), Err(Error::InvalidChannel));
        assert_eq!(bank.active(), None);
    }

    #[test]
    fn new_parks_every_gate_low() {
        let journal = Rc::new(RefCell::new(Journal::default()));
        let _bank = bank(&journal);
        let journal = journal.borrow();
        assert_eq!(journal.pin_events.len(), CHANNEL_COUNT);
        assert!(journal.pin_events.iter().all(|ev| !ev.high));
    }
}
