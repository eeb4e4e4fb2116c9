//! Per-channel calibration records and their non-volatile layout.
//!
//! Storage layout, byte addresses:
//!   0        completion flag, 0x01 = table valid
//!   1 + 8*ch offset (f32 LE) then gain (f32 LE) for channel ch
//!
//! The flag is written last on every persist, so a crash mid-sequence can
//! never leave a valid flag over a half-written table. Records are plain
//! fixed-width floats; an older digit-decomposition encoding lost precision
//! and sign and is not read or written.

use log::warn;

use crate::mux::CHANNEL_COUNT;
use crate::Error;

/// Address of the completion flag byte.
pub const FLAG_ADDR: u32 = 0;
/// Flag value marking the table as meaningful.
pub const FLAG_VALID: u8 = 0x01;
/// First byte of the packed record array.
pub const RECORD_BASE: u32 = 1;
/// Packed size of one channel record.
pub const RECORD_LEN: usize = 8;

/// Byte-level non-volatile storage. The EEPROM of the original board; a
/// fixed-size file on a Pi.
pub trait CalStorage {
    fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error>;
    fn write_bytes(&mut self, addr: u32, bytes: &[u8]) -> Result<(), Error>;
}

/// Offset/gain correction for one channel. Corrected reading is
/// `(raw + offset) / gain`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalRecord {
    pub offset: f32,
    pub gain: f32,
}

impl CalRecord {
    /// The identity correction.
    pub const IDENTITY: CalRecord = CalRecord {
        offset: 0.0,
        gain: 1.0,
    };

    /// Single-point correction against a known reference temperature.
    pub fn single_point(t_ref: f32, measured: f32) -> Self {
        CalRecord {
            offset: t_ref - measured,
            gain: 1.0,
        }
    }

    /// Upgrades a single-point offset with a gain term from a second
    /// reference point.
    pub fn with_gain_point(self, t2: f32, measured_at_t2: f32) -> Self {
        CalRecord {
            offset: self.offset,
            gain: (measured_at_t2 + self.offset) / t2,
        }
    }

    pub fn apply(&self, celsius: f32) -> f32 {
        (celsius + self.offset) / self.gain
    }

    fn to_bytes(self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[..4].copy_from_slice(&self.offset.to_le_bytes());
        out[4..].copy_from_slice(&self.gain.to_le_bytes());
        out
    }

    fn from_bytes(bytes: [u8; RECORD_LEN]) -> Self {
        CalRecord {
            offset: f32::from_le_bytes(bytes[..4].try_into().unwrap()),
            gain: f32::from_le_bytes(bytes[4..].try_into().unwrap()),
        }
    }

    /// A record is usable only if applying it keeps finite readings finite.
    pub(crate) fn is_sane(&self) -> bool {
        self.offset.is_finite() && self.gain.is_finite() && self.gain != 0.0
    }
}

/// In-memory view of the persisted table, read once at boot.
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    records: [CalRecord; CHANNEL_COUNT],
    calibrated: bool,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        CalibrationTable {
            records: [CalRecord::IDENTITY; CHANNEL_COUNT],
            calibrated: false,
        }
    }
}

impl CalibrationTable {
    /// Loads the persisted table. A missing flag means a plain uncalibrated
    /// device; a set flag over records that fail the sanity check is a
    /// storage-integrity fault, logged and treated as uncalibrated so
    /// acquisition can continue.
    pub fn load<S: CalStorage>(storage: &mut S) -> Result<Self, Error> {
        let mut flag = [0u8; 1];
        storage.read_bytes(FLAG_ADDR, &mut flag)?;
        if flag[0] != FLAG_VALID {
            return Ok(CalibrationTable::default());
        }

        let mut table = CalibrationTable::default();
        for ch in 0..CHANNEL_COUNT {
            let mut buf = [0u8; RECORD_LEN];
            storage.read_bytes(record_addr(ch), &mut buf)?;
            let record = CalRecord::from_bytes(buf);
            if !record.is_sane() {
                warn!("calibration record for channel {ch} failed sanity check, ignoring table");
                return Ok(CalibrationTable::default());
            }
            table.records[ch] = record;
        }
        table.calibrated = true;
        Ok(table)
    }

    /// Installs a full set of records and persists them, records first,
    /// completion flag last. Only after the flag write does the in-memory
    /// table switch to calibrated.
    pub fn persist<S: CalStorage>(
        &mut self,
        storage: &mut S,
        records: [CalRecord; CHANNEL_COUNT],
    ) -> Result<(), Error> {
        for (ch, record) in records.iter().enumerate() {
            storage.write_bytes(record_addr(ch), &record.to_bytes())?;
        }
        storage.write_bytes(FLAG_ADDR, &[FLAG_VALID])?;
        self.records = records;
        self.calibrated = true;
        Ok(())
    }

    /// Zeroes every record and the flag, synchronously, and drops back to
    /// uncorrected readings.
    pub fn clear<S: CalStorage>(&mut self, storage: &mut S) -> Result<(), Error> {
        for ch in 0..CHANNEL_COUNT {
            storage.write_bytes(record_addr(ch), &CalRecord::IDENTITY.to_bytes())?;
        }
        storage.write_bytes(FLAG_ADDR, &[0x00])?;
        *self = CalibrationTable::default();
        Ok(())
    }

    /// Applies the channel's correction, or passes the reading through on
    /// an uncalibrated device.
    pub fn apply(&self, channel: usize, celsius: f32) -> f32 {
        if self.calibrated {
            self.records[channel].apply(celsius)
        } else {
            celsius
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn record(&self, channel: usize) -> CalRecord {
        self.records[channel]
    }
}

/// Storage address of one channel's packed record.
pub fn record_addr(channel: usize) -> u32 {
    RECORD_BASE + (channel * RECORD_LEN) as u32
}

/// Offsets captured by the first pass of a two-point calibration. Nothing
/// is persisted until the second pass consumes this.
#[derive(Debug)]
pub struct OffsetPass {
    pub(crate) records: [Option<CalRecord>; CHANNEL_COUNT],
    /// Reference temperature of the first pass; the second pass must use a
    /// different one.
    pub(crate) t1: f32,
}

impl OffsetPass {
    /// Channels that produced no valid sample during the pass.
    pub fn missing_channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(ch, r)| r.is_none().then_some(ch))
    }
}
