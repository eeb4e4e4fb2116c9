//! The acquisition core: channel sequencing, conversion coordination,
//! averaging, calibration passes and the publish hand-off.
//!
//! One `AcquisitionContext` owns every shared table for the life of the
//! process — channel bank, calibration table, per-channel averages — and is
//! the only actor on the SPI bus. Per-channel faults are logged and skip
//! only that channel for that cycle; nothing here halts the other 31.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;
use log::{info, warn};

use crate::adc::Mcp3561;
use crate::average::RunningAverage;
use crate::calibration::{CalRecord, CalStorage, CalibrationTable, OffsetPass};
use crate::decode::{InvalidReading, SampleSource};
use crate::mux::{ChannelBank, CHANNEL_COUNT};
use crate::ready::IrqFlag;
use crate::temp_conversion::{InternalSensorProfile, ThermistorProfile};
use crate::Error;

/// Samples folded into each channel's average per acquisition cycle.
pub const AVERAGING_ROUNDS: u32 = 10;
/// Upper bound on waiting for the data-ready interrupt.
pub const DEFAULT_TIMEOUT_MS: u32 = 100;
/// Sleep per poll of the data-ready flag.
const POLL_INTERVAL_MS: u32 = 1;

/// Telemetry collaborator, called once per completed cycle. Message
/// encoding and broker connectivity live behind this seam.
pub trait Publisher {
    fn publish(&mut self, channels: &[Option<f32>; CHANNEL_COUNT], internal: Option<f32>);
}

/// Averaged, calibration-corrected output of one acquisition cycle.
/// `None` marks a channel with no valid sample this cycle.
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub channels: [Option<f32>; CHANNEL_COUNT],
    pub internal: Option<f32>,
}

pub struct AcquisitionContext<SPI, CS, P, D> {
    adc: Mcp3561<SPI, CS, D>,
    channels: ChannelBank<P>,
    ready: Arc<IrqFlag>,
    timeout_ms: u32,
    rounds: u32,
    thermistor_profile: ThermistorProfile,
    internal_profile: InternalSensorProfile,
    cal: CalibrationTable,
    averages: [RunningAverage; CHANNEL_COUNT],
    internal_average: RunningAverage,
}

impl<SPI, CS, P, D> AcquisitionContext<SPI, CS, P, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    P: OutputPin,
    D: DelayNs,
{
    /// Assembles the context around an already-constructed driver and
    /// channel bank. `ready` is the flag raised by the data-ready interrupt
    /// handler.
    pub fn new(
        adc: Mcp3561<SPI, CS, D>,
        channels: ChannelBank<P>,
        ready: Arc<IrqFlag>,
        thermistor_profile: ThermistorProfile,
        internal_profile: InternalSensorProfile,
    ) -> Self {
        AcquisitionContext {
            adc,
            channels,
            ready,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            rounds: AVERAGING_ROUNDS,
            thermistor_profile,
            internal_profile,
            cal: CalibrationTable::default(),
            averages: [RunningAverage::new(); CHANNEL_COUNT],
            internal_average: RunningAverage::new(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    /// Programs the ADC and parks every channel deselected.
    pub fn init(&mut self) -> Result<(), Error> {
        self.channels.deselect_all()?;
        self.adc.init()
    }

    /// Reads the persisted calibration table; done once at boot.
    pub fn load_calibration<S: CalStorage>(&mut self, storage: &mut S) -> Result<(), Error> {
        self.cal = CalibrationTable::load(storage)?;
        if self.cal.is_calibrated() {
            info!("loaded calibration table");
        } else {
            info!("device is uncalibrated, readings pass through");
        }
        Ok(())
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.cal
    }

    /// One full acquisition cycle: `rounds` averaging passes over all 32
    /// channels plus the internal sensor, then calibration correction.
    pub fn run_cycle(&mut self) -> CycleResult {
        for avg in self.averages.iter_mut() {
            avg.reset();
        }
        self.internal_average.reset();

        for _ in 0..self.rounds {
            if let Err(e) = self.adc.select_thermistor_inputs() {
                warn!("thermistor mux select failed: {e:?}");
                continue;
            }
            for ch in 0..CHANNEL_COUNT {
                match self.sample_channel(ch) {
                    Ok(celsius) => self.averages[ch].update(celsius),
                    Err(e) => warn!("channel {ch}: sample dropped ({e:?})"),
                }
            }
            if let Err(e) = self.channels.deselect_all() {
                warn!("channel deselect failed: {e:?}");
            }

            match self.sample_internal() {
                Ok(celsius) => self.internal_average.update(celsius),
                Err(e) => warn!("internal sensor: sample dropped ({e:?})"),
            }
        }

        let mut channels = [None; CHANNEL_COUNT];
        for ch in 0..CHANNEL_COUNT {
            channels[ch] = self.averages[ch]
                .value()
                .map(|celsius| self.cal.apply(ch, celsius));
        }
        CycleResult {
            channels,
            internal: self.internal_average.value(),
        }
    }

    /// One uncorrected reading from a single channel: mux select,
    /// conversion, decode, Celsius. Deselects the channel afterwards.
    pub fn read_channel(&mut self, channel: usize) -> Result<f32, Error> {
        self.adc.select_thermistor_inputs()?;
        let reading = self.sample_channel(channel);
        self.channels.deselect_all()?;
        reading
    }

    /// One uncorrected reading from the ADC's internal sensor.
    pub fn read_internal(&mut self) -> Result<f32, Error> {
        self.sample_internal()
    }

    /// Runs a cycle and hands the result to the telemetry collaborator.
    pub fn run_and_publish<T: Publisher>(&mut self, sink: &mut T) -> CycleResult {
        let result = self.run_cycle();
        sink.publish(&result.channels, result.internal);
        result
    }

    /// Single-point calibration: one pass over all channels at a known
    /// reference temperature, offsets persisted immediately.
    pub fn calibrate_single_point<S: CalStorage>(
        &mut self,
        storage: &mut S,
        t_ref: f32,
    ) -> Result<(), Error> {
        if !t_ref.is_finite() {
            return Err(Error::InvalidReference);
        }
        info!("single-point calibration at {t_ref:.2} C");
        let measured = self.measure_all_raw();
        let mut records = [CalRecord::IDENTITY; CHANNEL_COUNT];
        for (ch, m) in measured.iter().enumerate() {
            match m {
                Some(raw) => records[ch] = CalRecord::single_point(t_ref, *raw),
                None => warn!("channel {ch} missing during calibration, left uncorrected"),
            }
        }
        self.cal.persist(storage, records)
    }

    /// First pass of a two-point calibration, at reference temperature
    /// `t1`. Nothing is persisted and readings stay uncorrected until
    /// [`finish_two_point`](Self::finish_two_point) consumes the returned
    /// pass.
    pub fn begin_two_point(&mut self, t1: f32) -> OffsetPass {
        info!("two-point calibration, offset pass at {t1:.2} C");
        let measured = self.measure_all_raw();
        let mut records = [None; CHANNEL_COUNT];
        for (ch, m) in measured.iter().enumerate() {
            records[ch] = m.map(|raw| CalRecord::single_point(t1, raw));
        }
        OffsetPass { records, t1 }
    }

    /// Second pass at reference temperature `t2`; derives per-channel gain
    /// and persists the completed table, completion flag last.
    pub fn finish_two_point<S: CalStorage>(
        &mut self,
        pass: OffsetPass,
        storage: &mut S,
        t2: f32,
    ) -> Result<(), Error> {
        // A second bath at 0 C (or at the first bath's temperature) cannot
        // produce a gain; rejected before any bus traffic or persistence.
        if !t2.is_finite() || t2 == 0.0 || t2 == pass.t1 {
            return Err(Error::InvalidReference);
        }
        info!("two-point calibration, gain pass at {t2:.2} C");
        let measured = self.measure_all_raw();
        let mut records = [CalRecord::IDENTITY; CHANNEL_COUNT];
        for ch in 0..CHANNEL_COUNT {
            match (pass.records[ch], measured[ch]) {
                (Some(offset_record), Some(m2)) => {
                    let record = offset_record.with_gain_point(t2, m2);
                    if record.is_sane() {
                        records[ch] = record;
                    } else {
                        warn!("channel {ch}: degenerate gain, left uncorrected");
                    }
                }
                _ => warn!("channel {ch} missing during calibration, left uncorrected"),
            }
        }
        self.cal.persist(storage, records)
    }

    /// Zeroes the persisted table and flag synchronously; subsequent reads
    /// are uncorrected.
    pub fn clear_calibration<S: CalStorage>(&mut self, storage: &mut S) -> Result<(), Error> {
        self.cal.clear(storage)
    }

    // One uncorrected measurement per channel, used by the calibration
    // passes exactly as the sampling loop reads channels.
    fn measure_all_raw(&mut self) -> [Option<f32>; CHANNEL_COUNT] {
        let mut out = [None; CHANNEL_COUNT];
        if let Err(e) = self.adc.select_thermistor_inputs() {
            warn!("thermistor mux select failed: {e:?}");
            return out;
        }
        for ch in 0..CHANNEL_COUNT {
            match self.sample_channel(ch) {
                Ok(celsius) => out[ch] = Some(celsius),
                Err(e) => warn!("channel {ch}: sample dropped ({e:?})"),
            }
        }
        if let Err(e) = self.channels.deselect_all() {
            warn!("channel deselect failed: {e:?}");
        }
        out
    }

    fn sample_channel(&mut self, channel: usize) -> Result<f32, Error> {
        self.channels.select(channel)?;
        self.acquire_point()
    }

    fn sample_internal(&mut self) -> Result<f32, Error> {
        self.adc.select_internal_temp_input()?;
        self.acquire_point()
    }

    // Start a conversion and block on the data-ready flag, bounded. The
    // flag is cleared first so a stale signal from an aborted conversion
    // cannot satisfy this wait. `&mut self` keeps at most one conversion
    // outstanding.
    fn start_and_wait(&mut self) -> Result<(), Error> {
        self.ready.clear();
        self.adc.start_conversion()?;
        let mut waited_ms = 0;
        loop {
            if self.ready.take() {
                return Ok(());
            }
            if waited_ms >= self.timeout_ms {
                return Err(Error::ConversionTimeout);
            }
            self.adc.pause_us(POLL_INTERVAL_MS * 1_000);
            waited_ms += POLL_INTERVAL_MS;
        }
    }

    fn acquire_point(&mut self) -> Result<f32, Error> {
        self.start_and_wait()?;
        let sample = self.adc.read_sample()?;
        let celsius = match sample.source {
            SampleSource::Thermistor => self.thermistor_profile.celsius(sample.code),
            SampleSource::InternalSensor => self.internal_profile.celsius(sample.code),
        };
        if !celsius.is_finite() {
            return Err(Error::Invalid(InvalidReading::OutOfRange));
        }
        Ok(celsius)
    }

    /// Tears the context down into its hardware resources.
    pub fn free(self) -> (Mcp3561<SPI, CS, D>, ChannelBank<P>) {
        (self.adc, self.channels)
    }
}
