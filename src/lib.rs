//! A 32-channel thermistor multiplexer driver built around the MCP3561R
//! delta-sigma ADC (Raspberry Pi focus)
//!
//! # References
//! - MCP3561R datasheet: https://www.microchip.com/en-us/product/MCP3561R
//! - TT7-10KC3 thermistor datasheet: https://www.tme.eu/Document/32a31570f1c819f9b3730213e5eca259/TT7-10KC3-11.pdf
//!
//! Thirty-two thermistors share one ADC input pair through MOSFET-gated
//! dividers; the driver walks the gate lines one at a time, triggers
//! one-shot conversions, waits on the ADC's data-ready interrupt, validates
//! and sign-extends the 24-bit codes, converts to Celsius, averages
//! repeated samples, and applies per-channel calibration persisted in
//! byte-addressed storage.
//!
//! The acquisition core ([`AcquisitionContext`]) is generic over the
//! `embedded-hal` SPI/GPIO/delay traits and carries no Pi dependency; the
//! [`mux_reader::MuxReader`] wrapper binds it to real hardware through
//! `rppal`.

use embedded_hal::spi::{Mode, MODE_0};

mod acquisition;
mod adc;
mod average;
mod bus;
mod calibration;
mod decode;
mod mux;
mod ready;
pub mod registers;
mod temp_conversion;
pub mod testing;

pub use acquisition::{
    AcquisitionContext, CycleResult, Publisher, AVERAGING_ROUNDS, DEFAULT_TIMEOUT_MS,
};
pub use adc::Mcp3561;
pub use average::RunningAverage;
pub use bus::SpiTransport;
pub use calibration::{CalRecord, CalStorage, CalibrationTable, OffsetPass};
pub use decode::{DecodedSample, InvalidReading, SampleSource};
pub use mux::{ChannelBank, CHANNEL_COUNT};
pub use ready::IrqFlag;
pub use temp_conversion::{fahrenheit, Fit, InternalSensorProfile, ThermistorProfile};

/// SPI mode (CPOL = 0, CPHA = 0).
pub const MODE: Mode = MODE_0;

/// SPI clock rate, per the board's ADC wiring.
pub const BUS_SPEED_HZ: u32 = 5_000_000;

/// Highest board ID expressible on the five ID jumpers.
pub const MAX_BOARD_ID: u8 = 31;

/// Errors raised inside the generic acquisition core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// SPI transfer to/from the ADC failed.
    Spi,
    /// Setting a GPIO level failed.
    Gpio,
    /// Channel index outside [0, 31].
    InvalidChannel,
    /// The data-ready interrupt never arrived within the wait bound.
    ConversionTimeout,
    /// The conversion produced no usable sample.
    Invalid(InvalidReading),
    /// Calibration reference temperatures cannot produce a usable
    /// correction (zero, non-finite, or coinciding with the first pass).
    InvalidReference,
    /// Byte-level calibration storage access failed.
    Storage,
}

/// Errors reported by the public [`mux_reader::MuxReader`] API.
#[derive(Debug)]
pub enum MuxError {
    /// Hardware bring-up failed.
    Init(String),
    /// An SPI or GPIO exchange failed mid-operation.
    Bus(String),
    /// A conversion timed out waiting for the data-ready interrupt.
    Timeout,
    /// A sample was rejected by the decoder.
    Invalid(InvalidReading),
    /// A calibration pass was given unusable reference temperatures.
    Calibration(String),
    /// Calibration persistence failed.
    Storage(String),
    /// Invalid board configuration (bad ID jumpers). Fatal at boot.
    Config(String),
}

/// Inverted-sense jumper decode: ID pins are pulled up, so a grounded pin
/// reads low and contributes a set bit.
pub fn decode_id_pins(pin_is_low: [bool; 5]) -> u8 {
    pin_is_low
        .iter()
        .enumerate()
        .fold(0u8, |id, (bit, &low)| id | ((low as u8) << bit))
}

// Public simplified wrapper API for the Raspberry Pi.
pub mod mux_reader {
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use rppal::gpio::{Gpio, InputPin as GpioInputPin, OutputPin as GpioOutputPin, Trigger};
    use rppal::hal::Delay;
    use rppal::spi::{Bus, Mode as SpiMode, SlaveSelect, Spi};

    use crate::acquisition::{AcquisitionContext, CycleResult, Publisher};
    use crate::calibration::{CalStorage, OffsetPass};
    use crate::mux::{ChannelBank, CHANNEL_COUNT};
    use crate::ready::IrqFlag;
    use crate::temp_conversion::{InternalSensorProfile, ThermistorProfile};
    use crate::{decode_id_pins, Error, Mcp3561, MuxError, BUS_SPEED_HZ, MAX_BOARD_ID};

    /// Wiring and profile configuration for one mux board.
    #[derive(Debug, Clone)]
    pub struct MuxConfig {
        /// Chip-select GPIO (BCM), active low.
        pub cs_pin: u8,
        /// ADC IRQ GPIO (BCM), pulled up, falling edge on data-ready.
        pub irq_pin: u8,
        /// Board-ID jumper GPIOs (BCM), pulled up, inverted sense.
        pub id_pins: [u8; 5],
        /// The 32 MOSFET gate GPIOs in channel order.
        pub channel_pins: [u8; CHANNEL_COUNT],
        pub thermistor: ThermistorProfile,
        pub internal: InternalSensorProfile,
        /// Calibration store backing file.
        pub storage_path: PathBuf,
    }

    /// High-level interface for the Raspberry Pi. Hides SPI/GPIO setup, the
    /// IRQ wiring and calibration persistence.
    pub struct MuxReader {
        ctx: AcquisitionContext<Spi, GpioOutputPin, GpioOutputPin, Delay>,
        storage: FileStorage,
        hardware_id: u8,
        // Dropping the pin would detach the async interrupt.
        _irq_pin: GpioInputPin,
    }

    impl MuxReader {
        /// Brings up the board: SPI0 in mode 0 at 5 MHz, CS parked high,
        /// all 32 gates low, IRQ armed, ADC registers programmed,
        /// calibration table loaded. Reads the board-ID jumpers once; an
        /// out-of-range ID is fatal since telemetry identity cannot be
        /// derived from it.
        pub fn new(config: MuxConfig) -> Result<Self, MuxError> {
            let gpio =
                Gpio::new().map_err(|e| MuxError::Init(format!("GPIO init failed: {}", e)))?;

            let hardware_id = read_hardware_id(&gpio, config.id_pins)?;

            let cs = gpio
                .get(config.cs_pin)
                .map_err(|e| MuxError::Init(format!("CS pin {} invalid: {}", config.cs_pin, e)))?
                .into_output_high();
            let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, BUS_SPEED_HZ, SpiMode::Mode0)
                .map_err(|e| MuxError::Init(format!("SPI init failed: {}", e)))?;
            let adc = Mcp3561::new(spi, cs, Delay::new()).map_err(map_core_error)?;

            let mut gates = Vec::with_capacity(CHANNEL_COUNT);
            for &pin in config.channel_pins.iter() {
                let gate = gpio
                    .get(pin)
                    .map_err(|e| MuxError::Init(format!("channel pin {} invalid: {}", pin, e)))?
                    .into_output_low();
                gates.push(gate);
            }
            let gates: [GpioOutputPin; CHANNEL_COUNT] = gates
                .try_into()
                .map_err(|_| MuxError::Init("channel pin table incomplete".to_string()))?;
            let channels = ChannelBank::new(gates).map_err(map_core_error)?;

            let ready = Arc::new(IrqFlag::new());
            let mut irq_pin = gpio
                .get(config.irq_pin)
                .map_err(|e| MuxError::Init(format!("IRQ pin {} invalid: {}", config.irq_pin, e)))?
                .into_input_pullup();
            let isr_flag = Arc::clone(&ready);
            irq_pin
                .set_async_interrupt(Trigger::FallingEdge, None, move |_| isr_flag.raise())
                .map_err(|e| MuxError::Init(format!("IRQ setup failed: {}", e)))?;

            let mut storage = FileStorage::open(&config.storage_path)?;

            let mut ctx =
                AcquisitionContext::new(adc, channels, ready, config.thermistor, config.internal);
            ctx.init().map_err(map_core_error)?;
            ctx.load_calibration(&mut storage).map_err(map_core_error)?;

            Ok(MuxReader {
                ctx,
                storage,
                hardware_id,
                _irq_pin: irq_pin,
            })
        }

        /// Board identity from the ID jumpers, for telemetry naming.
        pub fn hardware_id(&self) -> u8 {
            self.hardware_id
        }

        pub fn is_calibrated(&self) -> bool {
            self.ctx.calibration().is_calibrated()
        }

        /// One full averaged, calibration-corrected acquisition cycle.
        pub fn run_cycle(&mut self) -> CycleResult {
            self.ctx.run_cycle()
        }

        /// One cycle, handed to the telemetry collaborator.
        pub fn run_and_publish<T: Publisher>(&mut self, sink: &mut T) -> CycleResult {
            self.ctx.run_and_publish(sink)
        }

        /// Single-point calibration against a bath at `t_ref` Celsius.
        pub fn calibrate(&mut self, t_ref: f32) -> Result<(), MuxError> {
            self.ctx
                .calibrate_single_point(&mut self.storage, t_ref)
                .map_err(map_core_error)
        }

        /// Offset pass of a two-point calibration (typically an ice bath at
        /// 0 C). Nothing persists until [`finish_two_point`](Self::finish_two_point).
        pub fn begin_two_point(&mut self, t1: f32) -> OffsetPass {
            self.ctx.begin_two_point(t1)
        }

        /// Gain pass at the second reference temperature; persists the
        /// completed table.
        pub fn finish_two_point(&mut self, pass: OffsetPass, t2: f32) -> Result<(), MuxError> {
            self.ctx
                .finish_two_point(pass, &mut self.storage, t2)
                .map_err(map_core_error)
        }

        /// Zeroes the persisted calibration table and flag before returning.
        pub fn clear_calibration(&mut self) -> Result<(), MuxError> {
            self.ctx
                .clear_calibration(&mut self.storage)
                .map_err(map_core_error)
        }
    }

    fn read_hardware_id(gpio: &Gpio, id_pins: [u8; 5]) -> Result<u8, MuxError> {
        let mut inputs = Vec::with_capacity(id_pins.len());
        for &pin in id_pins.iter() {
            let input = gpio
                .get(pin)
                .map_err(|e| MuxError::Init(format!("ID pin {} invalid: {}", pin, e)))?
                .into_input_pullup();
            inputs.push(input);
        }
        // Let the pull-ups settle before the one-shot read.
        std::thread::sleep(std::time::Duration::from_millis(1));
        let mut levels = [false; 5];
        for (slot, input) in inputs.iter().enumerate() {
            levels[slot] = input.is_low();
        }
        let id = decode_id_pins(levels);
        if id > MAX_BOARD_ID {
            return Err(MuxError::Config(format!(
                "invalid board ID {} detected, check jumpers",
                id
            )));
        }
        Ok(id)
    }

    /// Map internal low-level errors to public MuxError.
    fn map_core_error(e: Error) -> MuxError {
        match e {
            Error::Spi => MuxError::Bus("SPI transfer failed".to_string()),
            Error::Gpio => MuxError::Bus("GPIO write failed".to_string()),
            Error::InvalidChannel => MuxError::Bus("channel index out of range".to_string()),
            Error::ConversionTimeout => MuxError::Timeout,
            Error::Invalid(reading) => MuxError::Invalid(reading),
            Error::InvalidReference => MuxError::Calibration(
                "reference temperatures cannot produce a usable correction".to_string(),
            ),
            Error::Storage => MuxError::Storage("calibration storage access failed".to_string()),
        }
    }

    /// Fixed-size file standing in for the original board's EEPROM.
    pub struct FileStorage {
        file: File,
    }

    // Flag byte plus 32 packed records, rounded up.
    const STORAGE_SIZE: u64 = 512;

    impl FileStorage {
        pub fn open(path: &Path) -> Result<Self, MuxError> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)
                .map_err(|e| MuxError::Storage(format!("open {} failed: {}", path.display(), e)))?;
            let len = file
                .metadata()
                .map_err(|e| MuxError::Storage(format!("stat failed: {}", e)))?
                .len();
            if len < STORAGE_SIZE {
                file.set_len(STORAGE_SIZE)
                    .map_err(|e| MuxError::Storage(format!("resize failed: {}", e)))?;
            }
            Ok(FileStorage { file })
        }
    }

    impl CalStorage for FileStorage {
        fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
            self.file
                .seek(SeekFrom::Start(u64::from(addr)))
                .and_then(|_| self.file.read_exact(buf))
                .map_err(|_| Error::Storage)
        }

        fn write_bytes(&mut self, addr: u32, bytes: &[u8]) -> Result<(), Error> {
            self.file
                .seek(SeekFrom::Start(u64::from(addr)))
                .and_then(|_| self.file.write_all(bytes))
                .and_then(|_| self.file.sync_data())
                .map_err(|_| Error::Storage)
        }
    }
}

pub use mux_reader::{MuxConfig, MuxReader};
