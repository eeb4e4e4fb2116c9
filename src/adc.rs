//! Low-level MCP3561R driver: register programming, input selection,
//! conversion control and the status+data read, all through the framed
//! [`SpiTransport`].

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::bus::{SpiTransport, SETTLE_INIT_US, SETTLE_SHORT_US};
use crate::decode::{self, DecodedSample};
use crate::registers;
use crate::Error;

pub struct Mcp3561<SPI, CS, D> {
    bus: SpiTransport<SPI, CS, D>,
}

impl<SPI, CS, D> Mcp3561<SPI, CS, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, cs: CS, delay: D) -> Result<Self, Error> {
        Ok(Mcp3561 {
            bus: SpiTransport::new(spi, cs, delay)?,
        })
    }

    /// Programs CONFIG0..IRQ and parks the mux on the thermistor inputs.
    /// One incremental-write frame; the ADC advances its register pointer
    /// after each byte.
    pub fn init(&mut self) -> Result<(), Error> {
        self.bus.write(&registers::init_sequence(), SETTLE_INIT_US)
    }

    pub fn select_thermistor_inputs(&mut self) -> Result<(), Error> {
        self.bus
            .write(&registers::select_thermistor_inputs(), SETTLE_SHORT_US)
    }

    pub fn select_internal_temp_input(&mut self) -> Result<(), Error> {
        self.bus
            .write(&registers::select_internal_temp_input(), SETTLE_SHORT_US)
    }

    pub fn select_reference_input(&mut self) -> Result<(), Error> {
        self.bus
            .write(&registers::select_reference_input(), SETTLE_SHORT_US)
    }

    /// Fast command: kick off a one-shot conversion. Completion is signalled
    /// on the IRQ pin; the coordinator owns the wait.
    pub fn start_conversion(&mut self) -> Result<(), Error> {
        self.bus.write(&registers::start_conversion(), 0)
    }

    /// Fast command: park the ADC in standby.
    pub fn standby(&mut self) -> Result<(), Error> {
        self.bus.write(&registers::standby(), 0)
    }

    /// One status+data word from the ADCDATA register.
    pub fn read_raw_word(&mut self) -> Result<u32, Error> {
        self.bus.transfer_word32(registers::read_data_word())
    }

    /// Status byte plus the current mux selection.
    pub fn read_mux_status(&mut self) -> Result<u16, Error> {
        self.bus.transfer_word16(registers::read_mux_status_word())
    }

    /// Reads and validates one conversion: data word, saturation check,
    /// provenance check against the mux register, sign extension.
    pub fn read_sample(&mut self) -> Result<DecodedSample, Error> {
        let raw = self.read_raw_word()?;
        let code = decode::mask_code(raw).map_err(Error::Invalid)?;
        let status = self.read_mux_status()?;
        let source = decode::classify_source(status).map_err(Error::Invalid)?;
        Ok(DecodedSample {
            source,
            code: decode::sign_extend_24(code),
        })
    }

    pub(crate) fn pause_us(&mut self, us: u32) {
        self.bus.pause_us(us);
    }

    pub fn free(self) -> (SPI, CS, D) {
        self.bus.free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{InvalidReading, SampleSource};
    use crate::testing::{FakeDelay, FakePin, FakeSpi};

    fn adc(spi: FakeSpi) -> Mcp3561<FakeSpi, FakePin, FakeDelay> {
        let journal = spi.journal();
        let cs = FakePin::new(&journal, "cs");
        Mcp3561::new(spi, cs, FakeDelay::default()).unwrap()
    }

    #[test]
    fn init_writes_the_full_register_block() {
        let spi = FakeSpi::new();
        let journal = spi.journal();
        let mut adc = adc(spi);
        adc.init().unwrap();
        assert_eq!(
            journal.borrow().written,
            vec![registers::init_sequence().to_vec()]
        );
    }

    #[test]
    fn read_sample_decodes_a_thermistor_word() {
        let spi = FakeSpi::new();
        spi.push_reply(&[0x17, 0x00, 0x00, 0x2A]); // data word
        spi.push_reply(&[0x17, 0x01]); // mux status: thermistors
        let mut adc = adc(spi);

        let sample = adc.read_sample().unwrap();
        assert_eq!(sample.source, SampleSource::Thermistor);
        assert_eq!(sample.code, 0x2A);
    }

    #[test]
    fn saturated_word_skips_the_status_read() {
        let spi = FakeSpi::new();
        spi.push_reply(&[0x17, 0x7F, 0xFF, 0xFF]);
        let journal = spi.journal();
        let mut adc = adc(spi);

        assert_eq!(
            adc.read_sample(),
            Err(Error::Invalid(InvalidReading::SaturatedHigh))
        );
        // Only the data-word transfer went out.
        assert_eq!(journal.borrow().written.len(), 1);
    }

    #[test]
    fn unknown_mux_status_is_invalid() {
        let spi = FakeSpi::new();
        spi.push_reply(&[0x17, 0x00, 0x00, 0x05]);
        spi.push_reply(&[0x17, 0xBC]); // reference inputs, not a sample source
        let mut adc = adc(spi);

        assert_eq!(
            adc.read_sample(),
            Err(Error::Invalid(InvalidReading::UnknownSource(0x17BC)))
        );
    }
}
