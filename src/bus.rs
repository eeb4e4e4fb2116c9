//! Chip-select-framed SPI transport.
//!
//! Every exchange with the ADC is one transaction: CS asserted (active low)
//! before the first clocked bit, deasserted after the last. The transport
//! also owns the small settling delays the MCP3561R needs after register
//! writes; bounded waiting for conversions lives in the acquisition layer,
//! never here.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::Error;

/// Settle time after a mux-select or fast-command write, in microseconds.
pub const SETTLE_SHORT_US: u32 = 1_000;
/// Settle time after programming the full configuration block.
pub const SETTLE_INIT_US: u32 = 10_000;

pub struct SpiTransport<SPI, CS, D> {
    spi: SPI,
    cs: CS,
    delay: D,
}

impl<SPI, CS, D> SpiTransport<SPI, CS, D>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
    D: DelayNs,
{
    /// Takes ownership of the bus, the chip-select pin and a delay source.
    /// CS is parked high (deasserted) immediately.
    pub fn new(spi: SPI, mut cs: CS, delay: D) -> Result<Self, Error> {
        cs.set_high().map_err(|_| Error::Gpio)?;
        Ok(SpiTransport { spi, cs, delay })
    }

    /// Write a command/payload frame, then hold off for `settle_us` so the
    /// ADC's register logic catches up before the next frame.
    pub fn write(&mut self, bytes: &[u8], settle_us: u32) -> Result<(), Error> {
        self.frame(|spi| spi.write(bytes))?;
        if settle_us > 0 {
            self.delay.delay_us(settle_us);
        }
        Ok(())
    }

    /// Full-duplex exchange: clocks `out` while filling `input` of the same
    /// length.
    pub fn transact(&mut self, out: &[u8], input: &mut [u8]) -> Result<(), Error> {
        self.frame(|spi| spi.transfer(input, out))
    }

    /// Clock a 32-bit command word out MSB-first and return the 32-bit reply.
    pub fn transfer_word32(&mut self, command: u32) -> Result<u32, Error> {
        let out = command.to_be_bytes();
        let mut input = [0u8; 4];
        self.transact(&out, &mut input)?;
        Ok(u32::from_be_bytes(input))
    }

    /// Clock a 16-bit command word out MSB-first and return the 16-bit reply.
    pub fn transfer_word16(&mut self, command: u16) -> Result<u16, Error> {
        let out = command.to_be_bytes();
        let mut input = [0u8; 2];
        self.transact(&out, &mut input)?;
        Ok(u16::from_be_bytes(input))
    }

    /// Pause the caller for `us` microseconds using the transport's delay
    /// source. Used by the acquisition layer for its poll loop.
    pub fn pause_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }

    /// Releases the bus, CS pin and delay source.
    pub fn free(self) -> (SPI, CS, D) {
        (self.spi, self.cs, self.delay)
    }

    // The bus is flushed before CS rises, so the last bit is on the wire
    // while the ADC is still selected. CS is deasserted on the error path
    // too, so a failed transfer never leaves the ADC selected into the
    // next frame.
    fn frame<F>(&mut self, op: F) -> Result<(), Error>
    where
        F: FnOnce(&mut SPI) -> Result<(), SPI::Error>,
    {
        self.cs.set_low().map_err(|_| Error::Gpio)?;
        let res = op(&mut self.spi)
            .and_then(|_| self.spi.flush())
            .map_err(|_| Error::Spi);
        self.cs.set_high().map_err(|_| Error::Gpio)?;
        res
    }
}
