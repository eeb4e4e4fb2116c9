//! Raw-word decoding and validation.
//!
//! One conversion read returns a 32-bit word: status byte in the high 8
//! bits, 24-bit two's-complement code in the low 24. With 24-bit coding the
//! ADC locks the code to 0x7FFFFF / 0x800000 on overrange, so those two
//! values are saturation sentinels, never data. Sample provenance comes
//! from a secondary read of the mux register.

use crate::registers::{MUX_STATUS_INTERNAL, MUX_STATUS_THERMISTOR};

const CODE_MASK: u32 = 0x00FF_FFFF;
const SIGN_BIT: u32 = 0x0080_0000;
const SATURATED_HIGH: u32 = 0x007F_FFFF;
const SATURATED_LOW: u32 = 0x0080_0000;

/// Which physical input produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSource {
    /// The external thermistor divider on CH0/CH1.
    Thermistor,
    /// The ADC's internal temperature diodes.
    InternalSensor,
}

/// Why a raw word was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReading {
    /// Code locked at positive full scale: input above VREF, or channel
    /// disconnected.
    SaturatedHigh,
    /// Code locked at negative full scale.
    SaturatedLow,
    /// Mux-status readback matched neither known input selection.
    UnknownSource(u16),
    /// Code survived decoding but the transfer function produced a
    /// non-finite temperature (open or shorted divider).
    OutOfRange,
}

/// A validated, sign-extended sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedSample {
    pub source: SampleSource,
    /// 24-bit two's-complement code widened to i32.
    pub code: i32,
}

/// Strips the status byte, rejecting saturation sentinels.
pub fn mask_code(raw_word: u32) -> Result<u32, InvalidReading> {
    match raw_word & CODE_MASK {
        SATURATED_HIGH => Err(InvalidReading::SaturatedHigh),
        SATURATED_LOW => Err(InvalidReading::SaturatedLow),
        code => Ok(code),
    }
}

/// Maps the mux-status readback to a sample source.
pub fn classify_source(mux_status: u16) -> Result<SampleSource, InvalidReading> {
    match mux_status {
        MUX_STATUS_THERMISTOR => Ok(SampleSource::Thermistor),
        MUX_STATUS_INTERNAL => Ok(SampleSource::InternalSensor),
        other => Err(InvalidReading::UnknownSource(other)),
    }
}

/// Two's-complement sign extension of a 24-bit code.
pub fn sign_extend_24(code: u32) -> i32 {
    if code & SIGN_BIT != 0 {
        -(((code ^ CODE_MASK) + 1) as i32)
    } else {
        code as i32
    }
}

/// Pure composition of the two bus reads into a validated sample.
pub fn decode(raw_word: u32, mux_status: u16) -> Result<DecodedSample, InvalidReading> {
    let code = mask_code(raw_word)?;
    let source = classify_source(mux_status)?;
    Ok(DecodedSample {
        source,
        code: sign_extend_24(code),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extension_is_code_minus_2_pow_24() {
        // For every code with bit 23 set, decoded == code - 2^24.
        for code in [0x80_0001u32, 0xC0_0000, 0xFF_FFFF, 0xAB_CDEF, 0x93_1D07] {
            assert_eq!(sign_extend_24(code) as i64, code as i64 - (1i64 << 24));
        }
    }

    #[test]
    fn positive_codes_pass_through() {
        assert_eq!(sign_extend_24(0x00_0001), 1);
        assert_eq!(sign_extend_24(0x7F_FFFE), 0x7F_FFFE);
        assert_eq!(sign_extend_24(0), 0);
    }

    #[test]
    fn minus_one_round_trips() {
        assert_eq!(sign_extend_24(0xFF_FFFF), -1);
    }

    #[test]
    fn sentinels_never_yield_samples() {
        assert_eq!(mask_code(0x177F_FFFF), Err(InvalidReading::SaturatedHigh));
        assert_eq!(mask_code(0x1780_0000), Err(InvalidReading::SaturatedLow));
        // ...regardless of what the mux status claims.
        assert!(decode(0x007F_FFFF, MUX_STATUS_THERMISTOR).is_err());
        assert!(decode(0x0080_0000, MUX_STATUS_INTERNAL).is_err());
    }

    #[test]
    fn status_byte_is_ignored_by_masking() {
        assert_eq!(mask_code(0x1700_002A), Ok(0x2A));
        assert_eq!(mask_code(0xFF00_002A), Ok(0x2A));
    }

    #[test]
    fn provenance_follows_mux_status() {
        let s = decode(0x1700_0001, MUX_STATUS_THERMISTOR).unwrap();
        assert_eq!(s.source, SampleSource::Thermistor);
        assert_eq!(s.code, 1);

        let s = decode(0x1700_0001, MUX_STATUS_INTERNAL).unwrap();
        assert_eq!(s.source, SampleSource::InternalSensor);

        assert_eq!(
            decode(0x1700_0001, 0x1742),
            Err(InvalidReading::UnknownSource(0x1742))
        );
    }
}
