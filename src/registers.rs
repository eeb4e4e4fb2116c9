//! MCP3561R command bytes and register values.
//!
//! Command byte layout, CMD[7:0]:
//!   CMD[7:6]  device address (hard-wired to 0b01)
//!   CMD[5:2]  register address or fast-command bits
//!   CMD[1:0]  command type (01 = static read, 10 = incremental write)
//!
//! All values here are compile-time constants; a wrong byte is a silent
//! hardware-configuration bug, so each one is pinned by a conformance test
//! against the datasheet below.

/// Incremental write starting at CONFIG0 (register 0x1).
pub const CMD_CONFIG_WRITE: u8 = 0b0100_0110;
/// Incremental write starting at the MUX register (0x6).
pub const CMD_MUX_WRITE: u8 = 0b0101_1010;
/// Static read of the ADCDATA register (0x0).
pub const CMD_ADCDATA_READ: u8 = 0b0100_0001;
/// Static read of the MUX register (0x6).
pub const CMD_MUX_READ: u8 = 0b0101_1001;
/// Static read of the IRQ register (0x5).
pub const CMD_IRQ_READ: u8 = 0b0101_0101;
/// Fast command: start/restart a one-shot conversion.
pub const CMD_START_CONVERSION: u8 = 0b0110_1000;
/// Fast command: place the ADC in standby.
pub const CMD_STANDBY: u8 = 0b0110_1100;

/// CONFIG0: shutdown disabled, internal clock (no output), no current
/// sources, conversion mode.
pub const CONFIG0: u8 = 0b1110_0011;
/// CONFIG1: AMCLK = MCLK, OSR = 20480 (60 samples/sec).
pub const CONFIG1: u8 = 0b0010_1000;
/// CONFIG2: channel current x1, gain x2, mux auto-zeroing enabled.
pub const CONFIG2: u8 = 0b1000_1111;
/// CONFIG3: one-shot conversion then standby, 24-bit codes (saturating,
/// locked to 0x7FFFFF / 0x800000 on overrange), CRC and digital cal off.
pub const CONFIG3: u8 = 0b1000_0000;
/// IRQ register: interrupts on the IRQ pin, inactive state high-Z, fast
/// commands enabled, conversion-start interrupt output disabled.
pub const IRQ_SET: u8 = 0b0000_0010;

/// MUX register: CH0 = VIN+, CH1 = VIN- (the thermistor divider).
pub const MUX_THERMISTOR: u8 = 0b0000_0001;
/// MUX register: internal temperature diodes P/M.
pub const MUX_INTERNAL_TEMP: u8 = 0xDE;
/// MUX register: REFIN+ / REFIN-, for reference-voltage sanity reads.
pub const MUX_VREF: u8 = 0xBC;

/// 32-bit word clocking out the ADCDATA read command; the reply is the
/// status byte followed by the 24-bit conversion code.
pub const ADCDATA_READ_WORD: u32 = (CMD_ADCDATA_READ as u32) << 24;
/// 16-bit word clocking out the MUX-register read command; the reply is the
/// status byte followed by the current MUX selection.
pub const MUX_READ_WORD: u16 = (CMD_MUX_READ as u16) << 8;

/// Mux-status reply when the thermistor inputs are selected.
pub const MUX_STATUS_THERMISTOR: u16 = 0x1701;
/// Mux-status reply when the internal temperature diodes are selected.
pub const MUX_STATUS_INTERNAL: u16 = 0x17DE;

/// Full register-programming sequence for power-on init. The ADC's
/// incremental-write mode advances the register pointer after each byte,
/// so one CS frame covers CONFIG0 through MUX.
pub const fn init_sequence() -> [u8; 7] {
    [
        CMD_CONFIG_WRITE,
        CONFIG0,
        CONFIG1,
        CONFIG2,
        CONFIG3,
        IRQ_SET,
        MUX_THERMISTOR,
    ]
}

/// Route the external thermistor divider (CH0/CH1) into the ADC.
pub const fn select_thermistor_inputs() -> [u8; 2] {
    [CMD_MUX_WRITE, MUX_THERMISTOR]
}

/// Route the internal temperature diodes into the ADC.
pub const fn select_internal_temp_input() -> [u8; 2] {
    [CMD_MUX_WRITE, MUX_INTERNAL_TEMP]
}

/// Route the reference inputs into the ADC.
pub const fn select_reference_input() -> [u8; 2] {
    [CMD_MUX_WRITE, MUX_VREF]
}

/// Fast conversion-start command frame.
pub const fn start_conversion() -> [u8; 1] {
    [CMD_START_CONVERSION]
}

/// Fast standby command frame.
pub const fn standby() -> [u8; 1] {
    [CMD_STANDBY]
}

/// Command word for the 32-bit status+data read.
pub const fn read_data_word() -> u32 {
    ADCDATA_READ_WORD
}

/// Command word for the 16-bit status+mux read.
pub const fn read_mux_status_word() -> u16 {
    MUX_READ_WORD
}

#[cfg(test)]
mod tests {
    use super::*;

    // Datasheet conformance: device address 0b01 in the top two bits of
    // every command byte.
    #[test]
    fn command_bytes_carry_device_address() {
        for cmd in [
            CMD_CONFIG_WRITE,
            CMD_MUX_WRITE,
            CMD_ADCDATA_READ,
            CMD_MUX_READ,
            CMD_IRQ_READ,
            CMD_START_CONVERSION,
            CMD_STANDBY,
        ] {
            assert_eq!(cmd >> 6, 0b01, "bad device address in {cmd:#010b}");
        }
    }

    #[test]
    fn read_commands_are_static_reads() {
        for cmd in [CMD_ADCDATA_READ, CMD_MUX_READ, CMD_IRQ_READ] {
            assert_eq!(cmd & 0b11, 0b01, "not a static read: {cmd:#010b}");
        }
    }

    #[test]
    fn write_commands_are_incremental_writes() {
        assert_eq!(CMD_CONFIG_WRITE & 0b11, 0b10);
        assert_eq!(CMD_MUX_WRITE & 0b11, 0b10);
        // Register addresses: CONFIG0 = 0x1, MUX = 0x6.
        assert_eq!((CMD_CONFIG_WRITE >> 2) & 0xF, 0x1);
        assert_eq!((CMD_MUX_WRITE >> 2) & 0xF, 0x6);
    }

    #[test]
    fn init_sequence_programs_config0_through_mux() {
        let seq = init_sequence();
        assert_eq!(seq[0], CMD_CONFIG_WRITE);
        assert_eq!(seq[1], 0b1110_0011);
        assert_eq!(seq[2], 0b0010_1000);
        assert_eq!(seq[3], 0b1000_1111);
        assert_eq!(seq[4], 0b1000_0000);
        assert_eq!(seq[5], 0b0000_0010);
        assert_eq!(seq[6], MUX_THERMISTOR);
    }

    #[test]
    fn data_read_word_matches_command_byte() {
        assert_eq!(read_data_word(), 0x4100_0000);
        assert_eq!(read_mux_status_word(), 0x5900);
    }

    #[test]
    fn mux_selections() {
        assert_eq!(select_thermistor_inputs(), [0b0101_1010, 0x01]);
        assert_eq!(select_internal_temp_input(), [0b0101_1010, 0xDE]);
        assert_eq!(select_reference_input(), [0b0101_1010, 0xBC]);
        assert_eq!(start_conversion(), [0b0110_1000]);
    }

    #[test]
    fn status_replies_embed_mux_values() {
        assert_eq!(MUX_STATUS_THERMISTOR & 0xFF, MUX_THERMISTOR as u16);
        assert_eq!(MUX_STATUS_INTERNAL & 0xFF, MUX_INTERNAL_TEMP as u16);
    }
}
