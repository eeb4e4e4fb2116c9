//! Bath Calibration Walkthrough for the 32-Channel Thermistor Mux
//! Calibrates every fitted channel against one or two reference baths and
//! verifies the corrected readings. Run on Raspberry Pi; follow prompts.
//!
//! Supports CLI args (e.g., --cs-pin 24), env vars (e.g., MUX_CS_PIN=24), and defaults.
//! CLI: cargo run --example bath_calibration -- --cs-pin 24 --irq-pin 25 --mode two-point
//! Env: export MUX_CS_PIN=24; export MUX_IRQ_PIN=25; export MUX_CAL_FILE=/var/lib/mux-cal.bin
//! Precedence: CLI arg > env var > default.

use std::env;
use std::io;
use std::path::PathBuf;

use thermistor_mux::{InternalSensorProfile, MuxConfig, MuxReader, ThermistorProfile};

/// Gate GPIOs (BCM) for the 32 MOSFET channels, in channel order. Matches
/// the bench board; adjust for other wiring.
const CHANNEL_PINS: [u8; 32] = [
    0, 1, 2, 3, 4, 7, 9, 10, 11, 14, 15, 17, 18, 19, 20, 21, 22, 23, 27, 28, 29, 30, 31, 32, 33,
    34, 35, 36, 37, 38, 39, 40,
];

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Single,
    TwoPoint,
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    match s.to_lowercase().as_str() {
        "single" | "1" => Ok(Mode::Single),
        "two-point" | "two" | "2" => Ok(Mode::TwoPoint),
        _ => Err(format!("Invalid mode: {}. Must be single/1 or two-point/2.", s)),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Parse CLI args (simple manual scan for --key value; cargo passes after --)
    let args: Vec<String> = env::args().collect();
    let mut cli_cs_pin: Option<u8> = None;
    let mut cli_irq_pin: Option<u8> = None;
    let mut cli_cal_file: Option<String> = None;
    let mut cli_mode: Option<Mode> = None;

    let mut i = 1; // Skip binary name (args[0])
    while i < args.len() {
        if args[i].starts_with("--") {
            let key = &args[i][2..];
            if i + 1 >= args.len() {
                return Err(format!("--{} requires a value", key).into());
            }
            let value = &args[i + 1];
            match key {
                "cs-pin" => {
                    cli_cs_pin = Some(
                        value
                            .parse()
                            .map_err(|e| format!("Invalid --cs-pin '{}': {}", value, e))?,
                    );
                }
                "irq-pin" => {
                    cli_irq_pin = Some(
                        value
                            .parse()
                            .map_err(|e| format!("Invalid --irq-pin '{}': {}", value, e))?,
                    );
                }
                "cal-file" => {
                    cli_cal_file = Some(value.clone());
                }
                "mode" => {
                    cli_mode = Some(parse_mode(value)?);
                }
                _ => {
                    eprintln!("Unknown CLI arg: --{}", key);
                    eprintln!("Usage: --cs-pin <u8> | --irq-pin <u8> | --cal-file <path> | --mode <single|two-point>");
                    std::process::exit(1);
                }
            }
            i += 2;
        } else {
            eprintln!("Unexpected arg: {}", args[i]);
            i += 1;
        }
    }

    // Fallback to env vars, then defaults (CLI > env > default)
    let cs_pin: u8 = cli_cs_pin
        .map(|p| p.to_string())
        .or_else(|| env::var("MUX_CS_PIN").ok())
        .unwrap_or_else(|| "24".to_string())
        .parse()
        .map_err(|e| format!("Invalid CS pin: {}", e))?;
    let irq_pin: u8 = cli_irq_pin
        .map(|p| p.to_string())
        .or_else(|| env::var("MUX_IRQ_PIN").ok())
        .unwrap_or_else(|| "25".to_string())
        .parse()
        .map_err(|e| format!("Invalid IRQ pin: {}", e))?;
    let cal_file = cli_cal_file
        .or_else(|| env::var("MUX_CAL_FILE").ok())
        .unwrap_or_else(|| "/var/lib/thermistor-mux/cal.bin".to_string());
    let mode = cli_mode
        .map(Ok)
        .or_else(|| env::var("MUX_CAL_MODE").ok().map(|s| parse_mode(&s)))
        .unwrap_or(Ok(Mode::Single))?;

    println!("=== Thermistor Mux Bath Calibration ===");
    println!("Calibrates all fitted channels against reference baths, then verifies.");
    println!("Safety: Submerge only the probes; keep bath water away from the board.");
    println!(
        "Config: CS pin={}, IRQ pin={}, cal file={}, mode={}",
        cs_pin,
        irq_pin,
        cal_file,
        match mode {
            Mode::Single => "single-point",
            Mode::TwoPoint => "two-point",
        }
    );
    println!("(From CLI/env vars: --cs-pin/--irq-pin/--cal-file/--mode or MUX_*; defaults if unset)");
    println!();

    let config = MuxConfig {
        cs_pin,
        irq_pin,
        id_pins: [5, 6, 12, 13, 16],
        channel_pins: CHANNEL_PINS,
        thermistor: ThermistorProfile::tt7_10k(),
        internal: InternalSensorProfile::board_default(),
        storage_path: PathBuf::from(&cal_file),
    };
    let mut reader =
        MuxReader::new(config).map_err(|e| format!("Failed to init MuxReader: {:?}", e))?;
    println!("Board ID: {}", reader.hardware_id());
    println!(
        "Existing calibration: {}",
        if reader.is_calibrated() { "present (will be replaced)" } else { "none" }
    );
    println!();

    // Step 1: Uncorrected baseline sweep
    println!("Step 1: Baseline sweep (uncorrected)...");
    print_cycle(&reader.run_cycle());
    println!();

    match mode {
        Mode::Single => {
            println!("Step 2: Place all probes in a stirred ice bath (0.0 C).");
            println!("Press Enter when probes have settled...");
            io::stdin().read_line(&mut String::new())?;
            reader
                .calibrate(0.0)
                .map_err(|e| format!("Calibration failed: {:?}", e))?;
            println!("Offsets persisted.");
        }
        Mode::TwoPoint => {
            println!("Step 2: Place all probes in a stirred ice bath (0.0 C).");
            println!("Press Enter when probes have settled...");
            io::stdin().read_line(&mut String::new())?;
            let pass = reader.begin_two_point(0.0);
            let missing: Vec<usize> = pass.missing_channels().collect();
            if !missing.is_empty() {
                println!("Channels with no sample (left uncorrected): {:?}", missing);
            }

            println!("Step 3: Move probes to the warm bath and enter its temperature in C:");
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;
            let t2: f32 = line
                .trim()
                .parse()
                .map_err(|e| format!("Invalid temperature '{}': {}", line.trim(), e))?;
            println!("Press Enter when probes have settled...");
            io::stdin().read_line(&mut String::new())?;
            reader
                .finish_two_point(pass, t2)
                .map_err(|e| format!("Calibration failed: {:?}", e))?;
            println!("Offsets and gains persisted.");
        }
    }
    println!();

    // Final: verification sweep with correction applied
    println!("Verification sweep (corrected; leave probes in the last bath):");
    print_cycle(&reader.run_cycle());
    println!();
    println!("Done. Corrected channel readings should match the bath temperature.");
    println!("If a channel is far off, reseat its thermistor and rerun.");

    Ok(())
}

fn print_cycle(result: &thermistor_mux::CycleResult) {
    for (ch, value) in result.channels.iter().enumerate() {
        match value {
            Some(celsius) => println!("  Channel {:2}: {:7.3} C", ch, celsius),
            None => println!("  Channel {:2}: ---", ch),
        }
    }
    match result.internal {
        Some(celsius) => println!("  Internal : {:7.3} C", celsius),
        None => println!("  Internal : ---"),
    }
}
