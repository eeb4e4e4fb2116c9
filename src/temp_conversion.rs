//! Raw-code to Celsius transfer functions.
//!
//! Two inputs, two models. The internal diode sensor is linear in the ADC
//! code; the thermistors go through a voltage-divider relation and then one
//! of two resistance-to-temperature fits. Both fits shipped in revisions of
//! the original board firmware and they are not numerically identical, so
//! the choice is configuration, not code.

/// Kelvin offset for Celsius conversion.
const KELVIN_OFFSET: f32 = 273.15;

/// Datasheet transfer function for the internal temperature diodes,
/// `Temp(C) = 0.00133 * ADCDATA - 267.146`, stated for VREF = 3.3 V. The
/// code scales with the actual reference, so the real board's reference is
/// folded in as a ratio.
#[derive(Debug, Clone, Copy)]
pub struct InternalSensorProfile {
    /// Reference voltage actually applied to the ADC, in volts.
    pub v_ref: f32,
    /// Reference voltage the datasheet equation assumes, in volts.
    pub datasheet_v_ref: f32,
}

impl InternalSensorProfile {
    /// Board configuration: 2.4 V reference against the 3.3 V datasheet
    /// equation.
    pub const fn board_default() -> Self {
        InternalSensorProfile {
            v_ref: 2.4,
            datasheet_v_ref: 3.3,
        }
    }

    pub fn celsius(&self, code: i32) -> f32 {
        0.00133 * (self.v_ref / self.datasheet_v_ref) * code as f32 - 267.146
    }
}

/// Resistance-to-temperature fit strategy.
#[derive(Debug, Clone, Copy)]
pub enum Fit {
    /// Simplified B-parameter Steinhart-Hart:
    /// `1/T = 1/T0 + (1/B) * ln(R/R0)`, T in Kelvin.
    Beta { beta_k: f32 },
    /// Empirical natural-log fit: `celsius = a * ln(R) + b`.
    NaturalLog { a: f32, b: f32 },
}

#[derive(Debug, Clone, Copy)]
pub struct ThermistorProfile {
    /// ADC reference voltage across the divider, in volts.
    pub v_ref: f32,
    /// Fixed series resistor of the divider, in ohms.
    pub series_resistor: f32,
    /// Thermistor resistance at the nominal temperature, in ohms.
    pub nominal_resistance: f32,
    /// Nominal temperature, in Kelvin (25 C).
    pub nominal_temp_kelvin: f32,
    pub fit: Fit,
}

impl ThermistorProfile {
    /// TT7-10KC3 part: 10 kOhm at 25 C, B = 3977 K.
    pub const fn tt7_10k() -> Self {
        ThermistorProfile {
            v_ref: 2.33,
            series_resistor: 10_000.0,
            nominal_resistance: 10_000.0,
            nominal_temp_kelvin: 298.15,
            fit: Fit::Beta { beta_k: 3977.0 },
        }
    }

    /// 2.2 kOhm variant: B = 3930 K.
    pub const fn tt7_2k2() -> Self {
        ThermistorProfile {
            v_ref: 2.33,
            series_resistor: 2_200.0,
            nominal_resistance: 2_200.0,
            nominal_temp_kelvin: 298.15,
            fit: Fit::Beta { beta_k: 3930.0 },
        }
    }

    /// ADC code to voltage at the divider tap.
    pub fn voltage(&self, code: i32) -> f32 {
        (self.v_ref / (1u32 << 23) as f32) * code as f32
    }

    /// Divider relation, solving for the thermistor leg. Returns a negative
    /// or non-finite value for codes outside the divider's range; callers
    /// discard those samples.
    pub fn resistance(&self, code: i32) -> f32 {
        let v = self.voltage(code);
        v * self.series_resistor / (self.v_ref - v)
    }

    /// Full code-to-Celsius transfer. May be non-finite for invalid codes.
    pub fn celsius(&self, code: i32) -> f32 {
        let r = self.resistance(code);
        match self.fit {
            Fit::Beta { beta_k } => {
                let inv_t = 1.0 / self.nominal_temp_kelvin
                    + (1.0 / beta_k) * (r / self.nominal_resistance).ln();
                1.0 / inv_t - KELVIN_OFFSET
            }
            Fit::NaturalLog { a, b } => a * r.ln() + b,
        }
    }
}

/// Display-only Fahrenheit conversion.
pub fn fahrenheit(celsius: f32) -> f32 {
    celsius * 1.8 + 32.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_transfer_near_zero_code() {
        // Code 0x000001 with the 2.4 V reference: 0.00133 * (2.4/3.3) * 1
        // - 267.146, about -267.145.
        let profile = InternalSensorProfile::board_default();
        let c = profile.celsius(1);
        assert!((c + 267.145).abs() < 1e-3, "got {c}");
    }

    #[test]
    fn internal_transfer_scales_with_reference() {
        let datasheet = InternalSensorProfile {
            v_ref: 3.3,
            datasheet_v_ref: 3.3,
        };
        // At VREF = 3.3 V the ratio drops out and the datasheet equation
        // applies directly.
        let code = 220_000;
        assert!((datasheet.celsius(code) - (0.00133 * code as f32 - 267.146)).abs() < 1e-3);
    }

    #[test]
    fn thermistor_reads_25c_at_nominal_resistance() {
        // At R = R0 the divider tap sits at VREF/2, so the code is half of
        // full scale.
        let profile = ThermistorProfile::tt7_10k();
        let code = 1 << 22;
        let r = profile.resistance(code);
        assert!((r - 10_000.0).abs() < 1.0, "resistance {r}");
        let c = profile.celsius(code);
        assert!((c - 25.0).abs() < 0.01, "celsius {c}");
    }

    #[test]
    fn beta_fit_is_monotonic_decreasing_in_resistance() {
        let profile = ThermistorProfile::tt7_10k();
        // Lower code -> lower tap voltage -> lower resistance -> hotter.
        let cold = profile.celsius(1 << 22);
        let hot = profile.celsius(1 << 21);
        assert!(hot > cold);
    }

    #[test]
    fn log_fit_matches_its_coefficients() {
        let profile = ThermistorProfile {
            fit: Fit::NaturalLog { a: -22.0, b: 227.0 },
            ..ThermistorProfile::tt7_10k()
        };
        let code = 1 << 22; // R = 10k
        let expected = -22.0 * 10_000.0f32.ln() + 227.0;
        assert!((profile.celsius(code) - expected).abs() < 0.05);
    }

    #[test]
    fn saturated_divider_goes_non_finite_not_panic() {
        let profile = ThermistorProfile::tt7_10k();
        // Negative code: tap voltage below ground, resistance negative,
        // ln of a negative is NaN. The caller filters on is_finite().
        assert!(!profile.celsius(-(1 << 22)).is_finite() || profile.celsius(-(1 << 22)) < -100.0);
    }

    #[test]
    fn fahrenheit_is_pure_display_math() {
        assert_eq!(fahrenheit(0.0), 32.0);
        assert_eq!(fahrenheit(100.0), 212.0);
    }
}
