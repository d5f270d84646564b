//! Type-safe physical units for sky map simulation
//!
//! Frequencies and thermodynamic temperatures use the `uom` crate to prevent
//! unit confusion at compile time. Map brightness units are a closed set of
//! labels ([`BrightnessUnit`]) because their conversions depend on the
//! observing frequency and cannot be expressed as fixed scale factors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uom::si::f64::{Frequency, ThermodynamicTemperature};
use uom::si::frequency::{gigahertz, hertz, megahertz};
use uom::si::thermodynamic_temperature::kelvin;

/// Type alias for temperature with convenient methods
pub type Temperature = ThermodynamicTemperature;

/// Constants in SI units
pub struct SI {}

impl SI {
    /// Planck's constant
    /// Units: J⋅s
    pub const PLANCK_CONSTANT: f64 = 6.626_070_15e-34;

    /// Boltzmann's constant
    /// Units: J/K
    pub const BOLTZMANN_CONSTANT: f64 = 1.380_649e-23;

    /// Speed of light in vacuum
    /// Units: m/s
    pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

    /// 1 Jansky
    /// Units: W m⁻² Hz⁻¹
    pub const JANSKY: f64 = 1e-26;
}

/// CMB monopole temperature in Kelvin (Fixsen 2009)
pub const T_CMB_K: f64 = 2.7255;

/// Errors that can occur with unit handling
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unknown brightness unit '{0}', expected one of K_RJ, mK_RJ, uK_RJ, K_CMB, mK_CMB, uK_CMB, Jy/sr, MJy/sr")]
    UnknownUnit(String),

    #[error("Invalid frequency: {0} Hz (must be positive and finite)")]
    InvalidFrequency(f64),
}

/// Extension trait for frequency conversions
pub trait FrequencyExt {
    /// Create frequency from gigahertz
    fn from_ghz(ghz: f64) -> Self;

    /// Get frequency in gigahertz
    fn as_ghz(&self) -> f64;

    /// Create frequency from megahertz
    fn from_mhz(mhz: f64) -> Self;

    /// Create frequency from hertz
    fn from_hz(hz: f64) -> Self;

    /// Get frequency in hertz
    fn as_hz(&self) -> f64;
}

/// Extension trait for temperature conversions
pub trait TemperatureExt {
    /// Create temperature from Kelvin
    fn from_kelvin(kelvin: f64) -> Self;

    /// Get temperature in Kelvin
    fn as_kelvin(&self) -> f64;
}

impl FrequencyExt for Frequency {
    fn from_ghz(ghz: f64) -> Self {
        Frequency::new::<gigahertz>(ghz)
    }

    fn as_ghz(&self) -> f64 {
        self.get::<gigahertz>()
    }

    fn from_mhz(mhz: f64) -> Self {
        Frequency::new::<megahertz>(mhz)
    }

    fn from_hz(hz: f64) -> Self {
        Frequency::new::<hertz>(hz)
    }

    fn as_hz(&self) -> f64 {
        self.get::<hertz>()
    }
}

impl TemperatureExt for Temperature {
    fn from_kelvin(k: f64) -> Self {
        Temperature::new::<kelvin>(k)
    }

    fn as_kelvin(&self) -> f64 {
        self.get::<kelvin>()
    }
}

/// Check that a frequency can be used in a conversion law
pub fn validate_frequency(freq: Frequency) -> Result<f64, UnitError> {
    let hz = freq.as_hz();
    if !hz.is_finite() || hz <= 0.0 {
        return Err(UnitError::InvalidFrequency(hz));
    }
    Ok(hz)
}

/// Brightness convention of a map unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// Rayleigh-Jeans brightness temperature
    RayleighJeans,
    /// Thermodynamic temperature of a CMB-like blackbody
    Cmb,
    /// Specific intensity
    SpecificIntensity,
}

/// Units a sky map can be expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BrightnessUnit {
    KRj,
    MilliKRj,
    MicroKRj,
    KCmb,
    MilliKCmb,
    MicroKCmb,
    JanskyPerSr,
    MegaJanskyPerSr,
}

impl BrightnessUnit {
    pub const ALL: [BrightnessUnit; 8] = [
        BrightnessUnit::KRj,
        BrightnessUnit::MilliKRj,
        BrightnessUnit::MicroKRj,
        BrightnessUnit::KCmb,
        BrightnessUnit::MilliKCmb,
        BrightnessUnit::MicroKCmb,
        BrightnessUnit::JanskyPerSr,
        BrightnessUnit::MegaJanskyPerSr,
    ];

    /// Label written to FITS `TUNITn` keywords
    pub fn label(&self) -> &'static str {
        match self {
            BrightnessUnit::KRj => "K_RJ",
            BrightnessUnit::MilliKRj => "mK_RJ",
            BrightnessUnit::MicroKRj => "uK_RJ",
            BrightnessUnit::KCmb => "K_CMB",
            BrightnessUnit::MilliKCmb => "mK_CMB",
            BrightnessUnit::MicroKCmb => "uK_CMB",
            BrightnessUnit::JanskyPerSr => "Jy/sr",
            BrightnessUnit::MegaJanskyPerSr => "MJy/sr",
        }
    }

    pub fn convention(&self) -> Convention {
        match self {
            BrightnessUnit::KRj | BrightnessUnit::MilliKRj | BrightnessUnit::MicroKRj => {
                Convention::RayleighJeans
            }
            BrightnessUnit::KCmb | BrightnessUnit::MilliKCmb | BrightnessUnit::MicroKCmb => {
                Convention::Cmb
            }
            BrightnessUnit::JanskyPerSr | BrightnessUnit::MegaJanskyPerSr => {
                Convention::SpecificIntensity
            }
        }
    }

    /// Prefix scale relative to the base unit of the convention (K or Jy/sr)
    pub fn scale(&self) -> f64 {
        match self {
            BrightnessUnit::KRj | BrightnessUnit::KCmb | BrightnessUnit::JanskyPerSr => 1.0,
            BrightnessUnit::MilliKRj | BrightnessUnit::MilliKCmb => 1e-3,
            BrightnessUnit::MicroKRj | BrightnessUnit::MicroKCmb => 1e-6,
            BrightnessUnit::MegaJanskyPerSr => 1e6,
        }
    }

    /// Kelvin RJ represented by one unit of `self` at frequency `hz`
    fn in_kelvin_rj(&self, hz: f64) -> f64 {
        let base = match self.convention() {
            Convention::RayleighJeans => 1.0,
            Convention::Cmb => kcmb_to_krj(hz),
            Convention::SpecificIntensity => SI::JANSKY / rj_intensity_per_kelvin(hz),
        };
        self.scale() * base
    }
}

impl fmt::Display for BrightnessUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for BrightnessUnit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('µ', "u").replace('μ', "u");
        BrightnessUnit::ALL
            .into_iter()
            .find(|unit| unit.label() == normalized)
            .ok_or_else(|| UnitError::UnknownUnit(s.to_string()))
    }
}

impl TryFrom<String> for BrightnessUnit {
    type Error = UnitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BrightnessUnit> for String {
    fn from(unit: BrightnessUnit) -> Self {
        unit.label().to_string()
    }
}

/// Dimensionless frequency x = hν / (k T_CMB)
pub fn cmb_x(hz: f64) -> f64 {
    SI::PLANCK_CONSTANT * hz / (SI::BOLTZMANN_CONSTANT * T_CMB_K)
}

/// K_RJ per K_CMB at frequency `hz`: x² eˣ / (eˣ − 1)²
pub fn kcmb_to_krj(hz: f64) -> f64 {
    let x = cmb_x(hz);
    let em1 = x.exp_m1();
    x * x * x.exp() / (em1 * em1)
}

/// Specific intensity of one Kelvin RJ: 2kν²/c² in W m⁻² Hz⁻¹ sr⁻¹
pub fn rj_intensity_per_kelvin(hz: f64) -> f64 {
    2.0 * SI::BOLTZMANN_CONSTANT * hz * hz / (SI::SPEED_OF_LIGHT * SI::SPEED_OF_LIGHT)
}

/// Multiplicative factor converting values in `from` to values in `to` at `freq`
pub fn conversion_factor(
    from: BrightnessUnit,
    to: BrightnessUnit,
    freq: Frequency,
) -> Result<f64, UnitError> {
    let hz = validate_frequency(freq)?;
    if from == to {
        return Ok(1.0);
    }
    Ok(from.in_kelvin_rj(hz) / to.in_kelvin_rj(hz))
}
