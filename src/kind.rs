//! Discriminator kinds and their per-kind constants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};

/// CAL discriminator threshold being characterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DacKind {
    /// Log-accept (LAC) discriminator.
    Lac,
    /// Fast shaper, low energy trigger.
    Fle,
    /// Fast shaper, high energy trigger.
    Fhe,
    /// Upper level (saturation) discriminator.
    Uld,
}

impl DacKind {
    pub const ALL: &[DacKind] = &[DacKind::Lac, DacKind::Fle, DacKind::Fhe, DacKind::Uld];

    pub fn name(self) -> &'static str {
        match self {
            DacKind::Lac => "LAC",
            DacKind::Fle => "FLE",
            DacKind::Fhe => "FHE",
            DacKind::Uld => "ULD",
        }
    }

    /// Energy window used for slope fitting when none is configured.
    pub fn default_window(self) -> EnergyWindow {
        let (low, high) = match self {
            DacKind::Lac => (1.0, 10.0),
            DacKind::Fle => (50.0, 150.0),
            DacKind::Fhe => (500.0, 1500.0),
            DacKind::Uld => (1000.0, 100_000.0),
        };
        EnergyWindow { low, high }
    }

    /// Hard limit on fit quality (SSR / n) before a fine fit is rejected.
    pub fn default_quality_limit(self) -> f64 {
        match self {
            DacKind::Lac => 400.0,
            DacKind::Fle => 800.0,
            DacKind::Fhe => 1000.0,
            DacKind::Uld => 1000.0,
        }
    }

    /// Expected fine-range slope in MeV per DAC step, divided by gain to get ADC units.
    pub fn default_slope_band(self) -> Option<(f64, f64)> {
        match self {
            DacKind::Lac => Some((0.30, 0.70)),
            DacKind::Fle => Some((0.61, 1.39)),
            DacKind::Fhe => Some((12.0, 28.0)),
            DacKind::Uld => None,
        }
    }

    /// Whether a per-channel trigger bias is subtracted from the ADC window.
    pub fn uses_bias(self) -> bool {
        matches!(self, DacKind::Fle | DacKind::Fhe)
    }
}

impl fmt::Display for DacKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DacKind {
    type Err = ConfigurationError;

    /// Accepts the short names and the legacy `*_dac` / `log_acpt` spellings.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lac" | "lac_dac" | "log_acpt" => Ok(DacKind::Lac),
            "fle" | "fle_dac" => Ok(DacKind::Fle),
            "fhe" | "fhe_dac" => Ok(DacKind::Fhe),
            "uld" | "uld_dac" => Ok(DacKind::Uld),
            _ => Err(ConfigurationError::UnknownKind(s.to_string())),
        }
    }
}

/// Energy bounds in MeV of the linear part of a threshold curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyWindow {
    pub low: f64,
    pub high: f64,
}

impl EnergyWindow {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        let window = Self { low, high };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.low.is_finite() || !self.high.is_finite() || self.low >= self.high {
            return Err(ConfigurationError::InvalidWindow {
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}
