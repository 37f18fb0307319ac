use thiserror::Error;

use crate::channel::{ChannelId, DacRange};

/// Errors raised while configuring a filter, fitter or pipeline run.
///
/// These are fatal for the run: nothing is processed once one is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("unknown discriminator type '{0}'")]
    UnknownKind(String),
    #[error("invalid energy window ({low}, {high}) MeV: low must be below high and both finite")]
    InvalidWindow { low: f64, high: f64 },
    #[error("{kind} thresholds need a per-channel bias table")]
    MissingBias { kind: &'static str },
    #[error("invalid parameter {name} = {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("cannot read config: {0}")]
    Io(String),
    #[error("cannot parse config: {0}")]
    Parse(String),
    #[error("cannot serialize config: {0}")]
    Serialize(String),
}

/// Result type for configuration-time operations
pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// What went wrong while fitting one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum FitErrorKind {
    /// Too few points inside the window on the last range tried.
    InsufficientData {
        range: DacRange,
        points: usize,
        required: usize,
    },
    /// The regression had no unique finite solution. Window points always
    /// sit on distinct DAC indices and `min_points` is at least 2, so this
    /// only guards `fit_line` against points it cannot solve, such as
    /// repeated DAC values handed to the coarse fit directly.
    SingularFit { range: DacRange, points: usize },
    /// Gain is zero, negative or not finite, so the window cannot be mapped to ADC.
    InvalidGain { gain: f64 },
}

/// Per-channel fit failure. Never aborts the other channels.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{channel}: {}", describe(.kind))]
pub struct FitError {
    pub channel: ChannelId,
    pub kind: FitErrorKind,
}

fn describe(kind: &FitErrorKind) -> String {
    match kind {
        FitErrorKind::InsufficientData {
            range,
            points,
            required,
        } => format!(
            "insufficient data in {} range: {} points inside window, need {}",
            range.name(),
            points,
            required
        ),
        FitErrorKind::SingularFit { range, points } => format!(
            "singular linear fit in {} range over {} points",
            range.name(),
            points
        ),
        FitErrorKind::InvalidGain { gain } => format!("invalid gain {gain}"),
    }
}

impl FitError {
    pub fn new(channel: ChannelId, kind: FitErrorKind) -> Self {
        Self { channel, kind }
    }

    /// Short machine-readable tag for report lines.
    pub fn tag(&self) -> &'static str {
        match self.kind {
            FitErrorKind::InsufficientData { .. } => "insufficient_data",
            FitErrorKind::SingularFit { .. } => "singular_fit",
            FitErrorKind::InvalidGain { .. } => "invalid_gain",
        }
    }
}

/// Soft problems attached to an accepted fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitWarning {
    /// Coarse fit quality above the limit; accepted because there is no further fallback.
    FitQuality {
        range: DacRange,
        quality: f64,
        limit: f64,
    },
}

impl std::fmt::Display for FitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitWarning::FitQuality {
                range,
                quality,
                limit,
            } => write!(
                f,
                "{} fit quality {:.1} above limit {:.1}",
                range.name(),
                quality,
                limit
            ),
        }
    }
}

/// Degradation left behind by a filter stage. The curve is still returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterIssue {
    /// A single recorded point: nothing to extrapolate the low end from.
    InsufficientData { range: DacRange, points: usize },
}

impl FilterIssue {
    pub fn tag(&self) -> &'static str {
        match self {
            FilterIssue::InsufficientData { .. } => "insufficient_points",
        }
    }
}

impl std::fmt::Display for FilterIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterIssue::InsufficientData { range, points } => write!(
                f,
                "{} range has {} recorded point(s), low end not extrapolated",
                range.name(),
                points
            ),
        }
    }
}
