//! CAL DAC characterization - library crate.
//!
//! Cleans measured ADC-vs-DAC threshold curves for the calorimeter
//! discriminators (LAC, FLE, FHE, ULD) and fits the DAC slope of each
//! channel, for use by the self-test binary and calibration tools.

pub mod channel;
pub mod error;
pub mod filter;
pub mod fit;
pub mod kind;
pub mod pipeline;
pub mod report;

pub use channel::{ChannelId, ChannelTable, CurveTable, DacCurve, DacRange, HalfCurve};
pub use error::{ConfigurationError, FilterIssue, FitError, FitErrorKind, FitWarning};
pub use filter::{CurveFilter, FilterParams};
pub use fit::{FitParams, FitRecord, FitTable, SlopeFitter};
pub use kind::{DacKind, EnergyWindow};
pub use pipeline::{run_pipeline, run_uld_pipeline, PipelineOutput, PipelineParams};
pub use report::{RunReport, RunStatus};
