use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelTable, CurveTable, UldCurveTable, UldRange};
use crate::error::{ConfigurationError, Result};
use crate::filter::{CurveDiff, CurveFilter, FilterParams};
use crate::fit::uld::{UldFitTable, UldFitter, UldGains};
use crate::fit::{FitOutcome, FitParams, FitTable, SlopeFitter};
use crate::kind::{DacKind, EnergyWindow};
use crate::report::RunReport;

/// Everything a run needs besides the input tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub kind: DacKind,
    pub smooth: bool,
    /// Fit window in MeV; the kind's default when `None`.
    pub window: Option<EnergyWindow>,
    pub filter: FilterParams,
    pub fit: FitParams,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            kind: DacKind::Fle,
            smooth: false,
            window: None,
            filter: FilterParams::default(),
            fit: FitParams::default(),
        }
    }
}

impl PipelineParams {
    pub fn new(kind: DacKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigurationError::Serialize(e.to_string()))
    }

    pub fn window(&self) -> EnergyWindow {
        self.window.unwrap_or_else(|| self.kind.default_window())
    }

    pub fn validate(&self) -> Result<()> {
        self.curve_filter()?;
        if self.kind == DacKind::Uld {
            self.uld_fitter()?;
        } else {
            self.slope_fitter()?;
        }
        Ok(())
    }

    pub fn curve_filter(&self) -> Result<CurveFilter> {
        CurveFilter::new(self.kind, self.smooth).with_params(self.filter.clone())
    }

    pub fn slope_fitter(&self) -> Result<SlopeFitter> {
        SlopeFitter::new(self.kind, self.window())?.with_params(&self.fit)
    }

    pub fn uld_fitter(&self) -> Result<UldFitter> {
        let window = self.window.unwrap_or_else(|| DacKind::Uld.default_window());
        UldFitter::new(window)?.with_params(&self.fit)
    }
}

/// Cleaned curves and per-channel fit results of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub cleaned: CurveTable,
    pub diffs: ChannelTable<CurveDiff>,
    pub slope: ChannelTable<f64>,
    pub offset: ChannelTable<f64>,
    /// 0 = fine, 1 = coarse, -1 = fit failed.
    pub range_used: ChannelTable<i8>,
    pub quality: ChannelTable<f64>,
    pub outcomes: Vec<FitOutcome>,
    pub report: RunReport,
}

impl PipelineOutput {
    fn new(cleaned: CurveTable, diffs: ChannelTable<CurveDiff>, fits: FitTable, report: RunReport) -> Self {
        let FitTable {
            slope,
            offset,
            range_used,
            quality,
            outcomes,
        } = fits;
        Self {
            cleaned,
            diffs,
            slope,
            offset,
            range_used,
            quality,
            outcomes,
            report,
        }
    }
}

/// Filter then fit every channel of a single-range table.
///
/// FLE and FHE need `bias`; it is checked before any channel is touched.
/// A ULD kind fits the table as one ULD energy range with `gain`.
pub fn run_pipeline(
    params: &PipelineParams,
    curves: &CurveTable,
    gain: &ChannelTable<f64>,
    bias: Option<&ChannelTable<f64>>,
) -> Result<PipelineOutput> {
    let kind = params.kind;
    if kind.uses_bias() && bias.is_none() {
        return Err(ConfigurationError::MissingBias { kind: kind.name() });
    }
    let filter = params.curve_filter()?;

    log::info!(
        "{}: filtering (smoothing {})",
        kind,
        if params.smooth { "on" } else { "off" }
    );
    let filtered = filter.filter_table(curves);

    let window = params.window();
    log::info!("{}: fitting in {:.1}-{:.1} MeV", kind, window.low, window.high);
    let fits = if kind == DacKind::Uld {
        params.uld_fitter()?.fit_range(&filtered.curves, gain)
    } else {
        params.slope_fitter()?.fit_table(&filtered.curves, gain, bias)?
    };

    let mut report = RunReport::from_fits(kind.name(), &fits);
    report.add_filter_issues(None, &filtered.issues);
    report.log();
    Ok(PipelineOutput::new(filtered.curves, filtered.diffs, fits, report))
}

/// Cleaned curves and fits of the three ULD energy ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct UldPipelineOutput {
    pub cleaned: UldCurveTable,
    pub fits: UldFitTable,
    /// Issues of all three ranges; `total` counts channel-range pairs.
    pub report: RunReport,
}

/// ULD run over LEX8, LEX1 and HEX8, each with its own gain table.
///
/// The filter and fitter always run as ULD whatever `params.kind` says.
pub fn run_uld_pipeline(params: &PipelineParams, curves: &UldCurveTable, gains: &UldGains) -> Result<UldPipelineOutput> {
    let filter = CurveFilter::new(DacKind::Uld, params.smooth).with_params(params.filter.clone())?;
    let fitter = params.uld_fitter()?;

    log::info!("ULD: filtering three energy ranges");
    let filtered = filter.filter_uld_table(curves);
    let mut report = RunReport::new("ULD");
    for &range in UldRange::ALL {
        report.add_filter_issues(Some(range.name()), &filtered.range(range).issues);
    }

    let cleaned = filtered.into_curves();
    let fits = fitter.fit_table(&cleaned, gains);
    report.add_fits(&fits.lex8);
    report.add_fits(&fits.lex1);
    report.add_fits(&fits.hex8);
    report.log();

    Ok(UldPipelineOutput {
        cleaned,
        fits,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_overrides_merge_with_defaults() {
        let params = PipelineParams::from_json_str(
            r#"{ "kind": "fhe", "smooth": true, "window": { "low": 400.0, "high": 1200.0 },
                 "filter": { "floor_slope": 15.0 } }"#,
        )
        .unwrap();
        assert_eq!(params.kind, DacKind::Fhe);
        assert!(params.smooth);
        assert_eq!(params.window().low, 400.0);
        assert_eq!(params.filter.floor_slope, 15.0);
        assert_eq!(params.filter.outlier_step, FilterParams::default().outlier_step);
        assert_eq!(params.fit, FitParams::default());
    }

    #[test]
    fn empty_json_gives_defaults() {
        let params = PipelineParams::from_json_str("{}").unwrap();
        assert_eq!(params, PipelineParams::default());
        assert_eq!(params.window(), DacKind::Fle.default_window());
    }

    #[test]
    fn bad_config_is_rejected() {
        assert!(matches!(
            PipelineParams::from_json_str(r#"{ "kind": "xyz" }"#),
            Err(ConfigurationError::Parse(_))
        ));
        assert!(matches!(
            PipelineParams::from_json_str(r#"{ "window": { "low": 10.0, "high": 5.0 } }"#),
            Err(ConfigurationError::InvalidWindow { .. })
        ));
        assert!(matches!(
            PipelineParams::from_json_file("/nonexistent/cal.json"),
            Err(ConfigurationError::Io(_))
        ));
    }

    #[test]
    fn json_roundtrip() {
        let params = PipelineParams::new(DacKind::Lac);
        let json = params.to_json().unwrap();
        assert_eq!(PipelineParams::from_json_str(&json).unwrap(), params);
    }

    #[test]
    fn write_and_read_failures_are_told_apart() {
        let write = ConfigurationError::Serialize("key must be a string".into());
        let read = ConfigurationError::Parse("expected value".into());
        assert_eq!(write.to_string(), "cannot serialize config: key must be a string");
        assert_eq!(read.to_string(), "cannot parse config: expected value");
        assert_ne!(write, read);
    }

    #[test]
    fn fle_without_bias_fails_before_processing() {
        let params = PipelineParams::new(DacKind::Fle);
        let result = run_pipeline(&params, &CurveTable::default(), &ChannelTable::filled(1.0), None);
        assert_eq!(result.unwrap_err(), ConfigurationError::MissingBias { kind: "FLE" });
    }

    #[test]
    fn all_empty_table_is_a_failed_run() {
        let params = PipelineParams::new(DacKind::Lac);
        let output = run_pipeline(&params, &CurveTable::default(), &ChannelTable::filled(1.0), None).unwrap();
        assert_eq!(output.report.status(), crate::report::RunStatus::Fail);
        assert!(output.range_used.as_slice().iter().all(|r| *r == -1));
    }
}
