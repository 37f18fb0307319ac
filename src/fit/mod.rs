//! DAC slope fitting.
//!
//! A threshold curve is linear in its useful region, so each channel is
//! reduced to `adc = slope * dac + offset` over the points whose ADC value
//! falls inside the energy window. The fine range is tried first; a fine fit
//! that is impossible, poor or physically implausible falls back once to the
//! coarse range.

pub mod linear;
pub mod settings;
pub mod uld;

use serde::{Deserialize, Serialize};

use crate::channel::{self, ChannelId, ChannelTable, CurveTable, DacCurve, DacRange, HalfCurve, HALF_LEN};
use crate::error::{ConfigurationError, FitError, FitErrorKind, FitWarning, Result};
use crate::kind::{DacKind, EnergyWindow};

pub use linear::{fit_line, LinearFit};

/// Overrides for the per-kind fit constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParams {
    /// Minimum points inside the window for a fit.
    pub min_points: usize,
    /// Fit quality (SSR / n) limit; the kind's default when `None`.
    pub quality_limit: Option<f64>,
    /// Fine slope band in MeV per DAC step; the kind's default when `None`.
    pub slope_band: Option<(f64, f64)>,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            min_points: 3,
            quality_limit: None,
            slope_band: None,
        }
    }
}

/// Accepted per-channel fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitRecord {
    pub slope: f64,
    pub offset: f64,
    pub range: DacRange,
    pub quality: f64,
    pub points: usize,
    pub warnings: Vec<FitWarning>,
}

impl FitRecord {
    fn accept(range: DacRange, fit: LinearFit) -> Self {
        Self {
            slope: fit.slope,
            offset: fit.offset,
            range,
            quality: fit.quality,
            points: fit.points,
            warnings: Vec::new(),
        }
    }

    /// ADC threshold predicted at a DAC setting of the fitted range.
    pub fn adc_at(&self, dac: f64) -> f64 {
        self.slope * dac + self.offset
    }
}

/// Why a fit attempt on one range was not accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    TooFewPoints { points: usize, required: usize },
    /// The last fine point is still inside the window; the window reaches past the fine range.
    WindowBeyondRange,
    /// The regression had no finite solution. Window points come from
    /// distinct DAC indices, so this needs non-finite input to happen.
    Singular,
    Quality { quality: f64, limit: f64 },
    SlopeOutOfBand { slope: f64, low: f64, high: f64 },
}

/// One pass of the fit on one range.
#[derive(Debug, Clone, PartialEq)]
pub struct FitAttempt {
    pub range: DacRange,
    pub points: usize,
    pub fit: Option<LinearFit>,
    pub rejection: Option<Rejection>,
}

/// Per-channel fit progression: `TryFine → {Success | TryCoarse}`,
/// `TryCoarse → {Success | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitState {
    Init,
    TryFine,
    TryCoarse,
    Success(DacRange),
    Failed,
}

/// Everything known about one channel's fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub channel: ChannelId,
    pub attempts: Vec<FitAttempt>,
    pub result: std::result::Result<FitRecord, FitError>,
}

impl FitOutcome {
    /// Terminal state reached.
    pub fn state(&self) -> FitState {
        match &self.result {
            Ok(record) => FitState::Success(record.range),
            Err(_) => FitState::Failed,
        }
    }

    /// States visited, from `Init` to the terminal one.
    pub fn path(&self) -> Vec<FitState> {
        let mut path = vec![FitState::Init];
        for attempt in &self.attempts {
            path.push(match attempt.range {
                DacRange::Fine => FitState::TryFine,
                DacRange::Coarse => FitState::TryCoarse,
            });
        }
        path.push(self.state());
        path
    }

    /// True when a fine fit was computed but rejected on quality or slope.
    pub fn fell_back(&self) -> bool {
        self.attempts.iter().any(|a| {
            a.range == DacRange::Fine
                && matches!(
                    a.rejection,
                    Some(Rejection::Quality { .. } | Rejection::SlopeOutOfBand { .. })
                )
        })
    }
}

/// Fit results for a whole table.
///
/// Failed channels hold `NaN` slope and offset and a range flag of `-1`.
#[derive(Debug, Clone, PartialEq)]
pub struct FitTable {
    pub slope: ChannelTable<f64>,
    pub offset: ChannelTable<f64>,
    pub range_used: ChannelTable<i8>,
    pub quality: ChannelTable<f64>,
    pub outcomes: Vec<FitOutcome>,
}

impl FitTable {
    pub fn from_outcomes(outcomes: Vec<FitOutcome>) -> Self {
        let mut slope = ChannelTable::filled(f64::NAN);
        let mut offset = ChannelTable::filled(f64::NAN);
        let mut range_used = ChannelTable::filled(-1i8);
        let mut quality = ChannelTable::filled(f64::NAN);
        for outcome in &outcomes {
            if let Ok(record) = &outcome.result {
                slope.set(outcome.channel, record.slope);
                offset.set(outcome.channel, record.offset);
                range_used.set(outcome.channel, record.range.flag());
                quality.set(outcome.channel, record.quality);
            }
        }
        Self {
            slope,
            offset,
            range_used,
            quality,
            outcomes,
        }
    }

    /// Outcome for `channel`. Full tables are indexed directly; partial
    /// ones fall back to a scan.
    pub fn outcome(&self, channel: ChannelId) -> Option<&FitOutcome> {
        match self.outcomes.get(channel.index()) {
            Some(outcome) if outcome.channel == channel => Some(outcome),
            _ => self.outcomes.iter().find(|o| o.channel == channel),
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &FitError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }
}

/// Points `(dac, adc)` of a half curve strictly inside `(low, high)`.
pub fn window_points(curve: &HalfCurve, low: f64, high: f64) -> Vec<(f64, f64)> {
    curve
        .points()
        .filter(|(_, adc)| *adc > low && *adc < high)
        .map(|(dac, adc)| (dac as f64, adc))
        .collect()
}

/// Terminal coarse fit: there is nothing left to fall back to, so a poor
/// fit is kept with a warning and only missing or degenerate data fails.
fn fit_coarse(
    channel: ChannelId,
    points: Vec<(f64, f64)>,
    min_points: usize,
    quality_limit: f64,
) -> (FitAttempt, std::result::Result<FitRecord, FitError>) {
    let range = DacRange::Coarse;
    let mut attempt = FitAttempt {
        range,
        points: points.len(),
        fit: None,
        rejection: None,
    };

    if points.len() < min_points {
        attempt.rejection = Some(Rejection::TooFewPoints {
            points: points.len(),
            required: min_points,
        });
        let error = FitError::new(
            channel,
            FitErrorKind::InsufficientData {
                range,
                points: points.len(),
                required: min_points,
            },
        );
        return (attempt, Err(error));
    }

    let Some(fit) = fit_line(&points) else {
        attempt.rejection = Some(Rejection::Singular);
        let error = FitError::new(
            channel,
            FitErrorKind::SingularFit {
                range,
                points: points.len(),
            },
        );
        return (attempt, Err(error));
    };
    attempt.fit = Some(fit);

    let mut record = FitRecord::accept(range, fit);
    if fit.quality > quality_limit {
        record.warnings.push(FitWarning::FitQuality {
            range,
            quality: fit.quality,
            limit: quality_limit,
        });
    }
    (attempt, Ok(record))
}

/// Linear DAC slope fitter for LAC, FLE and FHE thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct SlopeFitter {
    kind: DacKind,
    window: EnergyWindow,
    min_points: usize,
    quality_limit: f64,
    slope_band: Option<(f64, f64)>,
}

impl SlopeFitter {
    pub fn new(kind: DacKind, window: EnergyWindow) -> Result<Self> {
        window.validate()?;
        Ok(Self {
            kind,
            window,
            min_points: FitParams::default().min_points,
            quality_limit: kind.default_quality_limit(),
            slope_band: kind.default_slope_band(),
        })
    }

    pub fn with_params(mut self, params: &FitParams) -> Result<Self> {
        if params.min_points < 2 {
            return Err(ConfigurationError::InvalidParameter {
                name: "min_points",
                value: params.min_points as f64,
            });
        }
        self.min_points = params.min_points;
        if let Some(limit) = params.quality_limit {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(ConfigurationError::InvalidParameter {
                    name: "quality_limit",
                    value: limit,
                });
            }
            self.quality_limit = limit;
        }
        if let Some((low, high)) = params.slope_band {
            if !(low.is_finite() && high.is_finite() && low < high) {
                return Err(ConfigurationError::InvalidParameter {
                    name: "slope_band",
                    value: low,
                });
            }
            self.slope_band = Some((low, high));
        }
        Ok(self)
    }

    pub fn kind(&self) -> DacKind {
        self.kind
    }

    pub fn window(&self) -> EnergyWindow {
        self.window
    }

    pub fn quality_limit(&self) -> f64 {
        self.quality_limit
    }

    /// Map the energy window to ADC bounds for a channel.
    pub fn adc_window(&self, gain: f64, bias: f64) -> std::result::Result<(f64, f64), FitErrorKind> {
        if !gain.is_finite() || gain <= 0.0 {
            return Err(FitErrorKind::InvalidGain { gain });
        }
        let bias = if self.kind.uses_bias() { bias } else { 0.0 };
        Ok((
            self.window.low / gain - bias,
            self.window.high / gain - bias,
        ))
    }

    /// Run the fine/coarse fit for one channel.
    pub fn fit_channel(&self, channel: ChannelId, curve: &DacCurve, gain: f64, bias: f64) -> FitOutcome {
        let mut attempts = Vec::with_capacity(2);
        let (low, high) = match self.adc_window(gain, bias) {
            Ok(bounds) => bounds,
            Err(kind) => {
                return FitOutcome {
                    channel,
                    attempts,
                    result: Err(FitError::new(channel, kind)),
                };
            }
        };

        let fine = self.try_fine(&curve.fine, low, high, gain);
        let accepted = match (fine.fit, fine.rejection) {
            (Some(fit), None) => Some(fit),
            (_, rejection) => {
                log::debug!("{} {}: fine rejected ({:?})", self.kind, channel, rejection);
                None
            }
        };
        attempts.push(fine);

        let result = match accepted {
            Some(fit) => Ok(FitRecord::accept(DacRange::Fine, fit)),
            None => {
                let (coarse, result) = self.try_coarse(channel, &curve.coarse, low, high);
                attempts.push(coarse);
                result
            }
        };

        FitOutcome {
            channel,
            attempts,
            result,
        }
    }

    fn try_fine(&self, fine: &HalfCurve, low: f64, high: f64, gain: f64) -> FitAttempt {
        let points = window_points(fine, low, high);
        let mut attempt = FitAttempt {
            range: DacRange::Fine,
            points: points.len(),
            fit: None,
            rejection: None,
        };

        if points.len() < self.min_points {
            attempt.rejection = Some(Rejection::TooFewPoints {
                points: points.len(),
                required: self.min_points,
            });
            return attempt;
        }
        let top = fine[HALF_LEN - 1];
        if top > low && top < high {
            attempt.rejection = Some(Rejection::WindowBeyondRange);
            return attempt;
        }

        let Some(fit) = fit_line(&points) else {
            attempt.rejection = Some(Rejection::Singular);
            return attempt;
        };
        attempt.fit = Some(fit);

        if fit.quality > self.quality_limit {
            attempt.rejection = Some(Rejection::Quality {
                quality: fit.quality,
                limit: self.quality_limit,
            });
        } else if let Some((band_low, band_high)) = self.slope_band {
            let (low, high) = (band_low / gain, band_high / gain);
            if fit.slope < low || fit.slope > high {
                attempt.rejection = Some(Rejection::SlopeOutOfBand {
                    slope: fit.slope,
                    low,
                    high,
                });
            }
        }
        attempt
    }

    fn try_coarse(
        &self,
        channel: ChannelId,
        coarse: &HalfCurve,
        low: f64,
        high: f64,
    ) -> (FitAttempt, std::result::Result<FitRecord, FitError>) {
        fit_coarse(channel, window_points(coarse, low, high), self.min_points, self.quality_limit)
    }

    /// Fit every channel of a cleaned table.
    ///
    /// FLE and FHE need a bias table; LAC ignores it.
    pub fn fit_table(
        &self,
        curves: &CurveTable,
        gain: &ChannelTable<f64>,
        bias: Option<&ChannelTable<f64>>,
    ) -> Result<FitTable> {
        if self.kind.uses_bias() && bias.is_none() {
            return Err(ConfigurationError::MissingBias {
                kind: self.kind.name(),
            });
        }

        let outcomes: Vec<FitOutcome> = channel::map_channels(|ch| {
            let b = bias.map_or(0.0, |table| *table.get(ch));
            self.fit_channel(ch, &curves.curve(ch), *gain.get(ch), b)
        })
        .into_iter()
        .map(|(_, outcome)| outcome)
        .collect();

        Ok(FitTable::from_outcomes(outcomes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn channel() -> ChannelId {
        ChannelId::new(2, 3, 0, 7).unwrap()
    }

    fn line(slope: f64, offset: f64) -> HalfCurve {
        HalfCurve::from_fn(|d| slope * d as f64 + offset)
    }

    fn fle_fitter(low: f64, high: f64) -> SlopeFitter {
        SlopeFitter::new(DacKind::Fle, EnergyWindow::new(low, high).unwrap()).unwrap()
    }

    #[test]
    fn in_band_fine_slope_is_kept() {
        let fitter = fle_fitter(20.0, 50.0);
        let curve = DacCurve::new(line(1.0, 5.0), line(4.0, 0.0));
        let outcome = fitter.fit_channel(channel(), &curve, 1.0, 0.0);
        let record = outcome.result.as_ref().unwrap();
        assert_eq!(record.range, DacRange::Fine);
        assert_abs_diff_eq!(record.slope, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(record.offset, 5.0, epsilon = 1e-9);
        assert_eq!(
            outcome.path(),
            vec![FitState::Init, FitState::TryFine, FitState::Success(DacRange::Fine)]
        );
    }

    #[test]
    fn out_of_band_fine_slope_falls_back_to_coarse() {
        let fitter = fle_fitter(20.0, 50.0);
        let curve = DacCurve::new(line(1.5, 0.0), line(4.0, 0.0));
        let outcome = fitter.fit_channel(channel(), &curve, 1.0, 0.0);
        let record = outcome.result.as_ref().unwrap();
        assert_eq!(record.range, DacRange::Coarse);
        assert_eq!(record.range.flag(), 1);
        assert_abs_diff_eq!(record.slope, 4.0, epsilon = 1e-9);
        assert!(outcome.fell_back());
        assert!(matches!(
            outcome.attempts[0].rejection,
            Some(Rejection::SlopeOutOfBand { .. })
        ));
    }

    #[test]
    fn window_past_fine_range_goes_to_coarse() {
        let fitter = fle_fitter(20.0, 80.0);
        // fine top is 68, still inside the window
        let curve = DacCurve::new(line(1.0, 5.0), line(4.0, 0.0));
        let outcome = fitter.fit_channel(channel(), &curve, 1.0, 0.0);
        assert_eq!(outcome.state(), FitState::Success(DacRange::Coarse));
        assert_eq!(
            outcome.attempts[0].rejection,
            Some(Rejection::WindowBeyondRange)
        );
        assert!(!outcome.fell_back());
    }

    #[test]
    fn bias_shifts_the_adc_window_for_fle_only() {
        let window = EnergyWindow::new(20.0, 50.0).unwrap();
        let fle = SlopeFitter::new(DacKind::Fle, window).unwrap();
        let lac = SlopeFitter::new(DacKind::Lac, window).unwrap();
        assert_eq!(fle.adc_window(2.0, 3.0), Ok((7.0, 22.0)));
        assert_eq!(lac.adc_window(2.0, 3.0), Ok((10.0, 25.0)));
        assert_eq!(
            fle.adc_window(0.0, 3.0),
            Err(FitErrorKind::InvalidGain { gain: 0.0 })
        );
    }

    #[test]
    fn coarse_without_points_is_insufficient_data() {
        let fitter = fle_fitter(20.0, 50.0);
        let curve = DacCurve::new(HalfCurve::default(), HalfCurve::default());
        let outcome = fitter.fit_channel(channel(), &curve, 1.0, 0.0);
        assert_eq!(
            outcome.path(),
            vec![
                FitState::Init,
                FitState::TryFine,
                FitState::TryCoarse,
                FitState::Failed
            ]
        );
        assert_eq!(
            outcome.result.unwrap_err().kind,
            FitErrorKind::InsufficientData {
                range: DacRange::Coarse,
                points: 0,
                required: 3
            }
        );
    }

    #[test]
    fn poor_coarse_fit_is_accepted_with_a_warning() {
        let fitter = SlopeFitter::new(DacKind::Lac, EnergyWindow::new(100.0, 1000.0).unwrap())
            .unwrap()
            .with_params(&FitParams {
                quality_limit: Some(1.0),
                ..FitParams::default()
            })
            .unwrap();
        let mut coarse = line(20.0, 0.0);
        for d in (0..HALF_LEN).step_by(2) {
            coarse[d] += 10.0;
        }
        let curve = DacCurve::new(HalfCurve::default(), coarse);
        let outcome = fitter.fit_channel(channel(), &curve, 1.0, 0.0);
        let record = outcome.result.unwrap();
        assert_eq!(record.range, DacRange::Coarse);
        assert_eq!(record.warnings.len(), 1);
    }

    #[test]
    fn repeated_dac_values_are_a_singular_coarse_fit() {
        let points = vec![(12.0, 100.0), (12.0, 110.0), (12.0, 120.0)];
        let (attempt, result) = fit_coarse(channel(), points, 3, 1000.0);
        assert_eq!(attempt.rejection, Some(Rejection::Singular));
        assert!(attempt.fit.is_none());
        let error = result.unwrap_err();
        assert_eq!(
            error.kind,
            FitErrorKind::SingularFit {
                range: DacRange::Coarse,
                points: 3
            }
        );
        assert_eq!(error.tag(), "singular_fit");
    }

    #[test]
    fn outcome_lookup_on_full_and_partial_tables() {
        let fitter = fle_fitter(20.0, 50.0);
        let curves = CurveTable::from_fn(|_| DacCurve::new(line(1.0, 5.0), line(4.0, 0.0)));
        let gain = ChannelTable::filled(1.0);
        let bias = ChannelTable::filled(0.0);
        let full = fitter.fit_table(&curves, &gain, Some(&bias)).unwrap();
        for ch in [ChannelId::new(0, 0, 0, 0).unwrap(), channel(), ChannelId::new(15, 7, 1, 11).unwrap()] {
            assert_eq!(full.outcome(ch).map(|o| o.channel), Some(ch));
        }

        // two outcomes stored out of index position
        let curve = DacCurve::new(line(1.0, 5.0), line(4.0, 0.0));
        let late = ChannelId::new(9, 1, 0, 4).unwrap();
        let partial = FitTable::from_outcomes(vec![
            fitter.fit_channel(late, &curve, 1.0, 0.0),
            fitter.fit_channel(channel(), &curve, 1.0, 0.0),
        ]);
        assert_eq!(partial.outcome(channel()).map(|o| o.channel), Some(channel()));
        assert_eq!(partial.outcome(late).map(|o| o.channel), Some(late));
        assert!(partial.outcome(ChannelId::new(1, 0, 0, 0).unwrap()).is_none());
    }

    #[test]
    fn missing_bias_table_is_a_configuration_error() {
        let fitter = fle_fitter(20.0, 50.0);
        let gain = ChannelTable::filled(1.0);
        let result = fitter.fit_table(&CurveTable::default(), &gain, None);
        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::MissingBias { kind: "FLE" }
        );
    }
}
