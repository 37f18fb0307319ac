//! ADC-vs-DAC curve conditioning.
//!
//! Each half curve goes through a fixed sequence of repair stages:
//! floor → (LAC fill | low extrapolation) → restore → outlier filter →
//! (high extrapolation, FLE coarse only) → optional smoothing.
//!
//! Every public entry point copies its input, so the caller's raw curve is
//! never modified and stays available for diagnostics.

pub mod extrapolate;
pub mod floor;
pub mod outlier;
pub mod restore;
pub mod smooth;

use serde::{Deserialize, Serialize};

use crate::channel::{
    self, ChannelId, ChannelTable, CurveTable, DacCurve, DacRange, HalfCurve, UldCurveTable,
    UldRange, HALF_LEN,
};
use crate::error::{ConfigurationError, FilterIssue, Result};
use crate::kind::DacKind;

/// Empirically tuned thresholds of the repair stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Floor: steps flatter than this (ADC per DAC step) look like pedestal.
    pub floor_slope: f64,
    /// Floor: a flat step starting below this ADC value is pedestal.
    pub floor_start_adc: f64,
    /// Floor: a flat step ending below this ADC value is pedestal.
    pub floor_end_adc: f64,
    /// Outlier filter: steps steeper than this are glitches.
    pub outlier_step: f64,
    /// LAC fill slope, ADC per DAC step.
    pub lac_fill_slope: f64,
    /// Points below the plateau used for the high extrapolation slope.
    pub high_span: usize,
    /// Boxcar half width (2 gives a 5-point average).
    pub smooth_half_width: usize,
    /// Fewer recorded points than this after floor triggers the LAC fill.
    pub lac_min_points: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            floor_slope: 20.0,
            floor_start_adc: 30.0,
            floor_end_adc: 100.0,
            outlier_step: 200.0,
            lac_fill_slope: 11.0,
            high_span: 10,
            smooth_half_width: 2,
            lac_min_points: 2,
        }
    }
}

impl FilterParams {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("floor_slope", self.floor_slope),
            ("floor_start_adc", self.floor_start_adc),
            ("floor_end_adc", self.floor_end_adc),
            ("outlier_step", self.outlier_step),
            ("lac_fill_slope", self.lac_fill_slope),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::InvalidParameter { name, value });
            }
        }
        if self.high_span == 0 || self.high_span >= HALF_LEN {
            return Err(ConfigurationError::InvalidParameter {
                name: "high_span",
                value: self.high_span as f64,
            });
        }
        if 2 * self.smooth_half_width >= HALF_LEN {
            return Err(ConfigurationError::InvalidParameter {
                name: "smooth_half_width",
                value: self.smooth_half_width as f64,
            });
        }
        Ok(())
    }
}

/// How much filtering moved one half curve.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HalfDiff {
    pub changed: usize,
    pub max_abs_change: f64,
}

impl HalfDiff {
    pub fn between(raw: &HalfCurve, cleaned: &HalfCurve) -> Self {
        raw.values()
            .iter()
            .zip(cleaned.values())
            .filter(|(a, b)| a != b)
            .fold(Self::default(), |acc, (a, b)| Self {
                changed: acc.changed + 1,
                max_abs_change: acc.max_abs_change.max((a - b).abs()),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CurveDiff {
    pub fine: HalfDiff,
    pub coarse: HalfDiff,
}

impl CurveDiff {
    pub fn between(raw: &DacCurve, cleaned: &DacCurve) -> Self {
        Self {
            fine: HalfDiff::between(&raw.fine, &cleaned.fine),
            coarse: HalfDiff::between(&raw.coarse, &cleaned.coarse),
        }
    }
}

/// A cleaned curve, how it differs from the raw one and what could not be repaired.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredCurve {
    pub curve: DacCurve,
    pub diff: CurveDiff,
    pub issues: Vec<FilterIssue>,
}

/// Cleaned curves for a whole table.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredTable {
    pub curves: CurveTable,
    pub diffs: ChannelTable<CurveDiff>,
    /// Degraded halves, in channel order.
    pub issues: Vec<(ChannelId, FilterIssue)>,
}

/// Cleaned curves of the three ULD energy ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredUldTable {
    pub lex8: FilteredTable,
    pub lex1: FilteredTable,
    pub hex8: FilteredTable,
}

impl FilteredUldTable {
    pub fn range(&self, range: UldRange) -> &FilteredTable {
        match range {
            UldRange::Lex8 => &self.lex8,
            UldRange::Lex1 => &self.lex1,
            UldRange::Hex8 => &self.hex8,
        }
    }

    pub fn into_curves(self) -> UldCurveTable {
        UldCurveTable::new(self.lex8.curves, self.lex1.curves, self.hex8.curves)
    }
}

/// Per-channel curve conditioning for one discriminator kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveFilter {
    kind: DacKind,
    smooth: bool,
    params: FilterParams,
}

impl CurveFilter {
    pub fn new(kind: DacKind, smooth: bool) -> Self {
        Self {
            kind,
            smooth,
            params: FilterParams::default(),
        }
    }

    /// Build from a discriminator name such as `"fle_dac"` or `"log_acpt"`.
    pub fn from_name(name: &str, smooth: bool) -> Result<Self> {
        Ok(Self::new(name.parse()?, smooth))
    }

    pub fn with_params(mut self, params: FilterParams) -> Result<Self> {
        params.validate()?;
        self.params = params;
        Ok(self)
    }

    pub fn kind(&self) -> DacKind {
        self.kind
    }

    pub fn smoothing(&self) -> bool {
        self.smooth
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    pub fn floor(&self, curve: &HalfCurve) -> HalfCurve {
        let mut work = *curve;
        floor::apply_floor(
            &mut work,
            self.params.floor_slope,
            self.params.floor_start_adc,
            self.params.floor_end_adc,
        );
        work
    }

    pub fn filter(&self, curve: &HalfCurve) -> HalfCurve {
        let mut work = *curve;
        outlier::apply_outlier_filter(&mut work, self.params.outlier_step);
        work
    }

    pub fn restore(&self, curve: &HalfCurve) -> HalfCurve {
        let mut work = *curve;
        restore::apply_restore(&mut work);
        work
    }

    pub fn extrapolate_low(&self, curve: &HalfCurve) -> HalfCurve {
        let mut work = *curve;
        extrapolate::apply_extrapolate_low(&mut work);
        work
    }

    pub fn extrapolate_high(&self, curve: &HalfCurve) -> HalfCurve {
        let mut work = *curve;
        extrapolate::apply_extrapolate_high(&mut work, self.params.high_span);
        work
    }

    pub fn fill_lac(&self, curve: &HalfCurve) -> HalfCurve {
        let mut work = *curve;
        extrapolate::apply_fill_lac(&mut work, self.params.lac_fill_slope);
        work
    }

    pub fn smooth(&self, curve: &HalfCurve) -> HalfCurve {
        let mut work = *curve;
        smooth::apply_smooth(&mut work, self.params.smooth_half_width);
        work
    }

    /// Run every stage on one half curve.
    pub fn run_half(&self, range: DacRange, raw: &HalfCurve) -> HalfCurve {
        self.clean_half(range, raw).0
    }

    fn clean_half(&self, range: DacRange, raw: &HalfCurve) -> (HalfCurve, Option<FilterIssue>) {
        let p = &self.params;
        let mut work = *raw;
        let mut issue = None;

        // Step 1: pedestal and isolated spikes
        floor::apply_floor(&mut work, p.floor_slope, p.floor_start_adc, p.floor_end_adc);

        // Step 2: low end, from the LAC fixed slope or the first two points
        let points = work.nonzero_count();
        if self.kind == DacKind::Lac && points < p.lac_min_points {
            log::debug!(
                "{} {}: {} points after floor, using LAC fill",
                self.kind,
                range.name(),
                points
            );
            extrapolate::apply_fill_lac(&mut work, p.lac_fill_slope);
        } else {
            if points == 1 {
                issue = Some(FilterIssue::InsufficientData { range, points });
            }
            extrapolate::apply_extrapolate_low(&mut work);
        }

        // Step 3: interior gaps
        restore::apply_restore(&mut work);

        // Step 4: glitches
        outlier::apply_outlier_filter(&mut work, p.outlier_step);

        // Step 5: saturation plateau (FLE coarse only)
        if self.kind == DacKind::Fle && range == DacRange::Coarse {
            extrapolate::apply_extrapolate_high(&mut work, p.high_span);
        }

        // Step 6: smoothing
        if self.smooth {
            smooth::apply_smooth(&mut work, p.smooth_half_width);
        }

        (work, issue)
    }

    pub fn run(&self, raw: &DacCurve) -> FilteredCurve {
        let (fine, fine_issue) = self.clean_half(DacRange::Fine, &raw.fine);
        let (coarse, coarse_issue) = self.clean_half(DacRange::Coarse, &raw.coarse);
        let curve = DacCurve::new(fine, coarse);
        FilteredCurve {
            curve,
            diff: CurveDiff::between(raw, &curve),
            issues: fine_issue.into_iter().chain(coarse_issue).collect(),
        }
    }

    /// Clean every channel of a table. Channels are independent.
    pub fn filter_table(&self, raw: &CurveTable) -> FilteredTable {
        let results = channel::map_channels(|ch| self.run(&raw.curve(ch)));

        let mut curves = CurveTable::default();
        let mut diffs = ChannelTable::filled(CurveDiff::default());
        let mut issues = Vec::new();
        let mut touched = 0;
        for (ch, filtered) in results {
            curves.set(ch, &filtered.curve);
            if filtered.diff != CurveDiff::default() {
                touched += 1;
            }
            diffs.set(ch, filtered.diff);
            issues.extend(filtered.issues.into_iter().map(|issue| (ch, issue)));
        }
        log::debug!(
            "{}: filtering changed {} channels, {} degraded halves",
            self.kind,
            touched,
            issues.len()
        );

        FilteredTable {
            curves,
            diffs,
            issues,
        }
    }

    /// Clean all three energy ranges of a ULD table.
    pub fn filter_uld_table(&self, raw: &UldCurveTable) -> FilteredUldTable {
        FilteredUldTable {
            lex8: self.filter_table(raw.range(UldRange::Lex8)),
            lex1: self.filter_table(raw.range(UldRange::Lex1)),
            hex8: self.filter_table(raw.range(UldRange::Hex8)),
        }
    }
}
