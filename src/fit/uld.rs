//! ULD (upper level discriminator) slope fitting.
//!
//! ULD thresholds only live in the coarse range and run into the ADC
//! saturation plateau, which would drag a linear fit down, so the plateau
//! is cut before fitting.

use crate::channel::{
    self, ChannelId, ChannelTable, CurveTable, HalfCurve, UldCurveTable, UldRange, HALF_LEN,
};
use crate::error::{ConfigurationError, FitError, FitErrorKind, Result};
use crate::kind::{DacKind, EnergyWindow};

use super::{fit_coarse, FitOutcome, FitParams, FitTable};

/// Recorded coarse points with the trailing saturation plateau removed.
///
/// Every point equal to the value of the last recorded point is dropped.
pub fn strip_saturation(curve: &HalfCurve) -> Vec<(usize, f64)> {
    let Some(last) = curve.prev_nonzero(HALF_LEN) else {
        return Vec::new();
    };
    let saturated = curve[last];
    curve.points().filter(|(_, adc)| *adc != saturated).collect()
}

/// Gains per ULD energy range, each a per-channel table in MeV per ADC count.
#[derive(Debug, Clone, PartialEq)]
pub struct UldGains {
    ranges: [ChannelTable<f64>; 3],
}

impl UldGains {
    pub fn new(lex8: ChannelTable<f64>, lex1: ChannelTable<f64>, hex8: ChannelTable<f64>) -> Self {
        Self {
            ranges: [lex8, lex1, hex8],
        }
    }

    pub fn range(&self, range: UldRange) -> &ChannelTable<f64> {
        &self.ranges[range.index()]
    }
}

/// Fit tables for the three ULD energy ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct UldFitTable {
    pub lex8: FitTable,
    pub lex1: FitTable,
    pub hex8: FitTable,
}

impl UldFitTable {
    pub fn range(&self, range: UldRange) -> &FitTable {
        match range {
            UldRange::Lex8 => &self.lex8,
            UldRange::Lex1 => &self.lex1,
            UldRange::Hex8 => &self.hex8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UldFitter {
    window: EnergyWindow,
    min_points: usize,
    quality_limit: f64,
}

impl UldFitter {
    pub fn new(window: EnergyWindow) -> Result<Self> {
        window.validate()?;
        Ok(Self {
            window,
            min_points: FitParams::default().min_points,
            quality_limit: DacKind::Uld.default_quality_limit(),
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
        Ok(self)
    }

    /// Fit one channel's coarse curve for one energy range.
    pub fn fit_channel(&self, channel: ChannelId, coarse: &HalfCurve, gain: f64) -> FitOutcome {
        if !gain.is_finite() || gain <= 0.0 {
            return FitOutcome {
                channel,
                attempts: Vec::new(),
                result: Err(FitError::new(channel, FitErrorKind::InvalidGain { gain })),
            };
        }
        let (low, high) = (self.window.low / gain, self.window.high / gain);

        let points: Vec<(f64, f64)> = strip_saturation(coarse)
            .into_iter()
            .filter(|(_, adc)| *adc > low && *adc < high)
            .map(|(dac, adc)| (dac as f64, adc))
            .collect();
        let (attempt, result) = fit_coarse(channel, points, self.min_points, self.quality_limit);
        FitOutcome {
            channel,
            attempts: vec![attempt],
            result,
        }
    }

    pub fn window(&self) -> EnergyWindow {
        self.window
    }

    pub fn fit_range(&self, curves: &CurveTable, gain: &ChannelTable<f64>) -> FitTable {
        let outcomes = channel::map_channels(|ch| self.fit_channel(ch, &curves.curve(ch).coarse, *gain.get(ch)))
            .into_iter()
            .map(|(_, outcome)| outcome)
            .collect();
        FitTable::from_outcomes(outcomes)
    }

    pub fn fit_table(&self, curves: &UldCurveTable, gains: &UldGains) -> UldFitTable {
        let fit = |range: UldRange| self.fit_range(curves.range(range), gains.range(range));
        UldFitTable {
            lex8: fit(UldRange::Lex8),
            lex1: fit(UldRange::Lex1),
            hex8: fit(UldRange::Hex8),
        }
    }
}
