//! Threshold DAC settings from fitted slopes.

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelTable, DacRange, HALF_LEN};
use crate::kind::DacKind;

use super::{FitOutcome, FitRecord};

/// DAC register value and the range it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DacSetting {
    pub range: DacRange,
    pub dac: u8,
}

/// DAC setting that puts the threshold at `energy` MeV.
///
/// The target is converted to ADC the same way the fit window was
/// (`energy / gain - bias`, bias only for FLE and FHE), inverted through the
/// fitted line and clamped to the 0..=63 register range. Returns `None` when
/// the gain or fitted slope cannot be inverted.
pub fn dac_setting(record: &FitRecord, kind: DacKind, energy: f64, gain: f64, bias: f64) -> Option<DacSetting> {
    if !gain.is_finite() || gain <= 0.0 || !record.slope.is_finite() || record.slope == 0.0 {
        return None;
    }
    let bias = if kind.uses_bias() { bias } else { 0.0 };
    let adc = energy / gain - bias;
    let dac = ((adc - record.offset) / record.slope).round();
    if !dac.is_finite() {
        return None;
    }
    let max = (HALF_LEN - 1) as f64;
    Some(DacSetting {
        range: record.range,
        dac: dac.clamp(0.0, max) as u8,
    })
}

/// Settings for every channel; channels whose fit failed hold `None`.
pub fn settings_table(
    outcomes: &[FitOutcome],
    kind: DacKind,
    energy: f64,
    gain: &ChannelTable<f64>,
    bias: Option<&ChannelTable<f64>>,
) -> ChannelTable<Option<DacSetting>> {
    let mut table = ChannelTable::filled(None);
    for outcome in outcomes {
        let Ok(record) = &outcome.result else {
            continue;
        };
        let ch = outcome.channel;
        let b = bias.map_or(0.0, |t| *t.get(ch));
        table.set(ch, dac_setting(record, kind, energy, *gain.get(ch), b));
    }
    table
}
