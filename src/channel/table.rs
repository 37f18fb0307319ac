use serde::{Deserialize, Serialize};

use super::{ChannelId, DacCurve, N_CHANNELS, SWEEP_LEN};

/// A value per channel, laid out as `[tower][row][end][fe]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTable<T> {
    data: Vec<T>,
}

impl<T: Clone> ChannelTable<T> {
    /// Every channel set to `value`.
    pub fn filled(value: T) -> Self {
        Self {
            data: vec![value; N_CHANNELS],
        }
    }
}

impl<T> ChannelTable<T> {
    pub fn from_fn(mut f: impl FnMut(ChannelId) -> T) -> Self {
        Self {
            data: ChannelId::all().map(&mut f).collect(),
        }
    }

    /// Returns `None` unless `data` has one entry per channel.
    pub fn from_vec(data: Vec<T>) -> Option<Self> {
        (data.len() == N_CHANNELS).then_some(Self { data })
    }

    pub fn get(&self, channel: ChannelId) -> &T {
        &self.data[channel.index()]
    }

    pub fn set(&mut self, channel: ChannelId, value: T) {
        self.data[channel.index()] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &T)> {
        ChannelId::all().zip(self.data.iter())
    }
}

/// Raw or cleaned ADC-vs-DAC sweeps for every channel, `float[16][8][2][12][128]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveTable {
    data: Vec<f64>,
}

impl Default for CurveTable {
    fn default() -> Self {
        Self {
            data: vec![0.0; N_CHANNELS * SWEEP_LEN],
        }
    }
}

impl CurveTable {
    /// Wrap a flat table; returns `None` if the length does not match.
    pub fn from_flat(data: Vec<f64>) -> Option<Self> {
        (data.len() == N_CHANNELS * SWEEP_LEN).then_some(Self { data })
    }

    pub fn from_fn(mut f: impl FnMut(ChannelId) -> DacCurve) -> Self {
        let mut table = Self::default();
        for channel in ChannelId::all() {
            table.set(channel, &f(channel));
        }
        table
    }

    pub fn as_flat(&self) -> &[f64] {
        &self.data
    }

    pub fn sweep(&self, channel: ChannelId) -> &[f64] {
        let start = channel.index() * SWEEP_LEN;
        &self.data[start..start + SWEEP_LEN]
    }

    pub fn curve(&self, channel: ChannelId) -> DacCurve {
        // Slice length is fixed by construction.
        DacCurve::from_sweep(self.sweep(channel)).unwrap_or_default()
    }

    pub fn set(&mut self, channel: ChannelId, curve: &DacCurve) {
        let start = channel.index() * SWEEP_LEN;
        self.data[start..start + SWEEP_LEN].copy_from_slice(&curve.to_sweep());
    }
}

/// Energy range of a ULD characterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UldRange {
    Lex8,
    Lex1,
    Hex8,
}

impl UldRange {
    pub const ALL: &[UldRange] = &[UldRange::Lex8, UldRange::Lex1, UldRange::Hex8];

    pub fn name(self) -> &'static str {
        match self {
            UldRange::Lex8 => "LEX8",
            UldRange::Lex1 => "LEX1",
            UldRange::Hex8 => "HEX8",
        }
    }

    pub fn index(self) -> usize {
        match self {
            UldRange::Lex8 => 0,
            UldRange::Lex1 => 1,
            UldRange::Hex8 => 2,
        }
    }
}

/// ULD sweeps, `float[3][16][8][2][12][128]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UldCurveTable {
    ranges: [CurveTable; 3],
}

impl UldCurveTable {
    pub fn new(lex8: CurveTable, lex1: CurveTable, hex8: CurveTable) -> Self {
        Self {
            ranges: [lex8, lex1, hex8],
        }
    }

    pub fn range(&self, range: UldRange) -> &CurveTable {
        &self.ranges[range.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::HalfCurve;

    #[test]
    fn curve_set_and_get() {
        let mut table = CurveTable::default();
        let channel = ChannelId::new(15, 7, 1, 11).unwrap();
        let curve = DacCurve::new(
            HalfCurve::from_fn(|i| i as f64),
            HalfCurve::from_fn(|i| 100.0 + i as f64),
        );
        table.set(channel, &curve);
        assert_eq!(table.curve(channel), curve);
        let other = ChannelId::new(0, 0, 0, 0).unwrap();
        assert_eq!(table.curve(other), DacCurve::default());
    }

    #[test]
    fn channel_table_from_fn_is_keyed_by_channel() {
        let table = ChannelTable::from_fn(|ch| ch.tower() as f64);
        let channel = ChannelId::new(9, 1, 0, 3).unwrap();
        assert_eq!(*table.get(channel), 9.0);
        assert!(ChannelTable::<f64>::from_vec(vec![0.0; 3]).is_none());
    }
}
