use std::ops::{Index, IndexMut};

use super::DacRange;

/// Points in one half (fine or coarse) of a DAC sweep.
pub const HALF_LEN: usize = 64;
/// Points in a full fine + coarse sweep.
pub const SWEEP_LEN: usize = 2 * HALF_LEN;

/// One 64-point ADC-vs-DAC half curve.
///
/// A value of exactly `0.0` means no measurement was recorded at that DAC
/// setting; it is never a genuine zero response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfCurve([f64; HALF_LEN]);

impl Default for HalfCurve {
    fn default() -> Self {
        Self([0.0; HALF_LEN])
    }
}

impl HalfCurve {
    pub fn new(values: [f64; HALF_LEN]) -> Self {
        Self(values)
    }

    /// Returns `None` unless `values` holds exactly 64 points.
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        let array: [f64; HALF_LEN] = values.try_into().ok()?;
        Some(Self(array))
    }

    /// Build a curve by evaluating `f` at every DAC index.
    pub fn from_fn(f: impl FnMut(usize) -> f64) -> Self {
        Self(std::array::from_fn(f))
    }

    pub fn values(&self) -> &[f64; HALF_LEN] {
        &self.0
    }

    pub fn values_mut(&mut self) -> &mut [f64; HALF_LEN] {
        &mut self.0
    }

    pub fn is_missing(&self, dac: usize) -> bool {
        self.0[dac] == 0.0
    }

    pub fn nonzero_count(&self) -> usize {
        self.0.iter().filter(|v| **v != 0.0).count()
    }

    pub fn first_nonzero(&self) -> Option<usize> {
        self.next_nonzero(0)
    }

    /// First recorded point at or after `from`.
    pub fn next_nonzero(&self, from: usize) -> Option<usize> {
        (from..HALF_LEN).find(|&i| self.0[i] != 0.0)
    }

    /// Last recorded point strictly before `before`.
    pub fn prev_nonzero(&self, before: usize) -> Option<usize> {
        (0..before.min(HALF_LEN)).rev().find(|&i| self.0[i] != 0.0)
    }

    /// Recorded `(dac, adc)` pairs in DAC order.
    pub fn points(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i, *v))
    }
}

impl Index<usize> for HalfCurve {
    type Output = f64;

    fn index(&self, dac: usize) -> &f64 {
        &self.0[dac]
    }
}

impl IndexMut<usize> for HalfCurve {
    fn index_mut(&mut self, dac: usize) -> &mut f64 {
        &mut self.0[dac]
    }
}

/// A full characterization sweep split into its fine and coarse halves.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DacCurve {
    pub fine: HalfCurve,
    pub coarse: HalfCurve,
}

impl DacCurve {
    pub fn new(fine: HalfCurve, coarse: HalfCurve) -> Self {
        Self { fine, coarse }
    }

    /// Split a flat 128-point sweep (fine = 0..64, coarse = 64..128).
    pub fn from_sweep(sweep: &[f64]) -> Option<Self> {
        if sweep.len() != SWEEP_LEN {
            return None;
        }
        Some(Self {
            fine: HalfCurve::from_slice(&sweep[..HALF_LEN])?,
            coarse: HalfCurve::from_slice(&sweep[HALF_LEN..])?,
        })
    }

    pub fn to_sweep(&self) -> [f64; SWEEP_LEN] {
        let mut sweep = [0.0; SWEEP_LEN];
        sweep[..HALF_LEN].copy_from_slice(self.fine.values());
        sweep[HALF_LEN..].copy_from_slice(self.coarse.values());
        sweep
    }

    pub fn half(&self, range: DacRange) -> &HalfCurve {
        match range {
            DacRange::Fine => &self.fine,
            DacRange::Coarse => &self.coarse,
        }
    }

    pub fn half_mut(&mut self, range: DacRange) -> &mut HalfCurve {
        match range {
            DacRange::Fine => &mut self.fine,
            DacRange::Coarse => &mut self.coarse,
        }
    }
}
