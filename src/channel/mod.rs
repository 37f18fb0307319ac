//! Channel addressing and per-channel tables.
//!
//! A CAL channel is one front-end discriminator on one crystal end:
//! (tower, row, end, front-end). Every table in this crate is keyed by it.

pub mod curve;
pub mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use curve::{DacCurve, HalfCurve, HALF_LEN, SWEEP_LEN};
pub use table::{ChannelTable, CurveTable, UldCurveTable, UldRange};

pub const N_TOWERS: usize = 16;
pub const N_ROWS: usize = 8;
pub const N_ENDS: usize = 2;
pub const N_FE: usize = 12;
pub const N_CHANNELS: usize = N_TOWERS * N_ROWS * N_ENDS * N_FE;

/// Which half of the 128-point DAC sweep a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DacRange {
    Fine,
    Coarse,
}

impl DacRange {
    pub const ALL: &[DacRange] = &[DacRange::Fine, DacRange::Coarse];

    pub fn name(self) -> &'static str {
        match self {
            DacRange::Fine => "FINE",
            DacRange::Coarse => "COARSE",
        }
    }

    /// Range flag as written to calibration tables (0 = fine, 1 = coarse).
    pub fn flag(self) -> i8 {
        match self {
            DacRange::Fine => 0,
            DacRange::Coarse => 1,
        }
    }
}

/// Physical address of one calibration channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    tower: u8,
    row: u8,
    end: u8,
    fe: u8,
}

impl ChannelId {
    /// Returns `None` if any coordinate is out of range.
    pub fn new(tower: usize, row: usize, end: usize, fe: usize) -> Option<Self> {
        if tower >= N_TOWERS || row >= N_ROWS || end >= N_ENDS || fe >= N_FE {
            return None;
        }
        Some(Self {
            tower: tower as u8,
            row: row as u8,
            end: end as u8,
            fe: fe as u8,
        })
    }

    pub fn tower(self) -> usize {
        self.tower as usize
    }

    pub fn row(self) -> usize {
        self.row as usize
    }

    pub fn end(self) -> usize {
        self.end as usize
    }

    pub fn fe(self) -> usize {
        self.fe as usize
    }

    /// Position in a flat `[16][8][2][12]` table.
    pub fn index(self) -> usize {
        ((self.tower() * N_ROWS + self.row()) * N_ENDS + self.end()) * N_FE + self.fe()
    }

    pub fn from_index(index: usize) -> Option<Self> {
        if index >= N_CHANNELS {
            return None;
        }
        let fe = index % N_FE;
        let rest = index / N_FE;
        let end = rest % N_ENDS;
        let rest = rest / N_ENDS;
        let row = rest % N_ROWS;
        let tower = rest / N_ROWS;
        Self::new(tower, row, end, fe)
    }

    /// All channels in (tower, row, end, fe) order.
    pub fn all() -> impl Iterator<Item = ChannelId> + Clone {
        (0..N_CHANNELS).filter_map(ChannelId::from_index)
    }
}

/// Evaluate `f` for every channel, in parallel when the `parallel` feature is on.
///
/// Results come back in canonical channel order regardless of scheduling.
pub fn map_channels<T, F>(f: F) -> Vec<(ChannelId, T)>
where
    T: Send,
    F: Fn(ChannelId) -> T + Sync + Send,
{
    let channels: Vec<ChannelId> = ChannelId::all().collect();

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        channels.into_par_iter().map(|ch| (ch, f(ch))).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        channels.into_iter().map(|ch| (ch, f(ch))).collect()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let face = if self.end == 0 { "NEG" } else { "POS" };
        write!(
            f,
            "T{} R{} {} FE{}",
            self.tower, self.row, face, self.fe
        )
    }
}
