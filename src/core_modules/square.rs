// THEORY:
// The `Square` is the record every layer of the engine reads and writes. It is a
// strongly typed row of the persisted squares table: one cell of the N x N grid of
// one recording, its write-once metrics, and the mutable flags that the selection
// layer re-derives every time a threshold moves.
//
// Key architectural principles:
// 1.  **Typed Tau**: The decay constant is a tagged value. Fit failures are explicit
//     variants, and only at the persistence boundary do they collapse into the
//     historical numeric sentinels (-1, -2, -3).
// 2.  **Write-Once Metrics**: Track counts, durations, density and variability are
//     filled by the metrics calculator and never touched by selection.
// 3.  **Derived Flags**: `selected`, `visible`, the `*_visible` flags and `label_nr`
//     are outputs of the selection engine. `cell_id` belongs to the user.

use crate::core_modules::grid_partition::{GridPartition, SquareGeometry};
use serde::{Deserialize, Serialize};

pub const TAU_TOO_FEW_TRACKS: f64 = -1.0;
pub const TAU_NOT_CONVERGED: f64 = -2.0;
pub const TAU_LOW_CONFIDENCE: f64 = -3.0;

/// Density ratio reported when a recording has no background to normalise against.
pub const DENSITY_RATIO_UNDEFINED: f64 = 999.0;

/// Highest cell id a user can assign.
pub const MAX_CELL_ID: u8 = 6;

/// Outcome of the decay fit for one square.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "f64", from = "f64")]
pub enum Tau {
    /// Fitted decay constant in milliseconds.
    Fitted(f64),
    /// Fewer tracks than `min_tracks_for_tau`; no fit attempted.
    TooFewTracks,
    /// The fit did not converge.
    NotConverged,
    /// The fit converged but its R² is below the threshold.
    LowConfidence,
}

impl Tau {
    pub fn is_valid(&self) -> bool {
        matches!(self, Tau::Fitted(_))
    }

    pub fn value(&self) -> f64 {
        match *self {
            Tau::Fitted(tau) => tau,
            Tau::TooFewTracks => TAU_TOO_FEW_TRACKS,
            Tau::NotConverged => TAU_NOT_CONVERGED,
            Tau::LowConfidence => TAU_LOW_CONFIDENCE,
        }
    }

    pub fn fitted(&self) -> Option<f64> {
        match *self {
            Tau::Fitted(tau) => Some(tau),
            _ => None,
        }
    }
}

impl From<f64> for Tau {
    fn from(value: f64) -> Self {
        if value == TAU_TOO_FEW_TRACKS {
            Tau::TooFewTracks
        } else if value == TAU_NOT_CONVERGED {
            Tau::NotConverged
        } else if value == TAU_LOW_CONFIDENCE {
            Tau::LowConfidence
        } else if !(value >= 0.0) || !value.is_finite() {
            // Any other negative is unusable.
            Tau::NotConverged
        } else {
            Tau::Fitted(value)
        }
    }
}

impl From<Tau> for f64 {
    fn from(tau: Tau) -> Self {
        tau.value()
    }
}

/// One row of the squares table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Square {
    #[serde(rename = "Square Nr")]
    pub square_nr: u32,
    #[serde(rename = "Row Nr")]
    pub row_nr: u32,
    #[serde(rename = "Col Nr")]
    pub col_nr: u32,
    #[serde(rename = "X0")]
    pub x0: f64,
    #[serde(rename = "Y0")]
    pub y0: f64,
    #[serde(rename = "X1")]
    pub x1: f64,
    #[serde(rename = "Y1")]
    pub y1: f64,
    #[serde(rename = "Nr Tracks")]
    pub nr_tracks: u32,
    #[serde(rename = "Tau")]
    pub tau: Tau,
    #[serde(rename = "Valid Tau")]
    pub valid_tau: bool,
    #[serde(rename = "R2")]
    pub r_squared: f64,
    #[serde(rename = "Density")]
    pub density: f64,
    #[serde(rename = "Density Ratio")]
    pub density_ratio: f64,
    #[serde(rename = "Variability")]
    pub variability: f64,
    #[serde(rename = "Average Long Track Duration")]
    pub average_long_track_duration: f64,
    #[serde(rename = "Max Track Duration")]
    pub max_track_duration: f64,
    #[serde(rename = "Total Track Duration")]
    pub total_track_duration: f64,
    #[serde(rename = "Cell Id")]
    pub cell_id: u8,
    /// Dense 1-based rank among visible squares, 0 when not labelled.
    #[serde(rename = "Label Nr")]
    pub label_nr: u32,
    /// Passed the thresholds, before neighbour filtering.
    #[serde(rename = "Selected")]
    pub selected: bool,
    /// Final visibility after neighbour filtering.
    #[serde(rename = "Visible")]
    pub visible: bool,
    #[serde(rename = "Density Ratio Visible")]
    pub density_ratio_visible: bool,
    #[serde(rename = "Variability Visible")]
    pub variability_visible: bool,
    #[serde(rename = "Duration Visible")]
    pub duration_visible: bool,
    #[serde(rename = "Neighbour Visible")]
    pub neighbour_visible: bool,
}

/// Column headers of the persisted table, in write order.
pub const SQUARE_COLUMNS: [&str; 25] = [
    "Square Nr",
    "Row Nr",
    "Col Nr",
    "X0",
    "Y0",
    "X1",
    "Y1",
    "Nr Tracks",
    "Tau",
    "Valid Tau",
    "R2",
    "Density",
    "Density Ratio",
    "Variability",
    "Average Long Track Duration",
    "Max Track Duration",
    "Total Track Duration",
    "Cell Id",
    "Label Nr",
    "Selected",
    "Visible",
    "Density Ratio Visible",
    "Variability Visible",
    "Duration Visible",
    "Neighbour Visible",
];

impl Square {
    /// An empty square at the given grid position. Metrics start at zero and
    /// tau at `TooFewTracks`.
    pub fn empty(geometry: &SquareGeometry) -> Self {
        Self {
            square_nr: geometry.square_nr,
            row_nr: geometry.row_nr,
            col_nr: geometry.col_nr,
            x0: geometry.x0,
            y0: geometry.y0,
            x1: geometry.x1,
            y1: geometry.y1,
            nr_tracks: 0,
            tau: Tau::TooFewTracks,
            valid_tau: false,
            r_squared: 0.0,
            density: 0.0,
            density_ratio: 0.0,
            variability: 0.0,
            average_long_track_duration: 0.0,
            max_track_duration: 0.0,
            total_track_duration: 0.0,
            cell_id: 0,
            label_nr: 0,
            selected: false,
            visible: false,
            density_ratio_visible: false,
            variability_visible: false,
            duration_visible: false,
            neighbour_visible: false,
        }
    }

    pub fn geometry(&self) -> SquareGeometry {
        SquareGeometry {
            square_nr: self.square_nr,
            row_nr: self.row_nr,
            col_nr: self.col_nr,
            x0: self.x0,
            y0: self.y0,
            x1: self.x1,
            y1: self.y1,
        }
    }
}

/// All squares of one recording, in square-number order.
#[derive(Debug, Clone, PartialEq)]
pub struct SquareTable {
    pub nr_of_squares_in_row: u32,
    pub squares: Vec<Square>,
}

impl SquareTable {
    /// A table of empty squares covering the whole grid.
    pub fn empty(partition: &GridPartition) -> Self {
        Self {
            nr_of_squares_in_row: partition.nr_of_squares_in_row(),
            squares: partition.squares().iter().map(Square::empty).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.squares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
    }

    pub fn visible_count(&self) -> usize {
        self.squares.iter().filter(|s| s.visible).count()
    }

    pub fn selected_count(&self) -> usize {
        self.squares.iter().filter(|s| s.selected).count()
    }

    pub fn total_tracks(&self) -> u64 {
        self.squares.iter().map(|s| s.nr_tracks as u64).sum()
    }
}
