// THEORY:
// The `NeighbourFilter` is the spatial layer of the selection engine. A square that
// passes every threshold can still be a lone speck on the image, and lone specks
// are usually noise. This filter hides a selected square when none of its grid
// neighbours is selected.
//
// Key architectural principles:
// 1.  **Tagged Modes**: `Free` (no filtering), `Strict` (4-connected: N, S, E, W)
//     and `Relaxed` (8-connected, adding diagonals). Mode names are parsed once;
//     an unknown name is an error, never a silent `Free`.
// 2.  **One Hop Over a Snapshot**: Neighbours are judged on the pre-filter
//     `selected` flags captured before the pass starts. It is not a flood fill and
//     not a fixpoint: two isolated pairs both survive, and hiding one square never
//     cascades to the next.
// 3.  **Boundary Clamping**: Historically, neighbour coordinates were clamped into
//     the grid, so an edge square could find itself as its own neighbour and never
//     be hidden by the missing side. `clamp_self_as_neighbor` keeps that behaviour
//     available (and on by default); turning it off treats off-grid neighbours as
//     absent. The clamped variant is a deprecation candidate.

use crate::core_modules::square::Square;
use crate::error::{PaintError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const STRICT_OFFSETS: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const RELAXED_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Isolation-suppression policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NeighbourMode {
    /// No spatial filtering.
    #[default]
    Free,
    /// 4-connected adjacency.
    Strict,
    /// 8-connected adjacency.
    Relaxed,
}

impl NeighbourMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NeighbourMode::Free => "Free",
            NeighbourMode::Strict => "Strict",
            NeighbourMode::Relaxed => "Relaxed",
        }
    }

    fn offsets(&self) -> &'static [(i64, i64)] {
        match self {
            NeighbourMode::Free => &[],
            NeighbourMode::Strict => &STRICT_OFFSETS,
            NeighbourMode::Relaxed => &RELAXED_OFFSETS,
        }
    }
}

impl FromStr for NeighbourMode {
    type Err = PaintError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(NeighbourMode::Free),
            "strict" => Ok(NeighbourMode::Strict),
            "relaxed" => Ok(NeighbourMode::Relaxed),
            _ => Err(PaintError::UnknownNeighbourMode(value.to_string())),
        }
    }
}

impl TryFrom<String> for NeighbourMode {
    type Error = PaintError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<NeighbourMode> for String {
    fn from(mode: NeighbourMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for NeighbourMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sets `neighbour_visible` and the final `visible` flag on every square.
/// Returns the number of visible squares.
pub fn apply_neighbour_filter(
    squares: &mut [Square],
    nr_of_squares_in_row: u32,
    mode: NeighbourMode,
    clamp_self_as_neighbor: bool,
) -> Result<usize> {
    let n = nr_of_squares_in_row as usize;
    if squares.len() != n * n {
        return Err(PaintError::MalformedTable(format!(
            "{} squares cannot form a {n}x{n} grid",
            squares.len()
        )));
    }

    // --- 1. Snapshot ---
    // Neighbours are judged on the pre-filter flags only.
    let selected: Vec<bool> = squares.iter().map(|s| s.selected).collect();

    // --- 2. One pass over the grid ---
    let mut nr_visible = 0;
    for (index, square) in squares.iter_mut().enumerate() {
        square.neighbour_visible = match mode {
            NeighbourMode::Free => true,
            _ if !selected[index] => false,
            _ => has_selected_neighbour(&selected, index, n, mode, clamp_self_as_neighbor),
        };
        square.visible = square.selected && square.neighbour_visible;
        if square.visible {
            nr_visible += 1;
        }
    }
    Ok(nr_visible)
}

fn has_selected_neighbour(
    selected: &[bool],
    index: usize,
    n: usize,
    mode: NeighbourMode,
    clamp_self_as_neighbor: bool,
) -> bool {
    let n = n as i64;
    let row = (index as i64) / n + 1;
    let col = (index as i64) % n + 1;

    mode.offsets().iter().any(|&(dr, dc)| {
        let (mut r, mut c) = (row + dr, col + dc);
        if clamp_self_as_neighbor {
            r = r.clamp(1, n);
            c = c.clamp(1, n);
        } else if r < 1 || r > n || c < 1 || c > n {
            return false;
        }
        selected[((r - 1) * n + (c - 1)) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid_partition::GridPartition;
    use crate::core_modules::square::SquareTable;

    fn grid_with_selection(n: u32, selected: &[u32]) -> SquareTable {
        let mut table = SquareTable::empty(&GridPartition::new(n).unwrap());
        for &square_nr in selected {
            table.squares[square_nr as usize].selected = true;
        }
        table
    }

    fn visible(table: &SquareTable) -> Vec<u32> {
        table
            .squares
            .iter()
            .filter(|s| s.visible)
            .map(|s| s.square_nr)
            .collect()
    }

    #[test]
    fn mode_names_parse_and_unknown_names_fail() {
        assert_eq!("Strict".parse::<NeighbourMode>().unwrap(), NeighbourMode::Strict);
        assert_eq!("relaxed".parse::<NeighbourMode>().unwrap(), NeighbourMode::Relaxed);
        assert_eq!(" FREE ".parse::<NeighbourMode>().unwrap(), NeighbourMode::Free);
        match "Loose".parse::<NeighbourMode>() {
            Err(PaintError::UnknownNeighbourMode(name)) => assert_eq!(name, "Loose"),
            other => panic!("expected an unknown mode error, got {other:?}"),
        }
    }

    #[test]
    fn mode_round_trips_through_json() {
        let json = serde_json::to_string(&NeighbourMode::Relaxed).unwrap();
        assert_eq!(json, "\"Relaxed\"");
        assert!(serde_json::from_str::<NeighbourMode>("\"Sideways\"").is_err());
    }

    #[test]
    fn free_mode_passes_selection_through() {
        let mut table = grid_with_selection(3, &[0, 4]);
        let n = apply_neighbour_filter(&mut table.squares, 3, NeighbourMode::Free, true).unwrap();
        assert_eq!(n, 2);
        assert!(table.squares.iter().all(|s| s.neighbour_visible));
        assert!(table.squares.iter().all(|s| s.visible == s.selected));
    }

    #[test]
    fn strict_isolated_corner_and_centre_are_hidden() {
        let mut table = grid_with_selection(3, &[0, 4]);
        apply_neighbour_filter(&mut table.squares, 3, NeighbourMode::Strict, false).unwrap();
        assert!(!table.squares[0].neighbour_visible);
        assert!(!table.squares[4].neighbour_visible);
        assert!(visible(&table).is_empty());
    }

    #[test]
    fn strict_with_clamping_lets_edge_squares_see_themselves() {
        let mut table = grid_with_selection(3, &[0, 4]);
        apply_neighbour_filter(&mut table.squares, 3, NeighbourMode::Strict, true).unwrap();
        // The corner clamps onto itself, the centre has no such escape.
        assert_eq!(visible(&table), vec![0]);
    }

    #[test]
    fn relaxed_counts_diagonals() {
        let mut table = grid_with_selection(3, &[0, 4]);
        apply_neighbour_filter(&mut table.squares, 3, NeighbourMode::Relaxed, false).unwrap();
        assert_eq!(visible(&table), vec![0, 4]);
    }

    #[test]
    fn relaxed_full_grid_stays_visible() {
        let mut table = grid_with_selection(2, &[0, 1, 2, 3]);
        let n =
            apply_neighbour_filter(&mut table.squares, 2, NeighbourMode::Relaxed, true).unwrap();
        assert_eq!(n, 4);
    }

    #[test]
    fn unselected_squares_are_never_neighbour_visible() {
        let mut table = grid_with_selection(3, &[1, 3, 5, 7]);
        apply_neighbour_filter(&mut table.squares, 3, NeighbourMode::Relaxed, false).unwrap();
        assert!(!table.squares[4].neighbour_visible);
        assert!(!table.squares[4].visible);
    }

    #[test]
    fn filter_is_one_hop_not_a_flood_fill() {
        // 5x5 grid, two horizontal pairs far apart and a vertical chain of three.
        //  row 1: [0, 1] selected
        //  row 5: [23, 24] selected
        //  col 3: 7, 12, 17 selected
        let mut table = grid_with_selection(5, &[0, 1, 23, 24, 7, 12, 17]);
        apply_neighbour_filter(&mut table.squares, 5, NeighbourMode::Strict, false).unwrap();
        assert_eq!(visible(&table), vec![0, 1, 7, 12, 17, 23, 24]);
    }

    #[test]
    fn rerunning_the_filter_changes_nothing() {
        let mut table = grid_with_selection(3, &[0, 1, 8]);
        apply_neighbour_filter(&mut table.squares, 3, NeighbourMode::Strict, false).unwrap();
        let first = table.clone();
        apply_neighbour_filter(&mut table.squares, 3, NeighbourMode::Strict, false).unwrap();
        assert_eq!(first, table);
        assert_eq!(visible(&table), vec![0, 1]);
    }

    #[test]
    fn table_size_must_match_the_grid() {
        let mut table = grid_with_selection(3, &[]);
        assert!(matches!(
            apply_neighbour_filter(&mut table.squares, 4, NeighbourMode::Strict, true),
            Err(PaintError::MalformedTable(_))
        ));
    }
}
