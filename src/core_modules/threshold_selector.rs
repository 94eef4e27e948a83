// THEORY:
// The threshold selector is the first half of the interactive path. Every slider
// in the viewer maps to one independent comparison here, and each comparison is
// recorded in its own `*_visible` flag so the viewer can explain why a square is
// hidden. The conjunction of those flags is `selected`, the pre-neighbour result
// that the neighbour filter consumes.
//
// Slider values are rounded to one decimal before comparing, matching what the
// user sees on screen.

use crate::core_modules::square::Square;
use crate::core_modules::utils::numeric::round_to;
use crate::error::{PaintError, Result};
use serde::{Deserialize, Serialize};

/// Inclusive bounds on a square's longest track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationWindow {
    pub min_track_duration: f64,
    pub max_track_duration: f64,
}

impl DurationWindow {
    pub fn contains(&self, duration: f64) -> bool {
        self.min_track_duration <= duration && duration <= self.max_track_duration
    }
}

/// User-adjustable selection thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionThresholds {
    pub min_density_ratio: f64,
    pub max_variability: f64,
    /// When set, a square's longest track must fall inside the window.
    pub duration_window: Option<DurationWindow>,
    /// When set, a fitted tau also needs at least this R² to count as valid.
    pub min_r_squared: Option<f64>,
}

impl Default for SelectionThresholds {
    fn default() -> Self {
        Self {
            min_density_ratio: 2.0,
            max_variability: 10.0,
            duration_window: None,
            min_r_squared: None,
        }
    }
}

impl SelectionThresholds {
    pub fn validate(&self) -> Result<()> {
        if !self.min_density_ratio.is_finite() || !self.max_variability.is_finite() {
            return Err(PaintError::InvalidConfig(
                "density ratio and variability thresholds must be finite".to_string(),
            ));
        }
        if let Some(window) = self.duration_window {
            if window.min_track_duration > window.max_track_duration {
                return Err(PaintError::InvalidConfig(format!(
                    "min_track_duration {} exceeds max_track_duration {}",
                    window.min_track_duration, window.max_track_duration
                )));
            }
        }
        Ok(())
    }

    fn tau_usable(&self, square: &Square) -> bool {
        square.tau.is_valid()
            && self
                .min_r_squared
                .is_none_or(|min_r_squared| square.r_squared >= min_r_squared)
    }
}

/// Sets the threshold flags and the pre-neighbour `selected` flag on every
/// square. Returns the number of selected squares.
pub fn select(
    squares: &mut [Square],
    thresholds: &SelectionThresholds,
    only_valid_tau: bool,
) -> usize {
    let min_density_ratio = round_to(thresholds.min_density_ratio, 1);
    let max_variability = round_to(thresholds.max_variability, 1);

    let mut nr_selected = 0;
    for square in squares.iter_mut() {
        square.density_ratio_visible = square.density_ratio >= min_density_ratio;
        square.variability_visible = square.variability <= max_variability;
        square.duration_visible = thresholds
            .duration_window
            .is_none_or(|window| window.contains(square.max_track_duration));
        let tau_ok = !only_valid_tau || thresholds.tau_usable(square);

        square.selected = square.density_ratio_visible
            && square.variability_visible
            && square.duration_visible
            && tau_ok;
        if square.selected {
            nr_selected += 1;
        }
    }
    nr_selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid_partition::GridPartition;
    use crate::core_modules::square::{SquareTable, Tau};

    fn sample_table() -> SquareTable {
        let mut table = SquareTable::empty(&GridPartition::new(4).unwrap());
        for (i, square) in table.squares.iter_mut().enumerate() {
            square.density_ratio = (i % 7) as f64 * 0.75;
            square.variability = (i % 5) as f64 * 1.3;
            square.max_track_duration = i as f64 * 0.5;
            square.r_squared = 0.8 + (i % 3) as f64 * 0.05;
            square.tau = if i % 4 == 3 { Tau::NotConverged } else { Tau::Fitted(90.0) };
            square.valid_tau = square.tau.is_valid();
        }
        table
    }

    #[test]
    fn thresholds_are_rounded_to_one_decimal() {
        let mut table = SquareTable::empty(&GridPartition::new(1).unwrap());
        let square = &mut table.squares[0];
        square.density_ratio = 2.0;
        square.variability = 3.0;
        square.tau = Tau::Fitted(1.0);
        square.valid_tau = true;

        let thresholds = SelectionThresholds {
            min_density_ratio: 2.04,
            max_variability: 2.96,
            ..Default::default()
        };
        assert_eq!(select(&mut table.squares, &thresholds, true), 1);
        assert!(table.squares[0].density_ratio_visible);
        assert!(table.squares[0].variability_visible);
    }

    #[test]
    fn each_threshold_sets_its_own_flag() {
        let mut table = SquareTable::empty(&GridPartition::new(1).unwrap());
        table.squares[0].density_ratio = 1.0;
        table.squares[0].variability = 20.0;
        table.squares[0].tau = Tau::Fitted(1.0);
        table.squares[0].valid_tau = true;
        select(&mut table.squares, &SelectionThresholds::default(), true);
        let square = &table.squares[0];
        assert!(!square.density_ratio_visible);
        assert!(!square.variability_visible);
        assert!(square.duration_visible);
        assert!(!square.selected);
    }

    #[test]
    fn invalid_tau_is_only_excluded_when_asked() {
        let mut table = SquareTable::empty(&GridPartition::new(1).unwrap());
        table.squares[0].density_ratio = 5.0;
        table.squares[0].tau = Tau::LowConfidence;
        let thresholds = SelectionThresholds::default();
        assert_eq!(select(&mut table.squares, &thresholds, true), 0);
        assert_eq!(select(&mut table.squares, &thresholds, false), 1);
    }

    #[test]
    fn stale_valid_tau_flag_does_not_select_a_sentinel() {
        let mut table = SquareTable::empty(&GridPartition::new(1).unwrap());
        table.squares[0].density_ratio = 5.0;
        table.squares[0].tau = Tau::TooFewTracks;
        table.squares[0].valid_tau = true;
        assert_eq!(select(&mut table.squares, &SelectionThresholds::default(), true), 0);
        assert!(!table.squares[0].selected);
    }

    #[test]
    fn duration_window_is_inclusive() {
        let mut table = SquareTable::empty(&GridPartition::new(2).unwrap());
        for (square, duration) in table.squares.iter_mut().zip([0.5, 1.0, 2.0, 2.5]) {
            square.density_ratio = 5.0;
            square.max_track_duration = duration;
        }
        let thresholds = SelectionThresholds {
            duration_window: Some(DurationWindow {
                min_track_duration: 1.0,
                max_track_duration: 2.0,
            }),
            ..Default::default()
        };
        select(&mut table.squares, &thresholds, false);
        let selected: Vec<bool> = table.squares.iter().map(|s| s.selected).collect();
        assert_eq!(selected, vec![false, true, true, false]);
    }

    #[test]
    fn r_squared_override_tightens_validity() {
        let mut table = sample_table();
        let loose = SelectionThresholds {
            min_density_ratio: 0.0,
            max_variability: 100.0,
            ..Default::default()
        };
        let strict = SelectionThresholds {
            min_r_squared: Some(0.85),
            ..loose
        };
        let n_loose = select(&mut table.squares, &loose, true);
        let n_strict = select(&mut table.squares, &strict, true);
        assert!(n_strict < n_loose);
        assert!(
            table
                .squares
                .iter()
                .filter(|s| s.selected)
                .all(|s| s.r_squared >= 0.85)
        );
    }

    #[test]
    fn tightening_a_threshold_never_grows_the_selection() {
        let mut table = sample_table();
        let mut previous = usize::MAX;
        for step in 0..12 {
            let thresholds = SelectionThresholds {
                min_density_ratio: step as f64 * 0.5,
                max_variability: 100.0,
                ..Default::default()
            };
            let n = select(&mut table.squares, &thresholds, true);
            assert!(n <= previous);
            previous = n;
        }

        let mut previous = usize::MAX;
        for step in (0..12).rev() {
            let thresholds = SelectionThresholds {
                min_density_ratio: 0.0,
                max_variability: step as f64 * 0.5,
                ..Default::default()
            };
            let n = select(&mut table.squares, &thresholds, false);
            assert!(n <= previous);
            previous = n;
        }
    }

    #[test]
    fn inverted_duration_window_is_rejected() {
        let thresholds = SelectionThresholds {
            duration_window: Some(DurationWindow {
                min_track_duration: 3.0,
                max_track_duration: 1.0,
            }),
            ..Default::default()
        };
        assert!(thresholds.validate().is_err());
        assert!(SelectionThresholds::default().validate().is_ok());
    }
}
