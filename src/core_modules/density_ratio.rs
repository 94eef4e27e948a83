// THEORY:
// The density ratio normalises a square's track count against the recording's
// background: the mean count of the sparsest non-empty squares. It cannot be known
// until every square of the recording has been counted, so it runs as a second
// pass over the finished table.
//
// The background takes the k = 10% of squares with the lowest non-zero counts.
// With no non-empty square at all the ratio is undefined and every square gets
// the 999 sentinel instead of a division by zero.

use crate::core_modules::square::{DENSITY_RATIO_UNDEFINED, Square};
use crate::core_modules::utils::numeric::{round_count, round_to};

const BACKGROUND_FRACTION: f64 = 0.1;

/// Mean track count of the `k` sparsest non-empty squares, 0 when all are empty.
pub fn background_tracks(squares: &[Square]) -> f64 {
    let k = round_count(squares.len() as f64 * BACKGROUND_FRACTION).max(1);

    let mut counts: Vec<u32> = squares
        .iter()
        .map(|s| s.nr_tracks)
        .filter(|&n| n > 0)
        .collect();
    counts.sort_unstable();
    counts.truncate(k);

    if counts.is_empty() {
        return 0.0;
    }
    counts.iter().map(|&n| n as f64).sum::<f64>() / counts.len() as f64
}

/// Fills `density_ratio` on every square and returns the background used.
pub fn compute_density_ratio(squares: &mut [Square]) -> f64 {
    let background = background_tracks(squares);
    for square in squares.iter_mut() {
        square.density_ratio = if background == 0.0 {
            DENSITY_RATIO_UNDEFINED
        } else {
            round_to(square.nr_tracks as f64 / background, 1)
        };
    }
    background
}
