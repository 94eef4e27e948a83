// THEORY:
// Labels are what a scientist reads on the image: square 1 is the busiest square
// still in play, square 2 the next, and so on. Two moments assign them:
//
// 1.  **Classification** (batch): after metrics, every square with a fitted tau
//     is valid and valid squares are ranked.
// 2.  **Renumbering** (interactive): after every threshold change, the visible
//     squares are re-ranked with the same rule.
//
// The rule is a stable sort by track count, descending, so ties keep square-number
// order. The table itself is never reordered; only `label_nr` changes. Running the
// same labelling twice on the same set is a no-op.

use crate::core_modules::square::Square;

/// Assigns dense 1..K labels to the squares accepted by `include`, ranked by
/// `nr_tracks` descending with ties in square-number order. Everything else gets 0.
/// Returns K.
pub fn assign_labels<F>(squares: &mut [Square], include: F) -> u32
where
    F: Fn(&Square) -> bool,
{
    let mut ranked: Vec<usize> = (0..squares.len()).filter(|&i| include(&squares[i])).collect();
    // Stable: ties stay in table order, which is square-number order.
    ranked.sort_by(|&a, &b| squares[b].nr_tracks.cmp(&squares[a].nr_tracks));

    for square in squares.iter_mut() {
        square.label_nr = 0;
    }
    for (rank, &index) in ranked.iter().enumerate() {
        squares[index].label_nr = rank as u32 + 1;
    }
    ranked.len() as u32
}

/// Sets `valid_tau` from the tau outcome and labels the valid squares.
pub fn classify(squares: &mut [Square]) -> u32 {
    for square in squares.iter_mut() {
        square.valid_tau = square.tau.is_valid();
    }
    assign_labels(squares, |s| s.valid_tau)
}

/// Re-derives labels over the currently visible squares.
pub fn renumber_labels(squares: &mut [Square]) -> u32 {
    assign_labels(squares, |s| s.visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid_partition::GridPartition;
    use crate::core_modules::square::{SquareTable, Tau};

    fn table(counts: &[u32], taus: &[Tau]) -> SquareTable {
        let n = (counts.len() as f64).sqrt() as u32;
        let mut table = SquareTable::empty(&GridPartition::new(n).unwrap());
        for ((square, &count), &tau) in table.squares.iter_mut().zip(counts).zip(taus) {
            square.nr_tracks = count;
            square.tau = tau;
        }
        table
    }

    #[test]
    fn only_valid_squares_are_labelled_busiest_first() {
        let fitted = Tau::Fitted(100.0);
        let mut table = table(
            &[5, 30, 12, 30],
            &[fitted, fitted, Tau::NotConverged, fitted],
        );
        let k = classify(&mut table.squares);
        assert_eq!(k, 3);
        let labels: Vec<u32> = table.squares.iter().map(|s| s.label_nr).collect();
        // Squares 1 and 3 tie on 30 tracks; square 1 comes first.
        assert_eq!(labels, vec![3, 1, 0, 2]);
        assert!(!table.squares[2].valid_tau);
        let order: Vec<u32> = table.squares.iter().map(|s| s.square_nr).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn renumbering_is_dense_and_idempotent() {
        let mut table = table(&[9, 3, 7, 1, 8, 2, 6, 4, 5], &[Tau::Fitted(1.0); 9]);
        for (i, square) in table.squares.iter_mut().enumerate() {
            square.visible = i % 2 == 0;
        }
        let k = renumber_labels(&mut table.squares);
        let first = table.clone();
        assert_eq!(renumber_labels(&mut table.squares), k);
        assert_eq!(first, table);

        let mut labels: Vec<u32> = table
            .squares
            .iter()
            .filter(|s| s.visible)
            .map(|s| s.label_nr)
            .collect();
        labels.sort_unstable();
        assert_eq!(labels, (1..=k).collect::<Vec<u32>>());
        assert!(
            table
                .squares
                .iter()
                .filter(|s| !s.visible)
                .all(|s| s.label_nr == 0)
        );
    }

    #[test]
    fn stale_labels_are_cleared() {
        let mut table = table(&[1, 2, 3, 4], &[Tau::Fitted(1.0); 4]);
        table.squares[0].label_nr = 7;
        renumber_labels(&mut table.squares);
        assert!(table.squares.iter().all(|s| s.label_nr == 0));
    }
}
