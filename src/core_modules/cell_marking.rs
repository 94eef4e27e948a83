// THEORY:
// Scientists draw rectangles on the square map to say "these squares are cell 3".
// This module is the engine side of that gesture: it turns a rectangle into square
// numbers and writes the chosen `cell_id` onto those squares. It is the only place
// that mutates `cell_id`, and it does so only on request; selection never does.

use crate::core_modules::grid_partition::GridPartition;
use crate::core_modules::square::{MAX_CELL_ID, SquareTable};
use crate::error::{PaintError, Result};

/// Square numbers whose boxes overlap the rectangle spanned by two corners, in
/// ascending order. Corners may be given in any order; touching edges do not count.
pub fn squares_in_rectangle(
    partition: &GridPartition,
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
) -> Vec<u32> {
    let (left, right) = (x0.min(x1), x0.max(x1));
    let (top, bottom) = (y0.min(y1), y0.max(y1));
    partition
        .squares()
        .into_iter()
        .filter(|g| g.x0 < right && left < g.x1 && g.y0 < bottom && top < g.y1)
        .map(|g| g.square_nr)
        .collect()
}

/// Like `squares_in_rectangle`, restricted to squares currently visible.
pub fn visible_squares_in_rectangle(
    table: &SquareTable,
    partition: &GridPartition,
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
) -> Vec<u32> {
    squares_in_rectangle(partition, x0, y0, x1, y1)
        .into_iter()
        .filter(|&nr| table.squares.get(nr as usize).is_some_and(|s| s.visible))
        .collect()
}

/// Assigns `cell_id` to the listed squares. Nothing is changed if any square
/// number is unknown or the cell id is out of range. Returns the number of
/// squares whose cell id changed.
pub fn mark_selected_squares(
    table: &mut SquareTable,
    square_nrs: &[u32],
    cell_id: u8,
) -> Result<usize> {
    if cell_id > MAX_CELL_ID {
        return Err(PaintError::InvalidCellId(cell_id));
    }
    if let Some(&square_nr) = square_nrs.iter().find(|&&nr| nr as usize >= table.len()) {
        return Err(PaintError::UnknownSquare {
            square_nr,
            nr_of_squares: table.len(),
        });
    }

    let mut changed = 0;
    for &square_nr in square_nrs {
        let square = &mut table.squares[square_nr as usize];
        if square.cell_id != cell_id {
            square.cell_id = cell_id;
            changed += 1;
        }
    }
    Ok(changed)
}
