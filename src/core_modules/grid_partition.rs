// THEORY:
// The `GridPartition` is the spatial backbone of the engine. It overlays a regular
// N x N grid of squares on the physical field of view of a recording and answers
// two questions: "where is square s?" and "which square does this track fall in?"
//
// Key architectural principles:
// 1.  **Row-Major Indexing**: Squares are numbered `row * N + col`, 0-based. Rows and
//     columns are exposed 1-based because that is how they are persisted and shown.
// 2.  **Half-Open Boxes**: A square owns `[x0, x1) x [y0, y1)`. A track on a shared
//     edge therefore belongs to exactly one square, the one that starts there.
// 3.  **Silent Edge Loss**: Tracks outside `[0, image_size)` belong to no square. They
//     are counted, not assigned, so callers can log how many were dropped.
// 4.  **Stateless**: The partition holds only N and the physical size. All per-square
//     data lives in the `Square` records built on top of it.

use crate::core_modules::track::Track;
use crate::error::{PaintError, Result};

/// Physical width and height of a recording in micrometres.
pub const IMAGE_SIZE_UM: f64 = 82.0864;

/// The physical placement of one square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareGeometry {
    pub square_nr: u32,
    /// 1-based row index.
    pub row_nr: u32,
    /// 1-based column index.
    pub col_nr: u32,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl SquareGeometry {
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x0 <= x && x < self.x1 && self.y0 <= y && y < self.y1
    }
}

/// Tracks of a recording grouped by the square that owns them.
#[derive(Debug)]
pub struct TrackAssignment<'a> {
    /// Indexed by square number.
    pub per_square: Vec<Vec<&'a Track>>,
    /// Tracks whose centroid lies outside the image.
    pub dropped: usize,
}

impl TrackAssignment<'_> {
    pub fn assigned(&self) -> usize {
        self.per_square.iter().map(Vec::len).sum()
    }
}

/// An N x N grid laid over the physical image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPartition {
    nr_of_squares_in_row: u32,
    image_size: f64,
    square_width: f64,
}

impl GridPartition {
    pub fn new(nr_of_squares_in_row: u32) -> Result<Self> {
        Self::with_image_size(nr_of_squares_in_row, IMAGE_SIZE_UM)
    }

    pub fn with_image_size(nr_of_squares_in_row: u32, image_size: f64) -> Result<Self> {
        if nr_of_squares_in_row == 0 {
            return Err(PaintError::InvalidConfig(
                "nr_of_squares_in_row must be at least 1".to_string(),
            ));
        }
        if !(image_size.is_finite() && image_size > 0.0) {
            return Err(PaintError::InvalidConfig(format!(
                "image size must be positive, got {image_size}"
            )));
        }
        Ok(Self {
            nr_of_squares_in_row,
            image_size,
            square_width: image_size / nr_of_squares_in_row as f64,
        })
    }

    pub fn nr_of_squares_in_row(&self) -> u32 {
        self.nr_of_squares_in_row
    }

    pub fn nr_of_squares(&self) -> usize {
        (self.nr_of_squares_in_row as usize).pow(2)
    }

    pub fn image_size(&self) -> f64 {
        self.image_size
    }

    pub fn square_width(&self) -> f64 {
        self.square_width
    }

    /// 1-based `(row_nr, col_nr)` of a square.
    pub fn row_col(&self, square_nr: u32) -> (u32, u32) {
        let n = self.nr_of_squares_in_row;
        (square_nr / n + 1, square_nr % n + 1)
    }

    /// Square number at 1-based `(row_nr, col_nr)`.
    pub fn square_nr_at(&self, row_nr: u32, col_nr: u32) -> u32 {
        (row_nr - 1) * self.nr_of_squares_in_row + (col_nr - 1)
    }

    fn edge(&self, index: u32) -> f64 {
        // The last edge is pinned to the image size so float error cannot open a gap.
        if index >= self.nr_of_squares_in_row {
            self.image_size
        } else {
            index as f64 * self.square_width
        }
    }

    pub fn geometry(&self, square_nr: u32) -> SquareGeometry {
        let (row_nr, col_nr) = self.row_col(square_nr);
        SquareGeometry {
            square_nr,
            row_nr,
            col_nr,
            x0: self.edge(col_nr - 1),
            y0: self.edge(row_nr - 1),
            x1: self.edge(col_nr),
            y1: self.edge(row_nr),
        }
    }

    /// Every square of the grid in square-number order.
    pub fn squares(&self) -> Vec<SquareGeometry> {
        (0..self.nr_of_squares() as u32)
            .map(|square_nr| self.geometry(square_nr))
            .collect()
    }

    /// 0-based grid index along one axis, or `None` outside the image.
    fn axis_index(&self, value: f64) -> Option<u32> {
        if !(value >= 0.0 && value < self.image_size) {
            return None;
        }
        let last = self.nr_of_squares_in_row - 1;
        let mut index = ((value / self.square_width).floor() as u32).min(last);
        // Snap to the half-open box that actually contains the value.
        if value < self.edge(index) && index > 0 {
            index -= 1;
        } else if value >= self.edge(index + 1) && index < last {
            index += 1;
        }
        Some(index)
    }

    /// The square owning physical point `(x, y)`.
    pub fn locate(&self, x: f64, y: f64) -> Option<u32> {
        let col = self.axis_index(x)?;
        let row = self.axis_index(y)?;
        Some(row * self.nr_of_squares_in_row + col)
    }

    pub fn assign_tracks<'a>(&self, tracks: &'a [Track]) -> TrackAssignment<'a> {
        let mut per_square: Vec<Vec<&Track>> = vec![Vec::new(); self.nr_of_squares()];
        let mut dropped = 0;
        for track in tracks {
            match self.locate(track.x, track.y) {
                Some(square_nr) => per_square[square_nr as usize].push(track),
                None => dropped += 1,
            }
        }
        TrackAssignment {
            per_square,
            dropped,
        }
    }
}

/// `partition(nr_of_squares_in_row)`: all squares of a recording with their boxes.
pub fn partition(nr_of_squares_in_row: u32) -> Result<Vec<SquareGeometry>> {
    Ok(GridPartition::new(nr_of_squares_in_row)?.squares())
}
