// THEORY:
// Every fallible operation in the engine reports through a single error enum.
// Numeric trouble inside a square (a fit that does not converge, too few tracks)
// is NOT an error: it is recorded on the square as a `Tau` sentinel so that a
// batch never aborts halfway through a recording. What remains here are the
// failures a caller has to act on: bad configuration, bad input tables and I/O.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaintError>;

#[derive(Debug, Error)]
pub enum PaintError {
    #[error("unknown neighbour mode '{0}' (expected Free, Strict or Relaxed)")]
    UnknownNeighbourMode(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("squares table is missing column '{0}'")]
    MissingColumn(String),

    #[error("tracks table is missing column '{0}'")]
    MissingTrackColumn(String),

    #[error("track {track_id} has unusable duration {duration}")]
    InvalidTrackDuration { track_id: u64, duration: f64 },

    #[error("malformed squares table: {0}")]
    MalformedTable(String),

    #[error("square {square_nr} does not exist in a grid of {nr_of_squares} squares")]
    UnknownSquare { square_nr: u32, nr_of_squares: usize },

    #[error("cell id {0} is out of range (0..=6)")]
    InvalidCellId(u8),

    #[error("failed to read config '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("recording '{name}' failed in a batch worker: {reason}")]
    Worker { name: String, reason: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
