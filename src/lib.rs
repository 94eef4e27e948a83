// THEORY:
// This file is the entry point of the `paint_squares` library crate. It exposes
// the square engine as two layers:
//
// - `pipeline`: the synchronous engine API (`generate_squares`,
//   `select_squares`, `SquarePipeline`) that a viewer or script calls directly.
// - `batch_pipeline`: the experiment-level driver that runs the engine over
//   many recordings concurrently and collects their summaries.
//
// The `core_modules` hold the individual stages (partitioning, metrics, density
// ratio, labelling, thresholds, neighbour filter) and the table formats. They are
// public so tools can reuse a single stage, but the pipelines are the intended
// way in.

pub mod batch_pipeline;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use batch_pipeline::{BatchPipeline, RecordingJob, discover_jobs};
pub use config::{GenerationConfig, PaintConfig, SelectionConfig};
pub use core_modules::cell_marking::{mark_selected_squares, squares_in_rectangle};
pub use core_modules::decay_fit::{DecayFit, DecayFitter, FitFailed, LogLinearFitter};
pub use core_modules::neighbour_filter::NeighbourMode;
pub use core_modules::recording_summary::RecordingSummary;
pub use core_modules::square::{Square, SquareTable, Tau};
pub use core_modules::track::Track;
pub use error::{PaintError, Result};
pub use pipeline::{
    GeneratedRecording, ProcessedRecording, SelectionOutcome, SquarePipeline, generate_squares,
    select_squares,
};
