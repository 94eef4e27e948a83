// THEORY:
// The `pipeline` module is the top-level API of the square engine. It strings
// the core modules together into the two passes a recording goes through:
//
// 1.  **Generation** (batch, once per recording): partition the image, assign
//     tracks, compute per-square metrics, derive density ratios and classify.
// 2.  **Selection** (interactive, on every threshold change): threshold flags,
//     neighbour filter, label renumbering.
//
// Key architectural principles:
// - The engine is synchronous and owns no state between calls. Everything it
//   needs arrives as an explicit config value; everything it produces lives in
//   the returned `SquareTable`.
// - Selection is a pure function of the table and the selection config, so the
//   viewer can call it on every slider move and get the same table each time.
// - Numeric trouble inside a square never fails a pass. Only structural
//   problems (bad grid size, bad thresholds, a mangled table) are errors.

use crate::config::{GenerationConfig, PaintConfig, SelectionConfig};
use crate::core_modules::decay_fit::{DecayFitter, LogLinearFitter};
use crate::core_modules::density_ratio::compute_density_ratio;
use crate::core_modules::grid_partition::GridPartition;
use crate::core_modules::labeling::{classify, renumber_labels};
use crate::core_modules::neighbour_filter::apply_neighbour_filter;
use crate::core_modules::recording_summary::RecordingSummary;
use crate::core_modules::square::SquareTable;
use crate::core_modules::square_metrics::compute_metrics;
use crate::core_modules::threshold_selector::select;
use crate::core_modules::track::Track;
use crate::error::{PaintError, Result};
use log::{debug, info, warn};
use std::sync::Arc;

/// The output of the generation pass for one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedRecording {
    pub table: SquareTable,
    /// Background track count used for the density ratios.
    pub background: f64,
    /// Tracks whose centroid fell outside the image.
    pub dropped_tracks: usize,
}

/// Counts produced by one selection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub nr_selected: usize,
    pub nr_visible: usize,
    pub nr_labels: u32,
}

/// A recording after both passes, ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecording {
    pub table: SquareTable,
    pub summary: RecordingSummary,
}

/// Generation pass. `concentration` overrides the configured
/// concentration for this recording.
pub fn generate_squares(
    tracks: &[Track],
    config: &GenerationConfig,
    concentration: Option<f64>,
    fitter: &dyn DecayFitter,
) -> Result<GeneratedRecording> {
    let partition = GridPartition::new(config.nr_of_squares_in_row)?;
    let params = config.fit_params(concentration);
    if !(params.concentration > 0.0) {
        return Err(PaintError::InvalidConfig(format!(
            "concentration must be positive, got {}",
            params.concentration
        )));
    }

    // --- 1. Partition and assign ---
    let assignment = partition.assign_tracks(tracks);
    if assignment.dropped > 0 {
        warn!(
            "{} of {} tracks lie outside the {} um image and were dropped",
            assignment.dropped,
            tracks.len(),
            partition.image_size()
        );
    }

    // --- 2. Per-square metrics ---
    let mut table = SquareTable::empty(&partition);
    for (square, tracks_in_square) in table.squares.iter_mut().zip(&assignment.per_square) {
        let geometry = partition.geometry(square.square_nr);
        compute_metrics(tracks_in_square, &geometry, &params, fitter).apply_to(square);
    }

    // --- 3. Density ratio and classification ---
    let background = compute_density_ratio(&mut table.squares);
    let nr_valid = classify(&mut table.squares);
    debug!(
        "generated {} squares, {} with a valid tau, background {background}",
        table.len(),
        nr_valid
    );

    Ok(GeneratedRecording {
        table,
        background,
        dropped_tracks: assignment.dropped,
    })
}

/// Selection pass over a generated (or loaded) table. Overwrites the threshold
/// flags, `selected`, `neighbour_visible`, `visible` and `label_nr`; leaves
/// metrics and `cell_id` alone.
pub fn select_squares(
    table: &mut SquareTable,
    config: &SelectionConfig,
) -> Result<SelectionOutcome> {
    let thresholds = config.thresholds();
    thresholds.validate()?;

    let nr_selected = select(&mut table.squares, &thresholds, config.only_valid_tau);
    let nr_visible = apply_neighbour_filter(
        &mut table.squares,
        table.nr_of_squares_in_row,
        config.neighbour_mode,
        config.clamp_self_as_neighbor,
    )?;
    let nr_labels = renumber_labels(&mut table.squares);
    debug!(
        "{} mode: {nr_selected} selected, {nr_visible} visible",
        config.neighbour_mode
    );

    Ok(SelectionOutcome {
        nr_selected,
        nr_visible,
        nr_labels,
    })
}

/// The main, top-level struct for the engine: a validated config plus the
/// decay fitter used for every recording it processes.
#[derive(Clone)]
pub struct SquarePipeline {
    config: PaintConfig,
    fitter: Arc<dyn DecayFitter + Send + Sync>,
}

impl SquarePipeline {
    pub fn new(config: PaintConfig) -> Result<Self> {
        Self::with_fitter(config, Arc::new(LogLinearFitter))
    }

    pub fn with_fitter(
        config: PaintConfig,
        fitter: Arc<dyn DecayFitter + Send + Sync>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, fitter })
    }

    pub fn config(&self) -> &PaintConfig {
        &self.config
    }

    pub fn generate(
        &self,
        tracks: &[Track],
        concentration: Option<f64>,
    ) -> Result<GeneratedRecording> {
        generate_squares(tracks, &self.config.generation, concentration, self.fitter.as_ref())
    }

    pub fn select(&self, table: &mut SquareTable) -> Result<SelectionOutcome> {
        select_squares(table, &self.config.selection)
    }

    /// Both passes plus the recording summary, including a combined fit over
    /// the tracks of the visible squares.
    pub fn process(
        &self,
        recording_name: &str,
        tracks: &[Track],
        concentration: Option<f64>,
    ) -> Result<ProcessedRecording> {
        let GeneratedRecording {
            mut table,
            background,
            dropped_tracks,
        } = self.generate(tracks, concentration)?;
        let outcome = self.select(&mut table)?;

        let partition = GridPartition::new(table.nr_of_squares_in_row)?;
        let summary = RecordingSummary::from_table(
            recording_name,
            &table,
            background,
            dropped_tracks,
            self.config.selection.neighbour_mode,
        )
        .with_combined_fit(
            tracks,
            &partition,
            &table,
            self.config.generation.min_tracks_for_tau,
            self.fitter.as_ref(),
        );

        info!(
            "{recording_name}: {} tracks, {} of {} squares visible",
            tracks.len(),
            outcome.nr_visible,
            table.len()
        );
        Ok(ProcessedRecording { table, summary })
    }
}
