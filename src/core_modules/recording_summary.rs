// THEORY:
// The recording summary is the bridge from square-level data to the experiment
// level. Each recording's squares table collapses into one row: how many squares
// survived selection, how many tracks they hold, and what their kinetics look
// like. An experiment is the list of those rows, written as one CSV.
//
// Besides averaging the per-square taus, the summary can carry a combined fit:
// the decay fitted over every track in the visible squares together, which is
// more robust than the mean of many small fits.

use crate::core_modules::decay_fit::DecayFitter;
use crate::core_modules::grid_partition::GridPartition;
use crate::core_modules::neighbour_filter::NeighbourMode;
use crate::core_modules::square::SquareTable;
use crate::core_modules::track::{DurationHistogram, Track};
use crate::core_modules::utils::numeric::{mean, median};
use crate::error::Result;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingSummary {
    #[serde(rename = "Recording Name")]
    pub recording_name: String,
    #[serde(rename = "Nr Squares")]
    pub nr_squares: usize,
    #[serde(rename = "Nr Valid Tau")]
    pub nr_valid_tau: usize,
    #[serde(rename = "Nr Selected")]
    pub nr_selected: usize,
    #[serde(rename = "Nr Visible")]
    pub nr_visible: usize,
    #[serde(rename = "Total Tracks")]
    pub total_tracks: u64,
    #[serde(rename = "Tracks In Visible")]
    pub tracks_in_visible: u64,
    #[serde(rename = "Dropped Tracks")]
    pub dropped_tracks: usize,
    #[serde(rename = "Background")]
    pub background: f64,
    #[serde(rename = "Mean Tau")]
    pub mean_tau: Option<f64>,
    #[serde(rename = "Median Tau")]
    pub median_tau: Option<f64>,
    #[serde(rename = "Mean Density Ratio")]
    pub mean_density_ratio: Option<f64>,
    #[serde(rename = "Combined Tau")]
    pub combined_tau: Option<f64>,
    #[serde(rename = "Combined R2")]
    pub combined_r_squared: Option<f64>,
    #[serde(rename = "Neighbour Mode")]
    pub neighbour_mode: String,
}

impl RecordingSummary {
    pub fn from_table(
        recording_name: &str,
        table: &SquareTable,
        background: f64,
        dropped_tracks: usize,
        neighbour_mode: NeighbourMode,
    ) -> Self {
        let visible: Vec<_> = table.squares.iter().filter(|s| s.visible).collect();
        let taus: Vec<f64> = visible.iter().filter_map(|s| s.tau.fitted()).collect();
        let ratios: Vec<f64> = visible.iter().map(|s| s.density_ratio).collect();

        Self {
            recording_name: recording_name.to_string(),
            nr_squares: table.len(),
            nr_valid_tau: table.squares.iter().filter(|s| s.valid_tau).count(),
            nr_selected: table.selected_count(),
            nr_visible: visible.len(),
            total_tracks: table.total_tracks(),
            tracks_in_visible: visible.iter().map(|s| s.nr_tracks as u64).sum(),
            dropped_tracks,
            background,
            mean_tau: (!taus.is_empty()).then(|| mean(&taus)),
            median_tau: median(&taus),
            mean_density_ratio: (!ratios.is_empty()).then(|| mean(&ratios)),
            combined_tau: None,
            combined_r_squared: None,
            neighbour_mode: neighbour_mode.to_string(),
        }
    }

    /// Fits one decay over all tracks that fall in visible squares. Leaves the
    /// combined fields empty when there are too few tracks or the fit fails.
    pub fn with_combined_fit(
        mut self,
        tracks: &[Track],
        partition: &GridPartition,
        table: &SquareTable,
        min_tracks_for_tau: u32,
        fitter: &dyn DecayFitter,
    ) -> Self {
        let assignment = partition.assign_tracks(tracks);
        let in_visible: Vec<&Track> = table
            .squares
            .iter()
            .filter(|s| s.visible)
            .flat_map(|s| assignment.per_square[s.square_nr as usize].iter().copied())
            .collect();
        if (in_visible.len() as u32) < min_tracks_for_tau || in_visible.is_empty() {
            return self;
        }
        if let Ok(fit) = fitter.fit_decay(&DurationHistogram::from_tracks(&in_visible)) {
            self.combined_tau = Some(fit.tau_ms);
            self.combined_r_squared = Some(fit.r_squared);
        }
        self
    }
}

/// Writes the experiment-level table, one row per recording.
pub fn write_summaries<W: Write>(writer: W, summaries: &[RecordingSummary]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for summary in summaries {
        csv_writer.serialize(summary)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn save_summaries(path: &Path, summaries: &[RecordingSummary]) -> Result<()> {
    write_summaries(File::create(path)?, summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::decay_fit::LogLinearFitter;
    use crate::core_modules::square::Tau;

    fn table() -> SquareTable {
        let mut table = SquareTable::empty(&GridPartition::with_image_size(2, 10.0).unwrap());
        let rows = [
            (10, Tau::Fitted(100.0), true, true),
            (20, Tau::Fitted(300.0), true, true),
            (5, Tau::TooFewTracks, true, false),
            (0, Tau::TooFewTracks, false, false),
        ];
        for (square, (tracks, tau, selected, visible)) in table.squares.iter_mut().zip(rows) {
            square.nr_tracks = tracks;
            square.tau = tau;
            square.valid_tau = tau.is_valid();
            square.selected = selected;
            square.visible = visible;
            square.density_ratio = tracks as f64 / 5.0;
        }
        table
    }

    #[test]
    fn summary_counts_visible_squares_only() {
        let summary =
            RecordingSummary::from_table("rec-1", &table(), 5.0, 3, NeighbourMode::Strict);
        assert_eq!(summary.nr_squares, 4);
        assert_eq!(summary.nr_valid_tau, 2);
        assert_eq!(summary.nr_selected, 3);
        assert_eq!(summary.nr_visible, 2);
        assert_eq!(summary.total_tracks, 35);
        assert_eq!(summary.tracks_in_visible, 30);
        assert_eq!(summary.mean_tau, Some(200.0));
        assert_eq!(summary.median_tau, Some(200.0));
        assert_eq!(summary.mean_density_ratio, Some(3.0));
        assert_eq!(summary.neighbour_mode, "Strict");
    }

    #[test]
    fn nothing_visible_leaves_averages_empty() {
        let mut table = table();
        for square in table.squares.iter_mut() {
            square.visible = false;
        }
        let summary = RecordingSummary::from_table("rec-2", &table, 0.0, 0, NeighbourMode::Free);
        assert_eq!(summary.mean_tau, None);
        assert_eq!(summary.mean_density_ratio, None);
    }

    #[test]
    fn combined_fit_uses_tracks_of_visible_squares() {
        let table = table();
        let partition = GridPartition::with_image_size(2, 10.0).unwrap();
        let mut tracks = Vec::new();
        let mut id = 0;
        // An exponential duration profile inside square 0, noise in square 3.
        for (i, count) in [400, 150, 55, 20, 8].into_iter().enumerate() {
            for _ in 0..count {
                tracks.push(Track::new(id, (i + 1) as f64 * 0.1, 1.0, 1.0));
                id += 1;
            }
        }
        tracks.push(Track::new(id, 9.0, 9.0, 9.0));

        let summary = RecordingSummary::from_table("rec-3", &table, 1.0, 0, NeighbourMode::Free)
            .with_combined_fit(&tracks, &partition, &table, 10, &LogLinearFitter);
        let tau = summary.combined_tau.unwrap();
        assert!(tau > 90.0 && tau < 110.0, "tau was {tau}");
    }

    #[test]
    fn summaries_are_written_with_headers() {
        let summary =
            RecordingSummary::from_table("rec-1", &table(), 5.0, 0, NeighbourMode::Relaxed);
        let mut buffer = Vec::new();
        write_summaries(&mut buffer, &[summary.clone(), summary]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Recording Name,Nr Squares"));
        assert!(lines[1].starts_with("rec-1,4,2,3,2,35,30"));
    }
}
