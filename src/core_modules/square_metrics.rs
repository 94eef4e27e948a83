// THEORY:
// The metrics calculator turns the tracks that landed in one square into the
// square's write-once statistics. It looks at one square in isolation; anything
// that needs the whole recording (the background density behind the density
// ratio) is done in a second pass by `density_ratio`.
//
// Tau policy lives here as well: the fit is only attempted with enough tracks,
// a failed fit becomes `NotConverged`, and a converged fit with a poor R² is
// downgraded to `LowConfidence` while its R² is kept for reporting.

use crate::core_modules::decay_fit::DecayFitter;
use crate::core_modules::grid_partition::SquareGeometry;
use crate::core_modules::square::{Square, Tau};
use crate::core_modules::track::{DurationHistogram, Track};
use crate::core_modules::utils::numeric::{mean, population_std_dev, round_count, round_to};
use log::trace;

/// Normalisation constants of the density formula.
const DENSITY_TIME: f64 = 100.0;
const DENSITY_MAGNIFICATION: f64 = 1000.0;

/// Sub-grid resolution used for the variability statistic.
pub const VARIABILITY_GRANULARITY: usize = 10;

/// Below this many tracks the "long track" average is just the longest track.
const LONG_TRACK_MIN_TRACKS: usize = 10;
const LONG_TRACK_FRACTION: f64 = 0.1;

/// Per-recording parameters for the metrics pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    pub min_tracks_for_tau: u32,
    pub min_r_squared: f64,
    /// Concentration of the recording, used by the density formula.
    pub concentration: f64,
}

/// Statistics of one square, before the density ratio is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareMetrics {
    pub nr_tracks: u32,
    pub total_track_duration: f64,
    pub average_long_track_duration: f64,
    pub max_track_duration: f64,
    pub density: f64,
    pub variability: f64,
    pub tau: Tau,
    pub r_squared: f64,
}

impl SquareMetrics {
    /// Copies the metrics onto a square record.
    pub fn apply_to(&self, square: &mut Square) {
        square.nr_tracks = self.nr_tracks;
        square.total_track_duration = self.total_track_duration;
        square.average_long_track_duration = self.average_long_track_duration;
        square.max_track_duration = self.max_track_duration;
        square.density = self.density;
        square.variability = self.variability;
        square.tau = self.tau;
        square.valid_tau = self.tau.is_valid();
        square.r_squared = self.r_squared;
    }
}

pub fn compute_metrics(
    tracks: &[&Track],
    geometry: &SquareGeometry,
    params: &FitParams,
    fitter: &dyn DecayFitter,
) -> SquareMetrics {
    // Non-finite durations carry no time; the histogram skips them too.
    let mut durations: Vec<f64> = tracks
        .iter()
        .map(|t| t.duration)
        .filter(|d| d.is_finite())
        .collect();
    durations.sort_by(|a, b| b.total_cmp(a));

    let (tau, r_squared) = fit_tau(tracks, params, fitter);

    SquareMetrics {
        nr_tracks: tracks.len() as u32,
        total_track_duration: durations.iter().sum(),
        average_long_track_duration: average_long_track_duration(&durations),
        max_track_duration: durations.first().copied().unwrap_or(0.0),
        density: density(tracks.len(), geometry.area(), params.concentration),
        variability: variability(tracks, geometry, VARIABILITY_GRANULARITY),
        tau,
        r_squared,
    }
}

fn fit_tau(tracks: &[&Track], params: &FitParams, fitter: &dyn DecayFitter) -> (Tau, f64) {
    if (tracks.len() as u32) < params.min_tracks_for_tau {
        return (Tau::TooFewTracks, 0.0);
    }
    let histogram = DurationHistogram::from_tracks(tracks);
    match fitter.fit_decay(&histogram) {
        Ok(fit) if fit.r_squared < params.min_r_squared => (Tau::LowConfidence, fit.r_squared),
        Ok(fit) => (Tau::Fitted(fit.tau_ms), fit.r_squared),
        Err(reason) => {
            trace!("{reason} for {} tracks", tracks.len());
            (Tau::NotConverged, 0.0)
        }
    }
}

/// Mean duration of the longest tracks. `durations` must be sorted descending.
fn average_long_track_duration(durations: &[f64]) -> f64 {
    match durations.len() {
        0 => 0.0,
        n if n < LONG_TRACK_MIN_TRACKS => durations[0],
        n => {
            let count = round_count(n as f64 * LONG_TRACK_FRACTION).max(1);
            mean(&durations[..count])
        }
    }
}

pub fn density(nr_tracks: usize, area: f64, concentration: f64) -> f64 {
    if nr_tracks == 0 || area <= 0.0 || concentration <= 0.0 {
        return 0.0;
    }
    let value =
        nr_tracks as f64 / area / DENSITY_TIME / concentration * DENSITY_MAGNIFICATION;
    round_to(value, 1)
}

/// Spatial non-uniformity: coefficient of variation of track counts over a
/// `granularity x granularity` sub-grid of the square.
pub fn variability(tracks: &[&Track], geometry: &SquareGeometry, granularity: usize) -> f64 {
    if tracks.is_empty() || granularity == 0 {
        return 0.0;
    }
    let cell_width = geometry.width() / granularity as f64;
    let cell_height = geometry.height() / granularity as f64;
    let last = granularity - 1;

    let mut bins = vec![0.0; granularity * granularity];
    for track in tracks {
        let col = (((track.x - geometry.x0) / cell_width).floor().max(0.0) as usize).min(last);
        let row = (((track.y - geometry.y0) / cell_height).floor().max(0.0) as usize).min(last);
        bins[row * granularity + col] += 1.0;
    }

    let m = mean(&bins);
    if m == 0.0 {
        return 0.0;
    }
    population_std_dev(&bins) / m
}
