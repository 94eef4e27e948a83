// THEORY:
// The `Track` is the most fundamental unit of the engine. It is a "dumb" data
// container for a single-molecule trajectory, reduced to the two properties the
// square engine needs: how long it lasted and where its centroid lies. Anything
// that needs more than one track (counting, binning, fitting) belongs in the
// square-level modules.

use serde::Deserialize;

/// A single trajectory detected in a recording.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Track {
    /// Identifier assigned by the tracker, unique within a recording.
    #[serde(rename = "Track Id")]
    pub track_id: u64,
    /// Track duration in seconds.
    #[serde(rename = "Track Duration")]
    pub duration: f64,
    /// Centroid x coordinate in micrometres.
    #[serde(rename = "Track X Location")]
    pub x: f64,
    /// Centroid y coordinate in micrometres.
    #[serde(rename = "Track Y Location")]
    pub y: f64,
}

impl Track {
    pub fn new(track_id: u64, duration: f64, x: f64, y: f64) -> Self {
        Self {
            track_id,
            duration,
            x,
            y,
        }
    }
}

/// Track durations collapsed into distinct values with their frequency,
/// ascending by duration. This is the input of the decay fit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DurationHistogram {
    pub bins: Vec<(f64, u32)>,
}

impl DurationHistogram {
    pub fn from_tracks(tracks: &[&Track]) -> Self {
        let mut durations: Vec<f64> = tracks
            .iter()
            .map(|t| t.duration)
            .filter(|d| d.is_finite())
            .collect();
        durations.sort_by(f64::total_cmp);

        let mut bins: Vec<(f64, u32)> = Vec::new();
        for duration in durations {
            match bins.last_mut() {
                Some((value, count)) if *value == duration => *count += 1,
                _ => bins.push((duration, 1)),
            }
        }
        Self { bins }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}
