// Reading the per-recording tracks CSV. Only the four columns the engine uses are
// required; anything else the tracker wrote is ignored.

use crate::core_modules::track::Track;
use crate::error::{PaintError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const TRACK_COLUMNS: [&str; 4] = [
    "Track Id",
    "Track Duration",
    "Track X Location",
    "Track Y Location",
];

pub fn read_tracks<R: Read>(reader: R) -> Result<Vec<Track>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    for column in TRACK_COLUMNS {
        if !headers.iter().any(|h| h.trim() == column) {
            return Err(PaintError::MissingTrackColumn(column.to_string()));
        }
    }

    let mut tracks = Vec::new();
    for record in csv_reader.deserialize() {
        let track: Track = record?;
        if !(track.duration.is_finite() && track.duration >= 0.0) {
            return Err(PaintError::InvalidTrackDuration {
                track_id: track.track_id,
                duration: track.duration,
            });
        }
        tracks.push(track);
    }
    Ok(tracks)
}

pub fn load_tracks(path: &Path) -> Result<Vec<Track>> {
    read_tracks(File::open(path)?)
}
