// THEORY:
// The batch pipeline runs the generation and selection passes over every
// recording of an experiment. Recordings are independent of each other, so they
// are the unit of parallelism: each one is loaded, processed and written by a
// single blocking task, and a bounded number of those run at once.
//
// Key architectural principles:
// 1.  **No shared mutable state**: workers share only the immutable
//     `SquarePipeline`. Each writes its own squares file.
// 2.  **Bounded pool**: a semaphore caps the number of recordings in flight
//     (`num_cpus` by default). A pool of one is strictly sequential.
// 3.  **Per-job failure**: one unreadable recording is reported in its slot of
//     the result list and does not stop the others.
// 4.  **Input order**: results come back in the order the jobs were given,
//     whatever order the workers finish in.

use crate::core_modules::recording_summary::RecordingSummary;
use crate::core_modules::utils::image_helper::image_helper;
use crate::core_modules::utils::square_table::save_squares;
use crate::core_modules::utils::track_table::load_tracks;
use crate::error::{PaintError, Result};
use crate::pipeline::SquarePipeline;
use futures::future::join_all;
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One recording to process.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingJob {
    pub name: String,
    pub tracks_path: PathBuf,
    pub squares_path: PathBuf,
    /// Concentration of this recording, if it differs from the config.
    pub concentration: Option<f64>,
}

impl RecordingJob {
    /// Derives the recording name and output path from a tracks file name:
    /// `rec-1-tracks.csv` becomes recording `rec-1` written to `rec-1-squares.csv`.
    pub fn from_tracks_path(tracks_path: &Path) -> Self {
        let file_name = tracks_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = tracks_path
            .file_stem()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = stem
            .replace("tracks", "")
            .trim_matches(|c: char| c == '-' || c == '_' || c == ' ')
            .to_string();
        let squares_path = tracks_path.with_file_name(file_name.replace("tracks", "squares"));
        Self {
            name: if name.is_empty() { stem } else { name },
            tracks_path: tracks_path.to_path_buf(),
            squares_path,
            concentration: None,
        }
    }
}

/// All `*tracks*.csv` files directly inside `dir`, sorted by path.
pub fn discover_jobs(dir: &Path) -> Result<Vec<RecordingJob>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        let is_tracks = path
            .file_name()
            .is_some_and(|f| f.to_string_lossy().contains("tracks"));
        if path.is_file() && is_csv && is_tracks {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths.iter().map(|p| RecordingJob::from_tracks_path(p)).collect())
}

pub struct BatchPipeline {
    pipeline: Arc<SquarePipeline>,
    jobs: usize,
    square_map_px: Option<u32>,
}

impl BatchPipeline {
    pub fn new(pipeline: SquarePipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            jobs: num_cpus::get().max(1),
            square_map_px: None,
        }
    }

    /// Caps the number of recordings processed at once. Zero is treated as one.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Also writes a PNG square map of `size_px` next to every squares file.
    pub fn with_square_maps(mut self, size_px: u32) -> Self {
        self.square_map_px = Some(size_px);
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub async fn run(&self, jobs: Vec<RecordingJob>) -> Vec<Result<RecordingSummary>> {
        info!("processing {} recordings with {} workers", jobs.len(), self.jobs);
        let semaphore = Arc::new(Semaphore::new(self.jobs));

        let tasks = jobs.into_iter().map(|job| {
            let semaphore = Arc::clone(&semaphore);
            let pipeline = Arc::clone(&self.pipeline);
            let square_map_px = self.square_map_px;
            async move {
                let name = job.name.clone();
                let worker_error = |reason: String| PaintError::Worker {
                    name: name.clone(),
                    reason,
                };
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| worker_error(e.to_string()))?;
                let result = tokio::task::spawn_blocking(move || {
                    process_job(&pipeline, &job, square_map_px)
                })
                .await
                .map_err(|e| worker_error(e.to_string()))?;
                if let Err(e) = &result {
                    error!("recording '{name}' failed: {e}");
                }
                result
            }
        });

        join_all(tasks).await
    }
}

fn process_job(
    pipeline: &SquarePipeline,
    job: &RecordingJob,
    square_map_px: Option<u32>,
) -> Result<RecordingSummary> {
    let tracks = load_tracks(&job.tracks_path)?;
    let processed = pipeline.process(&job.name, &tracks, job.concentration)?;
    save_squares(&job.squares_path, &processed.table)?;
    if let Some(size_px) = square_map_px {
        let map_path = job.squares_path.with_extension("png");
        image_helper::save_square_map(&map_path, &processed.table, size_px)?;
    }
    Ok(processed.summary)
}
