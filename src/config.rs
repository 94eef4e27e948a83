// THEORY:
// One explicit configuration value replaces any process-wide settings object. A
// `PaintConfig` is loaded from JSON (or defaulted), validated, and handed to the
// pipeline by the caller. Nothing in the engine reads configuration on its own.
//
// Every field has a serde default so a partial file, or `{}`, is a valid config.

use crate::core_modules::neighbour_filter::NeighbourMode;
use crate::core_modules::square_metrics::FitParams;
use crate::core_modules::threshold_selector::{DurationWindow, SelectionThresholds};
use crate::error::{PaintError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Parameters of the batch pass: grid, fit policy and concentration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "GenerationConfig::default_nr_of_squares_in_row")]
    pub nr_of_squares_in_row: u32,
    #[serde(default = "GenerationConfig::default_min_tracks_for_tau")]
    pub min_tracks_for_tau: u32,
    #[serde(default = "GenerationConfig::default_min_r_squared")]
    pub min_r_squared: f64,
    #[serde(default = "GenerationConfig::default_concentration")]
    pub concentration: f64,
}

impl GenerationConfig {
    fn default_nr_of_squares_in_row() -> u32 {
        20
    }
    fn default_min_tracks_for_tau() -> u32 {
        20
    }
    fn default_min_r_squared() -> f64 {
        0.9
    }
    fn default_concentration() -> f64 {
        1.0
    }

    /// Fit parameters for a recording, with an optional concentration override.
    pub fn fit_params(&self, concentration: Option<f64>) -> FitParams {
        FitParams {
            min_tracks_for_tau: self.min_tracks_for_tau,
            min_r_squared: self.min_r_squared,
            concentration: concentration.unwrap_or(self.concentration),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            nr_of_squares_in_row: Self::default_nr_of_squares_in_row(),
            min_tracks_for_tau: Self::default_min_tracks_for_tau(),
            min_r_squared: Self::default_min_r_squared(),
            concentration: Self::default_concentration(),
        }
    }
}

/// Parameters of the interactive pass: thresholds and neighbour policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "SelectionConfig::default_min_density_ratio")]
    pub min_density_ratio: f64,
    #[serde(default = "SelectionConfig::default_max_variability")]
    pub max_variability: f64,
    #[serde(default)]
    pub use_duration_window: bool,
    #[serde(default)]
    pub min_track_duration: f64,
    #[serde(default = "SelectionConfig::default_max_track_duration")]
    pub max_track_duration: f64,
    #[serde(default)]
    pub min_r_squared: Option<f64>,
    #[serde(default)]
    pub neighbour_mode: NeighbourMode,
    #[serde(default = "SelectionConfig::default_true")]
    pub only_valid_tau: bool,
    /// Historical edge behaviour of the neighbour filter. Deprecation candidate.
    #[serde(default = "SelectionConfig::default_true")]
    pub clamp_self_as_neighbor: bool,
}

impl SelectionConfig {
    fn default_min_density_ratio() -> f64 {
        2.0
    }
    fn default_max_variability() -> f64 {
        10.0
    }
    fn default_max_track_duration() -> f64 {
        1_000_000.0
    }
    fn default_true() -> bool {
        true
    }

    pub fn thresholds(&self) -> SelectionThresholds {
        SelectionThresholds {
            min_density_ratio: self.min_density_ratio,
            max_variability: self.max_variability,
            duration_window: self.use_duration_window.then_some(DurationWindow {
                min_track_duration: self.min_track_duration,
                max_track_duration: self.max_track_duration,
            }),
            min_r_squared: self.min_r_squared,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_density_ratio: Self::default_min_density_ratio(),
            max_variability: Self::default_max_variability(),
            use_duration_window: false,
            min_track_duration: 0.0,
            max_track_duration: Self::default_max_track_duration(),
            min_r_squared: None,
            neighbour_mode: NeighbourMode::default(),
            only_valid_tau: true,
            clamp_self_as_neighbor: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaintConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
}

impl PaintConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: PaintConfig =
            serde_json::from_str(&text).map_err(|source| PaintError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file if it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!("config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|source| PaintError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let generation = &self.generation;
        if generation.nr_of_squares_in_row == 0 {
            return Err(PaintError::InvalidConfig(
                "nr_of_squares_in_row must be at least 1".to_string(),
            ));
        }
        if !(generation.concentration > 0.0) {
            return Err(PaintError::InvalidConfig(format!(
                "concentration must be positive, got {}",
                generation.concentration
            )));
        }
        if !(0.0..=1.0).contains(&generation.min_r_squared) {
            return Err(PaintError::InvalidConfig(format!(
                "min_r_squared must lie in [0, 1], got {}",
                generation.min_r_squared
            )));
        }
        self.selection.thresholds().validate()
    }
}
