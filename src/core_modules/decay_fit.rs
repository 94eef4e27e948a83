// THEORY:
// Tau is the time constant of the exponential decay of the track-duration
// distribution in a square. The engine does not care how it is fitted; it only
// needs `fit_decay(histogram) -> (tau_ms, r_squared) | failed`. That contract is
// the `DecayFitter` trait, so callers can plug in a better optimiser without
// touching the square pipeline.
//
// The bundled `LogLinearFitter` is deliberately simple: a least-squares line
// through `ln(count)` against duration, with R² measured on the count scale.

use crate::core_modules::track::DurationHistogram;
use thiserror::Error;

const MIN_BINS_FOR_FIT: usize = 3;

/// A converged decay fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayFit {
    pub tau_ms: f64,
    pub r_squared: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("decay fit failed: {0}")]
pub struct FitFailed(pub &'static str);

pub trait DecayFitter {
    fn fit_decay(&self, histogram: &DurationHistogram) -> Result<DecayFit, FitFailed>;
}

/// Fits `count = A * exp(-rate * duration)` by linear regression in log space.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLinearFitter;

impl DecayFitter for LogLinearFitter {
    fn fit_decay(&self, histogram: &DurationHistogram) -> Result<DecayFit, FitFailed> {
        let points: Vec<(f64, f64)> = histogram
            .bins
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|&(duration, count)| (duration, count as f64))
            .collect();
        if points.len() < MIN_BINS_FOR_FIT {
            return Err(FitFailed("not enough distinct durations"));
        }

        // --- 1. Linear regression of ln(count) on duration ---
        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_ln_y = points.iter().map(|(_, y)| y.ln()).sum::<f64>() / n;
        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (x, y) in &points {
            sxx += (x - mean_x).powi(2);
            sxy += (x - mean_x) * (y.ln() - mean_ln_y);
        }
        if sxx <= f64::EPSILON {
            return Err(FitFailed("durations have no spread"));
        }
        let slope = sxy / sxx;
        let intercept = mean_ln_y - slope * mean_x;
        let rate = -slope;
        if !(rate.is_finite() && rate > 0.0 && intercept.is_finite()) {
            return Err(FitFailed("no decay"));
        }

        // --- 2. Goodness of fit on the count scale ---
        let amplitude = intercept.exp();
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (x, y) in &points {
            let predicted = amplitude * (-rate * x).exp();
            ss_res += (y - predicted).powi(2);
            ss_tot += (y - mean_y).powi(2);
        }
        if ss_tot <= 0.0 {
            return Err(FitFailed("counts have no variance"));
        }
        let r_squared = (1.0 - ss_res / ss_tot).clamp(0.0, 1.0);
        let tau_ms = 1000.0 / rate;
        if !(tau_ms.is_finite() && r_squared.is_finite()) {
            return Err(FitFailed("non-finite parameters"));
        }

        Ok(DecayFit { tau_ms, r_squared })
    }
}
