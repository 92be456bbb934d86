// src/calibration/quality.rs
//! Signal quality: reading validation, smoothing and summary statistics

use serde::{Deserialize, Serialize};

use crate::config::constants::calibration::*;

use super::resistance_to_conductance;

/// Physiological plausibility of a resistance/conductance pair.
///
/// The cross-consistency term assumes both values derive from the same
/// resistance; independent channels may legitimately fail it, so callers
/// treat `false` as a quality flag rather than a reason to drop data.
pub fn is_valid_reading(resistance_kohm: f64, conductance_us: f64) -> bool {
    let valid_resistance =
        (MIN_VALID_RESISTANCE_KOHM..=MAX_VALID_RESISTANCE_KOHM).contains(&resistance_kohm);
    let valid_conductance =
        (MIN_VALID_CONDUCTANCE_US..=MAX_VALID_CONDUCTANCE_US).contains(&conductance_us);

    if !(valid_resistance && valid_conductance) {
        return false;
    }

    let expected = resistance_to_conductance(resistance_kohm);
    (expected - conductance_us).abs() / conductance_us < CONSISTENCY_TOLERANCE
}

/// Centered moving average with windows truncated at the edges.
///
/// Series shorter than the window are returned unchanged.
pub fn smooth(values: &[f64], window_size: usize) -> Vec<f64> {
    if values.len() < window_size || window_size == 0 {
        return values.to_vec();
    }

    let half = window_size / 2;
    let last = values.len() - 1;

    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half).min(last);
            let window = &values[start..=end];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// Summary statistics over a conductance series
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GsrStatistics {
    pub mean: f64,
    pub std_dev: f64,
    pub range: f64,
    /// Mean of the slowly smoothed series
    pub tonic: f64,
    /// Fast-component proxy
    pub phasic: f64,
    pub is_valid: bool,
}

pub fn compute_statistics(conductance: &[f64]) -> GsrStatistics {
    if conductance.is_empty() {
        return GsrStatistics::default();
    }

    let n = conductance.len() as f64;
    let mean = conductance.iter().sum::<f64>() / n;
    let variance = conductance.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let max = conductance.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = conductance.iter().copied().fold(f64::INFINITY, f64::min);
    let range = max - min;

    let smoothed = smooth(conductance, TONIC_SMOOTHING_WINDOW);
    let tonic = smoothed.iter().sum::<f64>() / smoothed.len() as f64;
    let phasic = std_dev * PHASIC_STDDEV_FACTOR;

    let is_valid = (MIN_VALID_MEAN_US..=MAX_VALID_MEAN_US).contains(&mean)
        && std_dev < mean * MAX_STDDEV_RATIO
        && range < mean * MAX_RANGE_RATIO;

    GsrStatistics {
        mean,
        std_dev,
        range,
        tonic,
        phasic,
        is_valid,
    }
}
