// src/calibration/mod.rs
//! GSR calibration engine
//!
//! Pure numeric conversions between raw ADC counts and skin resistance /
//! conductance for the four hardware gain ranges, plus auto-range
//! selection and a synthetic ADC generator for running without hardware.
//!
//! Domain-invalid inputs never raise: calibration returns the `0.0`
//! sentinel and callers must treat it as "no valid reading".

pub mod quality;

pub use quality::{compute_statistics, is_valid_reading, smooth, GsrStatistics};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::constants::calibration::*;
use crate::error::{GsrError, GsrErrorBuilder, GsrResult};

/// One of the four gain settings of the GSR front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GsrRange {
    /// 10 kOhm - 56 kOhm
    Range10kTo56k,
    /// 56 kOhm - 220 kOhm
    Range56kTo220k,
    /// 220 kOhm - 680 kOhm
    Range220kTo680k,
    /// 680 kOhm - 4.7 MOhm
    Range680kTo4M7,
}

impl GsrRange {
    pub const ALL: [GsrRange; 4] = [
        GsrRange::Range10kTo56k,
        GsrRange::Range56kTo220k,
        GsrRange::Range220kTo680k,
        GsrRange::Range680kTo4M7,
    ];

    /// Wire index of the range (0-3)
    pub fn index(self) -> u8 {
        match self {
            GsrRange::Range10kTo56k => 0,
            GsrRange::Range56kTo220k => 1,
            GsrRange::Range220kTo680k => 2,
            GsrRange::Range680kTo4M7 => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn multiplier(self) -> f64 {
        RANGE_MULTIPLIERS[self.index() as usize]
    }

    pub fn offset(self) -> f64 {
        RANGE_OFFSETS[self.index() as usize]
    }

    /// Nominal `(lower, upper)` resistance bounds in kOhm
    pub fn bounds_kohm(self) -> (f64, f64) {
        let i = self.index() as usize;
        (RANGE_LOWER_KOHM[i], RANGE_UPPER_KOHM[i])
    }
}

impl TryFrom<u8> for GsrRange {
    type Error = GsrError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value).ok_or_else(|| {
            GsrErrorBuilder::new("calibration", "range_from_index")
                .invalid_configuration(format!("gsr range {} is not in 0..=3", value))
        })
    }
}

impl std::fmt::Display for GsrRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (lo, hi) = self.bounds_kohm();
        write!(f, "range {} ({}-{} kOhm)", self.index(), lo, hi)
    }
}

/// Convert a raw ADC count to resistance in kOhm.
///
/// Returns `0.0` when `adc_count` does not exceed the range offset.
pub fn calibrate_to_resistance(adc_count: u16, range: GsrRange) -> f64 {
    resistance_from_counts(adc_count as f64, range)
}

/// Like [`calibrate_to_resistance`] but reports the domain error instead of
/// the sentinel.
pub fn try_calibrate_to_resistance(adc_count: u16, range: GsrRange) -> GsrResult<f64> {
    let resistance = calibrate_to_resistance(adc_count, range);
    if resistance > 0.0 {
        Ok(resistance)
    } else {
        Err(GsrErrorBuilder::new("calibration", "calibrate_to_resistance")
            .calibration_domain(adc_count as i64, range.index()))
    }
}

/// Calibration formula on a continuous count value
pub fn resistance_from_counts(counts: f64, range: GsrRange) -> f64 {
    let denominator = counts - range.offset();
    if denominator > 0.0 {
        range.multiplier() / denominator
    } else {
        0.0
    }
}

/// Ideal (noise-free, unclamped) count for a resistance.
///
/// Exact inverse of [`resistance_from_counts`] for positive resistances.
pub fn adc_for_resistance(resistance_kohm: f64, range: GsrRange) -> f64 {
    range.multiplier() / resistance_kohm + range.offset()
}

pub fn resistance_to_conductance(resistance_kohm: f64) -> f64 {
    if resistance_kohm > 0.0 {
        CONDUCTANCE_FACTOR / resistance_kohm
    } else {
        0.0
    }
}

pub fn conductance_to_resistance(conductance_us: f64) -> f64 {
    if conductance_us > 0.0 {
        CONDUCTANCE_FACTOR / conductance_us
    } else {
        0.0
    }
}

/// Narrowest range whose upper bound covers the resistance.
///
/// Values beyond the top range clamp to it; selection is advisory.
pub fn select_optimal_range(resistance_kohm: f64) -> GsrRange {
    GsrRange::ALL
        .into_iter()
        .find(|range| resistance_kohm <= range.bounds_kohm().1)
        .unwrap_or(GsrRange::Range680kTo4M7)
}

/// Synthetic ADC count for a target resistance with +/-5% jitter
pub fn generate_simulated_adc(target_resistance_kohm: f64, range: GsrRange) -> u16 {
    generate_simulated_adc_with(target_resistance_kohm, range, &mut rand::thread_rng())
}

/// [`generate_simulated_adc`] with a caller-supplied random source
pub fn generate_simulated_adc_with<R: Rng + ?Sized>(
    target_resistance_kohm: f64,
    range: GsrRange,
    rng: &mut R,
) -> u16 {
    if !(target_resistance_kohm > 0.0) {
        // Infinite ideal count
        return ADC_MAX;
    }

    let ideal = adc_for_resistance(target_resistance_kohm, range);
    let noise = (rng.gen::<f64>() - 0.5) * 2.0 * SIMULATION_JITTER * ideal;
    let jittered = (ideal + noise).trunc();

    jittered.clamp(ADC_MIN as f64, ADC_MAX as f64) as u16
}
