// src/cluster.rs
//! Per-tick sample container
//!
//! A [`SampleCluster`] holds every value one acquisition tick produced,
//! keyed by a typed [`Channel`]. Each channel may carry several
//! representations (raw counts, calibrated units, digital); lookups prefer
//! the requested representation and fall back to the first one stored.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::calibration::GsrRange;
use crate::config::constants::simulation::*;

/// Known signal channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Channel {
    GsrConductance,
    GsrResistance,
    /// Uncalibrated ADC count
    GsrRaw,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Channel::GsrConductance => "GSR_Conductance",
            Channel::GsrResistance => "GSR_Resistance",
            Channel::GsrRaw => "GSR",
        }
    }

    pub fn default_unit(self) -> &'static str {
        match self {
            Channel::GsrConductance => UNIT_MICROSIEMENS,
            Channel::GsrResistance => UNIT_KILOHM,
            Channel::GsrRaw => UNIT_COUNTS,
        }
    }
}

pub const UNIT_MICROSIEMENS: &str = "uS";
pub const UNIT_KILOHM: &str = "kOhm";
pub const UNIT_COUNTS: &str = "counts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Representation {
    Raw,
    Calibrated,
    Digital,
}

/// A single value with its unit and representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedValue {
    pub value: f64,
    pub unit: String,
    pub representation: Representation,
}

impl CalibratedValue {
    pub fn new(value: f64, unit: &str, representation: Representation) -> Self {
        Self {
            value,
            unit: unit.to_string(),
            representation,
        }
    }

    pub fn calibrated(channel: Channel, value: f64) -> Self {
        Self::new(value, channel.default_unit(), Representation::Calibrated)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleCluster {
    values: BTreeMap<Channel, Vec<CalibratedValue>>,
    raw_payload: Option<Vec<u8>>,
    system_timestamp: u64,
    range: Option<GsrRange>,
}

impl SampleCluster {
    pub fn new(system_timestamp: u64) -> Self {
        Self {
            system_timestamp,
            ..Default::default()
        }
    }

    pub fn add(&mut self, channel: Channel, value: CalibratedValue) {
        self.values.entry(channel).or_default().push(value);
    }

    /// Builder-style [`add`](Self::add)
    pub fn with(mut self, channel: Channel, value: CalibratedValue) -> Self {
        self.add(channel, value);
        self
    }

    pub fn with_raw_payload(mut self, payload: Vec<u8>) -> Self {
        self.raw_payload = Some(payload);
        self
    }

    pub fn with_range(mut self, range: GsrRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Value for `channel` in the requested representation, or the first
    /// stored value for that channel when the representation is missing.
    pub fn get(&self, channel: Channel, representation: Representation) -> Option<&CalibratedValue> {
        let values = self.values.get(&channel)?;
        values
            .iter()
            .find(|v| v.representation == representation)
            .or_else(|| values.first())
    }

    pub fn get_all(&self, channel: Channel) -> &[CalibratedValue] {
        self.values.get(&channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Like [`get`](Self::get), but synthesizes a plausible value when the
    /// channel is absent so headless pipelines never stall.
    pub fn value_or_simulated(&self, channel: Channel, representation: Representation) -> f64 {
        match self.get(channel, representation) {
            Some(v) => v.value,
            None => simulated_value(channel, self.system_timestamp, &mut rand::thread_rng()),
        }
    }

    pub fn raw_payload(&self) -> Option<&[u8]> {
        self.raw_payload.as_deref()
    }

    pub fn system_timestamp(&self) -> u64 {
        self.system_timestamp
    }

    pub fn range(&self) -> Option<GsrRange> {
        self.range
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.values.keys().copied()
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.values.contains_key(&channel)
    }

    /// Number of channels present
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.raw_payload = None;
        self.system_timestamp = 0;
        self.range = None;
    }
}

/// Slowly drifting synthetic value for a channel at time `t_ms`
pub fn simulated_value<R: Rng + ?Sized>(channel: Channel, t_ms: u64, rng: &mut R) -> f64 {
    let t = t_ms as f64;
    match channel {
        Channel::GsrConductance => {
            BASELINE_CONDUCTANCE_US
                + (t / CONDUCTANCE_PERIOD_MS).sin() * CONDUCTANCE_DRIFT_US
                + rng.gen::<f64>() * CONDUCTANCE_RANDOM_US
        }
        Channel::GsrResistance => {
            BASELINE_RESISTANCE_KOHM
                + (t / DRIFT_PERIOD_MS).cos() * DRIFT_AMPLITUDE_KOHM
                + rng.gen::<f64>() * RANDOM_VARIATION_KOHM
        }
        Channel::GsrRaw => RAW_FALLBACK_ADC as f64,
    }
}
