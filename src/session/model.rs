// src/session/model.rs
//! Session data model: samples, sync marks and the session record

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::calibration::GsrRange;

/// Export column order for [`GsrSample::to_row`]
pub const SAMPLE_HEADER: [&str; 6] = [
    "timestamp_ms",
    "utc_timestamp_ms",
    "conductance_us",
    "resistance_kohms",
    "sample_index",
    "session_id",
];

/// Export column order for [`SyncMark::to_row`]
pub const SYNC_MARK_HEADER: [&str; 5] = [
    "timestamp_ms",
    "utc_timestamp_ms",
    "event_type",
    "session_id",
    "metadata",
];

/// One accepted GSR reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GsrSample {
    pub timestamp: u64,
    pub utc_timestamp: u64,
    /// Microsiemens
    pub conductance: f64,
    /// Kilohms
    pub resistance: f64,
    pub sample_index: u64,
    pub session_id: String,
    pub raw_value: Option<u16>,
    pub range: Option<GsrRange>,
    /// Passed the plausibility check
    pub is_valid: bool,
}

impl GsrSample {
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.to_string(),
            self.utc_timestamp.to_string(),
            format!("{:.6}", self.conductance),
            format!("{:.6}", self.resistance),
            self.sample_index.to_string(),
            self.session_id.clone(),
        ]
    }
}

/// Cross-modal synchronization event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMark {
    pub timestamp: u64,
    pub utc_timestamp: u64,
    pub event_type: String,
    pub session_id: String,
    pub metadata: BTreeMap<String, String>,
}

impl SyncMark {
    /// Metadata as `k=v` pairs joined by `;`, in key order
    pub fn metadata_string(&self) -> String {
        self.metadata
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.to_string(),
            self.utc_timestamp.to_string(),
            self.event_type.clone(),
            self.session_id.clone(),
            self.metadata_string(),
        ]
    }
}

/// Capture modality recorded alongside GSR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    Gsr,
    Rgb,
    Thermal,
}

/// Record of one recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub start_time: u64,
    pub end_time: Option<u64>,
    pub participant_id: Option<String>,
    pub study_name: Option<String>,
    pub sample_count: u64,
    /// Accepted samples that failed the plausibility check
    pub flagged_count: u64,
    /// Readings refused because resistance or conductance was not positive
    pub rejected_count: u64,
    pub sync_marks: Vec<SyncMark>,
    pub has_gsr_data: bool,
    pub has_rgb_data: bool,
    pub has_thermal_data: bool,
    pub metadata: BTreeMap<String, String>,
}

impl SessionInfo {
    pub fn new(session_id: &str, start_time: u64) -> Self {
        Self {
            session_id: session_id.to_string(),
            start_time,
            end_time: None,
            participant_id: None,
            study_name: None,
            sample_count: 0,
            flagged_count: 0,
            rejected_count: 0,
            sync_marks: Vec::new(),
            has_gsr_data: false,
            has_rgb_data: false,
            has_thermal_data: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Not yet sealed
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Elapsed time, up to `now` while active
    pub fn duration_ms(&self, now: u64) -> u64 {
        self.end_time.unwrap_or(now).saturating_sub(self.start_time)
    }

    /// `"1h 2m"`, `"3m 4s"` or `"5s"`
    pub fn duration_formatted(&self, now: u64) -> String {
        let seconds = self.duration_ms(now) / 1000;
        let minutes = seconds / 60;
        let hours = minutes / 60;

        if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds)
        }
    }

    pub fn set_modality(&mut self, modality: Modality) {
        match modality {
            Modality::Gsr => self.has_gsr_data = true,
            Modality::Rgb => self.has_rgb_data = true,
            Modality::Thermal => self.has_thermal_data = true,
        }
    }

    pub fn data_type_summary(&self) -> String {
        let types: Vec<&str> = [
            (self.has_gsr_data, "GSR"),
            (self.has_rgb_data, "RGB"),
            (self.has_thermal_data, "Thermal"),
        ]
        .into_iter()
        .filter_map(|(present, name)| present.then_some(name))
        .collect();

        if types.is_empty() {
            "No data".to_string()
        } else {
            types.join(", ")
        }
    }

    pub fn stats(&self, now: u64) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            duration_ms: self.duration_ms(now),
            sample_count: self.sample_count,
            sync_mark_count: self.sync_marks.len(),
            is_active: self.is_active(),
        }
    }
}

/// Lightweight snapshot for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub duration_ms: u64,
    pub sample_count: u64,
    pub sync_mark_count: usize,
    pub is_active: bool,
}
