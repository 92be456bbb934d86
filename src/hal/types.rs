// src/hal/types.rs
//! Core types for GSR device abstraction

use serde::{Deserialize, Serialize};

use crate::calibration::GsrRange;
use crate::cluster::SampleCluster;
use crate::config::constants::device::*;
use crate::error::GsrError;

pub use crate::config::DeviceKind;

/// Connection / streaming state of a peripheral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
}

impl DeviceState {
    /// Connected or streaming
    pub fn is_connected(self) -> bool {
        matches!(self, DeviceState::Connected | DeviceState::Streaming)
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceState::Disconnected => "disconnected",
            DeviceState::Connecting => "connecting",
            DeviceState::Connected => "connected",
            DeviceState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// One ADC reading as delivered by a transport or the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSample {
    pub adc_count: u16,
    pub range: GsrRange,
    /// Device-relative timestamp in milliseconds
    pub device_timestamp: u64,
}

/// Identification reported by `inquiry()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub firmware_version: String,
    pub hardware_version: String,
    /// Percent
    pub battery_level: u8,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            firmware_version: DEFAULT_FIRMWARE_VERSION.to_string(),
            hardware_version: DEFAULT_HARDWARE_VERSION.to_string(),
            battery_level: DEFAULT_BATTERY_LEVEL,
        }
    }
}

/// Static description of a bound device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub address: String,
    pub name: String,
    pub kind: DeviceKind,
    pub simulated: bool,
}

/// Everything a device pushes to its consumer, in acquisition order
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Sample(SampleCluster),
    /// `"CONNECTED"` or `"DISCONNECTED"`
    ConnectionStatus(String),
    StateChanged(DeviceState),
    Inquiry(DeviceIdentity),
    Error(GsrError),
}
