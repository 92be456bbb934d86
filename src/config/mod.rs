// src/config/mod.rs
//! Configuration management system

pub mod constants;
pub mod loader;
pub mod device_config;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};
pub use device_config::*;

use serde::{Deserialize, Serialize};

/// Complete system configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct SystemConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub simulator: SimulatorSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub calibration: CalibrationSettings,
}

/// Peripheral selection and sensor setup
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DeviceSettings {
    /// Bluetooth address used when the host does not pass one
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default = "defaults::device_name")]
    pub name: String,

    #[serde(default = "defaults::sampling_rate_hz")]
    pub sampling_rate_hz: f64,

    #[serde(default = "defaults::enabled_sensors")]
    pub enabled_sensors: u16,

    /// 0-3 fixed range, 4 auto
    #[serde(default = "defaults::gsr_range")]
    pub gsr_range: u8,

    #[serde(default = "defaults::device_kind")]
    pub device_kind: DeviceKind,

    #[serde(default = "defaults::connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    #[serde(default = "defaults::inquiry_timeout_ms")]
    pub inquiry_timeout_ms: u64,

    /// Undelivered samples a device holds before dropping new ticks
    #[serde(default = "defaults::event_queue_capacity")]
    pub event_queue_capacity: usize,
}

/// Synthetic signal source used when no peripheral is attached
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SimulatorSettings {
    #[serde(default = "defaults::connect_delay_ms")]
    pub connect_delay_ms: u64,

    #[serde(default = "defaults::baseline_resistance_kohm")]
    pub baseline_resistance_kohm: f64,

    #[serde(default = "defaults::drift_amplitude_kohm")]
    pub drift_amplitude_kohm: f64,

    #[serde(default = "defaults::drift_period_ms")]
    pub drift_period_ms: f64,

    #[serde(default = "defaults::random_variation_kohm")]
    pub random_variation_kohm: f64,

    /// Drive acquisition from an internal timer; when off, samples only
    /// arrive through explicit injection
    #[serde(default = "defaults::timer_enabled")]
    pub timer_enabled: bool,

    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionSettings {
    #[serde(default = "defaults::session_prefix")]
    pub session_prefix: String,

    #[serde(default = "defaults::study_name")]
    pub study_name: String,

    #[serde(default)]
    pub participant_id: Option<String>,

    /// Correction from host clock to UTC
    #[serde(default)]
    pub utc_offset_ms: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CalibrationSettings {
    /// Window used by `RecordingSession::smoothed_conductance`
    #[serde(default = "defaults::smoothing_window")]
    pub smoothing_window: usize,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;
    use crate::config::DeviceKind;

    pub fn device_name() -> String { device::DEFAULT_DEVICE_NAME.to_string() }
    pub fn sampling_rate_hz() -> f64 { device::DEFAULT_SAMPLING_RATE_HZ }
    pub fn enabled_sensors() -> u16 { device::SENSOR_GSR }
    pub fn gsr_range() -> u8 { device::GSR_RANGE_AUTO }
    pub fn device_kind() -> DeviceKind { DeviceKind::Shimmer3 }
    pub fn connection_timeout_ms() -> u64 { hal::DEFAULT_CONNECTION_TIMEOUT_MS }
    pub fn inquiry_timeout_ms() -> u64 { hal::DEFAULT_INQUIRY_TIMEOUT_MS }
    pub fn event_queue_capacity() -> usize { hal::DEFAULT_EVENT_QUEUE_CAPACITY }

    pub fn connect_delay_ms() -> u64 { hal::DEFAULT_SIMULATED_CONNECT_DELAY_MS }
    pub fn baseline_resistance_kohm() -> f64 { simulation::BASELINE_RESISTANCE_KOHM }
    pub fn drift_amplitude_kohm() -> f64 { simulation::DRIFT_AMPLITUDE_KOHM }
    pub fn drift_period_ms() -> f64 { simulation::DRIFT_PERIOD_MS }
    pub fn random_variation_kohm() -> f64 { simulation::RANDOM_VARIATION_KOHM }
    pub fn timer_enabled() -> bool { true }

    pub fn session_prefix() -> String { session::DEFAULT_SESSION_PREFIX.to_string() }
    pub fn study_name() -> String { session::DEFAULT_STUDY_NAME.to_string() }

    pub fn smoothing_window() -> usize { calibration::DEFAULT_SMOOTHING_WINDOW }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            address: None,
            name: defaults::device_name(),
            sampling_rate_hz: defaults::sampling_rate_hz(),
            enabled_sensors: defaults::enabled_sensors(),
            gsr_range: defaults::gsr_range(),
            device_kind: defaults::device_kind(),
            connection_timeout_ms: defaults::connection_timeout_ms(),
            inquiry_timeout_ms: defaults::inquiry_timeout_ms(),
            event_queue_capacity: defaults::event_queue_capacity(),
        }
    }
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            connect_delay_ms: defaults::connect_delay_ms(),
            baseline_resistance_kohm: defaults::baseline_resistance_kohm(),
            drift_amplitude_kohm: defaults::drift_amplitude_kohm(),
            drift_period_ms: defaults::drift_period_ms(),
            random_variation_kohm: defaults::random_variation_kohm(),
            timer_enabled: defaults::timer_enabled(),
            seed: None,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_prefix: defaults::session_prefix(),
            study_name: defaults::study_name(),
            participant_id: None,
            utc_offset_ms: 0,
        }
    }
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            smoothing_window: defaults::smoothing_window(),
        }
    }
}

/// Configuration utility functions
impl SystemConfig {
    /// Validate configuration consistency
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !device::SAMPLING_RATES_HZ.contains(&self.device.sampling_rate_hz) {
            errors.push(format!(
                "Sampling rate {} Hz is not one of {:?}",
                self.device.sampling_rate_hz,
                device::SAMPLING_RATES_HZ
            ));
        }

        if self.device.gsr_range > device::MAX_GSR_RANGE_SETTING {
            errors.push(format!(
                "GSR range {} must be in 0..={}",
                self.device.gsr_range,
                device::MAX_GSR_RANGE_SETTING
            ));
        }

        if let Some(address) = &self.device.address {
            if let Err(e) = crate::utils::validate_device_address(address) {
                errors.push(e.to_string());
            }
        }

        if self.device.connection_timeout_ms == 0 {
            errors.push("Connection timeout must be greater than 0".to_string());
        }
        if self.device.inquiry_timeout_ms == 0 {
            errors.push("Inquiry timeout must be greater than 0".to_string());
        }
        if self.device.event_queue_capacity == 0 {
            errors.push("Event queue capacity must be at least 1".to_string());
        }

        if self.simulator.baseline_resistance_kohm <= 0.0 {
            errors.push("Simulator baseline resistance must be positive".to_string());
        }
        if self.simulator.drift_period_ms <= 0.0 {
            errors.push("Simulator drift period must be positive".to_string());
        }

        if self.calibration.smoothing_window == 0 {
            errors.push("Smoothing window must be at least 1".to_string());
        }

        if self.session.session_prefix.trim().is_empty() {
            errors.push("Session prefix cannot be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Sensor configuration described by the `device` section
    pub fn device_configuration(&self) -> DeviceConfiguration {
        DeviceConfiguration {
            sampling_rate_hz: self.device.sampling_rate_hz,
            enabled_sensors: self.device.enabled_sensors,
            gsr_range: GsrRangeSetting::from_code(self.device.gsr_range)
                .unwrap_or(GsrRangeSetting::Auto),
            device_kind: self.device.device_kind,
        }
    }

    /// Get configuration summary
    pub fn get_summary(&self) -> ConfigSummary {
        ConfigSummary {
            device_name: self.device.name.clone(),
            sampling_rate_hz: self.device.sampling_rate_hz,
            gsr_range: self.device.gsr_range,
            device_kind: self.device.device_kind,
            simulated: self.device.address.is_none(),
            connection_timeout_ms: self.device.connection_timeout_ms,
        }
    }
}

/// Configuration summary for display/logging
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub device_name: String,
    pub sampling_rate_hz: f64,
    pub gsr_range: u8,
    pub device_kind: DeviceKind,
    pub simulated: bool,
    pub connection_timeout_ms: u64,
}
