// src/config/device_config.rs
//! Peripheral sensor configuration and its 12-byte wire form

use serde::{Deserialize, Serialize};

use crate::calibration::GsrRange;
use crate::config::constants::device::*;
use crate::error::{GsrErrorBuilder, GsrResult};

/// Peripheral hardware generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Shimmer2,
    Shimmer2R,
    Shimmer3,
    ShimmerGq,
}

impl DeviceKind {
    pub fn code(self) -> u8 {
        match self {
            DeviceKind::Shimmer2 => DEVICE_SHIMMER2,
            DeviceKind::Shimmer2R => DEVICE_SHIMMER2R,
            DeviceKind::Shimmer3 => DEVICE_SHIMMER3,
            DeviceKind::ShimmerGq => DEVICE_SHIMMERGQ,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            DEVICE_SHIMMER2 => Some(DeviceKind::Shimmer2),
            DEVICE_SHIMMER2R => Some(DeviceKind::Shimmer2R),
            DEVICE_SHIMMER3 => Some(DeviceKind::Shimmer3),
            DEVICE_SHIMMERGQ => Some(DeviceKind::ShimmerGq),
            _ => None,
        }
    }
}

/// Configured gain: a fixed range or hardware auto-ranging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GsrRangeSetting {
    Fixed(GsrRange),
    Auto,
}

impl GsrRangeSetting {
    /// Wire value: 0-3 for fixed ranges, 4 for auto
    pub fn code(self) -> u8 {
        match self {
            GsrRangeSetting::Fixed(range) => range.index(),
            GsrRangeSetting::Auto => GSR_RANGE_AUTO,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        if code == GSR_RANGE_AUTO {
            Some(GsrRangeSetting::Auto)
        } else {
            GsrRange::from_index(code).map(GsrRangeSetting::Fixed)
        }
    }
}

/// Sensor configuration pushed to the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    pub sampling_rate_hz: f64,
    pub enabled_sensors: u16,
    pub gsr_range: GsrRangeSetting,
    pub device_kind: DeviceKind,
}

impl Default for DeviceConfiguration {
    /// 128 Hz, GSR only, auto range, Shimmer3
    fn default() -> Self {
        Self {
            sampling_rate_hz: DEFAULT_SAMPLING_RATE_HZ,
            enabled_sensors: SENSOR_GSR,
            gsr_range: GsrRangeSetting::Auto,
            device_kind: DeviceKind::Shimmer3,
        }
    }
}

impl DeviceConfiguration {
    pub fn rate_index(&self) -> Option<u8> {
        SAMPLING_RATES_HZ
            .iter()
            .position(|rate| *rate == self.sampling_rate_hz)
            .map(|i| i as u8)
    }

    /// Sampling rate is one of the table entries; the range setting and
    /// device kind are valid by construction.
    pub fn is_valid(&self) -> bool {
        self.rate_index().is_some()
    }

    pub fn has_sensor(&self, sensor_bit: u16) -> bool {
        self.enabled_sensors & sensor_bit != 0
    }

    /// Sample period in milliseconds
    pub fn sample_period_ms(&self) -> f64 {
        1000.0 / self.sampling_rate_hz
    }

    /// Encode into the 12-byte wire form. Rates outside the table encode
    /// as the 128 Hz index.
    pub fn to_bytes(&self) -> [u8; CONFIGURATION_BYTES] {
        let mut bytes = [0u8; CONFIGURATION_BYTES];
        bytes[0] = self.rate_index().unwrap_or(DEFAULT_RATE_INDEX);
        bytes[1..3].copy_from_slice(&self.enabled_sensors.to_le_bytes());
        bytes[3] = self.gsr_range.code();
        bytes[4] = self.device_kind.code();
        bytes
    }

    /// Decode the wire form. Anything other than a well-formed 12-byte
    /// buffer is an `InvalidConfiguration` error.
    pub fn from_bytes(bytes: &[u8]) -> GsrResult<Self> {
        let err = |reason: String| {
            GsrErrorBuilder::new("device_config", "from_bytes").invalid_configuration(reason)
        };

        if bytes.len() != CONFIGURATION_BYTES {
            return Err(err(format!(
                "expected {} bytes, got {}",
                CONFIGURATION_BYTES,
                bytes.len()
            )));
        }

        let sampling_rate_hz = *SAMPLING_RATES_HZ
            .get(bytes[0] as usize)
            .ok_or_else(|| err(format!("sampling rate index {} out of table", bytes[0])))?;
        let enabled_sensors = u16::from_le_bytes([bytes[1], bytes[2]]);
        let gsr_range = GsrRangeSetting::from_code(bytes[3])
            .ok_or_else(|| err(format!("gsr range {} out of 0..={}", bytes[3], MAX_GSR_RANGE_SETTING)))?;
        let device_kind = DeviceKind::from_code(bytes[4])
            .ok_or_else(|| err(format!("unknown device kind {}", bytes[4])))?;

        Ok(Self {
            sampling_rate_hz,
            enabled_sensors,
            gsr_range,
            device_kind,
        })
    }
}

impl std::fmt::Display for DeviceConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Hz, sensors=0x{:04x}, gsr_range={}, device={:?}",
            self.sampling_rate_hz,
            self.enabled_sensors,
            self.gsr_range.code(),
            self.device_kind
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    #[test]
    fn test_default_configuration() {
        let config = DeviceConfiguration::default();
        assert!(config.is_valid());
        assert!(config.has_sensor(SENSOR_GSR));
        assert!(!config.has_sensor(SENSOR_ACCEL));
        assert_eq!(config.to_bytes()[..5], [2, 0x10, 0x00, 4, 2]);
    }

    #[test]
    fn test_off_table_rate_encodes_default_index() {
        let config = DeviceConfiguration {
            sampling_rate_hz: 100.0,
            ..Default::default()
        };
        assert!(!config.is_valid());
        assert_eq!(config.to_bytes()[0], DEFAULT_RATE_INDEX);
    }

    #[test]
    fn test_malformed_buffers_rejected() {
        for bytes in [
            vec![],
            vec![2, 0x10, 0, 4],
            vec![0u8; 13],
            vec![6, 0x10, 0, 4, 2, 0, 0, 0, 0, 0, 0, 0],
            vec![2, 0x10, 0, 5, 2, 0, 0, 0, 0, 0, 0, 0],
            vec![2, 0x10, 0, 4, 9, 0, 0, 0, 0, 0, 0, 0],
        ] {
            let err = DeviceConfiguration::from_bytes(&bytes).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        }
    }

    fn any_configuration() -> impl Strategy<Value = DeviceConfiguration> {
        (0usize..6, any::<u16>(), 0u8..=4, 0u8..=3).prop_map(|(rate, sensors, range, kind)| {
            DeviceConfiguration {
                sampling_rate_hz: SAMPLING_RATES_HZ[rate],
                enabled_sensors: sensors,
                gsr_range: GsrRangeSetting::from_code(range).unwrap(),
                device_kind: DeviceKind::from_code(kind).unwrap(),
            }
        })
    }

    proptest! {
        #[test]
        fn prop_wire_round_trip(config in any_configuration()) {
            let decoded = DeviceConfiguration::from_bytes(&config.to_bytes()).unwrap();
            prop_assert_eq!(decoded, config);
        }
    }
}
