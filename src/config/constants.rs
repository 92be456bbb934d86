// src/config/constants.rs
//! System-wide configuration constants

/// Calibration constants for the four hardware gain ranges
pub mod calibration {
    /// Multiplier per range: R = multiplier / (adc - offset)
    pub const RANGE_MULTIPLIERS: [f64; 4] = [6.8129, 27.2518, 108.2072, 351.8677];
    /// ADC offset per range
    pub const RANGE_OFFSETS: [f64; 4] = [2294.5, 2617.0, 2808.8, 3012.3];
    /// Upper resistance bound of each range in kOhm
    pub const RANGE_UPPER_KOHM: [f64; 4] = [56.0, 220.0, 680.0, 4700.0];
    /// Lower resistance bound of each range in kOhm
    pub const RANGE_LOWER_KOHM: [f64; 4] = [10.0, 56.0, 220.0, 680.0];

    pub const ADC_MAX: u16 = 4095;
    pub const ADC_MIN: u16 = 0;
    /// Multiplicative jitter applied to simulated ADC counts (+/-5%)
    pub const SIMULATION_JITTER: f64 = 0.05;

    /// kOhm <-> uS conversion factor
    pub const CONDUCTANCE_FACTOR: f64 = 1000.0;

    pub const MIN_VALID_RESISTANCE_KOHM: f64 = 1.0;
    pub const MAX_VALID_RESISTANCE_KOHM: f64 = 10000.0;
    pub const MIN_VALID_CONDUCTANCE_US: f64 = 0.1;
    pub const MAX_VALID_CONDUCTANCE_US: f64 = 1000.0;
    /// Relative tolerance for the resistance/conductance cross-check
    pub const CONSISTENCY_TOLERANCE: f64 = 0.1;

    pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;
    pub const TONIC_SMOOTHING_WINDOW: usize = 10;
    pub const PHASIC_STDDEV_FACTOR: f64 = 2.0;

    /// Signal quality bounds used by the statistics
    pub const MIN_VALID_MEAN_US: f64 = 1.0;
    pub const MAX_VALID_MEAN_US: f64 = 100.0;
    pub const MAX_STDDEV_RATIO: f64 = 0.5;
    pub const MAX_RANGE_RATIO: f64 = 2.0;
}

/// Peripheral constants
pub mod device {
    /// Supported sampling rates in Hz, indexed by wire byte 0
    pub const SAMPLING_RATES_HZ: [f64; 6] = [32.768, 65.536, 128.0, 256.0, 512.0, 1024.0];
    /// Index of 128 Hz in the rate table
    pub const DEFAULT_RATE_INDEX: u8 = 2;
    pub const DEFAULT_SAMPLING_RATE_HZ: f64 = 128.0;

    pub const CONFIGURATION_BYTES: usize = 12;

    pub const SENSOR_BATTERY: u16 = 0x01;
    pub const SENSOR_GSR: u16 = 0x10;
    pub const SENSOR_MAG: u16 = 0x20;
    pub const SENSOR_GYRO: u16 = 0x40;
    pub const SENSOR_ACCEL: u16 = 0x80;

    /// Range setting value meaning "auto-range"
    pub const GSR_RANGE_AUTO: u8 = 4;
    pub const MAX_GSR_RANGE_SETTING: u8 = 4;

    pub const DEVICE_SHIMMER2: u8 = 0;
    pub const DEVICE_SHIMMER2R: u8 = 1;
    pub const DEVICE_SHIMMER3: u8 = 2;
    pub const DEVICE_SHIMMERGQ: u8 = 3;

    pub const DEFAULT_DEVICE_NAME: &str = "Shimmer3_GSR";
    pub const SIMULATED_DEVICE_ADDRESS: &str = "00:06:66:00:00:00";

    pub const DEFAULT_FIRMWARE_VERSION: &str = "1.0.0";
    pub const DEFAULT_HARDWARE_VERSION: &str = "3.0";
    pub const DEFAULT_BATTERY_LEVEL: u8 = 100;

    pub const STATUS_CONNECTED: &str = "CONNECTED";
    pub const STATUS_DISCONNECTED: &str = "DISCONNECTED";
}

/// Hardware abstraction layer timing constants
pub mod hal {
    pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_INQUIRY_TIMEOUT_MS: u64 = 2_000;
    pub const DEFAULT_SIMULATED_CONNECT_DELAY_MS: u64 = 50;
    /// Samples a device may queue before further ticks are dropped
    pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 4096;
}

/// Simulated skin model constants
pub mod simulation {
    pub const BASELINE_RESISTANCE_KOHM: f64 = 65.0;
    pub const DRIFT_AMPLITUDE_KOHM: f64 = 15.0;
    pub const DRIFT_PERIOD_MS: f64 = 4000.0;
    pub const RANDOM_VARIATION_KOHM: f64 = 5.0;

    pub const BASELINE_CONDUCTANCE_US: f64 = 15.0;
    pub const CONDUCTANCE_DRIFT_US: f64 = 3.0;
    pub const CONDUCTANCE_PERIOD_MS: f64 = 5000.0;
    pub const CONDUCTANCE_RANDOM_US: f64 = 2.0;

    pub const RAW_FALLBACK_ADC: u16 = 2048;
}

/// Session constants
pub mod session {
    pub const DEFAULT_SESSION_PREFIX: &str = "GSR";
    pub const DEFAULT_STUDY_NAME: &str = "Shimmer3_GSR_Study";
    pub const SESSION_ID_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";
    pub const MAX_SESSION_ID_LENGTH: usize = 128;
}

/// File system paths
pub mod paths {
    pub const SYSTEM_CONFIG_PATH: &str = "/etc/gsr-core/config.toml";
    pub const USER_CONFIG_DIR: &str = ".config/gsr-core";
    pub const DEFAULT_CONFIG_FILE: &str = "config/default.toml";
    pub const LOCAL_CONFIG_FILE: &str = "gsr-core.toml";
    pub const ENV_PREFIX: &str = "GSR_";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_tables_consistent() {
        for i in 0..4 {
            assert!(calibration::RANGE_LOWER_KOHM[i] < calibration::RANGE_UPPER_KOHM[i]);
            assert!(calibration::RANGE_MULTIPLIERS[i] > 0.0);
        }
        for i in 1..4 {
            assert_eq!(calibration::RANGE_LOWER_KOHM[i], calibration::RANGE_UPPER_KOHM[i - 1]);
        }
    }

    #[test]
    fn test_default_rate_index() {
        assert_eq!(
            device::SAMPLING_RATES_HZ[device::DEFAULT_RATE_INDEX as usize],
            device::DEFAULT_SAMPLING_RATE_HZ
        );
    }
}
