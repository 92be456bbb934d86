//! GSR-Core: galvanic skin response acquisition and session recording
//!
//! This library reads a GSR peripheral (or a simulated one), calibrates raw
//! ADC counts into skin resistance and conductance, and assembles recording
//! sessions whose samples and sync marks stay aligned with other capture
//! modalities running in the host application. It provides:
//!
//! - Range-aware calibration, auto-ranging, smoothing and signal statistics
//! - A device link abstraction with an explicit connection state machine
//! - A simulator and an in-memory transport for running without hardware
//! - Thread-safe recording sessions with a push-only listener protocol
//! - Layered TOML/environment configuration
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use gsr_core::config::SystemConfig;
//! use gsr_core::session::RecordingSession;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = RecordingSession::new(SystemConfig::default());
//!
//!     // No address configured: a simulated device is bound
//!     session.initialize_device(None).await?;
//!     session.start_recording("")?;
//!
//!     tokio::time::sleep(std::time::Duration::from_millis(500)).await;
//!     session.trigger_sync_event("THERMAL_CAPTURE", BTreeMap::new())?;
//!
//!     let info = session.stop_recording()?;
//!     println!("{} samples, {} sync marks", info.sample_count, info.sync_marks.len());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod calibration;
pub mod cluster;
pub mod config;
pub mod error;
pub mod hal;
pub mod session;
pub mod utils;

// Re-export commonly used types for convenience
pub use calibration::{GsrRange, GsrStatistics};
pub use cluster::{CalibratedValue, Channel, Representation, SampleCluster};
pub use config::{ConfigLoader, DeviceConfiguration, SystemConfig};
pub use error::{ErrorKind, GsrError, GsrResult};
pub use hal::{DeviceEvent, DeviceLink, DeviceState, PeripheralDevice, SimulatedDevice};
pub use session::{
    GsrSample, RecordingListener, RecordingSession, SessionInfo, SessionPhase, SyncMark,
};

pub use utils::{
    time::{current_timestamp_millis, SyncClock, TimeProvider},
    validation::{ValidationError, ValidationResult},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "GSR acquisition and session recording library".to_string(),
        features: vec![
            "Range-aware GSR calibration".to_string(),
            "Device link state machine".to_string(),
            "Hardware-free simulation".to_string(),
            "Synchronized recording sessions".to_string(),
            "Layered configuration management".to_string(),
        ],
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Library name
    pub name: String,
    /// Version string
    pub version: String,
    /// Description
    pub description: String,
    /// List of features
    pub features: Vec<String>,
}
