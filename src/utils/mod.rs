//! Common utility functions for the GSR-Core system
//!
//! - Time providers, the UTC-corrected sync clock and monotonic stamps
//! - Device address and session id validation

pub mod time;
pub mod validation;

// Re-export commonly used functions for convenience
pub use time::{
    current_timestamp_millis,
    format_utc_millis,
    generate_session_id,
    MockTimeProvider,
    MonotonicStamp,
    SyncClock,
    SystemTimeProvider,
    TimeProvider,
};

pub use validation::{
    validate_device_address,
    validate_range,
    validate_session_id,
    ValidationError,
    ValidationResult,
};
