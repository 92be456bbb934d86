//! Validation utilities for GSR-Core
//!
//! Input checks shared by the session and the configuration layer:
//! device address syntax, session identifiers and numeric ranges.

use std::fmt;

use crate::config::constants::session::MAX_SESSION_ID_LENGTH;

/// Validation result type
pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Value out of valid range
    OutOfRange {
        field: String,
        value: String,
        min: String,
        max: String,
    },
    /// Invalid field format
    InvalidFormat {
        field: String,
        value: String,
        expected: String,
    },
    /// String length violation
    InvalidLength {
        field: String,
        actual: usize,
        max: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::OutOfRange { field, value, min, max } => {
                write!(f, "Field '{}' value '{}' is out of range [{}, {}]", field, value, min, max)
            }
            ValidationError::InvalidFormat { field, value, expected } => {
                write!(f, "Field '{}' has invalid format '{}', expected {}", field, value, expected)
            }
            ValidationError::InvalidLength { field, actual, max } => {
                write!(f, "Field '{}' length {} is invalid, expected <= {}", field, actual, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

const ADDRESS_OCTETS: usize = 6;

/// Validate a Bluetooth MAC address of the form `XX:XX:XX:XX:XX:XX`.
///
/// Hex digits may be upper or lower case.
pub fn validate_device_address(address: &str) -> ValidationResult<()> {
    let invalid = || ValidationError::InvalidFormat {
        field: "device.address".to_string(),
        value: address.to_string(),
        expected: "six colon-separated hex octets (XX:XX:XX:XX:XX:XX)".to_string(),
    };

    let octets: Vec<&str> = address.split(':').collect();
    if octets.len() != ADDRESS_OCTETS {
        return Err(invalid());
    }

    for octet in octets {
        if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
    }

    Ok(())
}

/// Session ids must be non-blank, bounded, and free of path separators
/// and control characters, since exporters use them in file names.
pub fn validate_session_id(session_id: &str) -> ValidationResult<()> {
    if session_id.trim().is_empty() {
        return Err(ValidationError::InvalidFormat {
            field: "session.id".to_string(),
            value: session_id.to_string(),
            expected: "non-empty identifier".to_string(),
        });
    }

    if session_id.len() > MAX_SESSION_ID_LENGTH {
        return Err(ValidationError::InvalidLength {
            field: "session.id".to_string(),
            actual: session_id.len(),
            max: MAX_SESSION_ID_LENGTH,
        });
    }

    if session_id.chars().any(|c| c == '/' || c == '\\' || c.is_control()) {
        return Err(ValidationError::InvalidFormat {
            field: "session.id".to_string(),
            value: session_id.to_string(),
            expected: "no path separators or control characters".to_string(),
        });
    }

    Ok(())
}

/// Validate numeric range with inclusive bounds
pub fn validate_range<T>(field: &str, value: T, min: T, max: T) -> ValidationResult<()>
where
    T: PartialOrd + fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        assert!(validate_device_address("00:06:66:AB:cd:EF").is_ok());
        assert!(validate_device_address("FF:FF:FF:FF:FF:FF").is_ok());
    }

    #[test]
    fn test_invalid_addresses() {
        for address in [
            "",
            "00:06:66:AB:CD",
            "00:06:66:AB:CD:EF:01",
            "00-06-66-AB-CD-EF",
            "0:06:66:AB:CD:EF",
            "00:06:66:AB:CD:EG",
            "not an address",
        ] {
            assert!(validate_device_address(address).is_err(), "accepted {address:?}");
        }
    }

    #[test]
    fn test_session_id_validation() {
        assert!(validate_session_id("GSR_20240101_120000").is_ok());
        assert!(validate_session_id("   ").is_err());
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id(&"x".repeat(MAX_SESSION_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("gsr_range", 4u8, 0, 4).is_ok());
        let err = validate_range("gsr_range", 5u8, 0, 4).unwrap_err();
        assert!(err.to_string().contains("gsr_range"));
    }
}
