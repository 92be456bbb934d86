// src/error.rs
//! Unified error handling for GSR Core
//!
//! Every failure the acquisition stack can report maps onto one [`GsrError`]
//! variant. Hosts receive these through the session listener's `on_error`
//! (see [`crate::session::RecordingListener`]); calibration domain errors are
//! the one exception and are absorbed into per-sample validity instead.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use thiserror::Error;

/// Unified error type for the GSR acquisition stack
#[derive(Debug, Clone, Error)]
pub enum GsrError {
    /// Device address is syntactically malformed
    #[error("invalid device address '{address}': {reason}")]
    InvalidAddress {
        address: String,
        reason: String,
        context: ErrorContext,
    },

    /// Device did not answer in time
    #[error("{operation} timed out after {timeout_ms} ms")]
    ConnectionTimeout {
        operation: String,
        timeout_ms: u64,
        context: ErrorContext,
    },

    /// Streaming or configuration call issued out of state order
    #[error("device not connected: cannot {operation} while {state}")]
    NotConnected {
        operation: String,
        state: String,
        context: ErrorContext,
    },

    /// Configuration bytes or values that cannot be applied
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        reason: String,
        context: ErrorContext,
    },

    /// Non-positive calibration denominator
    #[error("calibration domain error: adc {adc_count} in range {range}")]
    CalibrationDomain {
        adc_count: i64,
        range: u8,
        context: ErrorContext,
    },

    /// Session operation issued in the wrong session state
    #[error("session state error: {reason}")]
    SessionState {
        reason: String,
        context: ErrorContext,
    },

    /// Failure reported by the underlying transport
    #[error("transport error during {operation}: {reason}")]
    Transport {
        operation: String,
        reason: String,
        context: ErrorContext,
    },

    /// Configuration file loading or parsing failure
    #[error("configuration file error: {0}")]
    Config(String),
}

/// Fieldless mirror of [`GsrError`] variants for matching by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidAddress,
    ConnectionTimeout,
    NotConnected,
    InvalidConfiguration,
    CalibrationDomain,
    SessionState,
    Transport,
    Config,
}

/// Where an error happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub component: String,
    pub operation: String,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            timestamp: SystemTime::now(),
            component: component.to_string(),
            operation: operation.to_string(),
        }
    }
}

/// Macro for creating error context
#[macro_export]
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        $crate::error::ErrorContext::new($component, $operation)
    };
}

impl GsrError {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GsrError::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            GsrError::ConnectionTimeout { .. } => ErrorKind::ConnectionTimeout,
            GsrError::NotConnected { .. } => ErrorKind::NotConnected,
            GsrError::InvalidConfiguration { .. } => ErrorKind::InvalidConfiguration,
            GsrError::CalibrationDomain { .. } => ErrorKind::CalibrationDomain,
            GsrError::SessionState { .. } => ErrorKind::SessionState,
            GsrError::Transport { .. } => ErrorKind::Transport,
            GsrError::Config(_) => ErrorKind::Config,
        }
    }

    /// Context attached to the error, if any
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            GsrError::InvalidAddress { context, .. }
            | GsrError::ConnectionTimeout { context, .. }
            | GsrError::NotConnected { context, .. }
            | GsrError::InvalidConfiguration { context, .. }
            | GsrError::CalibrationDomain { context, .. }
            | GsrError::SessionState { context, .. }
            | GsrError::Transport { context, .. } => Some(context),
            GsrError::Config(_) => None,
        }
    }

    /// Whether the host should hear about this error through `on_error`
    pub fn is_surfaced(&self) -> bool {
        self.kind() != ErrorKind::CalibrationDomain
    }
}

/// Result type alias for GSR operations
pub type GsrResult<T> = Result<T, GsrError>;

/// Error builder for convenient error construction
pub struct GsrErrorBuilder {
    component: String,
    operation: String,
}

impl GsrErrorBuilder {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
        }
    }

    fn context(&self) -> ErrorContext {
        ErrorContext::new(&self.component, &self.operation)
    }

    pub fn invalid_address(self, address: &str, reason: &str) -> GsrError {
        GsrError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
            context: self.context(),
        }
    }

    pub fn timeout(self, timeout_ms: u64) -> GsrError {
        GsrError::ConnectionTimeout {
            operation: self.operation.clone(),
            timeout_ms,
            context: self.context(),
        }
    }

    pub fn not_connected(self, state: impl std::fmt::Display) -> GsrError {
        GsrError::NotConnected {
            operation: self.operation.clone(),
            state: state.to_string(),
            context: self.context(),
        }
    }

    pub fn invalid_configuration(self, reason: impl Into<String>) -> GsrError {
        GsrError::InvalidConfiguration {
            reason: reason.into(),
            context: self.context(),
        }
    }

    pub fn calibration_domain(self, adc_count: i64, range: u8) -> GsrError {
        GsrError::CalibrationDomain {
            adc_count,
            range,
            context: self.context(),
        }
    }

    pub fn session_state(self, reason: impl Into<String>) -> GsrError {
        GsrError::SessionState {
            reason: reason.into(),
            context: self.context(),
        }
    }

    pub fn transport(self, reason: impl Into<String>) -> GsrError {
        GsrError::Transport {
            operation: self.operation.clone(),
            reason: reason.into(),
            context: self.context(),
        }
    }
}
