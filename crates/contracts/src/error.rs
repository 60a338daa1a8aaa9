//! Layered error definitions
//!
//! Categorized by source: config / connection / sink / sample

use thiserror::Error;

use crate::ConnectionState;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Connection Errors =====
    /// Transport could not be established (transient, retried by the connection manager)
    #[error("connect to {endpoint} failed: {message}")]
    ConnectFailed { endpoint: String, message: String },

    /// Retry ceiling exceeded; no further automatic connects until reset
    #[error("connect to {endpoint} failed after {attempts} attempts")]
    RetriesExhausted { endpoint: String, attempts: u32 },

    // ===== Sink Errors =====
    /// Established connection stopped accepting writes
    #[error("sink '{sink_name}' write error: {message}")]
    WriteFailed { sink_name: String, message: String },

    /// Write rejected because the transport is not connected
    #[error("sink '{sink_name}' not connected (state: {state})")]
    NotConnected {
        sink_name: String,
        state: ConnectionState,
    },

    /// Storage stream could not be opened or written
    #[error("sink '{sink_name}' unavailable: {message}")]
    SinkUnavailable { sink_name: String, message: String },

    // ===== Sample Errors =====
    /// Sample does not match its channel layout
    #[error("invalid sample: {message}")]
    InvalidSample { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create connect failure error
    pub fn connect_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn write_failed(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink unavailable error
    pub fn sink_unavailable(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkUnavailable {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create invalid sample error
    pub fn invalid_sample(message: impl Into<String>) -> Self {
        Self::InvalidSample {
            message: message.into(),
        }
    }

    /// Whether the connection manager absorbs this error into its state machine
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. } | Self::WriteFailed { .. } | Self::NotConnected { .. }
        )
    }
}
