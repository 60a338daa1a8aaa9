//! Error types for CLI operations.

use contracts::ContractError;
use dispatcher::DispatcherError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration invalid after CLI overrides
    #[error("Configuration invalid: {0}")]
    Config(#[source] ContractError),

    /// Delivery gave up (retry ceiling exceeded or sink unusable)
    #[error("Delivery failed: {0}")]
    Delivery(#[source] ContractError),

    /// Dispatcher lifecycle error
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    /// Producer thread ended abnormally
    #[error("Sample producer failed: {message}")]
    Producer { message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn producer(message: impl Into<String>) -> Self {
        Self::Producer {
            message: message.into(),
        }
    }
}
