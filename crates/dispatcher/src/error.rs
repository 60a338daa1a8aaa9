//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Lifecycle misuse, e.g. switching sinks while running
    #[error("invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Sample submitted while the dispatcher is stopped
    #[error("dispatcher is not running, sample rejected")]
    NotRunning,

    /// Sink failed to open on start
    #[error("failed to open sink '{sink_name}': {source}")]
    SinkOpen {
        sink_name: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Final flush or close failed; buffered samples may be lost
    #[error("failed to close sink '{sink_name}': {source}")]
    SinkClose {
        sink_name: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Worker task panicked; its sink was lost
    #[error("worker for sink '{sink_name}' panicked")]
    WorkerPanicked { sink_name: String },

    /// No sink installed (lost after a worker panic)
    #[error("no sink installed")]
    NoSink,

    /// Sink error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        Self::InvalidState { operation, state }
    }
}
