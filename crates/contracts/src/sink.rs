//! SampleSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for Sinks.

use crate::{ContractError, Sample};

/// Data output trait
///
/// All sink implementations must implement this trait. A sink is owned by
/// exactly one dispatcher worker while collection runs, so `&mut self`
/// serializes every call.
#[trait_variant::make(SampleSink: Send)]
pub trait LocalSampleSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Acquire the underlying stream or transport
    async fn open(&mut self) -> Result<(), ContractError>;

    /// Write one sample
    ///
    /// # Errors
    /// Returns write error (should include context). The sink must stay
    /// usable for the next sample.
    async fn write(&mut self, sample: &Sample) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    ///
    /// Safe to call repeatedly; the underlying resource is released once.
    async fn close(&mut self) -> Result<(), ContractError>;
}
