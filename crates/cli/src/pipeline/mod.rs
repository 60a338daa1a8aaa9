//! Pipeline orchestration module.

mod orchestrator;
mod producer;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;
