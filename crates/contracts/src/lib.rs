//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only, never on each other's internals.
//!
//! ## Time Model
//! - `Sample::timestamp` is seconds (f64), monotonic or wall-clock as chosen by the producer
//! - Channel order inside a sample is significant, channel meaning is not

mod blueprint;
mod connection;
mod error;
mod sample;
mod sink;

pub use blueprint::*;
pub use connection::*;
pub use error::*;
pub use sample::*;
pub use sink::*;
