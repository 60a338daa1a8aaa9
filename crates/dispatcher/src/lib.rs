//! # Dispatcher
//!
//! 样本分发模块。
//!
//! 负责：
//! - 接收生产者提交的 `Sample`（任意线程，不阻塞）
//! - 有界队列 + 溢出策略（drop-oldest / drop-newest）
//! - 单个 worker 按 FIFO 顺序写入当前 sink
//! - 网络 sink 的连接状态机与指数退避重连

pub mod connection;
pub mod dispatcher;
pub mod error;
mod handle;
pub mod metrics;
pub mod queue;
pub mod sinks;

pub use connection::{ConnectionManager, Connector, TcpConnector};
pub use contracts::{Sample, SampleSink};
pub use dispatcher::{
    DispatcherBuilder, DispatcherConfig, OverflowHook, SampleDispatcher, SampleSubmitter,
    SinkErrorHook, SubmitOutcome,
};
pub use error::DispatcherError;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use queue::{PushOutcome, SampleQueue};
pub use sinks::{AnySink, FileSink, FileSinkConfig, NetworkSink};

/// Dispatcher over the configuration-selected sink
pub type StreamDispatcher = SampleDispatcher<AnySink>;
