//! Sink implementations
//!
//! Contains FileSink, NetworkSink, and the AnySink selector.

mod file;
mod network;

use contracts::{ContractError, Sample, SampleSink, SinkMode, StreamerConfig};

use crate::connection::ConnectionManager;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::network::NetworkSink;

/// Name used for the file sink built from config
pub const FILE_SINK_NAME: &str = "file";
/// Name used for the network sink built from config
pub const NETWORK_SINK_NAME: &str = "network";

/// The active output, chosen by configuration
pub enum AnySink {
    File(FileSink),
    Network(NetworkSink),
}

impl AnySink {
    /// Build the sink selected by `collection.mode`
    pub fn from_config(config: &StreamerConfig) -> Self {
        match config.collection.mode {
            SinkMode::File => Self::File(FileSink::new(FILE_SINK_NAME, (&config.file).into())),
            SinkMode::Network => Self::Network(NetworkSink::new(
                NETWORK_SINK_NAME,
                config.network.to_connection_config(),
            )),
        }
    }

    pub fn mode(&self) -> SinkMode {
        match self {
            Self::File(_) => SinkMode::File,
            Self::Network(_) => SinkMode::Network,
        }
    }

    /// Connection manager of a network sink
    pub fn connection(&self) -> Option<&ConnectionManager> {
        match self {
            Self::File(_) => None,
            Self::Network(sink) => Some(sink.manager()),
        }
    }
}

impl From<FileSink> for AnySink {
    fn from(sink: FileSink) -> Self {
        Self::File(sink)
    }
}

impl From<NetworkSink> for AnySink {
    fn from(sink: NetworkSink) -> Self {
        Self::Network(sink)
    }
}

impl SampleSink for AnySink {
    fn name(&self) -> &str {
        match self {
            Self::File(sink) => sink.name(),
            Self::Network(sink) => sink.name(),
        }
    }

    async fn open(&mut self) -> Result<(), ContractError> {
        match self {
            Self::File(sink) => sink.open().await,
            Self::Network(sink) => sink.open().await,
        }
    }

    async fn write(&mut self, sample: &Sample) -> Result<(), ContractError> {
        match self {
            Self::File(sink) => sink.write(sample).await,
            Self::Network(sink) => sink.write(sample).await,
        }
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        match self {
            Self::File(sink) => sink.flush().await,
            Self::Network(sink) => sink.flush().await,
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        match self {
            Self::File(sink) => sink.close().await,
            Self::Network(sink) => sink.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_selects_mode() {
        let mut config = StreamerConfig::default();
        let sink = AnySink::from_config(&config);
        assert_eq!(sink.mode(), SinkMode::File);
        assert_eq!(sink.name(), FILE_SINK_NAME);
        assert!(sink.connection().is_none());

        config.collection.mode = SinkMode::Network;
        config.network.host = "10.0.0.2".into();
        config.network.port = 6000;
        let sink = AnySink::from_config(&config);
        assert_eq!(sink.mode(), SinkMode::Network);
        assert_eq!(sink.connection().map(|c| c.endpoint()), Some("10.0.0.2:6000"));
    }
}
