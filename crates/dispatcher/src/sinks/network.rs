//! NetworkSink - newline-delimited CSV over a managed TCP connection

use contracts::{ConnectionConfig, ConnectionState, ContractError, Sample, SampleSink};
use tracing::{debug, instrument};

use crate::connection::{ConnectionManager, Connector, TcpConnector};

/// Sink that streams one CSV line per sample to a remote server
///
/// Connection handling is delegated to a [`ConnectionManager`]: a write while
/// not connected is rejected immediately and kicks off a connect, a failed
/// write drops the sample and starts a reconnect cycle.
pub struct NetworkSink<C: Connector = TcpConnector> {
    name: String,
    manager: ConnectionManager<C>,
    open: bool,
}

impl NetworkSink<TcpConnector> {
    pub fn new(name: impl Into<String>, config: ConnectionConfig) -> Self {
        Self::with_manager(name, ConnectionManager::new(config))
    }
}

impl<C: Connector> NetworkSink<C> {
    /// Sink over a custom transport factory
    pub fn with_connector(name: impl Into<String>, config: ConnectionConfig, connector: C) -> Self {
        Self::with_manager(name, ConnectionManager::with_connector(config, connector))
    }

    pub fn with_manager(name: impl Into<String>, manager: ConnectionManager<C>) -> Self {
        Self {
            name: name.into(),
            manager,
            open: false,
        }
    }

    /// Shared handle for observing connection state
    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.current_state()
    }
}

impl<C: Connector> SampleSink for NetworkSink<C> {
    fn name(&self) -> &str {
        &self.name
    }

    /// Start connecting without waiting for the connection
    ///
    /// Clears a previous `Failed` state, so reopening a sink retries from
    /// scratch.
    #[instrument(name = "network_sink_open", skip(self), fields(sink = %self.name, endpoint = %self.manager.endpoint()))]
    async fn open(&mut self) -> Result<(), ContractError> {
        self.manager.reset().await;
        self.manager.connect();
        self.open = true;
        Ok(())
    }

    async fn write(&mut self, sample: &Sample) -> Result<(), ContractError> {
        let line = sample.to_wire_line();
        self.manager.send(line.as_bytes(), &self.name).await
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        // every send already flushes
        Ok(())
    }

    #[instrument(name = "network_sink_close", skip(self), fields(sink = %self.name))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.manager.shutdown().await;
        debug!("NetworkSink closed");
        Ok(())
    }
}
