//! Transport factory used by the connection manager

use std::future::Future;
use std::io;

use tokio::io::AsyncWrite;
use tokio::net::TcpStream;

/// Creates a writable byte stream to an endpoint
///
/// Production uses [`TcpConnector`]; tests swap in a scripted connector to
/// drive the retry state machine without a network.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncWrite + Unpin + Send + 'static;

    /// Connect to `host:port`
    fn connect(&self, endpoint: &str) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP client connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(endpoint).await?;
        // One short line per sample; do not let Nagle batch them
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
