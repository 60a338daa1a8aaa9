//! 命令行 / 环境变量覆盖项
//!
//! 覆盖在校验之前应用，命令行参数可以修正文件中的非法值。

use std::path::PathBuf;

use contracts::{ChannelKind, SinkMode, StreamerConfig};
use tracing::info;

/// Values that replace fields of a loaded configuration
///
/// `None` leaves the loaded value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub mode: Option<SinkMode>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub file_path: Option<PathBuf>,
    pub kind: Option<ChannelKind>,
    pub rate_hz: Option<f64>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write every set value into `config`
    pub fn apply(&self, config: &mut StreamerConfig) {
        if let Some(mode) = self.mode {
            info!(mode = ?mode, "Overriding output mode");
            config.collection.mode = mode;
        }
        if let Some(host) = &self.host {
            info!(host = %host, "Overriding server host");
            config.network.host = host.clone();
        }
        if let Some(port) = self.port {
            info!(port, "Overriding server port");
            config.network.port = port;
        }
        if let Some(path) = &self.file_path {
            info!(path = %path.display(), "Overriding output file");
            config.file.path = path.clone();
        }
        if let Some(kind) = self.kind {
            info!(kind = kind.as_str(), "Overriding channel kind");
            config.producer.kind = kind;
        }
        if let Some(rate_hz) = self.rate_hz {
            info!(rate_hz, "Overriding sample rate");
            config.producer.rate_hz = rate_hz;
        }
    }
}
