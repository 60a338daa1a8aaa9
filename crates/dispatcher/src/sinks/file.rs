//! FileSink - appends labelled sample lines to a local file

use std::path::{Path, PathBuf};

use contracts::{ContractError, FileConfig, Sample, SampleSink};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSinkConfig {
    /// Output file; opened in append mode
    pub path: PathBuf,
    /// Decimal places per channel
    pub precision: usize,
}

impl From<&FileConfig> for FileSinkConfig {
    fn from(config: &FileConfig) -> Self {
        Self {
            path: config.path.clone(),
            precision: config.precision,
        }
    }
}

/// Sink that appends one human-readable line per sample
///
/// The file is acquired on `open` and released on the first `close`.
/// Every `write` reaches the file before it returns, so a failing disk is
/// reported on the sample that hit it.
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    writer: Option<File>,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    fn unavailable(&self, message: impl std::fmt::Display) -> ContractError {
        ContractError::sink_unavailable(&self.name, message.to_string())
    }
}

impl SampleSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_sink_open", skip(self), fields(sink = %self.name, path = %self.config.path.display()))]
    async fn open(&mut self) -> Result<(), ContractError> {
        if self.writer.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.unavailable(format!("create {}: {e}", parent.display())))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)
            .await
            .map_err(|e| self.unavailable(format!("open {}: {e}", self.config.path.display())))?;

        self.writer = Some(file);
        debug!("FileSink opened");
        Ok(())
    }

    async fn write(&mut self, sample: &Sample) -> Result<(), ContractError> {
        let line = sample.to_file_line(self.config.precision);
        let Some(writer) = self.writer.as_mut() else {
            return Err(self.unavailable("file not open"));
        };
        // Single write_all per line; the worker owns the sink so lines never interleave.
        // tokio's File defers the write to a blocking thread, flush waits for its result.
        let written = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            error!(sink = %self.name, error = %e, "Write failed");
            return Err(self.unavailable(e));
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        if let Err(e) = writer.flush().await {
            return Err(self.unavailable(e));
        }
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self), fields(sink = %self.name))]
    async fn close(&mut self) -> Result<(), ContractError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.shutdown().await.map_err(|e| self.unavailable(e))?;
        debug!("FileSink closed");
        Ok(())
    }
}
