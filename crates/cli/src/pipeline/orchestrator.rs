//! Pipeline orchestrator - the controller around the delivery subsystem.
//!
//! Owns start/stop, watches connection state and sink faults, and surfaces
//! the terminal failure once delivery cannot continue.

use std::future::{pending, Future};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{ConnectionState, ContractError, SinkMode, StreamerConfig};
use contracts::SampleSink as _;
use dispatcher::{
    AnySink, ConnectionManager, DispatcherBuilder, DispatcherConfig, MetricsSnapshot,
    StreamDispatcher,
};
use observability::{record_connection_state, record_queue_depth, record_sample_dropped, record_samples_written};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::producer::{ProducerSettings, SyntheticProducer};
use super::stats::{PipelineStats, StopReason};
use crate::error::CliError;

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated streamer configuration
    pub streamer: StreamerConfig,

    /// Stop after this many samples (None = unlimited)
    pub max_samples: Option<u64>,

    /// Stop after this long (None = until shutdown)
    pub duration: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until a limit, `shutdown`, or a terminal delivery failure
    ///
    /// Terminal failures are an exhausted retry ceiling and a sink write
    /// error that retrying cannot fix (e.g. a full disk).
    ///
    /// The dispatcher is always stopped (queue drained, sink closed) before
    /// this returns, including on error.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let streamer = &self.config.streamer;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
        }

        let sink = AnySink::from_config(streamer);
        let mode = sink.mode();
        let sink_name = sink.name().to_string();
        let connection = sink.connection().cloned();
        let mut events = connection.as_ref().map(ConnectionManager::subscribe);

        let policy = streamer.collection.drop_policy;
        // Only the first fault matters; later ones are already counted as failures
        let (fault_tx, mut fault_rx) = mpsc::channel::<ContractError>(1);
        let mut dispatcher: StreamDispatcher =
            DispatcherBuilder::new(DispatcherConfig::from(&streamer.collection))
                .overflow_hook(move |_| record_sample_dropped(policy))
                .sink_error_hook(move |e| {
                    let _ = fault_tx.try_send(e);
                })
                .build(sink);

        dispatcher
            .start()
            .await
            .context("Failed to start dispatcher")?;
        log_target(streamer);

        let settings = ProducerSettings {
            max_samples: self.config.max_samples,
            ..ProducerSettings::from(&streamer.producer)
        };
        let mut producer = match SyntheticProducer::spawn(settings, dispatcher.submitter()) {
            Ok(producer) => producer,
            Err(e) => {
                dispatcher.stop().await?;
                return Err(e).context("Failed to spawn sample producer");
            }
        };

        let mut stats = PipelineStats {
            mode,
            ..Default::default()
        };
        let mut last = MetricsSnapshot::default();
        let mut report_tick = tokio::time::interval(REPORT_INTERVAL);
        let deadline = sleep_or_forever(self.config.duration);
        tokio::pin!(deadline);
        tokio::pin!(shutdown);

        let mut terminal: Option<ContractError> = None;
        stats.stop_reason = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping...");
                    break StopReason::Interrupted;
                }
                _ = producer.finished() => {
                    info!(limit = ?self.config.max_samples, "Reached sample limit");
                    break StopReason::Completed;
                }
                _ = &mut deadline => {
                    info!(duration = ?self.config.duration, "Run duration elapsed");
                    break StopReason::TimedOut;
                }
                Some(state) = next_state(&mut events) => {
                    stats.metrics.observe_state(state);
                    if let Some(manager) = &connection {
                        record_connection_state(manager.endpoint(), state);
                    }
                    if state.is_terminal() {
                        terminal = connection.as_ref().and_then(ConnectionManager::terminal_error);
                        break StopReason::ConnectionFailed;
                    }
                }
                Some(fault) = fault_rx.recv() => {
                    warn!(sink = %sink_name, error = %fault, "Sink unusable, stopping");
                    terminal = Some(fault);
                    break StopReason::SinkFailed;
                }
                _ = report_tick.tick() => {
                    last = report_progress(&dispatcher, &sink_name, &mut stats, last);
                }
            }
        };

        info!(reason = ?stats.stop_reason, "Shutting down pipeline...");
        let producer_report = producer.join().await;
        dispatcher.stop().await.map_err(CliError::from)?;
        report_progress(&dispatcher, &sink_name, &mut stats, last);

        stats.producer = producer_report?;
        stats.metrics.submitted = stats.producer.submitted;
        stats.metrics.rejected = stats.producer.rejected;
        stats.metrics.jitter_ms = stats.producer.jitter_ms.clone();
        stats.dispatcher = dispatcher.metrics();
        stats.final_state = connection.as_ref().map(ConnectionManager::current_state);
        stats.duration = start_time.elapsed();

        info!(
            written = stats.dispatcher.write_count,
            dropped = stats.dispatcher.dropped_count,
            duration_secs = stats.duration.as_secs_f64(),
            "Pipeline shutdown complete"
        );

        if let Some(cause) = terminal {
            error!(error = %cause, reason = ?stats.stop_reason, "Delivery failed; restart to retry");
            stats.print_summary();
            return Err(CliError::Delivery(cause).into());
        }

        Ok(stats)
    }
}

fn log_target(streamer: &StreamerConfig) {
    match streamer.collection.mode {
        SinkMode::File => info!(
            path = %streamer.file.path.display(),
            kind = streamer.producer.kind.as_str(),
            rate_hz = streamer.producer.rate_hz,
            "Streaming to file"
        ),
        SinkMode::Network => info!(
            host = %streamer.network.host,
            port = streamer.network.port,
            max_retries = streamer.network.max_retries,
            kind = streamer.producer.kind.as_str(),
            rate_hz = streamer.producer.rate_hz,
            "Streaming to server"
        ),
    }
}

/// Export the counters that moved since `last`
fn report_progress(
    dispatcher: &StreamDispatcher,
    sink_name: &str,
    stats: &mut PipelineStats,
    last: MetricsSnapshot,
) -> MetricsSnapshot {
    let now = dispatcher.metrics();
    record_queue_depth(now.queue_len);
    record_samples_written(
        sink_name,
        now.write_count.saturating_sub(last.write_count),
        now.failure_count.saturating_sub(last.failure_count),
    );
    stats
        .metrics
        .observe_totals(now.write_count, now.failure_count, now.dropped_count, now.queue_len);

    if now.dropped_count > last.dropped_count {
        debug!(
            dropped_total = now.dropped_count,
            queue_len = now.queue_len,
            "Samples dropped since last report"
        );
    }
    now
}

/// Next connection transition; pending forever when there is no connection
async fn next_state(events: &mut Option<broadcast::Receiver<ConnectionState>>) -> Option<ConnectionState> {
    let Some(receiver) = events.as_mut() else {
        return pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(state) => return Some(state),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Connection events lagged");
            }
            Err(RecvError::Closed) => return pending().await,
        }
    }
}

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ChannelKind;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_run_completes_at_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("SensorData.txt");
        let mut streamer = StreamerConfig::default();
        streamer.file.path = path.clone();
        streamer.producer.kind = ChannelKind::AccelerationGyro;
        streamer.producer.rate_hz = 500.0;

        let pipeline = Pipeline::new(PipelineConfig {
            streamer,
            max_samples: Some(25),
            duration: None,
            metrics_port: None,
        });
        let stats = pipeline.run(pending()).await.unwrap();

        assert_eq!(stats.stop_reason, StopReason::Completed);
        assert_eq!(stats.producer.submitted, 25);
        assert_eq!(stats.dispatcher.write_count, 25);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 25);
        assert!(content.lines().all(|l| l.contains(", Gyro: X=")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_network_run_fails_after_retries() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut streamer = StreamerConfig::default();
        streamer.collection.mode = SinkMode::Network;
        streamer.network.host = "127.0.0.1".into();
        streamer.network.port = port;
        streamer.network.max_retries = 1;
        streamer.network.backoff_base_ms = 10;

        let pipeline = Pipeline::new(PipelineConfig {
            streamer,
            max_samples: None,
            duration: Some(Duration::from_secs(30)),
            metrics_port: None,
        });
        let err = pipeline.run(pending()).await.unwrap_err();
        let cli_err = err.downcast_ref::<CliError>().unwrap();
        assert!(matches!(
            cli_err,
            CliError::Delivery(ContractError::RetriesExhausted { attempts: 2, .. })
        ));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_run_stops_when_disk_is_full() {
        let mut streamer = StreamerConfig::default();
        streamer.file.path = "/dev/full".into();
        streamer.producer.rate_hz = 200.0;

        let pipeline = Pipeline::new(PipelineConfig {
            streamer,
            max_samples: None,
            duration: Some(Duration::from_secs(30)),
            metrics_port: None,
        });
        let started = Instant::now();
        let err = pipeline.run(pending()).await.unwrap_err();

        let cli_err = err.downcast_ref::<CliError>().unwrap();
        assert!(
            matches!(cli_err, CliError::Delivery(ContractError::SinkUnavailable { .. })),
            "got: {cli_err}"
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_signal_stops_run() {
        let dir = tempdir().unwrap();
        let mut streamer = StreamerConfig::default();
        streamer.file.path = dir.path().join("out.txt");

        let pipeline = Pipeline::new(PipelineConfig {
            streamer,
            max_samples: None,
            duration: None,
            metrics_port: None,
        });
        let stats = pipeline
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(stats.stop_reason, StopReason::Interrupted);
    }
}
