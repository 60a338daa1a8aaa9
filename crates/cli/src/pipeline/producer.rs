//! Synthetic sample producer
//!
//! Stands in for device sensors: a plain OS thread generates samples at a
//! fixed rate and hands them to the dispatcher through a `SampleSubmitter`.

use std::f64::consts::TAU;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use contracts::{ChannelKind, Sample};
use dispatcher::{SampleSubmitter, SubmitOutcome};
use observability::{record_producer_jitter_ms, record_sample_produced, RunningStats};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::CliError;

/// Producer settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProducerSettings {
    pub kind: ChannelKind,
    pub rate_hz: f64,
    /// Stop on its own after this many samples
    pub max_samples: Option<u64>,
}

impl From<&contracts::ProducerConfig> for ProducerSettings {
    fn from(config: &contracts::ProducerConfig) -> Self {
        Self {
            kind: config.kind,
            rate_hz: config.rate_hz,
            max_samples: None,
        }
    }
}

/// What the producer thread did
#[derive(Debug, Clone, Default)]
pub struct ProducerReport {
    /// Samples accepted by `submit` (including those that overflowed)
    pub submitted: u64,
    /// Accepted, but an older pending sample was dropped
    pub displaced_oldest: u64,
    /// Accepted call, but the sample itself was dropped
    pub dropped_newest: u64,
    /// Refused because the dispatcher was stopped
    pub rejected: u64,
    /// Lateness against the schedule (ms)
    pub jitter_ms: RunningStats,
    pub elapsed: Duration,
}

/// Deterministic motion waveform at time `t` (seconds)
pub fn synthesize(kind: ChannelKind, t: f64) -> Sample {
    let ax = 0.5 * (TAU * 1.0 * t).sin();
    let ay = 0.3 * (TAU * 0.5 * t).cos();
    let az = 9.81 + 0.1 * (TAU * 2.0 * t).sin();

    match kind {
        ChannelKind::Acceleration => Sample::acceleration(t, ax, ay, az),
        ChannelKind::AccelerationGyro => {
            let gyro = [
                0.2 * (TAU * 0.25 * t).sin(),
                0.1 * (TAU * 0.25 * t).cos(),
                0.05 * (TAU * 0.1 * t).sin(),
            ];
            Sample::acceleration_gyro(t, [ax, ay, az], gyro)
        }
        ChannelKind::Quaternion => {
            // yaw oscillation about z
            let half = 0.25 * (TAU * 0.2 * t).sin();
            Sample::quaternion(t, half.cos(), 0.0, 0.0, half.sin())
        }
    }
}

/// Handle to the running producer thread
pub struct SyntheticProducer {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<ProducerReport>>,
    done: Option<oneshot::Receiver<()>>,
}

impl SyntheticProducer {
    /// Start producing on a dedicated thread
    pub fn spawn(settings: ProducerSettings, submitter: SampleSubmitter) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = oneshot::channel();

        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("sample-producer".to_string())
            .spawn(move || {
                let report = produce(settings, &submitter, &flag);
                // receiver may already be gone
                let _ = done_tx.send(());
                report
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
            done: Some(done_rx),
        })
    }

    /// Resolves once the thread has finished on its own (sample limit)
    ///
    /// Never resolves twice; pending forever after the first completion.
    pub async fn finished(&mut self) {
        match self.done.as_mut() {
            Some(done) => {
                let _ = done.await;
                self.done = None;
            }
            None => std::future::pending().await,
        }
    }

    /// Ask the thread to stop after its current sample
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the thread's report
    pub async fn join(mut self) -> Result<ProducerReport, CliError> {
        self.stop();
        let Some(handle) = self.handle.take() else {
            return Err(CliError::producer("producer already joined"));
        };
        tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| CliError::producer(e.to_string()))?
            .map_err(|_| CliError::producer("producer thread panicked"))
    }
}

impl Drop for SyntheticProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn produce(settings: ProducerSettings, submitter: &SampleSubmitter, running: &AtomicBool) -> ProducerReport {
    let interval = Duration::from_secs_f64(1.0 / settings.rate_hz);
    let kind_label = settings.kind.as_str();
    let start = Instant::now();
    let mut report = ProducerReport::default();
    let mut produced: u64 = 0;

    debug!(
        kind = kind_label,
        rate_hz = settings.rate_hz,
        max_samples = ?settings.max_samples,
        "Sample producer started"
    );

    while running.load(Ordering::Relaxed) {
        if settings.max_samples.is_some_and(|max| produced >= max) {
            break;
        }

        let scheduled = start + interval.mul_f64(produced as f64);
        let now = Instant::now();
        if scheduled > now {
            thread::sleep(scheduled - now);
        }
        let lateness_ms = Instant::now().saturating_duration_since(scheduled).as_secs_f64() * 1000.0;
        report.jitter_ms.push(lateness_ms);
        record_producer_jitter_ms(lateness_ms);

        let sample = synthesize(settings.kind, start.elapsed().as_secs_f64());
        produced += 1;
        record_sample_produced(kind_label);

        match submitter.submit(sample) {
            Ok(outcome) => {
                report.submitted += 1;
                match outcome {
                    SubmitOutcome::Enqueued => {}
                    SubmitOutcome::DisplacedOldest => report.displaced_oldest += 1,
                    SubmitOutcome::DroppedNewest => report.dropped_newest += 1,
                }
            }
            Err(e) => {
                report.rejected += 1;
                trace!(error = %e, "Sample rejected");
            }
        }
    }

    report.elapsed = start.elapsed();
    debug!(
        produced,
        submitted = report.submitted,
        rejected = report.rejected,
        "Sample producer stopped"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatcher::{DispatcherConfig, FileSink, FileSinkConfig, SampleDispatcher};
    use tempfile::tempdir;

    #[test]
    fn test_synthesize_matches_kind() {
        for kind in [
            ChannelKind::Acceleration,
            ChannelKind::AccelerationGyro,
            ChannelKind::Quaternion,
        ] {
            let sample = synthesize(kind, 0.37);
            assert_eq!(sample.kind(), kind);
            assert_eq!(sample.values().len(), kind.channel_count());
            assert_eq!(sample.timestamp(), 0.37);
        }
    }

    #[test]
    fn test_quaternion_is_normalized() {
        for step in 0..50 {
            let sample = synthesize(ChannelKind::Quaternion, f64::from(step) * 0.13);
            let norm: f64 = sample.values().iter().map(|v| v * v).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_producer_stops_at_sample_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let sink = FileSink::new(
            "file",
            FileSinkConfig {
                path: path.clone(),
                precision: 3,
            },
        );
        let mut dispatcher = SampleDispatcher::new(sink, DispatcherConfig::default());
        dispatcher.start().await.unwrap();

        let settings = ProducerSettings {
            kind: ChannelKind::Acceleration,
            rate_hz: 1000.0,
            max_samples: Some(20),
        };
        let mut producer = SyntheticProducer::spawn(settings, dispatcher.submitter()).unwrap();
        producer.finished().await;
        let report = producer.join().await.unwrap();
        dispatcher.stop().await.unwrap();

        assert_eq!(report.submitted, 20);
        assert_eq!(report.rejected, 0);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 20);
        assert!(content.lines().all(|line| line.starts_with("Acc: X=")));
    }
}
