//! WorkerHandle - owns the sink while the dispatcher runs

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{ContractError, SampleSink};

use crate::dispatcher::SinkErrorHook;
use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;
use crate::queue::SampleQueue;

/// What the worker hands back when it exits
pub(crate) struct WorkerExit<S> {
    pub(crate) sink: S,
    /// First flush/close failure on shutdown
    pub(crate) shutdown_error: Option<ContractError>,
}

/// Handle to the running worker task
///
/// The worker hands the sink back when it exits, so `join` restores
/// ownership to the dispatcher.
pub(crate) struct WorkerHandle<S> {
    name: String,
    join: JoinHandle<WorkerExit<S>>,
}

impl<S: SampleSink + 'static> WorkerHandle<S> {
    /// Spawn the worker; the queue must already be open
    pub(crate) fn spawn(
        sink: S,
        queue: Arc<SampleQueue>,
        metrics: Arc<SinkMetrics>,
        on_error: Option<SinkErrorHook>,
    ) -> Self {
        let name = sink.name().to_string();
        let worker_name = name.clone();
        let join = tokio::spawn(async move {
            sink_worker(sink, queue, metrics, on_error, worker_name).await
        });
        Self { name, join }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the worker to drain, flush and close
    #[instrument(name = "worker_join", skip(self), fields(sink = %self.name))]
    pub(crate) async fn join(self) -> Result<WorkerExit<S>, DispatcherError> {
        match self.join.await {
            Ok(exit) => {
                debug!("Worker joined");
                Ok(exit)
            }
            Err(e) => {
                error!(error = ?e, "Worker task panicked");
                Err(DispatcherError::WorkerPanicked {
                    sink_name: self.name,
                })
            }
        }
    }
}

/// Worker loop: dequeue FIFO, write, drop on failure
///
/// Non-transient write failures are passed to `on_error`; the loop keeps
/// going either way.
#[instrument(name = "sample_worker_loop", skip(sink, queue, metrics, on_error), fields(sink = %name))]
async fn sink_worker<S: SampleSink>(
    mut sink: S,
    queue: Arc<SampleQueue>,
    metrics: Arc<SinkMetrics>,
    on_error: Option<SinkErrorHook>,
    name: String,
) -> WorkerExit<S> {
    debug!("Sample worker started");

    while let Some(sample) = queue.recv().await {
        metrics.set_queue_len(queue.len());

        match sink.write(&sample).await {
            Ok(()) => metrics.inc_write_count(),
            Err(e) => {
                // Sample is discarded; the sink stays usable for the next one
                metrics.inc_failure_count();
                if e.is_transient() {
                    debug!(timestamp = sample.timestamp(), error = %e, "Sample dropped");
                } else {
                    warn!(timestamp = sample.timestamp(), error = %e, "Write failed, sample dropped");
                    if let Some(hook) = &on_error {
                        hook(e);
                    }
                }
            }
        }

        if queue.is_empty() {
            if let Err(e) = sink.flush().await {
                warn!(error = %e, "Flush failed");
            }
        }
    }

    metrics.set_queue_len(0);
    let mut shutdown_error = None;
    if let Err(e) = sink.flush().await {
        error!(error = %e, "Flush failed on shutdown");
        shutdown_error = Some(e);
    }
    // Close even after a failed flush so the resource is released
    if let Err(e) = sink.close().await {
        error!(error = %e, "Close failed on shutdown");
        shutdown_error.get_or_insert(e);
    }

    debug!("Sample worker stopped");
    WorkerExit {
        sink,
        shutdown_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DropPolicy, Sample};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockSink {
        written: Vec<f64>,
        fail_every_other: bool,
        unavailable: bool,
        fail_close: bool,
        calls: u32,
        flushes: u32,
        closes: u32,
    }

    impl SampleSink for MockSink {
        fn name(&self) -> &str {
            "mock"
        }

        async fn open(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn write(&mut self, sample: &Sample) -> Result<(), ContractError> {
            self.calls += 1;
            if self.unavailable {
                return Err(ContractError::sink_unavailable("mock", "disk full"));
            }
            if self.fail_every_other && self.calls % 2 == 0 {
                return Err(ContractError::write_failed("mock", "injected"));
            }
            self.written.push(sample.timestamp());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            self.flushes += 1;
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            self.closes += 1;
            if self.fail_close {
                return Err(ContractError::sink_unavailable("mock", "close failed"));
            }
            Ok(())
        }
    }

    fn filled_queue(n: u32) -> Arc<SampleQueue> {
        let queue = Arc::new(SampleQueue::new(16));
        queue.reopen();
        for i in 0..n {
            queue.push(
                Sample::acceleration(f64::from(i), 0.0, 0.0, 0.0),
                DropPolicy::DropOldest,
            );
        }
        queue
    }

    #[tokio::test]
    async fn test_worker_drains_and_returns_sink() {
        let queue = filled_queue(5);
        let metrics = Arc::new(SinkMetrics::new());
        let handle =
            WorkerHandle::spawn(MockSink::default(), queue.clone(), metrics.clone(), None);
        assert_eq!(handle.name(), "mock");

        queue.close();
        let exit = handle.join().await.unwrap();
        assert!(exit.shutdown_error.is_none());
        let sink = exit.sink;

        assert_eq!(sink.written, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sink.closes, 1);
        assert!(sink.flushes >= 1);
        assert_eq!(metrics.write_count(), 5);
        assert_eq!(metrics.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_worker_survives_write_failures() {
        let queue = filled_queue(4);
        let metrics = Arc::new(SinkMetrics::new());
        let sink = MockSink {
            fail_every_other: true,
            ..MockSink::default()
        };
        let reported = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&reported);
        let hook: SinkErrorHook = Arc::new(move |e: ContractError| seen.lock().unwrap().push(e));
        let handle = WorkerHandle::spawn(sink, queue.clone(), metrics.clone(), Some(hook));

        queue.close();
        let sink = handle.join().await.unwrap().sink;

        assert_eq!(sink.written, vec![0.0, 2.0]);
        assert_eq!(metrics.write_count(), 2);
        assert_eq!(metrics.failure_count(), 2);
        // WriteFailed is transient; nothing reported
        assert!(reported.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_worker_reports_unavailable_sink() {
        let queue = filled_queue(3);
        let metrics = Arc::new(SinkMetrics::new());
        let sink = MockSink {
            unavailable: true,
            ..MockSink::default()
        };
        let reported = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&reported);
        let hook: SinkErrorHook = Arc::new(move |e: ContractError| seen.lock().unwrap().push(e));
        let handle = WorkerHandle::spawn(sink, queue.clone(), metrics.clone(), Some(hook));

        queue.close();
        let exit = handle.join().await.unwrap();

        assert_eq!(exit.sink.calls, 3);
        assert_eq!(metrics.write_count(), 0);
        assert_eq!(metrics.failure_count(), 3);
        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 3);
        assert!(reported
            .iter()
            .all(|e| matches!(e, ContractError::SinkUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_worker_returns_close_error() {
        let queue = filled_queue(1);
        let metrics = Arc::new(SinkMetrics::new());
        let sink = MockSink {
            fail_close: true,
            ..MockSink::default()
        };
        let handle = WorkerHandle::spawn(sink, queue.clone(), metrics.clone(), None);

        queue.close();
        let exit = handle.join().await.unwrap();

        assert_eq!(exit.sink.closes, 1);
        assert_eq!(metrics.write_count(), 1);
        assert!(matches!(
            exit.shutdown_error,
            Some(ContractError::SinkUnavailable { .. })
        ));
    }
}
