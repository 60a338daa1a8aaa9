//! SampleDispatcher - decouples the producer context from the active sink

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use contracts::{CollectionConfig, ContractError, DropPolicy, Sample, SampleSink};

use crate::error::DispatcherError;
use crate::handle::WorkerHandle;
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::queue::{PushOutcome, SampleQueue};

/// Callback fired for every sample lost to overflow
pub type OverflowHook = Arc<dyn Fn(&Sample) + Send + Sync>;

/// Callback fired from the worker for every non-transient write failure
///
/// Runs on the worker task; it must not block.
pub type SinkErrorHook = Arc<dyn Fn(ContractError) + Send + Sync>;

/// Dispatcher configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Maximum pending samples
    pub queue_capacity: usize,
    /// Overflow behaviour, fixed for the dispatcher's lifetime
    pub drop_policy: DropPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&CollectionConfig::default())
    }
}

impl From<&CollectionConfig> for DispatcherConfig {
    fn from(config: &CollectionConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            drop_policy: config.drop_policy,
        }
    }
}

/// What happened to a submitted sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued without loss
    Enqueued,
    /// Queued; the oldest pending sample was dropped
    DisplacedOldest,
    /// Queue full; this sample was dropped
    DroppedNewest,
}

impl SubmitOutcome {
    pub fn caused_drop(self) -> bool {
        !matches!(self, Self::Enqueued)
    }
}

/// State reachable from both the dispatcher and its submitters
struct Shared {
    queue: Arc<SampleQueue>,
    metrics: Arc<SinkMetrics>,
    policy: DropPolicy,
    overflow_hook: Option<OverflowHook>,
    sink_error_hook: Option<SinkErrorHook>,
}

impl Shared {
    fn submit(&self, sample: Sample) -> Result<SubmitOutcome, DispatcherError> {
        let outcome = match self.queue.push(sample, self.policy) {
            PushOutcome::Enqueued => SubmitOutcome::Enqueued,
            PushOutcome::DisplacedOldest(lost) => {
                self.record_overflow(&lost);
                SubmitOutcome::DisplacedOldest
            }
            PushOutcome::DroppedNewest(lost) => {
                self.record_overflow(&lost);
                SubmitOutcome::DroppedNewest
            }
            PushOutcome::Closed(_) => return Err(DispatcherError::NotRunning),
        };
        self.metrics.set_queue_len(self.queue.len());
        Ok(outcome)
    }

    fn record_overflow(&self, lost: &Sample) {
        let total = self.metrics.inc_dropped_count();
        // First drop, then every 100th, to keep a stalled sink from flooding the log
        if total == 1 || total % 100 == 0 {
            warn!(
                dropped_total = total,
                policy = ?self.policy,
                timestamp = lost.timestamp(),
                "Queue full, sample dropped"
            );
        }
        if let Some(hook) = &self.overflow_hook {
            hook(lost);
        }
    }
}

/// Cloneable submit-only handle for producer threads
///
/// `submit` never blocks on sink I/O; it takes only the queue lock.
#[derive(Clone)]
pub struct SampleSubmitter {
    shared: Arc<Shared>,
}

impl SampleSubmitter {
    /// Enqueue a sample for the worker
    ///
    /// # Errors
    /// `NotRunning` while the dispatcher is stopped.
    pub fn submit(&self, sample: Sample) -> Result<SubmitOutcome, DispatcherError> {
        self.shared.submit(sample)
    }

    pub fn dropped_count(&self) -> u64 {
        self.shared.metrics.dropped_count()
    }
}

impl fmt::Debug for SampleSubmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleSubmitter")
            .field("policy", &self.shared.policy)
            .finish()
    }
}

/// Builder for creating a SampleDispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    overflow_hook: Option<OverflowHook>,
    sink_error_hook: Option<SinkErrorHook>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            config,
            overflow_hook: None,
            sink_error_hook: None,
        }
    }

    /// Install the overflow callback
    pub fn overflow_hook(mut self, hook: impl Fn(&Sample) + Send + Sync + 'static) -> Self {
        self.overflow_hook = Some(Arc::new(hook));
        self
    }

    /// Install the callback for sink failures a retry will not fix
    ///
    /// Transient failures (`ContractError::is_transient`) are only counted.
    pub fn sink_error_hook(
        mut self,
        hook: impl Fn(ContractError) + Send + Sync + 'static,
    ) -> Self {
        self.sink_error_hook = Some(Arc::new(hook));
        self
    }

    /// Build a stopped dispatcher around `sink`
    pub fn build<S: SampleSink + 'static>(self, sink: S) -> SampleDispatcher<S> {
        let shared = Shared {
            queue: Arc::new(SampleQueue::new(self.config.queue_capacity)),
            metrics: Arc::new(SinkMetrics::new()),
            policy: self.config.drop_policy,
            overflow_hook: self.overflow_hook,
            sink_error_hook: self.sink_error_hook,
        };
        SampleDispatcher {
            shared: Arc::new(shared),
            sink: Some(sink),
            worker: None,
        }
    }
}

/// Accepts samples from any thread and delivers them, in order, to one sink
///
/// Lifecycle: `build` (stopped) -> `start` -> `submit`* -> `stop`. The sink
/// can only be replaced while stopped.
pub struct SampleDispatcher<S: SampleSink + 'static> {
    shared: Arc<Shared>,
    sink: Option<S>,
    worker: Option<WorkerHandle<S>>,
}

impl<S: SampleSink + 'static> SampleDispatcher<S> {
    /// Create a stopped dispatcher without an overflow hook
    pub fn new(sink: S, config: DispatcherConfig) -> Self {
        DispatcherBuilder::new(config).build(sink)
    }

    /// Open the sink and spawn the worker
    ///
    /// # Errors
    /// - `InvalidState` if already running
    /// - `SinkOpen` if the sink cannot acquire its resource; the dispatcher
    ///   stays stopped and keeps the sink
    #[instrument(name = "dispatcher_start", skip(self))]
    pub async fn start(&mut self) -> Result<(), DispatcherError> {
        if self.worker.is_some() {
            return Err(DispatcherError::invalid_state("start", "running"));
        }
        let mut sink = self.sink.take().ok_or(DispatcherError::NoSink)?;

        if let Err(source) = sink.open().await {
            let sink_name = sink.name().to_string();
            self.sink = Some(sink);
            return Err(DispatcherError::SinkOpen { sink_name, source });
        }

        self.shared.queue.reopen();
        let worker = WorkerHandle::spawn(
            sink,
            Arc::clone(&self.shared.queue),
            Arc::clone(&self.shared.metrics),
            self.shared.sink_error_hook.clone(),
        );
        info!(
            sink = worker.name(),
            capacity = self.shared.queue.capacity(),
            policy = ?self.shared.policy,
            "Dispatcher started"
        );
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop accepting samples, drain the queue, close the sink
    ///
    /// No sink write happens after this returns. Calling it on a stopped
    /// dispatcher is a no-op.
    ///
    /// # Errors
    /// - `WorkerPanicked` if the worker died; the sink is lost
    /// - `SinkClose` if the final flush or close failed; the dispatcher is
    ///   stopped and keeps the sink
    #[instrument(name = "dispatcher_stop", skip(self))]
    pub async fn stop(&mut self) -> Result<(), DispatcherError> {
        let Some(worker) = self.worker.take() else {
            debug!("Dispatcher already stopped");
            return Ok(());
        };

        self.shared.queue.close();
        let exit = worker.join().await?;
        let sink_name = exit.sink.name().to_string();
        self.sink = Some(exit.sink);

        let snapshot = self.metrics();
        info!(
            written = snapshot.write_count,
            failed = snapshot.failure_count,
            dropped = snapshot.dropped_count,
            "Dispatcher stopped"
        );
        match exit.shutdown_error {
            Some(source) => Err(DispatcherError::SinkClose { sink_name, source }),
            None => Ok(()),
        }
    }

    /// Swap the sink while stopped, returning the previous one
    ///
    /// # Errors
    /// `InvalidState` while running.
    pub fn replace_sink(&mut self, sink: S) -> Result<Option<S>, DispatcherError> {
        if self.worker.is_some() {
            return Err(DispatcherError::invalid_state("replace sink", "running"));
        }
        info!(sink = sink.name(), "Sink replaced");
        Ok(self.sink.replace(sink))
    }

    /// Enqueue a sample; see [`SampleSubmitter::submit`]
    pub fn submit(&self, sample: Sample) -> Result<SubmitOutcome, DispatcherError> {
        self.shared.submit(sample)
    }

    /// Handle for producer threads
    pub fn submitter(&self) -> SampleSubmitter {
        SampleSubmitter {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// The installed sink while stopped; `None` while the worker owns it
    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = self.shared.metrics.snapshot();
        snapshot.queue_len = self.shared.queue.len();
        snapshot
    }

    pub fn dropped_count(&self) -> u64 {
        self.shared.metrics.dropped_count()
    }

    pub fn drop_policy(&self) -> DropPolicy {
        self.shared.policy
    }
}

impl<S: SampleSink + 'static> Drop for SampleDispatcher<S> {
    fn drop(&mut self) {
        // Lets a still-running worker drain and close on its own
        self.shared.queue.close();
    }
}
