//! Bounded FIFO between the producer context and the dispatcher worker.
//!
//! Producers only push, the single worker only pops. The ring buffer and the
//! closed flag share one lock so a push can never land after the worker has
//! observed "closed and empty".

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{DropPolicy, Sample};
use ringbuf::{traits::*, HeapRb};
use tokio::sync::Notify;

/// Result of a push
#[derive(Debug, PartialEq)]
pub enum PushOutcome {
    /// Stored without loss
    Enqueued,
    /// Stored; the oldest pending sample was evicted to make room
    DisplacedOldest(Sample),
    /// Queue full; the pushed sample was discarded
    DroppedNewest(Sample),
    /// Queue closed; the pushed sample was not stored
    Closed(Sample),
}

struct QueueState {
    ring: HeapRb<Sample>,
    closed: bool,
}

/// Bounded, order-preserving sample queue
pub struct SampleQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    capacity: usize,
}

impl fmt::Debug for SampleQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                ring: HeapRb::new(capacity),
                closed: true,
            }),
            ready: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a sample, applying `policy` when full
    pub fn push(&self, sample: Sample, policy: DropPolicy) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed(sample);
            }
            if !state.ring.is_full() {
                match state.ring.try_push(sample) {
                    Ok(()) => PushOutcome::Enqueued,
                    Err(rejected) => PushOutcome::DroppedNewest(rejected),
                }
            } else {
                match policy {
                    DropPolicy::DropOldest => match state.ring.push_overwrite(sample) {
                        Some(evicted) => PushOutcome::DisplacedOldest(evicted),
                        None => PushOutcome::Enqueued,
                    },
                    DropPolicy::DropNewest => PushOutcome::DroppedNewest(sample),
                }
            }
        };

        if !matches!(outcome, PushOutcome::DroppedNewest(_)) {
            self.ready.notify_one();
        }
        outcome
    }

    /// Pop the oldest pending sample without waiting
    pub fn pop(&self) -> Option<Sample> {
        self.lock().ring.try_pop()
    }

    /// Wait for the next sample
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn recv(&self) -> Option<Sample> {
        loop {
            {
                let mut state = self.lock();
                if let Some(sample) = state.ring.try_pop() {
                    return Some(sample);
                }
                if state.closed {
                    return None;
                }
            }
            self.ready.notified().await;
        }
    }

    /// Stop accepting samples; pending samples stay available to `recv`
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }

    /// Accept samples again
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
