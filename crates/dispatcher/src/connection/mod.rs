//! # Connection Manager
//!
//! Owns the TCP transport of a network sink and its retry state machine.
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!                                 |                  |
//!                               fail            report_failure()
//!                                 v                  v
//!            Failed <--n > max-- Backoff(n) --wait--> Connecting
//! ```
//!
//! Lock order: `transport` before `machine`. The machine lock is never held
//! across an await; the transport lock is held only around a write or while
//! installing a fresh stream.

mod connector;
pub mod mock;

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use contracts::{ConnectionConfig, ConnectionState, ContractError};

pub use connector::{Connector, TcpConnector};

const EVENT_CAPACITY: usize = 64;

/// `(state, attempt)` plus the bookkeeping that must change with it
#[derive(Debug, Default)]
struct Machine {
    state: ConnectionState,
    attempt: u32,
    /// Bumped by `reset`; a reconnection task from an older generation
    /// must not touch the state.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Inner<C: Connector> {
    config: ConnectionConfig,
    endpoint: String,
    connector: C,
    machine: Mutex<Machine>,
    transport: AsyncMutex<Option<C::Stream>>,
    events: broadcast::Sender<ConnectionState>,
}

impl<C: Connector> Inner<C> {
    fn lock_machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, machine: &mut Machine, next: ConnectionState) {
        let previous = machine.state;
        machine.state = next;
        debug!(endpoint = %self.endpoint, from = %previous, to = %next, "Connection state changed");
        // No subscribers is fine
        let _ = self.events.send(next);
    }

    /// Move to `next` unless the attempt sequence was reset meanwhile
    fn advance(&self, generation: u64, next: ConnectionState) -> bool {
        let mut machine = self.lock_machine();
        if machine.generation != generation {
            return false;
        }
        self.transition(&mut machine, next);
        true
    }
}

/// Retry state machine plus the transport it guards
///
/// Cheap to clone; clones share one state machine. Reconnection attempts run
/// on their own task, so a pending backoff never blocks the caller.
pub struct ConnectionManager<C: Connector = TcpConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConnectionManager<TcpConnector> {
    /// Manager connecting over plain TCP
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Manager using a custom transport factory
    pub fn with_connector(config: ConnectionConfig, connector: C) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                endpoint: config.endpoint(),
                config,
                connector,
                machine: Mutex::new(Machine::default()),
                transport: AsyncMutex::new(None),
                events,
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.lock_machine().state
    }

    /// Failed attempts in the current sequence
    pub fn attempt(&self) -> u32 {
        self.inner.lock_machine().attempt
    }

    /// Receive every state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.events.subscribe()
    }

    /// The terminal error once the retry ceiling was exceeded
    pub fn terminal_error(&self) -> Option<ContractError> {
        self.current_state()
            .is_terminal()
            .then(|| self.retries_exhausted())
    }

    fn retries_exhausted(&self) -> ContractError {
        ContractError::RetriesExhausted {
            endpoint: self.inner.endpoint.clone(),
            attempts: self.inner.config.max_retries.saturating_add(1),
        }
    }

    /// Begin connecting
    ///
    /// Only acts from `Disconnected`; every other state is a no-op, so
    /// concurrent callers start at most one attempt sequence. Leaving
    /// `Failed` requires [`reset`](Self::reset).
    pub fn connect(&self) {
        let mut machine = self.inner.lock_machine();
        if machine.state != ConnectionState::Disconnected {
            debug!(endpoint = %self.inner.endpoint, state = %machine.state, "connect() ignored");
            return;
        }

        let generation = machine.generation;
        self.inner.transition(&mut machine, ConnectionState::Connecting);
        info!(endpoint = %self.inner.endpoint, "Connecting");
        machine.task = Some(tokio::spawn(run_attempts(
            Arc::clone(&self.inner),
            generation,
            None,
        )));
    }

    /// Transport failed while connected: back off, then reconnect
    ///
    /// Ignored outside `Connected`, so a burst of failing writes triggers
    /// one reconnect cycle.
    pub fn report_failure(&self) {
        let mut machine = self.inner.lock_machine();
        if machine.state != ConnectionState::Connected {
            return;
        }

        machine.attempt = 1;
        self.inner.transition(&mut machine, ConnectionState::Backoff(1));
        let delay = self.inner.config.backoff_delay(1);
        warn!(endpoint = %self.inner.endpoint, delay_ms = delay.as_millis() as u64, "Transport failed, reconnecting");
        let generation = machine.generation;
        machine.task = Some(tokio::spawn(run_attempts(
            Arc::clone(&self.inner),
            generation,
            Some(delay),
        )));
    }

    /// Cancel any pending attempt or backoff, drop the transport, and
    /// return to `Disconnected` with `attempt = 0`
    #[instrument(name = "connection_reset", skip(self), fields(endpoint = %self.inner.endpoint))]
    pub async fn reset(&self) {
        {
            let mut machine = self.inner.lock_machine();
            machine.generation = machine.generation.wrapping_add(1);
            if let Some(task) = machine.task.take() {
                task.abort();
            }
            machine.attempt = 0;
            if machine.state != ConnectionState::Disconnected {
                self.inner.transition(&mut machine, ConnectionState::Disconnected);
            }
        }

        let stream = self.inner.transport.lock().await.take();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.shutdown().await {
                debug!(error = %e, "Transport shutdown failed");
            }
        }
    }

    /// Close path used by the sink; same as [`reset`](Self::reset)
    pub async fn shutdown(&self) {
        self.reset().await;
    }

    /// Write `bytes` and flush
    ///
    /// # Errors
    /// - `NotConnected` when no transport is up; a connect is triggered and
    ///   the caller is not blocked
    /// - `WriteFailed` when the transport rejects the write; the transport is
    ///   dropped and a reconnect cycle starts
    pub async fn send(&self, bytes: &[u8], sink_name: &str) -> Result<(), ContractError> {
        let mut transport = self.inner.transport.lock().await;
        let state = self.current_state();

        let stream = match transport.as_mut() {
            Some(stream) if state == ConnectionState::Connected => stream,
            _ => {
                drop(transport);
                self.connect();
                return Err(ContractError::NotConnected {
                    sink_name: sink_name.to_string(),
                    state,
                });
            }
        };

        let write_timeout = self.inner.config.write_timeout;
        let failure = match timeout(write_timeout, write_line(stream, bytes)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write timed out after {}ms", write_timeout.as_millis()),
        };

        transport.take();
        drop(transport);
        self.report_failure();
        Err(ContractError::write_failed(sink_name, failure))
    }
}

async fn write_line<W: AsyncWrite + Unpin>(stream: &mut W, bytes: &[u8]) -> io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Reconnection task body
///
/// With `initial_wait`, starts in `Backoff(1)` (after a transport failure);
/// otherwise starts in `Connecting`.
async fn run_attempts<C: Connector>(
    inner: Arc<Inner<C>>,
    generation: u64,
    initial_wait: Option<Duration>,
) {
    if let Some(wait) = initial_wait {
        // Stale stream from the failed connection
        inner.transport.lock().await.take();
        sleep(wait).await;
        if !inner.advance(generation, ConnectionState::Connecting) {
            return;
        }
    }

    loop {
        let connect_timeout = inner.config.connect_timeout;
        let result = match timeout(connect_timeout, inner.connector.connect(&inner.endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {}ms", connect_timeout.as_millis()),
            )),
        };

        let delay = match result {
            Ok(stream) => {
                let mut transport = inner.transport.lock().await;
                let mut machine = inner.lock_machine();
                if machine.generation != generation {
                    return;
                }
                *transport = Some(stream);
                machine.attempt = 0;
                machine.task = None;
                inner.transition(&mut machine, ConnectionState::Connected);
                info!(endpoint = %inner.endpoint, "Connected");
                return;
            }
            Err(e) => {
                let cause = ContractError::connect_failed(&inner.endpoint, e.to_string());
                let mut machine = inner.lock_machine();
                if machine.generation != generation {
                    return;
                }
                machine.attempt += 1;
                let attempt = machine.attempt;

                if attempt > inner.config.max_retries {
                    machine.task = None;
                    inner.transition(&mut machine, ConnectionState::Failed);
                    error!(
                        endpoint = %inner.endpoint,
                        attempts = attempt,
                        error = %cause,
                        "Retries exhausted, giving up until reset"
                    );
                    return;
                }

                inner.transition(&mut machine, ConnectionState::Backoff(attempt));
                let delay = inner.config.backoff_delay(attempt);
                warn!(
                    endpoint = %inner.endpoint,
                    attempt,
                    max_retries = inner.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %cause,
                    "Connect failed, backing off"
                );
                delay
            }
        };

        sleep(delay).await;
        if !inner.advance(generation, ConnectionState::Connecting) {
            return;
        }
    }
}
