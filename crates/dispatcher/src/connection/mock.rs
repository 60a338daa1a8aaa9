//! Scripted connector for exercising reconnection without a network
//!
//! Each connect attempt consumes the next scripted step; once the script is
//! exhausted the fallback step repeats. Accepted connections are backed by an
//! in-memory duplex pipe whose server half can be taken to read what the
//! client wrote, or dropped to make the next write fail.

use std::collections::VecDeque;
use std::future::pending;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{duplex, DuplexStream};
use tokio::time::Instant;

use super::connector::Connector;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Outcome of one scripted connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    /// Succeed with a fresh duplex pipe
    Accept,
    /// Fail immediately with `ConnectionRefused`
    Refuse,
    /// Never complete (until cancelled or timed out)
    Hang,
}

#[derive(Debug)]
struct Script {
    steps: VecDeque<ConnectStep>,
    fallback: ConnectStep,
    attempts: Vec<Instant>,
    peers: VecDeque<DuplexStream>,
}

/// Connector driven by a script of [`ConnectStep`]s
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    /// Connector that answers every attempt with `fallback`
    pub fn new(fallback: ConnectStep) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                steps: VecDeque::new(),
                fallback,
                attempts: Vec::new(),
                peers: VecDeque::new(),
            })),
        }
    }

    /// Queue steps to be played before the fallback
    pub fn then(self, steps: impl IntoIterator<Item = ConnectStep>) -> Self {
        self.lock().steps.extend(steps);
        self
    }

    /// Change the step used once the script runs out
    pub fn set_fallback(&self, step: ConnectStep) {
        self.lock().fallback = step;
    }

    /// Number of connect attempts so far
    pub fn attempts(&self) -> usize {
        self.lock().attempts.len()
    }

    /// Start time of every attempt
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.lock().attempts.clone()
    }

    /// Server half of the oldest accepted connection not yet taken
    pub fn take_peer(&self) -> Option<DuplexStream> {
        self.lock().peers.pop_front()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_step(&self) -> ConnectStep {
        let mut script = self.lock();
        script.attempts.push(Instant::now());
        let fallback = script.fallback;
        script.steps.pop_front().unwrap_or(fallback)
    }
}

impl Connector for ScriptedConnector {
    type Stream = DuplexStream;

    async fn connect(&self, _endpoint: &str) -> io::Result<DuplexStream> {
        match self.next_step() {
            ConnectStep::Accept => {
                let (client, server) = duplex(PIPE_CAPACITY);
                self.lock().peers.push_back(server);
                Ok(client)
            }
            ConnectStep::Refuse => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "scripted refusal",
            )),
            ConnectStep::Hang => pending().await,
        }
    }
}
