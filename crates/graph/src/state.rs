//! Connection state machine shared by every store implementation.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Ready
//!      ^                        |                |  ^
//!      |                      fail          write|  |write
//!      |                        v           fails|  |succeeds
//!      +------------------ Disconnected          v  |
//!      +---- repeated failures ------------- Degraded
//! ```
//!
//! Writes are refused without touching the network while `Disconnected` or
//! `Connecting`.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{GraphError, Result};

/// Consecutive failed writes that take a degraded store offline.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    /// Reachable, but the last write failed.
    Degraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Ready => write!(f, "ready"),
            ConnectionState::Degraded => write!(f, "degraded"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    consecutive_failures: u32,
}

#[derive(Debug)]
pub struct ConnectionTracker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
}

impl ConnectionTracker {
    pub fn new(initial: ConnectionState) -> Self {
        Self::with_threshold(initial, DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn with_threshold(initial: ConnectionState, failure_threshold: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: initial,
                consecutive_failures: 0,
            }),
            failure_threshold: failure_threshold.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Connection tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn transition(inner: &mut Inner, to: ConnectionState) {
        if inner.state != to {
            match to {
                ConnectionState::Disconnected | ConnectionState::Degraded => {
                    warn!(from = %inner.state, to = %to, "Graph connection state changed")
                }
                _ => info!(from = %inner.state, to = %to, "Graph connection state changed"),
            }
            inner.state = to;
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Start a connection attempt.
    pub fn begin_connect(&self) {
        let mut inner = self.lock();
        Self::transition(&mut inner, ConnectionState::Connecting);
    }

    pub fn connected(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        Self::transition(&mut inner, ConnectionState::Ready);
    }

    pub fn connect_failed(&self) {
        let mut inner = self.lock();
        Self::transition(&mut inner, ConnectionState::Disconnected);
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state == ConnectionState::Degraded {
            Self::transition(&mut inner, ConnectionState::Ready);
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        match inner.state {
            ConnectionState::Ready => Self::transition(&mut inner, ConnectionState::Degraded),
            ConnectionState::Degraded if inner.consecutive_failures >= self.failure_threshold => {
                Self::transition(&mut inner, ConnectionState::Disconnected)
            }
            _ => {}
        }
    }

    /// Put the tracker into `state` directly.
    pub fn force(&self, state: ConnectionState) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        Self::transition(&mut inner, state);
    }

    /// Fail fast unless writes may be attempted.
    pub fn check_writable(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Ready | ConnectionState::Degraded => Ok(()),
            state => Err(GraphError::Unavailable { state }),
        }
    }
}
