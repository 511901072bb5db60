//! Connection state shared between the manager and its workers.

use crate::queue::SendQueue;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Connection manager states
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// No transport; the supervisor will initialize on its next tick
    Disconnected = 0,
    /// Initialization in progress
    PendingConnection = 1,
    /// Transport up, workers running, queue enabled
    Connected = 2,
    /// Too many failed initializations; terminal
    FatalError = 3,
}

impl TryFrom<u8> for ConnectionState {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionState::Disconnected),
            1 => Ok(ConnectionState::PendingConnection),
            2 => Ok(ConnectionState::Connected),
            3 => Ok(ConnectionState::FatalError),
            other => Err(other),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::PendingConnection => "pending",
            ConnectionState::Connected => "connected",
            ConnectionState::FatalError => "fatal",
        };
        f.write_str(name)
    }
}

/// Current state plus the side effects of changing it
#[derive(Debug)]
pub struct SharedState {
    state: AtomicU8,
    queue: Arc<SendQueue>,
    events: broadcast::Sender<ConnectionState>,
}

impl SharedState {
    pub(crate) fn new(queue: Arc<SendQueue>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            queue,
            events,
        }
    }

    /// Current state
    pub fn get(&self) -> ConnectionState {
        ConnectionState::try_from(self.state.load(Ordering::Acquire))
            .unwrap_or(ConnectionState::FatalError)
    }

    /// Move to `next`. The queue accepts posts only while connected.
    pub fn set(&self, next: ConnectionState) {
        self.queue.set_enabled(next == ConnectionState::Connected);
        let prev = self.state.swap(next as u8, Ordering::AcqRel);
        if prev != next as u8 {
            debug!("Connection state -> {}", next);
            let _ = self.events.send(next);
        }
    }

    /// Subscribe to state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.events.subscribe()
    }
}
