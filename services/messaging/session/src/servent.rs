//! Servent: serialized access to one transport plus traffic counters.

use crate::error::IoError;
use crate::transport::Transport;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default time to wait for a direction's IO lock
pub const DEFAULT_IO_LOCK_TIMEOUT: Duration = Duration::from_secs(15);

/// Running totals shared by every session of one manager
#[derive(Debug, Default)]
pub struct Counters {
    messages_sent: AtomicU64,
    messages_processed: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl Counters {
    pub(crate) fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_written(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters, with `queued` as the current queue depth
    pub fn snapshot(&self, queued: usize) -> Statistics {
        Statistics {
            messages_queued: queued as u64,
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Statistics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Messages waiting in the send queue
    pub messages_queued: u64,
    /// Messages fully written to the transport
    pub messages_sent: u64,
    /// Messages handed to the dispatcher
    pub messages_processed: u64,
    /// Bytes read from the transport
    pub bytes_read: u64,
    /// Bytes written to the transport
    pub bytes_written: u64,
}

/// Serializes reads and writes on one transport
#[derive(Debug)]
pub struct Servent {
    transport: Arc<dyn Transport>,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
    lock_timeout: Duration,
    counters: Arc<Counters>,
}

impl Servent {
    /// Wrap a connected transport
    pub fn new(transport: Arc<dyn Transport>, counters: Arc<Counters>, lock_timeout: Duration) -> Self {
        Self {
            transport,
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
            lock_timeout,
            counters,
        }
    }

    async fn acquire<'a>(&self, lock: &'a Mutex<()>) -> Result<MutexGuard<'a, ()>, IoError> {
        match timeout(self.lock_timeout, lock.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!("IO lock not acquired within {:?}", self.lock_timeout);
                Err(IoError::IoWaitTimeout)
            }
        }
    }

    /// Whether inbound data is pending
    pub fn can_read(&self) -> Result<bool, IoError> {
        self.transport.can_read()
    }

    /// Whether a write would proceed
    pub fn can_write(&self) -> Result<bool, IoError> {
        self.transport.can_write()
    }

    /// Read one frame into `buf`
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, IoError> {
        let _guard = self.acquire(&self.read_lock).await?;
        let n = self.transport.read(buf).await?;
        self.counters.record_read(n);
        Ok(n)
    }

    /// Write one frame
    pub async fn write(&self, buf: &[u8]) -> Result<usize, IoError> {
        let _guard = self.acquire(&self.write_lock).await?;
        let n = self.transport.write(buf).await?;
        self.counters.record_written(n);
        Ok(n)
    }

    /// Force-close the transport
    pub async fn shutdown(&self) {
        debug!("Shutting down servent transport");
        self.transport.shutdown().await;
    }
}
