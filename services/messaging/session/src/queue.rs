//! Bounded outbound message queue.
//!
//! Producers post from any task; the sender worker is the single consumer.
//! A semaphore counts queued messages so the consumer can wait with a
//! timeout. Posting is best effort: a full or disabled queue drops the
//! message without reporting an error.

use gogoc_wire::Message;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, trace};

/// Default number of messages held before posts are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Outbound message queue
#[derive(Debug)]
pub struct SendQueue {
    items: Mutex<VecDeque<Message>>,
    available: Semaphore,
    enabled: AtomicBool,
    capacity: usize,
}

impl SendQueue {
    /// Create a disabled queue
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Semaphore::new(0),
            enabled: AtomicBool::new(false),
            capacity,
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<Message>> {
        // The queue stays consistent even if a holder panicked.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `message` if the queue is enabled and not full.
    ///
    /// Returns whether the message was accepted. Acceptance is not delivery.
    pub fn post(&self, message: Message) -> bool {
        let mut items = self.items();
        if !self.enabled.load(Ordering::Acquire) {
            trace!("Send queue disabled, dropping message {:#06x}", message.id());
            return false;
        }
        if items.len() >= self.capacity {
            debug!("Send queue full ({}), dropping message {:#06x}", self.capacity, message.id());
            return false;
        }

        items.push_back(message);
        self.available.add_permits(1);
        true
    }

    /// Drop every queued message and zero the count
    pub fn reset(&self) {
        let mut items = self.items();
        let dropped = items.len();
        items.clear();
        while let Ok(permit) = self.available.try_acquire() {
            permit.forget();
        }
        if dropped > 0 {
            debug!("Send queue reset, {} messages dropped", dropped);
        }
    }

    /// Enable or disable posting
    pub fn set_enabled(&self, enabled: bool) {
        // Taken under the items lock so a post sees either state, never both.
        let _items = self.items();
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether posts are accepted
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Maximum number of queued messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait up to `wait` for a queued message
    pub async fn acquire(&self, wait: Duration) -> Option<QueueSlot<'_>> {
        match tokio::time::timeout(wait, self.available.acquire()).await {
            Ok(Ok(permit)) => Some(QueueSlot {
                queue: self,
                permit,
            }),
            _ => None,
        }
    }
}

/// Claim on the head of the queue, held by the consumer
#[derive(Debug)]
pub struct QueueSlot<'a> {
    queue: &'a SendQueue,
    permit: SemaphorePermit<'a>,
}

impl QueueSlot<'_> {
    /// Give the claim back without consuming the head message
    pub fn release(self) {
        drop(self.permit);
    }

    /// Consume the head message
    pub fn take(self) -> Option<Message> {
        let mut items = self.queue.items();
        self.permit.forget();
        items.pop_front()
    }
}
