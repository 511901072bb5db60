//! Sender and receiver loops for one connected session.
//!
//! Both loops stop when their stop flag is raised or on the first transport
//! error. An error moves the shared state to `Disconnected`; the manager's
//! supervising loop decides what happens next.

use crate::dispatcher::MessageDispatcher;
use crate::error::IoError;
use crate::queue::SendQueue;
use crate::servent::{Counters, Servent};
use crate::state::{ConnectionState, SharedState};
use gogoc_wire::{Message, MAX_FRAME_SIZE};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Worker loop timings
#[derive(Debug, Clone)]
pub struct WorkerTiming {
    /// Longest wait for a queued message before rechecking the stop flag
    pub queue_wait: Duration,
    /// Pause after yielding to pending inbound data
    pub backpressure_pause: Duration,
    /// Pause when no inbound data is pending
    pub idle_read_pause: Duration,
}

impl Default for WorkerTiming {
    fn default() -> Self {
        Self {
            queue_wait: Duration::from_millis(25),
            backpressure_pause: Duration::from_millis(20),
            idle_read_pause: Duration::from_millis(25),
        }
    }
}

/// Everything a worker needs, cloned per task
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Transport wrapper for this session
    pub servent: Arc<Servent>,
    /// Outbound queue
    pub queue: Arc<SendQueue>,
    /// Handler for inbound messages
    pub dispatcher: Arc<dyn MessageDispatcher>,
    /// Manager state
    pub state: Arc<SharedState>,
    /// Message counters
    pub counters: Arc<Counters>,
    /// Raised by the manager to end the session
    pub stop: Arc<AtomicBool>,
    /// Loop timings
    pub timing: WorkerTiming,
}

impl WorkerContext {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        // A stop in progress owns the state; don't race it.
        if !self.stopped() {
            self.state.set(ConnectionState::Disconnected);
        }
    }
}

/// Drain the send queue onto the transport.
///
/// Inbound data has priority: while the transport reports pending input the
/// head message stays queued and the loop backs off.
pub async fn run_sender(ctx: WorkerContext) {
    debug!("Sender worker started");

    while !ctx.stopped() {
        let Some(slot) = ctx.queue.acquire(ctx.timing.queue_wait).await else {
            continue;
        };

        match ctx.servent.can_read() {
            Ok(false) => {}
            Ok(true) => {
                slot.release();
                sleep(ctx.timing.backpressure_pause).await;
                continue;
            }
            Err(e) => {
                slot.release();
                error!("Sender readiness check failed: {}", e);
                ctx.disconnect();
                break;
            }
        }

        let Some(message) = slot.take() else {
            continue;
        };
        let frame = message.encode();

        match ctx.servent.write(&frame).await {
            Ok(written) if written == frame.len() => {
                ctx.counters.record_sent();
            }
            Ok(written) => {
                let err = IoError::ShortWrite {
                    expected: frame.len(),
                    written,
                };
                error!("Failed to send message {:#06x}: {}", message.id(), err);
                ctx.disconnect();
                break;
            }
            Err(e) => {
                error!("Failed to send message {:#06x}: {}", message.id(), e);
                ctx.disconnect();
                break;
            }
        }
    }

    debug!("Sender worker stopped");
}

/// Poll the transport and dispatch every received message
pub async fn run_receiver(ctx: WorkerContext) {
    debug!("Receiver worker started");
    let mut buf = vec![0u8; MAX_FRAME_SIZE];

    while !ctx.stopped() {
        match ctx.servent.can_read() {
            Ok(true) => {}
            Ok(false) => {
                sleep(ctx.timing.idle_read_pause).await;
                continue;
            }
            Err(e) => {
                info!("Receiver readiness check failed: {}", e);
                ctx.disconnect();
                break;
            }
        }

        let n = match ctx.servent.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                error!("Failed to read message: {}", e);
                ctx.disconnect();
                break;
            }
        };

        let message = match Message::decode(&buf[..n]) {
            Ok(message) => message,
            Err(e) => {
                warn!("Discarding malformed frame of {} bytes: {}", n, e);
                continue;
            }
        };

        if let Err(e) = ctx.dispatcher.process_message(&message, &ctx.queue) {
            warn!(
                "Message {:#06x} not processed: {} ({:#04x})",
                message.id(),
                e,
                e.code() as u32
            );
        }
        ctx.counters.record_processed();
    }

    debug!("Receiver worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchError;
    use crate::servent::DEFAULT_IO_LOCK_TIMEOUT;
    use crate::transport::{accept_as_server, connect_as_client, ReadySignal, Transport, PIPE_NAME};
    use async_trait::async_trait;
    use gogoc_wire::MessageId;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::time::timeout;

    #[derive(Debug, Default)]
    struct StubTransport {
        inbound_pending: AtomicBool,
        inbound: Mutex<VecDeque<Vec<u8>>>,
        writes: Mutex<Vec<Vec<u8>>>,
        write_calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for StubTransport {
        fn can_read(&self) -> Result<bool, IoError> {
            Ok(self.inbound_pending.load(Ordering::SeqCst) || !self.inbound.lock().unwrap().is_empty())
        }

        fn can_write(&self) -> Result<bool, IoError> {
            Ok(true)
        }

        async fn read(&self, buf: &mut [u8]) -> Result<usize, IoError> {
            let frame = self.inbound.lock().unwrap().pop_front().ok_or(IoError::Closed)?;
            buf[..frame.len()].copy_from_slice(&frame);
            Ok(frame.len())
        }

        async fn write(&self, buf: &[u8]) -> Result<usize, IoError> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            self.writes.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        async fn shutdown(&self) {}
    }

    #[derive(Debug, Default)]
    struct CollectingDispatcher {
        seen: Mutex<Vec<u16>>,
    }

    impl MessageDispatcher for CollectingDispatcher {
        fn process_message(&self, message: &Message, _outbox: &SendQueue) -> Result<(), DispatchError> {
            self.seen.lock().unwrap().push(message.id());
            Ok(())
        }
    }

    fn context(transport: Arc<dyn Transport>, dispatcher: Arc<CollectingDispatcher>) -> WorkerContext {
        let counters = Arc::new(Counters::default());
        let queue = Arc::new(SendQueue::new(16));
        let state = Arc::new(SharedState::new(queue.clone()));
        state.set(ConnectionState::Connected);

        WorkerContext {
            servent: Arc::new(Servent::new(transport, counters.clone(), DEFAULT_IO_LOCK_TIMEOUT)),
            queue,
            dispatcher,
            state,
            counters,
            stop: Arc::new(AtomicBool::new(false)),
            timing: WorkerTiming {
                queue_wait: Duration::from_millis(5),
                backpressure_pause: Duration::from_millis(5),
                idle_read_pause: Duration::from_millis(5),
            },
        }
    }

    fn numbered(n: u8) -> Message {
        Message::new(MessageId::StatusInfo, vec![n]).unwrap()
    }

    #[tokio::test]
    async fn test_sender_preserves_post_order() {
        let transport = Arc::new(StubTransport::default());
        let ctx = context(transport.clone(), Arc::default());
        for n in 0..5 {
            assert!(ctx.queue.post(numbered(n)));
        }

        let handle = tokio::spawn(run_sender(ctx.clone()));
        timeout(Duration::from_secs(1), async {
            while transport.write_calls.load(Ordering::SeqCst) < 5 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        ctx.stop.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        let written: Vec<Message> = transport
            .writes
            .lock()
            .unwrap()
            .iter()
            .map(|frame| Message::decode(frame).unwrap())
            .collect();
        assert_eq!(written, (0..5).map(numbered).collect::<Vec<_>>());
        assert_eq!(ctx.counters.snapshot(0).messages_sent, 5);
    }

    #[tokio::test]
    async fn test_sender_yields_to_pending_input() {
        let transport = Arc::new(StubTransport::default());
        transport.inbound_pending.store(true, Ordering::SeqCst);
        let ctx = context(transport.clone(), Arc::default());
        ctx.queue.post(numbered(1));

        let handle = tokio::spawn(run_sender(ctx.clone()));
        sleep(Duration::from_millis(200)).await;

        assert_eq!(transport.write_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.queue.len(), 1);

        // Once input drains the message goes out.
        transport.inbound_pending.store(false, Ordering::SeqCst);
        timeout(Duration::from_secs(1), async {
            while transport.write_calls.load(Ordering::SeqCst) == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        ctx.stop.store(true, Ordering::SeqCst);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_sender_drains_while_read_waits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PIPE_NAME);
        let server_path = path.clone();
        let server = tokio::spawn(async move {
            accept_as_server(&server_path, &ReadySignal::new()).await.unwrap()
        });
        let client = connect_as_client(&path, &ReadySignal::new(), Duration::from_secs(2))
            .await
            .unwrap();
        let server: Arc<dyn Transport> = Arc::new(server.await.unwrap());

        let ctx = context(server.clone(), Arc::default());

        // A read parked on the idle socket, as the receiver would leave it.
        let idle_read = tokio::spawn({
            let servent = ctx.servent.clone();
            async move {
                let mut buf = vec![0u8; MAX_FRAME_SIZE];
                servent.read(&mut buf).await
            }
        });
        sleep(Duration::from_millis(20)).await;

        assert!(ctx.queue.post(numbered(3)));
        let handle = tokio::spawn(run_sender(ctx.clone()));

        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        let n = timeout(Duration::from_secs(1), client.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Message::decode(&buf[..n]).unwrap(), numbered(3));
        assert!(ctx.queue.is_empty());
        timeout(Duration::from_secs(1), async {
            while ctx.counters.snapshot(0).messages_sent < 1 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        ctx.stop.store(true, Ordering::SeqCst);
        handle.await.unwrap();
        server.shutdown().await;
        assert!(matches!(idle_read.await.unwrap(), Err(IoError::Closed)));
    }

    #[tokio::test]
    async fn test_receiver_dispatches_and_skips_garbage() {
        let transport = Arc::new(StubTransport::default());
        {
            let mut inbound = transport.inbound.lock().unwrap();
            inbound.push_back(numbered(1).encode().to_vec());
            inbound.push_back(vec![0x01, 0x01, 0x09, 0x00]);
            inbound.push_back(Message::empty(MessageId::BrokerListRequest).encode().to_vec());
        }
        let dispatcher = Arc::new(CollectingDispatcher::default());
        let ctx = context(transport.clone(), dispatcher.clone());

        let handle = tokio::spawn(run_receiver(ctx.clone()));
        timeout(Duration::from_secs(1), async {
            while dispatcher.seen.lock().unwrap().len() < 2 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        ctx.stop.store(true, Ordering::SeqCst);
        handle.await.unwrap();

        assert_eq!(*dispatcher.seen.lock().unwrap(), vec![0x0101, 0x0003]);
        assert_eq!(ctx.counters.snapshot(0).messages_processed, 2);
        assert_eq!(ctx.state.get(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_read_error_disconnects() {
        let transport = Arc::new(StubTransport::default());
        // Claims input but has none, so read fails.
        transport.inbound_pending.store(true, Ordering::SeqCst);
        let ctx = context(transport, Arc::default());

        timeout(Duration::from_secs(1), run_receiver(ctx.clone()))
            .await
            .unwrap();
        assert_eq!(ctx.state.get(), ConnectionState::Disconnected);
        assert!(!ctx.queue.is_enabled());
    }
}
