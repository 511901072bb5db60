//! Connection manager: supervises transport setup, workers, and reconnection.
//!
//! The supervising loop polls the shared state. On `Disconnected` it tears
//! down the previous session, clears the send queue, and initializes a new
//! transport through the [`Connector`]. Successive failures are counted;
//! once they exceed the threshold the manager enters `FatalError` and stops
//! for good.

use crate::dispatcher::MessageDispatcher;
use crate::queue::{SendQueue, DEFAULT_QUEUE_CAPACITY};
use crate::servent::{Counters, Servent, Statistics, DEFAULT_IO_LOCK_TIMEOUT};
use crate::state::{ConnectionState, SharedState};
use crate::transport::{Connector, ReadySignal, Role};
use crate::worker::{run_receiver, run_sender, WorkerContext, WorkerTiming};
use gogoc_wire::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Failed initializations tolerated before `FatalError`
    pub failure_threshold: u32,
    /// Pause after a failed initialization
    pub reconnect_cooldown: Duration,
    /// Supervising loop tick
    pub poll_interval: Duration,
    /// Send queue capacity
    pub queue_capacity: usize,
    /// Longest wait for a direction's IO lock
    pub io_lock_timeout: Duration,
    /// How long teardown waits for workers before aborting them
    pub teardown_grace: Duration,
    /// Worker loop timings
    pub worker: WorkerTiming,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reconnect_cooldown: Duration::from_secs(10),
            poll_interval: Duration::from_millis(300),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            io_lock_timeout: DEFAULT_IO_LOCK_TIMEOUT,
            teardown_grace: Duration::from_secs(1),
            worker: WorkerTiming::default(),
        }
    }
}

/// Cooperative stop flag that can also be awaited
#[derive(Debug)]
struct StopSignal {
    flag: AtomicBool,
    closed: Semaphore,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            closed: Semaphore::new(0),
        }
    }

    fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
        self.closed.close();
    }

    fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        let _ = self.closed.acquire().await;
    }
}

/// Workers and transport of one connected session
struct ActiveSession {
    servent: Arc<Servent>,
    stop: Arc<AtomicBool>,
    sender: JoinHandle<()>,
    receiver: JoinHandle<()>,
}

impl ActiveSession {
    async fn teardown(self, grace: Duration) {
        self.stop.store(true, Ordering::Release);
        self.servent.shutdown().await;

        for (name, mut handle) in [("sender", self.sender), ("receiver", self.receiver)] {
            if timeout(grace, &mut handle).await.is_err() {
                warn!("{} worker did not stop within {:?}, aborting", name, grace);
                handle.abort();
            }
        }
        debug!("Session torn down");
    }
}

/// Pieces shared between the manager handle and its supervising task
#[derive(Debug)]
struct Inner {
    role: Role,
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<dyn MessageDispatcher>,
    queue: Arc<SendQueue>,
    state: Arc<SharedState>,
    counters: Arc<Counters>,
    ready: ReadySignal,
    stop: StopSignal,
}

/// Supervises one end of the IPC channel
#[derive(Debug)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager; nothing runs until [`start`](Self::start)
    pub fn new(
        role: Role,
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        dispatcher: Arc<dyn MessageDispatcher>,
    ) -> Self {
        let counters = Arc::new(Counters::default());
        let queue = Arc::new(SendQueue::new(config.queue_capacity));
        let state = Arc::new(SharedState::new(queue.clone()));

        Self {
            inner: Arc::new(Inner {
                role,
                config,
                connector,
                dispatcher,
                queue,
                state,
                counters,
                ready: ReadySignal::new(),
                stop: StopSignal::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn the supervising loop. A stopped manager cannot be restarted.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Connection manager already running");
            return;
        }
        if self.inner.stop.is_triggered() {
            warn!("Connection manager was stopped and cannot be restarted");
            return;
        }

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move { inner.supervise().await }));
        info!("Connection manager started as {}", self.inner.role);
    }

    /// Stop the supervising loop and tear down any session
    pub async fn stop(&self) {
        self.inner.stop.trigger();

        let Some(mut handle) = self.task.lock().await.take() else {
            return;
        };

        // Teardown inside the loop waits up to the grace period per worker.
        let budget = self.inner.config.teardown_grace * 3;
        if timeout(budget, &mut handle).await.is_err() {
            warn!("Supervising loop did not stop within {:?}, aborting", budget);
            handle.abort();
        }
        self.inner.queue.reset();
        info!("Connection manager stopped");
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Subscribe to state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Queue a message for sending. Dropped unless connected and not full.
    pub fn post_message(&self, message: Message) -> bool {
        self.inner.queue.post(message)
    }

    /// Outbound queue
    pub fn queue(&self) -> &Arc<SendQueue> {
        &self.inner.queue
    }

    /// Snapshot of the counters
    pub fn statistics(&self) -> Statistics {
        self.inner.counters.snapshot(self.inner.queue.len())
    }

    /// Wait until initialization has reached the rendezvous point
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        self.inner.ready.wait(timeout).await
    }

    /// Role of this manager
    pub fn role(&self) -> Role {
        self.inner.role
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.inner.stop.trigger();
    }
}

impl Inner {
    /// Sleep for `duration` unless a stop arrives first. Returns false on stop.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = sleep(duration) => true,
            _ = self.stop.wait() => false,
        }
    }

    async fn supervise(self: Arc<Self>) {
        let mut failures = 0u32;
        let mut session: Option<ActiveSession> = None;

        while !self.stop.is_triggered() {
            match self.state.get() {
                ConnectionState::FatalError => break,
                ConnectionState::Disconnected => {
                    if let Some(active) = session.take() {
                        info!("Connection lost, tearing down session");
                        active.teardown(self.config.teardown_grace).await;
                    }
                    self.queue.reset();
                    self.state.set(ConnectionState::PendingConnection);

                    let attempt = tokio::select! {
                        res = self.connector.establish(self.role, &self.ready) => res,
                        _ = self.stop.wait() => break,
                    };

                    match attempt {
                        Ok(transport) => {
                            failures = 0;
                            let servent = Arc::new(Servent::new(
                                transport,
                                self.counters.clone(),
                                self.config.io_lock_timeout,
                            ));
                            self.state.set(ConnectionState::Connected);
                            session = Some(self.spawn_workers(servent));
                            info!("Connected as {}", self.role);
                        }
                        Err(e) => {
                            failures += 1;
                            warn!(
                                "Initialization failed ({}/{}): {}",
                                failures, self.config.failure_threshold, e
                            );
                            if failures > self.config.failure_threshold {
                                error!(
                                    "Giving up after {} failed initializations",
                                    failures
                                );
                                self.state.set(ConnectionState::FatalError);
                                break;
                            }
                            self.state.set(ConnectionState::Disconnected);
                            if !self.pause(self.config.reconnect_cooldown).await {
                                break;
                            }
                        }
                    }
                }
                ConnectionState::PendingConnection | ConnectionState::Connected => {}
            }

            if !self.pause(self.config.poll_interval).await {
                break;
            }
        }

        if let Some(active) = session.take() {
            active.teardown(self.config.teardown_grace).await;
        }
        if self.state.get() != ConnectionState::FatalError {
            self.state.set(ConnectionState::Disconnected);
        }
        debug!("Supervising loop exited");
    }

    fn spawn_workers(&self, servent: Arc<Servent>) -> ActiveSession {
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext {
            servent: servent.clone(),
            queue: self.queue.clone(),
            dispatcher: self.dispatcher.clone(),
            state: self.state.clone(),
            counters: self.counters.clone(),
            stop: stop.clone(),
            timing: self.config.worker.clone(),
        };

        ActiveSession {
            servent,
            stop,
            sender: tokio::spawn(run_sender(ctx.clone())),
            receiver: tokio::spawn(run_receiver(ctx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{DispatchError, InfoDispatcher, InfoHandler};
    use crate::error::IoError;
    use crate::transport::{PipeConnector, Transport, PIPE_NAME};
    use async_trait::async_trait;
    use gogoc_wire::{
        BrokerList, ErrorCode, GogocStatus, HaccessStatusInfo, Payload, StatusInfo, TunnelInfo,
    };
    use std::sync::atomic::AtomicU32;

    fn fast_config() -> ManagerConfig {
        ManagerConfig {
            reconnect_cooldown: Duration::from_millis(20),
            poll_interval: Duration::from_millis(10),
            teardown_grace: Duration::from_millis(200),
            worker: WorkerTiming {
                queue_wait: Duration::from_millis(5),
                backpressure_pause: Duration::from_millis(5),
                idle_read_pause: Duration::from_millis(5),
            },
            ..ManagerConfig::default()
        }
    }

    #[derive(Debug)]
    struct NullDispatcher;

    impl MessageDispatcher for NullDispatcher {
        fn process_message(&self, _message: &Message, _outbox: &SendQueue) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct FailingConnector {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Connector for FailingConnector {
        async fn establish(
            &self,
            _role: Role,
            ready: &ReadySignal,
        ) -> Result<Arc<dyn Transport>, IoError> {
            ready.signal();
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(IoError::ConnectFailed(std::io::ErrorKind::NotFound.into()))
        }
    }

    /// Accepts every write but reports one byte fewer on the first session.
    #[derive(Debug)]
    struct ShortWriteTransport {
        short: bool,
    }

    #[async_trait]
    impl Transport for ShortWriteTransport {
        fn can_read(&self) -> Result<bool, IoError> {
            Ok(false)
        }

        fn can_write(&self) -> Result<bool, IoError> {
            Ok(true)
        }

        async fn read(&self, _buf: &mut [u8]) -> Result<usize, IoError> {
            Err(IoError::Closed)
        }

        async fn write(&self, buf: &[u8]) -> Result<usize, IoError> {
            Ok(if self.short { buf.len() - 1 } else { buf.len() })
        }

        async fn shutdown(&self) {}
    }

    #[derive(Debug, Default)]
    struct FlakyConnector {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn establish(
            &self,
            _role: Role,
            ready: &ReadySignal,
        ) -> Result<Arc<dyn Transport>, IoError> {
            ready.signal();
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ShortWriteTransport { short: attempt == 0 }))
        }
    }

    async fn wait_for_state(
        events: &mut broadcast::Receiver<ConnectionState>,
        wanted: ConnectionState,
    ) {
        timeout(Duration::from_secs(2), async {
            loop {
                if events.recv().await.unwrap() == wanted {
                    return;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("state {wanted} not reached"));
    }

    #[tokio::test]
    async fn test_gives_up_after_threshold() {
        let connector = Arc::new(FailingConnector::default());
        let manager = ConnectionManager::new(
            Role::Initiator,
            fast_config(),
            connector.clone(),
            Arc::new(NullDispatcher),
        );
        let mut events = manager.subscribe();

        manager.start().await;
        wait_for_state(&mut events, ConnectionState::FatalError).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);

        // Terminal: no further attempts.
        sleep(Duration::from_millis(150)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(manager.state(), ConnectionState::FatalError);
        assert!(manager.wait_ready(Duration::from_millis(10)).await);
        assert!(!manager.post_message(Message::empty(gogoc_wire::MessageId::StatusInfoRequest)));

        manager.stop().await;
        assert_eq!(manager.state(), ConnectionState::FatalError);
    }

    #[tokio::test]
    async fn test_no_restart_after_stop() {
        let connector = Arc::new(FailingConnector::default());
        let manager = ConnectionManager::new(
            Role::Initiator,
            ManagerConfig {
                reconnect_cooldown: Duration::from_secs(5),
                ..fast_config()
            },
            connector.clone(),
            Arc::new(NullDispatcher),
        );

        manager.start().await;
        timeout(Duration::from_secs(1), async {
            while connector.attempts.load(Ordering::SeqCst) == 0 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        manager.stop().await;

        manager.start().await;
        assert!(manager.task.lock().await.is_none());
        sleep(Duration::from_millis(50)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_statistics_report_queue_depth() {
        let manager = ConnectionManager::new(
            Role::Acceptor,
            fast_config(),
            Arc::new(FailingConnector::default()),
            Arc::new(NullDispatcher),
        );
        manager.inner.state.set(ConnectionState::Connected);

        for _ in 0..3 {
            assert!(manager.post_message(Message::empty(gogoc_wire::MessageId::StatusInfo)));
        }
        assert_eq!(manager.statistics().messages_queued, 3);

        manager.queue().reset();
        assert_eq!(manager.statistics().messages_queued, 0);
    }

    #[tokio::test]
    async fn test_short_write_reconnects() {
        let connector = Arc::new(FlakyConnector::default());
        let manager = ConnectionManager::new(
            Role::Acceptor,
            fast_config(),
            connector.clone(),
            Arc::new(NullDispatcher),
        );
        let mut events = manager.subscribe();

        manager.start().await;
        wait_for_state(&mut events, ConnectionState::Connected).await;

        let status = StatusInfo::new(GogocStatus::Connected, 0).to_message().unwrap();
        assert!(manager.post_message(status.clone()));

        wait_for_state(&mut events, ConnectionState::Disconnected).await;
        wait_for_state(&mut events, ConnectionState::Connected).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);

        // The new session writes in full.
        assert!(manager.post_message(status));
        timeout(Duration::from_secs(1), async {
            while manager.statistics().messages_sent < 1 {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.statistics().messages_queued, 0);

        manager.stop().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[derive(Debug, Default)]
    struct StatusRecorder {
        statuses: std::sync::Mutex<Vec<StatusInfo>>,
    }

    impl InfoHandler for StatusRecorder {
        fn on_status_info(&self, info: &StatusInfo) -> Result<(), ErrorCode> {
            self.statuses.lock().unwrap().push(*info);
            Ok(())
        }

        fn on_tunnel_info(&self, _info: &TunnelInfo) -> Result<(), ErrorCode> {
            Ok(())
        }

        fn on_broker_list(&self, _list: &BrokerList) -> Result<(), ErrorCode> {
            Ok(())
        }

        fn on_haccess_status_info(&self, _info: &HaccessStatusInfo) -> Result<(), ErrorCode> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_status_round_trip_over_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(PipeConnector::new(
            dir.path().join(PIPE_NAME),
            Duration::from_secs(2),
        ));

        let acceptor = ConnectionManager::new(
            Role::Acceptor,
            fast_config(),
            connector.clone(),
            Arc::new(NullDispatcher),
        );
        let recorder = Arc::new(StatusRecorder::default());
        let initiator = ConnectionManager::new(
            Role::Initiator,
            fast_config(),
            connector,
            Arc::new(InfoDispatcher::new(recorder.clone())),
        );

        let mut acceptor_events = acceptor.subscribe();
        let mut initiator_events = initiator.subscribe();
        acceptor.start().await;
        assert!(acceptor.wait_ready(Duration::from_millis(750)).await);
        initiator.start().await;

        wait_for_state(&mut acceptor_events, ConnectionState::Connected).await;
        wait_for_state(&mut initiator_events, ConnectionState::Connected).await;

        let status = StatusInfo::new(GogocStatus::Connected, 0);
        assert!(acceptor.post_message(status.to_message().unwrap()));

        timeout(Duration::from_millis(300), async {
            while recorder.statuses.lock().unwrap().is_empty() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(recorder.statuses.lock().unwrap()[0], status);

        let sent = acceptor.statistics();
        let received = initiator.statistics();
        assert_eq!(sent.messages_sent, 1);
        assert_eq!(received.messages_processed, 1);
        assert_eq!(sent.bytes_written, received.bytes_read);

        initiator.stop().await;
        acceptor.stop().await;
    }
}
