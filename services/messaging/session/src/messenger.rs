//! Messenger handles for each end of the channel.
//!
//! A handle owns its connection manager and dispatcher. The daemon side
//! answers requests and pushes information; the GUI side requests
//! information and pushes HomeAccess configuration. Dropping a handle stops
//! its manager; call `shutdown` to wait for teardown.

use crate::dispatcher::{InfoDispatcher, InfoHandler, RequestDispatcher, RequestHandler};
use crate::manager::{ConnectionManager, ManagerConfig};
use crate::servent::Statistics;
use crate::state::ConnectionState;
use crate::transport::{default_pipe_path, PipeConnector, Role};
use anyhow::Result;
use gogoc_wire::{ErrorCode, HaccessConfigInfo, Message, MessageId, Payload};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Time `init` waits for the manager to reach the rendezvous point
pub const INIT_READY_WAIT: Duration = Duration::from_millis(750);

/// Settings shared by both messenger kinds
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// Rendezvous path
    pub pipe_path: PathBuf,
    /// How long an initiator waits for the acceptor to appear
    pub connect_timeout: Duration,
    /// Connection manager settings
    pub manager: ManagerConfig,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            pipe_path: default_pipe_path(),
            connect_timeout: Duration::from_secs(5),
            manager: ManagerConfig::default(),
        }
    }
}

async fn start_manager(
    role: Role,
    config: &MessengerConfig,
    dispatcher: Arc<dyn crate::dispatcher::MessageDispatcher>,
) -> ConnectionManager {
    let connector = Arc::new(PipeConnector::new(
        config.pipe_path.clone(),
        config.connect_timeout,
    ));
    let manager = ConnectionManager::new(role, config.manager.clone(), connector, dispatcher);
    manager.start().await;

    if !manager.wait_ready(INIT_READY_WAIT).await {
        // Not fatal: the supervisor keeps initializing in the background.
        warn!("Messaging not ready after {:?}", INIT_READY_WAIT);
    }
    manager
}

fn post<P: Payload>(manager: &ConnectionManager, payload: &P) -> Result<(), ErrorCode> {
    let message = payload
        .to_message()
        .map_err(|_| ErrorCode::SendBufferTooBig)?;
    if !manager.post_message(message) {
        debug!("{:?} not queued in state {}", P::ID, manager.state());
    }
    Ok(())
}

/// Daemon-side handle: answers GUI requests and pushes updates
#[derive(Debug)]
pub struct DaemonMessenger {
    manager: ConnectionManager,
    dispatcher: Arc<RequestDispatcher>,
    handler: Arc<dyn RequestHandler>,
}

impl DaemonMessenger {
    /// Start the acceptor end of the channel
    pub async fn init(handler: Arc<dyn RequestHandler>, config: MessengerConfig) -> Result<Self> {
        let dispatcher = Arc::new(RequestDispatcher::new(handler.clone()));
        let manager = start_manager(Role::Acceptor, &config, dispatcher.clone()).await;
        info!("Daemon messenger listening on {:?}", config.pipe_path);

        Ok(Self {
            manager,
            dispatcher,
            handler,
        })
    }

    /// Retrieve and push the current status
    pub fn send_status_info(&self) -> Result<(), ErrorCode> {
        post(&self.manager, &self.handler.status_info()?)
    }

    /// Retrieve and push the tunnel details
    pub fn send_tunnel_info(&self) -> Result<(), ErrorCode> {
        post(&self.manager, &self.handler.tunnel_info()?)
    }

    /// Retrieve and push the broker list
    pub fn send_broker_list(&self) -> Result<(), ErrorCode> {
        post(&self.manager, &self.handler.broker_list()?)
    }

    /// Retrieve and push the HomeAccess status
    pub fn send_haccess_status_info(&self) -> Result<(), ErrorCode> {
        post(&self.manager, &self.handler.haccess_status_info()?)
    }

    /// Dispatcher answering GUI requests
    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Connection state
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Counter snapshot
    pub fn statistics(&self) -> Statistics {
        self.manager.statistics()
    }

    /// Wait for the rendezvous point
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        self.manager.wait_ready(timeout).await
    }

    /// Underlying connection manager
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Stop messaging and wait for teardown
    pub async fn shutdown(self) {
        self.manager.stop().await;
    }
}

/// GUI-side handle: requests information and receives updates
#[derive(Debug)]
pub struct GuiMessenger {
    manager: ConnectionManager,
    dispatcher: Arc<InfoDispatcher>,
}

impl GuiMessenger {
    /// Start the initiator end of the channel
    pub async fn init(handler: Arc<dyn InfoHandler>, config: MessengerConfig) -> Result<Self> {
        let dispatcher = Arc::new(InfoDispatcher::new(handler));
        let manager = start_manager(Role::Initiator, &config, dispatcher.clone()).await;
        info!("GUI messenger connecting to {:?}", config.pipe_path);

        Ok(Self {
            manager,
            dispatcher,
        })
    }

    fn request(&self, id: MessageId) -> bool {
        self.manager.post_message(Message::empty(id))
    }

    /// Ask the daemon for its status. Returns whether the request was queued.
    pub fn request_status_info(&self) -> bool {
        self.request(MessageId::StatusInfoRequest)
    }

    /// Ask the daemon for tunnel details
    pub fn request_tunnel_info(&self) -> bool {
        self.request(MessageId::TunnelInfoRequest)
    }

    /// Ask the daemon for the broker list
    pub fn request_broker_list(&self) -> bool {
        self.request(MessageId::BrokerListRequest)
    }

    /// Ask the daemon for HomeAccess status
    pub fn request_haccess_status_info(&self) -> bool {
        self.request(MessageId::HaccessStatusInfoRequest)
    }

    /// Push HomeAccess configuration to the daemon
    pub fn send_haccess_config_info(&self, config: &HaccessConfigInfo) -> Result<(), ErrorCode> {
        post(&self.manager, config)
    }

    /// Resume handling daemon updates
    pub fn enable_processing(&self) {
        self.dispatcher.enable_processing();
    }

    /// Ignore daemon updates
    pub fn disable_processing(&self) {
        self.dispatcher.disable_processing();
    }

    /// Whether daemon updates are handled
    pub fn is_processing_enabled(&self) -> bool {
        self.dispatcher.is_processing_enabled()
    }

    /// Connection state
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Counter snapshot
    pub fn statistics(&self) -> Statistics {
        self.manager.statistics()
    }

    /// Wait for the rendezvous point
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        self.manager.wait_ready(timeout).await
    }

    /// Underlying connection manager
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Stop messaging and wait for teardown
    pub async fn shutdown(self) {
        self.manager.stop().await;
    }
}
