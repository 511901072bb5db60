//! Message dispatch: from received frames to typed application callbacks.
//!
//! Dispatch runs on the receiver worker. Handlers should return quickly:
//! while one runs, inbound data is not drained and, because the sender
//! yields to pending inbound data, outbound traffic stalls as well.

use crate::queue::SendQueue;
use gogoc_wire::{
    BrokerList, CodecError, ErrorCode, HaccessConfigInfo, HaccessStatusInfo, Message, MessageId,
    Payload, StatusInfo, TunnelInfo,
};
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a message was not processed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Processing switched off by the application
    #[error("message processing disabled")]
    Disabled,

    /// No handler for this id
    #[error("message {0:#06x} not implemented")]
    NotImplemented(u16),

    /// Payload failed to decode
    #[error("message {id:#06x} failed to decode: {source}")]
    Decode {
        /// Message id
        id: u16,
        /// Decoder error
        #[source]
        source: CodecError,
    },

    /// Handler reported a failure
    #[error("handler failed: {0}")]
    Handler(ErrorCode),
}

impl DispatchError {
    /// UI result code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::Disabled => ErrorCode::MessageProcessingDisabled,
            DispatchError::NotImplemented(_) => ErrorCode::MessageNotImplemented,
            DispatchError::Decode { .. } => ErrorCode::BadPacket,
            DispatchError::Handler(code) => *code,
        }
    }
}

/// Invoked by the receiver worker for every received message
pub trait MessageDispatcher: Send + Sync + Debug {
    /// Process one message. Replies, if any, go to `outbox`.
    fn process_message(&self, message: &Message, outbox: &SendQueue) -> Result<(), DispatchError>;
}

fn decode<P: Payload>(message: &Message) -> Result<P, DispatchError> {
    P::decode(message.payload()).map_err(|source| DispatchError::Decode {
        id: message.id(),
        source,
    })
}

/// On/off switch shared by both dispatchers
#[derive(Debug)]
struct ProcessingSwitch(AtomicBool);

impl ProcessingSwitch {
    fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Release);
    }

    fn check(&self) -> Result<(), DispatchError> {
        if self.0.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DispatchError::Disabled)
        }
    }
}

/// GUI-side callbacks for information pushed by the daemon
pub trait InfoHandler: Send + Sync + Debug {
    /// Daemon status changed or was requested
    fn on_status_info(&self, info: &StatusInfo) -> Result<(), ErrorCode>;

    /// Tunnel details
    fn on_tunnel_info(&self, info: &TunnelInfo) -> Result<(), ErrorCode>;

    /// Broker list
    fn on_broker_list(&self, list: &BrokerList) -> Result<(), ErrorCode>;

    /// HomeAccess status
    fn on_haccess_status_info(&self, info: &HaccessStatusInfo) -> Result<(), ErrorCode>;
}

/// Dispatcher for the GUI side
#[derive(Debug)]
pub struct InfoDispatcher {
    handler: Arc<dyn InfoHandler>,
    switch: ProcessingSwitch,
}

impl InfoDispatcher {
    /// Create an enabled dispatcher
    pub fn new(handler: Arc<dyn InfoHandler>) -> Self {
        Self {
            handler,
            switch: ProcessingSwitch::new(),
        }
    }

    /// Resume processing
    pub fn enable_processing(&self) {
        self.switch.set(true);
    }

    /// Answer every message with `Disabled`
    pub fn disable_processing(&self) {
        self.switch.set(false);
    }

    /// Whether messages are processed
    pub fn is_processing_enabled(&self) -> bool {
        self.switch.check().is_ok()
    }
}

impl MessageDispatcher for InfoDispatcher {
    fn process_message(&self, message: &Message, _outbox: &SendQueue) -> Result<(), DispatchError> {
        self.switch.check()?;

        let result = match message.kind() {
            Some(MessageId::StatusInfo) => self.handler.on_status_info(&decode(message)?),
            Some(MessageId::TunnelInfo) => self.handler.on_tunnel_info(&decode(message)?),
            Some(MessageId::BrokerList) => self.handler.on_broker_list(&decode(message)?),
            Some(MessageId::HaccessStatusInfo) => {
                self.handler.on_haccess_status_info(&decode(message)?)
            }
            _ => return Err(DispatchError::NotImplemented(message.id())),
        };
        result.map_err(DispatchError::Handler)
    }
}

/// Daemon-side providers for information requested by the GUI
pub trait RequestHandler: Send + Sync + Debug {
    /// Current status
    fn status_info(&self) -> Result<StatusInfo, ErrorCode>;

    /// Current tunnel details
    fn tunnel_info(&self) -> Result<TunnelInfo, ErrorCode>;

    /// Known brokers
    fn broker_list(&self) -> Result<BrokerList, ErrorCode>;

    /// Current HomeAccess status
    fn haccess_status_info(&self) -> Result<HaccessStatusInfo, ErrorCode>;

    /// HomeAccess configuration pushed by the GUI
    fn haccess_config_changed(&self, config: &HaccessConfigInfo) -> Result<(), ErrorCode>;
}

/// Dispatcher for the daemon side
#[derive(Debug)]
pub struct RequestDispatcher {
    handler: Arc<dyn RequestHandler>,
    switch: ProcessingSwitch,
}

impl RequestDispatcher {
    /// Create an enabled dispatcher
    pub fn new(handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            handler,
            switch: ProcessingSwitch::new(),
        }
    }

    /// Resume processing
    pub fn enable_processing(&self) {
        self.switch.set(true);
    }

    /// Answer every message with `Disabled`
    pub fn disable_processing(&self) {
        self.switch.set(false);
    }

    /// Whether messages are processed
    pub fn is_processing_enabled(&self) -> bool {
        self.switch.check().is_ok()
    }

    fn reply<P: Payload>(
        &self,
        retrieved: Result<P, ErrorCode>,
        outbox: &SendQueue,
    ) -> Result<(), DispatchError> {
        let payload = retrieved.map_err(DispatchError::Handler)?;
        let message = payload.to_message().map_err(|e| {
            warn!("Reply {:?} does not fit in a frame: {}", P::ID, e);
            DispatchError::Handler(ErrorCode::SendBufferTooBig)
        })?;
        if !outbox.post(message) {
            debug!("Reply {:?} dropped by send queue", P::ID);
        }
        Ok(())
    }
}

impl MessageDispatcher for RequestDispatcher {
    fn process_message(&self, message: &Message, outbox: &SendQueue) -> Result<(), DispatchError> {
        self.switch.check()?;

        match message.kind() {
            Some(MessageId::StatusInfoRequest) => self.reply(self.handler.status_info(), outbox),
            Some(MessageId::TunnelInfoRequest) => self.reply(self.handler.tunnel_info(), outbox),
            Some(MessageId::BrokerListRequest) => self.reply(self.handler.broker_list(), outbox),
            Some(MessageId::HaccessStatusInfoRequest) => {
                self.reply(self.handler.haccess_status_info(), outbox)
            }
            Some(MessageId::HaccessConfigInfo) => {
                let config: HaccessConfigInfo = decode(message)?;
                self.handler
                    .haccess_config_changed(&config)
                    .map_err(DispatchError::Handler)
            }
            _ => Err(DispatchError::NotImplemented(message.id())),
        }
    }
}
