//! Pipe transport, send queue, worker loops, and connection manager for gogoc messaging.
//!
//! This crate runs one end of the duplex IPC channel between the gogoCLIENT
//! daemon and its GUI: it establishes the transport, queues outbound
//! messages, drains inbound ones into a dispatcher, and reconnects when the
//! channel breaks.
//!
//! ## Features
//!
//! - **Pipe Transport**: Unix domain socket rendezvous with acceptor and initiator roles
//! - **Send Queue**: bounded FIFO, enabled only while connected
//! - **Workers**: sender and receiver loops with inbound-first backpressure
//! - **Connection Manager**: reconnect state machine with a bounded failure count
//! - **Dispatchers**: typed callbacks for each side of the conversation
//!
//! ## Example
//!
//! ```rust,no_run
//! use gogoc_session::{GuiMessenger, InfoHandler, MessengerConfig};
//! use gogoc_wire::{BrokerList, ErrorCode, HaccessStatusInfo, StatusInfo, TunnelInfo};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Printer;
//!
//! impl InfoHandler for Printer {
//!     fn on_status_info(&self, info: &StatusInfo) -> Result<(), ErrorCode> {
//!         println!("status: {:?}", info.status);
//!         Ok(())
//!     }
//!     fn on_tunnel_info(&self, info: &TunnelInfo) -> Result<(), ErrorCode> {
//!         println!("tunnel via {}", info.broker_name);
//!         Ok(())
//!     }
//!     fn on_broker_list(&self, list: &BrokerList) -> Result<(), ErrorCode> {
//!         println!("{} brokers", list.len());
//!         Ok(())
//!     }
//!     fn on_haccess_status_info(&self, _info: &HaccessStatusInfo) -> Result<(), ErrorCode> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let gui = GuiMessenger::init(Arc::new(Printer), MessengerConfig::default()).await?;
//! gui.request_status_info();
//! gui.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatcher;
pub mod error;
pub mod manager;
pub mod messenger;
pub mod queue;
pub mod servent;
pub mod state;
pub mod transport;
pub mod worker;

// Re-export main types
pub use dispatcher::{
    DispatchError, InfoDispatcher, InfoHandler, MessageDispatcher, RequestDispatcher,
    RequestHandler,
};
pub use error::IoError;
pub use manager::{ConnectionManager, ManagerConfig};
pub use messenger::{DaemonMessenger, GuiMessenger, MessengerConfig, INIT_READY_WAIT};
pub use queue::{QueueSlot, SendQueue, DEFAULT_QUEUE_CAPACITY};
pub use servent::{Counters, Servent, Statistics, DEFAULT_IO_LOCK_TIMEOUT};
pub use state::{ConnectionState, SharedState};
pub use transport::{
    accept_as_server, connect_as_client, default_pipe_path, Connector, PipeConnector,
    PipeTransport, ReadySignal, Role, Transport, PIPE_NAME,
};
pub use worker::{run_receiver, run_sender, WorkerContext, WorkerTiming};
