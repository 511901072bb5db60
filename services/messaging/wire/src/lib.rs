//! Message framing, typed payload codecs, and UI error codes for gogoc messaging.
//!
//! This crate provides the wire format spoken between the gogoCLIENT daemon
//! and its GUI over the local IPC channel.
//!
//! ## Features
//!
//! - **Validated framing**: messages are built through a factory that rejects
//!   payloads larger than one frame
//! - **Stream delimiting**: a decoder that splits a byte stream on frame headers
//! - **Typed payloads**: status, tunnel, broker list, and HomeAccess records
//!   decoded with a bounds-checked cursor
//! - **Result codes**: the numeric codes and sentences shown by the UI
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u16 msg_id (LE)      | request or reply id        |
//! +----------------------+----------------------------+
//! | u16 data_len (LE)    | payload length             |
//! +----------------------+----------------------------+
//! | payload              | data_len bytes (< 64256)   |
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod code;
pub mod error;
pub mod message;
pub mod payload;

// Re-export main types
pub use code::ErrorCode;
pub use error::{CodecError, FrameError};
pub use message::{
    peek_frame_len, Message, MessageDecoder, MessageId, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD,
};
pub use payload::{
    Broker, BrokerList, DeviceMapping, DeviceMappingStatus, FeatureStatus, GogocStatus,
    HaccessConfigInfo, HaccessStatusInfo, Payload, StatusInfo, TunnelInfo, TunnelType,
};
