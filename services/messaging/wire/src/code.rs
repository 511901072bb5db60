//! Result codes shared by the messaging layer and its UI.

use crate::error::FrameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Messaging result codes
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Success
    NoError = 0x00,
    /// Write on the pipe failed
    WritePipeFailed = 0x01,
    /// Readiness check on the pipe failed
    PeekPipeFailed = 0x02,
    /// Read on the pipe failed
    ReadPipeFailed = 0x03,
    /// Pipe server already listening
    PipeServerAlreadyUp = 0x04,
    /// Pipe server could not be created
    FailCreateServerPipe = 0x05,
    /// Pipe client already connected
    ClientAlreadyConnected = 0x06,
    /// Pipe client could not connect
    ClientConnectFailed = 0x07,
    /// Pipe server disconnect failed
    PipeServerDisconnectFailed = 0x08,
    /// Pipe client could not be created
    FailCreateClientPipe = 0x09,
    /// Pipe client disconnect failed
    PipeClientDisconnectFailed = 0x0A,
    /// Malformed packet
    BadPacket = 0x0B,
    /// Peers lost frame sync
    IpcDesynchronized = 0x0C,
    /// Packets arrived out of order
    PacketsNotOrdered = 0x0D,
    /// Receive buffer cannot hold the frame
    ReadBufferTooSmall = 0x0E,
    /// Outbound data exceeds the frame limit
    SendBufferTooBig = 0x0F,
    /// IO lock not acquired in time
    IoWaitTimeout = 0x10,
    /// Dispatcher is disabled
    MessageProcessingDisabled = 0x11,
    /// No handler for the message id
    MessageNotImplemented = 0x12,
}

impl ErrorCode {
    /// User-facing description
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::NoError => "SUCCESS",
            ErrorCode::WritePipeFailed => "Failed writing on the named pipe.",
            ErrorCode::PeekPipeFailed => "Failed \"peeking\" IO status on named pipe.",
            ErrorCode::ReadPipeFailed => "Failed reading on the named pipe.",
            ErrorCode::PipeServerAlreadyUp => "Pipe server is already up.",
            ErrorCode::FailCreateServerPipe => "Failed creation of pipe server.",
            ErrorCode::ClientAlreadyConnected => "Pipe client is already connected.",
            ErrorCode::ClientConnectFailed => "Pipe client connection failed.",
            ErrorCode::PipeServerDisconnectFailed => "Pipe server disconnection failed.",
            ErrorCode::FailCreateClientPipe => "Failed creation of client pipe.",
            ErrorCode::PipeClientDisconnectFailed => "Pipe client disconnection failed.",
            ErrorCode::BadPacket => "Invalid/erroneous IPC data packet received.",
            ErrorCode::IpcDesynchronized => {
                "IPC communication desynchronized. Need re-initialization."
            }
            ErrorCode::PacketsNotOrdered => "ERROR, IPC sequential packet number is not ordered.",
            ErrorCode::ReadBufferTooSmall => {
                "IPC layer internal buffer size too small to read data packet."
            }
            ErrorCode::SendBufferTooBig => "User message data is too big to be sent through the IPC.",
            ErrorCode::IoWaitTimeout => "Failed acquiring IO mutex to perform requested IPC operation.",
            ErrorCode::MessageProcessingDisabled => {
                "Message processing is disabled. Reception of messages is unavailable."
            }
            ErrorCode::MessageNotImplemented => {
                "Unknown message received. Processing for that message is not implemented."
            }
        }
    }

    /// Whether this code signals success
    pub fn is_ok(self) -> bool {
        self == ErrorCode::NoError
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::error::Error for ErrorCode {}

impl TryFrom<u32> for ErrorCode {
    type Error = FrameError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        let code = match value {
            0x00 => ErrorCode::NoError,
            0x01 => ErrorCode::WritePipeFailed,
            0x02 => ErrorCode::PeekPipeFailed,
            0x03 => ErrorCode::ReadPipeFailed,
            0x04 => ErrorCode::PipeServerAlreadyUp,
            0x05 => ErrorCode::FailCreateServerPipe,
            0x06 => ErrorCode::ClientAlreadyConnected,
            0x07 => ErrorCode::ClientConnectFailed,
            0x08 => ErrorCode::PipeServerDisconnectFailed,
            0x09 => ErrorCode::FailCreateClientPipe,
            0x0A => ErrorCode::PipeClientDisconnectFailed,
            0x0B => ErrorCode::BadPacket,
            0x0C => ErrorCode::IpcDesynchronized,
            0x0D => ErrorCode::PacketsNotOrdered,
            0x0E => ErrorCode::ReadBufferTooSmall,
            0x0F => ErrorCode::SendBufferTooBig,
            0x10 => ErrorCode::IoWaitTimeout,
            0x11 => ErrorCode::MessageProcessingDisabled,
            0x12 => ErrorCode::MessageNotImplemented,
            _ => return Err(FrameError::UnknownCode(value)),
        };
        Ok(code)
    }
}

impl From<FrameError> for ErrorCode {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::PayloadTooLarge(_) => ErrorCode::SendBufferTooBig,
            FrameError::UnknownId(_) => ErrorCode::MessageNotImplemented,
            FrameError::Incomplete
            | FrameError::LengthMismatch { .. }
            | FrameError::UnknownCode(_) => ErrorCode::BadPacket,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_contiguous() {
        for raw in 0x00..=0x12u32 {
            let code = ErrorCode::try_from(raw).unwrap();
            assert_eq!(code as u32, raw);
        }
        assert_eq!(ErrorCode::try_from(0x13), Err(FrameError::UnknownCode(0x13)));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ErrorCode::MessageProcessingDisabled.to_string(),
            "Message processing is disabled. Reception of messages is unavailable."
        );
        assert!(ErrorCode::NoError.is_ok());
        assert!(!ErrorCode::BadPacket.is_ok());
    }

    #[test]
    fn test_frame_error_mapping() {
        assert_eq!(
            ErrorCode::from(FrameError::PayloadTooLarge(70000)),
            ErrorCode::SendBufferTooBig
        );
        assert_eq!(
            ErrorCode::from(FrameError::LengthMismatch { declared: 4, actual: 2 }),
            ErrorCode::BadPacket
        );
    }
}
