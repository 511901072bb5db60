//! Transport and IO error types.

use gogoc_wire::{ErrorCode, FrameError};
use thiserror::Error;

/// Errors raised by transports and the servent
#[derive(Error, Debug)]
pub enum IoError {
    /// Readiness check failed or the peer hung up
    #[error("peek failed: {0}")]
    PeekFailed(#[source] std::io::Error),

    /// Read failed
    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// Write failed
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// Fewer bytes written than the frame holds
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Frame size
        expected: usize,
        /// Bytes the transport accepted
        written: usize,
    },

    /// Caller buffer cannot hold the next frame
    #[error("read buffer too small: frame is {0} bytes")]
    BufferTooSmall(usize),

    /// Incoming bytes do not form a valid frame
    #[error("bad frame: {0}")]
    Frame(#[from] FrameError),

    /// IO lock not acquired in time
    #[error("io lock wait timed out")]
    IoWaitTimeout,

    /// Transport was shut down
    #[error("transport closed")]
    Closed,

    /// Rendezvous point could not be created
    #[error("failed to create server pipe: {0}")]
    CreateServerFailed(#[source] std::io::Error),

    /// Accepting the peer failed
    #[error("failed to accept peer: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Connecting to the rendezvous point failed
    #[error("failed to connect: {0}")]
    ConnectFailed(#[source] std::io::Error),
}

impl IoError {
    /// UI result code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            IoError::PeekFailed(_) => ErrorCode::PeekPipeFailed,
            IoError::ReadFailed(_) | IoError::Closed => ErrorCode::ReadPipeFailed,
            IoError::WriteFailed(_) | IoError::ShortWrite { .. } => ErrorCode::WritePipeFailed,
            IoError::BufferTooSmall(_) => ErrorCode::ReadBufferTooSmall,
            IoError::Frame(err) => ErrorCode::from(err.clone()),
            IoError::IoWaitTimeout => ErrorCode::IoWaitTimeout,
            IoError::CreateServerFailed(_) => ErrorCode::FailCreateServerPipe,
            IoError::AcceptFailed(_) | IoError::ConnectFailed(_) => ErrorCode::ClientConnectFailed,
        }
    }
}
