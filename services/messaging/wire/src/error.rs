//! Wire error types.

use thiserror::Error;

/// Framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes for a complete header
    #[error("incomplete frame")]
    Incomplete,

    /// Payload is at or above the maximum payload size
    #[error("payload too large: {0}")]
    PayloadTooLarge(usize),

    /// Declared payload length disagrees with the bytes present
    #[error("length mismatch: declared {declared}, got {actual}")]
    LengthMismatch {
        /// Length carried in the header
        declared: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Unknown message id
    #[error("unknown message id {0:#06x}")]
    UnknownId(u16),

    /// Unknown result code
    #[error("unknown code {0:#x}")]
    UnknownCode(u32),
}

/// Typed payload decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload ended before a fixed-size field
    #[error("payload truncated at offset {offset}, need {needed} more bytes")]
    Truncated {
        /// Cursor position when the read failed
        offset: usize,
        /// Bytes the field required
        needed: usize,
    },

    /// String without its NUL terminator
    #[error("unterminated string at offset {0}")]
    Unterminated(usize),

    /// String bytes are not UTF-8
    #[error("invalid string at offset {0}")]
    InvalidString(usize),

    /// Enum discriminant out of range
    #[error("invalid {field} value {value}")]
    InvalidEnum {
        /// Field being decoded
        field: &'static str,
        /// Raw value read
        value: u32,
    },

    /// Payload carried data after the last field
    #[error("{0} trailing bytes")]
    Trailing(usize),

    /// Encoded payload does not fit in one frame
    #[error(transparent)]
    Frame(#[from] FrameError),
}
