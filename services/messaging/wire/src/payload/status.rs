//! Daemon status payload.

use super::{put_enum, Payload, PayloadReader, WireEnum};
use crate::error::CodecError;
use crate::message::MessageId;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Connection status reported by the daemon
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GogocStatus {
    /// Idle, waiting for a connect request
    DisconnectedIdle = 0,
    /// Gave up, will not retry
    DisconnectedNoRetry = 1,
    /// Disconnected after an error
    DisconnectedError = 2,
    /// HomeAccess setup failed
    DisconnectedHaccessSetupError = 3,
    /// HomeAccess could not expose devices
    DisconnectedHaccessExposeDevicesError = 4,
    /// Negotiating with the broker
    Connecting = 5,
    /// Tunnel is up
    Connected = 6,
}

impl WireEnum for GogocStatus {
    const FIELD: &'static str = "status";

    fn from_raw(raw: u32) -> Option<Self> {
        let status = match raw {
            0 => GogocStatus::DisconnectedIdle,
            1 => GogocStatus::DisconnectedNoRetry,
            2 => GogocStatus::DisconnectedError,
            3 => GogocStatus::DisconnectedHaccessSetupError,
            4 => GogocStatus::DisconnectedHaccessExposeDevicesError,
            5 => GogocStatus::Connecting,
            6 => GogocStatus::Connected,
            _ => return None,
        };
        Some(status)
    }

    fn to_raw(self) -> u32 {
        self as u32
    }
}

/// Status snapshot with the daemon's last result code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Connection status
    pub status: GogocStatus,
    /// Result code attached to the status
    pub code: i32,
}

impl StatusInfo {
    /// Create a new status snapshot
    pub fn new(status: GogocStatus, code: i32) -> Self {
        Self { status, code }
    }
}

impl Payload for StatusInfo {
    const ID: MessageId = MessageId::StatusInfo;

    fn encode_into(&self, buf: &mut BytesMut) {
        put_enum(buf, self.status);
        buf.put_i32_le(self.code);
    }

    fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PayloadReader::new(payload);
        let status = reader.enumeration()?;
        let code = reader.i32()?;
        reader.finish()?;
        Ok(Self { status, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_layout() {
        let info = StatusInfo::new(GogocStatus::Connected, -2);
        let msg = info.to_message().unwrap();

        assert_eq!(msg.id(), 0x0101);
        assert_eq!(&msg.payload()[..], &[6, 0, 0, 0, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(StatusInfo::decode(msg.payload()).unwrap(), info);
    }

    #[test]
    fn test_status_rejects_unknown_value() {
        let payload = [9, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            StatusInfo::decode(&payload),
            Err(CodecError::InvalidEnum { field: "status", value: 9 })
        );
    }
}
