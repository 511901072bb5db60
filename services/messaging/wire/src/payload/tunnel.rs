//! Tunnel details payload.

use super::{put_enum, put_string, Payload, PayloadReader, WireEnum};
use crate::error::CodecError;
use crate::message::MessageId;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Encapsulation used by the tunnel
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunnelType {
    /// IPv6 in IPv4
    #[default]
    V6V4 = 0,
    /// IPv6 in UDP over IPv4
    V6UdpV4 = 1,
    /// IPv4 in IPv6
    V4V6 = 2,
}

impl WireEnum for TunnelType {
    const FIELD: &'static str = "tunnel_type";

    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(TunnelType::V6V4),
            1 => Some(TunnelType::V6UdpV4),
            2 => Some(TunnelType::V4V6),
            _ => None,
        }
    }

    fn to_raw(self) -> u32 {
        self as u32
    }
}

/// Details of the established tunnel. Empty strings mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelInfo {
    /// Broker that granted the tunnel
    pub broker_name: String,
    /// Encapsulation type
    pub tunnel_type: TunnelType,
    /// Local IPv4 endpoint
    pub local_ipv4: String,
    /// Local IPv6 endpoint
    pub local_ipv6: String,
    /// Remote IPv4 endpoint
    pub remote_ipv4: String,
    /// Remote IPv6 endpoint
    pub remote_ipv6: String,
    /// Delegated prefix, if any
    pub delegated_prefix: String,
    /// DNS domain assigned to the user
    pub user_domain: String,
    /// Time the tunnel came up, seconds since the epoch
    pub uptime: i64,
}

impl Payload for TunnelInfo {
    const ID: MessageId = MessageId::TunnelInfo;

    fn encode_into(&self, buf: &mut BytesMut) {
        put_string(buf, &self.broker_name);
        put_enum(buf, self.tunnel_type);
        put_string(buf, &self.local_ipv4);
        put_string(buf, &self.local_ipv6);
        put_string(buf, &self.remote_ipv4);
        put_string(buf, &self.remote_ipv6);
        put_string(buf, &self.delegated_prefix);
        put_string(buf, &self.user_domain);
        buf.put_i64_le(self.uptime);
    }

    fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PayloadReader::new(payload);
        let info = Self {
            broker_name: reader.string()?,
            tunnel_type: reader.enumeration()?,
            local_ipv4: reader.string()?,
            local_ipv6: reader.string()?,
            remote_ipv4: reader.string()?,
            remote_ipv6: reader.string()?,
            delegated_prefix: reader.string()?,
            user_domain: reader.string()?,
            uptime: reader.i64()?,
        };
        reader.finish()?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TunnelInfo {
        TunnelInfo {
            broker_name: "broker.freenet6.net".to_string(),
            tunnel_type: TunnelType::V6UdpV4,
            local_ipv4: "192.0.2.10".to_string(),
            local_ipv6: "2001:db8:1::2".to_string(),
            remote_ipv4: "198.51.100.1".to_string(),
            remote_ipv6: "2001:db8:1::1".to_string(),
            delegated_prefix: "2001:db8:100::/56".to_string(),
            user_domain: "alice.broker.freenet6.net".to_string(),
            uptime: 1_262_304_000,
        }
    }

    #[test]
    fn test_tunnel_round_trip() {
        let info = sample();
        let msg = info.to_message().unwrap();
        assert_eq!(TunnelInfo::decode(msg.payload()).unwrap(), info);
    }

    #[test]
    fn test_absent_strings_are_single_nul() {
        let info = TunnelInfo {
            uptime: 7,
            ..TunnelInfo::default()
        };
        let msg = info.to_message().unwrap();

        // 8 empty strings + enum + timestamp
        assert_eq!(msg.payload().len(), 8 + 4 + 8);
        assert_eq!(msg.payload()[0], 0);
        assert_eq!(TunnelInfo::decode(msg.payload()).unwrap(), info);
    }

    #[test]
    fn test_missing_timestamp() {
        let msg = sample().to_message().unwrap();
        let cut = &msg.payload()[..msg.payload().len() - 3];
        assert!(matches!(
            TunnelInfo::decode(cut),
            Err(CodecError::Truncated { needed: 3, .. })
        ));
    }
}
