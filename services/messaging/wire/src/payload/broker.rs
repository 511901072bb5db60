//! Broker list payload.

use super::{put_string, Payload, PayloadReader};
use crate::error::CodecError;
use crate::message::MessageId;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// A candidate broker and its measured distance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broker {
    /// Broker address
    pub address: String,
    /// Distance metric, lower is closer
    pub distance: i32,
}

impl Broker {
    /// Create a new broker entry
    pub fn new(address: impl Into<String>, distance: i32) -> Self {
        Self {
            address: address.into(),
            distance,
        }
    }
}

/// Ordered list of brokers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerList(pub Vec<Broker>);

impl BrokerList {
    /// Number of brokers
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in list order
    pub fn iter(&self) -> std::slice::Iter<'_, Broker> {
        self.0.iter()
    }
}

impl From<Vec<Broker>> for BrokerList {
    fn from(brokers: Vec<Broker>) -> Self {
        Self(brokers)
    }
}

impl Payload for BrokerList {
    const ID: MessageId = MessageId::BrokerList;

    fn encode_into(&self, buf: &mut BytesMut) {
        for broker in &self.0 {
            put_string(buf, &broker.address);
            buf.put_i32_le(broker.distance);
        }
    }

    fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PayloadReader::new(payload);
        let mut brokers = Vec::new();
        while !reader.is_empty() {
            let address = reader.string()?;
            let distance = reader.i32()?;
            brokers.push(Broker { address, distance });
        }
        Ok(Self(brokers))
    }
}
