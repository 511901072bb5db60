//! Typed payload encodings.
//!
//! All fields are little-endian. Enums occupy 4 bytes, strings are
//! NUL-terminated and an absent string is encoded as a single `0`. Variable
//! length lists repeat their record until the payload is exhausted.

use crate::error::CodecError;
use crate::message::{Message, MessageId};
use bytes::{BufMut, BytesMut};

pub mod broker;
pub mod haccess;
pub mod status;
pub mod tunnel;

pub use broker::{Broker, BrokerList};
pub use haccess::{
    DeviceMapping, DeviceMappingStatus, FeatureStatus, HaccessConfigInfo, HaccessStatusInfo,
};
pub use status::{GogocStatus, StatusInfo};
pub use tunnel::{TunnelInfo, TunnelType};

/// A payload bound to one message id
pub trait Payload: Sized {
    /// Message id carrying this payload
    const ID: MessageId;

    /// Append the encoded payload to `buf`
    fn encode_into(&self, buf: &mut BytesMut);

    /// Decode from a complete payload
    fn decode(payload: &[u8]) -> Result<Self, CodecError>;

    /// Encode into a framed message
    fn to_message(&self) -> Result<Message, CodecError> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        Ok(Message::new(Self::ID, buf.freeze())?)
    }
}

/// Enums carried as 4-byte discriminants
pub(crate) trait WireEnum: Sized + Copy {
    const FIELD: &'static str;

    fn from_raw(raw: u32) -> Option<Self>;

    fn to_raw(self) -> u32;
}

/// Bounds-checked cursor over a payload
#[derive(Debug)]
pub(crate) struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.buf.len() - self.pos;
        if remaining < n {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: n - remaining,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub(crate) fn enumeration<E: WireEnum>(&mut self) -> Result<E, CodecError> {
        let raw = self.u32()?;
        E::from_raw(raw).ok_or(CodecError::InvalidEnum {
            field: E::FIELD,
            value: raw,
        })
    }

    pub(crate) fn string(&mut self) -> Result<String, CodecError> {
        let start = self.pos;
        let rest = &self.buf[start..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::Unterminated(start))?;
        let text = std::str::from_utf8(&rest[..nul])
            .map_err(|_| CodecError::InvalidString(start))?
            .to_string();
        self.pos += nul + 1;
        Ok(text)
    }

    pub(crate) fn finish(self) -> Result<(), CodecError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            n => Err(CodecError::Trailing(n)),
        }
    }
}

pub(crate) fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
}

pub(crate) fn put_enum<E: WireEnum>(buf: &mut BytesMut, value: E) {
    buf.put_u32_le(value.to_raw());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_bounds() {
        let mut reader = PayloadReader::new(&[1, 0, 0]);
        assert_eq!(
            reader.i32(),
            Err(CodecError::Truncated { offset: 0, needed: 1 })
        );
        assert_eq!(reader.i16().unwrap(), 1);
        assert_eq!(reader.finish(), Err(CodecError::Trailing(1)));
    }

    #[test]
    fn test_reader_strings() {
        let mut reader = PayloadReader::new(b"gw.example\0\0tail");
        assert_eq!(reader.string().unwrap(), "gw.example");
        assert_eq!(reader.string().unwrap(), "");
        assert_eq!(reader.string(), Err(CodecError::Unterminated(12)));
    }
}
