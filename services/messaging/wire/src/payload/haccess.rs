//! HomeAccess configuration and status payloads.

use super::{put_enum, put_string, Payload, PayloadReader, WireEnum};
use crate::error::CodecError;
use crate::message::MessageId;
use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

/// Outcome of a HomeAccess feature
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureStatus {
    /// Feature applied
    #[default]
    Success = 0,
    /// Feature failed
    Error = 1,
}

impl WireEnum for FeatureStatus {
    const FIELD: &'static str = "feature_status";

    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(FeatureStatus::Success),
            1 => Some(FeatureStatus::Error),
            _ => None,
        }
    }

    fn to_raw(self) -> u32 {
        self as u32
    }
}

/// Per-device mapping outcome
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceMappingStatus {
    /// Mapping published
    Success = 0,
    /// Mapping failed
    Error = 1,
    /// Device seen for the first time
    New = 2,
    /// Device address changed
    Modified = 3,
    /// Not determined
    Unknown = 4,
}

impl WireEnum for DeviceMappingStatus {
    const FIELD: &'static str = "device_mapping_status";

    fn from_raw(raw: u32) -> Option<Self> {
        let status = match raw {
            0 => DeviceMappingStatus::Success,
            1 => DeviceMappingStatus::Error,
            2 => DeviceMappingStatus::New,
            3 => DeviceMappingStatus::Modified,
            4 => DeviceMappingStatus::Unknown,
            _ => return None,
        };
        Some(status)
    }

    fn to_raw(self) -> u32 {
        self as u32
    }
}

/// HomeAccess settings pushed by the GUI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaccessConfigInfo {
    /// Web server document root
    pub document_root: String,
    /// Proxy feature toggle
    pub proxy_enabled: bool,
    /// Web server feature toggle
    pub web_enabled: bool,
    /// Device mapping file changed since last push
    pub device_mapping_changed: bool,
}

impl Payload for HaccessConfigInfo {
    const ID: MessageId = MessageId::HaccessConfigInfo;

    fn encode_into(&self, buf: &mut BytesMut) {
        put_string(buf, &self.document_root);
        buf.put_i16_le(self.proxy_enabled as i16);
        buf.put_i16_le(self.web_enabled as i16);
        buf.put_i16_le(self.device_mapping_changed as i16);
    }

    fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PayloadReader::new(payload);
        let info = Self {
            document_root: reader.string()?,
            proxy_enabled: reader.i16()? != 0,
            web_enabled: reader.i16()? != 0,
            device_mapping_changed: reader.i16()? != 0,
        };
        reader.finish()?;
        Ok(info)
    }
}

/// A mapped device and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMapping {
    /// Device host name
    pub name: String,
    /// Mapping outcome
    pub status: DeviceMappingStatus,
}

/// HomeAccess status reported by the daemon
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaccessStatusInfo {
    /// Proxy feature outcome
    pub proxy_status: FeatureStatus,
    /// Web server feature outcome
    pub web_status: FeatureStatus,
    /// Device mapping module outcome
    pub device_mapping_status: FeatureStatus,
    /// Per-device results, in daemon order
    pub mappings: Vec<DeviceMapping>,
}

impl Payload for HaccessStatusInfo {
    const ID: MessageId = MessageId::HaccessStatusInfo;

    fn encode_into(&self, buf: &mut BytesMut) {
        put_enum(buf, self.proxy_status);
        put_enum(buf, self.web_status);
        put_enum(buf, self.device_mapping_status);
        for mapping in &self.mappings {
            put_string(buf, &mapping.name);
            put_enum(buf, mapping.status);
        }
    }

    fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        let mut reader = PayloadReader::new(payload);
        let proxy_status = reader.enumeration()?;
        let web_status = reader.enumeration()?;
        let device_mapping_status = reader.enumeration()?;

        let mut mappings = Vec::new();
        while !reader.is_empty() {
            let name = reader.string()?;
            let status = reader.enumeration()?;
            mappings.push(DeviceMapping { name, status });
        }

        Ok(Self {
            proxy_status,
            web_status,
            device_mapping_status,
            mappings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_layout() {
        let cfg = HaccessConfigInfo {
            document_root: "/srv/www".to_string(),
            proxy_enabled: true,
            web_enabled: false,
            device_mapping_changed: true,
        };
        let msg = cfg.to_message().unwrap();

        assert_eq!(msg.id(), 0x0004);
        assert_eq!(&msg.payload()[..9], b"/srv/www\0");
        assert_eq!(&msg.payload()[9..], &[1, 0, 0, 0, 1, 0]);
        assert_eq!(HaccessConfigInfo::decode(msg.payload()).unwrap(), cfg);
    }

    #[test]
    fn test_status_with_mappings() {
        let status = HaccessStatusInfo {
            proxy_status: FeatureStatus::Success,
            web_status: FeatureStatus::Error,
            device_mapping_status: FeatureStatus::Success,
            mappings: vec![
                DeviceMapping {
                    name: "nas".to_string(),
                    status: DeviceMappingStatus::New,
                },
                DeviceMapping {
                    name: "camera".to_string(),
                    status: DeviceMappingStatus::Error,
                },
            ],
        };

        let msg = status.to_message().unwrap();
        assert_eq!(HaccessStatusInfo::decode(msg.payload()).unwrap(), status);
    }

    #[test]
    fn test_bad_mapping_status() {
        let mut buf = BytesMut::new();
        HaccessStatusInfo::default().encode_into(&mut buf);
        put_string(&mut buf, "printer");
        buf.put_u32_le(42);

        assert_eq!(
            HaccessStatusInfo::decode(&buf),
            Err(CodecError::InvalidEnum {
                field: "device_mapping_status",
                value: 42
            })
        );
    }
}
