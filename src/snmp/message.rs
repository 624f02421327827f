//! SNMP wire model: values, varbinds, PDUs, messages

use std::fmt;

use crate::snmp::oid::Oid;

/// SNMP protocol version carried in the message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::V1),
            1 => Some(Self::V2c),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i64 {
        match self {
            Self::V1 => 0,
            Self::V2c => 1,
        }
    }
}

impl fmt::Display for SnmpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2c => write!(f, "v2c"),
        }
    }
}

/// PDU kinds the simulator accepts or emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest,
    GetNextRequest,
    GetResponse,
    GetBulkRequest,
}

impl PduType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::GetResponse),
            0xA5 => Some(Self::GetBulkRequest),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::GetRequest => 0xA0,
            Self::GetNextRequest => 0xA1,
            Self::GetResponse => 0xA2,
            Self::GetBulkRequest => 0xA5,
        }
    }
}

/// SNMP error-status codes used by v1/v2c responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
}

impl ErrorStatus {
    pub fn from_wire(value: i64) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            _ => Self::GenErr,
        }
    }

    pub fn to_wire(self) -> i64 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
        }
    }
}

/// A typed SNMP value.
///
/// The exception variants (`NoSuchObject`, `NoSuchInstance`, `EndOfMibView`)
/// are only legal inside response varbinds and are never stored in a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i32),
    OctetString(Vec<u8>),
    Null,
    ObjectIdentifier(Oid),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl SnmpValue {
    /// True for the context-class exception variants.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "Integer32",
            Self::OctetString(_) => "OctetString",
            Self::Null => "Null",
            Self::ObjectIdentifier(_) => "ObjectIdentifier",
            Self::Counter32(_) => "Counter32",
            Self::Gauge32(_) => "Gauge32",
            Self::TimeTicks(_) => "TimeTicks",
            Self::Counter64(_) => "Counter64",
            Self::NoSuchObject => "NoSuchObject",
            Self::NoSuchInstance => "NoSuchInstance",
            Self::EndOfMibView => "EndOfMibView",
        }
    }
}

impl fmt::Display for SnmpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::OctetString(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => write!(f, "{text}"),
                Err(_) => {
                    // hex-encode non-UTF8 strings
                    for byte in bytes {
                        write!(f, "{byte:02X}")?;
                    }
                    Ok(())
                }
            },
            Self::Null => write!(f, "NULL"),
            Self::ObjectIdentifier(oid) => write!(f, "{oid}"),
            Self::Counter32(v) | Self::Gauge32(v) => write!(f, "{v}"),
            Self::TimeTicks(v) => {
                let secs = v / 100;
                let days = secs / 86_400;
                let hours = (secs % 86_400) / 3_600;
                let mins = (secs % 3_600) / 60;
                let s = secs % 60;
                write!(f, "{days}d {hours}h {mins}m {s}s")
            }
            Self::Counter64(v) => write!(f, "{v}"),
            Self::NoSuchObject => write!(f, "noSuchObject"),
            Self::NoSuchInstance => write!(f, "noSuchInstance"),
            Self::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

/// A variable binding. Requests carry `Null` values; responses carry the
/// typed value (or an exception variant in v2c).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: SnmpValue,
}

impl VarBind {
    pub fn new(oid: Oid, value: SnmpValue) -> Self {
        Self { oid, value }
    }

    pub fn null(oid: Oid) -> Self {
        Self {
            oid,
            value: SnmpValue::Null,
        }
    }
}

/// A decoded SNMP PDU.
///
/// For `GetBulkRequest`, `error_status` carries `non_repeaters` and
/// `error_index` carries `max_repetitions`; the accessors below make that
/// overlay explicit.
#[derive(Debug, Clone, PartialEq)]
pub struct SnmpPdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

impl SnmpPdu {
    pub fn request(pdu_type: PduType, request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    pub fn response(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::GetResponse,
            request_id,
            error_status: ErrorStatus::NoError.to_wire(),
            error_index: 0,
            varbinds,
        }
    }

    pub fn error_response(
        request_id: i32,
        status: ErrorStatus,
        index: i64,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Self {
            pdu_type: PduType::GetResponse,
            request_id,
            error_status: status.to_wire(),
            error_index: index,
            varbinds,
        }
    }

    pub fn status(&self) -> ErrorStatus {
        ErrorStatus::from_wire(self.error_status)
    }

    /// GETBULK view of the error-status field.
    pub fn non_repeaters(&self) -> i64 {
        self.error_status
    }

    /// GETBULK view of the error-index field.
    pub fn max_repetitions(&self) -> i64 {
        self.error_index
    }
}

/// A complete SNMP message.
#[derive(Debug, Clone, PartialEq)]
pub struct SnmpMessage {
    pub version: SnmpVersion,
    pub community: Vec<u8>,
    pub pdu: SnmpPdu,
}

impl SnmpMessage {
    pub fn new(version: SnmpVersion, community: impl Into<Vec<u8>>, pdu: SnmpPdu) -> Self {
        Self {
            version,
            community: community.into(),
            pdu,
        }
    }

    pub fn community_str(&self) -> String {
        String::from_utf8_lossy(&self.community).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_wire_mapping() {
        assert_eq!(SnmpVersion::from_wire(0), Some(SnmpVersion::V1));
        assert_eq!(SnmpVersion::from_wire(1), Some(SnmpVersion::V2c));
        assert_eq!(SnmpVersion::from_wire(3), None);
        assert_eq!(SnmpVersion::V2c.to_wire(), 1);
    }

    #[test]
    fn test_pdu_tag_mapping() {
        assert_eq!(PduType::from_tag(0xA0), Some(PduType::GetRequest));
        assert_eq!(PduType::from_tag(0xA5), Some(PduType::GetBulkRequest));
        assert_eq!(PduType::from_tag(0xA3), None); // SET is not supported
        assert_eq!(PduType::GetResponse.tag(), 0xA2);
    }

    #[test]
    fn test_exception_detection() {
        assert!(SnmpValue::EndOfMibView.is_exception());
        assert!(SnmpValue::NoSuchObject.is_exception());
        assert!(!SnmpValue::Null.is_exception());
        assert!(!SnmpValue::Counter32(0).is_exception());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(SnmpValue::Integer(-3).to_string(), "-3");
        assert_eq!(
            SnmpValue::OctetString(b"cable-modem0".to_vec()).to_string(),
            "cable-modem0"
        );
        assert_eq!(
            SnmpValue::OctetString(vec![0x00, 0xFF]).to_string(),
            "00FF"
        );
        assert_eq!(
            SnmpValue::ObjectIdentifier("1.3.6.1".parse().unwrap()).to_string(),
            "1.3.6.1"
        );
        // 1 day, 2 hours, 3 minutes, 4 seconds in centiseconds
        assert_eq!(
            SnmpValue::TimeTicks((86_400 + 7_200 + 180 + 4) * 100).to_string(),
            "1d 2h 3m 4s"
        );
        assert_eq!(SnmpValue::EndOfMibView.to_string(), "endOfMibView");
    }

    #[test]
    fn test_bulk_field_overlay() {
        let pdu = SnmpPdu {
            pdu_type: PduType::GetBulkRequest,
            request_id: 7,
            error_status: 1,
            error_index: 10,
            varbinds: vec![],
        };
        assert_eq!(pdu.non_repeaters(), 1);
        assert_eq!(pdu.max_repetitions(), 10);
    }
}
