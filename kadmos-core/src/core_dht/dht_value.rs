/*
    DhtValue - typed, versioned value payloads

    Responsibilities:
    A value is a type tag, a version and an opaque payload. The empty value
    (type ANY, version 0.0, no payload) doubles as the delete marker: storing
    it removes whatever the creator had stored under the key.

    Values serialize themselves into a compact frame:

        type code (u32 BE) | major (u8) | minor (u8) | length (u16 BE) | payload

    Decoding goes through `ValueFactoryRegistry::read_value` so the type code
    can be canonicalized and the bytes routed to the right factory.
*/

use std::fmt;
use std::sync::{Arc, LazyLock};

use super::errors::{DhtError, DhtResult};
use super::value_type::ValueType;

/// Size of the serialized frame header
pub const VALUE_HEADER_LEN: usize = 8;

/// Largest payload a value may carry
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const ZERO: Version = Version { major: 0, minor: 0 };

    pub const fn new(major: u8, minor: u8) -> Self {
        Version { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

static EMPTY_VALUE: LazyLock<DhtValue> = LazyLock::new(|| DhtValue {
    value_type: ValueType::any(),
    version: Version::ZERO,
    payload: Arc::from(Vec::new()),
});

/// A typed value as stored in the database and published to the network
#[derive(Clone, PartialEq, Eq)]
pub struct DhtValue {
    value_type: ValueType,
    version: Version,
    payload: Arc<[u8]>,
}

impl DhtValue {
    /// Create a value. Payloads that do not fit the length field are rejected.
    pub fn new(value_type: ValueType, version: Version, payload: Vec<u8>) -> DhtResult<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(DhtError::Encode(format!(
                "payload of {} bytes exceeds maximum {}",
                payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }

        Ok(DhtValue { value_type, version, payload: Arc::from(payload) })
    }

    /// The canonical empty value
    pub fn empty() -> DhtValue {
        EMPTY_VALUE.clone()
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Empty values are delete markers
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Serialize into the value frame
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(VALUE_HEADER_LEN + self.size());
        self.write_to(&mut out);
        out
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value_type.code().to_be_bytes());
        out.push(self.version.major);
        out.push(self.version.minor);
        // new() guarantees the length fits
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
    }
}

/// Parsed but not yet canonicalized value frame
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ValueFrame<'a> {
    pub code: u32,
    pub version: Version,
    pub payload: &'a [u8],
}

impl<'a> ValueFrame<'a> {
    pub(crate) fn parse(bytes: &'a [u8]) -> DhtResult<Self> {
        if bytes.len() < VALUE_HEADER_LEN {
            return Err(DhtError::Decode(format!(
                "value frame too short: {} bytes",
                bytes.len()
            )));
        }

        let code = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let version = Version::new(bytes[4], bytes[5]);
        let length = u16::from_be_bytes([bytes[6], bytes[7]]) as usize;
        let payload = &bytes[VALUE_HEADER_LEN..];

        if payload.len() != length {
            return Err(DhtError::Decode(format!(
                "value frame declares {} payload bytes but carries {}",
                length,
                payload.len()
            )));
        }

        Ok(ValueFrame { code, version, payload })
    }
}

impl fmt::Debug for DhtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhtValue")
            .field("type", &self.value_type)
            .field("version", &self.version)
            .field("size", &self.size())
            .finish()
    }
}

impl fmt::Display for DhtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "<empty>");
        }
        match std::str::from_utf8(&self.payload) {
            Ok(text) if self.value_type.code() == super::value_type::TEXT_CODE => {
                write!(f, "{} v{} \"{}\"", self.value_type, self.version, text)
            }
            _ => write!(f, "{} v{} {} bytes", self.value_type, self.version, self.size()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_value() {
        let empty = DhtValue::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.size(), 0);
        assert!(empty.value_type().is_any());
        assert_eq!(empty.version(), Version::ZERO);
        assert_eq!(format!("{}", empty), "<empty>");
    }

    #[test]
    fn test_value_accessors() {
        let value = DhtValue::new(ValueType::text(), Version::new(1, 2), b"hello".to_vec()).unwrap();
        assert_eq!(value.size(), 5);
        assert_eq!(value.payload(), b"hello");
        assert_eq!(value.version().to_string(), "1.2");
        assert!(!value.is_empty());
        assert!(format!("{}", value).contains("\"hello\""));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = DhtValue::new(ValueType::binary(), Version::ZERO, vec![0u8; MAX_PAYLOAD_LEN + 1]);
        assert!(matches!(result, Err(DhtError::Encode(_))));
    }

    #[test]
    fn test_frame_layout() {
        let value = DhtValue::new(ValueType::text(), Version::new(0, 1), b"abc".to_vec()).unwrap();
        let bytes = value.to_bytes();

        assert_eq!(&bytes[..4], b"TEXT");
        assert_eq!(&bytes[4..6], &[0, 1]);
        assert_eq!(&bytes[6..8], &[0, 3]);
        assert_eq!(&bytes[8..], b"abc");

        let frame = ValueFrame::parse(&bytes).unwrap();
        assert_eq!(frame.code, super::super::value_type::TEXT_CODE);
        assert_eq!(frame.payload, b"abc");
    }

    #[test]
    fn test_frame_rejects_truncated_input() {
        assert!(matches!(ValueFrame::parse(b"TEXT"), Err(DhtError::Decode(_))));

        let mut bytes = DhtValue::new(ValueType::text(), Version::ZERO, b"abc".to_vec())
            .unwrap()
            .to_bytes();
        bytes.pop();
        assert!(matches!(ValueFrame::parse(&bytes), Err(DhtError::Decode(_))));
    }
}
