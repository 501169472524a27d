//! Frame decoding into canonical records

use crate::events::UserDataEvent;
use binance_types::{BinanceError, BinanceResult, FlatRecord, KeyedRecord};
use serde_json::Value;

/// Which shape a session expects its frames in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeSpec {
    /// One JSON object per frame
    Flat,
    /// A JSON array of objects, each identified by `key_field`
    KeyedArray { key_field: String },
    /// Discriminator-routed user-data events
    UserData,
}

impl DecodeSpec {
    /// Array-of-objects shape keyed by `key_field`
    pub fn keyed(key_field: impl Into<String>) -> Self {
        Self::KeyedArray {
            key_field: key_field.into(),
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    Flat(FlatRecord),
    Keyed(KeyedRecord),
    UserData(UserDataEvent),
}

impl StreamRecord {
    /// Get the flat record, if this is one
    pub fn as_flat(&self) -> Option<&FlatRecord> {
        match self {
            Self::Flat(record) => Some(record),
            _ => None,
        }
    }

    /// Get the keyed record, if this is one
    pub fn as_keyed(&self) -> Option<&KeyedRecord> {
        match self {
            Self::Keyed(record) => Some(record),
            _ => None,
        }
    }

    /// Get the user-data event, if this is one
    pub fn as_user_data(&self) -> Option<&UserDataEvent> {
        match self {
            Self::UserData(event) => Some(event),
            _ => None,
        }
    }
}

/// Decode one text frame
///
/// # Errors
/// Returns [`BinanceError::Protocol`] carrying the raw frame if it is not
/// JSON or does not have the shape `spec` expects.
pub fn decode(frame: &str, spec: &DecodeSpec) -> BinanceResult<StreamRecord> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|e| BinanceError::protocol(format!("frame is not JSON: {}", e), Some(frame)))?;

    let record = match spec {
        DecodeSpec::Flat => FlatRecord::from_value(&value).map(StreamRecord::Flat),
        DecodeSpec::KeyedArray { key_field } => match value.as_array() {
            Some(elements) => KeyedRecord::from_objects(elements, key_field).map(StreamRecord::Keyed),
            None => Err(BinanceError::protocol("expected a JSON array", None)),
        },
        DecodeSpec::UserData => UserDataEvent::parse(&value).map(StreamRecord::UserData),
    };

    record.map_err(|e| match e {
        BinanceError::Protocol { message, .. } => BinanceError::protocol(message, Some(frame)),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_frame() {
        let record = decode(r#"{"s":"BTCUSDT","p":"50000.00","q":"1.5"}"#, &DecodeSpec::Flat).unwrap();
        let flat = record.as_flat().unwrap();

        assert_eq!(flat.len(), 3);
        assert_eq!(flat.get("s"), Some("BTCUSDT"));
        assert_eq!(flat.get("p"), Some("50000.00"));
        assert_eq!(flat.get("q"), Some("1.5"));
    }

    #[test]
    fn test_flat_frame_stringifies_values() {
        let frame = r#"{"e":"kline","E":1638747660000,"x":false,"k":{"i":"1m","c":"0.0010"}}"#;
        let record = decode(frame, &DecodeSpec::Flat).unwrap();
        let flat = record.as_flat().unwrap();

        assert_eq!(flat.get("E"), Some("1638747660000"));
        assert_eq!(flat.get("x"), Some("false"));
        assert_eq!(flat.nested("k").unwrap().get("c"), Some("0.0010"));
    }

    #[test]
    fn test_keyed_frame() {
        let frame = r#"[{"s":"AAA","c":"1.0"},{"s":"BBB","c":"2.0"}]"#;
        let record = decode(frame, &DecodeSpec::keyed("s")).unwrap();
        let keyed = record.as_keyed().unwrap();

        let mut keys: Vec<&str> = keyed.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["AAA", "BBB"]);
        assert_eq!(keyed.get("AAA").and_then(|r| r.get("c")), Some("1.0"));
        assert_eq!(keyed.get("BBB").and_then(|r| r.get("c")), Some("2.0"));
    }

    #[test]
    fn test_user_data_frame() {
        let frame = r#"{"e":"listenKeyExpired","E":1576653824250}"#;
        let record = decode(frame, &DecodeSpec::UserData).unwrap();
        assert_eq!(record.as_user_data().unwrap().event_type(), "listenKeyExpired");
    }

    #[test]
    fn test_protocol_errors_carry_frame() {
        let err = decode("not json", &DecodeSpec::Flat).unwrap_err();
        assert!(err.is_protocol_error());
        assert_eq!(err.raw(), Some("not json"));

        let err = decode(r#"{"s":"AAA"}"#, &DecodeSpec::keyed("s")).unwrap_err();
        assert_eq!(err.raw(), Some(r#"{"s":"AAA"}"#));

        let err = decode(r#"[{"c":"1.0"}]"#, &DecodeSpec::keyed("s")).unwrap_err();
        assert!(err.is_protocol_error());

        assert!(decode("[1,2]", &DecodeSpec::Flat).is_err());
        assert!(decode(r#"{"E":1}"#, &DecodeSpec::UserData).is_err());
    }
}
