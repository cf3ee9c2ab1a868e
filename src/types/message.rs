use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use super::constants::reserved_types;

/// The transport-agnostic message wrapper exchanged over the channel.
///
/// Every message carries a `type` discriminator; all remaining fields are
/// opaque to the channel and flattened into `fields`. Reserved types
/// (`ping`, `pong`, `identification`, `auth`, `error`) are special-cased by
/// the router; everything else is forwarded to subscribers by type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Read a field by name.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Build a timestamped ping with a matchable id.
    pub fn ping(id: u64) -> Self {
        Self::new(reserved_types::PING)
            .with_field("id", Value::from(id))
            .with_field("timestamp", Value::from(unix_millis()))
    }

    /// Build the pong reply to a server ping, echoing its id if present.
    pub fn pong(id: Option<&Value>) -> Self {
        let mut envelope =
            Self::new(reserved_types::PONG).with_field("timestamp", Value::from(unix_millis()));
        if let Some(id) = id {
            envelope = envelope.with_field("id", id.clone());
        }
        envelope
    }

    /// Build the identification envelope announcing our client id.
    pub fn identification(client_id: &str) -> Self {
        Self::new(reserved_types::IDENTIFICATION)
            .with_field("clientId", Value::from(client_id))
            .with_field("timestamp", Value::from(unix_millis()))
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip_preserves_unknown_fields() {
        let json = r#"{"type":"valuation_update","parcelId":"p-42","amount":125000}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();

        assert_eq!(envelope.kind, "valuation_update");
        assert_eq!(envelope.field("parcelId"), Some(&Value::from("p-42")));

        let serialized = serde_json::to_string(&envelope).unwrap();
        let reparsed: Envelope = serde_json::from_str(&serialized).unwrap();
        assert_eq!(envelope, reparsed);
    }

    #[test]
    fn test_envelope_type_field_name() {
        let envelope = Envelope::new("notification").with_field("body", Value::from("hi"));
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""type":"notification""#));
        assert!(json.contains(r#""body":"hi""#));
    }

    #[test]
    fn test_ping_carries_id_and_timestamp() {
        let ping = Envelope::ping(7);
        assert_eq!(ping.kind, "ping");
        assert_eq!(ping.field("id"), Some(&Value::from(7)));
        assert!(ping.field("timestamp").is_some());
    }

    #[test]
    fn test_pong_echoes_ping_id() {
        let ping = Envelope::ping(3);
        let pong = Envelope::pong(ping.field("id"));
        assert_eq!(pong.kind, "pong");
        assert_eq!(pong.field("id"), Some(&Value::from(3)));
    }
}
