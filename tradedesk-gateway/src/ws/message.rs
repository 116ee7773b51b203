//! Wire message type and JSON codec.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tradedesk_core::error::NetworkError;

/// Message type sent by the heartbeat.
pub const PING_TYPE: &str = "ping";

/// Message type expected in reply to a heartbeat probe.
pub const PONG_TYPE: &str = "pong";

/// Application-level message carried in one text frame.
///
/// ```json
/// { "type": "price_update", "data": {...}, "channel": "prices", "timestamp": "..." }
/// ```
///
/// The payload in `data` is opaque to the connection layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message type tag.
    #[serde(rename = "type")]
    pub kind: String,

    /// Opaque payload.
    #[serde(default)]
    pub data: Value,

    /// Routing channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Instrument symbol, used for routing when no channel is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    /// RFC 3339 timestamp as supplied by the sender.
    #[serde(default)]
    pub timestamp: String,
}

impl Message {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            channel: None,
            symbol: None,
            timestamp: now_timestamp(),
        }
    }

    /// Creates a heartbeat probe.
    #[must_use]
    pub fn ping() -> Self {
        Self::new(PING_TYPE, Value::Null)
    }

    /// Creates a heartbeat reply.
    #[must_use]
    pub fn pong() -> Self {
        Self::new(PONG_TYPE, Value::Null)
    }

    /// Sets the routing channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Sets the instrument symbol.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Returns the key used to match subscriptions: channel, else symbol, else type.
    #[must_use]
    pub fn route_key(&self) -> &str {
        self.channel
            .as_deref()
            .or(self.symbol.as_deref())
            .unwrap_or(&self.kind)
    }

    /// Returns true if this is a heartbeat probe.
    #[must_use]
    pub fn is_ping(&self) -> bool {
        self.kind == PING_TYPE
    }

    /// Returns true if this is a heartbeat reply.
    #[must_use]
    pub fn is_pong(&self) -> bool {
        self.kind == PONG_TYPE
    }

    /// Deserializes the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::MalformedPayload` if the payload does not match `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        T::deserialize(&self.data).map_err(|e| NetworkError::MalformedPayload {
            reason: format!("'{}' payload: {e}", self.kind),
        })
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Encodes and decodes [`Message`]s as JSON text frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Creates a new message codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encodes a message to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::WebSocket` if serialization fails.
    pub fn encode(&self, message: &Message) -> Result<String, NetworkError> {
        serde_json::to_string(message)
            .map_err(|e| NetworkError::websocket(format!("Failed to serialize message: {e}")))
    }

    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::MalformedPayload` if the frame is not a message object.
    pub fn decode(&self, text: &str) -> Result<Message, NetworkError> {
        serde_json::from_str(text).map_err(|e| NetworkError::MalformedPayload {
            reason: e.to_string(),
        })
    }

    /// Decodes a binary frame holding UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::MalformedPayload` if the bytes are not UTF-8 or not a message.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<Message, NetworkError> {
        let text = std::str::from_utf8(bytes).map_err(|e| NetworkError::MalformedPayload {
            reason: format!("binary frame is not UTF-8: {e}"),
        })?;
        self.decode(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_route_key_precedence() {
        let msg = Message::new("price_update", Value::Null);
        assert_eq!(msg.route_key(), "price_update");

        let msg = msg.with_symbol("BTC-USD");
        assert_eq!(msg.route_key(), "BTC-USD");

        let msg = msg.with_channel("prices");
        assert_eq!(msg.route_key(), "prices");
    }

    #[test]
    fn test_ping_pong_helpers() {
        assert!(Message::ping().is_ping());
        assert!(Message::pong().is_pong());
        assert!(!Message::ping().is_pong());
        assert!(Message::ping().data.is_null());
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let msg = Message::ping();
        assert!(chrono::DateTime::parse_from_rfc3339(&msg.timestamp).is_ok());
    }

    #[test]
    fn test_encode_wire_shape() {
        let msg = Message::new("order", json!({"side": "buy"})).with_channel("orders");
        let text = MessageCodec::new().encode(&msg).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "order");
        assert_eq!(value["channel"], "orders");
        assert_eq!(value["data"]["side"], "buy");
        assert!(value.get("symbol").is_none());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_decode_symbol_message() {
        let text = r#"{"type":"price_update","data":{"price":101.5},"symbol":"ETH-USD","timestamp":"2024-01-01T00:00:00Z"}"#;
        let msg = MessageCodec::new().decode(text).unwrap();

        assert_eq!(msg.kind, "price_update");
        assert_eq!(msg.symbol.as_deref(), Some("ETH-USD"));
        assert_eq!(msg.channel, None);
        assert_eq!(msg.data["price"], 101.5);
    }

    #[test]
    fn test_decode_tolerates_missing_optional_fields() {
        let msg = MessageCodec::new().decode(r#"{"type":"pong"}"#).unwrap();
        assert!(msg.is_pong());
        assert!(msg.data.is_null());
        assert!(msg.timestamp.is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let codec = MessageCodec::new();
        for text in ["not json", "[1,2,3]", r#"{"data":1}"#, r#"{"type":7}"#] {
            assert!(
                matches!(codec.decode(text), Err(NetworkError::MalformedPayload { .. })),
                "accepted {text}"
            );
        }
    }

    #[test]
    fn test_decode_bytes() {
        let codec = MessageCodec::new();
        assert!(codec.decode_bytes(br#"{"type":"ack"}"#).is_ok());
        assert!(matches!(
            codec.decode_bytes(&[0xff, 0xfe]),
            Err(NetworkError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_data_as() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Balance {
            total: f64,
        }

        let msg = Message::new("balance_update", json!({"total": 1250.0}));
        assert_eq!(msg.data_as::<Balance>().unwrap(), Balance { total: 1250.0 });
        assert!(msg.data_as::<Vec<u8>>().is_err());
    }
}
