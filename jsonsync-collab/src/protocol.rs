//! JSON wire protocol.
//!
//! Client → server and server → room use the same envelope:
//! ```text
//! { "path": "character.items.1", "value": <any JSON> }
//! ```
//! An accepted update is rebroadcast verbatim, so the server never
//! re-encodes it. When rejection notices are enabled the originating
//! session alone additionally receives:
//! ```text
//! { "error": "IndexOutOfRange", "detail": "index 5 out of range for array of length 2" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Update;
use crate::path::MutationError;

/// A single-field update request, also the broadcast payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub path: String,
    /// Absent means `null`.
    #[serde(default)]
    pub value: Value,
}

impl UpdateMessage {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from the wire format.
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }

    /// Parse the path, yielding an applicable update.
    pub fn to_update(&self) -> Result<Update, MutationError> {
        Update::parse(&self.path, self.value.clone())
    }
}

/// Sent back to the originating session when its update is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionNotice {
    pub error: String,
    pub detail: String,
}

impl RejectionNotice {
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: detail.into(),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::DeserializationError(e.to_string()))
    }
}

/// Any frame a client may receive.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    Update(UpdateMessage),
    Rejected(RejectionNotice),
}

impl ServerFrame {
    pub fn decode(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        let is_notice = value.get("error").is_some() && value.get("path").is_none();
        let frame = if is_notice {
            ServerFrame::Rejected(
                serde_json::from_value(value)
                    .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?,
            )
        } else {
            ServerFrame::Update(
                serde_json::from_value(value)
                    .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?,
            )
        };
        Ok(frame)
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    /// Frame payload was not valid UTF-8.
    InvalidEncoding,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidEncoding => write!(f, "Frame is not valid UTF-8"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_update() {
        let msg = UpdateMessage::decode(r#"{"path":"character.age","value":88}"#).unwrap();
        assert_eq!(msg.path, "character.age");
        assert_eq!(msg.value, json!(88));
    }

    #[test]
    fn test_decode_container_value() {
        let msg = UpdateMessage::decode(r#"{"path":"a","value":{"b":[1,null]}}"#).unwrap();
        assert_eq!(msg.value, json!({"b": [1, null]}));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(UpdateMessage::decode("not json").is_err());
        assert!(UpdateMessage::decode(r#"{"value":1}"#).is_err());
        assert!(UpdateMessage::decode(r#"{"path":3,"value":1}"#).is_err());
    }

    #[test]
    fn test_missing_value_is_null() {
        let msg = UpdateMessage::decode(r#"{"path":"a"}"#).unwrap();
        assert_eq!(msg.value, Value::Null);
    }

    #[test]
    fn test_to_update_parses_path() {
        let msg = UpdateMessage::new("items.1", json!("sword"));
        let update = msg.to_update().unwrap();
        assert_eq!(update.path.to_string(), "items.1");
        assert_eq!(update.value, json!("sword"));

        let empty = UpdateMessage::new("", json!(1));
        assert_eq!(empty.to_update().unwrap_err(), MutationError::InvalidPath);
    }

    #[test]
    fn test_server_frame_distinguishes_notice() {
        let notice = RejectionNotice::new("KeyNotFound", "key `x` not found");
        let frame = ServerFrame::decode(&notice.encode().unwrap()).unwrap();
        assert_eq!(frame, ServerFrame::Rejected(notice));

        let update = UpdateMessage::new("error", json!("a key named error"));
        let frame = ServerFrame::decode(&update.encode().unwrap()).unwrap();
        assert_eq!(frame, ServerFrame::Update(update));
    }

    #[test]
    fn test_protocol_error_display() {
        assert_eq!(
            ProtocolError::InvalidEncoding.to_string(),
            "Frame is not valid UTF-8"
        );
    }
}
