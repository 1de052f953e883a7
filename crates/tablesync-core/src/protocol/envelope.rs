//! Wire envelope (JSON text frames).
//!
//! ```text
//! Send:     { "name": string, "payload": any, "channel"?: uint }
//! Response: { "channel": uint, "response"?: any, "error"?: string }
//! ```
//!
//! A Send carrying `channel` expects exactly one Response with the same
//! channel. A Response carries at most one of `response` / `error`; neither
//! means a void acknowledgment.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TableSyncError};

/// Message sent by the initiator of an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendEnvelope {
    /// Message name (e.g. `tokenCreate`).
    pub name: String,
    /// Message payload; `null` when the message has none.
    #[serde(default)]
    pub payload: Value,
    /// Present iff the sender expects a Response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
}

/// Reply to a Send envelope that carried a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseEnvelope {
    pub channel: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Successful reply; `None` encodes a void acknowledgment.
    pub fn ok(channel: u32, response: Option<Value>) -> Self {
        Self {
            channel,
            response,
            error: None,
        }
    }

    pub fn error(channel: u32, error: impl Into<String>) -> Self {
        Self {
            channel,
            response: None,
            error: Some(error.into()),
        }
    }

    /// Resolve into the requester's result. A void acknowledgment becomes `null`.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(e) => Err(TableSyncError::Rejected(e)),
            None => Ok(self.response.unwrap_or(Value::Null)),
        }
    }
}

/// Either side of an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Send(SendEnvelope),
    Response(ResponseEnvelope),
}

impl Envelope {
    /// Fire-and-forget message.
    pub fn send(name: impl Into<String>, payload: Value) -> Self {
        Envelope::Send(SendEnvelope {
            name: name.into(),
            payload,
            channel: None,
        })
    }

    /// Message expecting a Response on `channel`.
    pub fn request(name: impl Into<String>, payload: Value, channel: u32) -> Self {
        Envelope::Send(SendEnvelope {
            name: name.into(),
            payload,
            channel: Some(channel),
        })
    }
}

/// Encode an envelope into a text frame.
pub fn encode(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope)
        .map_err(|e| TableSyncError::Internal(format!("envelope encode failed: {e}")))
}

/// Decode a text frame into an envelope.
pub fn decode(frame: &str) -> Result<Envelope> {
    let envelope: Envelope = serde_json::from_str(frame)
        .map_err(|e| TableSyncError::MalformedEnvelope(format!("invalid envelope json: {e}")))?;

    if let Envelope::Response(r) = &envelope {
        if r.response.is_some() && r.error.is_some() {
            return Err(TableSyncError::MalformedEnvelope(format!(
                "response on channel {} carries both response and error",
                r.channel
            )));
        }
    }

    Ok(envelope)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn send_without_channel_omits_field() {
        let s = encode(&Envelope::send("tokensMove", json!({"t1": {"x": 1, "y": 2}}))).unwrap();
        assert!(!s.contains("channel"));
        assert_eq!(decode(&s).unwrap(), Envelope::send("tokensMove", json!({"t1": {"x": 1, "y": 2}})));
    }

    #[test]
    fn void_ack_has_neither_response_nor_error() {
        let s = encode(&Envelope::Response(ResponseEnvelope::ok(3, None))).unwrap();
        assert_eq!(s, r#"{"channel":3}"#);
    }

    #[test]
    fn error_reply_resolves_to_rejected() {
        let r = ResponseEnvelope::error(0, "Not in a session");
        assert_eq!(
            r.into_result(),
            Err(TableSyncError::Rejected("Not in a session".into()))
        );
    }
}
