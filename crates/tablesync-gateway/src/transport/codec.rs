//! Socket message -> inbound frame.
//!
//! - Text frames pass through untouched (the multiplexer decodes them)
//! - Binary frames must carry UTF-8 JSON
//! - Ping/Pong/Close are surfaced for lifecycle management

use axum::extract::ws::Message;
use tablesync_core::error::{Result, TableSyncError};

#[derive(Debug, PartialEq)]
pub enum Inbound {
    Frame(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

pub fn decode(msg: Message) -> Result<Inbound> {
    match msg {
        Message::Text(s) => Ok(Inbound::Frame(s)),
        Message::Binary(b) => String::from_utf8(b)
            .map(Inbound::Frame)
            .map_err(|e| TableSyncError::MalformedEnvelope(format!("binary frame is not utf-8: {e}"))),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(v) => Ok(Inbound::Pong(v)),
        Message::Close(_) => Ok(Inbound::Close),
    }
}

/// Payload size of a message, checked before decoding.
pub fn frame_len(msg: &Message) -> usize {
    match msg {
        Message::Text(s) => s.len(),
        Message::Binary(b) => b.len(),
        Message::Ping(v) => v.len(),
        Message::Pong(v) => v.len(),
        Message::Close(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn binary_json_is_accepted_as_text() {
        let msg = Message::Binary(br#"{"name":"login","payload":{}}"#.to_vec());
        assert_eq!(frame_len(&msg), 29);
        assert_eq!(
            decode(msg).unwrap(),
            Inbound::Frame(r#"{"name":"login","payload":{}}"#.into())
        );
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let err = decode(Message::Binary(vec![0xff, 0xfe])).unwrap_err();
        assert_eq!(err.client_code().as_str(), "MALFORMED_ENVELOPE");
    }
}
