//! Normalized handler result.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, TableSyncError};

/// What a handler produced for one inbound message.
///
/// The multiplexer replies to the initiator with the response (or with the
/// forward when there is no distinct response) and broadcasts the forward to
/// the other session participants.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HandlerOutcome {
    /// Void acknowledgment.
    #[default]
    Ack,
    /// Private response for the initiator only.
    Respond(Value),
    /// Payload broadcast to peers; also echoed to the initiator if it asked.
    Forward(Value),
    /// Private response for the initiator, separate payload for peers.
    RespondAndForward { response: Value, forward: Value },
}

impl HandlerOutcome {
    pub fn respond<T: Serialize>(response: &T) -> Result<Self> {
        Ok(HandlerOutcome::Respond(to_value(response)?))
    }

    pub fn forward<T: Serialize>(forward: &T) -> Result<Self> {
        Ok(HandlerOutcome::Forward(to_value(forward)?))
    }

    pub fn respond_and_forward<R: Serialize, F: Serialize>(response: &R, forward: &F) -> Result<Self> {
        Ok(HandlerOutcome::RespondAndForward {
            response: to_value(response)?,
            forward: to_value(forward)?,
        })
    }

    /// Same value for the initiator and for peers.
    pub fn public<T: Serialize>(value: &T) -> Result<Self> {
        let v = to_value(value)?;
        Ok(HandlerOutcome::RespondAndForward {
            response: v.clone(),
            forward: v,
        })
    }

    pub fn forwarded(&self) -> Option<&Value> {
        match self {
            HandlerOutcome::Forward(f) | HandlerOutcome::RespondAndForward { forward: f, .. } => {
                Some(f)
            }
            _ => None,
        }
    }

    /// Split into (reply for the initiator, forward for peers).
    pub fn into_parts(self) -> (Option<Value>, Option<Value>) {
        match self {
            HandlerOutcome::Ack => (None, None),
            HandlerOutcome::Respond(r) => (Some(r), None),
            HandlerOutcome::Forward(f) => (Some(f.clone()), Some(f)),
            HandlerOutcome::RespondAndForward { response, forward } => {
                (Some(response), Some(forward))
            }
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| TableSyncError::Internal(format!("json encode failed: {e}")))
}
