use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use tablesync_core::error::Result;
use tablesync_core::protocol::{catalog, HandlerOutcome};
use tablesync_core::socket::MessageProcessor;

use crate::app_state::AppState;
use crate::context::HandlerCtx;
use crate::realtime::Participant;

/// Receiving side of one server connection.
///
/// Messages are dispatched with a fresh [`HandlerCtx`]; successful forwards
/// go to every other participant of the caller's session.
pub struct ConnectionProcessor {
    app: AppState,
    participant: Arc<Participant>,
}

impl ConnectionProcessor {
    pub fn new(app: AppState, participant: Arc<Participant>) -> Self {
        Self { app, participant }
    }

    pub fn participant(&self) -> &Arc<Participant> {
        &self.participant
    }
}

#[async_trait]
impl MessageProcessor for ConnectionProcessor {
    async fn process(&self, name: &str, payload: Value) -> Result<HandlerOutcome> {
        tracing::debug!(participant = self.participant.id(), name, "dispatch");
        let ctx = HandlerCtx::new(self.app.clone(), Arc::clone(&self.participant));
        self.app.dispatcher().handle(name, payload, ctx).await
    }

    async fn forward(&self, name: &str, payload: Value) {
        match catalog::kind_of(name) {
            Some(kind) if kind.forwards() => {}
            _ => {
                tracing::warn!(name, "dropping forward of a message that does not forward");
                return;
            }
        }

        let Some(session) = self.participant.current_session() else {
            tracing::debug!(name, "forward without a session");
            return;
        };

        if let Err(e) = session
            .broadcast_except(Some(self.participant.id()), name, &payload)
            .await
        {
            tracing::warn!(session_id = session.id(), name, error = %e, "forward failed");
        }
    }
}
