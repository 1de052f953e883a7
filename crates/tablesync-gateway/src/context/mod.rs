//! Per-message handler context.

use std::sync::Arc;

use tablesync_core::error::Result;
use tablesync_core::protocol::payloads::Uuid;

use crate::app_state::AppState;
use crate::realtime::{Participant, Session};
use crate::store::Repository;

/// What a handler gets besides its payload: the calling participant and the
/// shared application state.
#[derive(Clone)]
pub struct HandlerCtx {
    app: AppState,
    participant: Arc<Participant>,
}

impl HandlerCtx {
    pub fn new(app: AppState, participant: Arc<Participant>) -> Self {
        Self { app, participant }
    }

    pub fn app(&self) -> &AppState {
        &self.app
    }

    pub fn participant(&self) -> &Arc<Participant> {
        &self.participant
    }

    pub fn repo(&self) -> &dyn Repository {
        self.app.repo()
    }

    pub fn logged_in_account(&self) -> Result<String> {
        self.participant.logged_in_account()
    }

    pub fn session(&self) -> Result<Arc<Session>> {
        self.participant.session()
    }

    /// Current session if the caller owns it (or permissions are disabled).
    pub fn session_as_owner(&self) -> Result<Arc<Session>> {
        self.participant
            .session_as_owner(self.app.cfg().sessions.disable_permissions)
    }

    pub fn visible_board(&self) -> Result<Uuid> {
        self.participant.visible_board()
    }
}
