//! One connected client as seen by the server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tablesync_core::error::{Result, TableSyncError};
use tablesync_core::protocol::payloads::Uuid;
use tablesync_core::socket::MessageSocket;

use super::session::Session;

/// Per-process connection id.
pub type ParticipantId = u64;

#[derive(Default)]
struct ParticipantState {
    account_id: Option<String>,
    session: Option<Arc<Session>>,
    visible_board: Option<Uuid>,
}

/// Wraps the connection's multiplexer plus its login and session state.
///
/// Guard accessors (`logged_in_account`, `session`, `session_as_owner`,
/// `visible_board`) fail with a client-facing error instead of returning
/// `Option`, so handlers can use `?` directly.
pub struct Participant {
    id: ParticipantId,
    socket: Arc<MessageSocket>,
    state: Mutex<ParticipantState>,
}

impl Participant {
    pub fn new(id: ParticipantId, socket: Arc<MessageSocket>) -> Self {
        Self {
            id,
            socket,
            state: Mutex::new(ParticipantState::default()),
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn socket(&self) -> &Arc<MessageSocket> {
        &self.socket
    }

    fn state(&self) -> MutexGuard<'_, ParticipantState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn account_id(&self) -> Option<String> {
        self.state().account_id.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state().account_id.is_some()
    }

    pub fn logged_in_account(&self) -> Result<String> {
        self.account_id()
            .ok_or_else(|| TableSyncError::NotAuthorized("Not logged in".into()))
    }

    pub fn log_in(&self, account_id: impl Into<String>) {
        self.state().account_id = Some(account_id.into());
    }

    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.state().session.clone()
    }

    pub fn session(&self) -> Result<Arc<Session>> {
        self.current_session()
            .ok_or_else(|| TableSyncError::NotAuthorized("Not in a session".into()))
    }

    /// Current session, provided this participant owns it.
    /// `disable_permissions` skips the ownership check.
    pub fn session_as_owner(&self, disable_permissions: bool) -> Result<Arc<Session>> {
        let session = self.session()?;
        if disable_permissions || session.is_owner(self.id) {
            Ok(session)
        } else {
            Err(TableSyncError::NotAuthorized(
                "Not in a session as owner".into(),
            ))
        }
    }

    pub(crate) fn enter_session(&self, session: Arc<Session>) {
        let mut state = self.state();
        state.session = Some(session);
        state.visible_board = None;
    }

    pub(crate) fn take_session(&self) -> Option<Arc<Session>> {
        let mut state = self.state();
        state.visible_board = None;
        state.session.take()
    }

    pub fn visible_board_or_none(&self) -> Option<Uuid> {
        self.state().visible_board.clone()
    }

    pub fn visible_board(&self) -> Result<Uuid> {
        self.visible_board_or_none().ok_or_else(|| {
            TableSyncError::BadRequest("No visible board set for this participant".into())
        })
    }

    pub fn set_visible_board(&self, board_id: Option<Uuid>) {
        self.state().visible_board = board_id;
    }
}
