//! An open session: participants, owner and soft-delete buffers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use tablesync_core::error::{Result, TableSyncError};
use tablesync_core::protocol::envelope::{self, Envelope};
use tablesync_core::protocol::payloads::{BoardSnippet, CampaignSnippet};

use crate::config::OwnershipPolicy;
use crate::store::CampaignRecord;

use super::garbage::SessionGarbage;
use super::participant::{Participant, ParticipantId};

/// How a participant enters a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterMode {
    /// Enter as owner; the caller's account must own the campaign.
    Host,
    /// Enter as a peer.
    Join,
}

#[derive(Default)]
struct SessionInner {
    participants: BTreeMap<ParticipantId, Arc<Participant>>,
    owner: Option<ParticipantId>,
}

pub struct Session {
    id: String,
    owner_account_id: String,
    garbage: SessionGarbage,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub(crate) fn new(backing: &CampaignRecord) -> Self {
        Self {
            id: backing.id.clone(),
            owner_account_id: backing.owner_account_id.clone(),
            garbage: SessionGarbage::new(),
            inner: Mutex::new(SessionInner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Account owning the backing campaign.
    pub fn owner_account_id(&self) -> &str {
        &self.owner_account_id
    }

    pub fn garbage(&self) -> &SessionGarbage {
        &self.garbage
    }

    pub fn owner(&self) -> Option<ParticipantId> {
        self.inner().owner
    }

    pub fn is_owner(&self, participant: ParticipantId) -> bool {
        self.inner().owner == Some(participant)
    }

    pub fn participants(&self) -> Vec<Arc<Participant>> {
        self.inner().participants.values().cloned().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.inner().participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().participants.is_empty()
    }

    /// Add `participant`, returning whether it owns the session afterwards.
    ///
    /// `created` is set when this participant opened the session.
    pub(crate) fn attach(
        &self,
        participant: &Arc<Participant>,
        mode: EnterMode,
        created: bool,
        policy: OwnershipPolicy,
    ) -> Result<bool> {
        let entitled = participant.account_id().as_deref() == Some(self.owner_account_id.as_str());
        let pid = participant.id();
        let mut inner = self.inner();

        let owns = match mode {
            EnterMode::Host => {
                if !entitled {
                    return Err(TableSyncError::NotAuthorized(
                        "You must be the owner of this campaign to be able to host".into(),
                    ));
                }
                match inner.owner {
                    Some(current) if current != pid => {
                        return Err(TableSyncError::AlreadyExists(
                            "This session is already hosted by another connection".into(),
                        ))
                    }
                    _ => true,
                }
            }
            EnterMode::Join => {
                inner.owner == Some(pid)
                    || (inner.owner.is_none()
                        && entitled
                        && (created || policy == OwnershipPolicy::ReclaimOnRejoin))
            }
        };

        inner.participants.insert(pid, Arc::clone(participant));
        if owns {
            inner.owner = Some(pid);
        }
        Ok(owns)
    }

    /// Remove a participant; returns how many remain. A leaving owner
    /// leaves ownership vacant.
    pub(crate) fn detach(&self, participant: ParticipantId) -> usize {
        let mut inner = self.inner();
        inner.participants.remove(&participant);
        if inner.owner == Some(participant) {
            inner.owner = None;
            tracing::info!(session_id = %self.id, participant, "session owner left");
        }
        inner.participants.len()
    }

    /// Send `name` to every participant except `except`. The frame is
    /// encoded once. Returns how many participants it was handed to.
    pub async fn broadcast_except<P: Serialize + ?Sized>(
        &self,
        except: Option<ParticipantId>,
        name: &str,
        payload: &P,
    ) -> Result<usize> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| TableSyncError::Internal(format!("json encode failed: {e}")))?;
        let frame = envelope::encode(&Envelope::send(name, payload))?;

        let mut delivered = 0;
        for p in self.participants() {
            if Some(p.id()) == except {
                continue;
            }
            match p.socket().send_encoded(frame.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(session_id = %self.id, participant = p.id(), name, error = %e, "broadcast delivery failed")
                }
            }
        }
        Ok(delivered)
    }

    /// Drop soft-deleted tokens from a board snapshot.
    pub fn redact_board(&self, board: &mut BoardSnippet) {
        board
            .tokens
            .retain(|t| !self.garbage.tokens.is_marked_for_deletion(&t.id));
    }

    /// Drop soft-deleted entries from a campaign snapshot.
    pub fn redact_campaign(&self, snapshot: &mut CampaignSnippet) {
        snapshot
            .token_templates
            .retain(|t| !self.garbage.token_templates.is_marked_for_deletion(&t.id));
        if let Some(board) = snapshot.selected_board.as_mut() {
            self.redact_board(board);
        }
    }
}
