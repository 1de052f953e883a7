use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;

use tablesync_core::error::Result;
use tablesync_core::protocol::payloads::CampaignSnippet;

use crate::config::OwnershipPolicy;
use crate::store::Repository;

use super::participant::Participant;
use super::session::{EnterMode, Session};

/// Open sessions keyed by session (campaign) id.
///
/// A session is created by the first successful enter and disposed when its
/// last participant leaves; disposal purges its garbage.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    repo: Arc<dyn Repository>,
    policy: OwnershipPolicy,
}

impl SessionRegistry {
    pub fn new(repo: Arc<dyn Repository>, policy: OwnershipPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            repo,
            policy,
        }
    }

    pub fn find(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Attach `participant` to `session_id`, opening the session if needed,
    /// and return the participant's view of it.
    ///
    /// A participant already in another session leaves it once the target
    /// is known to exist.
    pub async fn enter(
        &self,
        session_id: &str,
        participant: &Arc<Participant>,
        mode: EnterMode,
    ) -> Result<CampaignSnippet> {
        let backing = self.repo.find_session_backing_entity(session_id).await?;

        if let Some(current) = participant.current_session() {
            if current.id() != session_id {
                self.leave(participant).await;
            }
        }

        let mut created = false;
        let (session, attached) = {
            let entry = self
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    created = true;
                    Arc::new(Session::new(&backing))
                });
            let session = Arc::clone(entry.value());
            let res = session.attach(participant, mode, created, self.policy);
            drop(entry);
            if created {
                tracing::info!(session_id, "session opened");
            }
            (session, res)
        };

        let owns = match attached {
            Ok(owns) => owns,
            Err(e) => {
                // An empty session opened by someone else belongs to the
                // leave that emptied it; that leave disposes it.
                if created {
                    self.sessions
                        .remove_if(session_id, |_, s| Arc::ptr_eq(s, &session) && s.is_empty());
                }
                return Err(e);
            }
        };
        participant.enter_session(Arc::clone(&session));
        tracing::info!(
            session_id,
            participant = participant.id(),
            owner = owns,
            participants = session.participant_count(),
            "participant entered session"
        );

        let mut snapshot = self.repo.load_snapshot_for(session_id).await?;
        session.redact_campaign(&mut snapshot);
        snapshot.is_owner = owns;
        if let Some(board) = &snapshot.selected_board {
            participant.set_visible_board(Some(board.id.clone()));
        }
        Ok(snapshot)
    }

    /// Detach `participant` from its session; dispose the session when it
    /// was the last one.
    pub async fn leave(&self, participant: &Participant) {
        let Some(session) = participant.take_session() else {
            return;
        };

        let remaining = session.detach(participant.id());
        tracing::info!(
            session_id = session.id(),
            participant = participant.id(),
            remaining,
            "participant left session"
        );
        if remaining > 0 {
            return;
        }

        let removed = self
            .sessions
            .remove_if(session.id(), |_, s| Arc::ptr_eq(s, &session) && s.is_empty());
        if removed.is_some() {
            self.dispose(&session).await;
        }
    }

    async fn dispose(&self, session: &Session) {
        if let Err(e) = session.garbage().purge(self.repo.as_ref()).await {
            tracing::error!(session_id = session.id(), error = %e, "garbage purge failed");
        }
        tracing::info!(session_id = session.id(), "session disposed");
    }

    /// Push a server-originated message to every participant of an open
    /// session. Returns 0 when the session is not open.
    pub async fn broadcast<P: Serialize + ?Sized>(
        &self,
        session_id: &str,
        name: &str,
        payload: &P,
    ) -> Result<usize> {
        match self.find(session_id) {
            Some(session) => session.broadcast_except(None, name, payload).await,
            None => Ok(0),
        }
    }

    /// Purge garbage entries older than `ttl` in every open session.
    pub async fn sweep_expired_garbage(&self, ttl: Duration) {
        let sessions: Vec<Arc<Session>> =
            self.sessions.iter().map(|s| Arc::clone(s.value())).collect();
        for session in sessions {
            if let Err(e) = session
                .garbage()
                .purge_expired(self.repo.as_ref(), ttl)
                .await
            {
                tracing::warn!(session_id = session.id(), error = %e, "garbage sweep failed");
            }
        }
    }

    /// Run `sweep_expired_garbage` every `every` until aborted.
    pub fn spawn_garbage_sweeper(self: &Arc<Self>, ttl: Duration, every: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                registry.sweep_expired_garbage(ttl).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use tokio::sync::mpsc;

    use tablesync_core::protocol::payloads::Position;
    use tablesync_core::socket::MessageSocket;

    use super::*;
    use crate::realtime::core::garbage::{DeletedToken, DeletedTokenTemplate};
    use crate::store::MemoryRepository;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        campaign_id: String,
    }

    async fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let campaign = repo.create_campaign("owner-acc", "Keep").await.unwrap();
        Fixture {
            repo,
            campaign_id: campaign.id,
        }
    }

    fn registry(f: &Fixture, policy: OwnershipPolicy) -> SessionRegistry {
        SessionRegistry::new(f.repo.clone(), policy)
    }

    fn participant(id: u64, account: Option<&str>) -> Arc<Participant> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let p = Participant::new(id, Arc::new(MessageSocket::new(tx)));
        if let Some(a) = account {
            p.log_in(a);
        }
        Arc::new(p)
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::Explicit);

        let err = reg
            .enter("nope", &participant(1, None), EnterMode::Join)
            .await
            .unwrap_err();
        assert_eq!(err.client_code().as_str(), "NOT_FOUND");
        assert_eq!(reg.open_sessions(), 0);
    }

    #[tokio::test]
    async fn host_owns_and_joiners_are_peers() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::Explicit);
        let owner = participant(1, Some("owner-acc"));
        let peer = participant(2, Some("peer-acc"));

        let snap = reg.enter(&f.campaign_id, &owner, EnterMode::Host).await.unwrap();
        assert!(snap.is_owner);
        let snap = reg.enter(&f.campaign_id, &peer, EnterMode::Join).await.unwrap();
        assert!(!snap.is_owner);

        let session = reg.find(&f.campaign_id).unwrap();
        assert_eq!(session.participant_count(), 2);
        assert!(peer.session_as_owner(false).is_err());
        assert!(owner.session_as_owner(false).is_ok());
        assert!(peer.session_as_owner(true).is_ok());
    }

    #[tokio::test]
    async fn hosting_requires_campaign_ownership() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::Explicit);

        let err = reg
            .enter(&f.campaign_id, &participant(1, Some("intruder")), EnterMode::Host)
            .await
            .unwrap_err();
        assert_eq!(err.client_code().as_str(), "NOT_AUTHORIZED");
        assert_eq!(reg.open_sessions(), 0);
    }

    #[tokio::test]
    async fn explicit_policy_keeps_ownership_vacant_until_host() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::Explicit);
        let owner = participant(1, Some("owner-acc"));
        let peer = participant(2, None);

        reg.enter(&f.campaign_id, &owner, EnterMode::Host).await.unwrap();
        reg.enter(&f.campaign_id, &peer, EnterMode::Join).await.unwrap();
        reg.leave(&owner).await;

        let session = reg.find(&f.campaign_id).unwrap();
        assert_eq!(session.owner(), None);

        let back = participant(3, Some("owner-acc"));
        let snap = reg.enter(&f.campaign_id, &back, EnterMode::Join).await.unwrap();
        assert!(!snap.is_owner);
        let snap = reg.enter(&f.campaign_id, &back, EnterMode::Host).await.unwrap();
        assert!(snap.is_owner);
        assert_eq!(session.owner(), Some(3));
    }

    #[tokio::test]
    async fn reclaim_policy_restores_owner_on_plain_join() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::ReclaimOnRejoin);
        let owner = participant(1, Some("owner-acc"));
        let peer = participant(2, None);

        reg.enter(&f.campaign_id, &owner, EnterMode::Host).await.unwrap();
        reg.enter(&f.campaign_id, &peer, EnterMode::Join).await.unwrap();
        reg.leave(&owner).await;

        let back = participant(3, Some("owner-acc"));
        let snap = reg.enter(&f.campaign_id, &back, EnterMode::Join).await.unwrap();
        assert!(snap.is_owner);
    }

    #[tokio::test]
    async fn second_host_is_rejected_while_owner_present() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::Explicit);

        reg.enter(&f.campaign_id, &participant(1, Some("owner-acc")), EnterMode::Host)
            .await
            .unwrap();
        let err = reg
            .enter(&f.campaign_id, &participant(2, Some("owner-acc")), EnterMode::Host)
            .await
            .unwrap_err();
        assert_eq!(err.client_code().as_str(), "ALREADY_EXISTS");
        assert_eq!(reg.find(&f.campaign_id).unwrap().participant_count(), 1);
    }

    #[tokio::test]
    async fn last_leave_disposes_and_purges() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::Explicit);
        let owner = participant(1, Some("owner-acc"));

        let board = f.repo.create_board(&f.campaign_id, "Hall").await.unwrap();
        let template = f
            .repo
            .create_token_template(&f.campaign_id, "Bat", None)
            .await
            .unwrap();
        let token = f
            .repo
            .create_token(&board.id, &template.id, Position { x: 1.0, y: 2.0 })
            .await
            .unwrap();

        reg.enter(&f.campaign_id, &owner, EnterMode::Host).await.unwrap();
        let session = reg.find(&f.campaign_id).unwrap();
        session.garbage().tokens.mark_for_deletion(
            token.id.clone(),
            DeletedToken {
                board_id: board.id.clone(),
                token: token.clone(),
            },
        );

        reg.leave(&owner).await;

        assert_eq!(reg.open_sessions(), 0);
        assert!(owner.current_session().is_none());
        assert!(f.repo.find_tokens(&board.id, &[token.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_enter_leaves_a_draining_session_to_its_leave() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::Explicit);
        let owner = participant(1, Some("owner-acc"));

        let board = f.repo.create_board(&f.campaign_id, "Hall").await.unwrap();
        let template = f
            .repo
            .create_token_template(&f.campaign_id, "Bat", None)
            .await
            .unwrap();
        let token = f
            .repo
            .create_token(&board.id, &template.id, Position { x: 0.0, y: 0.0 })
            .await
            .unwrap();

        reg.enter(&f.campaign_id, &owner, EnterMode::Host).await.unwrap();
        let session = reg.find(&f.campaign_id).unwrap();
        session.garbage().tokens.mark_for_deletion(
            token.id.clone(),
            DeletedToken {
                board_id: board.id.clone(),
                token: token.clone(),
            },
        );

        // the owner is half way through leaving when an intruder shows up
        session.detach(owner.id());
        reg.enter(&f.campaign_id, &participant(2, Some("intruder")), EnterMode::Host)
            .await
            .unwrap_err();
        assert_eq!(reg.open_sessions(), 1);

        reg.leave(&owner).await;
        assert_eq!(reg.open_sessions(), 0);
        assert!(!session.garbage().tokens.is_marked_for_deletion(&token.id));
        assert!(f.repo.find_tokens(&board.id, &[token.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn joining_an_unknown_campaign_keeps_the_current_session() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::Explicit);
        let owner = participant(1, Some("owner-acc"));

        reg.enter(&f.campaign_id, &owner, EnterMode::Host).await.unwrap();
        let err = reg
            .enter("nope", &owner, EnterMode::Join)
            .await
            .unwrap_err();
        assert_eq!(err.client_code().as_str(), "NOT_FOUND");

        assert_eq!(owner.current_session().unwrap().id(), f.campaign_id);
        assert!(owner.session_as_owner(false).is_ok());
        assert_eq!(reg.open_sessions(), 1);
    }

    #[tokio::test]
    async fn snapshots_hide_soft_deleted_templates() {
        let f = fixture().await;
        let reg = registry(&f, OwnershipPolicy::Explicit);
        let template = f
            .repo
            .create_token_template(&f.campaign_id, "Wolf", None)
            .await
            .unwrap();

        reg.enter(&f.campaign_id, &participant(1, Some("owner-acc")), EnterMode::Host)
            .await
            .unwrap();
        let session = reg.find(&f.campaign_id).unwrap();
        session.garbage().token_templates.mark_for_deletion(
            template.id.clone(),
            DeletedTokenTemplate {
                token_template: template,
            },
        );

        let snap = reg
            .enter(&f.campaign_id, &participant(2, None), EnterMode::Join)
            .await
            .unwrap();
        assert!(snap.token_templates.is_empty());
    }
}
