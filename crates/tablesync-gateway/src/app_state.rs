//! Shared application state for the tablesync gateway.
//!
//! - Backing stores (repository + identity provider)
//! - Open sessions
//! - The handler dispatch table, built once at startup

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use tablesync_core::error::{Result, TableSyncError};
use tablesync_core::protocol::catalog::{self, names};
use tablesync_core::socket::MessageSocket;

use crate::config::GatewayConfig;
use crate::dispatch::{ConnectionProcessor, GatewayDispatcher};
use crate::realtime::{Participant, SessionRegistry};
use crate::services::{AccountHandlers, BoardHandlers, CampaignHandlers};
use crate::store::{IdentityProvider, MemoryIdentityProvider, MemoryRepository, Repository};

/// Catalog messages only the server sends; no handler is expected.
const SERVER_ORIGINATED: &[&str] = &[names::TOKEN_TEMPLATE_CREATE, names::ASSET_CREATE];

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    sessions: Arc<SessionRegistry>,
    dispatcher: Arc<GatewayDispatcher>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    repo: Arc<dyn Repository>,
    identity: Arc<dyn IdentityProvider>,
    next_participant: AtomicU64,
}

impl AppState {
    /// Build application state on top of the in-memory stores.
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        Self::with_stores(
            cfg,
            Arc::new(MemoryRepository::new()),
            Arc::new(MemoryIdentityProvider::new()),
        )
    }

    pub fn with_stores(
        cfg: GatewayConfig,
        repo: Arc<dyn Repository>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let mut dispatcher = GatewayDispatcher::new();
        dispatcher.register(&AccountHandlers)?;
        dispatcher.register(&CampaignHandlers)?;
        dispatcher.register(&BoardHandlers)?;
        check_catalog(&dispatcher, cfg.gateway.strict_catalog)?;

        let sessions = Arc::new(SessionRegistry::new(
            Arc::clone(&repo),
            cfg.sessions.ownership,
        ));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                repo,
                identity,
                next_participant: AtomicU64::new(1),
            }),
            sessions,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn dispatcher(&self) -> &GatewayDispatcher {
        &self.dispatcher
    }

    pub fn repo(&self) -> &dyn Repository {
        self.inner.repo.as_ref()
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    /// Register a new connection as a participant.
    pub fn open_connection(&self, socket: Arc<MessageSocket>) -> Arc<Participant> {
        let id = self.inner.next_participant.fetch_add(1, Ordering::Relaxed);
        Arc::new(Participant::new(id, socket))
    }

    pub fn processor_for(&self, participant: &Arc<Participant>) -> ConnectionProcessor {
        ConnectionProcessor::new(self.clone(), Arc::clone(participant))
    }

    /// Tear down a connection: pending requests fail, the participant
    /// leaves its session.
    pub async fn disconnect(&self, participant: &Participant) {
        participant.socket().close();
        self.sessions.leave(participant).await;
    }

    /// Start the garbage TTL sweeper when `sessions.garbage_ttl_ms` is set.
    pub fn spawn_background_tasks(&self) -> Option<JoinHandle<()>> {
        let s = &self.cfg().sessions;
        let ttl = Duration::from_millis(s.garbage_ttl_ms?);
        let every = Duration::from_millis(s.sweep_interval_ms);
        tracing::info!(?ttl, ?every, "garbage sweeper enabled");
        Some(self.sessions.spawn_garbage_sweeper(ttl, every))
    }
}

/// Catalog <-> dispatcher sanity check. Mismatches are logged; with
/// `strict` the first one is an error.
fn check_catalog(dispatcher: &GatewayDispatcher, strict: bool) -> Result<()> {
    let registered = dispatcher.registered_messages();
    let mut mismatches = Vec::new();

    for def in catalog::MESSAGES {
        if SERVER_ORIGINATED.contains(&def.name) {
            continue;
        }
        if !registered.contains(&def.name) {
            tracing::warn!(name = def.name, "catalog message has no handler");
            mismatches.push(format!("catalog message without handler: {}", def.name));
        }
    }
    for name in &registered {
        if catalog::lookup(name).is_none() {
            tracing::warn!(name, "handler registered for a message outside the catalog");
            mismatches.push(format!("handler outside the catalog: {name}"));
        }
    }

    match mismatches.into_iter().next() {
        Some(first) if strict => Err(TableSyncError::Internal(first)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config;

    #[test]
    fn every_client_message_has_a_handler() {
        let app = AppState::new(config::load_from_str("version: 1").unwrap()).unwrap();
        let registered = app.dispatcher().registered_messages();

        for def in catalog::MESSAGES {
            let expected = !SERVER_ORIGINATED.contains(&def.name);
            assert_eq!(registered.contains(&def.name), expected, "{}", def.name);
        }
        assert_eq!(app.dispatcher().category_of(names::TOKENS_MOVE), Some("board"));
    }

    #[test]
    fn missing_handlers_fail_startup_when_strict() {
        let mut partial = GatewayDispatcher::new();
        partial.register(&AccountHandlers).unwrap();

        let err = check_catalog(&partial, true).unwrap_err();
        assert_eq!(err.client_code().as_str(), "INTERNAL");
        assert!(err.to_string().contains("catalog message without handler"));
        assert!(check_catalog(&partial, false).is_ok());
    }

    #[test]
    fn sweeper_is_off_without_ttl() {
        let app = AppState::new(config::load_from_str("version: 1").unwrap()).unwrap();
        assert!(app.spawn_background_tasks().is_none());
    }
}
