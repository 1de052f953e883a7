//! Per-session soft-delete buffers.
//!
//! Destructive board operations only mark entities here; the entities stay
//! in the backing store until the buffer is purged (session disposal, or TTL
//! eviction when configured). Until then a marked key can be restored, and
//! it is redacted from every snapshot sent to clients.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use tablesync_core::error::{Result, TableSyncError};
use tablesync_core::protocol::payloads::{TokenSnippet, TokenTemplateSnippet, Uuid};

use crate::store::{DeletionKind, DeletionStore};

struct GarbageEntry<V> {
    payload: V,
    marked_at: Instant,
}

/// Soft-delete buffer for one entity family.
pub struct DedicatedGarbage<V> {
    entries: Mutex<HashMap<Uuid, GarbageEntry<V>>>,
}

impl<V> Default for DedicatedGarbage<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> DedicatedGarbage<V> {
    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, GarbageEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key`. Marking an already marked key keeps the first entry.
    pub fn mark_for_deletion(&self, key: impl Into<Uuid>, payload: V) {
        self.entries()
            .entry(key.into())
            .or_insert_with(|| GarbageEntry {
                payload,
                marked_at: Instant::now(),
            });
    }

    pub fn is_marked_for_deletion(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    pub fn keys(&self) -> Vec<Uuid> {
        self.entries().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn restore(&self, key: &str) -> Result<V> {
        self.entries()
            .remove(key)
            .map(|e| e.payload)
            .ok_or_else(|| TableSyncError::NotMarked(key.to_string()))
    }

    /// Restore every marked key among `keys`, skipping the rest.
    pub fn restore_many(&self, keys: &[Uuid]) -> Vec<V> {
        let mut entries = self.entries();
        keys.iter()
            .filter_map(|k| entries.remove(k))
            .map(|e| e.payload)
            .collect()
    }

    /// Empty the buffer and hand back what it held.
    pub fn take_all(&self) -> Vec<(Uuid, V)> {
        self.entries()
            .drain()
            .map(|(k, e)| (k, e.payload))
            .collect()
    }

    /// Remove and return entries marked at least `ttl` ago.
    pub fn take_expired(&self, ttl: Duration) -> Vec<(Uuid, V)> {
        let mut entries = self.entries();
        let expired: Vec<Uuid> = entries
            .iter()
            .filter(|(_, e)| e.marked_at.elapsed() >= ttl)
            .map(|(k, _)| k.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|k| entries.remove(&k).map(|e| (k, e.payload)))
            .collect()
    }
}

/// A token removed from a board.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedToken {
    pub board_id: Uuid,
    pub token: TokenSnippet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletedTokenTemplate {
    pub token_template: TokenTemplateSnippet,
}

#[derive(Default)]
pub struct SessionGarbage {
    pub tokens: DedicatedGarbage<DeletedToken>,
    pub token_templates: DedicatedGarbage<DeletedTokenTemplate>,
}

impl SessionGarbage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permanently delete everything buffered.
    pub async fn purge<S: DeletionStore + ?Sized>(&self, store: &S) -> Result<()> {
        let tokens = commit_tokens(store, self.tokens.take_all()).await;
        let templates = commit_token_templates(store, self.token_templates.take_all()).await;
        tokens.and(templates)
    }

    /// Permanently delete entries marked at least `ttl` ago.
    pub async fn purge_expired<S: DeletionStore + ?Sized>(
        &self,
        store: &S,
        ttl: Duration,
    ) -> Result<()> {
        let tokens = commit_tokens(store, self.tokens.take_expired(ttl)).await;
        let templates =
            commit_token_templates(store, self.token_templates.take_expired(ttl)).await;
        tokens.and(templates)
    }
}

async fn commit_tokens<S: DeletionStore + ?Sized>(
    store: &S,
    purged: Vec<(Uuid, DeletedToken)>,
) -> Result<()> {
    if purged.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = purged.into_iter().map(|(k, _)| k).collect();
    store
        .commit_permanent_deletion(DeletionKind::Tokens, &ids)
        .await
}

async fn commit_token_templates<S: DeletionStore + ?Sized>(
    store: &S,
    purged: Vec<(Uuid, DeletedTokenTemplate)>,
) -> Result<()> {
    if purged.is_empty() {
        return Ok(());
    }

    let mut ids = Vec::with_capacity(purged.len());
    let mut avatars = BTreeSet::new();
    for (id, deleted) in purged {
        ids.push(id);
        if let Some(avatar) = deleted.token_template.avatar_id {
            avatars.insert(avatar);
        }
    }

    store
        .commit_permanent_deletion(DeletionKind::TokenTemplates, &ids)
        .await?;

    // Asset cleanup is best effort: the templates are already gone.
    for avatar in avatars {
        if let Err(e) = store.delete_asset_if_unused(&avatar).await {
            tracing::warn!(asset_id = %avatar, error = %e, "asset cleanup failed");
        }
    }
    Ok(())
}
