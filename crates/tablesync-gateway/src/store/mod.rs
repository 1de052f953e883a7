//! Backing store seams.
//!
//! The realtime core never touches persistence directly: sessions resolve
//! their backing campaign, load snapshots and commit permanent deletions
//! through [`Repository`]; login and account creation go through
//! [`IdentityProvider`]. `memory` holds in-process implementations used by
//! the binary and the tests.

mod memory;
pub mod model;

use async_trait::async_trait;

use tablesync_core::error::Result;
use tablesync_core::protocol::payloads::{
    AssetSnippet, BoardSnippet, CampaignCardSnippet, CampaignSnippet, Position, TokenProperties,
    TokenSnippet, TokenTemplateSnippet, Uuid,
};

pub use memory::{MemoryIdentityProvider, MemoryRepository};
pub use model::{BoardInfo, CampaignRecord, DeletionKind};

/// Permanent removal of soft-deleted entities.
#[async_trait]
pub trait DeletionStore: Send + Sync {
    async fn commit_permanent_deletion(&self, kind: DeletionKind, ids: &[Uuid]) -> Result<()>;

    /// Delete an asset (and its file) when nothing references it anymore.
    async fn delete_asset_if_unused(&self, asset_id: &str) -> Result<()>;
}

#[async_trait]
pub trait Repository: DeletionStore {
    // sessions

    /// Campaign backing a session id. `NotFound` when it does not exist.
    async fn find_session_backing_entity(&self, campaign_id: &str) -> Result<CampaignRecord>;

    /// Full, unredacted snapshot of a campaign.
    async fn load_snapshot_for(&self, campaign_id: &str) -> Result<CampaignSnippet>;

    // accounts / campaigns

    async fn campaigns_of(&self, account_id: &str) -> Result<Vec<CampaignCardSnippet>>;
    async fn create_campaign(&self, owner_account_id: &str, name: &str) -> Result<CampaignRecord>;
    /// Rename a campaign owned by `owner_account_id`.
    async fn rename_campaign(
        &self,
        owner_account_id: &str,
        campaign_id: &str,
        name: &str,
    ) -> Result<CampaignCardSnippet>;
    async fn select_board(&self, campaign_id: &str, board_id: &str) -> Result<()>;

    // boards

    async fn create_board(&self, campaign_id: &str, name: &str) -> Result<BoardSnippet>;
    async fn find_board(&self, campaign_id: &str, board_id: &str) -> Result<BoardSnippet>;
    async fn board_info(&self, board_id: &str) -> Result<BoardInfo>;

    // tokens / templates

    async fn create_token(
        &self,
        board_id: &str,
        template_id: &str,
        position: Position,
    ) -> Result<TokenSnippet>;
    /// Tokens among `ids` that live on `board_id`; unknown ids are skipped.
    async fn find_tokens(&self, board_id: &str, ids: &[Uuid]) -> Result<Vec<TokenSnippet>>;
    async fn update_token(
        &self,
        board_id: &str,
        token_id: &str,
        properties: &TokenProperties,
    ) -> Result<()>;
    async fn move_token(&self, board_id: &str, token_id: &str, position: Position) -> Result<()>;

    async fn create_token_template(
        &self,
        campaign_id: &str,
        name: &str,
        avatar_id: Option<Uuid>,
    ) -> Result<TokenTemplateSnippet>;
    /// Templates among `ids` that belong to `campaign_id`; unknown ids are skipped.
    async fn find_token_templates(
        &self,
        campaign_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<TokenTemplateSnippet>>;
    async fn update_token_template(
        &self,
        campaign_id: &str,
        template_id: &str,
        properties: &TokenProperties,
    ) -> Result<()>;

    async fn create_asset(
        &self,
        campaign_id: &str,
        path: &str,
        mime_type: &str,
    ) -> Result<AssetSnippet>;
}

/// Credential checks and account registration.
///
/// Per-connection login state lives on the participant; this only answers
/// "which account do these credentials belong to".
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<String>;
    async fn register_account(&self, email: &str, password: &str) -> Result<String>;
}
