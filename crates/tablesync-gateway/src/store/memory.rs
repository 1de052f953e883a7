use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use tablesync_core::error::{Result, TableSyncError};
use tablesync_core::protocol::payloads::{
    AssetSnippet, BoardPreviewSnippet, BoardSnippet, CampaignCardSnippet, CampaignSnippet,
    Position, TokenProperties, TokenSnippet, TokenTemplateSnippet, Uuid,
};

use super::model::{BoardInfo, CampaignRecord, DeletionKind};
use super::{DeletionStore, IdentityProvider, Repository};

const CAMPAIGN_CODE_LEN: usize = 5;
const DEFAULT_GRID_CELLS_PER_ROW: u32 = 20;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

struct CampaignRow {
    record: CampaignRecord,
    seq: u64,
}

struct BoardRow {
    campaign_id: String,
    name: String,
    grid_cells_per_row: u32,
    seq: u64,
}

struct TokenRow {
    board_id: Uuid,
    token: TokenSnippet,
    seq: u64,
}

struct TemplateRow {
    campaign_id: String,
    template: TokenTemplateSnippet,
    seq: u64,
}

#[derive(Default)]
struct Tables {
    seq: u64,
    campaigns: HashMap<String, CampaignRow>,
    boards: HashMap<Uuid, BoardRow>,
    tokens: HashMap<Uuid, TokenRow>,
    templates: HashMap<Uuid, TemplateRow>,
    assets: HashMap<Uuid, AssetSnippet>,
}

impl Tables {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn campaign(&self, id: &str) -> Result<&CampaignRow> {
        self.campaigns
            .get(id)
            .ok_or_else(|| TableSyncError::NotFound(format!("campaign {id}")))
    }

    fn board_in(&self, campaign_id: &str, board_id: &str) -> Result<&BoardRow> {
        match self.boards.get(board_id) {
            Some(b) if b.campaign_id == campaign_id => Ok(b),
            _ => Err(TableSyncError::NotFound(format!("board {board_id}"))),
        }
    }

    fn board_snippet(&self, board_id: &str, board: &BoardRow) -> BoardSnippet {
        let mut rows: Vec<&TokenRow> = self
            .tokens
            .values()
            .filter(|t| t.board_id == board_id)
            .collect();
        rows.sort_by_key(|t| t.seq);

        BoardSnippet {
            id: board_id.to_string(),
            name: board.name.clone(),
            grid_cells_per_row: board.grid_cells_per_row,
            tokens: rows.into_iter().map(|t| t.token.clone()).collect(),
        }
    }

    fn token_on_board(&mut self, board_id: &str, token_id: &str) -> Result<&mut TokenSnippet> {
        match self.tokens.get_mut(token_id) {
            Some(t) if t.board_id == board_id => Ok(&mut t.token),
            _ => Err(TableSyncError::NotFound(format!("token {token_id}"))),
        }
    }
}

/// In-process repository. Files behind assets are not managed here.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DeletionStore for MemoryRepository {
    async fn commit_permanent_deletion(&self, kind: DeletionKind, ids: &[Uuid]) -> Result<()> {
        let mut t = self.tables();
        match kind {
            DeletionKind::Tokens => {
                for id in ids {
                    t.tokens.remove(id);
                }
            }
            DeletionKind::TokenTemplates => {
                for id in ids {
                    t.templates.remove(id);
                }
                t.tokens.retain(|_, row| !ids.contains(&row.token.template_id));
            }
        }
        tracing::debug!(kind = kind.as_str(), count = ids.len(), "permanently deleted");
        Ok(())
    }

    async fn delete_asset_if_unused(&self, asset_id: &str) -> Result<()> {
        let mut t = self.tables();
        if !t.assets.contains_key(asset_id) {
            return Err(TableSyncError::NotFound(format!("asset {asset_id}")));
        }

        let in_use = t
            .templates
            .values()
            .any(|row| row.template.avatar_id.as_deref() == Some(asset_id));
        if !in_use {
            t.assets.remove(asset_id);
            tracing::debug!(asset_id, "deleted unused asset");
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_session_backing_entity(&self, campaign_id: &str) -> Result<CampaignRecord> {
        Ok(self.tables().campaign(campaign_id)?.record.clone())
    }

    async fn load_snapshot_for(&self, campaign_id: &str) -> Result<CampaignSnippet> {
        let t = self.tables();
        let campaign = &t.campaign(campaign_id)?.record;

        let mut boards: Vec<(&Uuid, &BoardRow)> = t
            .boards
            .iter()
            .filter(|(_, b)| b.campaign_id == campaign_id)
            .collect();
        boards.sort_by_key(|(_, b)| b.seq);

        let mut templates: Vec<&TemplateRow> = t
            .templates
            .values()
            .filter(|row| row.campaign_id == campaign_id)
            .collect();
        templates.sort_by_key(|row| row.seq);

        let selected_board = campaign
            .selected_board_id
            .as_deref()
            .and_then(|id| t.boards.get(id).map(|b| t.board_snippet(id, b)));

        Ok(CampaignSnippet {
            id: campaign.id.clone(),
            name: campaign.name.clone(),
            boards: boards
                .into_iter()
                .map(|(id, b)| BoardPreviewSnippet {
                    id: id.clone(),
                    name: b.name.clone(),
                })
                .collect(),
            token_templates: templates.into_iter().map(|row| row.template.clone()).collect(),
            selected_board,
            is_owner: false,
        })
    }

    async fn campaigns_of(&self, account_id: &str) -> Result<Vec<CampaignCardSnippet>> {
        let t = self.tables();
        let mut rows: Vec<&CampaignRow> = t
            .campaigns
            .values()
            .filter(|c| c.record.owner_account_id == account_id)
            .collect();
        rows.sort_by_key(|c| c.seq);

        Ok(rows
            .into_iter()
            .map(|c| CampaignCardSnippet {
                id: c.record.id.clone(),
                name: c.record.name.clone(),
            })
            .collect())
    }

    async fn create_campaign(&self, owner_account_id: &str, name: &str) -> Result<CampaignRecord> {
        let mut t = self.tables();

        let id = loop {
            let code: String = uuid::Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(CAMPAIGN_CODE_LEN)
                .collect();
            if !t.campaigns.contains_key(&code) {
                break code;
            }
        };

        let record = CampaignRecord {
            id: id.clone(),
            owner_account_id: owner_account_id.to_string(),
            name: name.to_string(),
            selected_board_id: None,
        };
        let seq = t.next_seq();
        t.campaigns.insert(
            id,
            CampaignRow {
                record: record.clone(),
                seq,
            },
        );
        Ok(record)
    }

    async fn rename_campaign(
        &self,
        owner_account_id: &str,
        campaign_id: &str,
        name: &str,
    ) -> Result<CampaignCardSnippet> {
        let mut t = self.tables();
        match t.campaigns.get_mut(campaign_id) {
            Some(row) if row.record.owner_account_id == owner_account_id => {
                row.record.name = name.to_string();
                Ok(CampaignCardSnippet {
                    id: row.record.id.clone(),
                    name: row.record.name.clone(),
                })
            }
            _ => Err(TableSyncError::NotFound(format!("campaign {campaign_id}"))),
        }
    }

    async fn select_board(&self, campaign_id: &str, board_id: &str) -> Result<()> {
        let mut t = self.tables();
        t.board_in(campaign_id, board_id)?;
        if let Some(row) = t.campaigns.get_mut(campaign_id) {
            row.record.selected_board_id = Some(board_id.to_string());
        }
        Ok(())
    }

    async fn create_board(&self, campaign_id: &str, name: &str) -> Result<BoardSnippet> {
        let mut t = self.tables();
        t.campaign(campaign_id)?;

        let id = new_id();
        let seq = t.next_seq();
        t.boards.insert(
            id.clone(),
            BoardRow {
                campaign_id: campaign_id.to_string(),
                name: name.to_string(),
                grid_cells_per_row: DEFAULT_GRID_CELLS_PER_ROW,
                seq,
            },
        );

        Ok(BoardSnippet {
            id,
            name: name.to_string(),
            grid_cells_per_row: DEFAULT_GRID_CELLS_PER_ROW,
            tokens: Vec::new(),
        })
    }

    async fn find_board(&self, campaign_id: &str, board_id: &str) -> Result<BoardSnippet> {
        let t = self.tables();
        let board = t.board_in(campaign_id, board_id)?;
        Ok(t.board_snippet(board_id, board))
    }

    async fn board_info(&self, board_id: &str) -> Result<BoardInfo> {
        let t = self.tables();
        let board = t
            .boards
            .get(board_id)
            .ok_or_else(|| TableSyncError::NotFound(format!("board {board_id}")))?;
        Ok(BoardInfo {
            campaign_id: board.campaign_id.clone(),
            token_count: t.tokens.values().filter(|row| row.board_id == board_id).count(),
        })
    }

    async fn create_token(
        &self,
        board_id: &str,
        template_id: &str,
        position: Position,
    ) -> Result<TokenSnippet> {
        let mut t = self.tables();
        let board = t
            .boards
            .get(board_id)
            .ok_or_else(|| TableSyncError::NotFound(format!("board {board_id}")))?;
        let template = match t.templates.get(template_id) {
            Some(row) if row.campaign_id == board.campaign_id => &row.template,
            _ => {
                return Err(TableSyncError::NotFound(format!(
                    "token template {template_id}"
                )))
            }
        };

        let token = TokenSnippet {
            id: new_id(),
            template_id: template_id.to_string(),
            x: position.x,
            y: position.y,
            size: template.size,
            label: None,
            invisible: false,
            conditions: Vec::new(),
        };
        let seq = t.next_seq();
        t.tokens.insert(
            token.id.clone(),
            TokenRow {
                board_id: board_id.to_string(),
                token: token.clone(),
                seq,
            },
        );
        Ok(token)
    }

    async fn find_tokens(&self, board_id: &str, ids: &[Uuid]) -> Result<Vec<TokenSnippet>> {
        let t = self.tables();
        Ok(ids
            .iter()
            .filter_map(|id| t.tokens.get(id))
            .filter(|row| row.board_id == board_id)
            .map(|row| row.token.clone())
            .collect())
    }

    async fn update_token(
        &self,
        board_id: &str,
        token_id: &str,
        properties: &TokenProperties,
    ) -> Result<()> {
        let mut t = self.tables();
        let token = t.token_on_board(board_id, token_id)?;
        if let Some(label) = &properties.label {
            token.label = Some(label.clone());
        }
        if let Some(size) = properties.size {
            token.size = size;
        }
        if let Some(invisible) = properties.invisible {
            token.invisible = invisible;
        }
        if let Some(conditions) = &properties.conditions {
            token.conditions = conditions.clone();
        }
        Ok(())
    }

    async fn move_token(&self, board_id: &str, token_id: &str, position: Position) -> Result<()> {
        let mut t = self.tables();
        let token = t.token_on_board(board_id, token_id)?;
        token.x = position.x;
        token.y = position.y;
        Ok(())
    }

    async fn create_token_template(
        &self,
        campaign_id: &str,
        name: &str,
        avatar_id: Option<Uuid>,
    ) -> Result<TokenTemplateSnippet> {
        let mut t = self.tables();
        t.campaign(campaign_id)?;
        if let Some(avatar) = &avatar_id {
            if !t.assets.contains_key(avatar) {
                return Err(TableSyncError::NotFound(format!("asset {avatar}")));
            }
        }

        let template = TokenTemplateSnippet {
            id: new_id(),
            name: name.to_string(),
            avatar_id,
            size: 1.0,
        };
        let seq = t.next_seq();
        t.templates.insert(
            template.id.clone(),
            TemplateRow {
                campaign_id: campaign_id.to_string(),
                template: template.clone(),
                seq,
            },
        );
        Ok(template)
    }

    async fn find_token_templates(
        &self,
        campaign_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<TokenTemplateSnippet>> {
        let t = self.tables();
        Ok(ids
            .iter()
            .filter_map(|id| t.templates.get(id))
            .filter(|row| row.campaign_id == campaign_id)
            .map(|row| row.template.clone())
            .collect())
    }

    async fn update_token_template(
        &self,
        campaign_id: &str,
        template_id: &str,
        properties: &TokenProperties,
    ) -> Result<()> {
        let mut t = self.tables();
        let template = match t.templates.get_mut(template_id) {
            Some(row) if row.campaign_id == campaign_id => &mut row.template,
            _ => {
                return Err(TableSyncError::NotFound(format!(
                    "token template {template_id}"
                )))
            }
        };
        if let Some(name) = &properties.name {
            template.name = name.clone();
        }
        if let Some(size) = properties.size {
            template.size = size;
        }
        Ok(())
    }

    async fn create_asset(
        &self,
        campaign_id: &str,
        path: &str,
        mime_type: &str,
    ) -> Result<AssetSnippet> {
        let mut t = self.tables();
        t.campaign(campaign_id)?;

        let asset = AssetSnippet {
            id: new_id(),
            path: path.to_string(),
            mime_type: mime_type.to_string(),
        };
        t.assets.insert(asset.id.clone(), asset.clone());
        Ok(asset)
    }
}

struct StoredAccount {
    id: String,
    password: String,
}

/// In-process identity provider for development and tests.
/// Passwords are compared as given; hashing belongs to a real provider.
#[derive(Default)]
pub struct MemoryIdentityProvider {
    accounts: DashMap<String, StoredAccount>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn verify_credentials(&self, email: &str, password: &str) -> Result<String> {
        match self.accounts.get(email) {
            Some(account) if account.password == password => Ok(account.id.clone()),
            _ => Err(TableSyncError::NotAuthorized(
                "Invalid email or password".into(),
            )),
        }
    }

    async fn register_account(&self, email: &str, password: &str) -> Result<String> {
        match self.accounts.entry(email.to_string()) {
            Entry::Occupied(_) => Err(TableSyncError::AlreadyExists(
                "An account with this email already exists".into(),
            )),
            Entry::Vacant(slot) => {
                let id = new_id();
                slot.insert(StoredAccount {
                    id: id.clone(),
                    password: password.to_string(),
                });
                tracing::info!(account_id = %id, "account created");
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    async fn seeded() -> (MemoryRepository, CampaignRecord, BoardSnippet) {
        let repo = MemoryRepository::new();
        let campaign = repo.create_campaign("acc-1", "Dungeon").await.unwrap();
        let board = repo.create_board(&campaign.id, "Cellar").await.unwrap();
        (repo, campaign, board)
    }

    #[tokio::test]
    async fn deleting_templates_cascades_to_their_tokens() {
        let (repo, campaign, board) = seeded().await;
        let goblin = repo
            .create_token_template(&campaign.id, "Goblin", None)
            .await
            .unwrap();
        let token = repo
            .create_token(&board.id, &goblin.id, Position { x: 1.0, y: 1.0 })
            .await
            .unwrap();

        repo.commit_permanent_deletion(DeletionKind::TokenTemplates, &[goblin.id.clone()])
            .await
            .unwrap();

        assert!(repo.find_tokens(&board.id, &[token.id]).await.unwrap().is_empty());
        assert!(repo
            .find_token_templates(&campaign.id, &[goblin.id])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn referenced_assets_survive_cleanup() {
        let (repo, campaign, _) = seeded().await;
        let avatar = repo
            .create_asset(&campaign.id, "goblin.png", "image/png")
            .await
            .unwrap();
        let template = repo
            .create_token_template(&campaign.id, "Goblin", Some(avatar.id.clone()))
            .await
            .unwrap();

        repo.delete_asset_if_unused(&avatar.id).await.unwrap();
        assert!(repo.tables().assets.contains_key(&avatar.id));

        repo.commit_permanent_deletion(DeletionKind::TokenTemplates, &[template.id])
            .await
            .unwrap();
        repo.delete_asset_if_unused(&avatar.id).await.unwrap();
        assert!(!repo.tables().assets.contains_key(&avatar.id));
    }

    #[tokio::test]
    async fn tokens_are_scoped_to_their_board() {
        let (repo, campaign, board) = seeded().await;
        let other = repo.create_board(&campaign.id, "Attic").await.unwrap();
        let template = repo
            .create_token_template(&campaign.id, "Orc", None)
            .await
            .unwrap();
        let token = repo
            .create_token(&board.id, &template.id, Position { x: 0.0, y: 0.0 })
            .await
            .unwrap();

        let err = repo
            .move_token(&other.id, &token.id, Position { x: 3.0, y: 3.0 })
            .await
            .unwrap_err();
        assert_eq!(err.client_code().as_str(), "NOT_FOUND");
        assert_eq!(repo.board_info(&board.id).await.unwrap().token_count, 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let ids = MemoryIdentityProvider::new();
        let id = ids.register_account("a@b.c", "pw").await.unwrap();
        assert_eq!(ids.verify_credentials("a@b.c", "pw").await.unwrap(), id);
        assert!(ids.register_account("a@b.c", "other").await.is_err());
        assert!(ids.verify_credentials("a@b.c", "wrong").await.is_err());
    }
}
