//! Records exchanged with the repository that never travel on the wire.

use tablesync_core::protocol::payloads::Uuid;

/// Campaign backing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignRecord {
    pub id: String,
    pub owner_account_id: String,
    pub name: String,
    pub selected_board_id: Option<Uuid>,
}

/// Ownership and size of a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardInfo {
    pub campaign_id: String,
    pub token_count: usize,
}

/// Entity family of a permanent deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionKind {
    Tokens,
    TokenTemplates,
}

impl DeletionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeletionKind::Tokens => "tokens",
            DeletionKind::TokenTemplates => "token_templates",
        }
    }
}
