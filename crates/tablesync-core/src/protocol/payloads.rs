//! Payload, response and snapshot shapes (camelCase on the wire).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type Uuid = String;

// --------------------
// Snippets
// --------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSnippet {
    pub id: Uuid,
    pub template_id: Uuid,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_token_size")]
    pub size: f64,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub invisible: bool,
    #[serde(default)]
    pub conditions: Vec<String>,
}

fn default_token_size() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTemplateSnippet {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub avatar_id: Option<Uuid>,
    #[serde(default = "default_token_size")]
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPreviewSnippet {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnippet {
    pub id: Uuid,
    pub name: String,
    pub grid_cells_per_row: u32,
    pub tokens: Vec<TokenSnippet>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCardSnippet {
    pub id: String,
    pub name: String,
}

/// Session snapshot handed to a participant on entering a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSnippet {
    pub id: String,
    pub name: String,
    pub boards: Vec<BoardPreviewSnippet>,
    pub token_templates: Vec<TokenTemplateSnippet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_board: Option<BoardSnippet>,
    /// Whether the receiving participant owns the session.
    #[serde(default)]
    pub is_owner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSnippet {
    pub id: Uuid,
    pub path: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnippet {
    pub account_id: String,
    pub campaigns: Vec<CampaignCardSnippet>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Editable token / template properties. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invisible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
}

// --------------------
// account
// --------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// --------------------
// campaign
// --------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignCreate {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignEdit {
    pub id: String,
    pub name: String,
}

/// Payload of `campaignHost` / `campaignJoin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTemplateIds {
    pub token_template_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTemplateCreated {
    pub token_template: TokenTemplateSnippet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCreated {
    pub asset: AssetSnippet,
}

// --------------------
// board
// --------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardCreate {
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of `boardEdit` / `boardPlay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRef {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCreate {
    pub template_id: Uuid,
    pub x: f64,
    pub y: f64,
}

/// Public response of `tokenCreate`; also re-sent when a token is restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCreated {
    pub board_id: Uuid,
    pub token: TokenSnippet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenIds {
    pub token_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditedTokenTemplate {
    pub token_template_id: Uuid,
    pub new_properties: TokenProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_token_template: Option<EditedTokenTemplate>,
    #[serde(default)]
    pub edited_tokens: BTreeMap<Uuid, TokenProperties>,
}

/// Payload of `tokensMove`: token id -> new position.
pub type TokensMove = BTreeMap<Uuid, Position>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn token_defaults_fill_missing_fields() {
        let t: TokenSnippet =
            serde_json::from_value(json!({"id": "a", "templateId": "t1", "x": 0.5, "y": 2.5}))
                .unwrap();
        assert_eq!(t.size, 1.0);
        assert!(!t.invisible);
        assert!(t.conditions.is_empty());
    }

    #[test]
    fn properties_omit_unset_fields() {
        let p = TokenProperties {
            label: Some("Goblin".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&p).unwrap(), json!({"label": "Goblin"}));
    }
}
