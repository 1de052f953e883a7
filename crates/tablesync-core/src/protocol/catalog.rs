//! Message catalog: name -> (category, kind).
//!
//! A message is exactly one of three shapes:
//! - `Send`: payload plus a forwarded payload, no response.
//! - `PrivateRequest`: payload plus a response returned only to the initiator.
//! - `Request`: payload, response and a forwarded payload (usually equal to
//!   the response, a "public response").
//!
//! Server broadcasts such as `assetCreate` are `Send` messages that only the
//! server originates.

/// Runtime discriminator for a message's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Send,
    PrivateRequest,
    Request,
}

impl MessageKind {
    /// Whether a successful handling is broadcast to the other participants.
    pub fn forwards(self) -> bool {
        matches!(self, MessageKind::Send | MessageKind::Request)
    }

    /// Whether the initiator receives a private response value.
    pub fn responds(self) -> bool {
        matches!(self, MessageKind::PrivateRequest | MessageKind::Request)
    }
}

/// Handler grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Account,
    Campaign,
    Board,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Account => "account",
            Category::Campaign => "campaign",
            Category::Board => "board",
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDef {
    pub name: &'static str,
    pub category: Category,
    pub kind: MessageKind,
}

/// Message names.
pub mod names {
    pub const LOGIN: &str = "login";
    pub const ACCOUNT_CREATE: &str = "accountCreate";

    pub const CAMPAIGN_CREATE: &str = "campaignCreate";
    pub const CAMPAIGN_EDIT: &str = "campaignEdit";
    pub const CAMPAIGN_HOST: &str = "campaignHost";
    pub const CAMPAIGN_JOIN: &str = "campaignJoin";
    pub const TOKEN_TEMPLATES_DELETE: &str = "tokenTemplatesDelete";
    pub const TOKEN_TEMPLATES_RESTORE: &str = "tokenTemplatesRestore";
    pub const TOKEN_TEMPLATE_CREATE: &str = "tokenTemplateCreate";
    pub const ASSET_CREATE: &str = "assetCreate";

    pub const BOARD_CREATE: &str = "boardCreate";
    pub const BOARD_EDIT: &str = "boardEdit";
    pub const BOARD_PLAY: &str = "boardPlay";
    pub const TOKEN_CREATE: &str = "tokenCreate";
    pub const TOKENS_DELETE: &str = "tokensDelete";
    pub const TOKENS_RESTORE: &str = "tokensRestore";
    pub const TOKENS_EDIT: &str = "tokensEdit";
    pub const TOKENS_MOVE: &str = "tokensMove";
}

const fn def(name: &'static str, category: Category, kind: MessageKind) -> MessageDef {
    MessageDef {
        name,
        category,
        kind,
    }
}

/// Every message of the protocol.
pub const MESSAGES: &[MessageDef] = &[
    def(names::LOGIN, Category::Account, MessageKind::PrivateRequest),
    def(names::ACCOUNT_CREATE, Category::Account, MessageKind::PrivateRequest),
    def(names::CAMPAIGN_CREATE, Category::Campaign, MessageKind::PrivateRequest),
    def(names::CAMPAIGN_EDIT, Category::Campaign, MessageKind::PrivateRequest),
    def(names::CAMPAIGN_HOST, Category::Campaign, MessageKind::PrivateRequest),
    def(names::CAMPAIGN_JOIN, Category::Campaign, MessageKind::PrivateRequest),
    def(names::TOKEN_TEMPLATES_DELETE, Category::Campaign, MessageKind::Send),
    def(names::TOKEN_TEMPLATES_RESTORE, Category::Campaign, MessageKind::PrivateRequest),
    def(names::TOKEN_TEMPLATE_CREATE, Category::Campaign, MessageKind::Send),
    def(names::ASSET_CREATE, Category::Campaign, MessageKind::Send),
    def(names::BOARD_CREATE, Category::Board, MessageKind::PrivateRequest),
    def(names::BOARD_EDIT, Category::Board, MessageKind::PrivateRequest),
    def(names::BOARD_PLAY, Category::Board, MessageKind::Request),
    def(names::TOKEN_CREATE, Category::Board, MessageKind::Request),
    def(names::TOKENS_DELETE, Category::Board, MessageKind::Send),
    def(names::TOKENS_RESTORE, Category::Board, MessageKind::PrivateRequest),
    def(names::TOKENS_EDIT, Category::Board, MessageKind::Send),
    def(names::TOKENS_MOVE, Category::Board, MessageKind::Send),
];

/// Look up a message definition by name.
pub fn lookup(name: &str) -> Option<&'static MessageDef> {
    MESSAGES.iter().find(|m| m.name == name)
}

/// Kind of a named message, if it is part of the catalog.
pub fn kind_of(name: &str) -> Option<MessageKind> {
    lookup(name).map(|m| m.kind)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn names_are_unique() {
        let mut seen = HashSet::new();
        for m in MESSAGES {
            assert!(seen.insert(m.name), "duplicate catalog entry {}", m.name);
        }
    }

    #[test]
    fn forwarding_follows_kind() {
        assert_eq!(kind_of("tokenCreate"), Some(MessageKind::Request));
        assert!(MessageKind::Request.forwards());
        assert!(!MessageKind::PrivateRequest.forwards());
        assert!(!MessageKind::Send.responds());
        assert_eq!(kind_of("nope"), None);
    }
}
