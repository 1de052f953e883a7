use serde::Deserialize;
use tablesync_core::error::{Result, TableSyncError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub sessions: SessionsSection,

    #[serde(default)]
    pub limits: LimitsSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(TableSyncError::BadRequest(format!(
                "unsupported config version {} (expected 1)",
                self.version
            )));
        }

        self.gateway.validate()?;
        self.sessions.validate()?;
        self.limits.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Route serving WebSocket upgrades.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Inbound frames above this size close the connection.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Per-connection outbound queue capacity (frames).
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Refuse to start when handlers and the message catalog disagree.
    #[serde(default = "default_strict_catalog")]
    pub strict_catalog: bool,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ws_path: default_ws_path(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            outbound_queue: default_outbound_queue(),
            strict_catalog: default_strict_catalog(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !self.ws_path.starts_with('/') {
            return Err(TableSyncError::BadRequest(
                "gateway.ws_path must start with '/'".into(),
            ));
        }
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(TableSyncError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(TableSyncError::BadRequest(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(TableSyncError::BadRequest(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if !(1024..=16 * 1024 * 1024).contains(&self.max_frame_bytes) {
            return Err(TableSyncError::BadRequest(
                "gateway.max_frame_bytes must be between 1024 and 16777216".into(),
            ));
        }
        if !(16..=65536).contains(&self.outbound_queue) {
            return Err(TableSyncError::BadRequest(
                "gateway.outbound_queue must be between 16 and 65536".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ws_path() -> String {
    "/websocket".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_max_frame_bytes() -> usize {
    64 * 1024
}
fn default_outbound_queue() -> usize {
    1024
}
fn default_strict_catalog() -> bool {
    true
}

/// Who owns a session after its owner disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPolicy {
    /// Ownership stays vacant until a `campaignHost` request.
    #[default]
    Explicit,
    /// The campaign owner's account regains ownership on any rejoin.
    ReclaimOnRejoin,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsSection {
    #[serde(default)]
    pub ownership: OwnershipPolicy,

    /// Skip the owner guard (development only).
    #[serde(default)]
    pub disable_permissions: bool,

    /// Purge soft-deleted entries older than this while the session is open.
    /// Unset keeps them until the session is disposed.
    #[serde(default)]
    pub garbage_ttl_ms: Option<u64>,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            ownership: OwnershipPolicy::default(),
            disable_permissions: false,
            garbage_ttl_ms: None,
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl SessionsSection {
    pub fn validate(&self) -> Result<()> {
        if let Some(ttl) = self.garbage_ttl_ms {
            if ttl < 1000 {
                return Err(TableSyncError::BadRequest(
                    "sessions.garbage_ttl_ms must be at least 1000".into(),
                ));
            }
        }
        if !(1000..=3_600_000).contains(&self.sweep_interval_ms) {
            return Err(TableSyncError::BadRequest(
                "sessions.sweep_interval_ms must be between 1000 and 3600000".into(),
            ));
        }
        Ok(())
    }
}

fn default_sweep_interval_ms() -> u64 {
    60000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    #[serde(default = "default_tokens_per_board")]
    pub tokens_per_board: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            tokens_per_board: default_tokens_per_board(),
        }
    }
}

impl LimitsSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100_000).contains(&self.tokens_per_board) {
            return Err(TableSyncError::BadRequest(
                "limits.tokens_per_board must be between 1 and 100000".into(),
            ));
        }
        Ok(())
    }
}

fn default_tokens_per_board() -> usize {
    200
}
