use tablesync_core::dispatch::{CategoryHandlers, HandlerCategory};
use tablesync_core::error::{Result, TableSyncError};
use tablesync_core::protocol::catalog::names;
use tablesync_core::protocol::payloads::{AccountSnippet, Credentials};
use tablesync_core::protocol::HandlerOutcome;

use crate::context::HandlerCtx;

#[derive(Default)]
pub struct AccountHandlers;

impl HandlerCategory<HandlerCtx> for AccountHandlers {
    fn category(&self) -> &'static str {
        "account"
    }

    fn register(&self, handlers: &mut CategoryHandlers<HandlerCtx>) {
        handlers
            .on(names::LOGIN, login)
            .on(names::ACCOUNT_CREATE, account_create);
    }
}

fn check_credentials(c: &Credentials) -> Result<()> {
    if !c.email.contains('@') {
        return Err(TableSyncError::BadRequest("Invalid email address".into()));
    }
    if c.password.is_empty() {
        return Err(TableSyncError::BadRequest("Password must not be empty".into()));
    }
    Ok(())
}

async fn login(credentials: Credentials, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    if ctx.participant().is_logged_in() {
        return Err(TableSyncError::AlreadyExists("Already logged in".into()));
    }

    let account_id = ctx
        .app()
        .identity()
        .verify_credentials(&credentials.email, &credentials.password)
        .await?;
    ctx.participant().log_in(account_id.clone());
    tracing::info!(participant = ctx.participant().id(), %account_id, "logged in");

    let campaigns = ctx.repo().campaigns_of(&account_id).await?;
    HandlerOutcome::respond(&AccountSnippet {
        account_id,
        campaigns,
    })
}

async fn account_create(credentials: Credentials, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    check_credentials(&credentials)?;

    let account_id = ctx
        .app()
        .identity()
        .register_account(&credentials.email, &credentials.password)
        .await?;
    ctx.participant().log_in(account_id.clone());

    HandlerOutcome::respond(&AccountSnippet {
        account_id,
        campaigns: Vec::new(),
    })
}
