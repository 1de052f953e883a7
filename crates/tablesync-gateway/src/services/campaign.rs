//! Campaign lifecycle and token templates.
//!
//! `campaignCreate`, `campaignHost` and `campaignJoin` all end in a session
//! enter and answer with the caller's snapshot of it. Template deletion is
//! soft: templates go to the session garbage and can be restored until the
//! session is disposed.

use tablesync_core::dispatch::{CategoryHandlers, HandlerCategory};
use tablesync_core::error::{Result, TableSyncError};
use tablesync_core::protocol::catalog::names;
use tablesync_core::protocol::payloads::{
    AssetCreated, AssetSnippet, CampaignCreate, CampaignEdit, CampaignRef, TokenTemplateCreated,
    TokenTemplateIds, TokenTemplateSnippet, Uuid,
};
use tablesync_core::protocol::HandlerOutcome;

use crate::app_state::AppState;
use crate::context::HandlerCtx;
use crate::realtime::{DeletedTokenTemplate, EnterMode};

#[derive(Default)]
pub struct CampaignHandlers;

impl HandlerCategory<HandlerCtx> for CampaignHandlers {
    fn category(&self) -> &'static str {
        "campaign"
    }

    fn register(&self, handlers: &mut CategoryHandlers<HandlerCtx>) {
        handlers
            .on(names::CAMPAIGN_CREATE, campaign_create)
            .on(names::CAMPAIGN_EDIT, campaign_edit)
            .on(names::CAMPAIGN_HOST, campaign_host)
            .on(names::CAMPAIGN_JOIN, campaign_join)
            .on(names::TOKEN_TEMPLATES_DELETE, token_templates_delete)
            .on(names::TOKEN_TEMPLATES_RESTORE, token_templates_restore);
    }
}

fn campaign_name(raw: &str) -> Result<&str> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(TableSyncError::BadRequest(
            "Campaign name must not be empty".into(),
        ));
    }
    Ok(name)
}

async fn campaign_create(req: CampaignCreate, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let account_id = ctx.logged_in_account()?;
    let name = campaign_name(&req.name)?;

    let campaign = ctx.repo().create_campaign(&account_id, name).await?;
    tracing::info!(campaign_id = %campaign.id, %account_id, "campaign created");

    let snapshot = ctx
        .app()
        .sessions()
        .enter(&campaign.id, ctx.participant(), EnterMode::Host)
        .await?;
    HandlerOutcome::respond(&snapshot)
}

async fn campaign_edit(req: CampaignEdit, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let account_id = ctx.logged_in_account()?;
    let name = campaign_name(&req.name)?;

    let card = ctx.repo().rename_campaign(&account_id, &req.id, name).await?;
    HandlerOutcome::respond(&card)
}

async fn campaign_host(req: CampaignRef, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let account_id = ctx.logged_in_account()?;

    let owned = ctx.repo().campaigns_of(&account_id).await?;
    if !owned.iter().any(|c| c.id == req.id) {
        return Err(TableSyncError::NotAuthorized(
            "You must be the owner of this campaign to be able to host".into(),
        ));
    }

    let snapshot = ctx
        .app()
        .sessions()
        .enter(&req.id, ctx.participant(), EnterMode::Host)
        .await?;
    HandlerOutcome::respond(&snapshot)
}

async fn campaign_join(req: CampaignRef, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let snapshot = ctx
        .app()
        .sessions()
        .enter(&req.id, ctx.participant(), EnterMode::Join)
        .await?;
    HandlerOutcome::respond(&snapshot)
}

async fn token_templates_delete(req: TokenTemplateIds, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session_as_owner()?;

    let found = ctx
        .repo()
        .find_token_templates(session.id(), &req.token_template_ids)
        .await?;

    let garbage = &session.garbage().token_templates;
    let mut token_template_ids = Vec::with_capacity(found.len());
    for template in found {
        token_template_ids.push(template.id.clone());
        garbage.mark_for_deletion(
            template.id.clone(),
            DeletedTokenTemplate {
                token_template: template,
            },
        );
    }
    tracing::debug!(session_id = session.id(), count = token_template_ids.len(), "templates marked");

    HandlerOutcome::forward(&TokenTemplateIds { token_template_ids })
}

async fn token_templates_restore(req: TokenTemplateIds, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session_as_owner()?;

    let restored = session
        .garbage()
        .token_templates
        .restore_many(&req.token_template_ids);
    for deleted in restored {
        session
            .broadcast_except(
                None,
                names::TOKEN_TEMPLATE_CREATE,
                &TokenTemplateCreated {
                    token_template: deleted.token_template,
                },
            )
            .await?;
    }
    Ok(HandlerOutcome::Ack)
}

/// Create a token template outside of any client request (asset upload
/// pipeline) and announce it to the open session of `campaign_id`.
pub async fn publish_token_template(
    app: &AppState,
    campaign_id: &str,
    name: &str,
    avatar_id: Option<Uuid>,
) -> Result<TokenTemplateSnippet> {
    let template = app
        .repo()
        .create_token_template(campaign_id, name, avatar_id)
        .await?;
    app.sessions()
        .broadcast(
            campaign_id,
            names::TOKEN_TEMPLATE_CREATE,
            &TokenTemplateCreated {
                token_template: template.clone(),
            },
        )
        .await?;
    Ok(template)
}

/// Register an uploaded asset and announce it to the open session.
pub async fn publish_asset(
    app: &AppState,
    campaign_id: &str,
    path: &str,
    mime_type: &str,
) -> Result<AssetSnippet> {
    let asset = app.repo().create_asset(campaign_id, path, mime_type).await?;
    app.sessions()
        .broadcast(
            campaign_id,
            names::ASSET_CREATE,
            &AssetCreated {
                asset: asset.clone(),
            },
        )
        .await?;
    Ok(asset)
}
