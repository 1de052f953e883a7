use tablesync_core::dispatch::{CategoryHandlers, HandlerCategory};
use tablesync_core::error::{Result, TableSyncError};
use tablesync_core::protocol::catalog::names;
use tablesync_core::protocol::payloads::{
    BoardCreate, BoardRef, Position, TokenCreate, TokenCreated, TokenIds, TokensEdit, TokensMove,
};
use tablesync_core::protocol::HandlerOutcome;

use crate::context::HandlerCtx;
use crate::realtime::DeletedToken;

const DEFAULT_BOARD_NAME: &str = "Untitled board";

#[derive(Default)]
pub struct BoardHandlers;

impl HandlerCategory<HandlerCtx> for BoardHandlers {
    fn category(&self) -> &'static str {
        "board"
    }

    fn register(&self, handlers: &mut CategoryHandlers<HandlerCtx>) {
        handlers
            .on(names::BOARD_CREATE, board_create)
            .on(names::BOARD_EDIT, board_edit)
            .on(names::BOARD_PLAY, board_play)
            .on(names::TOKEN_CREATE, token_create)
            .on(names::TOKENS_DELETE, tokens_delete)
            .on(names::TOKENS_RESTORE, tokens_restore)
            .on(names::TOKENS_EDIT, tokens_edit)
            .on(names::TOKENS_MOVE, tokens_move);
    }
}

async fn board_create(req: BoardCreate, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session_as_owner()?;

    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_BOARD_NAME);
    let board = ctx.repo().create_board(session.id(), name).await?;
    HandlerOutcome::respond(&board)
}

/// Open a board for the owner only.
async fn board_edit(req: BoardRef, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session_as_owner()?;

    let mut board = ctx.repo().find_board(session.id(), &req.id).await?;
    ctx.participant().set_visible_board(Some(board.id.clone()));
    session.redact_board(&mut board);
    HandlerOutcome::respond(&board)
}

/// Make a board the one every participant sees.
async fn board_play(req: BoardRef, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session_as_owner()?;

    let mut board = ctx.repo().find_board(session.id(), &req.id).await?;
    ctx.repo().select_board(session.id(), &board.id).await?;
    for p in session.participants() {
        p.set_visible_board(Some(board.id.clone()));
    }
    session.redact_board(&mut board);
    HandlerOutcome::public(&board)
}

async fn token_create(req: TokenCreate, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session_as_owner()?;
    let board_id = ctx.visible_board()?;

    let info = ctx.repo().board_info(&board_id).await?;
    if info.campaign_id != session.id() {
        return Err(TableSyncError::NotAuthorized(
            "Board is not part of the hosted campaign".into(),
        ));
    }
    if info.token_count + 1 > ctx.app().cfg().limits.tokens_per_board {
        return Err(TableSyncError::LimitExceeded(
            "Resulting token count exceeds maximum tokens per board".into(),
        ));
    }
    if session
        .garbage()
        .token_templates
        .is_marked_for_deletion(&req.template_id)
    {
        return Err(TableSyncError::NotFound(format!(
            "token template {}",
            req.template_id
        )));
    }

    let token = ctx
        .repo()
        .create_token(&board_id, &req.template_id, Position { x: req.x, y: req.y })
        .await?;
    HandlerOutcome::public(&TokenCreated { board_id, token })
}

async fn tokens_delete(req: TokenIds, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session_as_owner()?;
    let board_id = ctx.visible_board()?;

    let found = ctx.repo().find_tokens(&board_id, &req.token_ids).await?;
    let mut token_ids = Vec::with_capacity(found.len());
    for token in found {
        token_ids.push(token.id.clone());
        session.garbage().tokens.mark_for_deletion(
            token.id.clone(),
            DeletedToken {
                board_id: board_id.clone(),
                token,
            },
        );
    }

    HandlerOutcome::forward(&TokenIds { token_ids })
}

/// Restored tokens are re-announced to everyone, the caller included.
async fn tokens_restore(req: TokenIds, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session_as_owner()?;

    for deleted in session.garbage().tokens.restore_many(&req.token_ids) {
        session
            .broadcast_except(
                None,
                names::TOKEN_CREATE,
                &TokenCreated {
                    board_id: deleted.board_id,
                    token: deleted.token,
                },
            )
            .await?;
    }
    Ok(HandlerOutcome::Ack)
}

/// Soft-deleted tokens and templates are left alone and not forwarded.
async fn tokens_edit(mut req: TokensEdit, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session_as_owner()?;
    let garbage = session.garbage();

    req.edited_token_template = req
        .edited_token_template
        .filter(|e| !garbage.token_templates.is_marked_for_deletion(&e.token_template_id));
    req.edited_tokens
        .retain(|token_id, _| !garbage.tokens.is_marked_for_deletion(token_id));

    if let Some(edited) = &req.edited_token_template {
        ctx.repo()
            .update_token_template(session.id(), &edited.token_template_id, &edited.new_properties)
            .await?;
    }
    if !req.edited_tokens.is_empty() {
        let board_id = ctx.visible_board()?;
        for (token_id, properties) in &req.edited_tokens {
            ctx.repo()
                .update_token(&board_id, token_id, properties)
                .await?;
        }
    }

    HandlerOutcome::forward(&req)
}

/// Any participant may move tokens.
async fn tokens_move(mut req: TokensMove, ctx: HandlerCtx) -> Result<HandlerOutcome> {
    let session = ctx.session()?;
    let board_id = ctx.visible_board()?;

    req.retain(|token_id, _| !session.garbage().tokens.is_marked_for_deletion(token_id));
    for (token_id, position) in &req {
        ctx.repo().move_token(&board_id, token_id, *position).await?;
    }

    HandlerOutcome::forward(&req)
}
