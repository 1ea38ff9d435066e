//! Structured upload flow: awaiting-file → awaiting-title → awaiting-tags.
//!
//! The flow accumulates fields step by step and only an explicit /cancel
//! aborts it; stray commands route away and the flow resumes afterwards.

use fluent_templates::fluent_bundle::FluentArgs;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::state::{ConversationState, Step};
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::DbConnection;
use crate::storage::files::{self, FileInsert, FileKind};
use crate::telegram::keyboards;

use super::super::HandlerDeps;

/// /upload: open the flow.
pub async fn start_upload(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    _conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    deps.responder
        .send_text(update.identity, i18n::t(&ctx.lang, "upload.send_file"))
        .await?;
    deps.states
        .set(update.identity, ConversationState::new(Step::UploadFile))
        .await?;
    Ok(())
}

/// Step: receive the file. The router only routes matching content kinds
/// here, so an attachment is present.
pub async fn receive_file(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    _conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(attachment) = update.attachment() else {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "upload.send_file"))
            .await?;
        return Ok(());
    };

    let mut state = ConversationState::new(Step::UploadTitle);
    state.set_field("file_id", attachment.file_id.clone());
    state.set_field("kind", attachment.kind.as_str());
    if let Some(name) = &attachment.file_name {
        state.set_field("file_name", name.clone());
    }
    deps.states.set(update.identity, state).await?;

    deps.responder
        .send_text(update.identity, i18n::t(&ctx.lang, "upload.enter_title"))
        .await?;
    Ok(())
}

/// Step: receive the title and ask for tags.
pub async fn receive_title(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    _conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let title = update.text().unwrap_or_default().trim().to_string();
    if title.is_empty() {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "upload.enter_title"))
            .await?;
        return Ok(());
    }

    let Some(state) = &ctx.state else {
        return Ok(());
    };
    let mut next = state.advanced(Step::UploadTags);
    next.set_field("title", title);
    deps.states.set(update.identity, next).await?;

    deps.responder
        .send_text(update.identity, i18n::t(&ctx.lang, "upload.enter_tags"))
        .await?;
    Ok(())
}

/// Step: receive tags and finalize.
pub async fn receive_tags(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let tags = update.text().unwrap_or_default().trim().to_string();
    let tags = if tags.is_empty() { None } else { Some(tags) };
    finalize(deps, update, ctx, conn, tags).await
}

/// Writes the accumulated upload into the catalog. Shared with /skip, which
/// finalizes the flow without tags.
pub async fn finalize(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
    tags: Option<String>,
) -> Result<(), HandlerError> {
    let Some(state) = &ctx.state else {
        return Ok(());
    };
    let (Some(file_id), Some(title)) = (state.field("file_id"), state.field("title")) else {
        log::error!("upload flow for {} finalized without accumulated fields", update.identity);
        deps.states.clear(update.identity).await?;
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "errors.generic"))
            .await?;
        return Ok(());
    };

    let kind = FileKind::parse(state.field("kind").unwrap_or("document"));
    let inserted = files::create_file(conn, file_id, title, kind, state.field("file_name"), tags.as_deref())?;

    // The flow is complete either way; clear before responding.
    deps.states.clear(update.identity).await?;

    match inserted {
        FileInsert::Created(_) => {
            let mut args = FluentArgs::new();
            args.set("title", title);
            args.set("tags", tags.as_deref().unwrap_or("N/A"));
            deps.bot
                .send_message(ChatId(update.identity), i18n::t_args(&ctx.lang, "upload.success", &args))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboards::main_menu(&ctx.lang))
                .await?;
        }
        FileInsert::Duplicate => {
            deps.responder
                .send_text(update.identity, i18n::t(&ctx.lang, "upload.duplicate"))
                .await?;
        }
    }
    Ok(())
}
