//! File delivery and the personal saved list.

use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, ParseMode};

use crate::core::config;
use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::DbConnection;
use crate::storage::files::{self, FileKind, StoredFile};
use crate::telegram::keyboards;

use super::HandlerDeps;

fn parse_target(update: &Inbound, prefix: &str) -> Option<i64> {
    update
        .callback_action()
        .and_then(|a| a.strip_prefix(prefix))
        .and_then(|n| n.parse::<i64>().ok())
}

/// Callback "files:get:<id>": deliver the stored file by its Telegram handle
/// and log the download.
pub async fn handle_download(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(id) = parse_target(update, "files:get:") else {
        return Ok(());
    };

    let Some(file) = files::get_file(conn, id)? else {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "file.not_found"))
            .await?;
        return Ok(());
    };

    send_stored_file(deps, update.identity, &file).await?;
    files::record_download(conn, update.identity, file.id)?;
    Ok(())
}

/// Re-sends a cataloged file by file_id, choosing the matching send method.
pub async fn send_stored_file(deps: &HandlerDeps, identity: i64, file: &StoredFile) -> Result<(), HandlerError> {
    let input = InputFile::file_id(FileId(file.file_id.clone()));
    let chat = ChatId(identity);

    match file.kind {
        FileKind::Document => {
            deps.bot.send_document(chat, input).caption(file.title.clone()).await?;
        }
        FileKind::Audio => {
            deps.bot.send_audio(chat, input).caption(file.title.clone()).await?;
        }
        FileKind::Video => {
            deps.bot.send_video(chat, input).caption(file.title.clone()).await?;
        }
    }
    Ok(())
}

/// Callback "files:save:<id>": add to the saved list.
pub async fn handle_save(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(id) = parse_target(update, "files:save:") else {
        return Ok(());
    };

    if files::get_file(conn, id)?.is_none() {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "file.not_found"))
            .await?;
        return Ok(());
    }

    let key = if files::save_file(conn, update.identity, id)? {
        "file.saved_ok"
    } else {
        "file.already_saved"
    };
    deps.responder.send_text(update.identity, i18n::t(&ctx.lang, key)).await?;
    Ok(())
}

/// Callback "files:unsave:<id>": drop from the saved list.
pub async fn handle_unsave(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(id) = parse_target(update, "files:unsave:") else {
        return Ok(());
    };

    let key = if files::remove_saved(conn, update.identity, id)? {
        "file.removed"
    } else {
        "file.not_found"
    };
    deps.responder.send_text(update.identity, i18n::t(&ctx.lang, key)).await?;
    Ok(())
}

/// /saved or the menu button: list saved files with per-entry actions.
pub async fn show_saved(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let saved = files::saved_files(conn, update.identity, config::saved::PAGE_SIZE)?;

    if saved.is_empty() {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "saved.empty"))
            .await?;
        return Ok(());
    }

    deps.bot
        .send_message(ChatId(update.identity), i18n::t(&ctx.lang, "saved.header"))
        .parse_mode(ParseMode::Html)
        .await?;

    for file in &saved {
        deps.bot
            .send_message(ChatId(update.identity), format!("<b>{}</b>", file.title))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::saved_entry_keyboard(file.id, &ctx.lang))
            .await?;
    }
    Ok(())
}
