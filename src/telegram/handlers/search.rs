//! Search flow: free-text prompt, paginated inline results, file cards.

use fluent_templates::fluent_bundle::FluentArgs;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};

use crate::core::config;
use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::state::{ConversationState, Step};
use crate::pipeline::{Inbound, InboundKind, RequestContext};
use crate::storage::db::DbConnection;
use crate::storage::files::{self, StoredFile};
use crate::telegram::keyboards;

use super::HandlerDeps;

/// /search or the menu button: prompt for a query and open the free-text step.
pub async fn start_search(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    _conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    deps.bot
        .send_message(ChatId(update.identity), i18n::t(&ctx.lang, "search.prompt"))
        .parse_mode(ParseMode::Html)
        .await?;
    deps.states
        .set(update.identity, ConversationState::new(Step::SearchQuery))
        .await?;
    Ok(())
}

/// Step endpoint: run the query. On an empty result the state stays active
/// so the user can just type another query.
pub async fn process_query(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let query = update.text().unwrap_or_default().trim().to_string();
    if query.is_empty() {
        deps.bot
            .send_message(ChatId(update.identity), i18n::t(&ctx.lang, "search.prompt"))
            .parse_mode(ParseMode::Html)
            .await?;
        return Ok(());
    }

    let found = files::search_files(conn, &query, config::search::MAX_RESULTS)?;

    if found.is_empty() {
        deps.bot
            .send_message(ChatId(update.identity), i18n::t(&ctx.lang, "search.no_results"))
            .await?;
        return Ok(());
    }

    deps.search_cache
        .set(update.identity, query.clone(), found.iter().map(|f| f.id).collect())
        .await;
    deps.states.clear(update.identity).await?;

    let (text, keyboard) = render_page(&found, 0, &query, ctx);
    deps.bot
        .send_message(ChatId(update.identity), text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

/// Callback "search:page:<n>": re-render the results message in place.
pub async fn handle_page(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(page) = update
        .callback_action()
        .and_then(|a| a.strip_prefix("search:page:"))
        .and_then(|n| n.parse::<usize>().ok())
    else {
        return Ok(());
    };

    let Some(cached) = deps.search_cache.get(update.identity).await else {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "search.expired"))
            .await?;
        return Ok(());
    };

    let found = resolve_cached(conn, &cached.file_ids)?;
    if found.is_empty() {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "search.no_results"))
            .await?;
        return Ok(());
    }

    let total_pages = found.len().div_ceil(config::search::PAGE_SIZE);
    let page = page.min(total_pages.saturating_sub(1));
    let (text, keyboard) = render_page(&found, page, &cached.query, ctx);

    if let InboundKind::Callback {
        message_id: Some(message_id),
        ..
    } = update.kind
    {
        deps.bot
            .edit_message_text(ChatId(update.identity), MessageId(message_id), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
    } else {
        deps.bot
            .send_message(ChatId(update.identity), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
    }
    Ok(())
}

/// Callback "search:file:<id>": show the file card with actions.
pub async fn handle_result_open(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(file_id) = update
        .callback_action()
        .and_then(|a| a.strip_prefix("search:file:"))
        .and_then(|n| n.parse::<i64>().ok())
    else {
        return Ok(());
    };

    let Some(file) = files::get_file(conn, file_id)? else {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "file.not_found"))
            .await?;
        return Ok(());
    };

    let mut card = format!("<b>{}</b>", file.title);
    if let Some(tags) = &file.tags {
        let mut args = FluentArgs::new();
        args.set("tags", tags.as_str());
        card.push('\n');
        card.push_str(&i18n::t_args(&ctx.lang, "file.tags", &args));
    }

    deps.bot
        .send_message(ChatId(update.identity), card)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::file_actions_keyboard(file.id, &ctx.lang))
        .await?;
    Ok(())
}

fn resolve_cached(conn: &mut DbConnection, ids: &[i64]) -> Result<Vec<StoredFile>, HandlerError> {
    let mut found = Vec::with_capacity(ids.len());
    for id in ids {
        // Files deleted since the search silently drop off the result set
        if let Some(file) = files::get_file(conn, *id)? {
            found.push(file);
        }
    }
    Ok(found)
}

fn render_page(
    found: &[StoredFile],
    page: usize,
    query: &str,
    ctx: &RequestContext,
) -> (String, teloxide::types::InlineKeyboardMarkup) {
    let total_pages = found.len().div_ceil(config::search::PAGE_SIZE).max(1);
    let start = page * config::search::PAGE_SIZE;
    let end = (start + config::search::PAGE_SIZE).min(found.len());
    let page_files = &found[start..end];

    let mut args = FluentArgs::new();
    args.set("query", query);
    let text = i18n::t_args(&ctx.lang, "search.header", &args);
    let keyboard = keyboards::search_results_keyboard(page_files, page, total_pages, &ctx.lang);
    (text, keyboard)
}
