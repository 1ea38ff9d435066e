//! Start, help, language selection and the menu fallback.

use fluent_templates::fluent_bundle::FluentArgs;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::core::config;
use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::{self, DbConnection};
use crate::storage::settings;
use crate::telegram::bot::setup_chat_commands;
use crate::telegram::keyboards;

use super::HandlerDeps;

/// /start: refresh the per-chat command menu and show the main menu.
pub async fn handle_start(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let is_admin = ctx.user().map(|u| u.is_admin).unwrap_or(false) || update.identity == *config::SUPERUSER_ID;

    // Best effort: a failed menu refresh must not block the welcome.
    if let Err(err) = setup_chat_commands(&deps.bot, ChatId(update.identity), is_admin).await {
        log::warn!("failed to update command menu for {}: {}", update.identity, err);
    }

    show_menu(deps, update, ctx, conn).await
}

/// Welcome text plus the reply-keyboard main menu. Also the router fallback,
/// so unmatched free text always gets a useful response.
pub async fn show_menu(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    _conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    deps.bot
        .send_message(ChatId(update.identity), i18n::t(&ctx.lang, "welcome"))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::main_menu(&ctx.lang))
        .await?;
    Ok(())
}

/// /help: localized usage text with the admin contact.
pub async fn handle_help(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let contact = settings::admin_contact(conn);
    let mut args = FluentArgs::new();
    args.set("admin", contact);

    deps.bot
        .send_message(ChatId(update.identity), i18n::t_args(&ctx.lang, "help.text", &args))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

/// Menu button: show the inline language picker.
pub async fn show_language_menu(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    _conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    deps.bot
        .send_message(ChatId(update.identity), i18n::t(&ctx.lang, "language.select"))
        .reply_markup(keyboards::language_keyboard())
        .await?;
    Ok(())
}

/// Callback "lang:<code>": persist the choice and confirm in the new language.
pub async fn handle_language_select(
    deps: &HandlerDeps,
    update: &Inbound,
    _ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let code = update
        .callback_action()
        .and_then(|action| action.strip_prefix("lang:"))
        .and_then(i18n::is_language_supported);

    let Some(code) = code else {
        log::warn!("unsupported language selection from {}", update.identity);
        return Ok(());
    };

    db::set_user_language(conn, update.identity, code)?;
    let new_lang = i18n::lang_from_code(code);

    deps.bot
        .send_message(ChatId(update.identity), i18n::t(&new_lang, "language.changed"))
        .reply_markup(keyboards::main_menu(&new_lang))
        .await?;
    Ok(())
}
