//! /users — recent-user cards with block/unblock actions.

use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::core::config;
use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::{self, DbConnection, User};
use crate::telegram::keyboards;

use super::super::HandlerDeps;

fn user_card(user: &User) -> String {
    let status = if user.is_blocked { "🚫 <b>BLOCKED</b>" } else { "✅ Active" };
    format!(
        "👤 <b>{}</b>\n🆔 {}\n👤 @{}\n🌐 {}\n{}",
        user.full_name.as_deref().unwrap_or("Unknown"),
        user.telegram_id,
        user.username.as_deref().unwrap_or("N/A"),
        user.language,
        status
    )
}

pub async fn list_users(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let users = db::list_recent_users(conn, config::admin::USERS_PAGE_SIZE)?;

    if users.is_empty() {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "admin.users_empty"))
            .await?;
        return Ok(());
    }

    deps.bot
        .send_message(ChatId(update.identity), i18n::t(&ctx.lang, "admin.users_header"))
        .parse_mode(ParseMode::Html)
        .await?;

    for user in &users {
        deps.bot
            .send_message(ChatId(update.identity), user_card(user))
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboards::user_actions_keyboard(user, &ctx.lang))
            .await?;
    }
    Ok(())
}

fn parse_target(update: &Inbound, prefix: &str) -> Option<i64> {
    update
        .callback_action()
        .and_then(|a| a.strip_prefix(prefix))
        .and_then(|n| n.parse::<i64>().ok())
}

/// Callback "users:block:<id>".
pub async fn handle_block(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(target) = parse_target(update, "users:block:") else {
        return Ok(());
    };

    // Admins cannot block themselves out of the bot.
    if target == update.identity || target == *config::SUPERUSER_ID {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "errors.generic"))
            .await?;
        return Ok(());
    }

    if db::block_user(conn, target)? {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "admin.user_blocked"))
            .await?;
    }
    Ok(())
}

/// Callback "users:unblock:<id>".
pub async fn handle_unblock(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(target) = parse_target(update, "users:unblock:") else {
        return Ok(());
    };

    if db::unblock_user(conn, target)? {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "admin.user_unblocked"))
            .await?;
    }
    Ok(())
}
