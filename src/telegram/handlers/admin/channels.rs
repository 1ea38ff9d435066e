//! Required-channel management: listing with stale markers, a structured
//! add flow, and inline removal.

use fluent_templates::fluent_bundle::FluentArgs;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};

use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::state::{ConversationState, Step};
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::DbConnection;
use crate::storage::settings::{self, RequiredChannel};
use crate::telegram::keyboards;

use super::super::HandlerDeps;

/// /channels: list the required channels, probing each so stale entries
/// (deleted channels, lost bot rights) are marked for pruning.
pub async fn list_channels(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let channels = settings::required_channels(conn)?;

    if channels.is_empty() {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "channels.empty"))
            .await?;
        return Ok(());
    }

    let mut probed = Vec::with_capacity(channels.len());
    let mut lines = vec![i18n::t(&ctx.lang, "channels.header")];
    for (idx, channel) in channels.into_iter().enumerate() {
        let stale = deps.bot.get_chat(Recipient::Id(ChatId(channel.channel_id))).await.is_err();
        let marker = if stale {
            format!(" {}", i18n::t(&ctx.lang, "channels.stale"))
        } else {
            String::new()
        };
        lines.push(format!("{}. {}{}", idx + 1, channel.label(), marker));
        probed.push((channel, stale));
    }

    deps.bot
        .send_message(ChatId(update.identity), lines.join("\n"))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::channels_keyboard(&probed))
        .await?;
    Ok(())
}

/// /addchannel: open the structured input flow.
pub async fn start_add(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    _conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    deps.responder
        .send_text(update.identity, i18n::t(&ctx.lang, "channels.add_instruction"))
        .await?;
    deps.states
        .set(update.identity, ConversationState::new(Step::ChannelInput))
        .await?;
    Ok(())
}

/// Step: resolve whatever the admin sent — a forwarded post, @username,
/// numeric id, or t.me link — into a channel and store it.
pub async fn receive_channel(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    // Forwarded channel posts carry everything we need.
    if let Some(forwarded) = update.forwarded_channel() {
        let invite_link = ctx.state.as_ref().and_then(|s| s.field("invite_link").map(String::from));
        let channel = RequiredChannel {
            channel_id: forwarded.channel_id,
            username: forwarded.username.clone(),
            title: forwarded.title.clone(),
            invite_link,
        };
        return store_channel(deps, update, ctx, conn, channel).await;
    }

    let text = update.text().unwrap_or_default().trim().to_string();

    // Private invite links cannot be resolved through the Bot API. Remember
    // the link and ask for something resolvable; the link is attached to the
    // channel when it is finally stored.
    if (text.contains("t.me/") || text.contains("telegram.me/")) && (text.contains("/+") || text.contains("joinchat")) {
        let mut state = ConversationState::new(Step::ChannelInput);
        state.set_field("invite_link", text.replace("telegram.me/", "t.me/"));
        deps.states.set(update.identity, state).await?;
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "channels.invalid"))
            .await?;
        return Ok(());
    }

    let recipient = if let Some(rest) = text.split("t.me/").nth(1) {
        // Public t.me link: take the username segment
        let username = rest.split(['/', '?']).next().unwrap_or_default().trim_start_matches('@');
        if username.is_empty() {
            return reject(deps, update, ctx).await;
        }
        Recipient::ChannelUsername(format!("@{}", username))
    } else if let Some(username) = text.strip_prefix('@') {
        if username.is_empty() {
            return reject(deps, update, ctx).await;
        }
        Recipient::ChannelUsername(format!("@{}", username))
    } else if let Ok(id) = text.parse::<i64>() {
        Recipient::Id(ChatId(id))
    } else {
        return reject(deps, update, ctx).await;
    };

    let chat = match deps.bot.get_chat(recipient).await {
        Ok(chat) => chat,
        Err(err) => {
            log::warn!("channel lookup failed for {:?}: {}", text, err);
            deps.responder
                .send_text(update.identity, i18n::t(&ctx.lang, "channels.not_found"))
                .await?;
            return Ok(());
        }
    };

    if !chat.is_channel() {
        return reject(deps, update, ctx).await;
    }

    let invite_link = ctx.state.as_ref().and_then(|s| s.field("invite_link").map(String::from));
    let channel = RequiredChannel {
        channel_id: chat.id.0,
        username: chat.username().map(|u| u.to_string()),
        title: chat.title().map(|t| t.to_string()),
        invite_link,
    };
    store_channel(deps, update, ctx, conn, channel).await
}

async fn store_channel(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
    channel: RequiredChannel,
) -> Result<(), HandlerError> {
    let label = channel.label();
    let added = settings::add_required_channel(conn, channel)?;
    deps.states.clear(update.identity).await?;

    if added {
        let mut args = FluentArgs::new();
        args.set("channel", label);
        deps.responder
            .send_text(update.identity, i18n::t_args(&ctx.lang, "channels.added", &args))
            .await?;
    } else {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "channels.exists"))
            .await?;
    }
    Ok(())
}

async fn reject(deps: &HandlerDeps, update: &Inbound, ctx: &RequestContext) -> Result<(), HandlerError> {
    deps.responder
        .send_text(update.identity, i18n::t(&ctx.lang, "channels.invalid"))
        .await?;
    Ok(())
}

/// Callback "channels:remove:<id>".
pub async fn handle_remove(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(channel_id) = update
        .callback_action()
        .and_then(|a| a.strip_prefix("channels:remove:"))
        .and_then(|n| n.parse::<i64>().ok())
    else {
        return Ok(());
    };

    let key = if settings::remove_required_channel(conn, channel_id)? {
        "channels.removed"
    } else {
        "channels.not_found"
    };
    deps.responder.send_text(update.identity, i18n::t(&ctx.lang, key)).await?;
    Ok(())
}
