//! Broadcast flow: one structured step, then background fan-out.
//!
//! The fan-out runs in a spawned task so the admin's dispatch slot frees up
//! immediately; the delivery report arrives as a follow-up message. Sends
//! honor Telegram's flood-control hints via the retry helper.

use fluent_templates::fluent_bundle::FluentArgs;
use teloxide::prelude::*;

use crate::core::config;
use crate::core::retry::{retry, RetryConfig};
use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::state::{ConversationState, Step};
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::{self, DbConnection};
use crate::telegram::Bot;

use super::super::HandlerDeps;

/// /broadcast: open the flow.
pub async fn start_broadcast(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    _conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    deps.responder
        .send_text(update.identity, i18n::t(&ctx.lang, "broadcast.prompt"))
        .await?;
    deps.states
        .set(update.identity, ConversationState::new(Step::BroadcastMessage))
        .await?;
    Ok(())
}

/// Step: receive the message text and start the fan-out.
pub async fn receive_message(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let text = update.text().unwrap_or_default().trim().to_string();
    if text.is_empty() {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "broadcast.prompt"))
            .await?;
        return Ok(());
    }

    // Snapshot the audience before leaving the unit of work.
    let audience = db::all_active_ids(conn)?;
    deps.states.clear(update.identity).await?;

    deps.responder
        .send_text(update.identity, i18n::t(&ctx.lang, "broadcast.started"))
        .await?;

    let bot = deps.bot.clone();
    let admin = update.identity;
    let lang = ctx.lang.clone();
    tokio::spawn(async move {
        let delivered = fan_out(&bot, &audience, &text).await;

        let mut args = FluentArgs::new();
        args.set("count", delivered);
        if let Err(err) = bot.send_message(ChatId(admin), i18n::t_args(&lang, "broadcast.sent", &args)).await {
            log::error!("failed to deliver broadcast report to {}: {}", admin, err);
        }
    });

    Ok(())
}

async fn fan_out(bot: &Bot, audience: &[i64], text: &str) -> usize {
    let mut delivered = 0usize;

    for &target in audience {
        let result = retry(&RetryConfig::rate_limit(), || async {
            bot.send_message(ChatId(target), text.to_string()).await
        })
        .await
        .into_result();

        match result {
            Ok(_) => delivered += 1,
            // Users who blocked the bot are an expected miss, not an error.
            Err(err) => log::warn!("broadcast to {} failed: {}", target, err),
        }

        tokio::time::sleep(config::broadcast::send_pause()).await;
    }

    log::info!("broadcast finished: {}/{} delivered", delivered, audience.len());
    delivered
}
