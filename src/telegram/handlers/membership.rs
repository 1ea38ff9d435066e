//! The "I joined, please recheck" callback.
//!
//! This is the one action the gate lets through while otherwise denying: its
//! whole job is to re-run the identical membership sweep and answer with a
//! fresh verdict, so the user can self-heal after joining.

use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::i18n;
use crate::pipeline::membership::verify_membership;
use crate::pipeline::responder::JoinPrompt;
use crate::pipeline::router::HandlerError;
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::DbConnection;
use crate::storage::settings;
use crate::telegram::keyboards;

use super::HandlerDeps;

pub async fn handle_confirm(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let channels = settings::required_channels(conn)?;

    if channels.is_empty() {
        // The admin removed the requirement while the prompt was on screen.
        return welcome_back(deps, update, ctx).await;
    }

    let report = verify_membership(deps.oracle.as_ref(), update.identity, &channels).await;

    if !report.missing.is_empty() {
        let prompt = JoinPrompt::for_channels(&ctx.lang, "membership.still_missing", &report.missing);
        deps.responder.send_join_prompt(update.identity, prompt).await?;
        return Ok(());
    }

    if !report.unverifiable.is_empty() {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "membership.unverifiable"))
            .await?;
        return Ok(());
    }

    welcome_back(deps, update, ctx).await
}

async fn welcome_back(deps: &HandlerDeps, update: &Inbound, ctx: &RequestContext) -> Result<(), HandlerError> {
    deps.bot
        .send_message(ChatId(update.identity), i18n::t(&ctx.lang, "membership.joined_success"))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::main_menu(&ctx.lang))
        .await?;
    Ok(())
}
