//! /stats — totals for operators.

use fluent_templates::fluent_bundle::FluentArgs;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::{self, DbConnection};
use crate::storage::files;

use super::super::HandlerDeps;

pub async fn handle_stats(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let users = db::count_users(conn)?;
    let file_count = files::count_files(conn)?;
    let downloads = files::count_downloads(conn)?;

    let mut args = FluentArgs::new();
    args.set("users", users);
    args.set("files", file_count);
    args.set("downloads", downloads);

    deps.bot
        .send_message(ChatId(update.identity), i18n::t_args(&ctx.lang, "admin.stats", &args))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}
