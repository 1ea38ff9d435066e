//! /delete <id>

use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::DbConnection;
use crate::storage::files;

use super::super::HandlerDeps;

pub async fn handle_delete(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(id) = update.command_args().and_then(|args| args.parse::<i64>().ok()) else {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "delete.usage"))
            .await?;
        return Ok(());
    };

    let key = if files::delete_file(conn, id)? {
        "delete.success"
    } else {
        "delete.not_found"
    };
    deps.responder.send_text(update.identity, i18n::t(&ctx.lang, key)).await?;
    Ok(())
}
