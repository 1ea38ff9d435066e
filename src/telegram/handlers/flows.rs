//! Flow-control commands shared by every multi-step flow.

use crate::i18n;
use crate::pipeline::router::HandlerError;
use crate::pipeline::state::Step;
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::DbConnection;

use super::HandlerDeps;

/// /cancel: the explicit abort for structured flows (and a no-op answer when
/// nothing is active). Free-text flows never need it — any command clears
/// them — but it works there too.
pub async fn handle_cancel(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    _conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    let Some(state) = &ctx.state else {
        deps.responder
            .send_text(update.identity, i18n::t(&ctx.lang, "cancel.nothing"))
            .await?;
        return Ok(());
    };

    deps.states.clear(update.identity).await?;

    let key = match state.step {
        Step::UploadFile | Step::UploadTitle | Step::UploadTags => "upload.cancelled",
        _ => "cancel.done",
    };
    deps.responder.send_text(update.identity, i18n::t(&ctx.lang, key)).await?;
    Ok(())
}

/// /skip: advances optional structured steps. Currently only the tags step
/// of the upload flow is optional.
pub async fn handle_skip(
    deps: &HandlerDeps,
    update: &Inbound,
    ctx: &RequestContext,
    conn: &mut DbConnection,
) -> Result<(), HandlerError> {
    match ctx.state.as_ref().map(|s| s.step) {
        Some(Step::UploadTags) => super::admin::upload::finalize(deps, update, ctx, conn, None).await,
        _ => {
            deps.responder
                .send_text(update.identity, i18n::t(&ctx.lang, "cancel.nothing"))
                .await?;
            Ok(())
        }
    }
}
