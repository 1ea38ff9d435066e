//! Endpoint implementations and router assembly.

pub mod admin;
pub mod files;
pub mod flows;
pub mod membership;
pub mod search;
pub mod start;

use std::sync::Arc;

use crate::core::audit::AuditSink;
use crate::pipeline::gate::GateChain;
use crate::pipeline::membership::{MembershipOracle, CONFIRM_ACTION};
use crate::pipeline::responder::Responder;
use crate::pipeline::router::{Endpoint, EndpointFuture, Pattern, Router, RouterBuilder};
use crate::pipeline::state::{StateStore, Step};
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::{Capability, DbConnection, DbPool};
use crate::telegram::cache::SearchCache;
use crate::telegram::Bot;

/// Dependencies shared by all endpoints.
#[derive(Clone)]
pub struct HandlerDeps {
    pub bot: Bot,
    pub states: Arc<dyn StateStore>,
    pub oracle: Arc<dyn MembershipOracle>,
    pub responder: Arc<dyn Responder>,
    pub search_cache: Arc<SearchCache>,
}

/// Uniform endpoint function shape every handler compiles down to.
type HandlerFn = for<'a> fn(HandlerDeps, &'a Inbound, &'a RequestContext, &'a mut DbConnection) -> EndpointFuture<'a>;

fn endpoint(deps: &HandlerDeps, f: HandlerFn) -> Endpoint {
    let deps = deps.clone();
    Arc::new(move |update, ctx, conn| f(deps.clone(), update, ctx, conn))
}

/// Adapts `async fn(&HandlerDeps, &Inbound, &RequestContext, &mut DbConnection)`
/// handlers into registered endpoints.
macro_rules! ep {
    ($deps:expr, $handler:path) => {{
        fn wrap<'a>(
            deps: HandlerDeps,
            update: &'a Inbound,
            ctx: &'a RequestContext,
            conn: &'a mut DbConnection,
        ) -> EndpointFuture<'a> {
            Box::pin(async move { $handler(&deps, update, ctx, conn).await })
        }
        endpoint($deps, wrap)
    }};
}

/// Builds the production router: gate chain, command/menu/callback rules in
/// match order, step endpoints and the menu fallback.
pub fn build_router(
    deps: HandlerDeps,
    pool: Arc<DbPool>,
    gate: GateChain,
    responder: Arc<dyn Responder>,
    audit: Arc<dyn AuditSink>,
) -> Router {
    let states = Arc::clone(&deps.states);

    RouterBuilder::new(pool, gate, states, responder, audit)
        // Commands and menu buttons
        .rule("cmd:start", Pattern::Command("start"), ep!(&deps, start::handle_start))
        .rule("cmd:help", Pattern::Command("help"), ep!(&deps, start::handle_help))
        .rule("menu:help", Pattern::MenuButton("menu.help"), ep!(&deps, start::handle_help))
        .rule("cmd:search", Pattern::Command("search"), ep!(&deps, search::start_search))
        .rule(
            "menu:search",
            Pattern::MenuButton("menu.search"),
            ep!(&deps, search::start_search),
        )
        .rule("cmd:saved", Pattern::Command("saved"), ep!(&deps, files::show_saved))
        .rule("menu:saved", Pattern::MenuButton("menu.saved"), ep!(&deps, files::show_saved))
        .rule(
            "menu:language",
            Pattern::MenuButton("menu.language"),
            ep!(&deps, start::show_language_menu),
        )
        .rule("cmd:cancel", Pattern::Command("cancel"), ep!(&deps, flows::handle_cancel))
        .rule("cmd:skip", Pattern::Command("skip"), ep!(&deps, flows::handle_skip))
        // Admin commands, capability-guarded at the gate's permission stage
        .guarded(
            "cmd:upload",
            Pattern::Command("upload"),
            Capability::Upload,
            ep!(&deps, admin::upload::start_upload),
        )
        .guarded(
            "cmd:delete",
            Pattern::Command("delete"),
            Capability::Delete,
            ep!(&deps, admin::delete::handle_delete),
        )
        .guarded(
            "cmd:stats",
            Pattern::Command("stats"),
            Capability::Stats,
            ep!(&deps, admin::stats::handle_stats),
        )
        .guarded(
            "cmd:users",
            Pattern::Command("users"),
            Capability::Users,
            ep!(&deps, admin::users::list_users),
        )
        .guarded(
            "cmd:broadcast",
            Pattern::Command("broadcast"),
            Capability::Broadcast,
            ep!(&deps, admin::broadcast::start_broadcast),
        )
        .guarded(
            "cmd:channels",
            Pattern::Command("channels"),
            Capability::Channels,
            ep!(&deps, admin::channels::list_channels),
        )
        .guarded(
            "cmd:addchannel",
            Pattern::Command("addchannel"),
            Capability::Channels,
            ep!(&deps, admin::channels::start_add),
        )
        // Callback actions
        .rule(
            "cb:membership_confirm",
            Pattern::Callback(CONFIRM_ACTION),
            ep!(&deps, membership::handle_confirm),
        )
        .rule(
            "cb:lang",
            Pattern::Callback("lang"),
            ep!(&deps, start::handle_language_select),
        )
        .rule(
            "cb:search_file",
            Pattern::Callback("search:file"),
            ep!(&deps, search::handle_result_open),
        )
        .rule(
            "cb:search_page",
            Pattern::Callback("search:page"),
            ep!(&deps, search::handle_page),
        )
        .rule(
            "cb:files_get",
            Pattern::Callback("files:get"),
            ep!(&deps, files::handle_download),
        )
        .rule(
            "cb:files_save",
            Pattern::Callback("files:save"),
            ep!(&deps, files::handle_save),
        )
        .rule(
            "cb:files_unsave",
            Pattern::Callback("files:unsave"),
            ep!(&deps, files::handle_unsave),
        )
        .guarded(
            "cb:users_block",
            Pattern::Callback("users:block"),
            Capability::Users,
            ep!(&deps, admin::users::handle_block),
        )
        .guarded(
            "cb:users_unblock",
            Pattern::Callback("users:unblock"),
            Capability::Users,
            ep!(&deps, admin::users::handle_unblock),
        )
        .guarded(
            "cb:channels_remove",
            Pattern::Callback("channels:remove"),
            Capability::Channels,
            ep!(&deps, admin::channels::handle_remove),
        )
        // Conversation steps
        .step(Step::SearchQuery, ep!(&deps, search::process_query))
        .step(Step::UploadFile, ep!(&deps, admin::upload::receive_file))
        .step(Step::UploadTitle, ep!(&deps, admin::upload::receive_title))
        .step(Step::UploadTags, ep!(&deps, admin::upload::receive_tags))
        .step(Step::ChannelInput, ep!(&deps, admin::channels::receive_channel))
        .step(Step::BroadcastMessage, ep!(&deps, admin::broadcast::receive_message))
        // Anything else gets the menu, never silence
        .fallback(ep!(&deps, start::show_menu))
        .build()
}
