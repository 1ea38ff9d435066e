//! End-to-end dispatch tests: gate + state machine + routing over fakes.

mod common;

use std::sync::Arc;

use common::{cb, msg, TestEnv};
use pretty_assertions::assert_eq;

use teleshelf::pipeline::gate::GateChain;
use teleshelf::pipeline::membership::{Verdict, CONFIRM_ACTION};
use teleshelf::pipeline::router::{Pattern, Router, RouterBuilder};
use teleshelf::pipeline::state::{ConversationState, StateStore, Step};
use teleshelf::storage::db::{self, Capability};

/// A router wired like production (standard gate, same escape rules), with
/// recording endpoints instead of Telegram handlers.
fn build_router(env: &TestEnv) -> Router {
    let gate = GateChain::standard(env.oracle.clone(), 0);

    RouterBuilder::new(
        env.pool.clone(),
        gate,
        env.states.clone(),
        env.responder.clone(),
        env.audit.clone(),
    )
    .rule("cmd:start", Pattern::Command("start"), env.recording_endpoint("start"))
    .rule("menu:help", Pattern::MenuButton("menu.help"), env.recording_endpoint("help"))
    .rule(
        "cmd:search",
        Pattern::Command("search"),
        env.flow_opening_endpoint("search", Step::SearchQuery),
    )
    .rule(
        "cmd:upload",
        Pattern::Command("upload"),
        env.flow_opening_endpoint("upload", Step::UploadFile),
    )
    .rule("cmd:cancel", Pattern::Command("cancel"), env.cancelling_endpoint("cancel", "cancelled"))
    .rule("cmd:stats", Pattern::Command("stats"), env.recording_endpoint("stats"))
    .guarded(
        "cmd:broadcast",
        Pattern::Command("broadcast"),
        Capability::Broadcast,
        env.recording_endpoint("broadcast"),
    )
    .rule(
        "cb:confirm",
        Pattern::Callback(CONFIRM_ACTION),
        env.replying_endpoint("confirm", "welcome back"),
    )
    .rule("cmd:boom", Pattern::Command("boom"), env.failing_endpoint("boom"))
    .step(Step::SearchQuery, env.field_collecting_endpoint("query", "query", None))
    .step(
        Step::UploadTitle,
        env.field_collecting_endpoint("title", "title", Some(Step::UploadTags)),
    )
    .step(Step::UploadTags, env.field_collecting_endpoint("tags", "tags", None))
    .fallback(env.replying_endpoint("menu", "menu shown"))
    .build()
}

#[tokio::test]
async fn start_without_channels_reaches_handler() {
    let env = TestEnv::new();
    let router = build_router(&env);

    router.dispatch(msg(1, "/start")).await;

    assert_eq!(env.invoked(), vec!["start:1"]);
    // Zero required channels: the membership stage made no oracle calls
    assert_eq!(env.oracle.call_count(), 0);
    assert!(env.responder.prompts_for(1).is_empty());
}

#[tokio::test]
async fn join_then_confirm_self_heals() {
    let env = TestEnv::new();
    env.add_channel(-100);
    env.oracle.set(2, -100, Verdict::Absent);
    let router = build_router(&env);

    // Denied: join prompt listing exactly the missing channel
    router.dispatch(msg(2, "/start")).await;
    assert!(env.invoked().is_empty(), "denied update must not reach a handler");

    let prompts = env.responder.prompts_for(2);
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].channels.len(), 1);
    assert!(prompts[0].channels[0].url.contains("chan100"));
    assert_eq!(env.audit.codes(), vec!["gate_denied:not_subscribed"]);

    // The user joins; the confirm action reaches its own handler
    env.oracle.set(2, -100, Verdict::Member);
    router.dispatch(cb(2, CONFIRM_ACTION)).await;

    assert_eq!(env.invoked(), vec!["confirm:2"]);
    assert_eq!(env.responder.texts_for(2), vec!["welcome back"]);

    // No residual deny state: ordinary updates now pass
    router.dispatch(msg(2, "/start")).await;
    assert_eq!(env.invoked(), vec!["confirm:2", "start:2"]);
}

#[tokio::test]
async fn cancel_clears_upload_flow() {
    let env = TestEnv::new();
    let router = build_router(&env);

    let mut state = ConversationState::new(Step::UploadTitle);
    state.set_field("file_id", "abc");
    env.states.set(3, state).await.unwrap();

    // /cancel is a command: it routes to its endpoint even mid-structured-flow
    router.dispatch(msg(3, "/cancel")).await;
    assert_eq!(env.invoked(), vec!["cancel:3"]);
    assert_eq!(env.responder.texts_for(3), vec!["cancelled"]);
    assert!(env.state_of(3).await.is_none());

    // The next message is a fresh top-level command, not a title
    router.dispatch(msg(3, "/start")).await;
    assert_eq!(env.invoked(), vec!["cancel:3", "start:3"]);
}

#[tokio::test]
async fn confirm_action_reaches_its_handler_while_denied() {
    let env = TestEnv::new();
    env.add_channel(-100);
    env.oracle.set(4, -100, Verdict::Absent);
    let router = build_router(&env);

    router.dispatch(cb(4, CONFIRM_ACTION)).await;

    // The gate let it through; the handler owns the verdict
    assert_eq!(env.invoked(), vec!["confirm:4"]);
}

#[tokio::test]
async fn interleaved_flows_stay_isolated() {
    let env = TestEnv::new();
    let router = build_router(&env);

    // Both identities open the upload flow, then interleave arbitrarily
    router.dispatch(msg(10, "/upload")).await;
    router.dispatch(msg(11, "/upload")).await;
    env.states.set(10, ConversationState::new(Step::UploadTitle)).await.unwrap();
    env.states.set(11, ConversationState::new(Step::UploadTitle)).await.unwrap();

    router.dispatch(msg(10, "First Title")).await;
    router.dispatch(msg(11, "Second Title")).await;
    router.dispatch(msg(11, "tag-b")).await;
    router.dispatch(msg(10, "tag-a")).await;

    let state_a = env.state_of(10).await.unwrap();
    let state_b = env.state_of(11).await.unwrap();

    assert_eq!(state_a.field("title"), Some("First Title"));
    assert_eq!(state_a.field("tags"), Some("tag-a"));
    assert_eq!(state_b.field("title"), Some("Second Title"));
    assert_eq!(state_b.field("tags"), Some("tag-b"));
}

#[tokio::test]
async fn structured_flow_survives_unrelated_command() {
    let env = TestEnv::new();
    let router = build_router(&env);

    let mut state = ConversationState::new(Step::UploadTitle);
    state.set_field("file_id", "abc");
    env.states.set(5, state.clone()).await.unwrap();

    router.dispatch(msg(5, "/stats")).await;

    // The command ran, and the accumulated fields are untouched
    assert_eq!(env.invoked(), vec!["stats:5"]);
    assert_eq!(env.state_of(5).await, Some(state));
}

#[tokio::test]
async fn menu_button_escapes_free_text_search() {
    let env = TestEnv::new();
    let router = build_router(&env);

    env.states.set(6, ConversationState::new(Step::SearchQuery)).await.unwrap();

    // The localized help button label must route to the menu handler, not
    // become a search query.
    router.dispatch(msg(6, "❓ Help")).await;

    assert_eq!(env.invoked(), vec!["help:6"]);
    assert!(env.state_of(6).await.is_none(), "free-text state must be cleared");
}

#[tokio::test]
async fn free_text_step_consumes_plain_text() {
    let env = TestEnv::new();
    let router = build_router(&env);

    router.dispatch(msg(7, "/search")).await;
    assert_eq!(env.state_of(7).await.unwrap().step, Step::SearchQuery);

    router.dispatch(msg(7, "english idioms")).await;
    assert_eq!(env.invoked(), vec!["search:7", "query:7"]);
    assert_eq!(env.state_of(7).await.unwrap().field("query"), Some("english idioms"));
}

#[tokio::test]
async fn mismatched_content_reprompts_and_keeps_state() {
    let env = TestEnv::new();
    let router = build_router(&env);

    // Awaiting a file; plain text must not advance the flow
    env.states.set(8, ConversationState::new(Step::UploadFile)).await.unwrap();

    router.dispatch(msg(8, "this is not a file")).await;

    assert!(env.invoked().is_empty());
    assert_eq!(env.state_of(8).await.unwrap().step, Step::UploadFile);
    // The user got the step's prompt, not silence
    let texts = env.responder.texts_for(8);
    assert_eq!(texts.len(), 1);
}

#[tokio::test]
async fn unmatched_text_gets_the_menu_fallback() {
    let env = TestEnv::new();
    let router = build_router(&env);

    router.dispatch(msg(9, "what is this bot")).await;

    assert_eq!(env.invoked(), vec!["menu:9"]);
    assert_eq!(env.responder.texts_for(9), vec!["menu shown"]);
}

#[tokio::test]
async fn handler_fault_is_contained_and_answered() {
    let env = TestEnv::new();
    let router = build_router(&env);

    router.dispatch(msg(12, "/boom")).await;

    assert_eq!(env.invoked(), vec!["boom:12"]);
    assert_eq!(env.audit.codes(), vec!["handler_fault:cmd:boom"]);
    // Exactly one generic error message, in the user's locale
    let texts = env.responder.texts_for(12);
    assert_eq!(texts.len(), 1);

    // The dispatch loop is unaffected for later updates
    router.dispatch(msg(12, "/start")).await;
    assert_eq!(env.invoked(), vec!["boom:12", "start:12"]);
}

#[tokio::test]
async fn guarded_command_denied_without_capability() {
    let env = TestEnv::new();
    let router = build_router(&env);

    router.dispatch(msg(13, "/broadcast")).await;

    assert!(env.invoked().is_empty());
    assert_eq!(env.audit.codes(), vec!["gate_denied:admin_only"]);
    assert_eq!(env.responder.texts_for(13).len(), 1);
}

#[tokio::test]
async fn guarded_command_allowed_with_capability() {
    let env = TestEnv::new();
    {
        let conn = env.pool.get().unwrap();
        db::create_user(&conn, 14, None, None, "uz").unwrap();
        db::set_admin(&conn, 14, true, &[Capability::Broadcast]).unwrap();
    }
    let router = build_router(&env);

    router.dispatch(msg(14, "/broadcast")).await;

    assert_eq!(env.invoked(), vec!["broadcast:14"]);
}

#[tokio::test]
async fn denied_update_never_mutates_conversation_state() {
    let env = TestEnv::new();
    env.add_channel(-100);
    env.oracle.set(15, -100, Verdict::Absent);
    let router = build_router(&env);

    let state = ConversationState::new(Step::SearchQuery);
    env.states.set(15, state.clone()).await.unwrap();

    router.dispatch(msg(15, "a query that will be denied")).await;

    assert!(env.invoked().is_empty());
    assert_eq!(env.state_of(15).await, Some(state));
}

#[tokio::test]
async fn blocked_user_gets_exactly_one_message() {
    let env = TestEnv::new();
    env.add_channel(-100);
    {
        let conn = env.pool.get().unwrap();
        db::create_user(&conn, 16, None, None, "uz").unwrap();
        db::block_user(&conn, 16).unwrap();
    }
    let router = build_router(&env);

    router.dispatch(msg(16, "/start")).await;

    assert!(env.invoked().is_empty());
    assert_eq!(env.audit.codes(), vec!["gate_denied:blocked"]);
    assert_eq!(env.responder.texts_for(16).len(), 1);
    assert!(env.responder.prompts_for(16).is_empty(), "no join prompt for blocked users");
    assert_eq!(env.oracle.call_count(), 0);
}

#[tokio::test]
async fn unverifiable_membership_fails_closed() {
    let env = TestEnv::new();
    env.add_channel(-100);
    // No verdict configured: the oracle answers Indeterminate
    let router = build_router(&env);

    router.dispatch(msg(17, "/start")).await;

    assert!(env.invoked().is_empty());
    assert_eq!(env.audit.codes(), vec!["gate_denied:unverifiable"]);
    // Operator-facing text, not a join prompt blaming the user
    assert_eq!(env.responder.texts_for(17).len(), 1);
    assert!(env.responder.prompts_for(17).is_empty());
}

#[tokio::test]
async fn channel_list_changes_apply_on_next_update() {
    let env = TestEnv::new();
    env.add_channel(-100);
    env.oracle.set(18, -100, Verdict::Absent);
    let router = build_router(&env);

    router.dispatch(msg(18, "/start")).await;
    assert!(env.invoked().is_empty());

    // Admin removes the requirement; no restart, no cache to invalidate
    {
        let conn = env.pool.get().unwrap();
        teleshelf::storage::settings::remove_required_channel(&conn, -100).unwrap();
    }

    router.dispatch(msg(18, "/start")).await;
    assert_eq!(env.invoked(), vec!["start:18"]);
}
