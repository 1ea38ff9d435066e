//! Matches one allowed update to exactly one endpoint.
//!
//! The router owns the per-update lifecycle: per-identity serialization, the
//! scoped DB handle, gate evaluation, conversation-state lookup, rule
//! matching, endpoint invocation and the fault boundary. Endpoints are plain
//! async closures registered at construction time; nothing here knows about
//! Telegram.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use fluent_templates::fluent_bundle::FluentArgs;
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;

use crate::core::audit::{AuditEvent, AuditSink};
use crate::core::retry::{retry, RetryConfig};
use crate::i18n;
use crate::pipeline::gate::{DenialReason, GateChain, GateDecision};
use crate::pipeline::responder::{JoinPrompt, Responder};
use crate::pipeline::state::{FlowKind, StateStore, Step};
use crate::pipeline::{Inbound, InboundKind, RequestContext};
use crate::storage::db::{self, Capability, DbConnection, DbPool};

/// Boxed error at the dispatch boundary.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type EndpointFuture<'a> = BoxFuture<'a, Result<(), HandlerError>>;

/// A registered endpoint: borrows the update, the request context and the
/// update's scoped DB handle for the duration of one invocation.
pub type Endpoint =
    Arc<dyn for<'a> Fn(&'a Inbound, &'a RequestContext, &'a mut DbConnection) -> EndpointFuture<'a> + Send + Sync>;

/// What a rule matches against. Menu buttons compare across every supported
/// language, since the keyboard on the user's screen may predate a language
/// switch.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Command name without the slash: "start" matches "/start@AnyBot args"
    Command(&'static str),
    /// i18n key of a reply-keyboard button label
    MenuButton(&'static str),
    /// Callback action, exact or "<prefix>:..." match
    Callback(&'static str),
}

impl Pattern {
    pub fn matches(&self, update: &Inbound) -> bool {
        match self {
            Pattern::Command(name) => update.command() == Some(*name),
            Pattern::MenuButton(key) => update
                .text()
                .map(|text| i18n::menu_button_matches(key, text))
                .unwrap_or(false),
            Pattern::Callback(prefix) => update
                .callback_action()
                .map(|action| action == *prefix || action.starts_with(&format!("{}:", prefix)))
                .unwrap_or(false),
        }
    }

    /// Menu-button labels depend on locale resolution; commands and callback
    /// actions do not and can be matched before the gate runs.
    fn lang_independent(&self) -> bool {
        !matches!(self, Pattern::MenuButton(_))
    }
}

struct Rule {
    name: &'static str,
    pattern: Pattern,
    capability: Option<Capability>,
    endpoint: Endpoint,
}

/// Builder for the constructed pipeline object. Registration order is match
/// order: first match wins.
pub struct RouterBuilder {
    pool: Arc<DbPool>,
    gate: GateChain,
    states: Arc<dyn StateStore>,
    responder: Arc<dyn Responder>,
    audit: Arc<dyn AuditSink>,
    rules: Vec<Rule>,
    steps: HashMap<Step, Endpoint>,
    fallback: Option<Endpoint>,
}

impl RouterBuilder {
    pub fn new(
        pool: Arc<DbPool>,
        gate: GateChain,
        states: Arc<dyn StateStore>,
        responder: Arc<dyn Responder>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            pool,
            gate,
            states,
            responder,
            audit,
            rules: Vec::new(),
            steps: HashMap::new(),
            fallback: None,
        }
    }

    /// Registers an endpoint for a pattern.
    #[must_use]
    pub fn rule(mut self, name: &'static str, pattern: Pattern, endpoint: Endpoint) -> Self {
        self.rules.push(Rule {
            name,
            pattern,
            capability: None,
            endpoint,
        });
        self
    }

    /// Registers a capability-guarded endpoint. The gate's permission stage
    /// enforces the capability before the endpoint can run.
    #[must_use]
    pub fn guarded(mut self, name: &'static str, pattern: Pattern, capability: Capability, endpoint: Endpoint) -> Self {
        self.rules.push(Rule {
            name,
            pattern,
            capability: Some(capability),
            endpoint,
        });
        self
    }

    /// Registers the endpoint invoked for an active conversation step.
    #[must_use]
    pub fn step(mut self, step: Step, endpoint: Endpoint) -> Self {
        self.steps.insert(step, endpoint);
        self
    }

    /// Endpoint for messages nothing else matched. Free text is never
    /// silently dropped.
    #[must_use]
    pub fn fallback(mut self, endpoint: Endpoint) -> Self {
        self.fallback = Some(endpoint);
        self
    }

    pub fn build(self) -> Router {
        Router {
            pool: self.pool,
            gate: self.gate,
            states: self.states,
            responder: self.responder,
            audit: self.audit,
            rules: self.rules,
            steps: self.steps,
            fallback: self.fallback,
            locks: DashMap::new(),
        }
    }
}

pub struct Router {
    pool: Arc<DbPool>,
    gate: GateChain,
    states: Arc<dyn StateStore>,
    responder: Arc<dyn Responder>,
    audit: Arc<dyn AuditSink>,
    rules: Vec<Rule>,
    steps: HashMap<Step, Endpoint>,
    fallback: Option<Endpoint>,
    // Per-identity serialization: the conversation state machine needs
    // arrival-order processing per user, while different users run in parallel.
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Router {
    /// Processes one inbound update end to end. Never panics and never
    /// returns an error: every failure path is converted into a logged,
    /// user-visible response.
    pub async fn dispatch(&self, update: Inbound) {
        let lock = {
            let entry = self
                .locks
                .entry(update.identity)
                .or_insert_with(|| Arc::new(Mutex::new(())));
            entry.clone()
        };
        let _serial = lock.lock().await;

        let mut ctx = RequestContext::new();
        ctx.capability = self.peek_capability(&update);

        // Unit of work: one pooled connection per update, released on every
        // exit path when it drops.
        let mut conn = match self.open_connection().await {
            Ok(conn) => conn,
            Err(err) => {
                log::error!("no database connection for update from {}: {}", update.identity, err);
                self.try_send(update.identity, i18n::t(&ctx.lang, "errors.try_again")).await;
                return;
            }
        };

        match self.gate.evaluate(&update, &mut conn, &mut ctx).await {
            Ok(GateDecision::Allow) => {}
            Ok(GateDecision::Deny(reason)) => {
                self.audit.record(AuditEvent::GateDenied {
                    identity: update.identity,
                    reason: reason.code(),
                });
                self.respond_denial(&update, &ctx, &reason).await;
                return;
            }
            Err(err) => {
                log::error!("gate evaluation failed for {}: {}", update.identity, err);
                self.try_send(update.identity, i18n::t(&ctx.lang, "errors.try_again")).await;
                return;
            }
        }

        ctx.state = match self.states.get(update.identity).await {
            Ok(state) => state,
            Err(err) => {
                // The tiered store degrades internally; reaching this means
                // even the local tier failed. Proceed stateless.
                log::error!("state lookup failed for {}: {}", update.identity, err);
                None
            }
        };

        self.route(update, ctx, conn).await;
    }

    async fn route(&self, update: Inbound, mut ctx: RequestContext, mut conn: DbConnection) {
        if let Some(state) = ctx.state.clone() {
            if matches!(update.kind, InboundKind::Message { .. }) {
                let command_like = update.command().is_some() || self.matches_any_menu_button(&update);
                if command_like {
                    // Free-text prompts must not capture a stray command or
                    // button press; structured flows survive them and only
                    // /cancel aborts (handled by its own endpoint).
                    if state.step.flow() == FlowKind::FreeText {
                        if let Err(err) = self.states.clear(update.identity).await {
                            log::warn!("failed to clear state for {}: {}", update.identity, err);
                        }
                        ctx.state = None;
                    }
                } else if state.step.accepts(update.content_kind()) {
                    match self.steps.get(&state.step) {
                        Some(endpoint) => {
                            let result = endpoint(&update, &ctx, &mut conn).await;
                            self.finish(&update, &ctx, &format!("step:{:?}", state.step), result)
                                .await;
                        }
                        None => log::error!("no endpoint registered for step {:?}", state.step),
                    }
                    return;
                } else {
                    // Content-kind mismatch (e.g. text while awaiting a
                    // file): re-prompt, leave the accumulated fields alone.
                    let prompt = i18n::t(&ctx.lang, state.step.prompt_key());
                    self.try_send(update.identity, prompt).await;
                    return;
                }
            }
            // Callback updates route by rules with the state untouched.
        }

        for rule in &self.rules {
            if rule.pattern.matches(&update) {
                let result = (rule.endpoint)(&update, &ctx, &mut conn).await;
                self.finish(&update, &ctx, rule.name, result).await;
                return;
            }
        }

        match &update.kind {
            InboundKind::Callback { action, .. } => {
                log::debug!("unmatched callback action '{}' from {}", action, update.identity);
            }
            InboundKind::Message { .. } => match &self.fallback {
                Some(endpoint) => {
                    let result = endpoint(&update, &ctx, &mut conn).await;
                    self.finish(&update, &ctx, "fallback", result).await;
                }
                None => log::debug!("no fallback endpoint; dropping message from {}", update.identity),
            },
        }
    }

    /// Fault boundary: a failed endpoint is audited and answered with one
    /// generic localized error; the dispatch loop is unaffected.
    async fn finish(&self, update: &Inbound, ctx: &RequestContext, context: &str, result: Result<(), HandlerError>) {
        if let Err(err) = result {
            self.audit.record(AuditEvent::HandlerFault {
                identity: update.identity,
                context,
                error: err.to_string(),
            });
            self.try_send(update.identity, i18n::t(&ctx.lang, "errors.generic")).await;
        }
    }

    /// Renders the single user-visible response for a denial.
    async fn respond_denial(&self, update: &Inbound, ctx: &RequestContext, reason: &DenialReason) {
        let result = match reason {
            DenialReason::Blocked { contact } => {
                let mut args = FluentArgs::new();
                args.set("admin", contact.as_str());
                self.responder
                    .send_text(update.identity, i18n::t_args(&ctx.lang, "blocked.message", &args))
                    .await
            }
            DenialReason::AdminOnly => {
                self.responder
                    .send_text(update.identity, i18n::t(&ctx.lang, "admin.only"))
                    .await
            }
            DenialReason::NotSubscribed { missing } => {
                let prompt = JoinPrompt::for_channels(&ctx.lang, "membership.join_required", missing);
                self.responder.send_join_prompt(update.identity, prompt).await
            }
            DenialReason::Unverifiable { .. } => {
                self.responder
                    .send_text(update.identity, i18n::t(&ctx.lang, "membership.unverifiable"))
                    .await
            }
        };

        if let Err(err) = result {
            log::error!("failed to deliver denial to {}: {}", update.identity, err);
        }
    }

    /// Capability the update's command/callback will need, resolved before
    /// the gate runs so the permission stage can check it. Only
    /// locale-independent patterns participate; menu buttons are never
    /// capability-guarded.
    fn peek_capability(&self, update: &Inbound) -> Option<Capability> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.lang_independent() && rule.pattern.matches(update))
            .and_then(|rule| rule.capability)
    }

    fn matches_any_menu_button(&self, update: &Inbound) -> bool {
        self.rules
            .iter()
            .any(|rule| matches!(rule.pattern, Pattern::MenuButton(_)) && rule.pattern.matches(update))
    }

    async fn open_connection(&self) -> Result<DbConnection, r2d2::Error> {
        retry(&RetryConfig::quick(), || async { db::get_connection(&self.pool) })
            .await
            .into_result()
    }

    async fn try_send(&self, identity: i64, text: String) {
        if let Err(err) = self.responder.send_text(identity, text).await {
            log::error!("failed to send message to {}: {}", identity, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_pattern_matches_with_mention_and_args() {
        let pattern = Pattern::Command("search");
        assert!(pattern.matches(&Inbound::message(1, "/search")));
        assert!(pattern.matches(&Inbound::message(1, "/search@TeleshelfBot idioms")));
        assert!(!pattern.matches(&Inbound::message(1, "/searchx")));
        assert!(!pattern.matches(&Inbound::message(1, "search")));
    }

    #[test]
    fn callback_pattern_matches_prefix_but_not_lookalikes() {
        let pattern = Pattern::Callback("files:get");
        assert!(pattern.matches(&Inbound::callback(1, "files:get")));
        assert!(pattern.matches(&Inbound::callback(1, "files:get:42")));
        assert!(!pattern.matches(&Inbound::callback(1, "files:getx:42")));
        assert!(!pattern.matches(&Inbound::message(1, "files:get:42")));
    }

    #[test]
    fn menu_button_pattern_is_lang_dependent() {
        assert!(!Pattern::MenuButton("menu.search").lang_independent());
        assert!(Pattern::Command("start").lang_independent());
        assert!(Pattern::Callback("x").lang_independent());
    }

    #[test]
    fn menu_button_pattern_matches_any_supported_language() {
        let pattern = Pattern::MenuButton("menu.help");
        assert!(pattern.matches(&Inbound::message(1, "❓ Help")));
        assert!(pattern.matches(&Inbound::message(1, "❓ Yordam")));
        assert_eq!(pattern.matches(&Inbound::message(1, "help")), false);
    }
}
