//! Shared fixtures for pipeline integration tests: a temp-file SQLite pool,
//! a verdict-table oracle, a recording responder/audit sink, and endpoint
//! fakes that log their invocations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use teleshelf::core::audit::{AuditEvent, AuditSink};
use teleshelf::pipeline::membership::{MembershipOracle, Verdict};
use teleshelf::pipeline::responder::{JoinPrompt, RespondError, Responder};
use teleshelf::pipeline::router::{Endpoint, HandlerError};
use teleshelf::pipeline::state::{ConversationState, MemoryStateStore, StateStore, Step};
use teleshelf::pipeline::Inbound;
use teleshelf::storage::db::DbPool;
use teleshelf::storage::{create_pool, settings};

/// Oracle fake whose verdicts can be flipped mid-test (Scenario B).
pub struct FlippableOracle {
    verdicts: Mutex<HashMap<(i64, i64), Verdict>>,
    pub calls: AtomicUsize,
}

impl FlippableOracle {
    pub fn new() -> Self {
        Self {
            verdicts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, identity: i64, channel: i64, verdict: Verdict) {
        self.verdicts.lock().unwrap().insert((identity, channel), verdict);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MembershipOracle for FlippableOracle {
    async fn check(&self, identity: i64, channel: i64) -> Verdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .verdicts
            .lock()
            .unwrap()
            .get(&(identity, channel))
            .unwrap_or(&Verdict::Indeterminate)
    }
}

/// Responder fake that records exactly what a user would have seen.
#[derive(Default)]
pub struct RecordingResponder {
    pub texts: Mutex<Vec<(i64, String)>>,
    pub join_prompts: Mutex<Vec<(i64, JoinPrompt)>>,
}

impl RecordingResponder {
    pub fn texts_for(&self, identity: i64) -> Vec<String> {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == identity)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn prompts_for(&self, identity: i64) -> Vec<JoinPrompt> {
        self.join_prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == identity)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn send_text(&self, identity: i64, text: String) -> Result<(), RespondError> {
        self.texts.lock().unwrap().push((identity, text));
        Ok(())
    }

    async fn send_join_prompt(&self, identity: i64, prompt: JoinPrompt) -> Result<(), RespondError> {
        self.join_prompts.lock().unwrap().push((identity, prompt));
        Ok(())
    }
}

/// Audit fake collecting stable event codes.
#[derive(Default)]
pub struct RecordingAudit {
    pub events: Mutex<Vec<String>>,
}

impl RecordingAudit {
    pub fn codes(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent<'_>) {
        let code = match event {
            AuditEvent::GateDenied { reason, .. } => format!("gate_denied:{}", reason),
            AuditEvent::HandlerFault { context, .. } => format!("handler_fault:{}", context),
            AuditEvent::StoreDegraded { .. } => "store_degraded".to_string(),
        };
        self.events.lock().unwrap().push(code);
    }
}

/// Everything a router test needs, wired to fakes.
pub struct TestEnv {
    _db_file: NamedTempFile,
    pub pool: Arc<DbPool>,
    pub states: Arc<MemoryStateStore>,
    pub oracle: Arc<FlippableOracle>,
    pub responder: Arc<RecordingResponder>,
    pub audit: Arc<RecordingAudit>,
    pub invocations: Arc<Mutex<Vec<String>>>,
}

impl TestEnv {
    pub fn new() -> Self {
        let db_file = NamedTempFile::new().unwrap();
        let pool = Arc::new(create_pool(db_file.path().to_str().unwrap()).unwrap());
        Self {
            _db_file: db_file,
            pool,
            states: Arc::new(MemoryStateStore::new()),
            oracle: Arc::new(FlippableOracle::new()),
            responder: Arc::new(RecordingResponder::default()),
            audit: Arc::new(RecordingAudit::default()),
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_channel(&self, channel_id: i64) {
        let conn = self.pool.get().unwrap();
        settings::add_required_channel(
            &conn,
            settings::RequiredChannel {
                channel_id,
                username: Some(format!("chan{}", channel_id.unsigned_abs())),
                title: None,
                invite_link: None,
            },
        )
        .unwrap();
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    pub async fn state_of(&self, identity: i64) -> Option<ConversationState> {
        self.states.get(identity).await.unwrap()
    }

    /// Endpoint that only records its invocation.
    pub fn recording_endpoint(&self, name: &'static str) -> Endpoint {
        let log = Arc::clone(&self.invocations);
        Arc::new(move |update, _ctx, _conn| {
            let log = Arc::clone(&log);
            let identity = update.identity;
            Box::pin(async move {
                log.lock().unwrap().push(format!("{}:{}", name, identity));
                Ok(())
            })
        })
    }

    /// Endpoint that records and then opens the given conversation step.
    pub fn flow_opening_endpoint(&self, name: &'static str, step: Step) -> Endpoint {
        let log = Arc::clone(&self.invocations);
        let states: Arc<MemoryStateStore> = Arc::clone(&self.states);
        Arc::new(move |update, _ctx, _conn| {
            let log = Arc::clone(&log);
            let states = Arc::clone(&states);
            let identity = update.identity;
            Box::pin(async move {
                log.lock().unwrap().push(format!("{}:{}", name, identity));
                states.set(identity, ConversationState::new(step)).await?;
                Ok(())
            })
        })
    }

    /// Step endpoint that stores the message text under `field` and advances.
    pub fn field_collecting_endpoint(&self, name: &'static str, field: &'static str, next: Option<Step>) -> Endpoint {
        let log = Arc::clone(&self.invocations);
        let states: Arc<MemoryStateStore> = Arc::clone(&self.states);
        Arc::new(move |update, ctx, _conn| {
            let log = Arc::clone(&log);
            let states = Arc::clone(&states);
            let identity = update.identity;
            let text = update.text().unwrap_or_default().to_string();
            let current = ctx.state.clone();
            Box::pin(async move {
                log.lock().unwrap().push(format!("{}:{}", name, identity));
                match (current, next) {
                    (Some(state), Some(next_step)) => {
                        let mut advanced = state.advanced(next_step);
                        advanced.set_field(field, text);
                        states.set(identity, advanced).await?;
                    }
                    (Some(mut state), None) => {
                        state.set_field(field, text);
                        states.set(identity, state).await?;
                    }
                    (None, _) => {}
                }
                Ok(())
            })
        })
    }

    /// Endpoint that clears the active state (a /cancel fake).
    pub fn cancelling_endpoint(&self, name: &'static str, ack: &'static str) -> Endpoint {
        let log = Arc::clone(&self.invocations);
        let states: Arc<MemoryStateStore> = Arc::clone(&self.states);
        let responder = Arc::clone(&self.responder);
        Arc::new(move |update, _ctx, _conn| {
            let log = Arc::clone(&log);
            let states = Arc::clone(&states);
            let responder = Arc::clone(&responder);
            let identity = update.identity;
            Box::pin(async move {
                log.lock().unwrap().push(format!("{}:{}", name, identity));
                states.clear(identity).await?;
                responder.send_text(identity, ack.to_string()).await?;
                Ok(())
            })
        })
    }

    /// Endpoint that always fails (fault-boundary tests).
    pub fn failing_endpoint(&self, name: &'static str) -> Endpoint {
        let log = Arc::clone(&self.invocations);
        Arc::new(move |update, _ctx, _conn| {
            let log = Arc::clone(&log);
            let identity = update.identity;
            Box::pin(async move {
                log.lock().unwrap().push(format!("{}:{}", name, identity));
                Err::<(), HandlerError>("endpoint exploded".into())
            })
        })
    }

    /// Endpoint that replies with a fixed text through the responder.
    pub fn replying_endpoint(&self, name: &'static str, reply: &'static str) -> Endpoint {
        let log = Arc::clone(&self.invocations);
        let responder = Arc::clone(&self.responder);
        Arc::new(move |update, _ctx, _conn| {
            let log = Arc::clone(&log);
            let responder = Arc::clone(&responder);
            let identity = update.identity;
            Box::pin(async move {
                log.lock().unwrap().push(format!("{}:{}", name, identity));
                responder.send_text(identity, reply.to_string()).await?;
                Ok(())
            })
        })
    }
}

/// A message update with the text as its payload.
pub fn msg(identity: i64, text: &str) -> Inbound {
    Inbound::message(identity, text)
}

/// A callback update.
pub fn cb(identity: i64, action: &str) -> Inbound {
    Inbound::callback(identity, action)
}
