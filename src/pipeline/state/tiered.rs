//! Two-tier state store: shared backend preferred, local fallback always kept
//! warm.
//!
//! Availability over durability: when the shared tier fails mid-operation the
//! store flips to local-only and keeps dispatching. Every write is mirrored
//! to the local tier while healthy, so the flip loses nothing that this
//! process has seen. The store stays degraded until restart (no background
//! reconnect); the condition is logged prominently and audited once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::audit::{AuditEvent, AuditSink};

use super::{ConversationState, MemoryStateStore, StateError, StateStore};

pub struct TieredStateStore {
    shared: Option<Box<dyn StateStore>>,
    local: MemoryStateStore,
    degraded: AtomicBool,
    audit: Option<Arc<dyn AuditSink>>,
}

impl TieredStateStore {
    pub fn new(shared: Option<Box<dyn StateStore>>) -> Self {
        Self {
            shared,
            local: MemoryStateStore::new(),
            degraded: AtomicBool::new(false),
            audit: None,
        }
    }

    /// Attaches an audit sink that receives the one degradation event.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// True when the shared tier has been abandoned for this process lifetime.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn shared_active(&self) -> Option<&dyn StateStore> {
        if self.is_degraded() {
            return None;
        }
        self.shared.as_deref()
    }

    fn degrade(&self, err: &StateError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            log::error!(
                "shared state store failed, continuing on local tier only (states no longer survive restart): {}",
                err
            );
            if let Some(audit) = &self.audit {
                audit.record(AuditEvent::StoreDegraded {
                    detail: err.to_string(),
                });
            }
        }
    }
}

#[async_trait]
impl StateStore for TieredStateStore {
    async fn get(&self, identity: i64) -> Result<Option<ConversationState>, StateError> {
        if let Some(shared) = self.shared_active() {
            match shared.get(identity).await {
                Ok(state) => return Ok(state),
                Err(err) => self.degrade(&err),
            }
        }
        self.local.get(identity).await
    }

    async fn set(&self, identity: i64, state: ConversationState) -> Result<(), StateError> {
        // Local mirror first: it cannot fail, and it is what the process
        // falls back on if the shared write below dies.
        self.local.set(identity, state.clone()).await?;

        if let Some(shared) = self.shared_active() {
            if let Err(err) = shared.set(identity, state).await {
                self.degrade(&err);
            }
        }
        Ok(())
    }

    async fn clear(&self, identity: i64) -> Result<(), StateError> {
        self.local.clear(identity).await?;

        if let Some(shared) = self.shared_active() {
            if let Err(err) = shared.clear(identity).await {
                self.degrade(&err);
            }
        }
        Ok(())
    }
}
