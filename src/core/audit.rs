//! Structured audit events for operational visibility.
//!
//! The dispatch pipeline emits one event per gate denial, handler fault and
//! state-store degradation. The sink is a trait so deployments can forward
//! events to an external collector; the default writes structured log lines.

/// One auditable pipeline event.
#[derive(Debug)]
pub enum AuditEvent<'a> {
    /// An update was denied by a gate stage.
    GateDenied {
        identity: i64,
        /// Stable reason code: "blocked", "not_subscribed", "unverifiable", "admin_only"
        reason: &'a str,
    },
    /// A handler raised an unexpected error; the update was answered generically.
    HandlerFault {
        identity: i64,
        /// Routing context (rule or step name) for debugging
        context: &'a str,
        error: String,
    },
    /// The shared conversation-state tier failed; dispatch continues on the local tier.
    StoreDegraded { detail: String },
}

/// Destination for audit events. Implementations must be cheap and non-blocking.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent<'_>);
}

/// Default sink: structured single-line log records.
///
/// Unverifiable denials are logged at warn level — they indicate a bot
/// configuration problem (missing channel rights), not user behavior.
pub struct LogAudit;

impl AuditSink for LogAudit {
    fn record(&self, event: AuditEvent<'_>) {
        match event {
            AuditEvent::GateDenied { identity, reason } => {
                if reason == "unverifiable" {
                    log::warn!("audit event=gate_denied identity={} reason={}", identity, reason);
                } else {
                    log::info!("audit event=gate_denied identity={} reason={}", identity, reason);
                }
            }
            AuditEvent::HandlerFault {
                identity,
                context,
                error,
            } => {
                log::error!(
                    "audit event=handler_fault identity={} context={} error={}",
                    identity,
                    context,
                    error
                );
            }
            AuditEvent::StoreDegraded { detail } => {
                log::error!("audit event=store_degraded detail={}", detail);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink that remembers reason codes, for assertions in pipeline tests.
    pub struct RecordingSink(pub Mutex<Vec<String>>);

    impl AuditSink for RecordingSink {
        fn record(&self, event: AuditEvent<'_>) {
            let code = match event {
                AuditEvent::GateDenied { reason, .. } => format!("gate_denied:{}", reason),
                AuditEvent::HandlerFault { context, .. } => format!("handler_fault:{}", context),
                AuditEvent::StoreDegraded { .. } => "store_degraded".to_string(),
            };
            self.0.lock().unwrap().push(code);
        }
    }

    #[test]
    fn log_sink_accepts_all_event_kinds() {
        let sink = LogAudit;
        sink.record(AuditEvent::GateDenied {
            identity: 1,
            reason: "blocked",
        });
        sink.record(AuditEvent::HandlerFault {
            identity: 1,
            context: "cmd:start",
            error: "boom".to_string(),
        });
        sink.record(AuditEvent::StoreDegraded {
            detail: "redis down".to_string(),
        });
    }
}
