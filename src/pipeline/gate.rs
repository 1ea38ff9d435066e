//! The ordered gate chain every inbound update must pass.
//!
//! Stage order is load-bearing: block must precede everything (a blocked user
//! is never told to join channels), subscription must precede permission (a
//! gated-out user never sees admin-flavored errors), and locale must be
//! resolved before any denial text is produced.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::error::AppError;
use crate::i18n;
use crate::pipeline::membership::{verify_membership, MembershipOracle, CONFIRM_ACTION};
use crate::pipeline::{Inbound, RequestContext};
use crate::storage::db::{self, DbConnection};
use crate::storage::settings::{self, RequiredChannel};

/// Transient failure while evaluating the gate (registry/settings access).
/// Distinct from a denial: the caller answers with a generic "try again".
#[derive(Debug, Error)]
pub enum GateError {
    #[error("gate registry access failed: {0}")]
    Registry(#[from] AppError),
}

/// Result of one stage (and of the whole chain): explicit value, not an
/// exception. First denial wins and terminates the chain.
#[derive(Debug, Clone)]
pub enum GateDecision {
    Allow,
    Deny(DenialReason),
}

/// Why an update was denied, with everything needed to render the one
/// user-visible response.
#[derive(Debug, Clone)]
pub enum DenialReason {
    /// Registry says this identity is blocked
    Blocked { contact: String },
    /// Confirmed not a member of these channels (only the missing ones)
    NotSubscribed { missing: Vec<RequiredChannel> },
    /// Membership could not be verified for these channels; fail closed with
    /// an operator-facing message (the user is not at fault)
    Unverifiable { channels: Vec<RequiredChannel> },
    /// Capability-guarded command without the required capability
    AdminOnly,
}

impl DenialReason {
    /// Stable reason code for audit events.
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::Blocked { .. } => "blocked",
            DenialReason::NotSubscribed { .. } => "not_subscribed",
            DenialReason::Unverifiable { .. } => "unverifiable",
            DenialReason::AdminOnly => "admin_only",
        }
    }
}

/// One interceptor in the chain: a pure decision function over the update,
/// the per-update DB handle, and the accumulating request context.
#[async_trait]
pub trait GateStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(
        &self,
        update: &Inbound,
        conn: &mut DbConnection,
        ctx: &mut RequestContext,
    ) -> Result<GateDecision, GateError>;
}

/// Ordered, fixed-composition pipeline of gate stages with short-circuit
/// evaluation.
pub struct GateChain {
    stages: Vec<Box<dyn GateStage>>,
}

impl GateChain {
    /// The production composition. Tests may build narrower chains via
    /// [`GateChain::from_stages`].
    pub fn standard(oracle: Arc<dyn MembershipOracle>, superuser: i64) -> Self {
        Self::from_stages(vec![
            Box::new(Provision),
            Box::new(BlockCheck),
            Box::new(LocaleAnnotation),
            Box::new(RequiredMembership { oracle, superuser }),
            Box::new(PermissionCheck { superuser }),
        ])
    }

    pub fn from_stages(stages: Vec<Box<dyn GateStage>>) -> Self {
        Self { stages }
    }

    /// Runs every stage in order; the first denial terminates the chain.
    pub async fn evaluate(
        &self,
        update: &Inbound,
        conn: &mut DbConnection,
        ctx: &mut RequestContext,
    ) -> Result<GateDecision, GateError> {
        for stage in &self.stages {
            match stage.check(update, conn, ctx).await? {
                GateDecision::Allow => {}
                GateDecision::Deny(reason) => {
                    log::debug!(
                        "gate stage {} denied identity {} ({})",
                        stage.name(),
                        update.identity,
                        reason.code()
                    );
                    return Ok(GateDecision::Deny(reason));
                }
            }
        }
        Ok(GateDecision::Allow)
    }
}

/// Stage 1: look up the registry record, creating it with defaults on first
/// contact. Always allows through; its product is `ctx.subscriber`.
pub struct Provision;

#[async_trait]
impl GateStage for Provision {
    fn name(&self) -> &'static str {
        "provision"
    }

    async fn check(
        &self,
        update: &Inbound,
        conn: &mut DbConnection,
        ctx: &mut RequestContext,
    ) -> Result<GateDecision, GateError> {
        // One cheap retry on the registry read; SQLITE_BUSY clears quickly.
        let existing = match db::get_user(conn, update.identity) {
            Ok(user) => user,
            Err(err) => {
                log::warn!("registry read failed for {} (retrying once): {}", update.identity, err);
                db::get_user(conn, update.identity)?
            }
        };

        let user = match existing {
            Some(user) => user,
            None => {
                let language = update
                    .language_hint
                    .as_deref()
                    .and_then(i18n::is_language_supported)
                    .unwrap_or(&crate::core::config::DEFAULT_LANG);
                db::create_user(
                    conn,
                    update.identity,
                    update.username.as_deref(),
                    update.full_name.as_deref(),
                    language,
                )?;
                log::info!("provisioned new user {} (lang={})", update.identity, language);
                db::get_user(conn, update.identity)?
                    .ok_or_else(|| AppError::Validation(format!("user {} vanished after insert", update.identity)))?
            }
        };

        ctx.subscriber = Some(user);
        Ok(GateDecision::Allow)
    }
}

/// Stage 2: blocked users get one denial and no further processing.
pub struct BlockCheck;

#[async_trait]
impl GateStage for BlockCheck {
    fn name(&self) -> &'static str {
        "block_check"
    }

    async fn check(
        &self,
        _update: &Inbound,
        conn: &mut DbConnection,
        ctx: &mut RequestContext,
    ) -> Result<GateDecision, GateError> {
        let blocked = ctx.user().map(|u| u.is_blocked).unwrap_or(false);
        if blocked {
            let contact = settings::admin_contact(conn);
            return Ok(GateDecision::Deny(DenialReason::Blocked { contact }));
        }
        Ok(GateDecision::Allow)
    }
}

/// Stage 3: resolve the user's locale into the context. Runs before any stage
/// that can produce user-visible denial text.
pub struct LocaleAnnotation;

#[async_trait]
impl GateStage for LocaleAnnotation {
    fn name(&self) -> &'static str {
        "locale"
    }

    async fn check(
        &self,
        _update: &Inbound,
        _conn: &mut DbConnection,
        ctx: &mut RequestContext,
    ) -> Result<GateDecision, GateError> {
        if let Some(user) = ctx.user() {
            ctx.lang = i18n::lang_from_code(&user.language);
        }
        Ok(GateDecision::Allow)
    }
}

/// Stage 4: mandatory channel membership, re-reading the channel list from
/// the settings store on every evaluation.
pub struct RequiredMembership {
    pub oracle: Arc<dyn MembershipOracle>,
    pub superuser: i64,
}

#[async_trait]
impl GateStage for RequiredMembership {
    fn name(&self) -> &'static str {
        "membership"
    }

    async fn check(
        &self,
        update: &Inbound,
        conn: &mut DbConnection,
        ctx: &mut RequestContext,
    ) -> Result<GateDecision, GateError> {
        let is_admin = ctx.user().map(|u| u.is_admin).unwrap_or(false);
        if is_admin || (self.superuser != 0 && update.identity == self.superuser) {
            return Ok(GateDecision::Allow);
        }

        let channels = settings::required_channels(conn)?;
        if channels.is_empty() {
            return Ok(GateDecision::Allow);
        }

        // The confirm action must reach its own handler: it re-runs this very
        // check and owns the user-facing response. Pre-empting it here would
        // leave the user with no way to self-heal.
        if update.callback_action() == Some(CONFIRM_ACTION) {
            return Ok(GateDecision::Allow);
        }

        let report = verify_membership(self.oracle.as_ref(), update.identity, &channels).await;

        if !report.missing.is_empty() {
            return Ok(GateDecision::Deny(DenialReason::NotSubscribed {
                missing: report.missing,
            }));
        }
        if !report.unverifiable.is_empty() {
            return Ok(GateDecision::Deny(DenialReason::Unverifiable {
                channels: report.unverifiable,
            }));
        }
        Ok(GateDecision::Allow)
    }
}

/// Stage 5: capability check for admin-restricted commands. A no-op when the
/// routed command requires no capability.
pub struct PermissionCheck {
    pub superuser: i64,
}

#[async_trait]
impl GateStage for PermissionCheck {
    fn name(&self) -> &'static str {
        "permission"
    }

    async fn check(
        &self,
        update: &Inbound,
        _conn: &mut DbConnection,
        ctx: &mut RequestContext,
    ) -> Result<GateDecision, GateError> {
        let Some(capability) = ctx.capability else {
            return Ok(GateDecision::Allow);
        };

        if self.superuser != 0 && update.identity == self.superuser {
            return Ok(GateDecision::Allow);
        }

        let allowed = ctx
            .user()
            .map(|u| u.is_admin && u.has_capability(capability))
            .unwrap_or(false);
        if allowed {
            Ok(GateDecision::Allow)
        } else {
            Ok(GateDecision::Deny(DenialReason::AdminOnly))
        }
    }
}
