//! Request-gating and update-dispatch pipeline.
//!
//! Every inbound update flows through one constructed [`router::Router`]:
//! the ordered [`gate::GateChain`] decides allow/deny, the
//! [`state::StateStore`] tracks multi-step conversations, and the router
//! matches the update to exactly one endpoint. The pipeline is built from
//! plain values and trait objects (no globals), so it runs against fakes in
//! tests exactly as it runs against Telegram in production.

pub mod gate;
pub mod membership;
pub mod responder;
pub mod router;
pub mod state;

use chrono::{DateTime, Utc};
use unic_langid::LanguageIdentifier;

use crate::i18n;
use crate::storage::db::{Capability, User};
use crate::storage::files::FileKind;
use self::state::ConversationState;

/// One inbound event from the transport, reduced to what the pipeline needs.
/// Immutable once constructed; consumed by exactly one gate evaluation and at
/// most one endpoint invocation.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Opaque sender identity (Telegram user id)
    pub identity: i64,
    /// Sender's Telegram username, for auto-provisioning
    pub username: Option<String>,
    /// Sender's display name, for auto-provisioning
    pub full_name: Option<String>,
    /// Language code reported by the client, used as the locale default on
    /// first contact
    pub language_hint: Option<String>,
    pub kind: InboundKind,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum InboundKind {
    Message {
        text: Option<String>,
        attachment: Option<Attachment>,
        forwarded_channel: Option<ForwardedChannel>,
    },
    Callback {
        action: String,
        /// Message the inline keyboard was attached to, when editable
        message_id: Option<i32>,
    },
}

/// A file attached to an inbound message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Telegram's opaque file handle, reusable for re-sending
    pub file_id: String,
    pub kind: FileKind,
    pub file_name: Option<String>,
}

/// Channel metadata carried by a forwarded channel post.
#[derive(Debug, Clone)]
pub struct ForwardedChannel {
    pub channel_id: i64,
    pub username: Option<String>,
    pub title: Option<String>,
}

/// Coarse content classification used to match step expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Text,
    Document,
    Audio,
    Video,
    Other,
}

impl Inbound {
    /// Plain text message, for tests and internal construction.
    pub fn message(identity: i64, text: &str) -> Self {
        Self {
            identity,
            username: None,
            full_name: None,
            language_hint: None,
            kind: InboundKind::Message {
                text: Some(text.to_string()),
                attachment: None,
                forwarded_channel: None,
            },
            received_at: Utc::now(),
        }
    }

    /// Callback action, for tests and internal construction.
    pub fn callback(identity: i64, action: &str) -> Self {
        Self {
            identity,
            username: None,
            full_name: None,
            language_hint: None,
            kind: InboundKind::Callback {
                action: action.to_string(),
                message_id: None,
            },
            received_at: Utc::now(),
        }
    }

    /// Message text, if any.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            InboundKind::Message { text, .. } => text.as_deref(),
            InboundKind::Callback { .. } => None,
        }
    }

    /// Attached file, if any.
    pub fn attachment(&self) -> Option<&Attachment> {
        match &self.kind {
            InboundKind::Message { attachment, .. } => attachment.as_ref(),
            InboundKind::Callback { .. } => None,
        }
    }

    /// Forwarded-channel metadata, if any.
    pub fn forwarded_channel(&self) -> Option<&ForwardedChannel> {
        match &self.kind {
            InboundKind::Message { forwarded_channel, .. } => forwarded_channel.as_ref(),
            InboundKind::Callback { .. } => None,
        }
    }

    /// Callback action token, if this is a callback update.
    pub fn callback_action(&self) -> Option<&str> {
        match &self.kind {
            InboundKind::Callback { action, .. } => Some(action.as_str()),
            InboundKind::Message { .. } => None,
        }
    }

    /// Command name if the message text looks like a command:
    /// "/search@SomeBot query" -> "search".
    pub fn command(&self) -> Option<&str> {
        let text = self.text()?;
        let stripped = text.strip_prefix('/')?;
        let token = stripped.split_whitespace().next()?;
        let name = token.split('@').next().unwrap_or(token);
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    /// Arguments after the command token, trimmed.
    pub fn command_args(&self) -> Option<&str> {
        let text = self.text()?;
        self.command()?;
        let rest = text.split_once(char::is_whitespace).map(|(_, rest)| rest.trim());
        rest.filter(|r| !r.is_empty())
    }

    /// Coarse content kind of the update.
    pub fn content_kind(&self) -> ContentKind {
        match &self.kind {
            InboundKind::Message { text, attachment, .. } => match attachment.as_ref().map(|a| a.kind) {
                Some(FileKind::Document) => ContentKind::Document,
                Some(FileKind::Audio) => ContentKind::Audio,
                Some(FileKind::Video) => ContentKind::Video,
                None if text.is_some() => ContentKind::Text,
                None => ContentKind::Other,
            },
            InboundKind::Callback { .. } => ContentKind::Other,
        }
    }
}

/// Per-update processing context, filled in by the gate stages and consumed
/// by the router and endpoints. Created fresh for every update.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Registry record of the sender (set by the provision stage)
    pub subscriber: Option<User>,
    /// Resolved locale for every user-visible string of this update
    pub lang: LanguageIdentifier,
    /// Capability the matched command requires, if any (set before gating)
    pub capability: Option<Capability>,
    /// Active conversation state, loaded after the gate allows the update
    pub state: Option<ConversationState>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            subscriber: None,
            lang: i18n::default_lang(),
            capability: None,
            state: None,
        }
    }

    /// The provisioned registry record. Present in every endpoint invocation
    /// because the provision stage runs first and never denies.
    pub fn user(&self) -> Option<&User> {
        self.subscriber.as_ref()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
