//! Per-identity conversation state for multi-step flows.
//!
//! At most one state per identity; `set` overwrites the whole record, so a
//! failed step can never leave a half-written state behind.

pub mod memory;
pub mod redis;
pub mod tiered;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::ContentKind;

pub use self::memory::MemoryStateStore;
pub use self::redis::RedisStateStore;
pub use self::tiered::TieredStateStore;

/// Step tags for every multi-step flow the bot runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Free-text search prompt
    SearchQuery,
    /// Admin upload: waiting for the file itself
    UploadFile,
    /// Admin upload: waiting for the title
    UploadTitle,
    /// Admin upload: waiting for tags (optional, /skip)
    UploadTags,
    /// Admin: waiting for a channel reference to add to the required list
    ChannelInput,
    /// Admin: waiting for the broadcast message
    BroadcastMessage,
}

/// How a flow reacts to commands and menu buttons arriving mid-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// A stray command/button cancels the flow implicitly — a free-text
    /// prompt must not capture it as input.
    FreeText,
    /// The flow holds structured partial data; only an explicit /cancel
    /// aborts it. Commands route away and the flow resumes afterwards.
    Structured,
}

impl Step {
    pub fn flow(&self) -> FlowKind {
        match self {
            Step::SearchQuery => FlowKind::FreeText,
            Step::UploadFile | Step::UploadTitle | Step::UploadTags | Step::ChannelInput | Step::BroadcastMessage => {
                FlowKind::Structured
            }
        }
    }

    /// Whether this step consumes an update of the given content kind.
    /// A mismatching update is answered with the step's prompt instead.
    pub fn accepts(&self, content: ContentKind) -> bool {
        match self {
            Step::SearchQuery | Step::UploadTitle | Step::UploadTags | Step::BroadcastMessage => {
                content == ContentKind::Text
            }
            Step::UploadFile => matches!(content, ContentKind::Document | ContentKind::Audio | ContentKind::Video),
            // Channel references arrive as text, ids, links or forwarded posts
            Step::ChannelInput => true,
        }
    }

    /// i18n key of the prompt re-sent on a content-kind mismatch.
    pub fn prompt_key(&self) -> &'static str {
        match self {
            Step::SearchQuery => "search.prompt",
            Step::UploadFile => "upload.send_file",
            Step::UploadTitle => "upload.enter_title",
            Step::UploadTags => "upload.enter_tags",
            Step::ChannelInput => "channels.add_instruction",
            Step::BroadcastMessage => "broadcast.prompt",
        }
    }
}

/// Current step plus the fields accumulated by earlier steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub step: Step,
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

impl ConversationState {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            fields: HashMap::new(),
        }
    }

    /// The same accumulated fields, moved to the next step.
    pub fn advanced(&self, step: Step) -> Self {
        Self {
            step,
            fields: self.fields.clone(),
        }
    }

    pub fn set_field(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Failure of a state-store backend. The tiered store downgrades on these
/// instead of propagating them into the dispatch loop.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state backend unavailable: {0}")]
    Backend(String),

    #[error("state serialization failed: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for StateError {
    fn from(err: ::redis::RedisError) -> Self {
        StateError::Backend(err.to_string())
    }
}

/// Keyed conversation-state storage.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, identity: i64) -> Result<Option<ConversationState>, StateError>;
    async fn set(&self, identity: i64, state: ConversationState) -> Result<(), StateError>;
    async fn clear(&self, identity: i64) -> Result<(), StateError>;
}
