//! Outbound response boundary used by the router for denial and fallback
//! messages. Kept i18n-free: callers pass fully rendered strings, so a fake
//! responder in tests records exactly what a user would have seen.

use async_trait::async_trait;
use thiserror::Error;
use unic_langid::LanguageIdentifier;

use crate::i18n;
use crate::storage::settings::RequiredChannel;

#[derive(Debug, Error)]
pub enum RespondError {
    #[error("transport send failed: {0}")]
    Transport(String),
}

/// One join-link button of a subscription prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinButton {
    pub label: String,
    pub url: String,
}

/// The denial prompt for missing channels: join buttons plus the confirm
/// action the user presses to re-trigger the check.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPrompt {
    pub text: String,
    pub confirm_label: String,
    pub channels: Vec<JoinButton>,
}

impl JoinPrompt {
    /// Builds the prompt for the given channels with the given body text,
    /// rendered in the user's locale.
    pub fn for_channels(lang: &LanguageIdentifier, text_key: &str, channels: &[RequiredChannel]) -> Self {
        Self {
            text: i18n::t(lang, text_key),
            confirm_label: i18n::t(lang, "membership.confirm_button"),
            channels: channels
                .iter()
                .map(|c| JoinButton {
                    label: format!("📢 {}", c.label()),
                    url: c.join_url(),
                })
                .collect(),
        }
    }
}

/// Minimal outbound surface the router needs.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn send_text(&self, identity: i64, text: String) -> Result<(), RespondError>;
    async fn send_join_prompt(&self, identity: i64, prompt: JoinPrompt) -> Result<(), RespondError>;
}
