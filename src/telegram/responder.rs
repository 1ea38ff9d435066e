//! Telegram implementation of the router's outbound boundary.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::pipeline::responder::{JoinPrompt, RespondError, Responder};
use crate::telegram::keyboards;
use crate::telegram::Bot;

pub struct TelegramResponder {
    bot: Bot,
}

impl TelegramResponder {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Responder for TelegramResponder {
    async fn send_text(&self, identity: i64, text: String) -> Result<(), RespondError> {
        self.bot
            .send_message(ChatId(identity), text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| RespondError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn send_join_prompt(&self, identity: i64, prompt: JoinPrompt) -> Result<(), RespondError> {
        let keyboard = keyboards::join_keyboard(&prompt);
        self.bot
            .send_message(ChatId(identity), prompt.text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await
            .map_err(|e| RespondError::Transport(e.to_string()))?;
        Ok(())
    }
}
