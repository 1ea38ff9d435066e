//! Telegram-backed membership oracle.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::requests::Request;
use teloxide::{ApiError, RequestError};

use crate::core::config;
use crate::pipeline::membership::{MembershipOracle, Verdict};
use crate::telegram::Bot;

/// Queries chat membership through the Bot API with a bounded timeout.
///
/// The bot must hold admin rights in the queried channel; without them
/// Telegram refuses the lookup and the verdict is indeterminate — which the
/// gate treats as a fail-closed denial with an operator-facing message.
pub struct TelegramOracle {
    bot: Bot,
}

impl TelegramOracle {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MembershipOracle for TelegramOracle {
    async fn check(&self, identity: i64, channel: i64) -> Verdict {
        let request = self.bot.get_chat_member(ChatId(channel), UserId(identity as u64));

        match tokio::time::timeout(config::gate::oracle_timeout(), request.send()).await {
            Err(_) => {
                log::warn!("membership check timed out for user {} in channel {}", identity, channel);
                Verdict::Indeterminate
            }
            Ok(Ok(member)) => {
                // Present states include restricted-but-present; only left
                // and kicked count as absent.
                if member.kind.is_left() || member.kind.is_banned() {
                    Verdict::Absent
                } else {
                    Verdict::Member
                }
            }
            Ok(Err(err)) => classify_error(identity, channel, &err),
        }
    }
}

fn classify_error(identity: i64, channel: i64, err: &RequestError) -> Verdict {
    match err {
        // The channel is gone for good: the requirement can never be
        // satisfied, so it counts as absent and gets flagged for pruning.
        RequestError::Api(ApiError::ChatNotFound) => {
            log::warn!("required channel {} not found while checking user {}", channel, identity);
            Verdict::Gone
        }
        // The user has never been seen by Telegram in this context.
        RequestError::Api(ApiError::UserNotFound) => Verdict::Absent,
        // Most commonly "member list is inaccessible" — the bot is not an
        // admin of the channel. Verification is impossible, not failed.
        RequestError::Api(api_err) => {
            log::warn!(
                "cannot verify membership of {} in {} (bot lacks rights?): {}",
                identity,
                channel,
                api_err
            );
            Verdict::Indeterminate
        }
        _ => {
            log::warn!(
                "transient error checking membership of {} in {}: {}",
                identity,
                channel,
                err
            );
            Verdict::Indeterminate
        }
    }
}
