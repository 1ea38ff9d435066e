//! Bot initialization and command-menu management
//!
//! This module contains:
//! - Command enum definition (user-facing menu)
//! - Bot instance creation
//! - Per-chat command menus (admins see admin commands)

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, BotCommandScope, Recipient};
use teloxide::utils::command::BotCommands;

use crate::core::config;

pub type Bot = teloxide::Bot;

/// Bot commands enum with descriptions.
///
/// Only user-facing commands live here; admin commands are published per-chat
/// via [`setup_chat_commands`] and matched by the router from raw text.
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "open the main menu")]
    Start,
    #[command(description = "how to use the bot")]
    Help,
    #[command(description = "search files")]
    Search,
    #[command(description = "your saved files")]
    Saved,
    #[command(description = "cancel the current operation")]
    Cancel,
}

/// Creates a Bot instance with a bounded request timeout
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to create bot (missing token, client error)
pub fn create_bot() -> anyhow::Result<Bot> {
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    Ok(Bot::from_env_with_client(client))
}

fn user_commands() -> Vec<BotCommand> {
    vec![
        BotCommand::new("start", "open the main menu"),
        BotCommand::new("help", "how to use the bot"),
        BotCommand::new("search", "search files"),
        BotCommand::new("saved", "your saved files"),
        BotCommand::new("cancel", "cancel the current operation"),
    ]
}

fn admin_commands() -> Vec<BotCommand> {
    let mut commands = user_commands();
    commands.extend([
        BotCommand::new("upload", "upload a file"),
        BotCommand::new("delete", "delete a file by id"),
        BotCommand::new("stats", "bot statistics"),
        BotCommand::new("users", "recent users"),
        BotCommand::new("broadcast", "message all users"),
        BotCommand::new("channels", "required channels"),
        BotCommand::new("addchannel", "add a required channel"),
    ]);
    commands
}

/// Publishes the default command menu for all users.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(user_commands()).await?;
    Ok(())
}

/// Publishes the command menu scoped to one chat, including admin commands
/// when the user holds the admin role.
pub async fn setup_chat_commands(bot: &Bot, chat_id: ChatId, is_admin: bool) -> Result<(), teloxide::RequestError> {
    let commands = if is_admin { admin_commands() } else { user_commands() };
    bot.set_my_commands(commands)
        .scope(BotCommandScope::Chat {
            chat_id: Recipient::Id(chat_id),
        })
        .await?;
    Ok(())
}
