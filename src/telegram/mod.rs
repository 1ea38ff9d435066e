//! Telegram transport layer: bot setup, update conversion, oracle and
//! responder implementations, keyboards and endpoint handlers

pub mod adapter;
pub mod bot;
pub mod cache;
pub mod handlers;
pub mod keyboards;
pub mod oracle;
pub mod responder;

// Re-exports for convenience
pub use adapter::schema;
pub use bot::{create_bot, setup_bot_commands, setup_chat_commands, Bot, Command};
pub use handlers::{build_router, HandlerDeps};
pub use oracle::TelegramOracle;
pub use responder::TelegramResponder;
