//! Teleshelf — Telegram content-shelf bot
//!
//! Admins upload files; users search, download and save them. Every inbound
//! update passes an ordered gate chain (auto-provision, block check, locale,
//! mandatory channel membership, permissions) before a handler runs, and
//! multi-step flows ride a per-user conversation state machine.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, retry, audit events
//! - `storage`: SQLite pool, user registry, file catalog, settings
//! - `pipeline`: gate chain, membership oracle contract, conversation state
//!   store, dispatch router — transport-agnostic and fully testable
//! - `telegram`: teloxide adapter, oracle/responder implementations, handlers

pub mod cli;
pub mod core;
pub mod i18n;
pub mod pipeline;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use crate::core::{AppError, AppResult};
pub use crate::pipeline::router::Router;
pub use crate::storage::{create_pool, get_connection, DbConnection, DbPool};
