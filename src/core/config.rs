use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot

/// Path to the SQLite database file
/// Read from DATABASE_PATH environment variable
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "teleshelf.sqlite".to_string()));

/// Path to the log file
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE").unwrap_or_else(|_| "teleshelf.log".to_string()));

/// Redis URL for the shared conversation-state tier.
/// When unset the bot runs on the in-memory tier only (states reset on restart).
pub static REDIS_URL: Lazy<Option<String>> = Lazy::new(|| env::var("REDIS_URL").ok());

/// Superuser Telegram id. Always passes permission checks and bypasses the
/// membership gate. 0 means "not configured".
pub static SUPERUSER_ID: Lazy<i64> = Lazy::new(|| {
    env::var("SUPERUSER_ID")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
});

/// Default language code for newly provisioned users
pub static DEFAULT_LANG: Lazy<String> = Lazy::new(|| env::var("DEFAULT_LANG").unwrap_or_else(|_| "uz".to_string()));

/// Fallback admin contact (without @) shown in block/help messages when the
/// `admin_contact` setting is not set.
pub static ADMIN_CONTACT: Lazy<String> = Lazy::new(|| env::var("ADMIN_CONTACT").unwrap_or_else(|_| "admin".to_string()));

/// Membership gate configuration
pub mod gate {
    use super::Duration;

    /// Timeout for a single membership query against Telegram (in seconds).
    /// A timed-out query is reported as indeterminate, never as a pass.
    pub const ORACLE_TIMEOUT_SECS: u64 = 5;

    /// Oracle call timeout duration
    pub fn oracle_timeout() -> Duration {
        Duration::from_secs(ORACLE_TIMEOUT_SECS)
    }
}

/// Search configuration
pub mod search {
    /// Results shown per page of inline buttons
    pub const PAGE_SIZE: usize = 3;

    /// Hard cap on results fetched for one query
    pub const MAX_RESULTS: usize = 300;

    /// How long cached search results stay valid for pagination (in seconds)
    pub const CACHE_TTL_SECS: u64 = 900;
}

/// Saved-list configuration
pub mod saved {
    /// Entries shown in one saved-list message
    pub const PAGE_SIZE: usize = 10;
}

/// Admin listing configuration
pub mod admin {
    /// User cards shown by /users
    pub const USERS_PAGE_SIZE: usize = 10;
}

/// Broadcast configuration
pub mod broadcast {
    use super::Duration;

    /// Pause between individual sends to stay under Telegram flood limits (in milliseconds)
    pub const SEND_PAUSE_MS: u64 = 50;

    /// Pause between sends
    pub fn send_pause() -> Duration {
        Duration::from_millis(SEND_PAUSE_MS)
    }
}

/// Conversation-state storage configuration
pub mod state {
    /// Redis key prefix for per-user conversation states
    pub const KEY_PREFIX: &str = "teleshelf:state:";

    /// TTL for shared-tier states (in seconds). Abandoned flows expire on their own.
    pub const TTL_SECS: u64 = 86_400;
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for Telegram API calls (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Retry configuration
pub mod retry {
    use super::Duration;

    /// Maximum number of retries for dispatcher reconnection
    pub const MAX_DISPATCHER_RETRIES: u32 = 5;

    /// Delay between dispatcher retry attempts (in seconds)
    pub const DISPATCHER_RETRY_DELAY_SECS: u64 = 5;

    /// Dispatcher retry delay duration
    pub fn dispatcher_delay() -> Duration {
        Duration::from_secs(DISPATCHER_RETRY_DELAY_SECS)
    }

    /// Base for exponential backoff calculation
    pub const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
}
