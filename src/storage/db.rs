//! Connection pool, schema migration and the user registry.
//!
//! The registry is read on every update by the gate chain, so all queries here
//! stay single-statement and index-friendly (`telegram_id` is the primary key).

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::error::{AppError, AppResult};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// A named admin capability. Admins hold a subset of these in their
/// permission set; the gate's permission stage checks the one a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Upload,
    Delete,
    Stats,
    Users,
    Broadcast,
    Settings,
    Channels,
}

/// Every capability, in display order.
pub const ALL_CAPABILITIES: &[Capability] = &[
    Capability::Upload,
    Capability::Delete,
    Capability::Stats,
    Capability::Users,
    Capability::Broadcast,
    Capability::Settings,
    Capability::Channels,
];

/// A registry entry for one Telegram user.
#[derive(Debug, Clone)]
pub struct User {
    /// Telegram id of the user (primary key)
    pub telegram_id: i64,
    /// Telegram username, if set
    pub username: Option<String>,
    /// Display name captured on first contact
    pub full_name: Option<String>,
    /// Preferred language code ("uz", "en", "ru")
    pub language: String,
    /// Blocked users get exactly one denial message and nothing else
    pub is_blocked: bool,
    /// Admin role flag; capabilities are granted separately
    pub is_admin: bool,
    /// Granted admin capabilities (empty for regular users)
    pub permissions: Vec<Capability>,
}

impl User {
    /// Returns true if the user holds the given capability.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.permissions.contains(&capability)
    }
}

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and ensures the
/// schema exists.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder().max_size(10).build(manager)?;

    let conn = pool.get()?;
    init_schema(&conn)?;

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped, which is what makes
/// the per-update unit of work release on every exit path.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Create tables and apply in-place column migrations.
pub fn init_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            telegram_id INTEGER PRIMARY KEY,
            username    TEXT,
            full_name   TEXT,
            language    TEXT NOT NULL DEFAULT 'uz',
            is_blocked  INTEGER NOT NULL DEFAULT 0,
            blocked_at  TEXT,
            is_admin    INTEGER NOT NULL DEFAULT 0,
            permissions TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS files (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id        TEXT NOT NULL UNIQUE,
            title          TEXT NOT NULL,
            kind           TEXT NOT NULL,
            file_name      TEXT,
            tags           TEXT,
            download_count INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS downloads (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            telegram_id INTEGER NOT NULL,
            file_id     INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS saved_files (
            telegram_id INTEGER NOT NULL,
            file_id     INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(telegram_id, file_id)
        );
        CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    migrate_schema(conn)?;
    Ok(())
}

/// Add columns introduced after the first release to existing databases.
fn migrate_schema(conn: &Connection) -> AppResult<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(users)")?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;

    if !columns.contains(&"blocked_at".to_string()) {
        log::info!("Adding missing column: blocked_at to users table");
        conn.execute("ALTER TABLE users ADD COLUMN blocked_at TEXT", [])?;
    }
    if !columns.contains(&"permissions".to_string()) {
        log::info!("Adding missing column: permissions to users table");
        conn.execute("ALTER TABLE users ADD COLUMN permissions TEXT NOT NULL DEFAULT '[]'", [])?;
    }

    Ok(())
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let permissions_json: String = row.get(6)?;
    Ok(User {
        telegram_id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        language: row.get(3)?,
        is_blocked: row.get::<_, i64>(4)? != 0,
        is_admin: row.get::<_, i64>(5)? != 0,
        // Tolerate hand-edited rows: unparsable sets read as "no capabilities"
        permissions: serde_json::from_str(&permissions_json).unwrap_or_default(),
    })
}

const USER_COLUMNS: &str = "telegram_id, username, full_name, language, is_blocked, is_admin, permissions";

/// Look up a user by Telegram id.
pub fn get_user(conn: &Connection, telegram_id: i64) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLUMNS),
            params![telegram_id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

/// Create a user record with registry defaults (not blocked, not admin).
pub fn create_user(
    conn: &Connection,
    telegram_id: i64,
    username: Option<&str>,
    full_name: Option<&str>,
    language: &str,
) -> AppResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (telegram_id, username, full_name, language) VALUES (?1, ?2, ?3, ?4)",
        params![telegram_id, username, full_name, language],
    )?;
    Ok(())
}

/// Returns the stored language code for the user.
pub fn get_user_language(conn: &Connection, telegram_id: i64) -> AppResult<String> {
    let lang = conn
        .query_row(
            "SELECT language FROM users WHERE telegram_id = ?1",
            params![telegram_id],
            |row| row.get(0),
        )
        .optional()?;
    lang.ok_or_else(|| AppError::Validation(format!("unknown user {}", telegram_id)))
}

/// Persists the user's language choice.
pub fn set_user_language(conn: &Connection, telegram_id: i64, language: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE users SET language = ?2 WHERE telegram_id = ?1",
        params![telegram_id, language],
    )?;
    Ok(())
}

/// Blocks a user. Blocked users are denied at the second gate stage.
pub fn block_user(conn: &Connection, telegram_id: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE users SET is_blocked = 1, blocked_at = CURRENT_TIMESTAMP WHERE telegram_id = ?1",
        params![telegram_id],
    )?;
    Ok(changed > 0)
}

/// Unblocks a user.
pub fn unblock_user(conn: &Connection, telegram_id: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE users SET is_blocked = 0, blocked_at = NULL WHERE telegram_id = ?1",
        params![telegram_id],
    )?;
    Ok(changed > 0)
}

/// Grants or revokes the admin role together with a capability set.
pub fn set_admin(conn: &Connection, telegram_id: i64, is_admin: bool, permissions: &[Capability]) -> AppResult<bool> {
    let permissions_json = serde_json::to_string(permissions)?;
    let changed = conn.execute(
        "UPDATE users SET is_admin = ?2, permissions = ?3 WHERE telegram_id = ?1",
        params![telegram_id, is_admin as i64, permissions_json],
    )?;
    Ok(changed > 0)
}

/// Most recently joined users, newest first.
pub fn list_recent_users(conn: &Connection, limit: usize) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY created_at DESC, telegram_id DESC LIMIT ?1",
        USER_COLUMNS
    ))?;
    let users = stmt
        .query_map(params![limit as i64], row_to_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

/// Telegram ids of every non-blocked user (broadcast audience).
pub fn all_active_ids(conn: &Connection) -> AppResult<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT telegram_id FROM users WHERE is_blocked = 0")?;
    let ids = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Total number of registered users.
pub fn count_users(conn: &Connection) -> AppResult<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn test_pool() -> (NamedTempFile, DbPool) {
        let file = NamedTempFile::new().unwrap();
        let pool = create_pool(file.path().to_str().unwrap()).unwrap();
        (file, pool)
    }

    #[test]
    fn creates_and_reads_user_with_defaults() {
        let (_file, pool) = test_pool();
        let conn = pool.get().unwrap();

        create_user(&conn, 42, Some("alice"), Some("Alice"), "en").unwrap();
        let user = get_user(&conn, 42).unwrap().unwrap();

        assert_eq!(user.telegram_id, 42);
        assert_eq!(user.username.as_deref(), Some("alice"));
        assert_eq!(user.language, "en");
        assert!(!user.is_blocked);
        assert!(!user.is_admin);
        assert!(user.permissions.is_empty());
    }

    #[test]
    fn create_is_idempotent_on_first_contact_races() {
        let (_file, pool) = test_pool();
        let conn = pool.get().unwrap();

        create_user(&conn, 7, None, None, "uz").unwrap();
        create_user(&conn, 7, Some("late"), None, "ru").unwrap();

        let user = get_user(&conn, 7).unwrap().unwrap();
        assert_eq!(user.language, "uz");
        assert_eq!(user.username, None);
    }

    #[test]
    fn block_and_unblock_roundtrip() {
        let (_file, pool) = test_pool();
        let conn = pool.get().unwrap();

        create_user(&conn, 1, None, None, "uz").unwrap();
        assert!(block_user(&conn, 1).unwrap());
        assert!(get_user(&conn, 1).unwrap().unwrap().is_blocked);

        assert!(unblock_user(&conn, 1).unwrap());
        assert!(!get_user(&conn, 1).unwrap().unwrap().is_blocked);

        // Unknown id changes nothing
        assert!(!block_user(&conn, 999).unwrap());
    }

    #[test]
    fn permissions_roundtrip_through_json_column() {
        let (_file, pool) = test_pool();
        let conn = pool.get().unwrap();

        create_user(&conn, 5, None, None, "uz").unwrap();
        set_admin(&conn, 5, true, &[Capability::Upload, Capability::Channels]).unwrap();

        let user = get_user(&conn, 5).unwrap().unwrap();
        assert!(user.is_admin);
        assert!(user.has_capability(Capability::Upload));
        assert!(user.has_capability(Capability::Channels));
        assert!(!user.has_capability(Capability::Broadcast));
    }

    #[test]
    fn active_ids_exclude_blocked_users() {
        let (_file, pool) = test_pool();
        let conn = pool.get().unwrap();

        create_user(&conn, 1, None, None, "uz").unwrap();
        create_user(&conn, 2, None, None, "uz").unwrap();
        block_user(&conn, 2).unwrap();

        let ids = all_active_ids(&conn).unwrap();
        assert_eq!(ids, vec![1]);
        assert_eq!(count_users(&conn).unwrap(), 2);
    }
}
