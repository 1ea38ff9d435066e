//! File catalog, download log and per-user saved lists.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;

/// Content kind of a stored file, matching how it must be re-sent to Telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Document,
    Audio,
    Video,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Document => "document",
            FileKind::Audio => "audio",
            FileKind::Video => "video",
        }
    }

    pub fn parse(value: &str) -> FileKind {
        match value {
            "audio" => FileKind::Audio,
            "video" => FileKind::Video,
            _ => FileKind::Document,
        }
    }
}

/// One catalog entry. `file_id` is Telegram's opaque file handle and is reused
/// to deliver the file without re-uploading.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: i64,
    pub file_id: String,
    pub title: String,
    pub kind: FileKind,
    pub file_name: Option<String>,
    pub tags: Option<String>,
    pub download_count: i64,
}

/// Outcome of inserting a file into the catalog.
#[derive(Debug, PartialEq, Eq)]
pub enum FileInsert {
    Created(i64),
    /// The same Telegram file is already cataloged (UNIQUE on file_id)
    Duplicate,
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredFile> {
    let kind: String = row.get(3)?;
    Ok(StoredFile {
        id: row.get(0)?,
        file_id: row.get(1)?,
        title: row.get(2)?,
        kind: FileKind::parse(&kind),
        file_name: row.get(4)?,
        tags: row.get(5)?,
        download_count: row.get(6)?,
    })
}

const FILE_COLUMNS: &str = "id, file_id, title, kind, file_name, tags, download_count";

/// Insert a new file, detecting duplicates via the unique file_id constraint.
pub fn create_file(
    conn: &Connection,
    file_id: &str,
    title: &str,
    kind: FileKind,
    file_name: Option<&str>,
    tags: Option<&str>,
) -> AppResult<FileInsert> {
    let result = conn.execute(
        "INSERT INTO files (file_id, title, kind, file_name, tags) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![file_id, title, kind.as_str(), file_name, tags],
    );

    match result {
        Ok(_) => Ok(FileInsert::Created(conn.last_insert_rowid())),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
            Ok(FileInsert::Duplicate)
        }
        Err(e) => Err(e.into()),
    }
}

/// Fetch one file by catalog id.
pub fn get_file(conn: &Connection, id: i64) -> AppResult<Option<StoredFile>> {
    let file = conn
        .query_row(
            &format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS),
            params![id],
            row_to_file,
        )
        .optional()?;
    Ok(file)
}

/// Case-insensitive substring search over titles and tags.
pub fn search_files(conn: &Connection, query: &str, limit: usize) -> AppResult<Vec<StoredFile>> {
    let pattern = format!("%{}%", query.trim());
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM files WHERE title LIKE ?1 OR tags LIKE ?1 ORDER BY download_count DESC, id DESC LIMIT ?2",
        FILE_COLUMNS
    ))?;
    let files = stmt
        .query_map(params![pattern, limit as i64], row_to_file)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(files)
}

/// Remove a file from the catalog. Saved-list references are cleaned up too.
pub fn delete_file(conn: &Connection, id: i64) -> AppResult<bool> {
    let changed = conn.execute("DELETE FROM files WHERE id = ?1", params![id])?;
    if changed > 0 {
        conn.execute("DELETE FROM saved_files WHERE file_id = ?1", params![id])?;
    }
    Ok(changed > 0)
}

/// Log a delivery and bump the popularity counter.
pub fn record_download(conn: &Connection, telegram_id: i64, file_id: i64) -> AppResult<()> {
    conn.execute(
        "INSERT INTO downloads (telegram_id, file_id) VALUES (?1, ?2)",
        params![telegram_id, file_id],
    )?;
    conn.execute(
        "UPDATE files SET download_count = download_count + 1 WHERE id = ?1",
        params![file_id],
    )?;
    Ok(())
}

/// Add a file to the user's saved list. Returns false if it was already saved.
pub fn save_file(conn: &Connection, telegram_id: i64, file_id: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO saved_files (telegram_id, file_id) VALUES (?1, ?2)",
        params![telegram_id, file_id],
    )?;
    Ok(changed > 0)
}

/// Remove a file from the user's saved list.
pub fn remove_saved(conn: &Connection, telegram_id: i64, file_id: i64) -> AppResult<bool> {
    let changed = conn.execute(
        "DELETE FROM saved_files WHERE telegram_id = ?1 AND file_id = ?2",
        params![telegram_id, file_id],
    )?;
    Ok(changed > 0)
}

/// The user's saved files, most recently saved first.
pub fn saved_files(conn: &Connection, telegram_id: i64, limit: usize) -> AppResult<Vec<StoredFile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM files f JOIN saved_files s ON s.file_id = f.id
         WHERE s.telegram_id = ?1 ORDER BY s.created_at DESC LIMIT ?2",
        "f.id, f.file_id, f.title, f.kind, f.file_name, f.tags, f.download_count"
    ))?;
    let files = stmt
        .query_map(params![telegram_id, limit as i64], row_to_file)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(files)
}

/// Total number of cataloged files.
pub fn count_files(conn: &Connection) -> AppResult<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
    Ok(count)
}

/// Total number of logged downloads.
pub fn count_downloads(conn: &Connection) -> AppResult<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM downloads", [], |row| row.get(0))?;
    Ok(count)
}
