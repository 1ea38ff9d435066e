//! Admin-configured settings, persisted as string key-value pairs.
//!
//! The required-channel list lives here as a serialized JSON collection under
//! one key. The gate re-reads it on every evaluation, so an admin change takes
//! effect on the very next update without any cache invalidation.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::core::config;
use crate::core::error::AppResult;

/// Settings key holding the serialized required-channel list.
const REQUIRED_CHANNELS_KEY: &str = "required_channels";

/// Settings key for the admin contact shown in block/help messages.
const ADMIN_CONTACT_KEY: &str = "admin_contact";

/// One channel the user must be a member of to use the bot.
///
/// Display order of the stored collection is insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredChannel {
    pub channel_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub invite_link: Option<String>,
}

impl RequiredChannel {
    /// Human-readable label for buttons and listings.
    pub fn label(&self) -> String {
        if let Some(username) = &self.username {
            format!("@{}", username)
        } else if let Some(title) = &self.title {
            title.clone()
        } else {
            format!("Channel {}", self.channel_id)
        }
    }

    /// URL a user can follow to join the channel.
    ///
    /// Prefers the stored invite link (tracks joins through it), then the
    /// public username link, then the private-channel deep link.
    pub fn join_url(&self) -> String {
        if let Some(link) = &self.invite_link {
            link.clone()
        } else if let Some(username) = &self.username {
            format!("https://t.me/{}", username)
        } else {
            let bare_id = self.channel_id.to_string().replace("-100", "");
            format!("https://t.me/c/{}/1", bare_id)
        }
    }
}

/// Get setting value by key.
pub fn get_setting(conn: &Connection, key: &str) -> AppResult<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

/// Set setting value (insert or overwrite).
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> AppResult<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Delete a setting.
pub fn delete_setting(conn: &Connection, key: &str) -> AppResult<bool> {
    let changed = conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
    Ok(changed > 0)
}

/// The current required-channel list, in insertion order.
pub fn required_channels(conn: &Connection) -> AppResult<Vec<RequiredChannel>> {
    match get_setting(conn, REQUIRED_CHANNELS_KEY)? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

/// Append a channel to the required list. Returns false if its id is already present.
pub fn add_required_channel(conn: &Connection, channel: RequiredChannel) -> AppResult<bool> {
    let mut channels = required_channels(conn)?;
    if channels.iter().any(|c| c.channel_id == channel.channel_id) {
        return Ok(false);
    }
    channels.push(channel);
    set_setting(conn, REQUIRED_CHANNELS_KEY, &serde_json::to_string(&channels)?)?;
    Ok(true)
}

/// Remove a channel from the required list by channel id.
pub fn remove_required_channel(conn: &Connection, channel_id: i64) -> AppResult<bool> {
    let mut channels = required_channels(conn)?;
    let before = channels.len();
    channels.retain(|c| c.channel_id != channel_id);
    if channels.len() == before {
        return Ok(false);
    }
    set_setting(conn, REQUIRED_CHANNELS_KEY, &serde_json::to_string(&channels)?)?;
    Ok(true)
}

/// Admin contact (without @) for user-facing messages, falling back to the
/// environment-configured default.
pub fn admin_contact(conn: &Connection) -> String {
    get_setting(conn, ADMIN_CONTACT_KEY)
        .ok()
        .flatten()
        .unwrap_or_else(|| config::ADMIN_CONTACT.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::create_pool;
    use pretty_assertions::assert_eq;
    use tempfile::NamedTempFile;

    fn test_conn() -> (NamedTempFile, crate::storage::db::DbConnection) {
        let file = NamedTempFile::new().unwrap();
        let pool = create_pool(file.path().to_str().unwrap()).unwrap();
        let conn = pool.get().unwrap();
        (file, conn)
    }

    fn channel(id: i64) -> RequiredChannel {
        RequiredChannel {
            channel_id: id,
            username: None,
            title: None,
            invite_link: None,
        }
    }

    #[test]
    fn settings_roundtrip_and_overwrite() {
        let (_f, conn) = test_conn();

        assert_eq!(get_setting(&conn, "k").unwrap(), None);
        set_setting(&conn, "k", "v1").unwrap();
        set_setting(&conn, "k", "v2").unwrap();
        assert_eq!(get_setting(&conn, "k").unwrap().as_deref(), Some("v2"));
        assert!(delete_setting(&conn, "k").unwrap());
        assert!(!delete_setting(&conn, "k").unwrap());
    }

    #[test]
    fn channel_list_preserves_insertion_order() {
        let (_f, conn) = test_conn();

        assert!(add_required_channel(&conn, channel(-100111)).unwrap());
        assert!(add_required_channel(&conn, channel(-100222)).unwrap());
        assert!(!add_required_channel(&conn, channel(-100111)).unwrap()); // duplicate id

        let channels = required_channels(&conn).unwrap();
        assert_eq!(
            channels.iter().map(|c| c.channel_id).collect::<Vec<_>>(),
            vec![-100111, -100222]
        );

        assert!(remove_required_channel(&conn, -100111).unwrap());
        assert!(!remove_required_channel(&conn, -100111).unwrap());
        assert_eq!(required_channels(&conn).unwrap().len(), 1);
    }

    #[test]
    fn join_url_prefers_invite_link_then_username() {
        let with_link = RequiredChannel {
            invite_link: Some("https://t.me/+abc".to_string()),
            username: Some("chan".to_string()),
            ..channel(-1001234)
        };
        assert_eq!(with_link.join_url(), "https://t.me/+abc");

        let with_username = RequiredChannel {
            username: Some("chan".to_string()),
            ..channel(-1001234)
        };
        assert_eq!(with_username.join_url(), "https://t.me/chan");

        assert_eq!(channel(-1001234).join_url(), "https://t.me/c/1234/1");
    }

    #[test]
    fn label_falls_back_in_order() {
        let named = RequiredChannel {
            username: Some("chan".to_string()),
            title: Some("My Channel".to_string()),
            ..channel(-1)
        };
        assert_eq!(named.label(), "@chan");

        let titled = RequiredChannel {
            title: Some("My Channel".to_string()),
            ..channel(-1)
        };
        assert_eq!(titled.label(), "My Channel");

        assert_eq!(channel(-5).label(), "Channel -5");
    }
}
