//! Shared conversation-state tier backed by Redis.
//!
//! States written here survive process restarts, which is what makes bot
//! redeploys invisible to users mid-flow. Values are JSON blobs under a
//! prefixed per-identity key with a TTL so abandoned flows expire.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::core::config;

use super::{ConversationState, StateError, StateStore};

pub struct RedisStateStore {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisStateStore {
    /// Connects to the shared tier. Failure here is not fatal to the caller:
    /// the tiered store runs local-only when the shared tier is unavailable.
    pub async fn connect(url: &str) -> Result<Self, StateError> {
        let client = redis::Client::open(url).map_err(StateError::from)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }

    fn key(identity: i64) -> String {
        format!("{}{}", config::state::KEY_PREFIX, identity)
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get(&self, identity: i64) -> Result<Option<ConversationState>, StateError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(identity)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, identity: i64, state: ConversationState) -> Result<(), StateError> {
        let json = serde_json::to_string(&state)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(identity), json, config::state::TTL_SECS)
            .await?;
        Ok(())
    }

    async fn clear(&self, identity: i64) -> Result<(), StateError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(identity)).await?;
        Ok(())
    }
}
