//! In-process conversation-state tier. Fast, infallible, lost on restart.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ConversationState, StateError, StateStore};

/// DashMap-backed store. The degraded-mode fallback of the tiered store and
/// the only tier when no shared backend is configured.
#[derive(Default)]
pub struct MemoryStateStore {
    entries: DashMap<i64, ConversationState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, identity: i64) -> Result<Option<ConversationState>, StateError> {
        Ok(self.entries.get(&identity).map(|entry| entry.clone()))
    }

    async fn set(&self, identity: i64, state: ConversationState) -> Result<(), StateError> {
        self.entries.insert(identity, state);
        Ok(())
    }

    async fn clear(&self, identity: i64) -> Result<(), StateError> {
        self.entries.remove(&identity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::state::Step;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn get_set_clear_roundtrip() {
        let store = MemoryStateStore::new();
        assert_eq!(store.get(1).await.unwrap(), None);

        store.set(1, ConversationState::new(Step::SearchQuery)).await.unwrap();
        assert_eq!(store.get(1).await.unwrap().unwrap().step, Step::SearchQuery);

        store.clear(1).await.unwrap();
        assert_eq!(store.get(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_overwrites_whole_state() {
        let store = MemoryStateStore::new();

        let mut first = ConversationState::new(Step::UploadFile);
        first.set_field("file_id", "abc");
        store.set(1, first).await.unwrap();

        store.set(1, ConversationState::new(Step::SearchQuery)).await.unwrap();
        let current = store.get(1).await.unwrap().unwrap();
        assert_eq!(current.step, Step::SearchQuery);
        assert!(current.fields.is_empty());
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let store = MemoryStateStore::new();

        let mut a = ConversationState::new(Step::UploadTitle);
        a.set_field("title", "A");
        let mut b = ConversationState::new(Step::UploadTitle);
        b.set_field("title", "B");

        store.set(1, a).await.unwrap();
        store.set(2, b).await.unwrap();

        assert_eq!(store.get(1).await.unwrap().unwrap().field("title"), Some("A"));
        assert_eq!(store.get(2).await.unwrap().unwrap().field("title"), Some("B"));
    }
}
