//! Short-lived per-user search result cache for pagination callbacks.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// One cached search: the query and the matching catalog ids.
#[derive(Debug, Clone)]
pub struct CachedSearch {
    pub query: String,
    pub file_ids: Vec<i64>,
    cached_at: Instant,
}

/// Keyed by user id. Pagination buttons carry only a page number; the result
/// set they page over lives here until it expires.
pub struct SearchCache {
    cache: Arc<Mutex<HashMap<i64, CachedSearch>>>,
    ttl: Duration,
}

impl SearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn get(&self, user_id: i64) -> Option<CachedSearch> {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get(&user_id) {
            if entry.cached_at.elapsed() < self.ttl {
                return Some(entry.clone());
            }
            cache.remove(&user_id);
        }
        None
    }

    pub async fn set(&self, user_id: i64, query: String, file_ids: Vec<i64>) {
        let mut cache = self.cache.lock().await;
        cache.insert(
            user_id,
            CachedSearch {
                query,
                file_ids,
                cached_at: Instant::now(),
            },
        );
    }
}
