//! Progress Store (spec.md §4.A): a durable keyed store for per-post
//! max-progress, completion set, and per-item result cache, TTL-bound at
//! 24h and sliding.
//!
//! The store is a *hint cache*, not a source of truth: every read falls back
//! to the documented default on failure, logs the failure as a warning, and
//! never raises. Re-execution must converge regardless of store
//! availability (spec.md §4.A, §7 `StoreUnavailable`).

mod redis_store;

use async_trait::async_trait;

use crate::domain::ItemResult;

pub use redis_store::RedisProgressStore;

/// Default `maxProgress` when the store has no record for a post yet
/// (spec.md §3).
pub const DEFAULT_MAX_PROGRESS: f64 = 30.0;

/// TTL applied to every write, refreshed (slid) on each write (spec.md §3,
/// §4.A).
pub const PROGRESS_TTL: std::time::Duration = std::time::Duration::from_secs(24 * 3600);

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_max_progress(&self, post_id: &str) -> f64;
    async fn set_max_progress(&self, post_id: &str, value: f64);
    async fn get_completed(&self, post_id: &str) -> Vec<String>;
    async fn mark_completed(&self, post_id: &str, media_id: &str);
    async fn set_result(&self, post_id: &str, media_id: &str, result: &ItemResult);
    async fn get_result(&self, post_id: &str, media_id: &str) -> Option<ItemResult>;

    /// Ordered by completion (insertion order of `completed`), per spec.md
    /// §4.A.
    async fn get_all_results(&self, post_id: &str) -> Vec<ItemResult>;

    async fn snapshot_progress(&self, post_id: &str, snapshot: &crate::domain::ProgressSnapshot);
}

#[cfg(any(test, feature = "test-util"))]
pub mod in_memory {
    //! A process-local stand-in for [`ProgressStore`] used by executor tests
    //! (spec.md §2.4 of SPEC_FULL.md: exercising I1-I4 without a real Redis).

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{ProgressStore, DEFAULT_MAX_PROGRESS};
    use crate::domain::{ItemResult, ProgressSnapshot};

    #[derive(Default)]
    struct PostRecord {
        max_progress: Option<f64>,
        completed: Vec<String>,
        results: HashMap<String, ItemResult>,
        snapshot: Option<ProgressSnapshot>,
    }

    #[derive(Default)]
    pub struct InMemoryProgressStore {
        posts: Mutex<HashMap<String, PostRecord>>,
    }

    impl InMemoryProgressStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ProgressStore for InMemoryProgressStore {
        async fn get_max_progress(&self, post_id: &str) -> f64 {
            self.posts
                .lock()
                .unwrap()
                .get(post_id)
                .and_then(|r| r.max_progress)
                .unwrap_or(DEFAULT_MAX_PROGRESS)
        }

        async fn set_max_progress(&self, post_id: &str, value: f64) {
            self.posts
                .lock()
                .unwrap()
                .entry(post_id.to_string())
                .or_default()
                .max_progress = Some(value);
        }

        async fn get_completed(&self, post_id: &str) -> Vec<String> {
            self.posts
                .lock()
                .unwrap()
                .get(post_id)
                .map(|r| r.completed.clone())
                .unwrap_or_default()
        }

        async fn mark_completed(&self, post_id: &str, media_id: &str) {
            let mut posts = self.posts.lock().unwrap();
            let record = posts.entry(post_id.to_string()).or_default();
            if !record.completed.iter().any(|id| id == media_id) {
                record.completed.push(media_id.to_string());
            }
        }

        async fn set_result(&self, post_id: &str, media_id: &str, result: &ItemResult) {
            self.posts
                .lock()
                .unwrap()
                .entry(post_id.to_string())
                .or_default()
                .results
                .insert(media_id.to_string(), result.clone());
        }

        async fn get_result(&self, post_id: &str, media_id: &str) -> Option<ItemResult> {
            self.posts
                .lock()
                .unwrap()
                .get(post_id)
                .and_then(|r| r.results.get(media_id).cloned())
        }

        async fn get_all_results(&self, post_id: &str) -> Vec<ItemResult> {
            let posts = self.posts.lock().unwrap();
            let Some(record) = posts.get(post_id) else {
                return Vec::new();
            };
            record
                .completed
                .iter()
                .filter_map(|id| record.results.get(id).cloned())
                .collect()
        }

        async fn snapshot_progress(&self, post_id: &str, snapshot: &ProgressSnapshot) {
            self.posts
                .lock()
                .unwrap()
                .entry(post_id.to_string())
                .or_default()
                .snapshot = Some(snapshot.clone());
        }
    }
}
