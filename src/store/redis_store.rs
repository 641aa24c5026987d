use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

use super::{ProgressStore, DEFAULT_MAX_PROGRESS, PROGRESS_TTL};
use crate::domain::{ItemResult, ProgressSnapshot};

/// Key layout from spec.md §6 "Progress-store key layout".
fn max_progress_key(post_id: &str) -> String {
    format!("maxProgress:{post_id}")
}
fn progress_key(post_id: &str) -> String {
    format!("progress:{post_id}")
}
fn completed_key(post_id: &str) -> String {
    format!("completed:{post_id}")
}
fn result_key(post_id: &str, media_id: &str) -> String {
    format!("mediaResult:{post_id}:{media_id}")
}

/// Redis-backed [`ProgressStore`]. Every method swallows connection/command
/// errors and falls back to the safe default documented in spec.md §4.A —
/// the store is a hint cache, never a correctness dependency.
pub struct RedisProgressStore {
    manager: redis::aio::ConnectionManager,
}

impl RedisProgressStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    fn ttl_secs() -> i64 {
        PROGRESS_TTL.as_secs() as i64
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn get_max_progress(&self, post_id: &str) -> f64 {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<Option<String>> = conn.get(max_progress_key(post_id)).await;
        match result {
            Ok(Some(raw)) => raw.parse().unwrap_or(DEFAULT_MAX_PROGRESS),
            Ok(None) => DEFAULT_MAX_PROGRESS,
            Err(err) => {
                warn!(post_id, error = %err, "progress store read failed; using default max_progress");
                DEFAULT_MAX_PROGRESS
            }
        }
    }

    async fn set_max_progress(&self, post_id: &str, value: f64) {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = conn
            .set_ex(max_progress_key(post_id), value.to_string(), Self::ttl_secs() as u64)
            .await;
        if let Err(err) = result {
            warn!(post_id, error = %err, "progress store write failed for max_progress");
        }
    }

    async fn get_completed(&self, post_id: &str) -> Vec<String> {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<Option<String>> = conn.get(completed_key(post_id)).await;
        match result {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(post_id, error = %err, "progress store read failed; assuming no completed items");
                Vec::new()
            }
        }
    }

    async fn mark_completed(&self, post_id: &str, media_id: &str) {
        let mut completed = self.get_completed(post_id).await;
        if completed.iter().any(|id| id == media_id) {
            return;
        }
        completed.push(media_id.to_string());
        let Ok(raw) = serde_json::to_string(&completed) else {
            return;
        };
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = conn
            .set_ex(completed_key(post_id), raw, Self::ttl_secs() as u64)
            .await;
        if let Err(err) = result {
            warn!(post_id, media_id, error = %err, "progress store write failed for completed set");
        }
    }

    async fn set_result(&self, post_id: &str, media_id: &str, result: &ItemResult) {
        let Ok(raw) = serde_json::to_string(result) else {
            return;
        };
        let mut conn = self.manager.clone();
        let write: redis::RedisResult<()> = conn
            .set_ex(result_key(post_id, media_id), raw, Self::ttl_secs() as u64)
            .await;
        if let Err(err) = write {
            warn!(post_id, media_id, error = %err, "progress store write failed for item result");
        }
    }

    async fn get_result(&self, post_id: &str, media_id: &str) -> Option<ItemResult> {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<Option<String>> =
            conn.get(result_key(post_id, media_id)).await;
        match result {
            Ok(Some(raw)) => serde_json::from_str(&raw).ok(),
            Ok(None) => None,
            Err(err) => {
                warn!(post_id, media_id, error = %err, "progress store read failed for item result");
                None
            }
        }
    }

    async fn get_all_results(&self, post_id: &str) -> Vec<ItemResult> {
        let completed = self.get_completed(post_id).await;
        let mut results = Vec::with_capacity(completed.len());
        for media_id in completed {
            if let Some(result) = self.get_result(post_id, &media_id).await {
                results.push(result);
            }
        }
        results
    }

    async fn snapshot_progress(&self, post_id: &str, snapshot: &ProgressSnapshot) {
        let Ok(raw) = serde_json::to_string(snapshot) else {
            return;
        };
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = conn
            .set_ex(progress_key(post_id), raw, Self::ttl_secs() as u64)
            .await;
        if let Err(err) = result {
            warn!(post_id, error = %err, "progress store write failed for progress snapshot");
        }
    }
}
