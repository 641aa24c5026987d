//! Redis-backed implementations of [`JobBroker`] and [`CleanupQueue`].
//!
//! Uses the classic reliable-queue recipe over Redis lists: `BRPOPLPUSH`
//! atomically moves a payload from the public queue into a per-worker
//! "processing" list, so a worker that dies mid-job leaves its payload
//! recoverable rather than lost. Ack removes it from the processing list;
//! nack removes it and pushes it back onto the public queue for
//! redelivery — the broker-level stalled-job reaper (spec.md §5
//! `maxStalledCount=1`) is out of scope for this worker, which only needs
//! to honour the dequeue/ack/nack contract.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::warn;

use super::cleanup::{CleanupQueue, LeasedCleanupJob};
use super::{JobBroker, JobLease, LeasedJob};
use crate::domain::{CleanupFailedMediaJob, Job};
use crate::error::WorkerError;

/// Seconds `BRPOPLPUSH` blocks before returning an empty poll, letting the
/// worker host's select loop re-check its shutdown signal periodically.
const BLOCK_TIMEOUT_SECS: usize = 5;

const JOB_QUEUE_KEY: &str = "queue:media-processing";
const CLEANUP_QUEUE_KEY: &str = "queue:cleanup-failed-media";

async fn requeue(
    manager: &redis::aio::ConnectionManager,
    processing_key: &str,
    queue_key: &str,
    raw: &str,
) -> redis::RedisResult<()> {
    let mut conn = manager.clone();
    redis::pipe()
        .lrem(processing_key, 1, raw)
        .lpush(queue_key, raw)
        .query_async(&mut conn)
        .await
}

pub struct RedisJobBroker {
    manager: redis::aio::ConnectionManager,
    processing_key: String,
}

impl RedisJobBroker {
    pub async fn connect(redis_url: &str, worker_id: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            manager,
            processing_key: format!("{JOB_QUEUE_KEY}:processing:{worker_id}"),
        })
    }
}

#[async_trait]
impl JobBroker for RedisJobBroker {
    async fn dequeue(&self) -> Result<Option<LeasedJob>, WorkerError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .brpoplpush(JOB_QUEUE_KEY, &self.processing_key, BLOCK_TIMEOUT_SECS)
            .await
            .map_err(|e| WorkerError::TransientIO(format!("broker dequeue failed: {e}")))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<Job>(&raw) {
            Ok(job) => Ok(Some(LeasedJob {
                job,
                lease: JobLease { raw },
            })),
            Err(err) => {
                warn!(error = %err, "dropping malformed job payload from queue");
                let mut conn = self.manager.clone();
                let _: redis::RedisResult<()> = conn.lrem(&self.processing_key, 1, &raw).await;
                Ok(None)
            }
        }
    }

    async fn ack(&self, lease: JobLease) {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = conn.lrem(&self.processing_key, 1, &lease.raw).await;
        if let Err(err) = result {
            warn!(error = %err, "failed to acknowledge completed job");
        }
    }

    async fn nack(&self, lease: JobLease) {
        if let Err(err) = requeue(&self.manager, &self.processing_key, JOB_QUEUE_KEY, &lease.raw).await {
            warn!(error = %err, "failed to requeue failed job");
        }
    }
}

pub struct RedisCleanupQueue {
    manager: redis::aio::ConnectionManager,
    processing_key: String,
}

impl RedisCleanupQueue {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            manager,
            processing_key: format!("{CLEANUP_QUEUE_KEY}:processing"),
        })
    }
}

#[async_trait]
impl CleanupQueue for RedisCleanupQueue {
    async fn dequeue(&self) -> Result<Option<LeasedCleanupJob>, WorkerError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .brpoplpush(CLEANUP_QUEUE_KEY, &self.processing_key, BLOCK_TIMEOUT_SECS)
            .await
            .map_err(|e| WorkerError::TransientIO(format!("cleanup queue dequeue failed: {e}")))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<CleanupFailedMediaJob>(&raw) {
            Ok(job) => Ok(Some(LeasedCleanupJob {
                job,
                lease: JobLease { raw },
            })),
            Err(err) => {
                warn!(error = %err, "dropping malformed cleanup job payload");
                let mut conn = self.manager.clone();
                let _: redis::RedisResult<()> = conn.lrem(&self.processing_key, 1, &raw).await;
                Ok(None)
            }
        }
    }

    async fn ack(&self, lease: JobLease) {
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<()> = conn.lrem(&self.processing_key, 1, &lease.raw).await;
        if let Err(err) = result {
            warn!(error = %err, "failed to acknowledge cleanup job");
        }
    }

    async fn nack(&self, lease: JobLease) {
        if let Err(err) = requeue(&self.manager, &self.processing_key, CLEANUP_QUEUE_KEY, &lease.raw).await {
            warn!(error = %err, "failed to requeue cleanup job");
        }
    }
}
