//! The "cleanup-failed-media" consumer (spec.md §4.G): a separate,
//! single-concurrency worker that enumerates and deletes a failed post's
//! original files on demand.
//!
//! spec.md §9 flags this as an open question: the source's delete call is
//! commented out, so the interface is normative but the deletion itself is
//! not confirmed intentional. DESIGN.md records the decision taken here —
//! the interface is implemented end-to-end and the delete step logs its
//! intent without calling the blob client, matching the source's observed
//! (if possibly accidental) behaviour rather than guessing.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::CleanupFailedMediaJob;
use crate::error::WorkerError;

pub struct LeasedCleanupJob {
    pub job: CleanupFailedMediaJob,
    pub lease: super::JobLease,
}

#[async_trait]
pub trait CleanupQueue: Send + Sync {
    async fn dequeue(&self) -> Result<Option<LeasedCleanupJob>, WorkerError>;
    async fn ack(&self, lease: super::JobLease);
    async fn nack(&self, lease: super::JobLease);
}

/// Consumes `cleanup-failed-media` jobs one at a time — deliberately no
/// concurrency, since these are rare, low-priority, best-effort sweeps
/// (spec.md §4.G "A separate single-concurrency `cleanup` worker").
pub struct CleanupWorker {
    queue: std::sync::Arc<dyn CleanupQueue>,
}

impl CleanupWorker {
    pub fn new(queue: std::sync::Arc<dyn CleanupQueue>) -> Self {
        Self { queue }
    }

    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("cleanup worker received shutdown signal");
                    break;
                }
                result = self.queue.dequeue() => {
                    match result {
                        Ok(Some(leased)) => self.process(leased).await,
                        Ok(None) => {}
                        Err(err) => {
                            warn!(error = %err, "cleanup queue dequeue failed; backing off");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    async fn process(&self, leased: LeasedCleanupJob) {
        let LeasedCleanupJob { job, lease } = leased;
        for key in &job.s3_keys {
            // No-op by design (see module docs / DESIGN.md): logs the
            // cleanup intent without invoking the blob client's delete.
            info!(post_id = %job.post_id, key, "cleanup-failed-media: marked for deletion");
        }
        self.queue.ack(lease).await;
    }
}
