//! Worker Host (spec.md §4.G): pulls jobs from the broker, honours the
//! configured concurrency limit, dispatches each accepted job to a
//! `JobExecutor`, and drains in-flight work on graceful shutdown.
//!
//! The broker itself is an external collaborator (spec.md §1, §2 row G);
//! this module defines only the generic interface the core depends on
//! (`JobBroker`) plus a Redis-backed implementation of it.

mod cleanup;
mod redis_broker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub use cleanup::{CleanupQueue, CleanupWorker, LeasedCleanupJob};
pub use redis_broker::{RedisCleanupQueue, RedisJobBroker};

use crate::domain::Job;
use crate::error::WorkerError;
use crate::executor::JobExecutor;

/// How long a failed broker poll backs off before retrying (spec.md §7:
/// broker errors are transient and the broker's own retry policy, not the
/// worker host, decides whether a job attempt is abandoned).
const DEQUEUE_BACKOFF: Duration = Duration::from_secs(1);

/// An opaque broker-side handle identifying one dequeued-but-unacknowledged
/// job. Implementations stash whatever they need to ack/nack later (a raw
/// payload for a list-based queue, a delivery tag for an AMQP-style one).
pub struct JobLease {
    pub(crate) raw: String,
}

pub struct LeasedJob {
    pub job: Job,
    pub lease: JobLease,
}

/// Generic worker interface the Worker Host consumes (spec.md §1: "The
/// distributed queue broker — consumed through a generic worker
/// interface"). Transport, redelivery, and stalled-job detection are the
/// broker's concern; the core only needs dequeue/ack/nack.
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Waits (with an implementation-defined bound) for the next job.
    /// `Ok(None)` means the poll came back empty, not that the queue is
    /// closed — callers should simply poll again.
    async fn dequeue(&self) -> Result<Option<LeasedJob>, WorkerError>;

    /// Marks `lease`'s job permanently done; it will not be redelivered.
    async fn ack(&self, lease: JobLease);

    /// Releases `lease` back to the queue for redelivery per the broker's
    /// own retry policy (spec.md §5: attempts of the same post are
    /// serialised by the broker; `maxStalledCount=1`).
    async fn nack(&self, lease: JobLease);
}

/// Counters the admin surface reports as `/metrics` (spec.md §2 row — out
/// of scope beyond the interface the core feeds).
#[derive(Default)]
pub struct QueueCounters {
    pub jobs_in_flight: AtomicU64,
    pub jobs_succeeded: AtomicU64,
    pub jobs_failed: AtomicU64,
}

pub struct WorkerHost {
    broker: Arc<dyn JobBroker>,
    executor: Arc<JobExecutor>,
    concurrency: usize,
    counters: Arc<QueueCounters>,
}

impl WorkerHost {
    pub fn new(
        broker: Arc<dyn JobBroker>,
        executor: Arc<JobExecutor>,
        concurrency: usize,
        counters: Arc<QueueCounters>,
    ) -> Self {
        Self {
            broker,
            executor,
            concurrency,
            counters,
        }
    }

    /// Runs until `shutdown` resolves, then stops accepting new jobs and
    /// waits for in-flight ones to finish before returning (spec.md §4.G
    /// "graceful shutdown").
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight: JoinSet<()> = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("worker host received shutdown signal; draining in-flight jobs");
                    break;
                }
                Ok(permit) = Arc::clone(&semaphore).acquire_owned() => {
                    match self.broker.dequeue().await {
                        Ok(Some(leased)) => {
                            let executor = Arc::clone(&self.executor);
                            let broker = Arc::clone(&self.broker);
                            let counters = Arc::clone(&self.counters);
                            counters.jobs_in_flight.fetch_add(1, Ordering::Relaxed);
                            in_flight.spawn(async move {
                                let _permit = permit;
                                let LeasedJob { job, lease } = leased;
                                let post_id = job.post_id.clone();
                                let attempt = job.attempt;
                                match executor.execute(job).await {
                                    Ok(outcome) => {
                                        info!(post_id, attempt, total_processed = outcome.total_processed, "job attempt completed");
                                        counters.jobs_succeeded.fetch_add(1, Ordering::Relaxed);
                                        broker.ack(lease).await;
                                    }
                                    Err(err) => {
                                        error!(post_id, attempt, error = %err, "job attempt failed; returning to broker");
                                        counters.jobs_failed.fetch_add(1, Ordering::Relaxed);
                                        broker.nack(lease).await;
                                    }
                                }
                                counters.jobs_in_flight.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Ok(None) => {
                            // Empty poll; drop the permit immediately so the
                            // next loop iteration can re-acquire it rather
                            // than holding a slot open for nothing.
                        }
                        Err(err) => {
                            warn!(error = %err, "broker dequeue failed; backing off");
                            tokio::time::sleep(DEQUEUE_BACKOFF).await;
                        }
                    }
                }
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(err) = result {
                        error!(error = %err, "job task panicked");
                    }
                }
            }
        }

        while let Some(result) = in_flight.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "job task panicked during drain");
            }
        }

        info!("worker host drained, broker connection closing");
    }
}
