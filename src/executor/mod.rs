//! Job Executor (spec.md §4.F) — the centrepiece. Orchestrates the
//! Progress Store, Blob Client, and the Image/Video Pipelines for one job
//! attempt: progress accounting, resumption, per-item dispatch, cleanup,
//! and the exactly-once terminal callback.

mod callback;
mod progress_model;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

pub use callback::{HttpNotifier, Notifier, ProgressPayload, TerminalFailurePayload, TerminalSuccessPayload};
use progress_model::ProgressModel;

use crate::blob::BlobClient;
use crate::config::Config;
use crate::domain::{Item, ItemResult, Job, ProgressSnapshot, ProgressStatus};
use crate::encoder::EncoderDriver;
use crate::error::WorkerError;
use crate::pipeline::{run_image_pipeline, run_video_pipeline};
use crate::store::ProgressStore;

/// Minimum interval between outbound progress notifications per post
/// (spec.md §5 "Progress coalescing").
const COALESCE_INTERVAL: Duration = Duration::from_millis(250);

/// Terminal object returned to the broker on success (spec.md §4.F).
#[derive(Debug, Clone)]
pub struct TerminalOutcome {
    pub post_id: String,
    pub media_results: Vec<ItemResult>,
    pub total_processed: usize,
    pub status: &'static str,
}

pub struct JobExecutor {
    store: Arc<dyn ProgressStore>,
    blob: Arc<dyn BlobClient>,
    driver: Arc<EncoderDriver>,
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        blob: Arc<dyn BlobClient>,
        driver: Arc<EncoderDriver>,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            blob,
            driver,
            notifier,
            config,
        }
    }

    #[instrument(skip(self, job), fields(post_id = %job.post_id, attempt = job.attempt))]
    pub async fn execute(&self, job: Job) -> Result<TerminalOutcome, WorkerError> {
        job.validate()?;

        match self.run_items(&job).await {
            Ok(results) => self.finalise(&job, results).await,
            Err(err) => {
                self.fail(&job, &err).await;
                Err(err)
            }
        }
    }

    async fn run_items(&self, job: &Job) -> Result<Vec<Option<ItemResult>>, WorkerError> {
        let n = job.media.len();
        let mut model = ProgressModel::new(job.post_id.clone(), n);
        let mut last_notify = Instant::now() - COALESCE_INTERVAL;

        let completed = self.store.get_completed(&job.post_id).await;
        let mut results: Vec<Option<ItemResult>> = vec![None; n];

        for (i, item) in job.media.iter().enumerate() {
            if completed.iter().any(|id| id == item.media_id()) {
                results[i] = self.store.get_result(&job.post_id, item.media_id()).await;
                model.credit_full_item();
            }
        }

        for (i, item) in job.media.iter().enumerate() {
            let media_id = item.media_id().to_string();
            let filename = item.common().filename.clone();

            if completed.iter().any(|id| id == &media_id) {
                let value = model.report_after_credit(self.store.as_ref()).await;
                self.emit_progress(
                    job,
                    &mut last_notify,
                    value,
                    &format!("Skipping already-completed {filename}"),
                    i + 1,
                    n,
                    false,
                )
                .await;
                continue;
            }

            let value = model.report_after_credit(self.store.as_ref()).await;
            self.emit_progress(
                job,
                &mut last_notify,
                value,
                &format!("Processing {}/{}: {filename}", i + 1, n),
                i + 1,
                n,
                false,
            )
            .await;

            let output_dir = self.output_dir(&job.post_id, &media_id);
            let download_dir = self.downloads_dir(&job.post_id, &media_id);
            recreate_dir(&output_dir).await?;
            recreate_dir(&download_dir).await?;

            let download_path = download_dir.join(&filename);
            let source_key = format!("{}original/{}", job.s3_key, filename);
            let signed_url = self
                .blob
                .signed_read(&source_key, self.config.signed_url_ttl)
                .await?;
            self.blob.download_to_file(&signed_url, &download_path).await?;

            let value = model.report_partial(self.store.as_ref(), 0.1).await;
            self.emit_progress(
                job,
                &mut last_notify,
                value,
                &format!("Downloaded {filename}"),
                i + 1,
                n,
                false,
            )
            .await;

            let dest_prefix = format!("{}processed", job.s3_key);
            let encode_last_notify = std::cell::RefCell::new(Instant::now() - COALESCE_INTERVAL);
            let item_result = match item {
                Item::Video { height, .. } => {
                    run_video_pipeline(
                        &self.driver,
                        self.blob.as_ref(),
                        &download_path,
                        &output_dir,
                        item.common(),
                        *height,
                        &dest_prefix,
                        |pct| {
                            // Every stderr `time=` line lands here; gate both the
                            // store write and the callback POST to the same
                            // coalescing cadence as the rest of the job (spec.md
                            // §5 "Progress coalescing") by skipping the await
                            // entirely when we're still inside the interval. Not
                            // `async move`: the returned future is polled to
                            // completion in place before the next stderr line
                            // is read (see `EncoderDriver::run`), so it can
                            // simply borrow from this call's environment.
                            async {
                                if encode_last_notify.borrow().elapsed() < COALESCE_INTERVAL {
                                    return;
                                }
                                *encode_last_notify.borrow_mut() = Instant::now();
                                let fraction = 0.1 + 0.7 * (pct / 100.0);
                                let value = model.report_partial(self.store.as_ref(), fraction).await;
                                self.emit_progress(
                                    job,
                                    &mut last_notify,
                                    value,
                                    &format!("Encoding {}/{}: {filename}", i + 1, n),
                                    i + 1,
                                    n,
                                    true,
                                )
                                .await;
                            }
                        },
                    )
                    .await
                }
                Item::Image { .. } => {
                    run_image_pipeline(
                        &self.driver,
                        self.blob.as_ref(),
                        &download_path,
                        &output_dir,
                        item.common(),
                        &dest_prefix,
                    )
                    .await
                }
            }?;

            self.store.mark_completed(&job.post_id, &media_id).await;
            self.store.set_result(&job.post_id, &media_id, &item_result).await;
            results[i] = Some(item_result);

            model.credit_full_item();
            let value = model.report_after_credit(self.store.as_ref()).await;
            self.emit_progress(
                job,
                &mut last_notify,
                value,
                &format!("Completed {}/{}: {filename}", i + 1, n),
                i + 1,
                n,
                false,
            )
            .await;
        }

        Ok(results)
    }

    async fn finalise(
        &self,
        job: &Job,
        results: Vec<Option<ItemResult>>,
    ) -> Result<TerminalOutcome, WorkerError> {
        let n = job.media.len();
        let mut last_notify = Instant::now() - COALESCE_INTERVAL;

        self.emit_progress(job, &mut last_notify, 95.0, "Uploading processed files...", n, n, true)
            .await;
        self.emit_progress(job, &mut last_notify, 95.0, "Finalizing...", n, n, true)
            .await;

        self.purge_post_scratch(&job.post_id).await;

        let model = ProgressModel::new(job.post_id.clone(), n);
        model.finish(self.store.as_ref()).await;

        let media_results: Vec<ItemResult> = results.into_iter().flatten().collect();
        let total_processed = media_results.len();

        self.store
            .snapshot_progress(
                &job.post_id,
                &ProgressSnapshot {
                    percentage: 100.0,
                    message: "Media processing completed successfully".to_string(),
                    status: ProgressStatus::Success,
                    current_media: n,
                    total_media: n,
                    updated_at: chrono::Utc::now(),
                },
            )
            .await;

        if let Some(callback_url) = &job.callback_url {
            if !media_results.is_empty() {
                self.notifier
                    .notify_success(
                        callback_url,
                        TerminalSuccessPayload {
                            post_id: &job.post_id,
                            media_results: &media_results,
                            total_processed,
                            attempt: job.attempt,
                            status: "success",
                            progress: 100,
                            message: "Media processing completed successfully",
                        },
                    )
                    .await;
            }
        }

        info!(total_processed, "job attempt completed successfully");

        Ok(TerminalOutcome {
            post_id: job.post_id.clone(),
            media_results,
            total_processed,
            status: "success",
        })
    }

    async fn fail(&self, job: &Job, err: &WorkerError) {
        error!(error = %err, "job attempt failed");

        let max_progress = self.store.get_max_progress(&job.post_id).await;

        self.store
            .snapshot_progress(
                &job.post_id,
                &ProgressSnapshot {
                    percentage: max_progress,
                    message: err.to_string(),
                    status: ProgressStatus::Failed,
                    current_media: 0,
                    total_media: job.media.len(),
                    updated_at: chrono::Utc::now(),
                },
            )
            .await;

        self.purge_post_scratch(&job.post_id).await;

        if let Some(callback_url) = &job.callback_url {
            self.notifier
                .notify_failure(
                    callback_url,
                    TerminalFailurePayload {
                        post_id: &job.post_id,
                        error: &err.to_string(),
                        attempt: job.attempt,
                        status: "failed",
                        progress: max_progress,
                        message: &err.to_string(),
                    },
                )
                .await;
        }
    }

    async fn emit_progress(
        &self,
        job: &Job,
        last_notify: &mut Instant,
        value: f64,
        message: &str,
        current_media: usize,
        total_media: usize,
        force: bool,
    ) {
        self.store
            .snapshot_progress(
                &job.post_id,
                &ProgressSnapshot {
                    percentage: value,
                    message: message.to_string(),
                    status: ProgressStatus::Processing,
                    current_media,
                    total_media,
                    updated_at: chrono::Utc::now(),
                },
            )
            .await;

        if !force && last_notify.elapsed() < COALESCE_INTERVAL {
            return;
        }
        *last_notify = Instant::now();

        if let Some(callback_url) = &job.callback_url {
            self.notifier
                .notify_progress(
                    callback_url,
                    ProgressPayload {
                        post_id: &job.post_id,
                        progress: value,
                        message,
                        attempt: job.attempt,
                        status: "processing",
                        kind: "progress",
                        current_media,
                        total_media,
                    },
                )
                .await;
        }
    }

    fn output_dir(&self, post_id: &str, media_id: &str) -> PathBuf {
        self.config.output_root.join(post_id).join(media_id)
    }

    fn downloads_dir(&self, post_id: &str, media_id: &str) -> PathBuf {
        self.config.downloads_root.join(post_id).join(media_id)
    }

    async fn purge_post_scratch(&self, post_id: &str) {
        for root in [&self.config.output_root, &self.config.downloads_root] {
            let dir = root.join(post_id);
            if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(post_id, path = %dir.display(), error = %err, "scratch cleanup failed");
                }
            }
        }
    }
}

async fn recreate_dir(dir: &Path) -> Result<(), WorkerError> {
    if let Err(err) = tokio::fs::remove_dir_all(dir).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            return Err(WorkerError::CleanupFailed(format!("{dir:?}: {err}")));
        }
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| WorkerError::TransientIO(format!("mkdir {dir:?}: {e}")))
}
