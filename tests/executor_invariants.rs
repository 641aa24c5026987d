//! Executor integration tests (SPEC_FULL.md §2.5): exercises the Job
//! Executor end-to-end against a real (mock) encoder subprocess, an
//! in-memory Progress Store, and a fake Blob Client/Notifier pair, covering
//! the I1-I4 invariants without a network or a real `ffmpeg` binary.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use media_worker::blob::{BlobClient, UploadedFile};
use media_worker::config::Config;
use media_worker::domain::{Item, ItemCommon, ItemResult, Job};
use media_worker::encoder::EncoderDriver;
use media_worker::error::WorkerError;
use media_worker::executor::{JobExecutor, Notifier, ProgressPayload, TerminalFailurePayload, TerminalSuccessPayload};
use media_worker::store::in_memory::InMemoryProgressStore;
use media_worker::store::ProgressStore;

/// `MOCK_ENCODER_LOG_PATH` is process-global state shared by every child the
/// mock encoder spawns; serialise the tests that touch it so concurrent
/// `cargo test` threads don't cross-contaminate each other's invocation log.
static ENV_LOCK: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();

async fn env_lock() -> tokio::sync::MutexGuard<'static, ()> {
    ENV_LOCK.get_or_init(|| tokio::sync::Mutex::new(())).lock().await
}

fn locate_mock_encoder() -> PathBuf {
    for key in ["CARGO_BIN_EXE_media_worker_mock_encoder", "CARGO_BIN_EXE_media-worker-mock-encoder"] {
        if let Ok(path) = std::env::var(key) {
            let p = PathBuf::from(path);
            if p.exists() {
                return p;
            }
        }
    }

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(deps_dir) = current_exe.parent() {
            if let Ok(entries) = std::fs::read_dir(deps_dir) {
                let mut candidates: Vec<PathBuf> = entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with("media_worker_mock_encoder") && !n.ends_with(".d"))
                    })
                    .filter(|p| p.is_file())
                    .collect();
                candidates.sort();
                if let Some(p) = candidates.pop() {
                    return p;
                }
            }
        }
    }

    panic!("unable to locate media_worker_mock_encoder test binary");
}

/// Fake Blob Client: downloads copy a fixture file from disk instead of
/// hitting the network, uploads synthesize a deterministic URL per key, and
/// `signed_read` can be told to fail for specific filenames so a test can
/// force a mid-job item failure.
struct FakeBlobClient {
    fixture: PathBuf,
    fail_filenames: Vec<String>,
}

#[async_trait]
impl BlobClient for FakeBlobClient {
    async fn signed_read(&self, key: &str, _ttl: Duration) -> Result<String, WorkerError> {
        if self.fail_filenames.iter().any(|name| key.ends_with(name)) {
            return Err(WorkerError::TransientIO(format!("forced signed_read failure for {key}")));
        }
        Ok(format!("fixture://{key}"))
    }

    async fn download_to_file(&self, _url: &str, local_path: &Path) -> Result<(), WorkerError> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkerError::TransientIO(e.to_string()))?;
        }
        tokio::fs::copy(&self.fixture, local_path)
            .await
            .map_err(|e| WorkerError::TransientIO(e.to_string()))?;
        Ok(())
    }

    async fn upload_file(&self, _local_path: &Path, key: &str) -> Result<String, WorkerError> {
        Ok(format!("https://fixture.example/{key}"))
    }

    async fn upload_directory(
        &self,
        local_dir: &Path,
        dest_prefix: &str,
    ) -> Result<Vec<UploadedFile>, WorkerError> {
        let mut entries = tokio::fs::read_dir(local_dir)
            .await
            .map_err(|e| WorkerError::TransientIO(e.to_string()))?;
        let prefix = dest_prefix.trim_end_matches('/');
        let mut uploaded = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkerError::TransientIO(e.to_string()))?
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            let key = format!("{prefix}/{filename}");
            uploaded.push(UploadedFile {
                original_name: filename,
                s3_key: key.clone(),
                url: format!("https://fixture.example/{key}"),
            });
        }
        Ok(uploaded)
    }
}

#[derive(Default)]
struct FakeNotifier {
    progress_calls: AtomicUsize,
    success_calls: Mutex<Vec<String>>,
    failure_calls: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify_progress(&self, _callback_url: &str, _payload: ProgressPayload<'_>) {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn notify_success(&self, _callback_url: &str, payload: TerminalSuccessPayload<'_>) {
        self.success_calls.lock().unwrap().push(payload.post_id.to_string());
    }

    async fn notify_failure(&self, _callback_url: &str, payload: TerminalFailurePayload<'_>) {
        self.failure_calls.lock().unwrap().push(payload.post_id.to_string());
    }
}

fn test_config(scratch: &Path) -> Config {
    Config {
        worker_concurrency: 1,
        redis_url: "redis://127.0.0.1:6379".to_string(),
        s3_endpoint: "https://fixture.example".to_string(),
        s3_bucket: "fixture".to_string(),
        s3_region: "us-east-1".to_string(),
        s3_access_key: "test".to_string(),
        s3_secret_key: "test".to_string(),
        encoder_binary: locate_mock_encoder(),
        port: 0,
        output_root: scratch.join("output"),
        downloads_root: scratch.join("downloads"),
        callback_timeout: Duration::from_secs(10),
        signed_url_ttl: Duration::from_secs(3600),
        download_timeout: Duration::from_secs(60),
    }
}

fn video_item(media_id: &str, filename: &str, height: u32) -> Item {
    Item::Video {
        common: ItemCommon {
            media_id: media_id.to_string(),
            filename: filename.to_string(),
            original_name: filename.to_string(),
        },
        height,
    }
}

fn image_item(media_id: &str, filename: &str) -> Item {
    Item::Image {
        common: ItemCommon {
            media_id: media_id.to_string(),
            filename: filename.to_string(),
            original_name: filename.to_string(),
        },
    }
}

fn make_job(post_id: &str, media: Vec<Item>, attempt: u32) -> Job {
    Job {
        post_id: post_id.to_string(),
        media,
        s3_key: "posts/p1/".to_string(),
        user_id: "u1".to_string(),
        callback_url: Some("https://caller.example/callback".to_string()),
        attempt,
    }
}

#[tokio::test]
async fn fresh_video_job_completes_with_monotone_progress_and_one_terminal_callback() {
    let _env_guard = env_lock().await;
    let scratch = tempdir().unwrap();
    let fixture_dir = tempdir().unwrap();
    let fixture = fixture_dir.path().join("a.mp4");
    tokio::fs::write(&fixture, b"not really a video").await.unwrap();

    let config = Arc::new(test_config(scratch.path()));
    let store = Arc::new(InMemoryProgressStore::new());
    let blob = Arc::new(FakeBlobClient {
        fixture,
        fail_filenames: Vec::new(),
    });
    let driver = Arc::new(EncoderDriver::new(config.encoder_binary.clone()));
    let notifier = Arc::new(FakeNotifier::default());

    let executor = JobExecutor::new(
        store.clone() as Arc<dyn ProgressStore>,
        blob.clone() as Arc<dyn BlobClient>,
        driver,
        notifier.clone() as Arc<dyn Notifier>,
        config,
    );

    let job = make_job("post-1", vec![video_item("m1", "a.mp4", 720)], 1);
    let outcome = executor.execute(job).await.expect("job attempt should succeed");

    assert_eq!(outcome.total_processed, 1);
    assert_eq!(outcome.status, "success");
    assert_eq!(store.get_max_progress("post-1").await, 100.0);

    // I4: exactly one terminal callback, and it's a success.
    assert_eq!(notifier.success_calls.lock().unwrap().len(), 1);
    assert_eq!(notifier.failure_calls.lock().unwrap().len(), 0);

    // Uploaded artifacts must land under `<s3Key>processed/`, not a key with
    // the slash between them swallowed (spec.md §4.D step 4, §4.B).
    let ItemResult::Video { master_playlist_url, .. } = &outcome.media_results[0] else {
        panic!("expected a video result");
    };
    let url = master_playlist_url.as_deref().expect("master playlist url");
    assert!(
        url.contains("/posts/p1/processed/"),
        "expected upload key under posts/p1/processed/, got {url}"
    );

    // I3: scratch directories are purged on the success path.
    assert!(!scratch.path().join("output").join("post-1").exists());
    assert!(!scratch.path().join("downloads").join("post-1").exists());
}

#[tokio::test]
async fn two_images_complete_and_upload_urls_are_matched_by_filename() {
    let _env_guard = env_lock().await;
    let scratch = tempdir().unwrap();
    let fixture_dir = tempdir().unwrap();
    let fixture = fixture_dir.path().join("img.jpg");
    tokio::fs::write(&fixture, b"not really an image").await.unwrap();

    let config = Arc::new(test_config(scratch.path()));
    let store = Arc::new(InMemoryProgressStore::new());
    let blob = Arc::new(FakeBlobClient {
        fixture,
        fail_filenames: Vec::new(),
    });
    let driver = Arc::new(EncoderDriver::new(config.encoder_binary.clone()));
    let notifier = Arc::new(FakeNotifier::default());

    let executor = JobExecutor::new(
        store.clone() as Arc<dyn ProgressStore>,
        blob as Arc<dyn BlobClient>,
        driver,
        notifier.clone() as Arc<dyn Notifier>,
        config,
    );

    let job = make_job(
        "post-2",
        vec![image_item("m1", "img1.jpg"), image_item("m2", "img2.jpg")],
        1,
    );
    let outcome = executor.execute(job).await.expect("job attempt should succeed");

    assert_eq!(outcome.total_processed, 2);
    assert_eq!(outcome.media_results[0].media_id(), "m1");
    assert_eq!(outcome.media_results[1].media_id(), "m2");
    assert_eq!(notifier.success_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn retry_after_mid_job_crash_skips_completed_item_and_preserves_its_result() {
    let _env_guard = env_lock().await;
    let scratch = tempdir().unwrap();
    let fixture_dir = tempdir().unwrap();
    let fixture = fixture_dir.path().join("a.mp4");
    tokio::fs::write(&fixture, b"not really a video").await.unwrap();

    let config = Arc::new(test_config(scratch.path()));
    let store = Arc::new(InMemoryProgressStore::new());
    let driver = Arc::new(EncoderDriver::new(config.encoder_binary.clone()));

    let job_media = vec![video_item("m0", "a.mp4", 480), video_item("m1", "b.mp4", 480)];

    // First attempt: the second item's download is forced to fail, crashing
    // the job after item[0] has already been marked completed.
    let first_blob = Arc::new(FakeBlobClient {
        fixture: fixture.clone(),
        fail_filenames: vec!["b.mp4".to_string()],
    });
    let first_notifier = Arc::new(FakeNotifier::default());
    let first_executor = JobExecutor::new(
        store.clone() as Arc<dyn ProgressStore>,
        first_blob as Arc<dyn BlobClient>,
        driver.clone(),
        first_notifier.clone() as Arc<dyn Notifier>,
        config.clone(),
    );
    let first_result = first_executor.execute(make_job("post-3", job_media.clone(), 1)).await;
    assert!(first_result.is_err(), "first attempt must fail on item[1]'s forced download error");
    assert_eq!(first_notifier.failure_calls.lock().unwrap().len(), 1);
    assert_eq!(first_notifier.success_calls.lock().unwrap().len(), 0);

    let completed_after_crash = store.get_completed("post-3").await;
    assert_eq!(completed_after_crash, vec!["m0".to_string()]);
    let max_after_crash = store.get_max_progress("post-3").await;
    assert!(max_after_crash > 30.0, "item[0]'s completion must have advanced max_progress");

    // Second attempt: downloads succeed for both items now. item[0] must be
    // skipped (no re-encode) and its cached result reused verbatim (I2).
    let log_path = scratch.path().join("encoder_invocations.log");
    unsafe { std::env::set_var("MOCK_ENCODER_LOG_PATH", &log_path) };
    let second_blob = Arc::new(FakeBlobClient {
        fixture,
        fail_filenames: Vec::new(),
    });
    let second_notifier = Arc::new(FakeNotifier::default());
    let second_executor = JobExecutor::new(
        store.clone() as Arc<dyn ProgressStore>,
        second_blob as Arc<dyn BlobClient>,
        driver,
        second_notifier.clone() as Arc<dyn Notifier>,
        config,
    );
    let outcome = second_executor
        .execute(make_job("post-3", job_media, 2))
        .await
        .expect("second attempt should succeed");
    unsafe { std::env::remove_var("MOCK_ENCODER_LOG_PATH") };

    assert_eq!(outcome.total_processed, 2);
    assert_eq!(outcome.media_results[0].media_id(), "m0");
    assert_eq!(outcome.media_results[1].media_id(), "m1");
    assert_eq!(second_notifier.success_calls.lock().unwrap().len(), 1);

    // I1: max progress never regresses across attempts.
    let final_max = store.get_max_progress("post-3").await;
    assert!(final_max >= max_after_crash);
    assert_eq!(final_max, 100.0);

    // No invocation of the mock encoder should reference m0's input file —
    // it must have been skipped entirely on the second attempt.
    if log_path.exists() {
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(!log.contains("a.mp4"), "item[0] must not be re-encoded on resumption:\n{log}");
    }
}

#[tokio::test]
async fn job_with_no_callback_url_produces_zero_outbound_notifications() {
    let _env_guard = env_lock().await;
    let scratch = tempdir().unwrap();
    let fixture_dir = tempdir().unwrap();
    let fixture = fixture_dir.path().join("img.jpg");
    tokio::fs::write(&fixture, b"not really an image").await.unwrap();

    let config = Arc::new(test_config(scratch.path()));
    let store = Arc::new(InMemoryProgressStore::new());
    let blob = Arc::new(FakeBlobClient {
        fixture,
        fail_filenames: Vec::new(),
    });
    let driver = Arc::new(EncoderDriver::new(config.encoder_binary.clone()));
    let notifier = Arc::new(FakeNotifier::default());

    let executor = JobExecutor::new(
        store as Arc<dyn ProgressStore>,
        blob as Arc<dyn BlobClient>,
        driver,
        notifier.clone() as Arc<dyn Notifier>,
        config,
    );

    let mut job = make_job("post-4", vec![image_item("m1", "img1.jpg")], 1);
    job.callback_url = None;
    let outcome = executor.execute(job).await.expect("job attempt should succeed");

    assert_eq!(outcome.total_processed, 1);
    assert_eq!(notifier.progress_calls.load(Ordering::SeqCst), 0);
    assert_eq!(notifier.success_calls.lock().unwrap().len(), 0);
    assert_eq!(notifier.failure_calls.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn empty_media_array_is_rejected_before_any_state_is_written() {
    let scratch = tempdir().unwrap();
    let config = Arc::new(test_config(scratch.path()));
    let store = Arc::new(InMemoryProgressStore::new());
    let blob = Arc::new(FakeBlobClient {
        fixture: scratch.path().join("unused"),
        fail_filenames: Vec::new(),
    });
    let driver = Arc::new(EncoderDriver::new(config.encoder_binary.clone()));
    let notifier = Arc::new(FakeNotifier::default());

    let executor = JobExecutor::new(
        store.clone() as Arc<dyn ProgressStore>,
        blob as Arc<dyn BlobClient>,
        driver,
        notifier.clone() as Arc<dyn Notifier>,
        config,
    );

    let job = make_job("post-5", Vec::new(), 1);
    let result = executor.execute(job).await;

    assert!(matches!(result, Err(WorkerError::Validation(_))));
    assert_eq!(notifier.failure_calls.lock().unwrap().len(), 0, "validation must fail before the failure path's callback fires");
    assert_eq!(store.get_completed("post-5").await, Vec::<String>::new());
}
