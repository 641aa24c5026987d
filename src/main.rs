use std::sync::Arc;

use anyhow::Context;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::EnvFilter;

use media_worker::admin;
use media_worker::blob::{BlobClient, S3BlobClient};
use media_worker::config::Config;
use media_worker::encoder::EncoderDriver;
use media_worker::executor::{HttpNotifier, JobExecutor, Notifier};
use media_worker::store::{ProgressStore, RedisProgressStore};
use media_worker::worker::{
    CleanupQueue, CleanupWorker, JobBroker, QueueCounters, RedisCleanupQueue, RedisJobBroker, WorkerHost,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env().context("loading configuration")?);

    let store: Arc<dyn ProgressStore> = Arc::new(
        RedisProgressStore::connect(&config.redis_url)
            .await
            .context("connecting progress store")?,
    );
    let blob: Arc<dyn BlobClient> = Arc::new(
        S3BlobClient::new(&config)
            .await
            .context("configuring blob client")?,
    );
    let driver = Arc::new(EncoderDriver::new(config.encoder_binary.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(config.callback_timeout));

    let executor = Arc::new(JobExecutor::new(
        store,
        blob,
        driver,
        notifier,
        Arc::clone(&config),
    ));

    let worker_id = uuid::Uuid::new_v4().to_string();
    let broker: Arc<dyn JobBroker> = Arc::new(
        RedisJobBroker::connect(&config.redis_url, &worker_id)
            .await
            .context("connecting job broker")?,
    );
    let cleanup_queue: Arc<dyn CleanupQueue> = Arc::new(
        RedisCleanupQueue::connect(&config.redis_url)
            .await
            .context("connecting cleanup queue")?,
    );

    let counters = Arc::new(QueueCounters::default());
    let host = WorkerHost::new(broker, executor, config.worker_concurrency, Arc::clone(&counters));
    let cleanup = CleanupWorker::new(cleanup_queue);

    let admin_task = tokio::spawn(admin::serve(config.port, Arc::clone(&counters), shutdown_signal()));
    let worker_task = tokio::spawn(host.run(shutdown_signal()));
    let cleanup_task = tokio::spawn(cleanup.run(shutdown_signal()));

    let (worker_result, cleanup_result) = tokio::join!(worker_task, cleanup_task);
    worker_result.context("worker host task panicked")?;
    cleanup_result.context("cleanup worker task panicked")?;

    admin_task.abort();

    Ok(())
}

/// Resolves on SIGTERM or SIGINT/Ctrl-C — the two signals a worker host
/// needs to start a graceful drain (spec.md §4.G).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl_c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
