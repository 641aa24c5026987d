//! Outbound HTTP callback (spec.md §4.F, §6). The executor is the only
//! component that talks to the caller; spec.md §9 replaces the source's
//! cyclical executor/poster dependency with this injected `Notifier`.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::domain::ItemResult;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload<'a> {
    pub post_id: &'a str,
    pub progress: f64,
    pub message: &'a str,
    pub attempt: u32,
    pub status: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub current_media: usize,
    pub total_media: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalSuccessPayload<'a> {
    pub post_id: &'a str,
    pub media_results: &'a [ItemResult],
    pub total_processed: usize,
    pub attempt: u32,
    pub status: &'static str,
    pub progress: u8,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalFailurePayload<'a> {
    pub post_id: &'a str,
    pub error: &'a str,
    pub attempt: u32,
    pub status: &'static str,
    pub progress: f64,
    pub message: &'a str,
}

/// Notification sink for the job executor. A failing send is logged and
/// swallowed — the terminal state has already been decided before the
/// notifier is invoked, so a dead callback endpoint cannot fail the job
/// (spec.md §6).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_progress(&self, callback_url: &str, payload: ProgressPayload<'_>);
    async fn notify_success(&self, callback_url: &str, payload: TerminalSuccessPayload<'_>);
    async fn notify_failure(&self, callback_url: &str, payload: TerminalFailurePayload<'_>);
}

pub struct HttpNotifier {
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("MediaQueue/1.0")
            .build()
            .expect("reqwest client configuration is valid");
        Self { client }
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) {
        let result = self.client.post(url).json(body).send().await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(url, status = %response.status(), "callback endpoint returned non-success status");
            }
            Err(err) => {
                warn!(url, error = %err, "callback POST failed");
            }
            Ok(_) => {}
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify_progress(&self, callback_url: &str, payload: ProgressPayload<'_>) {
        self.post(callback_url, &payload).await;
    }

    async fn notify_success(&self, callback_url: &str, payload: TerminalSuccessPayload<'_>) {
        self.post(callback_url, &payload).await;
    }

    async fn notify_failure(&self, callback_url: &str, payload: TerminalFailurePayload<'_>) {
        self.post(callback_url, &payload).await;
    }
}
