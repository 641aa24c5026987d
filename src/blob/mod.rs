//! Blob Client (spec.md §4.B): signed-URL issuance, streamed download,
//! single-file upload, and directory-sweep upload.
//!
//! The client performs no retries of its own; retry policy is a job-attempt
//! concern owned by the executor and, beyond that, the broker.

mod s3;

use std::path::Path;

use async_trait::async_trait;

pub use s3::S3BlobClient;

use crate::error::WorkerError;

/// One uploaded file, as reported by [`BlobClient::upload_directory`].
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub original_name: String,
    pub s3_key: String,
    pub url: String,
}

#[async_trait]
pub trait BlobClient: Send + Sync {
    /// A time-limited read URL for `key`, valid for `ttl`.
    async fn signed_read(&self, key: &str, ttl: std::time::Duration) -> Result<String, WorkerError>;

    /// Streams the body at `url` (a previously-issued [`Self::signed_read`]
    /// URL) to `local_path`, creating parent directories as needed
    /// (spec.md §4.B: download goes over the signed URL, not a direct SDK
    /// call, so the worker never needs bucket credentials on the read
    /// path).
    async fn download_to_file(&self, url: &str, local_path: &Path) -> Result<(), WorkerError>;

    /// PUTs `local_path` at `key`; returns the canonical `<endpoint>/<key>`
    /// URL (spec.md §9: never the bucket-doubled `<endpoint>/<bucket>/<key>`
    /// shape the source used inconsistently).
    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<String, WorkerError>;

    /// Uploads every immediate child of `local_dir` under `<dest_prefix>/<filename>`.
    async fn upload_directory(
        &self,
        local_dir: &Path,
        dest_prefix: &str,
    ) -> Result<Vec<UploadedFile>, WorkerError>;
}
