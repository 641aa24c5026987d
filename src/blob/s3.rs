use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::fs;

use super::{BlobClient, UploadedFile};
use crate::config::Config;
use crate::error::WorkerError;

/// S3-compatible (including MinIO-style custom-endpoint) blob client.
pub struct S3BlobClient {
    client: Client,
    http: reqwest::Client,
    bucket: String,
    endpoint: String,
}

impl S3BlobClient {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let credentials = Credentials::new(
            config.s3_access_key.clone(),
            config.s3_secret_key.clone(),
            None,
            None,
            "media-worker",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.s3_region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(config.s3_endpoint.clone())
            .load()
            .await;

        let http = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .build()?;

        Ok(Self {
            client: Client::new(&aws_config),
            http,
            bucket: config.s3_bucket.clone(),
            endpoint: config.s3_endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key)
    }
}

#[async_trait]
impl BlobClient for S3BlobClient {
    async fn signed_read(&self, key: &str, ttl: Duration) -> Result<String, WorkerError> {
        let presign_config = PresigningConfig::expires_in(ttl)
            .map_err(|e| WorkerError::TransientIO(format!("invalid presign ttl: {e}")))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| WorkerError::TransientIO(format!("presign failed for {key}: {e}")))?;

        Ok(presigned.uri().to_string())
    }

    async fn download_to_file(&self, url: &str, local_path: &Path) -> Result<(), WorkerError> {
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkerError::TransientIO(format!("mkdir {parent:?}: {e}")))?;
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| WorkerError::TransientIO(format!("download GET failed: {e}")))?
            .error_for_status()
            .map_err(|e| WorkerError::TransientIO(format!("download returned error status: {e}")))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| WorkerError::TransientIO(format!("reading download body: {e}")))?;

        fs::write(local_path, &bytes)
            .await
            .map_err(|e| WorkerError::TransientIO(format!("write {local_path:?}: {e}")))?;

        Ok(())
    }

    async fn upload_file(&self, local_path: &Path, key: &str) -> Result<String, WorkerError> {
        let data = fs::read(local_path)
            .await
            .map_err(|e| WorkerError::TransientIO(format!("read {local_path:?}: {e}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| WorkerError::TransientIO(format!("put_object {key}: {e}")))?;

        Ok(self.public_url(key))
    }

    async fn upload_directory(
        &self,
        local_dir: &Path,
        dest_prefix: &str,
    ) -> Result<Vec<UploadedFile>, WorkerError> {
        let mut entries = fs::read_dir(local_dir)
            .await
            .map_err(|e| WorkerError::TransientIO(format!("read_dir {local_dir:?}: {e}")))?;

        let prefix = dest_prefix.trim_end_matches('/');
        let mut uploaded = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkerError::TransientIO(format!("read_dir entry: {e}")))?
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            let key = format!("{prefix}/{filename}");
            let url = self.upload_file(&path, &key).await?;
            uploaded.push(UploadedFile {
                original_name: filename,
                s3_key: key,
                url,
            });
        }

        Ok(uploaded)
    }
}
