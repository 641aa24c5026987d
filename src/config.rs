//! Environment-sourced configuration (spec.md §6 "Environment").
//!
//! Loaded once at startup; a missing or malformed required value fails fast
//! before the worker host starts accepting jobs, rather than surfacing as a
//! mysterious per-job `StoreUnavailable`/`TransientIO` later.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub worker_concurrency: usize,
    pub redis_url: String,
    pub s3_endpoint: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub encoder_binary: PathBuf,
    pub port: u16,
    pub output_root: PathBuf,
    pub downloads_root: PathBuf,
    pub callback_timeout: Duration,
    pub signed_url_ttl: Duration,
    pub download_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if dotenvy::dotenv().is_ok() {
            tracing::debug!("loaded .env file for local configuration");
        }

        let worker_concurrency = parse_env_or("WORKER_CONCURRENCY", 4usize)
            .context("WORKER_CONCURRENCY must be a positive integer")?;
        if worker_concurrency == 0 {
            anyhow::bail!("WORKER_CONCURRENCY must be a positive integer");
        }

        let scratch_base = std::env::temp_dir().join("media-worker");

        let config = Config {
            worker_concurrency,
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1:6379"),
            s3_endpoint: require_env("S3_ENDPOINT")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_region: env_or("S3_REGION", "us-east-1"),
            s3_access_key: require_env("S3_ACCESS_KEY")?,
            s3_secret_key: require_env("S3_SECRET_KEY")?,
            encoder_binary: PathBuf::from(env_or("FFMPEG_BIN", "ffmpeg")),
            port: parse_env_or("PORT", 8080u16).context("PORT must be a valid port number")?,
            output_root: PathBuf::from(env_or(
                "OUTPUT_ROOT",
                scratch_base.join("output").to_string_lossy().as_ref(),
            )),
            downloads_root: PathBuf::from(env_or(
                "DOWNLOADS_ROOT",
                scratch_base.join("downloads").to_string_lossy().as_ref(),
            )),
            callback_timeout: Duration::from_secs(10),
            signed_url_ttl: Duration::from_secs(3600),
            download_timeout: Duration::from_secs(60),
        };

        Ok(config)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}
