use std::str::FromStr;

use anyhow::{Context, Result};

use crate::normalizer::retry::BackoffStrategy;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Attempts per normalization, including the first model call.
    pub normalize_max_attempts: u32,
    /// `exponential` (default), `fixed` or `none`.
    pub normalize_backoff: BackoffStrategy,
    pub normalize_backoff_ms: u64,
    pub normalize_max_elapsed_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            normalize_max_attempts: parse_env("NORMALIZE_MAX_ATTEMPTS", 3)?,
            normalize_backoff: parse_env("NORMALIZE_BACKOFF", BackoffStrategy::Exponential)?,
            normalize_backoff_ms: parse_env("NORMALIZE_BACKOFF_MS", 500)?,
            normalize_max_elapsed_secs: parse_env("NORMALIZE_MAX_ELAPSED_SECS", 90)?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
