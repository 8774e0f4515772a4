//! Batch configuration
//!
//! Loaded from environment variables (a `.env` file is honoured by the binary),
//! then validated before any step runs.

use crate::framework::types::StepPolicy;
use cbp_common::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_CHUNK_SIZE: usize = 2000;
pub const DEFAULT_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_START_LIMIT: u32 = 5;
pub const DEFAULT_SKIP_LIMIT: u32 = 0;
pub const DEFAULT_ENCRYPTION_SECRET_KEY: &str = "MySecretKey12345";
pub const DEFAULT_DATABASE_PATH: &str = "customers.db";
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

/// Settings for the customer import job
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchConfig {
    /// Records per chunk (commit interval)
    pub chunk_size: usize,
    /// Write attempts per chunk, including the first
    pub retry_limit: u32,
    /// Starts allowed per step and source before a success
    pub start_limit: u32,
    /// Unreadable lines tolerated per step
    pub skip_limit: u32,
    /// Passphrase for field encryption
    pub encryption_secret_key: String,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Warn when an email is already stored
    pub duplicate_email_check: bool,
    /// Records between progress log lines
    pub progress_interval: u64,
}

impl std::fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchConfig")
            .field("chunk_size", &self.chunk_size)
            .field("retry_limit", &self.retry_limit)
            .field("start_limit", &self.start_limit)
            .field("skip_limit", &self.skip_limit)
            .field("encryption_secret_key", &"<redacted>")
            .field("database_path", &self.database_path)
            .field("duplicate_email_check", &self.duplicate_email_check)
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_limit: DEFAULT_RETRY_LIMIT,
            start_limit: DEFAULT_START_LIMIT,
            skip_limit: DEFAULT_SKIP_LIMIT,
            encryption_secret_key: DEFAULT_ENCRYPTION_SECRET_KEY.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            duplicate_email_check: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl BatchConfig {
    /// Load configuration from `CBP_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            chunk_size: parse_var(&lookup, "CBP_CHUNK_SIZE", defaults.chunk_size)?,
            retry_limit: parse_var(&lookup, "CBP_RETRY_LIMIT", defaults.retry_limit)?,
            start_limit: parse_var(&lookup, "CBP_START_LIMIT", defaults.start_limit)?,
            skip_limit: parse_var(&lookup, "CBP_SKIP_LIMIT", defaults.skip_limit)?,
            encryption_secret_key: lookup("CBP_ENCRYPTION_SECRET_KEY")
                .unwrap_or(defaults.encryption_secret_key),
            database_path: lookup("CBP_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            duplicate_email_check: parse_var(
                &lookup,
                "CBP_DUPLICATE_EMAIL_CHECK",
                defaults.duplicate_email_check,
            )?,
            progress_interval: parse_var(
                &lookup,
                "CBP_PROGRESS_INTERVAL",
                defaults.progress_interval,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(CommonError::config("chunk_size must be greater than 0"));
        }
        if self.retry_limit == 0 {
            return Err(CommonError::config("retry_limit must be greater than 0"));
        }
        if self.start_limit == 0 {
            return Err(CommonError::config("start_limit must be greater than 0"));
        }
        if self.progress_interval == 0 {
            return Err(CommonError::config(
                "progress_interval must be greater than 0",
            ));
        }
        if self.encryption_secret_key.is_empty() {
            return Err(CommonError::config("encryption_secret_key cannot be empty"));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(CommonError::config("database_path cannot be empty"));
        }
        Ok(())
    }

    /// Limits for the chunk steps
    pub fn step_policy(&self) -> StepPolicy {
        StepPolicy {
            chunk_size: self.chunk_size,
            retry_limit: self.retry_limit,
            skip_limit: self.skip_limit,
            start_limit: self.start_limit,
            progress_interval: self.progress_interval,
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            CommonError::config(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}
