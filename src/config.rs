// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use crate::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Firebase web API key (public, identifies the project to the REST APIs)
    pub firebase_api_key: String,
    /// Firebase / GCP project ID
    pub firebase_project_id: String,
    /// Storage bucket for profile images
    pub storage_bucket: String,
    /// Auth emulator host (`localhost:9099`), if running against the emulator
    pub auth_emulator_host: Option<String>,
    /// Per-request timeout for REST calls
    pub http_timeout: Duration,
    /// Retry policy for idempotent backend calls
    pub retry: RetryPolicy,
    /// Where the CLI persists the refresh token between runs
    pub session_file: PathBuf,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            firebase_api_key: "test_api_key".to_string(),
            firebase_project_id: "test-project".to_string(),
            storage_bucket: "test-project.appspot.com".to_string(),
            auth_emulator_host: None,
            http_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            session_file: PathBuf::from(".frost-session.json"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let firebase_project_id = env::var("FIREBASE_PROJECT_ID")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("FIREBASE_PROJECT_ID"))?;

        let storage_bucket = env::var("FIREBASE_STORAGE_BUCKET")
            .unwrap_or_else(|_| format!("{}.appspot.com", firebase_project_id));

        let retry = RetryPolicy {
            max_attempts: parse_var("RETRY_MAX_ATTEMPTS", 3)?,
            initial_backoff: Duration::from_millis(parse_var("RETRY_INITIAL_BACKOFF_MS", 200)?),
            max_backoff: Duration::from_millis(parse_var("RETRY_MAX_BACKOFF_MS", 2000)?),
        };

        Ok(Self {
            firebase_api_key: env::var("FIREBASE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("FIREBASE_API_KEY"))?,
            firebase_project_id,
            storage_bucket,
            auth_emulator_host: env::var("FIREBASE_AUTH_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            http_timeout: Duration::from_secs(parse_var("HTTP_TIMEOUT_SECS", 30)?),
            retry,
            session_file: env::var("FROST_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".frost-session.json")),
        })
    }
}

/// Read a numeric variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
