// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Object storage for profile images.
//!
//! Uploads report progress on a watch channel as the body is streamed and
//! resolve to a durable download URL.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::Identity;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

const FIREBASE_STORAGE_URL: &str = "https://firebasestorage.googleapis.com/v0";
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Bytes sent so far for one upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.bytes_transferred as f64 * 100.0 / self.total_bytes as f64
    }
}

/// An image selected in the profile editor.
#[derive(Clone)]
pub struct ProfileImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl ProfileImage {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    /// Reject non-images, empty files and files over 5 MiB.
    pub fn validate(&self) -> Result<()> {
        if !self.content_type.starts_with("image/") {
            return Err(AppError::InvalidInput(
                "Profile picture must be an image".to_string(),
            ));
        }
        if self.bytes.is_empty() {
            return Err(AppError::InvalidInput("Image file is empty".to_string()));
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(AppError::InvalidInput(
                "Image must be smaller than 5 MB".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProfileImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileImage")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Durable blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `image` to `path` on behalf of `identity`; returns its URL.
    async fn upload(
        &self,
        identity: &Identity,
        path: &str,
        image: ProfileImage,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> Result<String>;
}

/// Storage path for a member's profile image.
pub fn profile_image_path(uid: &str) -> String {
    format!("profileImages/{}", uid)
}

/// Split `bytes` into a body stream that reports progress as it is consumed.
fn progress_stream(
    bytes: Vec<u8>,
    progress: Option<watch::Sender<UploadProgress>>,
) -> impl futures_util::Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> + Send + Sync + 'static
{
    let total_bytes = bytes.len() as u64;
    let chunks: Vec<Vec<u8>> = bytes
        .chunks(UPLOAD_CHUNK_SIZE)
        .map(|c| c.to_vec())
        .collect();
    let mut sent = 0u64;

    futures_util::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        if let Some(tx) = &progress {
            tx.send_replace(UploadProgress {
                bytes_transferred: sent,
                total_bytes,
            });
        }
        Ok(chunk)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Firebase Storage
// ─────────────────────────────────────────────────────────────────────────────

/// Firebase Storage REST client.
#[derive(Clone)]
pub struct FirebaseStorage {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

impl FirebaseStorage {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: FIREBASE_STORAGE_URL.to_string(),
            bucket: config.storage_bucket.clone(),
        })
    }

    /// Public download URL for an uploaded object.
    fn download_url(&self, name: &str, token: Option<&str>) -> String {
        let mut url = format!(
            "{}/b/{}/o/{}?alt=media",
            self.base_url,
            self.bucket,
            urlencoding::encode(name)
        );
        if let Some(token) = token {
            url.push_str("&token=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }
}

#[async_trait]
impl ObjectStore for FirebaseStorage {
    async fn upload(
        &self,
        identity: &Identity,
        path: &str,
        image: ProfileImage,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> Result<String> {
        let url = format!(
            "{}/b/{}/o?uploadType=media&name={}",
            self.base_url,
            self.bucket,
            urlencoding::encode(path)
        );
        let total = image.bytes.len();

        let response = self
            .http
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Firebase {}", identity.id_token()),
            )
            .header(reqwest::header::CONTENT_TYPE, image.content_type.as_str())
            .header(reqwest::header::CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(progress_stream(
                image.bytes,
                progress,
            )))
            .send()
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Provider(msg) => AppError::Storage(msg),
                other => other,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(AppError::RateLimited);
            }
            return Err(AppError::Storage(format!("HTTP {}: {}", status, body)));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::Storage(format!("JSON parse error: {}", e)))?;

        tracing::info!(path = %uploaded.name, bytes = total, "Profile image uploaded");
        Ok(self.download_url(&uploaded.name, uploaded.download_tokens.as_deref()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Object store keeping uploads in memory.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, ProfileImage>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<ProfileImage> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        _identity: &Identity,
        path: &str,
        image: ProfileImage,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> Result<String> {
        let content_type = image.content_type.clone();
        let mut stream = Box::pin(progress_stream(image.bytes, progress));
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend(chunk.map_err(|e| AppError::Storage(e.to_string()))?);
        }

        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), ProfileImage::new(bytes, content_type));

        Ok(format!("https://storage.memory.local/{}", path))
    }
}
