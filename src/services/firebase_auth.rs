// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Authentication REST client.
//!
//! Handles:
//! - Email/password sign-up and sign-in
//! - Password-reset emails
//! - Refresh-token exchange (session restore and token refresh)
//! - Account deletion (sign-up rollback)
//! - Error-code and rate-limit classification

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Identity, IdentityState};
use crate::services::identity::{IdentityProvider, IdentitySubscription};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;
/// Longer lifetimes than a day are treated as malformed
const MAX_EXPIRES_IN_SECS: i64 = 86_400;

/// Firebase Auth client that also acts as the app's identity provider.
pub struct FirebaseAuthClient {
    http: reqwest::Client,
    identity_url: String,
    token_url: String,
    api_key: String,
    state: watch::Sender<IdentityState>,
}

impl FirebaseAuthClient {
    /// Create a client from configuration.
    ///
    /// When `FIREBASE_AUTH_EMULATOR_HOST` is configured, requests go to the
    /// local emulator instead of Google.
    pub fn new(config: &Config) -> Result<Self> {
        let (identity_url, token_url) = match &config.auth_emulator_host {
            Some(host) => {
                tracing::info!(host = %host, "Using Firebase Auth emulator");
                (
                    format!("http://{}/identitytoolkit.googleapis.com/v1", host),
                    format!("http://{}/securetoken.googleapis.com/v1", host),
                )
            }
            None => (
                IDENTITY_TOOLKIT_URL.to_string(),
                SECURE_TOKEN_URL.to_string(),
            ),
        };

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;

        let (state, _) = watch::channel(IdentityState::Unresolved);

        Ok(Self {
            http,
            identity_url,
            token_url,
            api_key: config.firebase_api_key.clone(),
            state,
        })
    }

    /// Resolve the initial identity state from a persisted refresh token.
    ///
    /// Without a token the user is signed out. A token the provider rejects
    /// also resolves to signed out, and the error is returned so the caller
    /// can discard the stale token.
    pub async fn restore(&self, refresh_token: Option<&str>) -> Result<Option<Identity>> {
        let Some(refresh_token) = refresh_token else {
            self.state.send_replace(IdentityState::SignedOut);
            return Ok(None);
        };

        match self.exchange_refresh_token(refresh_token).await {
            Ok(identity) => {
                tracing::info!(uid = %identity.uid, "Restored persisted session");
                self.state
                    .send_replace(IdentityState::SignedIn(identity.clone()));
                Ok(Some(identity))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not restore persisted session");
                self.state.send_replace(IdentityState::SignedOut);
                Err(e)
            }
        }
    }

    /// Exchange the current refresh token for a fresh ID token.
    ///
    /// Re-publishes the same uid, so subscribers see a token refresh rather
    /// than an identity change.
    pub async fn refresh_session(&self) -> Result<Identity> {
        let current = self
            .state
            .borrow()
            .identity()
            .cloned()
            .ok_or(AppError::Unauthorized)?;

        let identity = self.exchange_refresh_token(current.refresh_token()).await?;
        self.state
            .send_replace(IdentityState::SignedIn(identity.clone()));
        tracing::debug!(uid = %identity.uid, "ID token refreshed");
        Ok(identity)
    }

    // ─── REST Calls ──────────────────────────────────────────────

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<Identity> {
        let url = format!("{}/token?key={}", self.token_url, self.api_key);

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let token: TokenResponse = check_response_json(response).await?;
        let email = self.lookup_email(&token.id_token).await?;

        Ok(Identity::new(
            token.user_id,
            email,
            token.id_token,
            token.refresh_token,
            expiry_from(&token.expires_in),
        ))
    }

    async fn lookup_email(&self, id_token: &str) -> Result<Option<String>> {
        let lookup: LookupResponse = self
            .post_accounts("lookup", &IdTokenRequest { id_token })
            .await?;
        Ok(lookup.users.into_iter().next().and_then(|u| u.email))
    }

    /// POST to an `accounts:<method>` endpoint and parse the JSON reply.
    async fn post_accounts<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/accounts:{}?key={}", self.identity_url, method, self.api_key);

        let response = self.http.post(&url).json(body).send().await?;
        check_response_json(response).await
    }

    fn sign_in(&self, auth: AuthResponse) -> Identity {
        let identity = Identity::new(
            auth.local_id,
            auth.email,
            auth.id_token,
            auth.refresh_token,
            expiry_from(&auth.expires_in),
        );
        self.state
            .send_replace(IdentityState::SignedIn(identity.clone()));
        identity
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuthClient {
    async fn create_identity(&self, email: &str, password: &str) -> Result<Identity> {
        let auth: AuthResponse = self
            .post_accounts(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(self.sign_in(auth))
    }

    async fn verify_identity(&self, email: &str, password: &str) -> Result<Identity> {
        let auth: AuthResponse = self
            .post_accounts(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(self.sign_in(auth))
    }

    async fn end_session(&self) -> Result<()> {
        // The REST API has no sign-out call; dropping the tokens is the
        // sign-out.
        self.state.send_replace(IdentityState::SignedOut);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post_accounts(
                "sendOobCode",
                &OobCodeRequest {
                    request_type: "PASSWORD_RESET",
                    email,
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_identity(&self, identity: &Identity) -> Result<()> {
        let _: serde_json::Value = self
            .post_accounts(
                "delete",
                &IdTokenRequest {
                    id_token: identity.id_token(),
                },
            )
            .await?;

        let signed_in_as_deleted = self
            .state
            .borrow()
            .identity()
            .is_some_and(|current| current.uid == identity.uid);
        if signed_in_as_deleted {
            self.state.send_replace(IdentityState::SignedOut);
        }
        Ok(())
    }

    fn subscribe(&self) -> IdentitySubscription {
        IdentitySubscription::new(self.state.subscribe())
    }
}

// ─── Wire Types ──────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdTokenRequest<'a> {
    id_token: &'a str,
}

/// Response from `accounts:signUp` and `accounts:signInWithPassword`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    id_token: String,
    #[serde(default)]
    email: Option<String>,
    refresh_token: String,
    #[serde(default)]
    expires_in: String,
    local_id: String,
}

/// Response from the secure-token endpoint (snake_case on the wire).
#[derive(Deserialize)]
struct TokenResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: String,
    user_id: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
struct LookupUser {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn expiry_from(expires_in: &str) -> chrono::DateTime<Utc> {
    let secs = expires_in
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| (0..=MAX_EXPIRES_IN_SECS).contains(secs))
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Utc::now() + Duration::seconds(secs)
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("JSON parse error: {}", e)));
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_error(status.as_u16(), &body))
}

/// Map a failed Firebase Auth response to an error kind.
fn classify_error(status: u16, body: &str) -> AppError {
    if status == 429 {
        tracing::warn!("Firebase Auth rate limit hit (429)");
        return AppError::RateLimited;
    }

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return AppError::from_provider_code(&envelope.error.message);
    }

    if status >= 500 {
        return AppError::Network(format!("HTTP {}", status));
    }

    AppError::Provider(format!("HTTP {}: {}", status, body))
}
