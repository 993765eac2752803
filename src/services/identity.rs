// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider contract.
//!
//! The provider owns credential checks and the notion of a signed-in user.
//! Changes are published on a watch channel; holders of an
//! [`IdentitySubscription`] always see the latest state, and dropping the
//! subscription unsubscribes.

use crate::error::Result;
use crate::models::{Identity, IdentityState};
use async_trait::async_trait;
use tokio::sync::watch;

/// External authentication service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Register a new account and sign it in.
    async fn create_identity(&self, email: &str, password: &str) -> Result<Identity>;

    /// Check credentials and sign the account in.
    async fn verify_identity(&self, email: &str, password: &str) -> Result<Identity>;

    /// Sign the current user out. Succeeds when nobody is signed in.
    async fn end_session(&self) -> Result<()>;

    /// Ask the provider to email a password-reset link.
    async fn request_password_reset(&self, email: &str) -> Result<()>;

    /// Delete an account (used to undo a half-finished sign-up).
    async fn delete_identity(&self, identity: &Identity) -> Result<()>;

    /// Subscribe to identity changes (sign-in, sign-out, token refresh).
    fn subscribe(&self) -> IdentitySubscription;
}

/// Cancellable view of the provider's identity state.
pub struct IdentitySubscription {
    rx: watch::Receiver<IdentityState>,
}

impl IdentitySubscription {
    pub fn new(rx: watch::Receiver<IdentityState>) -> Self {
        Self { rx }
    }

    /// Latest state, marking it seen.
    pub fn current(&mut self) -> IdentityState {
        self.rx.borrow_and_update().clone()
    }

    /// Wait until the state changes. `false` once the provider is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait for the next change. `None` once the provider is gone.
    pub async fn next(&mut self) -> Option<IdentityState> {
        if !self.changed().await {
            return None;
        }
        Some(self.current())
    }
}
