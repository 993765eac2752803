// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process identity provider for offline use and tests.
//!
//! Failures use the same provider codes as Firebase Auth, so they go through
//! the same classification as the real client.

use crate::error::{AppError, Result};
use crate::models::{Identity, IdentityState};
use crate::services::identity::{IdentityProvider, IdentitySubscription};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

/// Minimum password length the provider itself enforces.
const PROVIDER_MIN_PASSWORD_LEN: usize = 6;

/// Number of calls made against each provider operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCalls {
    pub creates: usize,
    pub verifies: usize,
    pub ends: usize,
    pub resets: usize,
    pub deletes: usize,
}

struct Account {
    uid: String,
    password: String,
}

/// Identity provider holding accounts in memory.
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    state: watch::Sender<IdentityState>,
    sent_resets: Mutex<Vec<String>>,
    creates: AtomicUsize,
    verifies: AtomicUsize,
    ends: AtomicUsize,
    resets: AtomicUsize,
    deletes: AtomicUsize,
    fail_end_session: AtomicBool,
    fail_delete: AtomicBool,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityProvider {
    /// A provider that has already resolved to "signed out".
    pub fn new() -> Self {
        Self::with_state(IdentityState::SignedOut)
    }

    /// A provider still restoring its session; call [`Self::resolve`].
    pub fn unresolved() -> Self {
        Self::with_state(IdentityState::Unresolved)
    }

    fn with_state(initial: IdentityState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            accounts: Mutex::new(HashMap::new()),
            state,
            sent_resets: Mutex::new(Vec::new()),
            creates: AtomicUsize::new(0),
            verifies: AtomicUsize::new(0),
            ends: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_end_session: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    /// Publish a new identity state, as the provider would on its own.
    pub fn resolve(&self, state: IdentityState) {
        self.state.send_replace(state);
    }

    /// Register an account without signing it in.
    pub fn add_account(&self, email: &str, password: &str) -> String {
        let uid = uuid::Uuid::new_v4().simple().to_string();
        self.lock_accounts().insert(
            normalize(email),
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        uid
    }

    pub fn has_account(&self, email: &str) -> bool {
        self.lock_accounts().contains_key(&normalize(email))
    }

    /// Emails a reset link was actually sent to.
    pub fn sent_resets(&self) -> Vec<String> {
        self.sent_resets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_fail_end_session(&self, fail: bool) {
        self.fail_end_session.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> ProviderCalls {
        ProviderCalls {
            creates: self.creates.load(Ordering::SeqCst),
            verifies: self.verifies.load(Ordering::SeqCst),
            ends: self.ends.load(Ordering::SeqCst),
            resets: self.resets.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    fn lock_accounts(&self) -> std::sync::MutexGuard<'_, HashMap<String, Account>> {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sign_in(&self, uid: String, email: &str) -> Identity {
        let identity = Identity::new(
            uid.clone(),
            Some(normalize(email)),
            format!("memory-id-token-{}", uuid::Uuid::new_v4().simple()),
            format!("memory-refresh-token-{}", uid),
            Utc::now() + Duration::hours(1),
        );
        self.state
            .send_replace(IdentityState::SignedIn(identity.clone()));
        identity
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn create_identity(&self, email: &str, password: &str) -> Result<Identity> {
        self.creates.fetch_add(1, Ordering::SeqCst);

        if password.chars().count() < PROVIDER_MIN_PASSWORD_LEN {
            return Err(AppError::from_provider_code(
                "WEAK_PASSWORD : Password should be at least 6 characters",
            ));
        }
        if self.has_account(email) {
            return Err(AppError::from_provider_code("EMAIL_EXISTS"));
        }

        let uid = self.add_account(email, password);
        Ok(self.sign_in(uid, email))
    }

    async fn verify_identity(&self, email: &str, password: &str) -> Result<Identity> {
        self.verifies.fetch_add(1, Ordering::SeqCst);

        let uid = {
            let accounts = self.lock_accounts();
            let account = accounts
                .get(&normalize(email))
                .ok_or_else(|| AppError::from_provider_code("EMAIL_NOT_FOUND"))?;
            if account.password != password {
                return Err(AppError::from_provider_code("INVALID_PASSWORD"));
            }
            account.uid.clone()
        };

        Ok(self.sign_in(uid, email))
    }

    async fn end_session(&self) -> Result<()> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        if self.fail_end_session.load(Ordering::SeqCst) {
            return Err(AppError::from_provider_code("NETWORK_REQUEST_FAILED"));
        }
        self.state.send_replace(IdentityState::SignedOut);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        if !self.has_account(email) {
            return Err(AppError::from_provider_code("EMAIL_NOT_FOUND"));
        }
        self.sent_resets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(normalize(email));
        Ok(())
    }

    async fn delete_identity(&self, identity: &Identity) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppError::from_provider_code("NETWORK_REQUEST_FAILED"));
        }

        self.lock_accounts()
            .retain(|_, account| account.uid != identity.uid);

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
