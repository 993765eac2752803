// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session coordinator.
//!
//! Owns the process-wide [`Session`] and is the only thing that mutates it.
//! Two sources feed it: results of explicit operations (sign-up, log-in,
//! log-out, profile edits) and identity changes published by the provider.
//! Consumers get read-only snapshots through [`SessionCoordinator::subscribe`].
//!
//! Profile fetches run in the background. Each one is tagged with the uid it
//! was issued for and a fetch epoch; a result is applied only if both still
//! match when it arrives, so a slow fetch for a previous identity can never
//! repopulate the profile after log-out or a switch of account.

use crate::db::DocumentStore;
use crate::error::{AppError, Result};
use crate::models::{
    Identity, IdentityState, Profile, ProfileUpdate, Session, SessionPhase, SignUpRequest,
};
use crate::retry::{with_retry, RetryPolicy};
use crate::services::identity::{IdentityProvider, IdentitySubscription};
use crate::services::storage::{profile_image_path, ObjectStore, ProfileImage, UploadProgress};
use crate::services::team::TeamService;
use crate::time_utils::format_utc_rfc3339;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use validator::{Validate, ValidateEmail};

/// Shared context handed to every consumer of authentication state.
///
/// Create one per process with [`SessionCoordinator::start`]; dropping it (or
/// calling [`SessionCoordinator::shutdown`]) unsubscribes from the provider.
pub struct SessionCoordinator {
    inner: Arc<Inner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    objects: Option<Arc<dyn ObjectStore>>,
    retry: RetryPolicy,
    session: watch::Sender<Session>,
    /// Bumped whenever an in-flight profile fetch must be ignored
    epoch: AtomicU64,
    /// Serializes "read provider state, apply it" against explicit results
    apply_lock: Mutex<()>,
}

/// When applying an identity should start a profile fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refetch {
    /// Only when the uid differs from the current one
    OnUidChange,
    /// Unless a fetch for the same uid is already in flight
    UnlessPending,
    /// Always, superseding any fetch in flight
    Always,
}

impl SessionCoordinator {
    /// Build the coordinator and start listening for identity changes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        objects: Option<Arc<dyn ObjectStore>>,
        retry: RetryPolicy,
    ) -> Self {
        let (session, _) = watch::channel(Session::default());
        let inner = Arc::new(Inner {
            identity,
            store,
            objects,
            retry,
            session,
            epoch: AtomicU64::new(0),
            apply_lock: Mutex::new(()),
        });

        let mut subscription = inner.identity.subscribe();
        inner.sync_with_provider(&mut subscription);

        let task_inner = Arc::clone(&inner);
        let listener = tokio::spawn(async move {
            while subscription.changed().await {
                task_inner.sync_with_provider(&mut subscription);
            }
            tracing::debug!("Identity provider closed its subscription");
        });

        Self {
            inner,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Stop listening for identity changes. Session state is left as is.
    pub fn shutdown(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!("Session coordinator stopped");
        }
    }

    /// Read-only view of the session; notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.session.borrow().phase()
    }

    /// Wait until the provider has first reported identity state.
    pub async fn wait_until_ready(&self) -> Session {
        self.wait_for(|s| !s.is_loading).await
    }

    /// Wait until the session is resolved and no profile fetch is pending.
    pub async fn wait_for_profile(&self) -> Session {
        self.wait_for(|s| !s.is_loading && !s.profile_pending).await
    }

    async fn wait_for(&self, done: impl FnMut(&Session) -> bool) -> Session {
        let mut rx = self.subscribe();
        let session = match rx.wait_for(done).await {
            Ok(session) => session.clone(),
            Err(_) => self.session(),
        };
        session
    }

    /// Schedule and chat access bound to this session.
    pub fn team(&self) -> TeamService {
        TeamService::new(Arc::clone(&self.inner.store), self.subscribe())
    }

    /// Register a new member: identity first, then their profile document.
    ///
    /// If the profile cannot be written the new identity is deleted again and
    /// `PartialSignup` is returned.
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<Identity> {
        self.ensure_ready()?;
        let result = self.inner.sign_up(request).await;
        self.inner.record(result)
    }

    pub async fn log_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.ensure_ready()?;
        let result = self.inner.log_in(email, password).await;
        self.inner.record(result)
    }

    /// End the session. A no-op when nobody is signed in.
    ///
    /// The local session is cleared even if the provider call fails; the
    /// failure is still returned.
    pub async fn log_out(&self) -> Result<()> {
        self.ensure_ready()?;
        let result = self.inner.log_out().await;
        self.inner.record(result)
    }

    /// Ask for a reset link. Succeeds identically whether or not an account
    /// exists for `email`.
    pub async fn reset_password(&self, email: &str) -> Result<()> {
        self.inner.reset_password(email).await
    }

    /// Stored profile for `uid`, or `None` when there is none.
    pub async fn fetch_profile(&self, uid: &str) -> Result<Option<Profile>> {
        self.inner.fetch_profile(uid).await
    }

    /// Write `update` to the caller's own profile and reload it from the store.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        self.ensure_ready()?;
        let result = match self.current_identity() {
            Some(identity) => self.inner.update_profile(&identity.uid, update).await,
            None => Err(AppError::Unauthorized),
        };
        self.inner.record(result)
    }

    /// Upload a new profile picture and store its URL on the profile.
    pub async fn upload_profile_image(
        &self,
        image: ProfileImage,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> Result<Profile> {
        self.ensure_ready()?;
        let result = match self.current_identity() {
            Some(identity) => {
                self.inner
                    .upload_profile_image(&identity, image, progress)
                    .await
            }
            None => Err(AppError::Unauthorized),
        };
        self.inner.record(result)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.inner.session.borrow().is_loading {
            return Err(AppError::Initializing);
        }
        Ok(())
    }

    fn current_identity(&self) -> Option<Identity> {
        self.inner.session.borrow().identity.clone()
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    // ─────────────────────────────────────────────────────────────────────
    // Session state transitions
    // ─────────────────────────────────────────────────────────────────────

    fn sync_with_provider(self: &Arc<Self>, subscription: &mut IdentitySubscription) {
        let _guard = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());
        match subscription.current() {
            IdentityState::Unresolved => {}
            IdentityState::SignedOut => self.apply_identity_locked(None, Refetch::OnUidChange),
            IdentityState::SignedIn(identity) => {
                self.apply_identity_locked(Some(identity), Refetch::OnUidChange)
            }
        }
    }

    fn apply_identity(self: &Arc<Self>, identity: Option<Identity>, refetch: Refetch) {
        let _guard = self.apply_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.apply_identity_locked(identity, refetch);
    }

    /// Make `identity` current, starting a profile fetch as `refetch` asks.
    fn apply_identity_locked(self: &Arc<Self>, identity: Option<Identity>, refetch: Refetch) {
        let mut fetch = None;

        self.session.send_modify(|session| {
            if session.is_loading {
                tracing::debug!(signed_in = identity.is_some(), "Identity state resolved");
            }
            session.is_loading = false;

            match identity {
                Some(identity) => {
                    let uid_changed = session.uid() != Some(identity.uid.as_str());
                    let start = match refetch {
                        Refetch::OnUidChange => uid_changed,
                        Refetch::UnlessPending => uid_changed || !session.profile_pending,
                        Refetch::Always => true,
                    };
                    if start {
                        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                        session.profile = None;
                        session.profile_pending = true;
                        fetch = Some((identity.uid.clone(), epoch));
                    }
                    session.identity = Some(identity);
                }
                None => {
                    self.epoch.fetch_add(1, Ordering::SeqCst);
                    session.identity = None;
                    session.profile = None;
                    session.profile_pending = false;
                }
            }
        });

        if let Some((uid, epoch)) = fetch {
            self.spawn_profile_fetch(uid, epoch);
        }
    }

    fn spawn_profile_fetch(self: &Arc<Self>, uid: String, epoch: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.fetch_profile(&uid).await;
            inner.finish_profile_fetch(&uid, epoch, result);
        });
    }

    fn finish_profile_fetch(&self, uid: &str, epoch: u64, result: Result<Option<Profile>>) {
        self.session.send_if_modified(|session| {
            let current = self.epoch.load(Ordering::SeqCst) == epoch && session.uid() == Some(uid);
            if !current {
                tracing::debug!(uid, epoch, "Discarding stale profile fetch");
                return false;
            }

            session.profile_pending = false;
            match result {
                Ok(Some(profile)) => session.profile = Some(profile),
                Ok(None) => {
                    tracing::warn!(uid, "No profile document for signed-in member");
                    session.profile = None;
                }
                Err(err) => {
                    tracing::error!(uid, error = %err, "Failed to fetch profile");
                    session.last_error = Some(err.user_message());
                }
            }
            true
        });
    }

    /// Replace the profile with a freshly read copy if `uid` is still current.
    fn install_profile(&self, uid: &str, profile: Profile) {
        self.session.send_if_modified(|session| {
            if session.uid() != Some(uid) {
                return false;
            }
            // Newer than anything still in flight.
            self.epoch.fetch_add(1, Ordering::SeqCst);
            session.profile = Some(profile);
            session.profile_pending = false;
            true
        });
    }

    /// Track the outcome of an explicit operation in `last_error`.
    fn record<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                self.session
                    .send_if_modified(|session| session.last_error.take().is_some());
            }
            Err(err) => {
                let message = err.user_message();
                self.session
                    .send_modify(|session| session.last_error = Some(message));
            }
        }
        result
    }

    // ─────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────

    async fn sign_up(self: &Arc<Self>, request: &SignUpRequest) -> Result<Identity> {
        let request = request.trimmed();
        request.validate()?;

        let identity = self
            .identity
            .create_identity(&request.email, &request.password)
            .await?;

        let profile = Profile::new_member(&request.profile, format_utc_rfc3339(Utc::now()));
        if let Err(err) = self.store.create_profile(&identity.uid, &profile).await {
            return Err(self.roll_back_sign_up(&identity, err).await);
        }

        tracing::info!(uid = %identity.uid, role = %request.profile.role, "Member signed up");
        // A fetch started by the provider's notification may have run before
        // the profile existed.
        self.apply_identity(Some(identity.clone()), Refetch::Always);
        Ok(identity)
    }

    /// Undo identity creation after the profile write failed.
    async fn roll_back_sign_up(self: &Arc<Self>, identity: &Identity, cause: AppError) -> AppError {
        tracing::warn!(uid = %identity.uid, error = %cause, "Profile creation failed, removing new identity");

        match self.identity.delete_identity(identity).await {
            Ok(()) => {
                self.apply_identity(None, Refetch::OnUidChange);
                AppError::PartialSignup {
                    rolled_back: true,
                    reason: cause.to_string(),
                }
            }
            Err(err) => {
                tracing::error!(
                    uid = %identity.uid,
                    error = %err,
                    "Could not delete identity without profile; manual cleanup required"
                );
                if let Err(err) = self.identity.end_session().await {
                    tracing::warn!(error = %err, "Sign-out after failed sign-up also failed");
                }
                self.apply_identity(None, Refetch::OnUidChange);
                AppError::PartialSignup {
                    rolled_back: false,
                    reason: cause.to_string(),
                }
            }
        }
    }

    async fn log_in(self: &Arc<Self>, email: &str, password: &str) -> Result<Identity> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AppError::InvalidInput(
                "Please enter your email and password".to_string(),
            ));
        }

        let identity = self.identity.verify_identity(email, password).await?;
        tracing::info!(uid = %identity.uid, "Member logged in");
        self.apply_identity(Some(identity.clone()), Refetch::UnlessPending);
        Ok(identity)
    }

    async fn log_out(self: &Arc<Self>) -> Result<()> {
        let uid = match self.session.borrow().uid() {
            Some(uid) => uid.to_string(),
            None => {
                tracing::debug!("Log-out requested while signed out");
                return Ok(());
            }
        };

        let result = self.identity.end_session().await;
        self.apply_identity(None, Refetch::OnUidChange);

        match &result {
            Ok(()) => tracing::info!(uid, "Member logged out"),
            Err(err) => {
                tracing::warn!(uid, error = %err, "Provider sign-out failed; local session cleared")
            }
        }
        result
    }

    async fn reset_password(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if !email.validate_email() {
            return Err(AppError::InvalidInput(
                "Please enter a valid email address".to_string(),
            ));
        }

        let result = with_retry(&self.retry, "request_password_reset", || {
            self.identity.request_password_reset(email)
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(AppError::AccountNotFound) => {
                tracing::debug!("Password reset requested for unknown account");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn fetch_profile(&self, uid: &str) -> Result<Option<Profile>> {
        with_retry(&self.retry, "get_profile", || self.store.get_profile(uid)).await
    }

    async fn update_profile(&self, uid: &str, update: ProfileUpdate) -> Result<Profile> {
        let mut update = update.trimmed();
        update.validate()?;
        if update.is_empty() {
            return Err(AppError::InvalidInput(
                "No profile changes to save".to_string(),
            ));
        }
        update.updated_at = Some(format_utc_rfc3339(Utc::now()));

        with_retry(&self.retry, "update_profile", || {
            self.store.update_profile(uid, &update)
        })
        .await?;

        let stored = self
            .fetch_profile(uid)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {}", uid)))?;

        tracing::info!(uid, fields = ?update.field_paths(), "Profile updated");
        self.install_profile(uid, stored.clone());
        Ok(stored)
    }

    async fn upload_profile_image(
        &self,
        identity: &Identity,
        image: ProfileImage,
        progress: Option<watch::Sender<UploadProgress>>,
    ) -> Result<Profile> {
        image.validate()?;
        let objects = self
            .objects
            .as_ref()
            .ok_or_else(|| AppError::Storage("No object store configured".to_string()))?;

        let url = objects
            .upload(identity, &profile_image_path(&identity.uid), image, progress)
            .await?;

        self.update_profile(
            &identity.uid,
            ProfileUpdate {
                image_url: Some(url),
                ..Default::default()
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use crate::models::{ProfileFields, TeamRole};
    use crate::services::memory_auth::MemoryIdentityProvider;

    fn request(email: &str, password: &str) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            profile: ProfileFields {
                full_name: "Alex Chen".to_string(),
                phone: "08123456789".to_string(),
                role: TeamRole::Tank,
                favorite_hero: None,
            },
        }
    }

    fn coordinator(
        provider: Arc<MemoryIdentityProvider>,
        db: Arc<MemoryDb>,
    ) -> SessionCoordinator {
        SessionCoordinator::start(provider, db, None, RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_starts_initializing_until_provider_resolves() {
        let provider = Arc::new(MemoryIdentityProvider::unresolved());
        let coordinator = coordinator(provider.clone(), Arc::new(MemoryDb::new()));

        assert_eq!(coordinator.phase(), SessionPhase::Initializing);
        assert!(matches!(
            coordinator.log_in("alex@test.com", "Passw0rd").await,
            Err(AppError::Initializing)
        ));
        assert_eq!(provider.calls().verifies, 0);

        provider.resolve(IdentityState::SignedOut);
        let session = coordinator.wait_until_ready().await;
        assert_eq!(session.phase(), SessionPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_up_loads_profile() {
        let provider = Arc::new(MemoryIdentityProvider::new());
        let db = Arc::new(MemoryDb::new());
        let coordinator = coordinator(provider, db);
        coordinator.wait_until_ready().await;

        let identity = coordinator
            .sign_up(&request("alex@test.com", "Passw0rd"))
            .await
            .unwrap();
        let session = coordinator.wait_for_profile().await;

        assert_eq!(session.uid(), Some(identity.uid.as_str()));
        let profile = session.profile.unwrap();
        assert_eq!(profile.role, Some(TeamRole::Tank));
        assert!(session.last_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_login_sets_last_error_and_success_clears_it() {
        let provider = Arc::new(MemoryIdentityProvider::new());
        provider.add_account("alex@test.com", "Passw0rd");
        let coordinator = coordinator(provider, Arc::new(MemoryDb::new()));
        coordinator.wait_until_ready().await;

        assert!(coordinator.log_in("alex@test.com", "nope").await.is_err());
        assert_eq!(
            coordinator.session().last_error.as_deref(),
            Some("Invalid email or password. Please try again.")
        );

        coordinator.log_in("alex@test.com", "Passw0rd").await.unwrap();
        assert!(coordinator.session().last_error.is_none());
    }

    #[tokio::test]
    async fn test_empty_credentials_skip_provider() {
        let provider = Arc::new(MemoryIdentityProvider::new());
        let coordinator = coordinator(provider.clone(), Arc::new(MemoryDb::new()));
        coordinator.wait_until_ready().await;

        assert!(matches!(
            coordinator.log_in("  ", "Passw0rd").await,
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(provider.calls().verifies, 0);
    }

    #[tokio::test]
    async fn test_provider_notification_does_not_refetch_same_uid() {
        let provider = Arc::new(MemoryIdentityProvider::new());
        let db = Arc::new(MemoryDb::new());
        let coordinator = coordinator(provider.clone(), db.clone());
        coordinator.wait_until_ready().await;

        coordinator
            .sign_up(&request("alex@test.com", "Passw0rd"))
            .await
            .unwrap();
        coordinator.wait_for_profile().await;
        let reads = db.calls().reads;

        // Token refresh: same uid, new tokens.
        let mut refreshed = coordinator.session().identity.unwrap();
        refreshed.expires_at += chrono::Duration::hours(1);
        provider.resolve(IdentityState::SignedIn(refreshed.clone()));
        let mut rx = coordinator.subscribe();
        let session = rx
            .wait_for(|s| s.identity.as_ref() == Some(&refreshed))
            .await
            .unwrap()
            .clone();

        assert_eq!(db.calls().reads, reads);
        assert!(!session.profile_pending);
        assert!(session.profile.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_stops_following_provider() {
        let provider = Arc::new(MemoryIdentityProvider::new());
        let uid = provider.add_account("alex@test.com", "Passw0rd");
        let coordinator = coordinator(provider.clone(), Arc::new(MemoryDb::new()));
        coordinator.wait_until_ready().await;
        coordinator.shutdown();

        provider.resolve(IdentityState::SignedIn(Identity::new(
            uid,
            None,
            "t",
            "r",
            Utc::now(),
        )));
        tokio::task::yield_now().await;

        assert_eq!(coordinator.phase(), SessionPhase::Unauthenticated);
    }
}
