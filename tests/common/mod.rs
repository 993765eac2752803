// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use frost_warlord::db::{ChatFeed, DocumentStore, FirestoreDb, MemoryDb};
use frost_warlord::error::{AppError, Result};
use frost_warlord::models::{
    ChatMessage, Profile, ProfileFields, ProfileUpdate, ScheduleEntry, ScheduleFilter,
    SignUpRequest, TeamRole,
};
use frost_warlord::retry::RetryPolicy;
use frost_warlord::services::{MemoryIdentityProvider, MemoryObjectStore};
use frost_warlord::session::SessionCoordinator;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Unique suffix for test isolation against a shared emulator.
#[allow(dead_code)]
pub fn unique_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Retry policy with millisecond backoff so tests stay fast.
#[allow(dead_code)]
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

/// The registration from the portal's happy-path walkthrough.
#[allow(dead_code)]
pub fn alex_signup() -> SignUpRequest {
    signup_request("alex@test.com", "Passw0rd", "Alex Chen", TeamRole::Tank)
}

#[allow(dead_code)]
pub fn signup_request(email: &str, password: &str, name: &str, role: TeamRole) -> SignUpRequest {
    SignUpRequest {
        email: email.to_string(),
        password: password.to_string(),
        profile: ProfileFields {
            full_name: name.to_string(),
            phone: "08123456789".to_string(),
            role,
            favorite_hero: None,
        },
    }
}

#[allow(dead_code)]
pub fn member_profile(name: &str, role: TeamRole) -> Profile {
    Profile::new_member(
        &ProfileFields {
            full_name: name.to_string(),
            phone: "08123456789".to_string(),
            role,
            favorite_hero: None,
        },
        "2026-03-01T12:00:00.000Z".to_string(),
    )
}

/// An offline coordinator with its in-memory backends exposed.
#[allow(dead_code)]
pub struct TestPortal {
    pub coordinator: SessionCoordinator,
    pub provider: Arc<MemoryIdentityProvider>,
    pub db: Arc<MemoryDb>,
    pub objects: Arc<MemoryObjectStore>,
}

/// Build a resolved (signed-out) coordinator over in-memory backends.
#[allow(dead_code)]
pub async fn create_test_portal() -> TestPortal {
    let db = Arc::new(MemoryDb::new());
    create_test_portal_with_store(db.clone(), db, RetryPolicy::none()).await
}

/// Same as [`create_test_portal`] but reading through `store`, which wraps
/// `db`.
#[allow(dead_code)]
pub async fn create_test_portal_with_store(
    db: Arc<MemoryDb>,
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
) -> TestPortal {
    let provider = Arc::new(MemoryIdentityProvider::new());
    let objects = Arc::new(MemoryObjectStore::new());
    let coordinator =
        SessionCoordinator::start(provider.clone(), store, Some(objects.clone()), retry);
    coordinator.wait_until_ready().await;

    TestPortal {
        coordinator,
        provider,
        db,
        objects,
    }
}

/// Document store whose profile reads block until the gate is opened.
#[allow(dead_code)]
pub struct GatedStore {
    pub inner: Arc<MemoryDb>,
    open: watch::Sender<bool>,
    finished_reads: AtomicUsize,
}

#[allow(dead_code)]
impl GatedStore {
    pub fn new(inner: Arc<MemoryDb>) -> Self {
        let (open, _) = watch::channel(true);
        Self {
            inner,
            open,
            finished_reads: AtomicUsize::new(0),
        }
    }

    pub fn close(&self) {
        self.open.send_replace(false);
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub fn finished_reads(&self) -> usize {
        self.finished_reads.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` profile reads have returned.
    pub async fn wait_for_reads(&self, count: usize) {
        while self.finished_reads() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        // Give the fetch task a chance to apply (or discard) its result.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn create_profile(&self, uid: &str, profile: &Profile) -> Result<()> {
        self.inner.create_profile(uid, profile).await
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>> {
        let mut open = self.open.subscribe();
        let _ = open.wait_for(|open| *open).await;
        let result = self.inner.get_profile(uid).await;
        self.finished_reads.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<()> {
        self.inner.update_profile(uid, update).await
    }

    async fn list_schedules(
        &self,
        filter: ScheduleFilter,
        today: &str,
    ) -> Result<Vec<ScheduleEntry>> {
        self.inner.list_schedules(filter, today).await
    }

    async fn add_chat_message(&self, message: &ChatMessage) -> Result<String> {
        self.inner.add_chat_message(message).await
    }

    async fn recent_chat_messages(&self, limit: u32) -> Result<Vec<ChatMessage>> {
        self.inner.recent_chat_messages(limit).await
    }

    async fn watch_chat(&self) -> Result<ChatFeed> {
        self.inner.watch_chat().await
    }
}

/// Document store whose first few profile reads and updates fail with a
/// network error.
#[allow(dead_code)]
pub struct FlakyStore {
    pub inner: Arc<MemoryDb>,
    read_failures: AtomicU32,
    update_failures: AtomicU32,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(inner: Arc<MemoryDb>, read_failures: u32, update_failures: u32) -> Self {
        Self {
            inner,
            read_failures: AtomicU32::new(read_failures),
            update_failures: AtomicU32::new(update_failures),
        }
    }

    fn take_failure(counter: &AtomicU32) -> Result<()> {
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(AppError::Network("connection reset".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn create_profile(&self, uid: &str, profile: &Profile) -> Result<()> {
        self.inner.create_profile(uid, profile).await
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>> {
        Self::take_failure(&self.read_failures)?;
        self.inner.get_profile(uid).await
    }

    async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<()> {
        Self::take_failure(&self.update_failures)?;
        self.inner.update_profile(uid, update).await
    }

    async fn list_schedules(
        &self,
        filter: ScheduleFilter,
        today: &str,
    ) -> Result<Vec<ScheduleEntry>> {
        self.inner.list_schedules(filter, today).await
    }

    async fn add_chat_message(&self, message: &ChatMessage) -> Result<String> {
        self.inner.add_chat_message(message).await
    }

    async fn recent_chat_messages(&self, limit: u32) -> Result<Vec<ChatMessage>> {
        self.inner.recent_chat_messages(limit).await
    }

    async fn watch_chat(&self) -> Result<ChatFeed> {
        self.inner.watch_chat().await
    }
}
