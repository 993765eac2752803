// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory document store for offline use and tests.
//!
//! Mirrors the Firestore semantics the app relies on: profile creation fails
//! if the document exists, field updates fail if it does not, schedule and
//! chat queries sort the same way the Firestore queries do.

use crate::db::{ChatFeed, DocumentStore};
use crate::error::{AppError, Result};
use crate::models::{ChatMessage, Profile, ProfileUpdate, ScheduleEntry, ScheduleFilter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Number of calls made against each profile operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCalls {
    pub creates: usize,
    pub reads: usize,
    pub updates: usize,
}

#[derive(Default)]
struct Collections {
    users: HashMap<String, Profile>,
    schedules: Vec<ScheduleEntry>,
    chat: Vec<ChatMessage>,
    chat_watchers: Vec<mpsc::UnboundedSender<ChatMessage>>,
}

/// Document store backed by process memory.
#[derive(Default)]
pub struct MemoryDb {
    data: Mutex<Collections>,
    creates: AtomicUsize,
    reads: AtomicUsize,
    updates: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every profile write fail with a `Database` error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> StoreCalls {
        StoreCalls {
            creates: self.creates.load(Ordering::SeqCst),
            reads: self.reads.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
        }
    }

    /// Seed a schedule entry (the app itself never writes schedules).
    pub fn insert_schedule(&self, mut entry: ScheduleEntry) {
        let mut data = self.lock();
        if entry.id.is_none() {
            entry.id = Some(format!("schedule-{}", data.schedules.len() + 1));
        }
        data.schedules.push(entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collections> {
        // A poisoned lock only means a test panicked mid-write; the data is
        // still usable.
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(
                "Write rejected (simulated outage)".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDb {
    async fn create_profile(&self, uid: &str, profile: &Profile) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let mut data = self.lock();
        if data.users.contains_key(uid) {
            return Err(AppError::Database(format!(
                "Document users/{} already exists",
                uid
            )));
        }
        data.users.insert(uid.to_string(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().users.get(uid).cloned())
    }

    async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let mut data = self.lock();
        let profile = data
            .users
            .get_mut(uid)
            .ok_or_else(|| AppError::NotFound(format!("Profile {}", uid)))?;
        profile.apply(update);
        Ok(())
    }

    async fn list_schedules(
        &self,
        filter: ScheduleFilter,
        today: &str,
    ) -> Result<Vec<ScheduleEntry>> {
        let mut entries: Vec<ScheduleEntry> = self
            .lock()
            .schedules
            .iter()
            .filter(|e| filter.matches(&e.date, today))
            .cloned()
            .collect();

        entries.sort_by(|a, b| a.date.cmp(&b.date));
        if filter.descending() {
            entries.reverse();
        }
        Ok(entries)
    }

    async fn add_chat_message(&self, message: &ChatMessage) -> Result<String> {
        let doc_id = uuid::Uuid::new_v4().to_string();
        let mut stored = message.clone();
        stored.id = Some(doc_id.clone());

        let mut data = self.lock();
        // Dropped feeds fall out here.
        data.chat_watchers
            .retain(|watcher| watcher.send(stored.clone()).is_ok());
        data.chat.push(stored);
        Ok(doc_id)
    }

    async fn recent_chat_messages(&self, limit: u32) -> Result<Vec<ChatMessage>> {
        let mut messages = self.lock().chat.clone();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages.split_off(skip))
    }

    async fn watch_chat(&self) -> Result<ChatFeed> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().chat_watchers.push(tx);
        Ok(ChatFeed::new(rx))
    }
}
