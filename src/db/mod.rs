// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Firestore, plus an in-memory store for offline use).

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::Result;
use crate::models::{ChatMessage, Profile, ProfileUpdate, ScheduleEntry, ScheduleFilter};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Collection names as constants.
pub mod collections {
    /// Member profiles (keyed by identity uid)
    pub const USERS: &str = "users";
    pub const SCHEDULES: &str = "schedules";
    pub const CHAT: &str = "chat";
}

/// Live feed of chat messages posted after it was opened.
///
/// Dropping the feed stops the listener behind it.
pub struct ChatFeed {
    messages: mpsc::UnboundedReceiver<ChatMessage>,
}

impl ChatFeed {
    pub fn new(messages: mpsc::UnboundedReceiver<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Next message in arrival order, or `None` once the store stops
    /// listening.
    pub async fn next(&mut self) -> Option<ChatMessage> {
        self.messages.recv().await
    }
}

/// Document store the session coordinator and member services depend on.
///
/// Not-found reads return `Ok(None)`; errors are reserved for real I/O
/// failures.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write the profile created at sign-up.
    async fn create_profile(&self, uid: &str, profile: &Profile) -> Result<()>;

    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>>;

    /// Write only the fields set in `update`. Fails with `NotFound` when the
    /// profile does not exist.
    async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<()>;

    /// Schedule entries for `filter`, relative to `today` (`YYYY-MM-DD`).
    async fn list_schedules(&self, filter: ScheduleFilter, today: &str)
        -> Result<Vec<ScheduleEntry>>;

    /// Store a chat message and return its document ID.
    async fn add_chat_message(&self, message: &ChatMessage) -> Result<String>;

    /// The newest `limit` messages, oldest first.
    async fn recent_chat_messages(&self, limit: u32) -> Result<Vec<ChatMessage>>;

    /// Subscribe to messages added to the chat from now on.
    async fn watch_chat(&self) -> Result<ChatFeed>;
}
