// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Member-only team features: the schedule viewer and team chat.

use crate::db::{ChatFeed, DocumentStore};
use crate::error::{AppError, Result};
use crate::models::chat::{DEFAULT_HISTORY, MAX_MESSAGE_LEN};
use crate::models::{ChatMessage, Identity, ScheduleEntry, ScheduleFilter, Session};
use crate::time_utils::{format_date, format_utc_rfc3339};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

const FALLBACK_USER_NAME: &str = "Team Member";

/// Schedule and chat access for the signed-in member.
#[derive(Clone)]
pub struct TeamService {
    store: Arc<dyn DocumentStore>,
    session: watch::Receiver<Session>,
}

impl TeamService {
    pub fn new(store: Arc<dyn DocumentStore>, session: watch::Receiver<Session>) -> Self {
        Self { store, session }
    }

    fn require_member(&self) -> Result<Session> {
        let session = self.session.borrow().clone();
        if !session.is_authenticated() {
            return Err(AppError::Unauthorized);
        }
        Ok(session)
    }

    /// Schedule entries for `filter`, relative to today's date.
    pub async fn schedules(&self, filter: ScheduleFilter) -> Result<Vec<ScheduleEntry>> {
        self.require_member()?;
        let today = format_date(Utc::now());
        self.store.list_schedules(filter, &today).await
    }

    /// Post `text` to the team chat as the current member.
    pub async fn post_message(&self, text: &str) -> Result<ChatMessage> {
        let session = self.require_member()?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput("Message cannot be empty".to_string()));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::InvalidInput(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        let Some(identity) = session.identity.as_ref() else {
            return Err(AppError::Unauthorized);
        };
        let profile = session.profile.as_ref();

        let mut message = ChatMessage {
            id: None,
            text: text.to_string(),
            user_id: identity.uid.clone(),
            user_name: sender_name(identity, profile.map(|p| p.full_name.as_str())),
            user_role: profile
                .and_then(|p| p.role)
                .map(|r| r.to_string())
                .unwrap_or_default(),
            timestamp: format_utc_rfc3339(Utc::now()),
        };

        let id = self.store.add_chat_message(&message).await?;
        tracing::debug!(message_id = %id, user_id = %message.user_id, "Chat message posted");
        message.id = Some(id);
        Ok(message)
    }

    /// The newest `limit` messages (default 100), oldest first.
    pub async fn recent_messages(&self, limit: Option<u32>) -> Result<Vec<ChatMessage>> {
        self.require_member()?;
        self.store
            .recent_chat_messages(limit.unwrap_or(DEFAULT_HISTORY))
            .await
    }

    /// Follow the chat live, starting with the next message posted.
    pub async fn follow_chat(&self) -> Result<ChatSubscription> {
        self.require_member()?;
        let feed = self.store.watch_chat().await?;
        Ok(ChatSubscription {
            feed,
            session: self.session.clone(),
        })
    }
}

/// Live chat for a signed-in member. Ends when they log out.
pub struct ChatSubscription {
    feed: ChatFeed,
    session: watch::Receiver<Session>,
}

impl ChatSubscription {
    /// Next message posted, or `None` once the member logs out or the store
    /// stops listening.
    pub async fn next(&mut self) -> Option<ChatMessage> {
        loop {
            if !self.session.borrow_and_update().is_authenticated() {
                return None;
            }
            tokio::select! {
                message = self.feed.next() => return message,
                changed = self.session.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }
}

fn sender_name(identity: &Identity, full_name: Option<&str>) -> String {
    full_name
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .or_else(|| identity.email.clone())
        .unwrap_or_else(|| FALLBACK_USER_NAME.to_string())
}
