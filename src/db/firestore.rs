// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (member profiles, keyed by identity uid)
//! - Schedules (team events, read-only here)
//! - Chat (team messages, including a live listener)

use crate::db::{collections, ChatFeed, DocumentStore};
use crate::error::{AppError, Result};
use crate::models::{ChatMessage, Profile, ProfileUpdate, ScheduleEntry, ScheduleFilter};
use async_trait::async_trait;
use firestore::{
    FirestoreListenEvent, FirestoreListenerTarget, FirestoreListenerTargetParams,
    FirestoreListenerTargetResumeType, FirestoreMemListenStateStorage, FirestoreQueryParams,
    FirestoreTargetType,
};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Listener target ID for the chat collection.
const CHAT_LISTEN_TARGET: u32 = 1;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

#[async_trait]
impl DocumentStore for FirestoreDb {
    // ─── Profile Operations ──────────────────────────────────────

    async fn create_profile(&self, uid: &str, profile: &Profile) -> Result<()> {
        let _: Profile = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::USERS)
            .document_id(uid)
            .object(profile)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<Profile>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn update_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<()> {
        // A field-masked update would silently create a partial document,
        // so check the profile exists first.
        if self.get_profile(uid).await?.is_none() {
            return Err(AppError::NotFound(format!("Profile {}", uid)));
        }

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(update.field_paths())
            .in_col(collections::USERS)
            .document_id(uid)
            .object(update)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Schedule Operations ─────────────────────────────────────

    async fn list_schedules(
        &self,
        filter: ScheduleFilter,
        today: &str,
    ) -> Result<Vec<ScheduleEntry>> {
        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::SCHEDULES);
        let today = today.to_string();

        let query = match filter {
            ScheduleFilter::Upcoming => {
                query.filter(move |q| q.field("date").greater_than_or_equal(today.clone()))
            }
            ScheduleFilter::Past => query.filter(move |q| q.field("date").less_than(today.clone())),
            ScheduleFilter::All => query,
        };

        let direction = if filter.descending() {
            firestore::FirestoreQueryDirection::Descending
        } else {
            firestore::FirestoreQueryDirection::Ascending
        };

        query
            .order_by([("date", direction)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Chat Operations ─────────────────────────────────────────

    async fn add_chat_message(&self, message: &ChatMessage) -> Result<String> {
        let doc_id = uuid::Uuid::new_v4().to_string();

        let _: ChatMessage = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::CHAT)
            .document_id(&doc_id)
            .object(message)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(doc_id)
    }

    async fn recent_chat_messages(&self, limit: u32) -> Result<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::CHAT)
            .order_by([(
                "timestamp",
                firestore::FirestoreQueryDirection::Descending,
            )])
            .limit(limit)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        messages.reverse();
        Ok(messages)
    }

    async fn watch_chat(&self) -> Result<ChatFeed> {
        let client = self.get_client()?;
        let mut listener = client
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Resuming from now skips the existing history.
        let target = FirestoreListenerTargetParams::new(
            FirestoreListenerTarget::new(CHAT_LISTEN_TARGET),
            FirestoreTargetType::Query(FirestoreQueryParams::new(collections::CHAT.into())),
            HashMap::new(),
        )
        .with_resume_type(FirestoreListenerTargetResumeType::ReadTime(
            chrono::Utc::now(),
        ));
        listener
            .add_target(target)
            .map_err(|e| AppError::Database(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let events = tx.clone();
        listener
            .start(move |event| {
                let events = events.clone();
                async move {
                    if let FirestoreListenEvent::DocumentChange(change) = event {
                        if let Some(doc) = change.document {
                            match firestore::FirestoreDb::deserialize_doc_to::<ChatMessage>(&doc) {
                                Ok(message) => {
                                    let _ = events.send(message);
                                }
                                Err(e) => tracing::warn!(
                                    document = %doc.name,
                                    error = %e,
                                    "Skipping unreadable chat message"
                                ),
                            }
                        }
                    }
                    Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                }
            })
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        tracing::debug!("Listening for chat messages");

        // Stop listening once the feed is dropped.
        tokio::spawn(async move {
            tx.closed().await;
            if let Err(e) = listener.shutdown().await {
                tracing::warn!(error = %e, "Failed to stop chat listener");
            }
        });

        Ok(ChatFeed::new(rx))
    }
}
