// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Frost Warlord: member portal client for the Frost Warlord esports team
//!
//! This crate provides the session coordinator that mediates between the
//! Firebase identity provider, the Firestore profile store and everything
//! that renders member state, plus the team schedule and chat features.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod retry;
pub mod services;
pub mod session;
pub mod time_utils;

use config::Config;
use db::FirestoreDb;
use error::Result;
use services::{FirebaseAuthClient, FirebaseStorage};
use session::SessionCoordinator;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth: Arc<FirebaseAuthClient>,
    pub coordinator: SessionCoordinator,
}

impl AppState {
    /// Connect to Firebase and start the session coordinator.
    ///
    /// `refresh_token` is the token persisted by a previous run; the
    /// coordinator stays `Initializing` until it has been checked.
    pub async fn connect(config: Config, refresh_token: Option<&str>) -> Result<Self> {
        let auth = Arc::new(FirebaseAuthClient::new(&config)?);
        let db = FirestoreDb::new(&config.firebase_project_id).await?;
        let storage = FirebaseStorage::new(&config)?;

        let coordinator = SessionCoordinator::start(
            auth.clone(),
            Arc::new(db),
            Some(Arc::new(storage)),
            config.retry,
        );

        if let Err(e) = auth.restore(refresh_token).await {
            tracing::warn!(error = %e, "Starting signed out");
        }

        Ok(Self {
            config,
            auth,
            coordinator,
        })
    }
}
