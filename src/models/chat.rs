// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Team chat messages.

use serde::{Deserialize, Serialize};

pub const MAX_MESSAGE_LEN: usize = 500;
pub const DEFAULT_HISTORY: u32 = 100;

/// A message in the `chat` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: Option<String>,
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    /// Sender's team role at the time of posting ("" if unknown)
    #[serde(default)]
    pub user_role: String,
    /// RFC3339 with millisecond precision, so string order is time order
    pub timestamp: String,
}
