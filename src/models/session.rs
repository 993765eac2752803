// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory view of who is logged in and what their profile says.

use crate::models::{Identity, Profile};

/// Current authentication state, owned by the session coordinator.
///
/// Consumers only ever see snapshots of this; they never mutate it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Option<Identity>,
    /// Never set while `identity` is `None`
    pub profile: Option<Profile>,
    /// True until the provider first reports identity state
    pub is_loading: bool,
    /// A profile fetch for the current identity is still in flight
    pub profile_pending: bool,
    /// User-facing message of the most recent failed auth operation
    pub last_error: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            identity: None,
            profile: None,
            is_loading: true,
            profile_pending: false,
            last_error: None,
        }
    }
}

/// Coarse state for route guards and rendering decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Render nothing yet; absence of identity is not known
    Initializing,
    Unauthenticated,
    Authenticated,
}

impl Session {
    pub fn phase(&self) -> SessionPhase {
        if self.is_loading {
            SessionPhase::Initializing
        } else if self.identity.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.uid.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == SessionPhase::Authenticated
    }
}

/// Values shown in the member dashboard header.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSummary {
    pub display_name: String,
    pub role_label: String,
    /// Signup date as "Mar 01, 2026", or "Recently" when unknown
    pub member_since: String,
    pub favorite_hero: Option<String>,
    pub rank: String,
    pub level: u32,
    pub win_rate: Option<f64>,
}

impl MemberSummary {
    /// Summarize an authenticated session; `None` when logged out.
    pub fn from_session(session: &Session) -> Option<Self> {
        let identity = session.identity.as_ref()?;
        let profile = session.profile.as_ref();

        let display_name = profile
            .map(|p| p.full_name.clone())
            .filter(|name| !name.is_empty())
            .or_else(|| identity.email.clone())
            .unwrap_or_else(|| "Team Member".to_string());

        let member_since = profile
            .and_then(|p| chrono::DateTime::parse_from_rfc3339(&p.created_at).ok())
            .map(|d| d.format("%b %d, %Y").to_string())
            .unwrap_or_else(|| "Recently".to_string());

        Some(Self {
            display_name,
            role_label: profile
                .and_then(|p| p.role)
                .map(|r| r.to_string())
                .unwrap_or_else(|| "Member".to_string()),
            member_since,
            favorite_hero: profile.and_then(|p| p.favorite_hero.clone()),
            rank: profile
                .map(|p| p.rank.clone())
                .unwrap_or_else(|| crate::models::profile::DEFAULT_RANK.to_string()),
            level: profile
                .map(|p| p.level)
                .unwrap_or(crate::models::profile::DEFAULT_LEVEL),
            win_rate: profile.and_then(|p| p.win_rate()),
        })
    }
}
