// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity handle issued by the external authentication provider.

use chrono::{DateTime, Utc};
use std::fmt;

/// One authenticated end user as seen by the identity provider.
///
/// Tokens are kept private and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Provider-assigned unique id (also the profile document id)
    pub uid: String,
    pub email: Option<String>,
    /// When `id_token` stops being accepted
    pub expires_at: DateTime<Utc>,
    id_token: String,
    refresh_token: String,
}

impl Identity {
    pub fn new(
        uid: impl Into<String>,
        email: Option<String>,
        id_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.into(),
            email,
            expires_at,
            id_token: id_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Bearer token for backend calls made on behalf of this user.
    pub fn id_token(&self) -> &str {
        &self.id_token
    }

    /// Long-lived token used to restore the session on the next start.
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// What the provider currently knows about the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityState {
    /// Still restoring a persisted session
    #[default]
    Unresolved,
    SignedOut,
    SignedIn(Identity),
}

impl IdentityState {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, IdentityState::Unresolved)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityState::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_tokens() {
        let identity = Identity::new(
            "uid-1",
            Some("alex@test.com".to_string()),
            "secret-id-token",
            "secret-refresh-token",
            Utc::now(),
        );
        let rendered = format!("{:?}", identity);
        assert!(rendered.contains("uid-1"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_state_accessors() {
        assert!(!IdentityState::Unresolved.is_resolved());
        assert!(IdentityState::SignedOut.is_resolved());
        assert!(IdentityState::SignedOut.identity().is_none());
    }
}
