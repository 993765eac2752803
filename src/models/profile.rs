// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Member profile model and the forms that create or edit it.
//!
//! Profiles live in the `users` collection, keyed by the identity uid.
//! Field names are camelCase so documents stay readable by the web client.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const DEFAULT_RANK: &str = "Unranked";
pub const DEFAULT_LEVEL: u32 = 1;

/// In-game role a member plays for the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamRole {
    Tank,
    Marksman,
    Mage,
    Assassin,
    Support,
}

impl TeamRole {
    pub const ALL: [TeamRole; 5] = [
        TeamRole::Tank,
        TeamRole::Marksman,
        TeamRole::Mage,
        TeamRole::Assassin,
        TeamRole::Support,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Tank => "Tank",
            TeamRole::Marksman => "Marksman",
            TeamRole::Mage => "Mage",
            TeamRole::Assassin => "Assassin",
            TeamRole::Support => "Support",
        }
    }
}

impl fmt::Display for TeamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TeamRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TeamRole::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AppError::InvalidInput("Please select a valid role".to_string()))
    }
}

/// Stored member profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub full_name: String,
    pub phone: String,
    /// Older documents may predate role selection
    #[serde(default)]
    pub role: Option<TeamRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite_hero: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Download URL of the uploaded profile image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// When the member signed up (ISO 8601)
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,

    // ─── Gameplay Stats ──────────────────────────────────────────
    #[serde(default = "default_rank")]
    pub rank: String,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_rank() -> String {
    DEFAULT_RANK.to_string()
}

fn default_level() -> u32 {
    DEFAULT_LEVEL
}

impl Profile {
    /// Build the document written at sign-up, with zeroed stats.
    pub fn new_member(fields: &ProfileFields, created_at: String) -> Self {
        Self {
            full_name: fields.full_name.clone(),
            phone: fields.phone.clone(),
            role: Some(fields.role),
            favorite_hero: fields.favorite_hero.clone(),
            bio: None,
            image_url: None,
            created_at,
            updated_at: None,
            rank: default_rank(),
            wins: 0,
            losses: 0,
            level: DEFAULT_LEVEL,
        }
    }

    /// Percentage of matches won, or `None` before the first match.
    pub fn win_rate(&self) -> Option<f64> {
        let played = u64::from(self.wins) + u64::from(self.losses);
        (played > 0).then(|| f64::from(self.wins) * 100.0 / played as f64)
    }

    /// Merge a partial update into this profile.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(full_name) = &update.full_name {
            self.full_name = full_name.clone();
        }
        if let Some(phone) = &update.phone {
            self.phone = phone.clone();
        }
        if let Some(role) = update.role {
            self.role = Some(role);
        }
        if let Some(hero) = &update.favorite_hero {
            self.favorite_hero = Some(hero.clone());
        }
        if let Some(bio) = &update.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(url) = &update.image_url {
            self.image_url = Some(url.clone());
        }
        if let Some(updated_at) = &update.updated_at {
            self.updated_at = Some(updated_at.clone());
        }
    }
}

/// Member-supplied profile fields collected by the registration form.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct ProfileFields {
    #[validate(length(min = 3, message = "Full name must be at least 3 characters"))]
    pub full_name: String,
    #[validate(length(min = 10, message = "Phone number must be at least 10 characters"))]
    pub phone: String,
    pub role: TeamRole,
    #[validate(length(max = 50, message = "Favorite hero must be less than 50 characters"))]
    pub favorite_hero: Option<String>,
}

impl ProfileFields {
    /// Copy with surrounding whitespace removed. A blank favorite hero
    /// becomes `None`.
    pub fn trimmed(&self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            role: self.role,
            favorite_hero: self
                .favorite_hero
                .as_deref()
                .map(str::trim)
                .filter(|hero| !hero.is_empty())
                .map(str::to_string),
        }
    }
}

/// Everything needed to register a new member.
#[derive(Clone, Validate)]
pub struct SignUpRequest {
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    #[validate(custom(function = "validate_password"))]
    pub password: String,
    #[validate(nested)]
    pub profile: ProfileFields,
}

impl SignUpRequest {
    /// The form as it is validated and stored. The password is kept as typed.
    pub fn trimmed(&self) -> Self {
        Self {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            profile: self.profile.trimmed(),
        }
    }
}

impl fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("profile", &self.profile)
            .finish()
    }
}

/// Password policy: at least 8 characters, one uppercase letter, one digit.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(password_error(
            "password_length",
            "Password must be at least 8 characters",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(password_error(
            "password_uppercase",
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(password_error(
            "password_digit",
            "Password must contain at least one number",
        ));
    }
    Ok(())
}

fn password_error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

/// Partial edit of the caller's own profile.
///
/// Only the fields that are `Some` are written; `updated_at` is stamped by
/// the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 3, message = "Full name must be at least 3 characters"))]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 10, message = "Phone number must be at least 10 characters"))]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<TeamRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 50, message = "Favorite hero must be less than 50 characters"))]
    pub favorite_hero: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 200, message = "Bio must be less than 200 characters"))]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ProfileUpdate {
    /// Strip surrounding whitespace from the free-text fields.
    pub fn trimmed(mut self) -> Self {
        for field in [
            &mut self.full_name,
            &mut self.phone,
            &mut self.favorite_hero,
            &mut self.bio,
        ] {
            if let Some(value) = field.as_mut() {
                *value = value.trim().to_string();
            }
        }
        self
    }

    /// True when no member-editable field is set.
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.phone.is_none()
            && self.role.is_none()
            && self.favorite_hero.is_none()
            && self.bio.is_none()
            && self.image_url.is_none()
    }

    /// Stored field names touched by this update (the write mask).
    pub fn field_paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.full_name.is_some() {
            paths.push("fullName");
        }
        if self.phone.is_some() {
            paths.push("phone");
        }
        if self.role.is_some() {
            paths.push("role");
        }
        if self.favorite_hero.is_some() {
            paths.push("favoriteHero");
        }
        if self.bio.is_some() {
            paths.push("bio");
        }
        if self.image_url.is_some() {
            paths.push("imageUrl");
        }
        if self.updated_at.is_some() {
            paths.push("updatedAt");
        }
        paths
    }
}
