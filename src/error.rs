// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent user-facing messages.

/// Classified failure produced by every session and member operation.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session is still initializing")]
    Initializing,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Email address already in use")]
    EmailInUse,

    #[error("Password rejected by identity provider: {0}")]
    WeakPassword(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Too many requests")]
    RateLimited,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Profile creation failed after sign-up (identity rolled back: {rolled_back}): {reason}")]
    PartialSignup { rolled_back: bool, reason: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Map an identity-provider error code to a classified error.
    ///
    /// Codes may carry a trailing description (`WEAK_PASSWORD : Password
    /// should be at least 6 characters`); only the leading token is matched.
    pub fn from_provider_code(code: &str) -> Self {
        let (head, detail) = match code.split_once(':') {
            Some((head, detail)) => (head.trim(), detail.trim()),
            None => (code.trim(), ""),
        };

        match head {
            "EMAIL_EXISTS" => AppError::EmailInUse,
            "EMAIL_NOT_FOUND" | "USER_NOT_FOUND" => AppError::AccountNotFound,
            "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => AppError::InvalidCredentials,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => AppError::RateLimited,
            "WEAK_PASSWORD" => AppError::WeakPassword(detail.to_string()),
            "NETWORK_REQUEST_FAILED" => AppError::Network(code.to_string()),
            _ => AppError::Provider(code.to_string()),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_))
    }

    /// Human-readable text for a toast or inline message.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(errors) => first_validation_message(errors),
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::Initializing => "Please wait while your session loads.".to_string(),
            AppError::Unauthorized => "Please log in to continue.".to_string(),
            AppError::EmailInUse => {
                "This email is already in use. Please use a different email or login.".to_string()
            }
            AppError::WeakPassword(_) => {
                "Password is too weak. Please choose a stronger password.".to_string()
            }
            AppError::InvalidCredentials | AppError::AccountNotFound => {
                "Invalid email or password. Please try again.".to_string()
            }
            AppError::RateLimited => {
                "Too many failed login attempts. Please try again later.".to_string()
            }
            AppError::Network(_) => {
                "Network error. Please check your connection and try again.".to_string()
            }
            AppError::PartialSignup { .. } => {
                "Failed to create account. Please try again.".to_string()
            }
            AppError::NotFound(_) => "The requested record was not found.".to_string(),
            AppError::Provider(_)
            | AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            AppError::Network(err.to_string())
        } else {
            AppError::Provider(err.to_string())
        }
    }
}

/// Pick the first field message from a set of validation errors.
fn first_validation_message(errors: &validator::ValidationErrors) -> String {
    find_validation_message(errors)
        .unwrap_or_else(|| "Please check the highlighted fields.".to_string())
}

/// Depth first through nested forms, fields in name order.
fn find_validation_message(errors: &validator::ValidationErrors) -> Option<String> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    fields.into_iter().find_map(|(_, kind)| match kind {
        validator::ValidationErrorsKind::Field(errs) => errs
            .iter()
            .find_map(|e| e.message.as_ref().map(|m| m.to_string())),
        validator::ValidationErrorsKind::Struct(nested) => find_validation_message(nested),
        validator::ValidationErrorsKind::List(items) => {
            items.values().find_map(|nested| find_validation_message(nested))
        }
    })
}

/// Result type alias for coordinator and backend operations
pub type Result<T> = std::result::Result<T, AppError>;
