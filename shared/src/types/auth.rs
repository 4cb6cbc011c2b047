use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Request wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticationRequest {
    #[serde(alias = "username")]
    pub email: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Body returned by register / authenticate.
///
/// Only token *metadata* lives here. The token strings themselves travel in
/// the session cookies and mirror headers, never in the JSON payload.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthenticationResponse {
    Success {
        user_id: i64,
        email: String,
        token_type: String,
        /// Seconds until the access token expires.
        expires_in: u64,
        /// Seconds until the refresh token expires.
        refresh_expires_in: u64,
        issued_at: i64,
        expires_at: i64,
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Every failure the token lifecycle can surface to a client.
///
/// `InvalidCredentials` is deliberately one variant for both "no such
/// identity" and "wrong secret".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("identity already registered")]
    DuplicateIdentity,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("token revoked")]
    RevokedToken,

    /// Store or crypto failure. The detail is logged, never rendered.
    #[error("internal auth failure: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn to_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::DuplicateIdentity => "IDENTITY_TAKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::ExpiredToken => "TOKEN_EXPIRED",
            Self::RevokedToken => "TOKEN_REVOKED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::DuplicateIdentity => "An account with this email already exists".to_string(),
            Self::InvalidToken | Self::ExpiredToken | Self::RevokedToken => {
                "Authentication required".to_string()
            }
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// HTTP status the error renders as.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::DuplicateIdentity => 409,
            Self::Internal(_) => 500,
            _ => 401,
        }
    }
}
