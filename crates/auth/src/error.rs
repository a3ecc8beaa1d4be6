//! Authentication error types.

use store::StoreError;
use thiserror::Error;

use crate::email::EmailError;

/// Reasons a token is rejected, or cannot be issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The token is not a well-formed signed token.
    #[error("malformed token")]
    Malformed,

    /// The signature does not verify against the configured key and algorithm.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The token's validity window has passed.
    #[error("token expired")]
    Expired,

    #[error("invalid token issuer")]
    InvalidIssuer,

    #[error("invalid token audience")]
    InvalidAudience,

    /// The token service was configured with unusable settings.
    #[error("token configuration error: {0}")]
    Configuration(String),

    /// The claims could not be encoded.
    #[error("token encoding error: {0}")]
    Encoding(String),
}

impl TokenError {
    /// Short label used for metrics.
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::InvalidIssuer => "invalid_issuer",
            TokenError::InvalidAudience => "invalid_audience",
            TokenError::Configuration(_) => "configuration",
            TokenError::Encoding(_) => "encoding",
        }
    }
}

/// Errors raised while hashing or checking passwords.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordError {
    /// The work-factor parameters are outside what the KDF accepts.
    #[error("invalid hash parameters: {0}")]
    InvalidParams(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    /// Stored credential material cannot be interpreted.
    #[error("malformed credential: {0}")]
    MalformedCredential(String),

    /// The blocking hashing task did not complete.
    #[error("hashing task failed: {0}")]
    TaskFailed(String),
}

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Invalid credentials (wrong password or unknown account).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("account already exists")]
    AccountAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The presented token was rejected.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Password hashing error.
    #[error("password error: {0}")]
    Password(#[from] PasswordError),

    /// Account storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
