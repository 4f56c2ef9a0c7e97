//! Common error types for drivegate.

use thiserror::Error;

/// Why an operation could not be authenticated.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential source is configured for the storage account.
    #[error("no storage credentials configured; set up OAuth 2.0 or a service account")]
    NotConfigured,

    /// The stored access token expired and cannot be refreshed.
    #[error("access token expired and no refresh token is available; re-authenticate at /auth")]
    ReauthenticationRequired,

    /// The caller has no live session.
    #[error("not authenticated")]
    Unauthorized,

    /// The provider or token endpoint rejected the credential.
    #[error("{0}")]
    Rejected(String),
}

/// Top-level error type for drivegate operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing, expired or rejected credential.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Folder or file id unresolvable at the provider.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upload or download failed mid-transfer.
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Missing or malformed input.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The provider refused the operation.
    #[error("Not permitted: {0}")]
    PermissionDenied(String),

    /// Network or unexpected provider failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Required configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error must reset the session.
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// The message without its category prefix, suitable for end users.
    pub fn detail(&self) -> String {
        match self {
            Error::Auth(e) => e.to_string(),
            Error::NotFound(m)
            | Error::Transfer(m)
            | Error::Validation(m)
            | Error::PermissionDenied(m)
            | Error::Network(m)
            | Error::Config(m)
            | Error::Serialization(m) => m.clone(),
            Error::Io(e) => e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
