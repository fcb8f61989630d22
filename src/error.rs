//! Error types for the client.
//!
//! Every backend call funnels its failure into [`ClientError`]. The variants
//! follow the four failure classes the UI cares about (transport, auth,
//! validation, not-found) plus the local failures of storage and decoding.

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur while talking to the backend or local storage.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure: connection refused, timeout, TLS, etc.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered 401. Stored credentials have already been cleared.
    #[error("authentication failed")]
    Unauthorized,

    /// The backend answered 403.
    #[error("access denied")]
    Forbidden,

    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Any other 4xx, usually a validation failure with a server message.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// An endpoint that needs a token was called without one.
    #[error("user not authenticated")]
    NotAuthenticated,

    /// The response body did not have the shape we accept.
    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse classification used for user-facing handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Auth,
    Validation,
    NotFound,
    Internal,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Network(_) => ErrorKind::Network,
            ClientError::Unauthorized | ClientError::Forbidden | ClientError::NotAuthenticated => {
                ErrorKind::Auth
            }
            ClientError::Rejected { .. } => ErrorKind::Validation,
            ClientError::NotFound { .. } => ErrorKind::NotFound,
            ClientError::Server { .. }
            | ClientError::Decode(_)
            | ClientError::Json(_)
            | ClientError::Storage(_)
            | ClientError::Url(_)
            | ClientError::Config(_) => ErrorKind::Internal,
        }
    }

    /// True for 401/403 and for calls made without a stored token.
    pub fn is_auth_failure(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }

    /// Message suitable for a toast. Server-provided messages win.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Rejected { message, .. } | ClientError::Server { message, .. }
                if !message.is_empty() =>
            {
                message.clone()
            }
            ClientError::Network(_) => "Could not reach the server".to_string(),
            other => {
                let text = other.to_string();
                if text.is_empty() {
                    "An unexpected error occurred".to_string()
                } else {
                    text
                }
            }
        }
    }

    pub(crate) fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}
