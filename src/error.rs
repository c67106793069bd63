//! Error types for the 1C24 client

use thiserror::Error;

use crate::api::TransportError;
use crate::session::StoreError;
use crate::validate::ValidationError;

/// Client-wide result type
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    /// Input rejected locally, nothing was sent
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// 401 that the session manager could not recover from
    #[error("Session expired, please log in again")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Token storage error: {0}")]
    Storage(#[from] StoreError),
}

impl ClientError {
    /// Build an error from a non-success HTTP status and its `detail` text
    pub fn from_status(status: u16, detail: String) -> Self {
        match status {
            401 => Self::Unauthorized,
            404 => Self::NotFound(detail),
            _ => Self::Api { status, detail },
        }
    }

    /// Whether the user has to go through the login flow again
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            ClientError::from_status(401, "expired".into()),
            ClientError::Unauthorized
        ));
        assert!(matches!(
            ClientError::from_status(404, "INN not found".into()),
            ClientError::NotFound(ref d) if d == "INN not found"
        ));
        assert!(matches!(
            ClientError::from_status(429, "slow down".into()),
            ClientError::Api { status: 429, .. }
        ));
    }

    #[test]
    fn test_requires_login() {
        assert!(ClientError::Unauthorized.requires_login());
        assert!(!ClientError::NotFound("x".into()).requires_login());
    }
}
