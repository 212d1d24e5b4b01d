use thiserror::Error;

use domains::errors::DomainError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("invalid or expired session token")]
    InvalidToken,
}

impl From<AuthError> for DomainError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken => DomainError::Unauthorized,
            other => DomainError::Internal(other.to_string()),
        }
    }
}
