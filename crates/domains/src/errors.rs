//! # Errors
//!
//! Centralized error handling for the campus Q&A engine.
//! `StoreError` is what adapters report; `DomainError` is what services raise;
//! `ErrorKind` is the machine-readable tag callers branch on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::RateLimitedAction;

/// Machine-readable error tag surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Unauthorized,
    InvalidInput,
    RateLimited,
    /// Identity row still provisioning; the client should retry briefly
    ProfileNotReady,
    AlreadyVoted,
    AlreadyReported,
    NotFound,
    QuestionHidden,
    Forbidden,
    InvalidRecoveryCode,
    CurrentAccountNotEmpty,
    NoOp,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::ProfileNotReady => "profile-not-ready",
            ErrorKind::AlreadyVoted => "already-voted",
            ErrorKind::AlreadyReported => "already-reported",
            ErrorKind::NotFound => "not-found",
            ErrorKind::QuestionHidden => "question-hidden",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidRecoveryCode => "invalid-recovery-code",
            ErrorKind::CurrentAccountNotEmpty => "current-account-not-empty",
            ErrorKind::NoOp => "no-op",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether a client may retry the same request automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ProfileNotReady | ErrorKind::RateLimited)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by a store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Unique constraint violated (e.g. second vote on the same target)
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// A referenced row is not visible yet (identity still being provisioned upstream)
    #[error("referenced row not ready: {0}")]
    ForeignKeyNotReady(String),

    /// The referenced row does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Infrastructure failure (connection lost, timeout, malformed row)
    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The primary error type for all service operations.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("authentication required")]
    Unauthorized,

    /// Message is safe to show to the caller
    #[error("{0}")]
    InvalidInput(String),

    #[error("rate limit exceeded for {action}")]
    RateLimited {
        action: RateLimitedAction,
        retry_after_seconds: u64,
    },

    /// Fail-closed: the action is refused when the limiter cannot decide
    #[error("rate-limit evaluation failed: {0}")]
    RateLimitEvaluation(#[source] StoreError),

    #[error("anonymous profile is still initializing")]
    ProfileNotReady,

    #[error("failed to initialize user profile: {0}")]
    ProfileInit(#[source] StoreError),

    #[error("already voted on this item")]
    AlreadyVoted,

    #[error("already reported this item")]
    AlreadyReported,

    /// Names the missing entity, e.g. "question"
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("cannot answer a hidden question")]
    QuestionHidden,

    #[error("{0}")]
    Forbidden(String),

    #[error("invalid recovery code")]
    InvalidRecoveryCode,

    #[error("current anonymous account already has activity")]
    CurrentAccountNotEmpty,

    #[error("recovery code already belongs to the current account")]
    RecoveryNoOp,

    #[error("store failure during {context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Wraps a store failure with the operation it happened in.
    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> DomainError {
        move |source| DomainError::Store { context, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Unauthorized => ErrorKind::Unauthorized,
            DomainError::InvalidInput(_) => ErrorKind::InvalidInput,
            DomainError::RateLimited { .. } => ErrorKind::RateLimited,
            DomainError::ProfileNotReady => ErrorKind::ProfileNotReady,
            DomainError::AlreadyVoted => ErrorKind::AlreadyVoted,
            DomainError::AlreadyReported => ErrorKind::AlreadyReported,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::QuestionHidden => ErrorKind::QuestionHidden,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
            DomainError::InvalidRecoveryCode => ErrorKind::InvalidRecoveryCode,
            DomainError::CurrentAccountNotEmpty => ErrorKind::CurrentAccountNotEmpty,
            DomainError::RecoveryNoOp => ErrorKind::NoOp,
            DomainError::RateLimitEvaluation(_)
            | DomainError::ProfileInit(_)
            | DomainError::Store { .. }
            | DomainError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message shown to end users. Backend details never appear here.
    pub fn public_message(&self) -> String {
        match self {
            DomainError::Unauthorized => "Authentication required.".into(),
            DomainError::InvalidInput(msg) => msg.clone(),
            DomainError::RateLimited { .. } => "Rate limit exceeded for this action.".into(),
            DomainError::RateLimitEvaluation(_) => "Failed to evaluate rate limit.".into(),
            DomainError::ProfileNotReady => {
                "Anonymous profile is still initializing. Retry shortly.".into()
            }
            DomainError::ProfileInit(_) => "Failed to initialize user profile.".into(),
            DomainError::AlreadyVoted => "You already voted on this item.".into(),
            DomainError::AlreadyReported => "You already reported this item.".into(),
            DomainError::NotFound(what) => format!("{} not found.", capitalize(what)),
            DomainError::QuestionHidden => "Cannot answer hidden question.".into(),
            DomainError::Forbidden(msg) => msg.clone(),
            DomainError::InvalidRecoveryCode => "Invalid recovery code.".into(),
            DomainError::CurrentAccountNotEmpty => {
                "Current anonymous account already has activity. Use a fresh session to recover."
                    .into()
            }
            DomainError::RecoveryNoOp => {
                "This recovery code already belongs to your current account.".into()
            }
            DomainError::Store { .. } | DomainError::Internal(_) => {
                "Unexpected server error.".into()
            }
        }
    }

    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            DomainError::RateLimited {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A specialized Result type for service logic.
pub type Result<T> = std::result::Result<T, DomainError>;
