//! JSON envelope and status mapping.
//!
//! Success: `{"ok": true, "data": ...}`.
//! Failure: `{"ok": false, "error": "...", "code": "rate-limited", "retryAfterSeconds": 42}`
//! with a matching HTTP status and a `Retry-After` header when applicable.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use domains::errors::ErrorKind;
use services::ActionError;

#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    ok: bool,
    data: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Failure<'a> {
    ok: bool,
    error: &'a str,
    code: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
}

/// Transport wrapper around [`ActionError`].
#[derive(Debug)]
pub struct ApiError(pub ActionError);

impl ApiError {
    pub fn unauthorized() -> Self {
        Self(ActionError {
            kind: ErrorKind::Unauthorized,
            message: "Authentication required.".into(),
            retry_after_seconds: None,
        })
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self(ActionError {
            kind: ErrorKind::InvalidInput,
            message: message.into(),
            retry_after_seconds: None,
        })
    }

    pub fn internal() -> Self {
        Self(ActionError {
            kind: ErrorKind::Internal,
            message: "Unexpected server error.".into(),
            retry_after_seconds: None,
        })
    }
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "request body rejected");
        Self::invalid_input("Malformed request body.")
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::InvalidInput | ErrorKind::InvalidRecoveryCode => StatusCode::BAD_REQUEST,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::ProfileNotReady => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::AlreadyVoted
        | ErrorKind::AlreadyReported
        | ErrorKind::QuestionHidden
        | ErrorKind::CurrentAccountNotEmpty
        | ErrorKind::NoOp => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ActionError {
            kind,
            message,
            retry_after_seconds,
        } = self.0;

        let body = Failure {
            ok: false,
            error: &message,
            code: kind,
            retry_after_seconds,
        };
        let mut response = (status_for(kind), Json(body)).into_response();

        if let Some(seconds) = retry_after_seconds {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_map_to_retryable_statuses() {
        assert_eq!(status_for(ErrorKind::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(ErrorKind::ProfileNotReady), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(ErrorKind::AlreadyVoted), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = ApiError(ActionError {
            kind: ErrorKind::RateLimited,
            message: "Too many requests.".into(),
            retry_after_seconds: Some(3600),
        })
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3600");
    }
}
