//! Resolves the caller from a `Authorization: Bearer <token>` header.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use domains::models::UserId;
use domains::ports::SessionProvider;

use crate::response::ApiError;

/// The authenticated anonymous identity.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

impl<S> FromRequestParts<S> for Caller
where
    Arc<dyn SessionProvider>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(ApiError::unauthorized)?;

        let sessions = Arc::<dyn SessionProvider>::from_ref(state);
        sessions
            .verify(token)
            .map(Caller)
            .map_err(|_| ApiError::unauthorized())
    }
}
