//! HS256 tokens carrying an anonymous identity.
//!
//! Issuing a session mints a fresh v4 id as the subject. Nothing is stored;
//! the identity row is created lazily on first action.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use domains::errors::DomainError;
use domains::models::UserId;
use domains::ports::{AnonymousSession, SessionProvider};

use crate::error::AuthError;

const ISSUER: &str = "campus-qna";

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

pub struct JwtSessionProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl JwtSessionProvider {
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

impl SessionProvider for JwtSessionProvider {
    fn issue(&self) -> Result<AnonymousSession, DomainError> {
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + self.ttl;

        let claims = SessionClaims {
            iss: ISSUER.to_string(),
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(AnonymousSession {
            user_id,
            token,
            expires_at,
        })
    }

    fn verify(&self, token: &str) -> Result<UserId, DomainError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);

        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(|e| {
            debug!(error = %e, "session token rejected");
            AuthError::InvalidToken
        })?;
        Ok(Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidToken)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(secret: &str, ttl: Duration) -> JwtSessionProvider {
        JwtSessionProvider::new(&SecretString::from(secret.to_string()), ttl)
    }

    #[test]
    fn issued_token_resolves_to_its_identity() {
        let sessions = provider("test-secret-key-at-least-32-chars", Duration::days(30));
        let session = sessions.issue().unwrap();
        assert_eq!(sessions.verify(&session.token).unwrap(), session.user_id);
        assert!(session.expires_at > Utc::now());
    }

    #[test]
    fn each_session_is_a_new_identity() {
        let sessions = provider("test-secret-key-at-least-32-chars", Duration::days(30));
        assert_ne!(sessions.issue().unwrap().user_id, sessions.issue().unwrap().user_id);
    }

    #[test]
    fn foreign_or_garbled_tokens_are_unauthorized() {
        let ours = provider("test-secret-key-at-least-32-chars", Duration::days(30));
        let theirs = provider("another-secret-key-at-least-32-ch", Duration::days(30));
        let token = theirs.issue().unwrap().token;

        assert!(matches!(ours.verify(&token), Err(DomainError::Unauthorized)));
        assert!(matches!(ours.verify("invalid.token.here"), Err(DomainError::Unauthorized)));
    }

    #[test]
    fn expired_tokens_are_unauthorized() {
        let sessions = provider("test-secret-key-at-least-32-chars", Duration::hours(-2));
        let token = sessions.issue().unwrap().token;
        assert!(matches!(sessions.verify(&token), Err(DomainError::Unauthorized)));
    }
}
