//! # auth-adapters
//!
//! Recovery-code hashing and anonymous session tokens.

pub mod error;
pub mod hasher;

#[cfg(feature = "auth-jwt")]
pub mod jwt;

pub use error::AuthError;
pub use hasher::HmacCodeHasher;

#[cfg(feature = "auth-jwt")]
pub use jwt::JwtSessionProvider;
