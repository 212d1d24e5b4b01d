//! Keyed hash for recovery codes.
//!
//! The digest must be deterministic so the store can look a code up by its
//! hash. A server-side pepper keeps a leaked table from being brute-forced
//! offline against the 80-bit code space.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use domains::ports::CodeHasher;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

pub struct HmacCodeHasher {
    keyed: HmacSha256,
}

impl HmacCodeHasher {
    pub fn new(pepper: &SecretString) -> Result<Self, AuthError> {
        let keyed = HmacSha256::new_from_slice(pepper.expose_secret().as_bytes())
            .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
        Ok(Self { keyed })
    }
}

impl CodeHasher for HmacCodeHasher {
    /// Lowercase hex HMAC-SHA256 of the normalised code.
    fn hash(&self, normalized_code: &str) -> String {
        let mut mac = self.keyed.clone();
        mac.update(normalized_code.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
