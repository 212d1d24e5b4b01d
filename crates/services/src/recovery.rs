//! # Recovery Code Manager
//!
//! `no-code → code-issued → code-consumed`.
//!
//! The plaintext code leaves this module exactly once, in the return value
//! of [`RecoveryCodeManager::issue`]. Only its hash is persisted. Claiming
//! is a check-and-set on the consumed timestamp performed by the store, so
//! of two concurrent claims exactly one wins. The store also refuses the
//! swap when the claimant has activity, under the same guard.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use zeroize::Zeroize;

use domains::errors::{DomainError, Result};
use domains::models::{RecoveryConsume, UserId};
use domains::ports::{Clock, CodeHasher, IdentityStore};

/// Random bytes behind each code (80 bits).
pub const CODE_BYTES: usize = 10;
/// Characters per hyphen-separated group.
pub const GROUP_LEN: usize = 5;
/// Characters in a normalised code.
pub const CODE_LEN: usize = CODE_BYTES * 2;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedCode {
    pub code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredAccount {
    pub restored_at: DateTime<Utc>,
    #[serde(skip)]
    pub previous_user: UserId,
}

/// `AAAAA-BBBBB-CCCCC-DDDDD` from 10 bytes of OS entropy.
pub fn generate_code() -> Result<String> {
    let mut raw = [0u8; CODE_BYTES];
    getrandom::getrandom(&mut raw)
        .map_err(|err| DomainError::Internal(format!("entropy source unavailable: {err}")))?;

    let mut encoded = hex::encode_upper(raw);
    raw.zeroize();

    let grouped = group(&encoded);
    encoded.zeroize();
    Ok(grouped)
}

fn group(normalized: &str) -> String {
    normalized
        .as_bytes()
        .chunks(GROUP_LEN)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// Uppercases and strips separators and whitespace. Anything left that is
/// not ASCII alphanumeric, or a wrong length, is not a code.
pub fn normalize_code(submitted: &str) -> Result<String> {
    let normalized: String = submitted
        .chars()
        .filter(|c| !(c.is_whitespace() || *c == '-' || *c == '_'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if normalized.len() != CODE_LEN || !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(DomainError::InvalidRecoveryCode);
    }
    Ok(normalized)
}

pub struct RecoveryCodeManager {
    identities: Arc<dyn IdentityStore>,
    hasher: Arc<dyn CodeHasher>,
    clock: Arc<dyn Clock>,
}

impl RecoveryCodeManager {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        hasher: Arc<dyn CodeHasher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identities,
            hasher,
            clock,
        }
    }

    /// Issues a fresh code for `user`, invalidating any previous one.
    pub async fn issue(&self, user: UserId) -> Result<IssuedCode> {
        let code = generate_code()?;
        let created_at = self.clock.now();
        self.store_code(user, &code, created_at).await?;
        info!(%user, "recovery code issued");
        Ok(IssuedCode { code, created_at })
    }

    /// Persists the hash of an already generated code.
    pub async fn store_code(&self, user: UserId, code: &str, issued_at: DateTime<Utc>) -> Result<()> {
        let hash = self.hasher.hash(&normalize_code(code)?);
        self.identities
            .update_recovery_hash(user, hash, issued_at)
            .await
            .map_err(DomainError::store("recovery code update"))
    }

    /// Moves the identity that issued `submitted` onto `claimant`.
    pub async fn claim(&self, claimant: UserId, submitted: &str) -> Result<RestoredAccount> {
        let hash = self.hasher.hash(&normalize_code(submitted)?);

        let owner = self
            .identities
            .find_user_by_recovery_hash(&hash)
            .await
            .map_err(DomainError::store("recovery code lookup"))?
            .ok_or(DomainError::InvalidRecoveryCode)?;

        if owner == claimant {
            return Err(DomainError::RecoveryNoOp);
        }

        let restored_at = self.clock.now();
        match self
            .identities
            .consume_recovery_code(owner, &hash, claimant, restored_at)
            .await
            .map_err(DomainError::store("recovery code consume"))?
        {
            RecoveryConsume::Consumed => {
                info!(%owner, %claimant, "identity restored from recovery code");
                Ok(RestoredAccount {
                    restored_at,
                    previous_user: owner,
                })
            }
            RecoveryConsume::AlreadyConsumed => Err(DomainError::InvalidRecoveryCode),
            RecoveryConsume::ClaimantNotEmpty => {
                warn!(%claimant, "recovery refused; current identity has activity");
                Err(DomainError::CurrentAccountNotEmpty)
            }
        }
    }
}
