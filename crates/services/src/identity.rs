//! # Identity provisioning
//!
//! The identity row is created lazily on the first action that needs it.
//! Two requests from the same fresh session can race to create it; the
//! loser sees `Duplicate` and simply re-reads the winner's row.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use domains::errors::{DomainError, Result, StoreError};
use domains::models::{NewUser, User, UserId};
use domains::ports::{Clock, IdentityStore};

/// Insert attempts before giving up with `ProfileNotReady`.
pub const MAX_PROVISION_ATTEMPTS: usize = 3;

/// Handle shown next to anonymous posts: `anon_` plus 20 hex chars of the id.
pub fn anon_handle(id: UserId) -> String {
    let simple = id.simple().to_string();
    format!("anon_{}", &simple[..20])
}

/// Stable hue in `0..360` derived from the id.
pub fn color_seed(id: UserId) -> i32 {
    let digest = Sha256::digest(id.as_bytes());
    let value = u16::from_be_bytes([digest[0], digest[1]]);
    i32::from(value % 360)
}

pub struct IdentityProvisioner {
    identities: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
}

impl IdentityProvisioner {
    pub fn new(identities: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>) -> Self {
        Self { identities, clock }
    }

    /// Returns the caller's identity row, creating it on first sight.
    pub async fn ensure_user(&self, id: UserId) -> Result<User> {
        for attempt in 1..=MAX_PROVISION_ATTEMPTS {
            if let Some(user) = self.read(id).await? {
                return Ok(user);
            }

            let new_user = NewUser {
                id,
                anon_handle: anon_handle(id),
                color_seed: color_seed(id),
                created_at: self.clock.now(),
            };

            match self.identities.insert_user(new_user).await {
                Ok(()) => {
                    info!(user = %id, "provisioned anonymous identity");
                }
                Err(StoreError::Duplicate(_)) => {
                    debug!(user = %id, attempt, "identity created concurrently; re-reading");
                }
                Err(StoreError::ForeignKeyNotReady(detail)) => {
                    warn!(user = %id, %detail, "upstream identity not visible yet");
                    return Err(DomainError::ProfileNotReady);
                }
                Err(other) => return Err(DomainError::ProfileInit(other)),
            }

            if let Some(user) = self.read(id).await? {
                return Ok(user);
            }
        }

        warn!(user = %id, attempts = MAX_PROVISION_ATTEMPTS, "identity row still not readable");
        Err(DomainError::ProfileNotReady)
    }

    async fn read(&self, id: UserId) -> Result<Option<User>> {
        self.identities
            .get_user(id)
            .await
            .map_err(DomainError::ProfileInit)
    }
}
