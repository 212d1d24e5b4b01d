//! # Vote Ledger Guard
//!
//! At most one upvote per (user, target). Idempotence comes from the store's
//! uniqueness constraint: a repeat vote is rejected, never re-applied.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use domains::errors::{DomainError, Result, StoreError};
use domains::models::{NewVote, TargetType, UserId};
use domains::ports::{Clock, ContentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub applied: bool,
    pub score: i64,
}

pub struct VoteLedger {
    content: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
}

impl VoteLedger {
    pub fn new(content: Arc<dyn ContentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { content, clock }
    }

    pub async fn cast_vote(
        &self,
        user: UserId,
        target_type: TargetType,
        target_id: Uuid,
    ) -> Result<VoteOutcome> {
        let vote = NewVote {
            user_id: user,
            target_type,
            target_id,
            created_at: self.clock.now(),
        };

        match self.content.insert_vote(vote).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                debug!(%user, %target_type, %target_id, "repeat vote rejected");
                return Err(DomainError::AlreadyVoted);
            }
            Err(StoreError::NotFound(_)) => return Err(DomainError::NotFound(target_type.as_str())),
            Err(other) => return Err(DomainError::store("vote insert")(other)),
        }

        // insert_vote commits the counter update before returning, so this
        // read observes our own vote.
        let score = self
            .content
            .read_target_score(target_type, target_id)
            .await
            .map_err(|err| {
                error!(%target_type, %target_id, error = %err, "vote read-back failed");
                DomainError::store("vote read-back")(err)
            })?
            .ok_or(DomainError::NotFound(target_type.as_str()))?;

        Ok(VoteOutcome {
            applied: true,
            score,
        })
    }
}
