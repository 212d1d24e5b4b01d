//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be used by the binary.
//! The services crate only ever talks to storage, hashing and sessions
//! through them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::{DomainError, StoreResult};
use crate::models::{
    AnswerRecord, ContentStatus, MediaDeletion, NewAnswer, NewQuestion, NewReply, NewReport,
    NewUser, NewVote, QuestionRecord, RateLimitedAction, RecoveryConsume, TargetType, User, UserId,
};

/// Durable table of anonymous identities.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_user(&self, id: UserId) -> StoreResult<Option<User>>;

    /// Fails with `Duplicate` when the row already exists and with
    /// `ForeignKeyNotReady` when the upstream identity is not visible yet.
    async fn insert_user(&self, user: NewUser) -> StoreResult<()>;

    /// Overwrites any previous hash and clears the consumed timestamp.
    async fn update_recovery_hash(
        &self,
        id: UserId,
        hash: String,
        issued_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Only matches codes whose consumed timestamp is still null.
    async fn find_user_by_recovery_hash(&self, hash: &str) -> StoreResult<Option<UserId>>;

    /// Check-and-set on the consumed timestamp of `owner`, guarded by `hash`.
    /// The claimant must own no questions, answers, replies, votes or reports
    /// at the moment of the swap, checked inside the same atomic section.
    /// On success the owner's content, trust score and handle move onto
    /// `claimant` in the same transaction.
    async fn consume_recovery_code(
        &self,
        owner: UserId,
        hash: &str,
        claimant: UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<RecoveryConsume>;
}

/// Source of per-user event counts for rate limiting.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn count_events(
        &self,
        action: RateLimitedAction,
        user: UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<u64>;
}

/// Questions, answers, replies, votes, reports and the media deletion queue.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    // Question Operations
    async fn insert_question(&self, question: NewQuestion) -> StoreResult<()>;
    async fn get_question(&self, id: Uuid) -> StoreResult<Option<QuestionRecord>>;
    async fn update_question(
        &self,
        id: Uuid,
        title: String,
        body: String,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
    /// Enqueues the question's and its answers' image paths for deletion.
    async fn delete_question(&self, id: Uuid) -> StoreResult<()>;

    // Answer Operations
    /// Fails with `NotFound` when the question does not exist.
    async fn insert_answer(&self, answer: NewAnswer) -> StoreResult<()>;
    async fn get_answer(&self, id: Uuid) -> StoreResult<Option<AnswerRecord>>;
    async fn update_answer(&self, id: Uuid, body: String, at: DateTime<Utc>) -> StoreResult<()>;
    async fn delete_answer(&self, id: Uuid) -> StoreResult<()>;
    async fn set_answer_verified(&self, id: Uuid, verified: bool) -> StoreResult<()>;
    async fn insert_reply(&self, reply: NewReply) -> StoreResult<()>;

    // Vote Operations
    /// Inserts the vote and bumps the target's score atomically.
    /// `Duplicate` on a repeat vote, `NotFound` for an unknown target.
    async fn insert_vote(&self, vote: NewVote) -> StoreResult<()>;
    async fn read_target_score(&self, target: TargetType, id: Uuid) -> StoreResult<Option<i64>>;

    // Report Operations
    /// `Duplicate` on a repeat report, `NotFound` for an unknown target.
    async fn insert_report(&self, report: NewReport) -> StoreResult<()>;
    async fn count_reports(&self, target: TargetType, id: Uuid) -> StoreResult<u64>;
    /// Current trust score of every reporter of the target.
    async fn reporter_trust_scores(&self, target: TargetType, id: Uuid) -> StoreResult<Vec<i32>>;
    async fn target_status(
        &self,
        target: TargetType,
        id: Uuid,
    ) -> StoreResult<Option<ContentStatus>>;
    /// Returns `true` only when this call flipped the target from active to hidden.
    async fn set_target_hidden(&self, target: TargetType, id: Uuid) -> StoreResult<bool>;

    // Media deletion queue
    async fn pending_media_deletions(&self, limit: u32) -> StoreResult<Vec<MediaDeletion>>;
    async fn mark_media_deletions_processed(
        &self,
        ids: Vec<i64>,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

/// Object storage holding uploaded images.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Removes the objects. Missing objects are not an error.
    async fn remove(&self, paths: Vec<String>) -> StoreResult<()>;
}

/// One-way, deterministic hash for normalised recovery codes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait CodeHasher: Send + Sync {
    fn hash(&self, normalized_code: &str) -> String;
}

/// A freshly granted anonymous identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymousSession {
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Grants anonymous identities and resolves bearer tokens back to them.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SessionProvider: Send + Sync {
    fn issue(&self) -> Result<AnonymousSession, DomainError>;

    /// `DomainError::Unauthorized` for any invalid or expired token.
    fn verify(&self, token: &str) -> Result<UserId, DomainError>;
}

/// Time source, injectable so windows can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
