//! # Domain Models
//!
//! These structs represent the core entities of the campus Q&A engine.
//! Identifiers are UUID v4; the anonymous user id is the subject of the
//! caller's session token and is never tied to a personal credential.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque anonymous identity.
pub type UserId = Uuid;

/// Value stored for every vote. The ledger is upvote-only.
pub const VOTE_VALUE: i16 = 1;

/// A stored anonymous identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub anon_handle: String,
    /// Hue in `0..360` used by clients to colour the avatar
    pub color_seed: i32,
    /// Adjusted by external moderation only
    pub trust_score: i32,
    /// HMAC of the normalised recovery code, never the plaintext
    pub recovery_code_hash: Option<String>,
    pub recovery_code_created_at: Option<DateTime<Utc>>,
    /// Set exactly once, when the code is claimed
    pub recovery_code_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Row inserted on first sight of an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: UserId,
    pub anon_handle: String,
    pub color_seed: i32,
    pub created_at: DateTime<Utc>,
}

/// Coarse trust bucket derived from a trust score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    Tier1,
    Tier2,
    Tier3,
}

impl TrustTier {
    pub const ALL: [TrustTier; 3] = [TrustTier::Tier1, TrustTier::Tier2, TrustTier::Tier3];
}

/// Content that can be voted on or reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Question,
    Answer,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Question => "question",
            TargetType::Answer => "answer",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "question" => Ok(TargetType::Question),
            "answer" => Ok(TargetType::Answer),
            _ => Err(()),
        }
    }
}

/// Actions that are subject to trust-tiered rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RateLimitedAction {
    CreateQuestion,
    CreateAnswer,
    Vote,
    Report,
}

impl RateLimitedAction {
    pub const ALL: [RateLimitedAction; 4] = [
        RateLimitedAction::CreateQuestion,
        RateLimitedAction::CreateAnswer,
        RateLimitedAction::Vote,
        RateLimitedAction::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitedAction::CreateQuestion => "createQuestion",
            RateLimitedAction::CreateAnswer => "createAnswer",
            RateLimitedAction::Vote => "vote",
            RateLimitedAction::Report => "report",
        }
    }
}

impl fmt::Display for RateLimitedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitedAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RateLimitedAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionCategory {
    Academic,
    Facilities,
    Policy,
}

impl QuestionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::Academic => "academic",
            QuestionCategory::Facilities => "facilities",
            QuestionCategory::Policy => "policy",
        }
    }
}

impl FromStr for QuestionCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "academic" => Ok(QuestionCategory::Academic),
            "facilities" => Ok(QuestionCategory::Facilities),
            "policy" => Ok(QuestionCategory::Policy),
            _ => Err(()),
        }
    }
}

/// Visibility of a question or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Active,
    Hidden,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Active => "active",
            ContentStatus::Hidden => "hidden",
        }
    }
}

impl FromStr for ContentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ContentStatus::Active),
            "hidden" => Ok(ContentStatus::Hidden),
            _ => Err(()),
        }
    }
}

/// (max count, window) for one action at one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max: u32,
    pub window: chrono::Duration,
}

/// Outcome of a rate-limit evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub retry_after_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion {
    pub id: Uuid,
    pub author_id: UserId,
    pub title: String,
    pub body: String,
    pub category: QuestionCategory,
    pub tags: Vec<String>,
    pub image_paths: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// The slice of a question the engine needs for ownership and visibility checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRecord {
    pub id: Uuid,
    pub author_id: UserId,
    pub status: ContentStatus,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnswer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub author_id: UserId,
    pub body: String,
    pub image_paths: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub id: Uuid,
    pub question_id: Uuid,
    pub author_id: UserId,
    pub status: ContentStatus,
    pub is_verified: bool,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReply {
    pub id: Uuid,
    pub answer_id: Uuid,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A single upvote. Unique per (user, target type, target id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVote {
    pub user_id: UserId,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A complaint about a target. Unique per (reporter, target type, target id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReport {
    pub reporter_id: UserId,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Storage object waiting to be removed after its owning content was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDeletion {
    pub id: i64,
    pub path: String,
}

/// Result of the conditional consume on a recovery code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryConsume {
    /// The code was unconsumed and the owner's identity now lives on the claimant
    Consumed,
    /// Another claim won the check-and-set, or the code was re-issued
    AlreadyConsumed,
    /// The claimant already owns content or ledger rows; nothing was changed
    ClaimantNotEmpty,
}
