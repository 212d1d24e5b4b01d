//! # Action Façade
//!
//! The entry points behind every client action. Each one follows the same
//! shape: validate input → ensure the caller's identity row → enforce the
//! rate limit (mutating actions only) → perform the effect → map the outcome
//! to [`ActionResult`].
//!
//! The caller is always an explicit `UserId`; resolving it from a session is
//! the transport layer's job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use domains::errors::{DomainError, ErrorKind, Result, StoreError};
use domains::models::{
    ContentStatus, NewAnswer, NewQuestion, NewReply, RateLimitedAction, UserId,
};
use domains::ports::{Clock, CodeHasher, ContentStore, EventStore, IdentityStore, MediaStorage};

use crate::content::{
    normalize_image_paths, normalize_tags, parse_category, parse_id, parse_target_type,
    reply_body, required_text,
};
use crate::identity::IdentityProvisioner;
use crate::media::MediaSweeper;
use crate::moderation::{validate_reason, ModerationPolicy, ReportGate, ReportOutcome};
use crate::rate_limit::{RateLimitTable, RateLimiter};
use crate::recovery::{IssuedCode, RecoveryCodeManager, RestoredAccount};
use crate::votes::{VoteLedger, VoteOutcome};

/// Failure half of every action: a machine-readable kind plus a message
/// that is safe to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct ActionError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl From<DomainError> for ActionError {
    fn from(err: DomainError) -> Self {
        let kind = err.kind();
        if kind == ErrorKind::Internal {
            error!(%kind, error = %err, "action failed");
        } else {
            debug!(%kind, error = %err, "action rejected");
        }
        ActionError {
            kind,
            message: err.public_message(),
            retry_after_seconds: err.retry_after_seconds(),
        }
    }
}

pub type ActionResult<T> = std::result::Result<T, ActionError>;

// ── Inputs ──────────────────────────────────────────────────────────────────
// Identifiers and enums arrive as strings so malformed values surface as
// `invalid-input` instead of a transport-level rejection.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionInput {
    pub title: String,
    pub body: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnswerInput {
    pub question_id: String,
    pub body: String,
    #[serde(default)]
    pub image_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteInput {
    pub target_type: String,
    pub target_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInput {
    pub target_type: String,
    pub target_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReplyInput {
    pub answer_id: String,
    pub question_id: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAnswerInput {
    pub answer_id: String,
    pub question_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditQuestionInput {
    pub question_id: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAnswerInput {
    pub answer_id: String,
    pub body: String,
}

// ── Outputs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedQuestion {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAnswer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedReply {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitReport {
    pub action: RateLimitedAction,
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub retry_after_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfileReady {
    pub ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verified {
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Updated {
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

/// Everything the façade needs from the outside world.
pub struct FacadePorts {
    pub identities: Arc<dyn IdentityStore>,
    pub events: Arc<dyn EventStore>,
    pub content: Arc<dyn ContentStore>,
    pub media: Arc<dyn MediaStorage>,
    pub hasher: Arc<dyn CodeHasher>,
    pub policy: Arc<dyn ModerationPolicy>,
    pub clock: Arc<dyn Clock>,
    pub rate_limits: RateLimitTable,
    pub sweep_batch: u32,
}

pub struct ActionFacade {
    provisioner: IdentityProvisioner,
    limiter: RateLimiter,
    votes: VoteLedger,
    reports: ReportGate,
    recovery: RecoveryCodeManager,
    sweeper: Arc<MediaSweeper>,
    content: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
}

/// Store failures on content inserts: a missing author row means the
/// identity is still provisioning upstream.
fn insert_error(context: &'static str) -> impl FnOnce(StoreError) -> DomainError {
    move |err| match err {
        StoreError::ForeignKeyNotReady(_) => DomainError::ProfileNotReady,
        other => DomainError::Store {
            context,
            source: other,
        },
    }
}

impl ActionFacade {
    pub fn new(ports: FacadePorts) -> Self {
        let FacadePorts {
            identities,
            events,
            content,
            media,
            hasher,
            policy,
            clock,
            rate_limits,
            sweep_batch,
        } = ports;

        Self {
            provisioner: IdentityProvisioner::new(identities.clone(), clock.clone()),
            limiter: RateLimiter::new(identities.clone(), events, clock.clone(), rate_limits),
            votes: VoteLedger::new(content.clone(), clock.clone()),
            reports: ReportGate::new(content.clone(), policy, clock.clone()),
            recovery: RecoveryCodeManager::new(identities, hasher, clock.clone()),
            sweeper: Arc::new(MediaSweeper::new(
                content.clone(),
                media,
                clock.clone(),
                sweep_batch,
            )),
            content,
            clock,
        }
    }

    /// Shared with the periodic sweep task.
    pub fn media_sweeper(&self) -> Arc<MediaSweeper> {
        self.sweeper.clone()
    }

    #[instrument(skip(self))]
    pub async fn profile_ready(&self, caller: UserId) -> ActionResult<ProfileReady> {
        self.provisioner.ensure_user(caller).await?;
        Ok(ProfileReady { ready: true })
    }

    #[instrument(skip(self))]
    pub async fn rate_limit_check(&self, caller: UserId, action: &str) -> ActionResult<RateLimitReport> {
        let action: RateLimitedAction = action
            .trim()
            .parse()
            .map_err(|_| DomainError::InvalidInput("Invalid action.".into()))?;

        self.provisioner.ensure_user(caller).await?;
        let state = self.limiter.evaluate(caller, action).await?;

        Ok(RateLimitReport {
            action,
            allowed: state.allowed,
            remaining: state.remaining,
            limit: state.limit,
            retry_after_seconds: state.retry_after_seconds,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn create_question(
        &self,
        caller: UserId,
        input: CreateQuestionInput,
    ) -> ActionResult<CreatedQuestion> {
        Ok(self.create_question_inner(caller, input).await?)
    }

    async fn create_question_inner(
        &self,
        caller: UserId,
        input: CreateQuestionInput,
    ) -> Result<CreatedQuestion> {
        let title = required_text(&input.title, "Title")?;
        let body = required_text(&input.body, "Body")?;
        let category = parse_category(&input.category)?;
        let tags = normalize_tags(&input.tags);
        let image_paths = normalize_image_paths(&input.image_paths)?;

        self.provisioner.ensure_user(caller).await?;
        self.limiter
            .enforce(caller, RateLimitedAction::CreateQuestion)
            .await?;

        let question = NewQuestion {
            id: Uuid::new_v4(),
            author_id: caller,
            title,
            body,
            category,
            tags,
            image_paths,
            created_at: self.clock.now(),
        };
        let created = CreatedQuestion {
            id: question.id,
            created_at: question.created_at,
        };

        self.content
            .insert_question(question)
            .await
            .map_err(insert_error("question insert"))?;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn create_answer(
        &self,
        caller: UserId,
        input: CreateAnswerInput,
    ) -> ActionResult<CreatedAnswer> {
        Ok(self.create_answer_inner(caller, input).await?)
    }

    async fn create_answer_inner(
        &self,
        caller: UserId,
        input: CreateAnswerInput,
    ) -> Result<CreatedAnswer> {
        let question_id = parse_id(&input.question_id, "question")?;
        let body = required_text(&input.body, "Answer body")?;
        let image_paths = normalize_image_paths(&input.image_paths)?;

        self.provisioner.ensure_user(caller).await?;
        self.limiter
            .enforce(caller, RateLimitedAction::CreateAnswer)
            .await?;

        let question = self
            .content
            .get_question(question_id)
            .await
            .map_err(DomainError::store("question lookup"))?
            .ok_or(DomainError::NotFound("question"))?;
        if question.status != ContentStatus::Active {
            return Err(DomainError::QuestionHidden);
        }

        let answer = NewAnswer {
            id: Uuid::new_v4(),
            question_id,
            author_id: caller,
            body,
            image_paths,
            created_at: self.clock.now(),
        };
        let created = CreatedAnswer {
            id: answer.id,
            question_id,
            created_at: answer.created_at,
        };

        self.content.insert_answer(answer).await.map_err(|err| match err {
            StoreError::NotFound(_) => DomainError::NotFound("question"),
            other => insert_error("answer insert")(other),
        })?;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn create_reply(
        &self,
        caller: UserId,
        input: CreateReplyInput,
    ) -> ActionResult<CreatedReply> {
        Ok(self.create_reply_inner(caller, input).await?)
    }

    async fn create_reply_inner(&self, caller: UserId, input: CreateReplyInput) -> Result<CreatedReply> {
        let answer_id = parse_id(&input.answer_id, "answer")?;
        let question_id = parse_id(&input.question_id, "question")?;
        let body = reply_body(&input.body)?;

        self.provisioner.ensure_user(caller).await?;
        self.limiter
            .enforce(caller, RateLimitedAction::CreateAnswer)
            .await?;

        self.content
            .get_answer(answer_id)
            .await
            .map_err(DomainError::store("answer lookup"))?
            .filter(|answer| answer.question_id == question_id)
            .ok_or(DomainError::NotFound("answer"))?;

        let reply = NewReply {
            id: Uuid::new_v4(),
            answer_id,
            author_id: caller,
            body,
            created_at: self.clock.now(),
        };
        let created = CreatedReply {
            id: reply.id,
            created_at: reply.created_at,
        };

        self.content.insert_reply(reply).await.map_err(|err| match err {
            StoreError::NotFound(_) => DomainError::NotFound("answer"),
            other => insert_error("reply insert")(other),
        })?;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn vote(&self, caller: UserId, input: VoteInput) -> ActionResult<VoteOutcome> {
        Ok(self.vote_inner(caller, input).await?)
    }

    async fn vote_inner(&self, caller: UserId, input: VoteInput) -> Result<VoteOutcome> {
        let target_type = parse_target_type(&input.target_type)?;
        let target_id = parse_id(&input.target_id, "target")?;

        self.provisioner.ensure_user(caller).await?;
        self.limiter.enforce(caller, RateLimitedAction::Vote).await?;

        self.votes.cast_vote(caller, target_type, target_id).await
    }

    #[instrument(skip(self, input))]
    pub async fn report(&self, caller: UserId, input: ReportInput) -> ActionResult<ReportOutcome> {
        Ok(self.report_inner(caller, input).await?)
    }

    async fn report_inner(&self, caller: UserId, input: ReportInput) -> Result<ReportOutcome> {
        let target_type = parse_target_type(&input.target_type)?;
        let target_id = parse_id(&input.target_id, "target")?;
        let reason = validate_reason(&input.reason)?;

        self.provisioner.ensure_user(caller).await?;
        self.limiter.enforce(caller, RateLimitedAction::Report).await?;

        let outcome = self
            .reports
            .submit_report(caller, target_type, target_id, &reason)
            .await?;
        self.sweeper.sweep_best_effort().await;
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn create_recovery_code(&self, caller: UserId) -> ActionResult<IssuedCode> {
        self.provisioner.ensure_user(caller).await?;
        Ok(self.recovery.issue(caller).await?)
    }

    #[instrument(skip(self, code))]
    pub async fn recover_account(&self, caller: UserId, code: &str) -> ActionResult<RestoredAccount> {
        if code.trim().is_empty() {
            return Err(DomainError::InvalidInput("Recovery code is required.".into()).into());
        }
        self.provisioner.ensure_user(caller).await?;
        Ok(self.recovery.claim(caller, code).await?)
    }

    #[instrument(skip(self, input))]
    pub async fn verify_answer(&self, caller: UserId, input: VerifyAnswerInput) -> ActionResult<Verified> {
        Ok(self.verify_answer_inner(caller, input).await?)
    }

    async fn verify_answer_inner(&self, caller: UserId, input: VerifyAnswerInput) -> Result<Verified> {
        let answer_id = parse_id(&input.answer_id, "answer")?;
        let question_id = parse_id(&input.question_id, "question")?;

        self.provisioner.ensure_user(caller).await?;

        let question = self
            .content
            .get_question(question_id)
            .await
            .map_err(DomainError::store("question lookup"))?
            .ok_or(DomainError::NotFound("question"))?;
        if question.author_id != caller {
            return Err(DomainError::Forbidden(
                "Only the question author can verify answers.".into(),
            ));
        }

        let answer = self
            .content
            .get_answer(answer_id)
            .await
            .map_err(DomainError::store("answer lookup"))?
            .filter(|answer| answer.question_id == question_id)
            .ok_or(DomainError::NotFound("answer"))?;

        let verified = !answer.is_verified;
        self.content
            .set_answer_verified(answer_id, verified)
            .await
            .map_err(DomainError::store("answer verify"))?;
        Ok(Verified { verified })
    }

    #[instrument(skip(self, input))]
    pub async fn edit_question(&self, caller: UserId, input: EditQuestionInput) -> ActionResult<Updated> {
        Ok(self.edit_question_inner(caller, input).await?)
    }

    async fn edit_question_inner(&self, caller: UserId, input: EditQuestionInput) -> Result<Updated> {
        let question_id = parse_id(&input.question_id, "question")?;
        let title = required_text(&input.title, "Title")?;
        let body = required_text(&input.body, "Body")?;

        self.provisioner.ensure_user(caller).await?;
        self.owned_question(caller, question_id, "edit").await?;

        let updated_at = self.clock.now();
        self.content
            .update_question(question_id, title, body, updated_at)
            .await
            .map_err(DomainError::store("question update"))?;
        Ok(Updated { updated_at })
    }

    #[instrument(skip(self, input))]
    pub async fn edit_answer(&self, caller: UserId, input: EditAnswerInput) -> ActionResult<Updated> {
        Ok(self.edit_answer_inner(caller, input).await?)
    }

    async fn edit_answer_inner(&self, caller: UserId, input: EditAnswerInput) -> Result<Updated> {
        let answer_id = parse_id(&input.answer_id, "answer")?;
        let body = required_text(&input.body, "Body")?;

        self.provisioner.ensure_user(caller).await?;
        self.owned_answer(caller, answer_id, "edit").await?;

        let updated_at = self.clock.now();
        self.content
            .update_answer(answer_id, body, updated_at)
            .await
            .map_err(DomainError::store("answer update"))?;
        Ok(Updated { updated_at })
    }

    #[instrument(skip(self))]
    pub async fn delete_question(&self, caller: UserId, question_id: &str) -> ActionResult<Deleted> {
        Ok(self.delete_question_inner(caller, question_id).await?)
    }

    async fn delete_question_inner(&self, caller: UserId, question_id: &str) -> Result<Deleted> {
        let question_id = parse_id(question_id, "question")?;

        self.provisioner.ensure_user(caller).await?;
        self.owned_question(caller, question_id, "delete").await?;

        self.content
            .delete_question(question_id)
            .await
            .map_err(DomainError::store("question delete"))?;
        self.sweeper.sweep_best_effort().await;
        Ok(Deleted { deleted: true })
    }

    #[instrument(skip(self))]
    pub async fn delete_answer(&self, caller: UserId, answer_id: &str) -> ActionResult<Deleted> {
        Ok(self.delete_answer_inner(caller, answer_id).await?)
    }

    async fn delete_answer_inner(&self, caller: UserId, answer_id: &str) -> Result<Deleted> {
        let answer_id = parse_id(answer_id, "answer")?;

        self.provisioner.ensure_user(caller).await?;
        self.owned_answer(caller, answer_id, "delete").await?;

        self.content
            .delete_answer(answer_id)
            .await
            .map_err(DomainError::store("answer delete"))?;
        self.sweeper.sweep_best_effort().await;
        Ok(Deleted { deleted: true })
    }

    async fn owned_question(&self, caller: UserId, id: Uuid, verb: &str) -> Result<()> {
        let question = self
            .content
            .get_question(id)
            .await
            .map_err(DomainError::store("question lookup"))?
            .ok_or(DomainError::NotFound("question"))?;
        if question.author_id != caller {
            return Err(DomainError::Forbidden(format!(
                "You can only {verb} your own questions."
            )));
        }
        Ok(())
    }

    async fn owned_answer(&self, caller: UserId, id: Uuid, verb: &str) -> Result<()> {
        let answer = self
            .content
            .get_answer(id)
            .await
            .map_err(DomainError::store("answer lookup"))?
            .ok_or(DomainError::NotFound("answer"))?;
        if answer.author_id != caller {
            return Err(DomainError::Forbidden(format!(
                "You can only {verb} your own answers."
            )));
        }
        Ok(())
    }
}
