//! # Handlers
//!
//! Thin adapters between HTTP and the [`ActionFacade`]. Every handler
//! resolves the caller, hands the payload over unchanged and wraps the
//! outcome in the envelope. Counters are recorded per action and outcome.
//!
//! [`ActionFacade`]: services::ActionFacade

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use domains::ports::AnonymousSession;
use services::facade::{
    CreateAnswerInput, CreateQuestionInput, CreateReplyInput, CreatedAnswer, CreatedQuestion,
    CreatedReply, Deleted, EditAnswerInput, EditQuestionInput, ProfileReady, RateLimitReport,
    ReportInput, Updated, Verified, VerifyAnswerInput, VoteInput,
};
use services::moderation::ReportOutcome;
use services::recovery::{IssuedCode, RestoredAccount};
use services::votes::VoteOutcome;
use services::{ActionError, ActionResult};

use crate::extract::Caller;
use crate::metrics::Metrics;
use crate::response::{ApiError, Success};
use crate::AppState;

type Reply<T> = Result<Success<T>, ApiError>;

fn respond<T: Serialize>(metrics: &Metrics, action: &'static str, result: ActionResult<T>) -> Reply<T> {
    match result {
        Ok(data) => {
            metrics.record(action, "ok");
            Ok(Success::new(data))
        }
        Err(err) => {
            metrics.record(action, err.kind.as_str());
            Err(ApiError(err))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EditQuestionBody {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct EditAnswerBody {
    pub body: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBody {
    pub question_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RecoverBody {
    pub code: String,
}

/// POST /api/session
pub async fn issue_session(State(state): State<AppState>) -> Reply<AnonymousSession> {
    let result = state.sessions.issue().map_err(ActionError::from);
    respond(&state.metrics, "session", result)
}

/// GET /api/profile-ready
pub async fn profile_ready(State(state): State<AppState>, Caller(caller): Caller) -> Reply<ProfileReady> {
    let result = state.facade.profile_ready(caller).await;
    respond(&state.metrics, "profileReady", result)
}

/// GET /api/rate-limit/{action}
pub async fn rate_limit_check(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(action): Path<String>,
) -> Reply<RateLimitReport> {
    let result = state.facade.rate_limit_check(caller, &action).await;
    respond(&state.metrics, "rateLimitCheck", result)
}

/// POST /api/questions
pub async fn create_question(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<CreateQuestionInput>, JsonRejection>,
) -> Reply<CreatedQuestion> {
    let Json(input) = payload?;
    let result = state.facade.create_question(caller, input).await;
    respond(&state.metrics, "createQuestion", result)
}

/// PATCH /api/questions/{id}
pub async fn edit_question(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(question_id): Path<String>,
    payload: Result<Json<EditQuestionBody>, JsonRejection>,
) -> Reply<Updated> {
    let Json(body) = payload?;
    let input = EditQuestionInput {
        question_id,
        title: body.title,
        body: body.body,
    };
    let result = state.facade.edit_question(caller, input).await;
    respond(&state.metrics, "editQuestion", result)
}

/// DELETE /api/questions/{id}
pub async fn delete_question(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(question_id): Path<String>,
) -> Reply<Deleted> {
    let result = state.facade.delete_question(caller, &question_id).await;
    respond(&state.metrics, "deleteQuestion", result)
}

/// POST /api/answers
pub async fn create_answer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<CreateAnswerInput>, JsonRejection>,
) -> Reply<CreatedAnswer> {
    let Json(input) = payload?;
    let result = state.facade.create_answer(caller, input).await;
    respond(&state.metrics, "createAnswer", result)
}

/// PATCH /api/answers/{id}
pub async fn edit_answer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(answer_id): Path<String>,
    payload: Result<Json<EditAnswerBody>, JsonRejection>,
) -> Reply<Updated> {
    let Json(body) = payload?;
    let input = EditAnswerInput {
        answer_id,
        body: body.body,
    };
    let result = state.facade.edit_answer(caller, input).await;
    respond(&state.metrics, "editAnswer", result)
}

/// DELETE /api/answers/{id}
pub async fn delete_answer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(answer_id): Path<String>,
) -> Reply<Deleted> {
    let result = state.facade.delete_answer(caller, &answer_id).await;
    respond(&state.metrics, "deleteAnswer", result)
}

/// POST /api/answers/{id}/verify
pub async fn verify_answer(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(answer_id): Path<String>,
    payload: Result<Json<VerifyBody>, JsonRejection>,
) -> Reply<Verified> {
    let Json(body) = payload?;
    let input = VerifyAnswerInput {
        answer_id,
        question_id: body.question_id,
    };
    let result = state.facade.verify_answer(caller, input).await;
    respond(&state.metrics, "verifyAnswer", result)
}

/// POST /api/replies
pub async fn create_reply(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<CreateReplyInput>, JsonRejection>,
) -> Reply<CreatedReply> {
    let Json(input) = payload?;
    let result = state.facade.create_reply(caller, input).await;
    respond(&state.metrics, "createReply", result)
}

/// POST /api/votes
pub async fn vote(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<VoteInput>, JsonRejection>,
) -> Reply<VoteOutcome> {
    let Json(input) = payload?;
    let result = state.facade.vote(caller, input).await;
    respond(&state.metrics, "vote", result)
}

/// POST /api/reports
pub async fn report(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<ReportInput>, JsonRejection>,
) -> Reply<ReportOutcome> {
    let Json(input) = payload?;
    let result = state.facade.report(caller, input).await;
    respond(&state.metrics, "report", result)
}

/// POST /api/recovery-code
///
/// The plaintext code appears in this response only.
pub async fn create_recovery_code(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Reply<IssuedCode> {
    let result = state.facade.create_recovery_code(caller).await;
    respond(&state.metrics, "createRecoveryCode", result)
}

/// POST /api/recover
pub async fn recover_account(
    State(state): State<AppState>,
    Caller(caller): Caller,
    payload: Result<Json<RecoverBody>, JsonRejection>,
) -> Reply<RestoredAccount> {
    let Json(body) = payload?;
    let result = state.facade.recover_account(caller, &body.code).await;
    respond(&state.metrics, "recoverAccount", result)
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(_) => ApiError::internal().into_response(),
    }
}
