//! # Report / Moderation Gate
//!
//! Records a report, then asks the configured [`ModerationPolicy`] whether
//! the target should be hidden. Recording the complaint takes priority over
//! the hide: once the report row is stored, a failing evaluation is logged
//! and the caller still gets `submitted: true`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use domains::errors::{DomainError, Result, StoreError, StoreResult};
use domains::models::{ContentStatus, NewReport, TargetType, UserId};
use domains::ports::{Clock, ContentStore};

use crate::trust::{classify, report_weight};

pub const MIN_REASON_CHARS: usize = 8;
pub const MAX_REASON_CHARS: usize = 600;

/// Decides whether the reports gathered against a target warrant hiding it.
#[async_trait]
pub trait ModerationPolicy: Send + Sync {
    async fn should_hide(
        &self,
        content: &dyn ContentStore,
        target_type: TargetType,
        target_id: Uuid,
    ) -> StoreResult<bool>;
}

/// Hide once the raw report count reaches `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct FixedThreshold {
    pub threshold: u64,
}

#[async_trait]
impl ModerationPolicy for FixedThreshold {
    async fn should_hide(
        &self,
        content: &dyn ContentStore,
        target_type: TargetType,
        target_id: Uuid,
    ) -> StoreResult<bool> {
        let reports = content.count_reports(target_type, target_id).await?;
        Ok(reports >= self.threshold)
    }
}

/// Hide once the summed tier weight of all reporters reaches `threshold`.
/// A tier3 reporter counts three times as much as a tier1 reporter.
#[derive(Debug, Clone, Copy)]
pub struct TrustWeighted {
    pub threshold: u64,
}

#[async_trait]
impl ModerationPolicy for TrustWeighted {
    async fn should_hide(
        &self,
        content: &dyn ContentStore,
        target_type: TargetType,
        target_id: Uuid,
    ) -> StoreResult<bool> {
        let weight: u64 = content
            .reporter_trust_scores(target_type, target_id)
            .await?
            .into_iter()
            .map(|score| report_weight(classify(score)))
            .sum();
        Ok(weight >= self.threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    pub submitted: bool,
    pub hidden: bool,
}

/// Trims the reason and checks its length in characters.
pub fn validate_reason(reason: &str) -> Result<String> {
    let trimmed = reason.trim();
    let chars = trimmed.chars().count();
    if !(MIN_REASON_CHARS..=MAX_REASON_CHARS).contains(&chars) {
        return Err(DomainError::InvalidInput(format!(
            "Reason must be between {MIN_REASON_CHARS} and {MAX_REASON_CHARS} characters."
        )));
    }
    Ok(trimmed.to_string())
}

pub struct ReportGate {
    content: Arc<dyn ContentStore>,
    policy: Arc<dyn ModerationPolicy>,
    clock: Arc<dyn Clock>,
}

impl ReportGate {
    pub fn new(
        content: Arc<dyn ContentStore>,
        policy: Arc<dyn ModerationPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            content,
            policy,
            clock,
        }
    }

    pub async fn submit_report(
        &self,
        reporter: UserId,
        target_type: TargetType,
        target_id: Uuid,
        reason: &str,
    ) -> Result<ReportOutcome> {
        let reason = validate_reason(reason)?;

        let report = NewReport {
            reporter_id: reporter,
            target_type,
            target_id,
            reason,
            created_at: self.clock.now(),
        };

        match self.content.insert_report(report).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => return Err(DomainError::AlreadyReported),
            Err(StoreError::NotFound(_)) => return Err(DomainError::NotFound(target_type.as_str())),
            Err(other) => return Err(DomainError::store("report insert")(other)),
        }

        let hidden = match self.evaluate(target_type, target_id).await {
            Ok(hidden) => hidden,
            Err(err) => {
                error!(%target_type, %target_id, error = %err, "moderation evaluation failed; report kept");
                false
            }
        };

        Ok(ReportOutcome {
            submitted: true,
            hidden,
        })
    }

    /// Whether the target is hidden after applying the policy.
    async fn evaluate(&self, target_type: TargetType, target_id: Uuid) -> StoreResult<bool> {
        if self
            .policy
            .should_hide(self.content.as_ref(), target_type, target_id)
            .await?
        {
            if self.content.set_target_hidden(target_type, target_id).await? {
                info!(%target_type, %target_id, "report threshold crossed; target hidden");
            }
            return Ok(true);
        }

        let status = self.content.target_status(target_type, target_id).await?;
        Ok(status == Some(ContentStatus::Hidden))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use domains::errors::ErrorKind;
    use domains::ports::MockContentStore;

    struct StaticClock;

    impl Clock for StaticClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }
    }

    fn gate(store: MockContentStore, threshold: u64) -> ReportGate {
        ReportGate::new(
            Arc::new(store),
            Arc::new(FixedThreshold { threshold }),
            Arc::new(StaticClock),
        )
    }

    #[test]
    fn reason_length_is_inclusive_and_counts_chars() {
        assert!(validate_reason("1234567").is_err());
        assert_eq!(validate_reason("  12345678  ").unwrap(), "12345678");
        assert!(validate_reason(&"x".repeat(600)).is_ok());
        assert!(validate_reason(&"x".repeat(601)).is_err());
        // eight multi-byte characters
        assert!(validate_reason("éééééééé").is_ok());
    }

    #[tokio::test]
    async fn invalid_reason_never_touches_the_store() {
        let mut store = MockContentStore::new();
        store.expect_insert_report().never();

        let err = gate(store, 3)
            .submit_report(UserId::new_v4(), TargetType::Question, Uuid::new_v4(), "short")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn threshold_crossing_hides_target() {
        let mut store = MockContentStore::new();
        store.expect_insert_report().returning(|_| Ok(()));
        store.expect_count_reports().returning(|_, _| Ok(3));
        store
            .expect_set_target_hidden()
            .times(1)
            .returning(|_, _| Ok(true));

        let outcome = gate(store, 3)
            .submit_report(UserId::new_v4(), TargetType::Answer, Uuid::new_v4(), "spam spam spam")
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome { submitted: true, hidden: true });
    }

    #[tokio::test]
    async fn already_hidden_target_stays_hidden_without_error() {
        let mut store = MockContentStore::new();
        store.expect_insert_report().returning(|_| Ok(()));
        store.expect_count_reports().returning(|_, _| Ok(5));
        store.expect_set_target_hidden().returning(|_, _| Ok(false));

        let outcome = gate(store, 3)
            .submit_report(UserId::new_v4(), TargetType::Answer, Uuid::new_v4(), "still offensive")
            .await
            .unwrap();
        assert!(outcome.hidden);
    }

    #[tokio::test]
    async fn below_threshold_reports_current_status() {
        let mut store = MockContentStore::new();
        store.expect_insert_report().returning(|_| Ok(()));
        store.expect_count_reports().returning(|_, _| Ok(1));
        store.expect_set_target_hidden().never();
        store
            .expect_target_status()
            .returning(|_, _| Ok(Some(ContentStatus::Active)));

        let outcome = gate(store, 3)
            .submit_report(UserId::new_v4(), TargetType::Question, Uuid::new_v4(), "off topic post")
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome { submitted: true, hidden: false });
    }

    #[tokio::test]
    async fn evaluation_failure_still_submits() {
        let mut store = MockContentStore::new();
        store.expect_insert_report().times(1).returning(|_| Ok(()));
        store
            .expect_count_reports()
            .returning(|_, _| Err(StoreError::Backend("statement timeout".into())));

        let outcome = gate(store, 3)
            .submit_report(UserId::new_v4(), TargetType::Question, Uuid::new_v4(), "harassment here")
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome { submitted: true, hidden: false });
    }

    #[tokio::test]
    async fn duplicate_is_already_reported() {
        let mut store = MockContentStore::new();
        store
            .expect_insert_report()
            .returning(|_| Err(StoreError::Duplicate("reports_reporter_target_key".into())));
        store.expect_count_reports().never();

        let err = gate(store, 3)
            .submit_report(UserId::new_v4(), TargetType::Question, Uuid::new_v4(), "duplicate report")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyReported);
    }

    #[tokio::test]
    async fn trust_weighted_policy_sums_tier_weights() {
        let mut store = MockContentStore::new();
        // tier3 + tier2 + tier1 = 3 + 2 + 1
        store
            .expect_reporter_trust_scores()
            .returning(|_, _| Ok(vec![9, 3, 0]));

        let target = Uuid::new_v4();
        let hide = TrustWeighted { threshold: 6 }
            .should_hide(&store, TargetType::Question, target)
            .await
            .unwrap();
        assert!(hide);

        let keep = TrustWeighted { threshold: 7 }
            .should_hide(&store, TargetType::Question, target)
            .await
            .unwrap();
        assert!(!keep);
    }
}
