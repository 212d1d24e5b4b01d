//! # Rate Limiter
//!
//! Stateless policy over counts fetched from the store. Every decision
//! re-reads the trust score and the event count; nothing is cached between
//! requests, so a trust bump takes effect on the very next call.
//!
//! `retry_after_seconds` reports the whole window rather than the time until
//! the oldest event expires.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, warn};

use domains::errors::{DomainError, Result, StoreError};
use domains::models::{RateLimitRule, RateLimitState, RateLimitedAction, TrustTier, UserId};
use domains::ports::{Clock, EventStore, IdentityStore};

use crate::trust::classify;

/// (tier, action) → rule lookup.
#[derive(Debug, Clone)]
pub struct RateLimitTable {
    rules: HashMap<(TrustTier, RateLimitedAction), RateLimitRule>,
}

impl Default for RateLimitTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl RateLimitTable {
    /// The production limits.
    pub fn standard() -> Self {
        let day = Duration::hours(24);
        let hour = Duration::hours(1);
        let rows: [(RateLimitedAction, [u32; 3], Duration); 4] = [
            (RateLimitedAction::CreateQuestion, [3, 6, 12], day),
            (RateLimitedAction::CreateAnswer, [15, 30, 60], day),
            (RateLimitedAction::Vote, [80, 150, 300], hour),
            (RateLimitedAction::Report, [12, 24, 48], day),
        ];

        let mut rules = HashMap::new();
        for (action, maxima, window) in rows {
            for (tier, max) in TrustTier::ALL.into_iter().zip(maxima) {
                rules.insert((tier, action), RateLimitRule { max, window });
            }
        }
        Self { rules }
    }

    pub fn rule(&self, tier: TrustTier, action: RateLimitedAction) -> RateLimitRule {
        // Every (tier, action) pair is populated by `standard()`.
        self.rules
            .get(&(tier, action))
            .copied()
            .unwrap_or(RateLimitRule {
                max: 0,
                window: Duration::hours(24),
            })
    }
}

/// Applies a rule to the number of events already in the window.
pub fn state_for(rule: RateLimitRule, used: u64) -> RateLimitState {
    let max = u64::from(rule.max);
    let allowed = used < max;
    let remaining = u32::try_from(max.saturating_sub(used)).unwrap_or(u32::MAX);
    let window_ms = u64::try_from(rule.window.num_milliseconds()).unwrap_or(0);

    RateLimitState {
        allowed,
        limit: rule.max,
        remaining,
        retry_after_seconds: if allowed { 0 } else { window_ms.div_ceil(1000) },
    }
}

pub struct RateLimiter {
    identities: Arc<dyn IdentityStore>,
    events: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    table: RateLimitTable,
}

impl RateLimiter {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        events: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        table: RateLimitTable,
    ) -> Self {
        Self {
            identities,
            events,
            clock,
            table,
        }
    }

    /// Computes the current allowance. Any lookup failure is an error,
    /// never an implicit "allowed".
    pub async fn evaluate(&self, user: UserId, action: RateLimitedAction) -> Result<RateLimitState> {
        let trust_score = self
            .identities
            .get_user(user)
            .await
            .map_err(DomainError::RateLimitEvaluation)?
            .ok_or_else(|| DomainError::RateLimitEvaluation(StoreError::NotFound("user".into())))?
            .trust_score;

        let tier = classify(trust_score);
        let rule = self.table.rule(tier, action);
        let since = self.clock.now() - rule.window;

        let used = self
            .events
            .count_events(action, user, since)
            .await
            .map_err(DomainError::RateLimitEvaluation)?;

        let state = state_for(rule, used);
        debug!(%user, %action, ?tier, used, limit = state.limit, allowed = state.allowed, "rate limit evaluated");
        Ok(state)
    }

    /// Rejects with `DomainError::RateLimited` when the allowance is spent.
    pub async fn enforce(&self, user: UserId, action: RateLimitedAction) -> Result<RateLimitState> {
        let state = self.evaluate(user, action).await?;
        if !state.allowed {
            warn!(%user, %action, limit = state.limit, "rate limit exceeded");
            return Err(DomainError::RateLimited {
                action,
                retry_after_seconds: state.retry_after_seconds,
            });
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use domains::errors::ErrorKind;
    use domains::models::User;
    use domains::ports::{MockEventStore, MockIdentityStore};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn user(id: UserId, trust_score: i32) -> User {
        User {
            id,
            anon_handle: "anon_test".into(),
            color_seed: 42,
            trust_score,
            recovery_code_hash: None,
            recovery_code_created_at: None,
            recovery_code_used_at: None,
            created_at: now(),
        }
    }

    fn limiter(identities: MockIdentityStore, events: MockEventStore) -> RateLimiter {
        RateLimiter::new(
            Arc::new(identities),
            Arc::new(events),
            Arc::new(FixedClock(now())),
            RateLimitTable::standard(),
        )
    }

    #[test]
    fn higher_tiers_never_get_stricter_limits() {
        let table = RateLimitTable::standard();
        for action in RateLimitedAction::ALL {
            let maxima: Vec<u32> = TrustTier::ALL
                .into_iter()
                .map(|tier| table.rule(tier, action).max)
                .collect();
            assert!(maxima.windows(2).all(|pair| pair[0] <= pair[1]), "{action}: {maxima:?}");
        }
    }

    #[test]
    fn standard_table_matches_published_limits() {
        let table = RateLimitTable::standard();
        let vote = table.rule(TrustTier::Tier2, RateLimitedAction::Vote);
        assert_eq!(vote.max, 150);
        assert_eq!(vote.window, Duration::hours(1));
        assert_eq!(table.rule(TrustTier::Tier3, RateLimitedAction::CreateQuestion).max, 12);
        assert_eq!(table.rule(TrustTier::Tier1, RateLimitedAction::Report).max, 12);
    }

    #[test]
    fn boundary_at_max() {
        let rule = RateLimitRule {
            max: 3,
            window: Duration::hours(24),
        };

        let under = state_for(rule, 2);
        assert!(under.allowed);
        assert_eq!(under.remaining, 1);
        assert_eq!(under.retry_after_seconds, 0);

        let at = state_for(rule, 3);
        assert!(!at.allowed);
        assert_eq!(at.remaining, 0);
        assert_eq!(at.retry_after_seconds, 86_400);

        let over = state_for(rule, 9);
        assert_eq!(over.remaining, 0);
    }

    #[tokio::test]
    async fn counts_from_start_of_window() {
        let id = UserId::new_v4();
        let mut identities = MockIdentityStore::new();
        identities
            .expect_get_user()
            .returning(move |_| Ok(Some(user(id, 0))));

        let mut events = MockEventStore::new();
        events
            .expect_count_events()
            .withf(move |action, uid, since| {
                *action == RateLimitedAction::Vote
                    && *uid == id
                    && *since == now() - Duration::hours(1)
            })
            .times(1)
            .returning(|_, _, _| Ok(79));

        let state = limiter(identities, events)
            .evaluate(id, RateLimitedAction::Vote)
            .await
            .unwrap();
        assert!(state.allowed);
        assert_eq!(state.limit, 80);
        assert_eq!(state.remaining, 1);
    }

    #[tokio::test]
    async fn trust_lookup_failure_fails_closed() {
        let mut identities = MockIdentityStore::new();
        identities
            .expect_get_user()
            .returning(|_| Err(StoreError::Backend("connection reset".into())));
        let mut events = MockEventStore::new();
        events.expect_count_events().never();

        let err = limiter(identities, events)
            .enforce(UserId::new_v4(), RateLimitedAction::CreateQuestion)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::RateLimitEvaluation(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn count_failure_fails_closed() {
        let id = UserId::new_v4();
        let mut identities = MockIdentityStore::new();
        identities
            .expect_get_user()
            .returning(move |_| Ok(Some(user(id, 7))));
        let mut events = MockEventStore::new();
        events
            .expect_count_events()
            .returning(|_, _, _| Err(StoreError::Backend("timeout".into())));

        let err = limiter(identities, events)
            .evaluate(id, RateLimitedAction::Report)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::RateLimitEvaluation(_)));
    }

    #[tokio::test]
    async fn enforce_rejects_spent_allowance() {
        let id = UserId::new_v4();
        let mut identities = MockIdentityStore::new();
        identities
            .expect_get_user()
            .returning(move |_| Ok(Some(user(id, 3))));
        let mut events = MockEventStore::new();
        events.expect_count_events().returning(|_, _, _| Ok(6));

        let err = limiter(identities, events)
            .enforce(id, RateLimitedAction::CreateQuestion)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after_seconds(), Some(86_400));
    }
}
