mod common;

use chrono::Duration;

use common::{question, Harness};
use domains::errors::ErrorKind;
use domains::models::RateLimitedAction;

#[tokio::test]
async fn tier_one_gets_three_questions_then_trust_bump_allows_six() {
    let h = Harness::new();
    let user = h.user().await;

    for n in 0..3 {
        h.facade
            .create_question(user, question(&format!("Question {n}")))
            .await
            .unwrap();
    }

    let err = h
        .facade
        .create_question(user, question("One too many"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimited);
    assert_eq!(err.retry_after_seconds, Some(24 * 3600));

    let report = h.facade.rate_limit_check(user, "createQuestion").await.unwrap();
    assert!(!report.allowed);
    assert_eq!(report.remaining, 0);
    assert_eq!(report.limit, 3);

    // Tier 2 takes effect on the next call
    h.store.set_trust_score(user, 2).unwrap();
    for n in 3..6 {
        h.facade
            .create_question(user, question(&format!("Question {n}")))
            .await
            .unwrap();
    }
    let err = h
        .facade
        .create_question(user, question("Seventh"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimited);
}

#[tokio::test]
async fn events_outside_the_window_no_longer_count() {
    let h = Harness::new();
    let user = h.user().await;

    for n in 0..3 {
        h.facade
            .create_question(user, question(&format!("Question {n}")))
            .await
            .unwrap();
    }
    assert!(h.facade.create_question(user, question("Blocked")).await.is_err());

    h.clock.advance(Duration::hours(24) + Duration::seconds(1));

    let report = h.facade.rate_limit_check(user, "createQuestion").await.unwrap();
    assert!(report.allowed);
    assert_eq!(report.remaining, 3);
    h.facade
        .create_question(user, question("Next day"))
        .await
        .unwrap();
}

#[tokio::test]
async fn rate_limit_check_reports_each_action() {
    let h = Harness::new();
    let user = h.user().await;

    for action in RateLimitedAction::ALL {
        let report = h.facade.rate_limit_check(user, action.as_str()).await.unwrap();
        assert_eq!(report.action, action);
        assert!(report.allowed);
        assert_eq!(report.remaining, report.limit);
        assert_eq!(report.retry_after_seconds, 0);
    }

    let err = h.facade.rate_limit_check(user, "upload").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidInput);
}

#[tokio::test]
async fn validation_failures_do_not_consume_allowance() {
    let h = Harness::new();
    let user = h.user().await;

    let mut bad = question("Bad category");
    bad.category = "sports".into();
    for _ in 0..5 {
        let err = h.facade.create_question(user, bad.clone()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    let report = h.facade.rate_limit_check(user, "createQuestion").await.unwrap();
    assert_eq!(report.remaining, 3);
}
