//! Cron trigger integration tests.

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;

use common::TestHarness;

#[tokio::test]
async fn sweep_without_secret_is_rejected_and_does_not_run() {
    let harness = TestHarness::new();
    let venue_id = harness.register_venue().await;
    harness
        .set_tariff(venue_id, json!({ "tier": "SUPER", "durationDays": 1, "autoRenew": true }))
        .await;
    harness.advance(Duration::days(2));

    let missing = harness.server.post("/internal/cron/tariffs").await;
    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);

    let wrong = harness
        .server
        .post("/internal/cron/tariffs")
        .add_header("authorization", "Bearer not-the-secret".to_string())
        .await;
    assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);

    // The lapsed period is still untouched.
    let history = harness.store_history_len(venue_id).await;
    assert_eq!(history, 2);
}

#[tokio::test]
async fn sweep_returns_summary() {
    let harness = TestHarness::new();
    let renewing = harness.register_venue().await;
    let lapsing = harness.register_venue().await;
    harness
        .set_tariff(renewing, json!({ "tier": "SUPER", "durationDays": 1, "autoRenew": true }))
        .await;
    harness
        .set_tariff(lapsing, json!({ "tier": "MAXIMUM", "durationDays": 1 }))
        .await;
    harness.advance(Duration::days(2));

    let summary = harness.sweep().await;

    assert_eq!(summary["renewed"], 1);
    assert_eq!(summary["gracePeriodStarted"], 1);
    assert_eq!(summary["downgraded"], 0);
    assert!(summary["errors"].as_array().unwrap().is_empty());
    assert!(summary["processed"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn grace_then_downgrade_through_the_api() {
    let harness = TestHarness::new();
    let venue_id = harness.register_venue().await;
    harness
        .set_tariff(venue_id, json!({ "tier": "SUPER", "durationDays": 1 }))
        .await;
    harness.advance(Duration::days(1) + Duration::seconds(1));

    let first = harness.sweep().await;
    assert_eq!(first["gracePeriodStarted"], 1);

    let tokens = harness.login().await;
    let view: serde_json::Value = harness
        .server
        .get(&format!("/v1/venues/{venue_id}/tariff"))
        .add_header("authorization", TestHarness::bearer(&tokens.access))
        .await
        .json();
    assert_eq!(view["tier"], "SUPER");
    assert_eq!(view["status"], "grace_period");
    assert_eq!(view["graceDaysRemaining"], 3);

    harness.advance(Duration::days(3) + Duration::seconds(1));
    let second = harness.sweep().await;
    assert_eq!(second["downgraded"], 1);

    let tokens = harness.login().await;
    let view: serde_json::Value = harness
        .server
        .get(&format!("/v1/venues/{venue_id}/tariff"))
        .add_header("authorization", TestHarness::bearer(&tokens.access))
        .await
        .json();
    assert_eq!(view["tier"], "FREE");
    assert_eq!(view["status"], "free");
    assert!(view["gracePeriodEndsAt"].is_null());
    assert!(view["expiresAt"].is_null());
}

#[tokio::test]
async fn repeated_sweep_is_idempotent() {
    let harness = TestHarness::new();
    let venue_id = harness.register_venue().await;
    harness
        .set_tariff(venue_id, json!({ "tier": "SUPER", "durationDays": 1, "autoRenew": true }))
        .await;
    harness.advance(Duration::days(2));

    let first = harness.sweep().await;
    let ledger_after_first = harness.store_history_len(venue_id).await;
    let second = harness.sweep().await;

    assert_eq!(first["renewed"], 1);
    assert_eq!(second["renewed"], 0);
    assert_eq!(harness.store_history_len(venue_id).await, ledger_after_first);
}

#[tokio::test]
async fn sweep_during_outage_is_503() {
    let harness = TestHarness::new();
    harness.store.set_unavailable(true);

    let response = harness
        .server
        .post("/internal/cron/tariffs")
        .add_header("authorization", harness.cron_auth_header())
        .await;

    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn failing_venue_is_reported_in_a_200_summary() {
    let harness = TestHarness::new();
    let broken = harness.register_venue().await;
    let healthy = harness.register_venue().await;
    for venue_id in [broken, healthy] {
        harness
            .set_tariff(venue_id, json!({ "tier": "SUPER", "durationDays": 1, "autoRenew": true }))
            .await;
    }
    harness.store.fail_venue_writes(broken).await;
    harness.advance(Duration::days(2));

    let summary = harness.sweep().await;

    assert_eq!(summary["renewed"], 1);
    let errors = summary["errors"].as_array().unwrap();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|e| e["venueId"] == broken.to_string()));
    let mut phases: Vec<_> = errors.iter().map(|e| e["phase"].as_str().unwrap()).collect();
    phases.dedup();
    assert_eq!(phases.len(), errors.len());
}

#[tokio::test]
async fn session_cleanup_deletes_expired_sessions() {
    let harness = TestHarness::new();
    let stale = harness.login().await;
    harness.advance(Duration::days(8));
    let fresh = harness.login().await;

    let response = harness
        .server
        .post("/internal/cron/sessions")
        .add_header("authorization", harness.cron_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["deleted"], 1);

    let refreshed = harness
        .server
        .post("/v1/auth/refresh")
        .json(&json!({ "refreshToken": fresh.refresh }))
        .await;
    refreshed.assert_status_ok();

    let rejected = harness
        .server
        .post("/v1/auth/refresh")
        .json(&json!({ "refreshToken": stale.refresh }))
        .await;
    assert_eq!(rejected.status_code(), StatusCode::UNAUTHORIZED);
}
