//! Venue tariff integration tests.

mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use kidsguide_core::VenueId;
use common::TestHarness;

fn timestamp(value: &serde_json::Value) -> DateTime<Utc> {
    value.as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn tariff_requires_a_session() {
    let harness = TestHarness::new();
    let venue_id = VenueId::generate();

    let response = harness.server.get(&format!("/v1/venues/{venue_id}/tariff")).await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_venue_reads_as_free() {
    let harness = TestHarness::new();
    let tokens = harness.login().await;
    let venue_id = VenueId::generate();

    let response = harness
        .server
        .get(&format!("/v1/venues/{venue_id}/tariff"))
        .add_header("authorization", TestHarness::bearer(&tokens.access))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["tier"], "FREE");
    assert_eq!(body["status"], "free");
    assert_eq!(body["degraded"], false);
    assert!(body["expiresAt"].is_null());
}

#[tokio::test]
async fn malformed_venue_id_is_rejected() {
    let harness = TestHarness::new();
    let tokens = harness.login().await;

    let response = harness
        .server
        .get("/v1/venues/not-a-venue/tariff")
        .add_header("authorization", TestHarness::bearer(&tokens.access))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn paid_venue_reports_expiry() {
    let harness = TestHarness::new();
    let tokens = harness.login().await;
    let venue_id = harness.register_venue().await;
    harness
        .set_tariff(venue_id, json!({ "tier": "MAXIMUM", "durationDays": 30 }))
        .await;

    let body: serde_json::Value = harness
        .server
        .get(&format!("/v1/venues/{venue_id}/tariff"))
        .add_header("authorization", TestHarness::bearer(&tokens.access))
        .await
        .json();

    assert_eq!(body["tier"], "MAXIMUM");
    assert_eq!(body["status"], "active");
    assert_eq!(body["daysUntilExpiry"], 30);
    assert_eq!(timestamp(&body["expiresAt"]), harness.now() + Duration::days(30));
}

#[tokio::test]
async fn outage_degrades_to_free() {
    let harness = TestHarness::new();
    let tokens = harness.login().await;
    let venue_id = harness.register_venue().await;
    harness
        .set_tariff(venue_id, json!({ "tier": "SUPER" }))
        .await;
    harness.store.set_unavailable(true);

    let response = harness
        .server
        .get(&format!("/v1/venues/{venue_id}/tariff"))
        .add_header("authorization", TestHarness::bearer(&tokens.access))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["tier"], "FREE");
    assert_eq!(body["degraded"], true);
}

#[tokio::test]
async fn history_lists_periods_with_current_open() {
    let harness = TestHarness::new();
    let tokens = harness.login().await;
    let venue_id = harness.register_venue().await;
    harness.advance(Duration::seconds(1));
    harness
        .set_tariff(venue_id, json!({ "tier": "SUPER", "durationDays": 30 }))
        .await;

    let response = harness
        .server
        .get(&format!("/v1/venues/{venue_id}/tariff/history"))
        .add_header("authorization", TestHarness::bearer(&tokens.access))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["tier"], "FREE");
    assert_eq!(entries[0]["endedAt"], entries[1]["startedAt"]);
    assert_eq!(body["current"]["tier"], "SUPER");
    assert!(body["current"]["endedAt"].is_null());
    assert_eq!(body["current"]["priceMinor"], 99_000);
}

#[tokio::test]
async fn upgrade_quotes_without_changing_the_tariff() {
    let harness = TestHarness::new();
    let tokens = harness.login().await;
    let venue_id = harness.register_venue().await;

    let response = harness
        .server
        .post(&format!("/v1/venues/{venue_id}/tariff/upgrade"))
        .add_header("authorization", TestHarness::bearer(&tokens.access))
        .json(&json!({ "tier": "SUPER", "durationDays": 90 }))
        .await;

    response.assert_status_ok();
    let intent: serde_json::Value = response.json();
    assert_eq!(intent["tier"], "SUPER");
    assert_eq!(intent["baseAmount"], 297_000);
    assert_eq!(intent["discountPercent"], 10);
    assert_eq!(intent["amount"], 267_300);
    assert_eq!(intent["currency"], "RUB");

    let view: serde_json::Value = harness
        .server
        .get(&format!("/v1/venues/{venue_id}/tariff"))
        .add_header("authorization", TestHarness::bearer(&tokens.access))
        .await
        .json();
    assert_eq!(view["tier"], "FREE");
    assert_eq!(harness.store_history_len(venue_id).await, 1);
}

#[tokio::test]
async fn upgrade_rejects_invalid_requests() {
    let harness = TestHarness::new();
    let tokens = harness.login().await;
    let venue_id = harness.register_venue().await;

    for body in [
        json!({ "tier": "GOLD", "durationDays": 30 }),
        json!({ "tier": "FREE", "durationDays": 30 }),
        json!({ "tier": "SUPER", "durationDays": 0 }),
        json!({ "tier": "MAXIMUM", "durationDays": 400 }),
    ] {
        let response = harness
            .server
            .post(&format!("/v1/venues/{venue_id}/tariff/upgrade"))
            .add_header("authorization", TestHarness::bearer(&tokens.access))
            .json(&body)
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{body}");
    }
}
