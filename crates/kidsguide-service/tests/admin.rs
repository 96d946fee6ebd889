//! Admin integration tests.

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
async fn register_requires_admin_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/admin/venues")
        .add_header("x-admin-key", "wrong-key")
        .json(&json!({ "venueId": VenueId::generate().to_string() }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let harness = TestHarness::new();
    let venue_id = harness.register_venue().await;

    let response = harness
        .server
        .post("/v1/admin/venues")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({ "venueId": venue_id.to_string() }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn set_tariff_on_unknown_venue_is_not_found() {
    let harness = TestHarness::new();
    let venue_id = VenueId::generate();

    let response = harness
        .server
        .put(&format!("/v1/admin/venues/{venue_id}/tariff"))
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({ "tier": "SUPER" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn paid_tier_uses_list_price_by_default() {
    let harness = TestHarness::new();
    let venue_id = harness.register_venue().await;

    let view = harness
        .set_tariff(venue_id, json!({ "tier": "SUPER", "autoRenew": true }))
        .await;

    assert_eq!(view["tier"], "SUPER");
    assert_eq!(view["priceMinor"], 99_000);
    assert_eq!(view["autoRenew"], true);
    assert_eq!(timestamp(&view["expiresAt"]), harness.now() + Duration::days(30));
}

#[tokio::test]
async fn same_tier_purchase_extends_the_period() {
    let harness = TestHarness::new();
    let venue_id = harness.register_venue().await;
    let start = harness.now();
    harness
        .set_tariff(venue_id, json!({ "tier": "MAXIMUM", "durationDays": 30 }))
        .await;

    harness.advance(Duration::days(10));
    let view = harness
        .set_tariff(venue_id, json!({ "tier": "MAXIMUM", "durationDays": 30 }))
        .await;

    assert_eq!(timestamp(&view["expiresAt"]), start + Duration::days(60));
}

#[tokio::test]
async fn free_cancels_and_closes_the_ledger() {
    let harness = TestHarness::new();
    let venue_id = harness.register_venue().await;
    harness.advance(Duration::seconds(1));
    harness
        .set_tariff(venue_id, json!({ "tier": "SUPER" }))
        .await;
    harness.advance(Duration::days(3));

    let view = harness.set_tariff(venue_id, json!({ "tier": "FREE" })).await;

    assert_eq!(view["tier"], "FREE");
    assert!(view["expiresAt"].is_null());
    assert_eq!(harness.store_history_len(venue_id).await, 3);

    let again = harness.set_tariff(venue_id, json!({ "tier": "FREE" })).await;
    assert_eq!(again["tier"], "FREE");
    assert_eq!(harness.store_history_len(venue_id).await, 3);
}

#[tokio::test]
async fn negative_price_is_rejected() {
    let harness = TestHarness::new();
    let venue_id = harness.register_venue().await;

    let response = harness
        .server
        .put(&format!("/v1/admin/venues/{venue_id}/tariff"))
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({ "tier": "SUPER", "price": -1 }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.store_history_len(venue_id).await, 1);
}
