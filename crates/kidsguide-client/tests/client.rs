//! Client tests against a mock server.

use kidsguide_client::{ClientError, ClientOptions, KidsguideClient, SetTariffRequest};
use kidsguide_core::{EntitlementStatus, SessionId, SessionState, Tier, UserId, VenueId};
use serde_json::json;
use wiremock::matchers::{bearer_token, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> KidsguideClient {
    KidsguideClient::with_options(
        server.uri(),
        ClientOptions {
            service_api_key: Some("service-key".into()),
            admin_api_key: Some("admin-key".into()),
            cron_secret: Some("cron-secret".into()),
            ..ClientOptions::default()
        },
    )
    .unwrap()
}

fn free_view(venue_id: VenueId) -> serde_json::Value {
    json!({
        "venueId": venue_id.to_string(),
        "tier": "FREE",
        "status": "free",
        "expiresAt": null,
        "daysUntilExpiry": null,
        "gracePeriodEndsAt": null,
        "graceDaysRemaining": null,
        "autoRenew": false,
        "priceMinor": null,
        "limits": {
            "maxPhotos": 5,
            "monthlyNewsPosts": 0,
            "priorityListing": false,
            "analytics": false,
            "promoBadge": false,
            "externalLinks": false
        },
        "newsPostsUsed": 0,
        "newsPostsRemaining": 0,
        "degraded": true
    })
}

#[tokio::test]
async fn open_session_sends_service_key() {
    let server = MockServer::start().await;
    let user_id = UserId::generate();
    let session_id = SessionId::generate();

    Mock::given(method("POST"))
        .and(path("/v1/auth/sessions"))
        .and(header("x-api-key", "service-key"))
        .and(body_json(json!({ "userId": user_id.to_string() })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sessionId": session_id.to_string(),
            "userId": user_id.to_string(),
            "accessToken": "access",
            "refreshToken": "refresh",
            "accessExpiresAt": "2026-01-01T01:00:00Z",
            "refreshExpiresAt": "2026-01-08T00:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = client(&server).open_session(user_id).await.unwrap();

    assert_eq!(tokens.user_id, user_id);
    assert_eq!(tokens.access_token, "access");
    assert_eq!(tokens.refresh_token, "refresh");
}

#[tokio::test]
async fn refresh_without_rotation_has_no_refresh_token() {
    let server = MockServer::start().await;
    let session_id = SessionId::generate();

    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "refresh" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessionId": session_id.to_string(),
            "accessToken": "access-2",
            "accessExpiresAt": "2026-01-01T02:00:00Z",
            "refreshExpiresAt": "2026-01-08T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let refreshed = client(&server).refresh("refresh").await.unwrap();

    assert_eq!(refreshed.access_token, "access-2");
    assert!(refreshed.refresh_token.is_none());
}

#[tokio::test]
async fn rejected_token_carries_the_reason() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "code": "unauthorized",
                "message": "token expired",
                "details": { "reason": "token_expired" }
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server).me("stale").await.unwrap_err();

    assert!(err.is_token_expired());
}

#[tokio::test]
async fn get_tariff_parses_the_view() {
    let server = MockServer::start().await;
    let venue_id = VenueId::generate();

    Mock::given(method("GET"))
        .and(path(format!("/v1/venues/{venue_id}/tariff")))
        .and(bearer_token("access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(free_view(venue_id)))
        .mount(&server)
        .await;

    let view = client(&server).get_tariff("access", venue_id).await.unwrap();

    assert_eq!(view.venue_id, venue_id);
    assert_eq!(view.tier, Tier::Free);
    assert_eq!(view.status, EntitlementStatus::Free);
    assert!(view.degraded);
}

#[tokio::test]
async fn set_tariff_not_found_is_typed() {
    let server = MockServer::start().await;
    let venue_id = VenueId::generate();

    Mock::given(method("PUT"))
        .and(path(format!("/v1/admin/venues/{venue_id}/tariff")))
        .and(header("x-admin-key", "admin-key"))
        .and(body_json(json!({ "tier": "SUPER", "durationDays": 90 })))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "not_found", "message": "venue not found" }
        })))
        .mount(&server)
        .await;

    let change = SetTariffRequest {
        tier: Tier::Super,
        duration_days: Some(90),
        price: None,
        auto_renew: None,
    };
    let err = client(&server).set_tariff(venue_id, &change).await.unwrap_err();

    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn tariff_sweep_uses_cron_secret() {
    let server = MockServer::start().await;
    let failed = VenueId::generate();

    Mock::given(method("POST"))
        .and(path("/internal/cron/tariffs"))
        .and(bearer_token("cron-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "processed": 6,
            "renewed": 1,
            "gracePeriodStarted": 1,
            "downgraded": 0,
            "countersReset": 2,
            "errors": [{
                "venueId": failed.to_string(),
                "phase": "expiry",
                "message": "write failed"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client(&server).run_tariff_sweep().await.unwrap();

    assert_eq!(summary.processed, 6);
    assert_eq!(summary.renewed, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].venue_id, failed);
    assert_eq!(summary.errors[0].phase, "expiry");
}

#[tokio::test]
async fn storage_outage_is_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/internal/cron/tariffs"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": {
                "code": "service_unavailable",
                "message": "Storage is temporarily unavailable"
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server).run_tariff_sweep().await.unwrap_err();

    assert!(matches!(err, ClientError::Unavailable));
}

#[tokio::test]
async fn logout_accepts_no_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/auth/logout"))
        .and(bearer_token("refresh"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).logout("refresh").await.unwrap();
}

#[tokio::test]
async fn session_state_unwraps_the_state() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/auth/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "state": "access_expired" })))
        .mount(&server)
        .await;

    let state = client(&server).session_state("access").await.unwrap();

    assert_eq!(state, SessionState::AccessExpired);
}
