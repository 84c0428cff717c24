//! End-to-end tests for the REST surface, driven through the full router
//! with `tower::ServiceExt::oneshot`.

use axum::http::{Method, StatusCode};
use axum::Router;
use relief_api::ApiConfig;
use relief_storage::RecordStore;
use serde_json::{json, Value};
use std::time::Duration;

#[path = "support/http.rs"]
mod http_support;
#[path = "support/state.rs"]
mod test_state_support;
use http_support::send;
use test_state_support::TestApp;

const OWNER: &str = "contributor1";
const OTHER: &str = "citizen1";

async fn create_flood(router: &Router, user: &str, location_name: Option<&str>) -> Value {
    let mut body = json!({
        "title": "River flood",
        "description": "Water rising near the river banks",
        "tags": ["flood"],
    });
    if let Some(name) = location_name {
        body["location_name"] = json!(name);
    }
    let (status, disaster) =
        send(router, Method::POST, "/api/disasters", Some(user), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {disaster}");
    disaster
}

// ============================================================================
// DISASTERS
// ============================================================================

#[tokio::test]
async fn test_create_geocodes_and_broadcasts() {
    let app = TestApp::new();
    let router = app.router();
    let mut observer = app.state.broadcaster.register();

    let disaster = create_flood(&router, OWNER, Some("Paris")).await;

    assert_eq!(disaster["owner_id"], OWNER);
    assert_eq!(disaster["location_name"], "Paris");
    assert_eq!(disaster["location"]["lat"], 48.8566);
    let trail = disaster["audit_trail"].as_array().expect("trail is an array");
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0]["action"], "create");
    assert_eq!(trail[0]["user_id"], OWNER);

    let frame = observer.events.try_recv().expect("create was broadcast");
    let wire: Value = serde_json::from_str(&frame.to_json().expect("frame serializes"))
        .expect("frame is JSON");
    assert_eq!(wire["event"], "disaster_updated");
    assert_eq!(wire["data"]["action"], "create");
    assert_eq!(wire["data"]["disaster"]["id"], disaster["id"]);
}

#[tokio::test]
async fn test_repeated_location_hits_geocoder_once() {
    let app = TestApp::new();
    let router = app.router();

    create_flood(&router, OWNER, Some("Paris")).await;
    create_flood(&router, OWNER, Some("Paris")).await;

    assert_eq!(app.geocoder.calls(), 1);
    assert_eq!(app.records.disaster_count().await, 2);
}

#[tokio::test]
async fn test_location_extracted_from_description() {
    let app = TestApp::new();
    let router = app.router();

    let body = json!({
        "title": "Flood",
        "description": "Severe flooding reported in Manhattan, NYC this morning",
    });
    let (status, disaster) = send(&router, Method::POST, "/api/disasters", None, Some(body)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(disaster["location_name"], "Manhattan, NYC");
    assert!(disaster["location"].is_object());
    assert_eq!(disaster["owner_id"], "netrunnerX");
    assert_eq!(app.ai.extract_calls(), 1);
}

#[tokio::test]
async fn test_create_requires_title_and_known_user() {
    let app = TestApp::new();
    let router = app.router();

    let (status, err) = send(
        &router,
        Method::POST,
        "/api/disasters",
        None,
        Some(json!({"description": "no title"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "MISSING_FIELD");

    let (status, _) = send(
        &router,
        Method::POST,
        "/api/disasters",
        Some("mallory"),
        Some(json!({"title": "t", "description": "d"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.records.disaster_count().await, 0);
}

#[tokio::test]
async fn test_update_appends_changed_fields_only() {
    let app = TestApp::new();
    let router = app.router();
    let disaster = create_flood(&router, OWNER, None).await;
    let uri = format!("/api/disasters/{}", disaster["id"].as_str().expect("id"));

    let (status, updated) = send(
        &router,
        Method::PUT,
        &uri,
        Some(OWNER),
        Some(json!({"title": "River flood, level 3", "tags": ["flood"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let trail = updated["audit_trail"].as_array().expect("trail");
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0], disaster["audit_trail"][0]);
    assert_eq!(trail[1]["action"], "update");
    assert_eq!(trail[1]["changes"], json!({"title": "River flood, level 3"}));
}

#[tokio::test]
async fn test_update_regeocodes_and_clears_location() {
    let app = TestApp::new();
    let router = app.router();
    let disaster = create_flood(&router, OWNER, Some("Paris")).await;
    let uri = format!("/api/disasters/{}", disaster["id"].as_str().expect("id"));

    let (_, moved) = send(
        &router,
        Method::PUT,
        &uri,
        Some(OWNER),
        Some(json!({"location_name": "Brooklyn"})),
    )
    .await;
    assert_eq!(moved["location"]["lat"], 40.6782);

    let (_, cleared) = send(
        &router,
        Method::PUT,
        &uri,
        Some(OWNER),
        Some(json!({"location_name": null})),
    )
    .await;
    assert!(cleared["location_name"].is_null());
    assert!(cleared["location"].is_null());
    assert_eq!(cleared["audit_trail"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_non_owner_cannot_modify() {
    let app = TestApp::new();
    let router = app.router();
    let disaster = create_flood(&router, OWNER, None).await;
    let uri = format!("/api/disasters/{}", disaster["id"].as_str().expect("id"));

    let (status, _) =
        send(&router, Method::PUT, &uri, Some(OTHER), Some(json!({"title": "x"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&router, Method::DELETE, &uri, Some(OTHER), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Admins may modify anything.
    let (status, _) = send(
        &router,
        Method::PUT,
        &uri,
        Some("reliefAdmin"),
        Some(json!({"title": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_delete_then_not_found() {
    let app = TestApp::new();
    let router = app.router();
    let disaster = create_flood(&router, OWNER, None).await;
    let id = disaster["id"].as_str().expect("id").to_string();
    let uri = format!("/api/disasters/{id}");
    let mut observer = app.state.broadcaster.register();

    let (status, body) = send(&router, Method::DELETE, &uri, Some(OWNER), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let frame = observer.events.try_recv().expect("delete was broadcast");
    let wire: Value = serde_json::from_str(&frame.to_json().expect("serializes")).expect("json");
    assert_eq!(wire["data"], json!({"action": "delete", "disaster_id": id}));

    let (status, err) = send(&router, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "DISASTER_NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_id_is_bad_request() {
    let app = TestApp::new();
    let (status, _) =
        send(&app.router(), Method::GET, "/api/disasters/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_filters_by_tag() {
    let app = TestApp::new();
    let router = app.router();
    create_flood(&router, OWNER, None).await;
    let (status, _) = send(
        &router,
        Method::POST,
        "/api/disasters",
        Some(OWNER),
        Some(json!({"title": "Wildfire", "description": "Hills burning", "tags": ["fire"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, page) = send(&router, Method::GET, "/api/disasters?tag=fire", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["disasters"][0]["title"], "Wildfire");
    assert_eq!(page["limit"], 50);
}

// ============================================================================
// REPORTS + RESOURCES
// ============================================================================

#[tokio::test]
async fn test_reports_and_detail() {
    let app = TestApp::new();
    let router = app.router();
    let disaster = create_flood(&router, OWNER, None).await;
    let id = disaster["id"].as_str().expect("id");

    let (status, _) = send(
        &router,
        Method::POST,
        &format!("/api/disasters/{id}/reports"),
        Some(OTHER),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, report) = send(
        &router,
        Method::POST,
        &format!("/api/disasters/{id}/reports"),
        Some(OTHER),
        Some(json!({"content": "Need water", "image_url": "https://example.com/a.jpg"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["verification_status"], "pending");

    let (status, detail) =
        send(&router, Method::GET, &format!("/api/disasters/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["reports"].as_array().map(Vec::len), Some(1));
    assert_eq!(detail["resources"], json!([]));
}

#[tokio::test]
async fn test_resources_create_and_radius_filter() {
    let app = TestApp::new();
    let router = app.router();
    let disaster = create_flood(&router, OWNER, None).await;
    let id = disaster["id"].as_str().expect("id");
    let mut observer = app.state.broadcaster.register();

    let (status, resource) = send(
        &router,
        Method::POST,
        &format!("/api/resources/disasters/{id}/resources"),
        Some(OWNER),
        Some(json!({"name": "Shelter A", "type": "shelter", "location_name": "Brooklyn"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(resource["type"], "shelter");
    assert!(resource["location"].is_object());

    let frame = observer.events.try_recv().expect("resource was broadcast");
    assert_eq!(frame.event.event_type(), "resources_updated");

    let (_, near) = send(
        &router,
        Method::GET,
        &format!("/api/resources/disasters/{id}/resources?lat=40.68&lon=-73.94&radius=5000"),
        None,
        None,
    )
    .await;
    assert_eq!(near["total"], 1);
    assert_eq!(near["radius_meters"], 5000.0);

    // Paris is far from Brooklyn.
    let (_, far) = send(
        &router,
        Method::GET,
        "/api/resources/nearby?lat=48.85&lon=2.35&type=shelter",
        None,
        None,
    )
    .await;
    assert_eq!(far["total"], 0);

    let (status, _) =
        send(&router, Method::GET, "/api/resources/nearby?lat=48.85", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resource_requires_name_and_type() {
    let app = TestApp::new();
    let router = app.router();
    let disaster = create_flood(&router, OWNER, None).await;
    let id = disaster["id"].as_str().expect("id");

    let (status, err) = send(
        &router,
        Method::POST,
        &format!("/api/resources/disasters/{id}/resources"),
        Some(OWNER),
        Some(json!({"name": "Shelter"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["message"], "Required field 'type' is missing");
}

// ============================================================================
// FEEDS
// ============================================================================

#[tokio::test]
async fn test_social_media_cached_and_broadcast() {
    let app = TestApp::new();
    let router = app.router();
    let mut observer = app.state.broadcaster.register();

    for keywords in ["flood,shelter", "Shelter,FLOOD"] {
        let (status, snapshot) = send(
            &router,
            Method::GET,
            &format!("/api/social-media/disasters/d1/social-media?keywords={keywords}"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(snapshot["total"].is_u64());
    }

    assert_eq!(app.social.calls(), 1);
    let frame = observer.events.try_recv().expect("snapshot was broadcast");
    assert_eq!(frame.event.event_type(), "social_media_updated");
}

#[tokio::test]
async fn test_feed_failures_fall_back_uncached() {
    let app = TestApp::new();
    let router = app.router();
    app.official.fail();

    for _ in 0..2 {
        let (status, snapshot) = send(
            &router,
            Method::GET,
            "/api/updates/official-updates?type=flood",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["total"], 0);
    }
    assert_eq!(app.official.calls(), 2);
}

// ============================================================================
// VERIFICATION + GEOCODING
// ============================================================================

#[tokio::test]
async fn test_verify_image_records_outcome() {
    let app = TestApp::new();
    let router = app.router();
    let disaster = create_flood(&router, OWNER, None).await;
    let id = disaster["id"].as_str().expect("id");
    let (_, report) = send(
        &router,
        Method::POST,
        &format!("/api/disasters/{id}/reports"),
        Some(OTHER),
        Some(json!({"content": "Photo of flooding"})),
    )
    .await;

    let uri = format!("/api/verification/disasters/{id}/verify-image");
    let (status, _) = send(&router, Method::POST, &uri, Some(OTHER), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, outcome) = send(
        &router,
        Method::POST,
        &uri,
        Some(OTHER),
        Some(json!({"image_url": "https://example.com/flood.jpg", "report_id": report["id"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["verification"]["status"], "analyzed");
    assert_eq!(outcome["verified_by"], OTHER);

    // Side-channel writes run in the background.
    let mut logged = 0;
    for _ in 0..50 {
        logged = app.records.verification_count().await;
        if logged == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(logged, 1);

    let report_id = report["id"].as_str().and_then(|s| s.parse().ok()).expect("report id");
    let mut status = String::new();
    for _ in 0..50 {
        let stored = app.records.report_get(report_id).await.expect("read").expect("exists");
        status = stored.verification_status.as_str().to_string();
        if status == "analyzed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, "analyzed");
}

#[tokio::test]
async fn test_verify_image_failure_falls_back() {
    let app = TestApp::new();
    let router = app.router();
    let disaster = create_flood(&router, OWNER, None).await;
    let id = disaster["id"].as_str().expect("id");
    app.ai.fail();

    let (status, outcome) = send(
        &router,
        Method::POST,
        &format!("/api/verification/disasters/{id}/verify-image"),
        None,
        Some(json!({"image_url": "https://example.com/x.jpg"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["verification"]["status"], "error");
    assert_eq!(
        outcome["verification"]["analysis"],
        "Unable to verify image due to service error"
    );
}

#[tokio::test]
async fn test_geocoding_endpoint() {
    let app = TestApp::new();
    let router = app.router();

    let (status, _) = send(&router, Method::POST, "/api/geocoding", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, result) = send(
        &router,
        Method::POST,
        "/api/geocoding",
        None,
        Some(json!({"text": "Shelters open across Brooklyn tonight"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["location_name"], "Brooklyn");
    assert_eq!(result["location_extraction"]["confidence"], 0.8);
    assert_eq!(result["success"], true);

    let (_, named) = send(
        &router,
        Method::POST,
        "/api/geocoding",
        None,
        Some(json!({"location_name": "Atlantis"})),
    )
    .await;
    assert!(named["location_extraction"].is_null());
    assert_eq!(named["success"], false);
}

// ============================================================================
// SERVICE ROUTES
// ============================================================================

#[tokio::test]
async fn test_health_and_openapi() {
    let app = TestApp::new();
    let router = app.router();

    let (status, health) = send(&router, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "OK");
    assert_eq!(health["record_store"], "memory");

    let (status, doc) = send(&router, Method::GET, "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/disasters"].is_object());
}

#[tokio::test]
async fn test_rate_limit_rejects_over_quota() {
    let app = TestApp::new();
    let config = ApiConfig {
        rate_limit_per_window: 2,
        rate_limit_burst: 2,
        ..ApiConfig::default()
    };
    let router = relief_api::create_api_router(app.state.clone(), &config).expect("router builds");

    for _ in 0..2 {
        let (status, _) = send(&router, Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, err) = send(&router, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err["code"], "TOO_MANY_REQUESTS");
}
