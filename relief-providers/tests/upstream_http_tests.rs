//! HTTP contract tests for the upstream providers, run against wiremock.

use std::num::NonZeroU32;
use std::time::Duration;

use relief_core::{GeocodeService, UpstreamError, VerificationStatus};
use relief_providers::{
    build_client, AiProvider, GeminiClient, GeminiProvider, Geocoder, GoogleMapsGeocoder,
    HttpSettings, NominatimGeocoder, PageScraper,
};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn http() -> reqwest::Client {
    build_client(&HttpSettings::default()).expect("client builds")
}

fn gemini(server: &MockServer, client: reqwest::Client) -> GeminiProvider {
    let client = GeminiClient::new(
        client,
        SecretString::from("test-key".to_string()),
        "gemini-pro",
        TIMEOUT,
    )
    .with_base_url(server.uri());
    GeminiProvider::new(client)
}

fn gemini_text(text: &str) -> serde_json::Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

// ============================================================================
// GEMINI
// ============================================================================

#[tokio::test]
async fn test_gemini_extracts_location() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-pro:generateContent"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("Manhattan, NYC\n")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = gemini(&server, http());
    let extraction = provider
        .extract_location("Heavy flooding in Manhattan")
        .await
        .expect("extraction succeeds");
    assert_eq!(extraction.location.as_deref(), Some("Manhattan, NYC"));
    assert!(extraction.is_found());
}

#[tokio::test]
async fn test_gemini_unknown_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("Unknown")))
        .mount(&server)
        .await;

    let extraction = gemini(&server, http())
        .extract_location("something happened")
        .await
        .expect("extraction succeeds");
    assert_eq!(extraction.location, None);
}

#[tokio::test]
async fn test_gemini_verify_image_is_analyzed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(gemini_text("  No signs of manipulation. ")),
        )
        .mount(&server)
        .await;

    let verification = gemini(&server, http())
        .verify_image("https://img.example/flood.jpg", "flood")
        .await
        .expect("verification succeeds");
    assert_eq!(verification.analysis, "No signs of manipulation.");
    assert_eq!(verification.status, VerificationStatus::Analyzed);
}

#[tokio::test]
async fn test_gemini_error_body_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED" }
        })))
        .mount(&server)
        .await;

    let err = gemini(&server, http())
        .extract_location("x")
        .await
        .expect_err("403 must fail");
    assert_eq!(
        err,
        UpstreamError::RequestFailed {
            provider: "gemini".to_string(),
            status: 403,
            message: "API key not valid".to_string(),
        }
    );
}

#[tokio::test]
async fn test_slow_upstream_maps_to_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(gemini_text("late"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let settings = HttpSettings {
        timeout: Duration::from_millis(100),
        ..HttpSettings::default()
    };
    let client = build_client(&settings).expect("client builds");
    let provider = GeminiProvider::new(
        GeminiClient::new(
            client,
            SecretString::from("k".to_string()),
            "gemini-pro",
            settings.timeout,
        )
        .with_base_url(server.uri()),
    );

    let err = provider.extract_location("x").await.expect_err("must time out");
    assert!(matches!(err, UpstreamError::Timeout { timeout_ms: 100, .. }), "{err:?}");
}

// ============================================================================
// GEOCODING
// ============================================================================

#[tokio::test]
async fn test_google_geocode_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/maps/api/geocode/json"))
        .and(query_param("address", "Paris"))
        .and(query_param("key", "maps-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "results": [{
                "formatted_address": "Paris, France",
                "geometry": { "location": { "lat": 48.8566, "lng": 2.3522 } }
            }]
        })))
        .mount(&server)
        .await;

    let key = SecretString::from("maps-key".to_string());
    let geocoder = GoogleMapsGeocoder::new(http(), key, TIMEOUT).with_base_url(server.uri());
    let hit = geocoder
        .geocode("Paris")
        .await
        .expect("geocode succeeds")
        .expect("has a result");
    assert_eq!(hit.formatted_address, "Paris, France");
    assert_eq!(hit.service, GeocodeService::GoogleMaps);
    assert!((hit.lat - 48.8566).abs() < 1e-9);
}

#[tokio::test]
async fn test_google_zero_results_is_none_and_denied_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("address", "Atlantis"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "ZERO_RESULTS", "results": [] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("address", "Denied"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "REQUEST_DENIED",
            "results": [],
            "error_message": "The provided API key is invalid."
        })))
        .mount(&server)
        .await;

    let geocoder = GoogleMapsGeocoder::new(http(), SecretString::from("k".to_string()), TIMEOUT)
        .with_base_url(server.uri());
    assert_eq!(geocoder.geocode("Atlantis").await, Ok(None));
    let err = geocoder.geocode("Denied").await.expect_err("denied fails");
    assert!(matches!(
        err,
        UpstreamError::RequestFailed { ref message, .. } if message.contains("invalid")
    ));
}

#[tokio::test]
async fn test_nominatim_parses_string_coordinates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Paris"))
        .and(query_param("format", "json"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "lat": "48.8588897",
            "lon": "2.3200410",
            "display_name": "Paris, Ile-de-France, France"
        }])))
        .mount(&server)
        .await;

    let rate = NonZeroU32::new(50).expect("nonzero");
    let geocoder = NominatimGeocoder::with_rate(http(), TIMEOUT, rate).with_base_url(server.uri());
    let hit = geocoder
        .geocode("Paris")
        .await
        .expect("geocode succeeds")
        .expect("has a result");
    assert_eq!(hit.service, GeocodeService::Nominatim);
    assert!((hit.lng - 2.320041).abs() < 1e-9);
}

#[tokio::test]
async fn test_nominatim_empty_list_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let geocoder = NominatimGeocoder::new(http(), TIMEOUT).with_base_url(server.uri());
    assert_eq!(geocoder.geocode("nowhere").await, Ok(None));
}

#[tokio::test]
async fn test_nominatim_default_rate_spaces_calls_one_second_apart() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let geocoder = NominatimGeocoder::new(http(), TIMEOUT).with_base_url(server.uri());
    let started = tokio::time::Instant::now();
    assert_eq!(geocoder.geocode("first").await, Ok(None));
    assert!(started.elapsed() < Duration::from_millis(500), "first call is not held back");

    assert_eq!(geocoder.geocode("second").await, Ok(None));
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(900),
        "second call waited only {elapsed:?}"
    );
}

#[tokio::test]
async fn test_nominatim_clones_share_one_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let geocoder = NominatimGeocoder::new(http(), TIMEOUT).with_base_url(server.uri());
    let twin = geocoder.clone();
    let started = tokio::time::Instant::now();
    let (a, b) = tokio::join!(geocoder.geocode("a"), twin.geocode("b"));
    assert_eq!(a, Ok(None));
    assert_eq!(b, Ok(None));
    assert!(started.elapsed() >= Duration::from_millis(900));
}

// ============================================================================
// SCRAPER
// ============================================================================

#[tokio::test]
async fn test_scraper_fetches_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<article><h2>Evacuation order</h2><p>Leave zone A now.</p></article>",
        ))
        .mount(&server)
        .await;

    let scraper = PageScraper::new(http(), TIMEOUT);
    let updates = scraper.scrape(&format!("{}/news", server.uri())).await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].title, "Evacuation order");
    assert_eq!(updates[0].source, "127.0.0.1");
}

#[tokio::test]
async fn test_scraper_failure_yields_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let scraper = PageScraper::new(http(), TIMEOUT);
    let url = format!("{}/down", server.uri());
    assert!(matches!(
        scraper.try_scrape(&url).await,
        Err(UpstreamError::RequestFailed { status: 500, .. })
    ));
    assert!(scraper.scrape(&url).await.is_empty());
}
