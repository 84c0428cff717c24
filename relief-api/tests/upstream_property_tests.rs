//! Property-Based Tests for Cache-Integrated Upstream Calls
//!
//! **Property 1: Suppression**
//!
//! For any input, a second lookup within the TTL SHALL be served from the
//! cache without calling the provider again.
//!
//! **Property 2: Failures are not cached**
//!
//! When the provider fails, the caller SHALL get the fixed fallback and the
//! next lookup SHALL call the provider again.
//!
//! **Property 3: Key normalization**
//!
//! Social lookups whose keyword lists differ only in order, case, padding
//! or duplicates SHALL share one cache entry.
//!
//! **Property 4: Expiry**
//!
//! A lookup issued after the TTL has elapsed SHALL call the provider again.

use chrono::TimeDelta;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use relief_api::{CacheTtls, Lookup};
use relief_core::{LocationExtraction, SocialSource, VerificationStatus};
use relief_test_utils::generators::arb_keywords;

#[path = "support/state.rs"]
mod test_state_support;
use test_state_support::TestApp;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn runtime() -> Result<tokio::runtime::Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z ]{1,60}",
        "[A-Za-z ]{0,20}".prop_map(|prefix| format!("{prefix} flooding in Paris")),
        "[A-Za-z ]{0,20}".prop_map(|prefix| format!("{prefix} shelters open in Brooklyn")),
    ]
}

fn arb_image_url() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,12}".prop_map(|name| format!("https://images.example.com/{name}.jpg"))
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// **Property 1: Suppression**
    #[test]
    fn prop_repeat_location_lookup_is_a_hit(text in arb_text()) {
        let rt = runtime()?;
        rt.block_on(async {
            let app = TestApp::new();
            let services = &app.state.services;

            let first = services.lookup_location(&text).await;
            prop_assert!(!first.is_hit());
            let second = services.lookup_location(&text).await;
            prop_assert!(second.is_hit());
            prop_assert_eq!(first.value(), second.value());
            prop_assert_eq!(app.ai.extract_calls(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Verification results are keyed by URL alone.
    #[test]
    fn prop_verification_ignores_context(
        url in arb_image_url(),
        first_context in proptest::option::of("[a-z ]{1,20}"),
        second_context in proptest::option::of("[a-z ]{1,20}"),
    ) {
        let rt = runtime()?;
        rt.block_on(async {
            let app = TestApp::new();
            let services = &app.state.services;

            let first = services.verify_image(&url, first_context.as_deref()).await;
            let second = services.verify_image(&url, second_context.as_deref()).await;
            prop_assert_eq!(first.status, VerificationStatus::Analyzed);
            prop_assert_eq!(first, second);
            prop_assert_eq!(app.ai.verify_calls(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// **Property 2: Failures are not cached**
    #[test]
    fn prop_failed_lookup_retries_provider(url in arb_image_url(), text in arb_text()) {
        let rt = runtime()?;
        rt.block_on(async {
            let app = TestApp::new();
            let services = &app.state.services;
            app.ai.fail();

            let verification = services.verify_image(&url, None).await;
            prop_assert_eq!(verification.status, VerificationStatus::Error);
            let extraction = services.extract_location(&text).await;
            prop_assert_eq!(extraction, LocationExtraction::none());

            app.ai.recover();
            let retried = services.lookup_verification(&url, None).await;
            prop_assert!(matches!(retried, Lookup::Fresh(_)));
            prop_assert_eq!(app.ai.verify_calls(), 2);
            prop_assert!(!services.lookup_location(&text).await.is_hit());
            prop_assert_eq!(app.ai.extract_calls(), 2);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// **Property 3: Key normalization**
    #[test]
    fn prop_keyword_order_and_case_share_entry(keywords in arb_keywords()) {
        let rt = runtime()?;
        rt.block_on(async {
            let app = TestApp::new();
            let services = &app.state.services;
            let mut shuffled: Vec<String> =
                keywords.iter().rev().map(|k| k.to_uppercase()).collect();
            shuffled.extend(keywords.iter().cloned());

            services.social_reports("d1", &keywords, SocialSource::Mock).await;
            let again = services.lookup_social("d1", &shuffled, SocialSource::Mock).await;
            prop_assert!(again.is_hit());
            prop_assert_eq!(app.social.calls(), 1);

            // A different disaster or source is a different entry.
            services.social_reports("d2", &keywords, SocialSource::Mock).await;
            services.social_reports("d1", &keywords, SocialSource::Twitter).await;
            prop_assert_eq!(app.social.calls(), 3);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// **Property 4: Expiry**
    #[test]
    fn prop_expired_entry_refetches(
        disaster_type in prop_oneof![Just("flood"), Just("earthquake"), Just("general")],
        overshoot_secs in 1i64..3_600,
    ) {
        let rt = runtime()?;
        rt.block_on(async {
            let app = TestApp::new();
            let services = &app.state.services;
            let ttl = CacheTtls::default().official;

            services.official_updates(disaster_type).await;
            prop_assert!(services.lookup_official(&disaster_type.to_uppercase()).await.is_hit());

            let ttl_secs = i64::try_from(ttl.as_secs())
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            app.clock.advance(TimeDelta::seconds(ttl_secs + overshoot_secs));
            prop_assert!(!services.lookup_official(disaster_type).await.is_hit());
            prop_assert_eq!(app.official.calls(), 2);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ============================================================================
// GEOCODING
// ============================================================================

#[tokio::test]
async fn test_unmatched_place_is_not_cached() {
    let app = TestApp::new();
    let services = &app.state.services;

    assert_eq!(services.lookup_geocode("Atlantis").await, Lookup::Empty);
    assert_eq!(services.lookup_geocode("Atlantis").await, Lookup::Empty);
    assert_eq!(app.geocoder.calls(), 2);

    assert!(services.lookup_geocode("   ").await == Lookup::Empty);
    assert_eq!(app.geocoder.calls(), 2);
}

#[tokio::test]
async fn test_geocode_key_ignores_padding() {
    let app = TestApp::new();
    let services = &app.state.services;

    let first = services.geocode("Paris").await;
    let second = services.geocode("  Paris ").await;
    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(app.geocoder.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_geocodes_share_one_call() {
    let app = TestApp::with_geocoder(
        relief_test_utils::CountingGeocoder::with_defaults()
            .with_delay(std::time::Duration::from_millis(20)),
    );
    let services = app.state.services.clone();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let services = services.clone();
            tokio::spawn(async move { services.geocode("Brooklyn").await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.expect("task completes").is_some());
    }
    assert_eq!(app.geocoder.calls(), 1);
}
