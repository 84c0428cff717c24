//! Relief Test Utilities
//!
//! Shared test infrastructure for the relief workspace:
//! - Counting mock providers that record how often the upstream was hit
//! - Proptest generators for records and upstream results
//! - Fixtures for common scenarios
//! - Assertions for relief-specific results

// Re-export storage doubles from their source crate
pub use relief_storage::{ExpiringCache, InMemoryCacheStore, InMemoryRecordStore};

// Re-export core types for convenience
pub use relief_core::{
    AuditTrail, AuditTrailEntry, Clock, Disaster, EntityId, GeoPoint, GeocodeResult,
    GeocodeService, ImageVerification, LocationExtraction, ManualClock, NewDisaster,
    OfficialUpdatesSnapshot, ReliefError, ReliefResult, Report, Resource, SocialFeedSnapshot,
    SocialSource, StorageError, Timestamp, UpstreamError, VerificationStatus,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use relief_providers::{
    AiProvider, Geocoder, MockSocialFeed, OfficialUpdatesFeed, SocialFeed, UpstreamResult,
};

// ============================================================================
// COUNTING MOCK PROVIDERS
// ============================================================================

/// Call counter shared by the mocks. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    calls: Arc<AtomicUsize>,
}

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn mock_failure(provider: &str) -> UpstreamError {
    UpstreamError::Transport {
        provider: provider.to_string(),
        message: "mock failure".to_string(),
    }
}

/// AI provider answering from a keyword table.
///
/// Extraction returns the first known place name contained in the text.
/// `fail()` makes every later call return a transport error.
#[derive(Debug, Clone, Default)]
pub struct CountingAi {
    places: Vec<String>,
    failing: Arc<AtomicBool>,
    extract_calls: CallCounter,
    verify_calls: CallCounter,
}

impl CountingAi {
    pub fn new(places: &[&str]) -> Self {
        Self {
            places: places.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.count()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.count()
    }

    fn failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiProvider for CountingAi {
    async fn extract_location(&self, text: &str) -> UpstreamResult<LocationExtraction> {
        self.extract_calls.hit();
        if self.failing() {
            return Err(mock_failure("mock_ai"));
        }
        let lowered = text.to_lowercase();
        Ok(self
            .places
            .iter()
            .find(|p| lowered.contains(&p.to_lowercase()))
            .map(LocationExtraction::found)
            .unwrap_or_else(LocationExtraction::none))
    }

    async fn verify_image(
        &self,
        image_url: &str,
        context: &str,
    ) -> UpstreamResult<ImageVerification> {
        self.verify_calls.hit();
        if self.failing() {
            return Err(mock_failure("mock_ai"));
        }
        Ok(ImageVerification::analyzed(
            format!("Authentic image at {image_url} ({context})"),
            Utc::now(),
        ))
    }

    fn name(&self) -> &str {
        "mock_ai"
    }
}

/// Geocoder answering from a fixed table. Unknown names find no match.
#[derive(Debug, Clone, Default)]
pub struct CountingGeocoder {
    known: Arc<Mutex<HashMap<String, GeoPoint>>>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
    calls: CallCounter,
}

impl CountingGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The usual test places: Paris, Manhattan, Brooklyn.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_place("Paris", 48.8566, 2.3522)
            .with_place("Manhattan, NYC", 40.7831, -73.9712)
            .with_place("Brooklyn", 40.6782, -73.9442)
    }

    pub fn with_place(self, name: &str, lat: f64, lng: f64) -> Self {
        if let Ok(mut known) = self.known.lock() {
            known.insert(name.to_string(), GeoPoint::new(lat, lng));
        }
        self
    }

    /// Sleep before answering, to widen races in concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.count()
    }
}

#[async_trait]
impl Geocoder for CountingGeocoder {
    async fn geocode(&self, location_name: &str) -> UpstreamResult<Option<GeocodeResult>> {
        self.calls.hit();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(mock_failure("nominatim"));
        }
        let point = self
            .known
            .lock()
            .ok()
            .and_then(|known| known.get(location_name).copied());
        Ok(point.map(|p| GeocodeResult {
            lat: p.lat,
            lng: p.lng,
            formatted_address: location_name.to_string(),
            service: GeocodeService::Nominatim,
        }))
    }

    fn service(&self) -> GeocodeService {
        GeocodeService::Nominatim
    }
}

/// Social feed delegating to the canned mock reports.
#[derive(Debug, Clone, Default)]
pub struct CountingSocialFeed {
    inner: MockSocialFeed,
    failing: Arc<AtomicBool>,
    calls: CallCounter,
}

impl CountingSocialFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.count()
    }
}

#[async_trait]
impl SocialFeed for CountingSocialFeed {
    async fn fetch(
        &self,
        _disaster_id: &str,
        keywords: &[String],
        _source: SocialSource,
    ) -> UpstreamResult<SocialFeedSnapshot> {
        self.calls.hit();
        if self.failing.load(Ordering::SeqCst) {
            return Err(mock_failure("mock_social"));
        }
        Ok(self.inner.generate(keywords))
    }
}

/// Official feed returning an empty snapshot, counting calls.
#[derive(Debug, Clone, Default)]
pub struct CountingOfficialFeed {
    failing: Arc<AtomicBool>,
    calls: CallCounter,
}

impl CountingOfficialFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.count()
    }
}

#[async_trait]
impl OfficialUpdatesFeed for CountingOfficialFeed {
    async fn fetch(&self, disaster_type: &str) -> UpstreamResult<OfficialUpdatesSnapshot> {
        self.calls.hit();
        if self.failing.load(Ordering::SeqCst) {
            return Err(mock_failure("official_updates"));
        }
        Ok(OfficialUpdatesSnapshot::new(
            Vec::new(),
            vec![format!("mock:{disaster_type}")],
            Utc::now(),
        ))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for relief types.

    use super::*;
    use proptest::prelude::*;
    use relief_core::{DisasterPatch, Topic};

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-01-01 .. 2030-01-01
        (1_577_836_800i64..1_893_456_000i64)
            .prop_filter_map("valid timestamp", |secs| chrono::DateTime::from_timestamp(secs, 0))
    }

    pub fn arb_user_id() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("netrunnerX".to_string()),
            Just("reliefAdmin".to_string()),
            Just("contributor1".to_string()),
            Just("citizen1".to_string()),
        ]
    }

    pub fn arb_tag() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("flood".to_string()),
            Just("earthquake".to_string()),
            Just("fire".to_string()),
            Just("urgent".to_string()),
            "[a-z]{3,8}",
        ]
    }

    pub fn arb_location_name() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("Paris".to_string())),
            Just(Some("Manhattan, NYC".to_string())),
            "[A-Z][a-z]{3,10}".prop_map(Some),
        ]
    }

    pub fn arb_geo_point() -> impl Strategy<Value = GeoPoint> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lng)| GeoPoint::new(lat, lng))
    }

    pub fn arb_new_disaster() -> impl Strategy<Value = NewDisaster> {
        (
            "[A-Za-z ]{1,40}",
            arb_location_name(),
            "[A-Za-z ,.]{1,120}",
            proptest::collection::vec(arb_tag(), 0..4),
        )
            .prop_filter("non-blank title and description", |(title, _, description, _)| {
                !title.trim().is_empty() && !description.trim().is_empty()
            })
            .prop_map(|(title, location_name, description, tags)| NewDisaster {
                title,
                location_name,
                description,
                tags,
            })
    }

    /// Any combination of present, absent and explicitly cleared fields.
    pub fn arb_disaster_patch() -> impl Strategy<Value = DisasterPatch> {
        (
            proptest::option::of("[A-Za-z ]{0,40}"),
            proptest::option::of(arb_location_name()),
            proptest::option::of("[A-Za-z ,.]{0,120}"),
            proptest::option::of(proptest::collection::vec(arb_tag(), 0..4)),
        )
            .prop_map(|(title, location_name, description, tags)| DisasterPatch {
                title,
                location_name,
                description,
                tags,
            })
    }

    pub fn arb_disaster() -> impl Strategy<Value = Disaster> {
        (arb_new_disaster(), arb_user_id(), arb_timestamp()).prop_map(|(req, owner, now)| {
            let location_name = req.location_name.clone();
            Disaster::from_new(uuid::Uuid::now_v7(), &req, location_name, None, &owner, now)
        })
    }

    pub fn arb_topic() -> impl Strategy<Value = Topic> {
        prop_oneof![
            (0u8..5).prop_map(|n| Topic::disaster(format!("d{n}"))),
            Just(Topic::general_updates()),
        ]
    }

    pub fn arb_keywords() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec(
            prop_oneof![
                Just("flood".to_string()),
                Just("Flood".to_string()),
                Just("shelter".to_string()),
                Just(" help ".to_string()),
                Just("".to_string()),
            ],
            0..5,
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made records for common scenarios.

    use super::*;
    use uuid::Uuid;

    pub const OWNER: &str = "contributor1";
    pub const OTHER_CONTRIBUTOR: &str = "citizen1";
    pub const ADMIN: &str = "reliefAdmin";

    pub fn flood_request() -> NewDisaster {
        NewDisaster {
            title: "NYC Flood".to_string(),
            location_name: Some("Manhattan, NYC".to_string()),
            description: "Heavy flooding across lower Manhattan".to_string(),
            tags: vec!["flood".to_string(), "urgent".to_string()],
        }
    }

    /// Flood in Manhattan owned by [`OWNER`].
    pub fn flood_disaster() -> Disaster {
        let req = flood_request();
        Disaster::from_new(
            Uuid::now_v7(),
            &req,
            req.location_name.clone(),
            Some(GeoPoint::new(40.7831, -73.9712)),
            OWNER,
            Utc::now(),
        )
    }

    pub fn shelter(disaster_id: EntityId, location: Option<GeoPoint>) -> Resource {
        Resource {
            id: Uuid::now_v7(),
            disaster_id,
            name: "Red Cross Shelter".to_string(),
            location_name: Some("Lower East Side, NYC".to_string()),
            location,
            resource_type: "shelter".to_string(),
            description: Some("Emergency shelter".to_string()),
            capacity: Some(200),
            contact_info: None,
            created_by: OWNER.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn pending_report(disaster_id: EntityId) -> Report {
        Report {
            id: Uuid::now_v7(),
            disaster_id,
            user_id: OTHER_CONTRIBUTOR.to_string(),
            content: "Water rising on 5th street".to_string(),
            image_url: Some("https://example.com/flood.jpg".to_string()),
            verification_status: VerificationStatus::Pending,
            verification_details: None,
            created_at: Utc::now(),
        }
    }

    /// Manual clock pinned to a fixed instant.
    pub fn fixed_clock() -> ManualClock {
        ManualClock::new(
            chrono::DateTime::from_timestamp(1_750_000_000, 0).unwrap_or_else(Utc::now),
        )
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers with readable failure messages.

    use super::*;

    /// Assert that a ReliefResult is a NotFound storage error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &ReliefResult<T>) {
        match result {
            Err(ReliefError::Storage(StorageError::NotFound { .. })) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    /// Assert that `later` keeps every entry of `earlier` and adds `added`.
    #[track_caller]
    pub fn assert_trail_extends(later: &AuditTrail, earlier: &AuditTrail, added: usize) {
        assert!(
            later.extends(earlier),
            "Audit trail was rewritten: {:?} does not start with {:?}",
            later,
            earlier
        );
        assert_eq!(
            later.len(),
            earlier.len() + added,
            "Expected {} new audit entries",
            added
        );
    }
}
