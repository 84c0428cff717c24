//! AppState wired to in-memory stores and counting mock providers.

use std::sync::Arc;

use axum::Router;
use relief_api::{
    create_api_router, ApiConfig, AppState, BroadcastConfig, Broadcaster, CacheTtls,
    UpstreamServices,
};
use relief_core::Clock;
use relief_test_utils::{
    CountingAi, CountingGeocoder, CountingOfficialFeed, CountingSocialFeed, ExpiringCache,
    InMemoryRecordStore, ManualClock,
};

/// Handles onto everything a test may want to inspect.
pub struct TestApp {
    pub state: AppState,
    pub records: Arc<InMemoryRecordStore>,
    pub ai: CountingAi,
    pub geocoder: CountingGeocoder,
    pub social: CountingSocialFeed,
    pub official: CountingOfficialFeed,
    pub cache: ExpiringCache,
    pub clock: ManualClock,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_geocoder(CountingGeocoder::with_defaults())
    }

    pub fn with_geocoder(geocoder: CountingGeocoder) -> Self {
        let clock = ManualClock::default();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let records = Arc::new(InMemoryRecordStore::new());
        let ai = CountingAi::new(&["Manhattan, NYC", "Paris", "Brooklyn"]);
        let social = CountingSocialFeed::new();
        let official = CountingOfficialFeed::new();
        let cache = ExpiringCache::with_clock(
            Arc::new(relief_test_utils::InMemoryCacheStore::new()),
            Arc::clone(&shared_clock),
        );

        let services = UpstreamServices::new(
            Some(Arc::new(ai.clone())),
            Arc::new(geocoder.clone()),
            Arc::new(social.clone()),
            Arc::new(official.clone()),
            cache.clone(),
            CacheTtls::default(),
        );
        let broadcaster =
            Broadcaster::with_clock(&BroadcastConfig::default(), Arc::clone(&shared_clock));
        let state = AppState::new(records.clone(), services, broadcaster).with_clock(shared_clock);

        Self {
            state,
            records,
            ai,
            geocoder,
            social,
            official,
            cache,
            clock,
        }
    }

    /// Full router with rate limiting off.
    pub fn router(&self) -> Router {
        let config = ApiConfig {
            rate_limit_enabled: false,
            ..ApiConfig::default()
        };
        match create_api_router(self.state.clone(), &config) {
            Ok(router) => router,
            Err(e) => panic!("router should build: {e}"),
        }
    }
}
