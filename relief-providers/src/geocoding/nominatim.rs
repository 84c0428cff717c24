//! OpenStreetMap Nominatim search, limited to one request per second as
//! the public usage policy requires.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use relief_core::{GeocodeResult, GeocodeService};
use reqwest::Client;

use super::types::NominatimPlace;
use crate::http::{ensure_success, invalid_response, transport_error};
use crate::{Geocoder, UpstreamResult};

const PROVIDER: &str = "nominatim";
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

#[derive(Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl NominatimGeocoder {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self::with_rate(client, timeout, NonZeroU32::MIN)
    }

    /// Custom requests-per-second budget.
    pub fn with_rate(client: Client, timeout: Duration, per_second: NonZeroU32) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl std::fmt::Debug for NominatimGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NominatimGeocoder")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, location_name: &str) -> UpstreamResult<Option<GeocodeResult>> {
        // Calls queue here instead of failing when the budget is spent.
        self.limiter.until_ready().await;

        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", location_name), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout, e))?;
        let places: Vec<NominatimPlace> = ensure_success(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, e.to_string()))?;

        let Some(place) = places.into_iter().next() else {
            return Ok(None);
        };
        let lat = place
            .lat
            .parse::<f64>()
            .map_err(|e| invalid_response(PROVIDER, format!("bad lat {:?}: {}", place.lat, e)))?;
        let lng = place
            .lon
            .parse::<f64>()
            .map_err(|e| invalid_response(PROVIDER, format!("bad lon {:?}: {}", place.lon, e)))?;
        Ok(Some(GeocodeResult {
            lat,
            lng,
            formatted_address: place.display_name,
            service: GeocodeService::Nominatim,
        }))
    }

    fn service(&self) -> GeocodeService {
        GeocodeService::Nominatim
    }
}
