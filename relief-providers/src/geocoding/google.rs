//! Google Maps Geocoding API.

use std::time::Duration;

use async_trait::async_trait;
use relief_core::{GeocodeResult, GeocodeService, UpstreamError};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

use super::types::GoogleGeocodeResponse;
use crate::http::{ensure_success, invalid_response, transport_error};
use crate::{Geocoder, UpstreamResult};

const PROVIDER: &str = "google_maps";
pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

pub struct GoogleMapsGeocoder {
    client: Client,
    api_key: SecretString,
    base_url: String,
    timeout: Duration,
}

impl GoogleMapsGeocoder {
    pub fn new(client: Client, api_key: SecretString, timeout: Duration) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Geocoder for GoogleMapsGeocoder {
    async fn geocode(&self, location_name: &str) -> UpstreamResult<Option<GeocodeResult>> {
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("address", location_name),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout, e))?;
        let body: GoogleGeocodeResponse = ensure_success(PROVIDER, response)
            .await?
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, e.to_string()))?;

        match body.status.as_str() {
            "OK" => Ok(body.results.into_iter().next().map(|r| GeocodeResult {
                lat: r.geometry.location.lat,
                lng: r.geometry.location.lng,
                formatted_address: r.formatted_address,
                service: GeocodeService::GoogleMaps,
            })),
            "ZERO_RESULTS" => Ok(None),
            other => Err(UpstreamError::RequestFailed {
                provider: PROVIDER.to_string(),
                status: 200,
                message: body.error_message.unwrap_or_else(|| other.to_string()),
            }),
        }
    }

    fn service(&self) -> GeocodeService {
        GeocodeService::GoogleMaps
    }
}

impl std::fmt::Debug for GoogleMapsGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleMapsGeocoder")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
