//! Geocoding providers and the primary/fallback chain.

pub mod google;
pub mod nominatim;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use relief_core::{GeocodeResult, GeocodeService};

pub use google::GoogleMapsGeocoder;
pub use nominatim::NominatimGeocoder;

use crate::{Geocoder, UpstreamResult};

/// Tries the primary geocoder first and the fallback when the primary is
/// absent, fails, or finds nothing.
pub struct GeocoderChain {
    primary: Option<Arc<dyn Geocoder>>,
    fallback: Arc<dyn Geocoder>,
}

impl GeocoderChain {
    pub fn new(primary: Option<Arc<dyn Geocoder>>, fallback: Arc<dyn Geocoder>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Geocoder for GeocoderChain {
    async fn geocode(&self, location_name: &str) -> UpstreamResult<Option<GeocodeResult>> {
        if let Some(primary) = &self.primary {
            match primary.geocode(location_name).await {
                Ok(Some(hit)) => return Ok(Some(hit)),
                Ok(None) => {
                    tracing::debug!(
                        location_name,
                        service = primary.service().as_str(),
                        "Primary geocoder found no match"
                    );
                }
                Err(e) => {
                    tracing::warn!(location_name, error = %e, "Primary geocoder failed");
                }
            }
        }
        self.fallback.geocode(location_name).await
    }

    fn service(&self) -> GeocodeService {
        self.primary
            .as_ref()
            .map_or_else(|| self.fallback.service(), |p| p.service())
    }
}
