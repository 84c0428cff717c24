//! Relief API Server Entry Point
//!
//! Bootstraps configuration, opens the record store and cache backends,
//! wires the upstream providers, and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use relief_api::telemetry::{init_tracer, TelemetryConfig};
use relief_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, BroadcastConfig, Broadcaster,
    CacheBackend, CacheSettings, DbClient, DbConfig, PgCacheStore, PgRecordStore,
    ProviderConfig, ServerConfig, SharedRecords, StoreBackend, UpstreamServices,
};
use relief_providers::{
    build_client, AgencyUpdatesFeed, AiProvider, GeminiClient, GeminiProvider, Geocoder,
    GeocoderChain, GoogleMapsGeocoder, MockSocialFeed, NominatimGeocoder, PageScraper,
};
use relief_storage::{
    CacheStore, ExpiringCache, InMemoryCacheStore, InMemoryRecordStore, LmdbCacheStore,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    // A missing .env file is fine; real deployments set the environment.
    let _ = dotenvy::dotenv();

    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let server_config = ServerConfig::from_env();
    let api_config = ApiConfig::from_env();
    let broadcast_config = BroadcastConfig::from_env();
    let cache_settings = CacheSettings::from_env();
    let provider_config = ProviderConfig::from_env();

    let store_backend = StoreBackend::from_env();
    let db = if store_backend == StoreBackend::Postgres
        || cache_settings.backend == CacheBackend::Postgres
    {
        let db = DbClient::from_config(&DbConfig::from_env())?;
        db.migrate().await?;
        Some(db)
    } else {
        None
    };

    let records: SharedRecords = match (&db, store_backend) {
        (Some(db), StoreBackend::Postgres) => Arc::new(PgRecordStore::new(db.clone())),
        _ => Arc::new(InMemoryRecordStore::new()),
    };

    let cache_store: Arc<dyn CacheStore> = match (&db, cache_settings.backend) {
        (Some(db), CacheBackend::Postgres) => Arc::new(PgCacheStore::new(db.clone())),
        (_, CacheBackend::Lmdb) => Arc::new(
            LmdbCacheStore::open(&cache_settings.lmdb_path, cache_settings.lmdb_max_mb).map_err(
                |e| ApiError::internal_error(format!("Failed to open LMDB cache: {}", e)),
            )?,
        ),
        _ => Arc::new(InMemoryCacheStore::new()),
    };
    let cache = ExpiringCache::new(cache_store);
    let sweeper = cache.spawn_sweeper(cache_settings.sweep_interval);

    let services = build_services(&provider_config, cache, cache_settings.ttls.clone())?;

    let broadcaster = Broadcaster::new(&broadcast_config);
    let heartbeat = broadcaster.spawn_heartbeat(broadcast_config.heartbeat_interval);

    tracing::info!(
        record_store = records.backend_name(),
        cache_backend = services.cache().backend_name(),
        environment = %server_config.environment,
        "Backends ready"
    );

    let state = AppState::new(records, services, broadcaster);
    let app: Router = create_api_router(state, &api_config)?;

    let addr = server_config.socket_addr().map_err(|e| {
        ApiError::invalid_input(format!(
            "Invalid bind address {}:{}: {}",
            server_config.bind, server_config.port, e
        ))
    })?;
    tracing::info!(%addr, "Starting relief API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    heartbeat.abort();
    sweeper.abort();
    Ok(())
}

/// Providers without credentials are left out; their call sites fall back.
fn build_services(
    config: &ProviderConfig,
    cache: ExpiringCache,
    ttls: relief_api::CacheTtls,
) -> ApiResult<UpstreamServices> {
    let client = build_client(&config.http_settings())
        .map_err(|e| ApiError::internal_error(format!("Failed to build HTTP client: {}", e)))?;
    let timeout = config.upstream_timeout;

    let ai: Option<Arc<dyn AiProvider>> = match &config.gemini_api_key {
        Some(key) => Some(Arc::new(GeminiProvider::new(GeminiClient::new(
            client.clone(),
            key.clone(),
            config.gemini_model.clone(),
            timeout,
        )))),
        None => {
            tracing::warn!(
                "GEMINI_API_KEY not set; location extraction and image checks use fallbacks"
            );
            None
        }
    };

    let google: Option<Arc<dyn Geocoder>> = config.google_maps_api_key.as_ref().map(|key| {
        Arc::new(GoogleMapsGeocoder::new(client.clone(), key.clone(), timeout)) as Arc<dyn Geocoder>
    });
    let nominatim: Arc<dyn Geocoder> = Arc::new(NominatimGeocoder::new(client.clone(), timeout));
    let geocoder = Arc::new(GeocoderChain::new(google, nominatim));

    if config.twitter_bearer_token.is_some() {
        tracing::info!("Twitter token configured; social feeds still use the mock source");
    }
    let social = Arc::new(MockSocialFeed::new());

    let official = if config.official_scrape_urls.is_empty() {
        AgencyUpdatesFeed::new()
    } else {
        AgencyUpdatesFeed::with_scraping(
            PageScraper::new(client, timeout),
            config.official_scrape_urls.clone(),
        )
    };

    Ok(UpstreamServices::new(
        ai,
        geocoder,
        social,
        Arc::new(official),
        cache,
        ttls,
    ))
}
