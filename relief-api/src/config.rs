//! API Configuration Module
//!
//! Configuration for the HTTP surface (CORS, rate limiting, body limits),
//! the server socket, the event channel, the cache and record store
//! backends, and the upstream providers. Everything is loaded from
//! environment variables with defaults suitable for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use relief_core::CacheNamespace;
use secrecy::SecretString;

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|s| match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        })
        .unwrap_or(default)
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|s| {
            s.split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_secret(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(SecretString::from)
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// HTTP surface configuration: CORS, rate limiting and body size.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Whether rate limiting is enabled.
    pub rate_limit_enabled: bool,

    /// Requests allowed per client IP per window.
    pub rate_limit_per_window: u32,

    /// Burst capacity. Defaults to the full window allowance.
    pub rate_limit_burst: u32,

    /// Window size for rate limiting.
    pub rate_limit_window: Duration,

    /// Largest accepted request body.
    pub body_limit_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            rate_limit_enabled: true,
            rate_limit_per_window: 100,
            rate_limit_burst: 100,
            rate_limit_window: Duration::from_secs(15 * 60),
            body_limit_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `RELIEF_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `RELIEF_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `RELIEF_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `RELIEF_RATE_LIMIT_PER_WINDOW`: Requests per IP per window (default: 100)
    /// - `RELIEF_RATE_LIMIT_WINDOW_SECS`: Window length (default: 900)
    /// - `RELIEF_RATE_LIMIT_BURST`: Burst capacity (default: per-window allowance)
    /// - `RELIEF_BODY_LIMIT_BYTES`: Max request body (default: 10 MiB)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let rate_limit_per_window =
            env_parse("RELIEF_RATE_LIMIT_PER_WINDOW").unwrap_or(defaults.rate_limit_per_window);

        Self {
            cors_origins: env_list("RELIEF_CORS_ORIGINS"),
            cors_max_age_secs: env_parse("RELIEF_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            rate_limit_enabled: env_flag("RELIEF_RATE_LIMIT_ENABLED", true),
            rate_limit_per_window,
            rate_limit_burst: env_parse("RELIEF_RATE_LIMIT_BURST").unwrap_or(rate_limit_per_window),
            rate_limit_window: env_parse("RELIEF_RATE_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            body_limit_bytes: env_parse("RELIEF_BODY_LIMIT_BYTES")
                .unwrap_or(defaults.body_limit_bytes),
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }
        self.cors_origins.iter().any(|allowed| allowed == origin)
    }
}

// ============================================================================
// SERVER CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Free-form deployment label (`development`, `production`, ...).
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3001,
            environment: "development".to_string(),
        }
    }
}

impl ServerConfig {
    /// `PORT` wins over `RELIEF_API_PORT` so hosted platforms can inject it.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: std::env::var("RELIEF_API_BIND").unwrap_or(defaults.bind),
            port: env_parse("PORT")
                .or_else(|| env_parse("RELIEF_API_PORT"))
                .unwrap_or(defaults.port),
            environment: std::env::var("RELIEF_ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }
}

// ============================================================================
// EVENT CHANNEL CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Outbound queue depth per observer. Events beyond it are dropped for
    /// that observer only.
    pub observer_buffer: usize,
    pub heartbeat_interval: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            observer_buffer: 256,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl BroadcastConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            observer_buffer: env_parse::<usize>("RELIEF_WS_BUFFER")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.observer_buffer),
            heartbeat_interval: env_parse::<u64>("RELIEF_HEARTBEAT_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
        }
    }
}

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Postgres,
    Lmdb,
    Memory,
}

impl CacheBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "lmdb" => Some(Self::Lmdb),
            "memory" | "in-memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Time-to-live per upstream call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    pub location: Duration,
    pub verification: Duration,
    pub geocode: Duration,
    pub social: Duration,
    pub official: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        const MINUTE: u64 = 60;
        Self {
            location: Duration::from_secs(60 * MINUTE),
            verification: Duration::from_secs(60 * MINUTE),
            geocode: Duration::from_secs(24 * 60 * MINUTE),
            social: Duration::from_secs(5 * MINUTE),
            official: Duration::from_secs(30 * MINUTE),
        }
    }
}

impl CacheTtls {
    pub fn for_namespace(&self, namespace: CacheNamespace) -> Duration {
        match namespace {
            CacheNamespace::AiLocation => self.location,
            CacheNamespace::AiVerify => self.verification,
            CacheNamespace::Geocode => self.geocode,
            CacheNamespace::SocialMedia => self.social,
            CacheNamespace::OfficialUpdates => self.official,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// Directory for the LMDB environment.
    pub lmdb_path: PathBuf,
    pub lmdb_max_mb: usize,
    pub sweep_interval: Duration,
    pub ttls: CacheTtls,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            lmdb_path: PathBuf::from("./data/cache"),
            lmdb_max_mb: 256,
            sweep_interval: Duration::from_secs(3600),
            ttls: CacheTtls::default(),
        }
    }
}

impl CacheSettings {
    /// TTLs are read from `RELIEF_TTL_<SITE>_MINS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let minutes = |name: &str, fallback: Duration| {
            env_parse::<u64>(name)
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(fallback)
        };
        let ttls = CacheTtls {
            location: minutes("RELIEF_TTL_LOCATION_MINS", defaults.ttls.location),
            verification: minutes("RELIEF_TTL_VERIFY_MINS", defaults.ttls.verification),
            geocode: minutes("RELIEF_TTL_GEOCODE_MINS", defaults.ttls.geocode),
            social: minutes("RELIEF_TTL_SOCIAL_MINS", defaults.ttls.social),
            official: minutes("RELIEF_TTL_OFFICIAL_MINS", defaults.ttls.official),
        };
        Self {
            backend: std::env::var("RELIEF_CACHE_BACKEND")
                .ok()
                .and_then(|s| CacheBackend::parse(&s))
                .unwrap_or(defaults.backend),
            lmdb_path: std::env::var("RELIEF_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.lmdb_path),
            lmdb_max_mb: env_parse("RELIEF_CACHE_MAX_MB").unwrap_or(defaults.lmdb_max_mb),
            sweep_interval: env_parse::<u64>("RELIEF_CACHE_SWEEP_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            ttls,
        }
    }
}

// ============================================================================
// RECORD STORE CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    /// `RELIEF_STORE_BACKEND`, defaulting to the in-memory store.
    pub fn from_env() -> Self {
        match std::env::var("RELIEF_STORE_BACKEND")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => Self::Postgres,
            _ => Self::Memory,
        }
    }
}

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// Upstream credentials and HTTP settings. Missing keys disable the
/// corresponding provider; callers fall back instead of failing.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub gemini_api_key: Option<SecretString>,
    pub gemini_model: String,
    pub google_maps_api_key: Option<SecretString>,
    pub twitter_bearer_token: Option<SecretString>,
    pub upstream_timeout: Duration,
    pub user_agent: String,
    /// Agency pages scraped for official bulletins.
    pub official_scrape_urls: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        let http = relief_providers::HttpSettings::default();
        Self {
            gemini_api_key: None,
            gemini_model: relief_providers::gemini::client::DEFAULT_MODEL.to_string(),
            google_maps_api_key: None,
            twitter_bearer_token: None,
            upstream_timeout: http.timeout,
            user_agent: http.user_agent,
            official_scrape_urls: Vec::new(),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            gemini_api_key: env_secret("GEMINI_API_KEY"),
            gemini_model: std::env::var("GEMINI_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.gemini_model),
            google_maps_api_key: env_secret("GOOGLE_MAPS_API_KEY"),
            twitter_bearer_token: env_secret("TWITTER_BEARER_TOKEN"),
            upstream_timeout: env_parse::<u64>("RELIEF_UPSTREAM_TIMEOUT_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            user_agent: std::env::var("RELIEF_USER_AGENT").unwrap_or(defaults.user_agent),
            official_scrape_urls: env_list("RELIEF_OFFICIAL_SCRAPE_URLS"),
        }
    }

    pub fn http_settings(&self) -> relief_providers::HttpSettings {
        relief_providers::HttpSettings {
            timeout: self.upstream_timeout,
            user_agent: self.user_agent.clone(),
        }
    }
}
