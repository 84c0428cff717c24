//! Relief API - REST/WebSocket API Layer
//!
//! HTTP surface of the relief emergency-coordination platform. Handlers
//! read and write the record store, reach upstream providers only through
//! the cache-integrated [`services::UpstreamServices`], and announce every
//! change over the WebSocket event channel via the [`Broadcaster`].

pub mod auth;
pub mod broadcaster;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extractors;
pub mod macros;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod ws;

// Re-export commonly used types
pub use auth::{CurrentUser, USER_ID_HEADER};
pub use broadcaster::{Broadcaster, Delivery, InboundRouter};
pub use config::{
    ApiConfig, BroadcastConfig, CacheBackend, CacheSettings, CacheTtls, ProviderConfig,
    ServerConfig, StoreBackend,
};
pub use db::{DbClient, DbConfig, PgCacheStore, PgRecordStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use events::{DisasterChange, OutboundFrame, ResourceAction, WsEvent};
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use services::{CachedCall, Lookup, UpstreamServices};
pub use state::{AppState, SharedRecords};
