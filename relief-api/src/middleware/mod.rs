//! Middleware modules for the relief API
//!
//! - `rate_limit`: per-client request quota (governor)
//!
//! Request tracing and metrics live in [`crate::telemetry`].
//!
//! # Middleware Order
//!
//! ```ignore
//! Router::new()
//!     .nest("/api", api_routes)
//!     // Rate limiting runs closest to the handlers
//!     .layer(from_fn_with_state(rate_limit_state, rate_limit_middleware))
//!     .layer(from_fn(observability_middleware))
//!     // Outermost
//!     .layer(cors)
//! ```

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimitError, RateLimitState};
