//! Error types for relief operations

use crate::EntityType;
use thiserror::Error;

/// Record store errors.
///
/// `NotFound` is kept distinct from the failure variants so callers can map
/// it to a 404 instead of a 500.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Insert failed for {entity_type}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: String,
        reason: String,
    },

    #[error("Delete failed for {entity_type} with id {id}: {reason}")]
    DeleteFailed {
        entity_type: EntityType,
        id: String,
        reason: String,
    },

    /// The stored row changed between read and write.
    #[error("Concurrent update conflict on {entity_type} with id {id}")]
    Conflict { entity_type: EntityType, id: String },

    #[error("Query failed on {collection}: {reason}")]
    QueryFailed { collection: String, reason: String },

    #[error("Record store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StorageError {
    /// True when the error only signals absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

/// Cache backing-store errors.
///
/// These never fail a primary request; the cache layer logs them and
/// reports a miss or a failed write instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Cache value for {key} could not be encoded: {reason}")]
    Encode { key: String, reason: String },

    #[error("Cache value for {key} could not be decoded: {reason}")]
    Decode { key: String, reason: String },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Either {first} or {second} is required")]
    OneOfRequired { first: String, second: String },
}

/// Failures of third-party services (AI, geocoding, feeds, scraping).
///
/// Never surfaced to HTTP clients: the cached wrappers turn these into
/// well-defined fallback values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("No {provider} provider configured")]
    NotConfigured { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Transport error talking to {provider}: {message}")]
    Transport { provider: String, message: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl UpstreamError {
    /// Name of the provider that failed.
    pub fn provider(&self) -> &str {
        match self {
            UpstreamError::NotConfigured { provider }
            | UpstreamError::Timeout { provider, .. }
            | UpstreamError::RequestFailed { provider, .. }
            | UpstreamError::Transport { provider, .. }
            | UpstreamError::InvalidResponse { provider, .. } => provider,
        }
    }
}

/// Master error type for all relief errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReliefError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Result type alias for relief operations.
pub type ReliefResult<T> = Result<T, ReliefError>;

// =============================================================================
// TESTS
// =============================================================================
