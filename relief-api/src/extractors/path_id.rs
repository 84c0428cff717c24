//! Path extractor for entity ids.
//!
//! `Path<Uuid>` rejects a malformed id with a plain-text 400. `PathId`
//! rejects it with the usual [`ApiError`] body so clients see one error
//! shape everywhere.

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use relief_core::EntityId;

use crate::error::ApiError;

/// A single `:id` path segment parsed as an [`EntityId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathId(pub EntityId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_input(format!("Invalid path parameter: {}", e)))?;
        raw.trim()
            .parse::<EntityId>()
            .map(PathId)
            .map_err(|_| ApiError::invalid_format("id", "a UUID"))
    }
}

impl std::ops::Deref for PathId {
    type Target = EntityId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
