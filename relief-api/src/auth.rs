//! Authentication stand-in.
//!
//! Callers identify themselves with the `X-User-Id` header. A missing
//! header resolves to the directory's default user; an id the directory
//! does not know is rejected with 401. There are no credentials: this is a
//! placeholder for a real identity provider, not access control.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use relief_core::{User, UserDirectory};

use crate::error::{ApiError, ApiResult};

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The user the request acts as.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Arc<UserDirectory>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let directory = Arc::<UserDirectory>::from_ref(state);
        let header = match parts.headers.get(USER_ID_HEADER) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| ApiError::unauthorized("Invalid X-User-Id header"))?
                    .trim(),
            ),
            None => None,
        };
        directory
            .resolve(header.filter(|id| !id.is_empty()))
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                tracing::debug!(user_id = ?header, "Unknown user rejected");
                ApiError::unauthorized("Unknown user")
            })
    }
}

impl std::ops::Deref for CurrentUser {
    type Target = User;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Owners and admins may modify a record; everyone else gets 403.
pub fn ensure_may_modify(user: &User, owner_id: &str) -> ApiResult<()> {
    if user.may_modify(owner_id) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Only the owner or an admin may modify this record",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use axum::http::Request;

    #[derive(Clone)]
    struct TestState {
        users: Arc<UserDirectory>,
    }

    impl FromRef<TestState> for Arc<UserDirectory> {
        fn from_ref(state: &TestState) -> Self {
            state.users.clone()
        }
    }

    async fn extract(header: Option<&str>) -> Result<CurrentUser, ApiError> {
        let state = TestState {
            users: Arc::new(UserDirectory::builtin()),
        };
        let mut builder = Request::builder().uri("/");
        if let Some(h) = header {
            builder = builder.header(USER_ID_HEADER, h);
        }
        let (mut parts, _) = builder
            .body(())
            .expect("request builds")
            .into_parts();
        CurrentUser::from_request_parts(&mut parts, &state).await
    }

    #[tokio::test]
    async fn test_missing_header_is_default_user() {
        let user = extract(None).await.expect("default user");
        assert_eq!(user.id, "netrunnerX");
    }

    #[tokio::test]
    async fn test_known_header_resolves() {
        let user = extract(Some("citizen1")).await.expect("known user");
        assert_eq!(user.id, "citizen1");
        assert!(!user.is_admin());
    }

    #[tokio::test]
    async fn test_unknown_header_is_unauthorized() {
        let err = extract(Some("mallory")).await.expect_err("unknown user");
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }

    #[test]
    fn test_ensure_may_modify() {
        let dir = UserDirectory::builtin();
        let citizen = dir.get("citizen1").cloned().expect("citizen1");
        assert!(ensure_may_modify(&citizen, "citizen1").is_ok());
        let err = ensure_may_modify(&citizen, "netrunnerX").expect_err("not owner");
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}
