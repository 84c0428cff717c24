//! Users and roles for the authentication stand-in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Privilege level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Contributor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    pub email: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Owners and admins may mutate a record.
    pub fn may_modify(&self, owner_id: &str) -> bool {
        self.id == owner_id || self.is_admin()
    }
}

/// Fixed set of known users.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: HashMap<String, User>,
    default_user: String,
}

impl UserDirectory {
    pub fn new(users: impl IntoIterator<Item = User>, default_user: impl Into<String>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            default_user: default_user.into(),
        }
    }

    /// The hard-coded demo users; `netrunnerX` is the default identity.
    pub fn builtin() -> Self {
        let user = |id: &str, name: &str, role, email: &str| User {
            id: id.to_string(),
            name: name.to_string(),
            role,
            email: email.to_string(),
        };
        Self::new(
            [
                user("netrunnerX", "NetRunner X", UserRole::Admin, "netrunner@disaster.org"),
                user("reliefAdmin", "Relief Admin", UserRole::Admin, "admin@relief.org"),
                user(
                    "contributor1",
                    "Emergency Contributor",
                    UserRole::Contributor,
                    "contributor@emergency.org",
                ),
                user(
                    "citizen1",
                    "Concerned Citizen",
                    UserRole::Contributor,
                    "citizen@community.org",
                ),
            ],
            "netrunnerX",
        )
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    /// Resolve an optional header value; absent means the default user.
    pub fn resolve(&self, id: Option<&str>) -> Option<&User> {
        self.get(id.unwrap_or(&self.default_user))
    }
}

impl Default for UserDirectory {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_users() {
        let dir = UserDirectory::builtin();
        assert!(dir.get("netrunnerX").map(User::is_admin).unwrap_or(false));
        assert!(!dir.get("citizen1").map(User::is_admin).unwrap_or(true));
        assert!(dir.get("nobody").is_none());
    }

    #[test]
    fn test_resolve_defaults() {
        let dir = UserDirectory::builtin();
        assert_eq!(dir.resolve(None).map(|u| u.id.as_str()), Some("netrunnerX"));
        assert!(dir.resolve(Some("ghost")).is_none());
    }

    #[test]
    fn test_may_modify() {
        let dir = UserDirectory::builtin();
        let citizen = dir.get("citizen1").cloned();
        let admin = dir.get("reliefAdmin").cloned();
        assert!(citizen.as_ref().is_some_and(|u| u.may_modify("citizen1")));
        assert!(citizen.as_ref().is_some_and(|u| !u.may_modify("contributor1")));
        assert!(admin.as_ref().is_some_and(|u| u.may_modify("contributor1")));
    }
}
