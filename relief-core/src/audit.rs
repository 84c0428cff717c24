//! Append-only audit trail attached to disaster records.
//!
//! The trail is the only persisted history of a record. `AuditTrail` exposes
//! no way to remove, reorder or edit entries: the single mutator is
//! [`AuditTrail::append`], which consumes the trail and returns one that is
//! exactly one entry longer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::Timestamp;

/// Lifecycle transition recorded in the trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

/// One provenance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AuditTrailEntry {
    pub action: AuditAction,
    pub user_id: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub timestamp: Timestamp,
    /// Changed fields only, for `update` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub changes: Option<JsonValue>,
}

impl AuditTrailEntry {
    pub fn create(user_id: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            action: AuditAction::Create,
            user_id: user_id.into(),
            timestamp,
            changes: None,
        }
    }

    pub fn update(user_id: impl Into<String>, timestamp: Timestamp, changes: JsonValue) -> Self {
        Self {
            action: AuditAction::Update,
            user_id: user_id.into(),
            timestamp,
            changes: Some(changes),
        }
    }
}

/// Ordered, append-only sequence of [`AuditTrailEntry`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct AuditTrail(Vec<AuditTrailEntry>);

impl AuditTrail {
    /// A trail holding the single `create` entry of a new record.
    pub fn started(user_id: impl Into<String>, timestamp: Timestamp) -> Self {
        Self(vec![AuditTrailEntry::create(user_id, timestamp)])
    }

    /// Return this trail followed by `entry`.
    #[must_use]
    pub fn append(mut self, entry: AuditTrailEntry) -> Self {
        self.0.push(entry);
        self
    }

    pub fn entries(&self) -> &[AuditTrailEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&AuditTrailEntry> {
        self.0.last()
    }

    /// True when `self` starts with every entry of `earlier`, unchanged.
    pub fn extends(&self, earlier: &AuditTrail) -> bool {
        self.0.len() >= earlier.0.len() && self.0[..earlier.0.len()] == earlier.0[..]
    }
}

/// Compare two JSON objects over `fields` and return `{field: new_value}`
/// for every field whose value differs, or `None` when nothing changed.
pub fn diff_changes(before: &JsonValue, after: &JsonValue, fields: &[&str]) -> Option<JsonValue> {
    let mut changed = Map::new();
    for field in fields {
        let old = before.get(*field).unwrap_or(&JsonValue::Null);
        let new = after.get(*field).unwrap_or(&JsonValue::Null);
        if old != new {
            changed.insert((*field).to_string(), new.clone());
        }
    }
    if changed.is_empty() {
        None
    } else {
        Some(JsonValue::Object(changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_started_trail_has_one_create() {
        let trail = AuditTrail::started("netrunnerX", Utc::now());
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.entries()[0].action, AuditAction::Create);
        assert!(trail.entries()[0].changes.is_none());
    }

    #[test]
    fn test_append_preserves_prefix() {
        let first = AuditTrail::started("u1", Utc::now());
        let second = first
            .clone()
            .append(AuditTrailEntry::update("u2", Utc::now(), json!({"title": "x"})));
        assert_eq!(second.len(), 2);
        assert!(second.extends(&first));
        assert!(!first.extends(&second));
    }

    #[test]
    fn test_serializes_as_plain_array() -> Result<(), serde_json::Error> {
        let trail = AuditTrail::started("u1", Utc::now());
        let value = serde_json::to_value(&trail)?;
        assert!(value.is_array());
        assert_eq!(value[0]["action"], "create");
        Ok(())
    }

    #[test]
    fn test_diff_changes_only_changed_fields() {
        let before = json!({"title": "Flood", "description": "a", "tags": ["flood"]});
        let after = json!({"title": "Flood", "description": "b", "tags": ["flood"]});
        let diff = diff_changes(&before, &after, &["title", "description", "tags"]);
        assert_eq!(diff, Some(json!({"description": "b"})));
    }

    #[test]
    fn test_diff_changes_none_when_equal() {
        let v = json!({"title": "Flood"});
        assert_eq!(diff_changes(&v, &v, &["title", "location_name"]), None);
    }
}
