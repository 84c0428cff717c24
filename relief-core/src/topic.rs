//! Broadcast scopes for the event channel.

use serde::{Deserialize, Serialize};
use std::fmt;

const DISASTER_PREFIX: &str = "disaster_";
const GENERAL_UPDATES: &str = "general_updates";

/// Named broadcast scope. Observers join and leave topics; membership
/// lives only as long as the connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Arbitrary topic name.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Per-disaster room: `disaster_<id>`.
    pub fn disaster(id: impl fmt::Display) -> Self {
        Self(format!("{DISASTER_PREFIX}{id}"))
    }

    /// The general feed.
    pub fn general_updates() -> Self {
        Self(GENERAL_UPDATES.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The disaster id if this is a per-disaster room.
    pub fn disaster_id(&self) -> Option<&str> {
        self.0.strip_prefix(DISASTER_PREFIX)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery target of a broadcast event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Audience {
    /// Every connected observer, regardless of membership.
    All,
    /// Current members of one topic.
    Topic(Topic),
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::All => f.write_str("ALL"),
            Audience::Topic(topic) => topic.fmt(f),
        }
    }
}

impl From<Topic> for Audience {
    fn from(topic: Topic) -> Self {
        Audience::Topic(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disaster_topic_format() {
        let topic = Topic::disaster("abc");
        assert_eq!(topic.as_str(), "disaster_abc");
        assert_eq!(topic.disaster_id(), Some("abc"));
        assert_eq!(Topic::general_updates().disaster_id(), None);
    }

    #[test]
    fn test_audience_display() {
        assert_eq!(Audience::All.to_string(), "ALL");
        assert_eq!(
            Audience::from(Topic::general_updates()).to_string(),
            "general_updates"
        );
    }
}
