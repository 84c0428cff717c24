//! Mock social-media feed.
//!
//! Generates a fixed set of four reports around lower Manhattan. Twitter
//! and Bluesky requests are answered from the same generator until real
//! integrations exist; the snapshot shape is identical either way.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use relief_core::{SocialFeedSnapshot, SocialMediaReport, SocialSource, Timestamp, Urgency};

use crate::{SocialFeed, UpstreamResult};

/// Source label carried by every mock snapshot.
pub const MOCK_SOURCE: &str = "mock_twitter_api";

struct Template {
    id: &'static str,
    user: &'static str,
    body: &'static str,
    /// Hashtag appended when this keyword was requested.
    keyword_tag: Option<&'static str>,
    trailer: &'static str,
    max_age_secs: i64,
    urgency: Urgency,
    location: &'static str,
    max_engagement: u32,
    verified: bool,
}

const TEMPLATES: &[Template] = &[
    Template {
        id: "mock_1",
        user: "citizen1",
        body: "#floodrelief Need food and water in lower manhattan area. Family of 4 stranded.",
        keyword_tag: Some("flood"),
        trailer: "",
        max_age_secs: 3600,
        urgency: Urgency::High,
        location: "Lower Manhattan",
        max_engagement: 100,
        verified: false,
    },
    Template {
        id: "mock_2",
        user: "emergencyvolunteer",
        body: "Shelter available at community center on 5th street. Can accommodate 20 people.",
        keyword_tag: Some("shelter"),
        trailer: "#disasterrelief",
        max_age_secs: 7200,
        urgency: Urgency::Medium,
        location: "5th Street",
        max_engagement: 50,
        verified: true,
    },
    Template {
        id: "mock_3",
        user: "localresident",
        body: "Roads completely flooded near central park. Emergency vehicles having trouble \
               getting through. #emergency",
        keyword_tag: Some("flood"),
        trailer: "",
        max_age_secs: 1800,
        urgency: Urgency::High,
        location: "Central Park",
        max_engagement: 200,
        verified: false,
    },
    Template {
        id: "mock_4",
        user: "redcross_volunteer",
        body: "Medical aid station set up at Washington Square Park. Treating minor injuries and \
               providing first aid. #medicalaid #disasterresponse",
        keyword_tag: None,
        trailer: "",
        max_age_secs: 5400,
        urgency: Urgency::Medium,
        location: "Washington Square Park",
        max_engagement: 75,
        verified: true,
    },
];

impl Template {
    fn render(&self, keywords: &[String], now: Timestamp, rng: &mut impl Rng) -> SocialMediaReport {
        let mut content = self.body.to_string();
        if let Some(tag) = self.keyword_tag.filter(|t| keywords.iter().any(|k| k == t)) {
            content.push_str(" #");
            content.push_str(tag);
        }
        if !self.trailer.is_empty() {
            content.push(' ');
            content.push_str(self.trailer);
        }
        SocialMediaReport {
            id: self.id.to_string(),
            user: self.user.to_string(),
            content,
            timestamp: now - Duration::seconds(rng.random_range(0..self.max_age_secs)),
            urgency: self.urgency,
            location_mentioned: Some(self.location.to_string()),
            engagement: rng.random_range(0..self.max_engagement),
            verified: self.verified,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockSocialFeed;

impl MockSocialFeed {
    pub fn new() -> Self {
        Self
    }

    /// Render the canned reports and keep those mentioning any keyword.
    pub fn generate(&self, keywords: &[String]) -> SocialFeedSnapshot {
        let now = Utc::now();
        let mut rng = rand::rng();
        let reports: Vec<SocialMediaReport> = TEMPLATES
            .iter()
            .map(|t| t.render(keywords, now, &mut rng))
            .filter(|r| r.mentions_any(keywords))
            .collect();
        SocialFeedSnapshot::new(reports, MOCK_SOURCE, now)
    }
}

#[async_trait]
impl SocialFeed for MockSocialFeed {
    async fn fetch(
        &self,
        disaster_id: &str,
        keywords: &[String],
        source: SocialSource,
    ) -> UpstreamResult<SocialFeedSnapshot> {
        if source != SocialSource::Mock {
            tracing::info!(source = %source, "Social source not integrated, using mock data");
        }
        let snapshot = self.generate(keywords);
        tracing::info!(
            disaster_id,
            count = snapshot.total,
            "Generated mock social media reports"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(snapshot: &SocialFeedSnapshot) -> Vec<&str> {
        snapshot.reports.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_no_keywords_returns_all() {
        let snap = MockSocialFeed::new().generate(&[]);
        assert_eq!(ids(&snap), vec!["mock_1", "mock_2", "mock_3", "mock_4"]);
        assert_eq!(snap.total, 4);
        assert_eq!(snap.source, MOCK_SOURCE);
    }

    #[test]
    fn test_keyword_filter() {
        let snap = MockSocialFeed::new().generate(&["flood".to_string()]);
        assert_eq!(ids(&snap), vec!["mock_1", "mock_3"]);
        assert!(snap.reports.iter().all(|r| r.content.ends_with("#flood")));
    }

    #[test]
    fn test_keyword_is_case_insensitive() {
        let snap = MockSocialFeed::new().generate(&["MEDICAL".to_string()]);
        assert_eq!(ids(&snap), vec!["mock_4"]);
    }

    #[test]
    fn test_timestamps_not_in_future() {
        let snap = MockSocialFeed::new().generate(&[]);
        assert!(snap.reports.iter().all(|r| r.timestamp <= snap.last_updated));
    }

    #[tokio::test]
    async fn test_other_sources_answer_with_mock() -> UpstreamResult<()> {
        let feed = MockSocialFeed::new();
        let snap = feed.fetch("d1", &[], SocialSource::Bluesky).await?;
        assert_eq!(snap.source, MOCK_SOURCE);
        assert_eq!(snap.total, 4);
        Ok(())
    }
}
