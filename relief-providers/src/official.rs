//! Official-updates aggregator.
//!
//! Serves canned bulletins from FEMA, the American Red Cross, NYC Emergency
//! Management and the CDC. When scrape targets are configured, bulletins
//! scraped from those pages are appended after the canned ones.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use relief_core::{OfficialUpdate, OfficialUpdatesSnapshot, ScrapedUpdate, Timestamp, Urgency};

use crate::scraper::PageScraper;
use crate::{OfficialUpdatesFeed, UpstreamResult};

/// Type value that disables filtering.
pub const GENERAL: &str = "general";

/// Category that is relevant to every disaster type.
const DECLARATION_CATEGORY: &str = "official_declaration";

struct Bulletin {
    id: &'static str,
    source: &'static str,
    title: &'static str,
    content: &'static str,
    url: &'static str,
    max_age_secs: i64,
    priority: Urgency,
    category: &'static str,
}

const BULLETINS: &[Bulletin] = &[
    Bulletin {
        id: "fema_001",
        source: "FEMA",
        title: "Emergency Declaration Issued for Flood-Affected Areas",
        content: "Federal Emergency Management Agency has issued an emergency declaration for \
                  affected regions. Federal aid is now available to supplement state and local \
                  response efforts.",
        url: "https://www.fema.gov/disaster/current",
        max_age_secs: 3600,
        priority: Urgency::High,
        category: DECLARATION_CATEGORY,
    },
    Bulletin {
        id: "redcross_001",
        source: "American Red Cross",
        title: "Emergency Shelters Now Open",
        content: "Multiple emergency shelters have been established across affected areas. \
                  Services include temporary housing, meals, and basic necessities for displaced \
                  families.",
        url: "https://www.redcross.org/get-help/disaster-relief-and-recovery-services",
        max_age_secs: 7200,
        priority: Urgency::High,
        category: "shelter_services",
    },
    Bulletin {
        id: "nyc_emergency_001",
        source: "NYC Emergency Management",
        title: "Public Safety Advisory: Road Closures and Transportation Updates",
        content: "Several major roadways remain closed due to flooding. Public transportation is \
                  operating on limited service. Citizens are advised to avoid non-essential \
                  travel.",
        url: "https://www1.nyc.gov/site/em/index.page",
        max_age_secs: 1800,
        priority: Urgency::Medium,
        category: "transportation",
    },
    Bulletin {
        id: "cdc_001",
        source: "CDC",
        title: "Health and Safety Guidelines for Flood-Affected Areas",
        content: "CDC provides guidance on water safety, food security, and health precautions \
                  following flood events. Avoid contact with floodwater and seek medical \
                  attention for any injuries.",
        url: "https://www.cdc.gov/disasters/floods/",
        max_age_secs: 5400,
        priority: Urgency::Medium,
        category: "health_safety",
    },
];

impl Bulletin {
    fn render(&self, now: Timestamp, rng: &mut impl Rng) -> OfficialUpdate {
        OfficialUpdate {
            id: self.id.to_string(),
            source: self.source.to_string(),
            title: self.title.to_string(),
            content: self.content.to_string(),
            url: self.url.to_string(),
            timestamp: now - Duration::seconds(rng.random_range(0..self.max_age_secs)),
            priority: self.priority,
            category: self.category.to_string(),
        }
    }
}

/// Keep updates whose content mentions `disaster_type`, plus declarations.
fn relevant(update: &OfficialUpdate, disaster_type: &str) -> bool {
    disaster_type.eq_ignore_ascii_case(GENERAL)
        || update.category == DECLARATION_CATEGORY
        || update
            .content
            .to_lowercase()
            .contains(&disaster_type.to_lowercase())
}

fn scraped_to_update(index: usize, scraped: ScrapedUpdate) -> OfficialUpdate {
    OfficialUpdate {
        id: format!("scraped_{:03}", index + 1),
        source: scraped.source,
        title: scraped.title,
        content: scraped.content,
        url: scraped.url,
        timestamp: scraped.timestamp,
        priority: Urgency::Medium,
        category: "scraped".to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgencyUpdatesFeed {
    scraper: Option<PageScraper>,
    scrape_urls: Vec<String>,
}

impl AgencyUpdatesFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also scrape `urls` on every fetch.
    pub fn with_scraping(scraper: PageScraper, urls: Vec<String>) -> Self {
        Self {
            scraper: Some(scraper),
            scrape_urls: urls,
        }
    }

    fn canned(&self, disaster_type: &str, now: Timestamp) -> Vec<OfficialUpdate> {
        let mut rng = rand::rng();
        BULLETINS
            .iter()
            .map(|b| b.render(now, &mut rng))
            .filter(|u| relevant(u, disaster_type))
            .collect()
    }

    async fn scraped(&self, disaster_type: &str) -> Vec<OfficialUpdate> {
        let Some(scraper) = &self.scraper else {
            return Vec::new();
        };
        let mut scraped = Vec::new();
        for url in &self.scrape_urls {
            scraped.extend(scraper.scrape(url).await);
        }
        scraped
            .into_iter()
            .enumerate()
            .map(|(i, s)| scraped_to_update(i, s))
            .filter(|u| relevant(u, disaster_type))
            .collect()
    }
}

#[async_trait]
impl OfficialUpdatesFeed for AgencyUpdatesFeed {
    async fn fetch(&self, disaster_type: &str) -> UpstreamResult<OfficialUpdatesSnapshot> {
        let now = Utc::now();
        let mut updates = self.canned(disaster_type, now);
        updates.extend(self.scraped(disaster_type).await);

        let mut sources: Vec<String> = BULLETINS.iter().map(|b| b.source.to_string()).collect();
        for update in &updates {
            if !sources.contains(&update.source) {
                sources.push(update.source.clone());
            }
        }

        tracing::info!(
            disaster_type,
            count = updates.len(),
            "Generated official updates"
        );
        Ok(OfficialUpdatesSnapshot::new(updates, sources, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(snapshot: &OfficialUpdatesSnapshot) -> Vec<&str> {
        snapshot.updates.iter().map(|u| u.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_general_returns_all() -> UpstreamResult<()> {
        let snap = AgencyUpdatesFeed::new().fetch(GENERAL).await?;
        assert_eq!(
            ids(&snap),
            vec!["fema_001", "redcross_001", "nyc_emergency_001", "cdc_001"]
        );
        assert_eq!(
            snap.sources,
            vec!["FEMA", "American Red Cross", "NYC Emergency Management", "CDC"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_type_filter_keeps_declarations() -> UpstreamResult<()> {
        let snap = AgencyUpdatesFeed::new().fetch("flood").await?;
        // "flooding" and "floodwater" mention the type; FEMA is a declaration.
        assert_eq!(ids(&snap), vec!["fema_001", "nyc_emergency_001", "cdc_001"]);
        assert_eq!(snap.total, 3);

        let snap = AgencyUpdatesFeed::new().fetch("earthquake").await?;
        assert_eq!(ids(&snap), vec!["fema_001"]);
        Ok(())
    }
}
