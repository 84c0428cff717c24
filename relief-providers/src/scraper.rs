//! Minimal bulletin scraper for agency web pages.
//!
//! Looks for `<article>` blocks and elements classed `news-item`, `update`
//! or `alert`, then takes the first heading (or `.title`) and the first
//! paragraph (or `.content` / `.description`) of each. Blocks without both
//! are skipped. Content is cut to 500 characters.

use std::time::Duration;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use relief_core::ScrapedUpdate;
use reqwest::Client;

use crate::http::{ensure_success, invalid_response, transport_error};
use crate::UpstreamResult;

const PROVIDER: &str = "scraper";
pub const MAX_CONTENT_CHARS: usize = 500;

static ARTICLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<article\b[^>]*>(.*?)</article>").expect("Invalid article regex")
});
static CLASSED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?is)<(?:div|section|li)\b[^>]*class\s*=\s*["'][^"']*"#,
        r#"\b(?:news-item|update|alert)\b[^"']*["'][^>]*>(.*?)</(?:div|section|li)>"#,
    ))
    .expect("Invalid block regex")
});
static TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?is)<h[1-3]\b[^>]*>(.*?)</h[1-3]>"#,
        r#"|<[a-z0-9]+\b[^>]*class\s*=\s*["'][^"']*\btitle\b[^"']*["'][^>]*>(.*?)</[a-z0-9]+>"#,
    ))
    .expect("Invalid title regex")
});
static BODY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"(?is)<p\b[^>]*>(.*?)</p>"#,
        r#"|<[a-z0-9]+\b[^>]*class\s*=\s*["'][^"']*\b(?:content|description)\b"#,
        r#"[^"']*["'][^>]*>(.*?)</[a-z0-9]+>"#,
    ))
    .expect("Invalid body regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("Invalid tag regex"));
static SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

fn first_capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack).and_then(|c| {
        c.iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| clean_text(m.as_str()))
            .filter(|s| !s.is_empty())
    })
}

fn clean_text(fragment: &str) -> String {
    let stripped = TAG.replace_all(fragment, " ");
    let decoded = stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    SPACE.replace_all(&decoded, " ").trim().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Pull bulletins out of an HTML document.
pub fn extract_updates(html: &str, source: &str, url: &str) -> Vec<ScrapedUpdate> {
    let now = Utc::now();
    ARTICLE
        .captures_iter(html)
        .chain(CLASSED_BLOCK.captures_iter(html))
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter_map(|block| {
            let title = first_capture(&TITLE, block)?;
            let content = first_capture(&BODY, block)?;
            Some(ScrapedUpdate {
                title,
                content: truncate_chars(&content, MAX_CONTENT_CHARS),
                source: source.to_string(),
                url: url.to_string(),
                timestamp: now,
            })
        })
        .collect()
}

/// Fetches pages with a bounded request and extracts bulletins.
#[derive(Debug, Clone)]
pub struct PageScraper {
    client: Client,
    timeout: Duration,
}

impl PageScraper {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Fetch and parse one page. Errors are returned to the caller.
    pub async fn try_scrape(&self, url: &str) -> UpstreamResult<Vec<ScrapedUpdate>> {
        let parsed = url::Url::parse(url).map_err(|e| invalid_response(PROVIDER, e.to_string()))?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        let response = self
            .client
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout, e))?;
        let html = ensure_success(PROVIDER, response)
            .await?
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout, e))?;
        Ok(extract_updates(&html, &host, url))
    }

    /// Like [`try_scrape`](Self::try_scrape) but any failure yields an
    /// empty list.
    pub async fn scrape(&self, url: &str) -> Vec<ScrapedUpdate> {
        match self.try_scrape(url).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::error!(url, error = %e, "Web scraping failed");
                Vec::new()
            }
        }
    }
}
