//! Speaker list retrieval
//!
//! Fetches the conference speaker page, falling back to a local HTML copy,
//! and extracts name/title/company triples from speaker cards.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{SourceConfig, ValidationConfig};
use crate::error::{OutreachError, Result};
use crate::models::{collapse_whitespace, SpeakerRecord};

/// Speaker fields as scraped, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSpeaker {
    pub name: String,
    pub title: String,
    pub company: String,
}

/// Anything that can produce a batch of raw speakers
#[async_trait]
pub trait SpeakerSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawSpeaker>>;
}

fn selectors(patterns: &[&str]) -> Vec<(String, Selector)> {
    patterns
        .iter()
        .filter_map(|p| Selector::parse(p).ok().map(|s| (p.to_string(), s)))
        .collect()
}

static CARD_SELECTORS: Lazy<Vec<(String, Selector)>> = Lazy::new(|| {
    selectors(&[
        ".speaker",
        ".speaker-card",
        ".speaker-item",
        ".speaker-profile",
        "[class*=\"speaker\"]",
    ])
});

static NAME_SELECTORS: Lazy<Vec<(String, Selector)>> = Lazy::new(|| {
    selectors(&["h3", "h4", ".name", ".speaker-name", "[class*=\"name\"]"])
});

static TITLE_SELECTORS: Lazy<Vec<(String, Selector)>> = Lazy::new(|| {
    selectors(&[
        ".title",
        ".position",
        ".role",
        "[class*=\"title\"]",
        "[class*=\"position\"]",
    ])
});

static COMPANY_SELECTORS: Lazy<Vec<(String, Selector)>> = Lazy::new(|| {
    selectors(&[
        ".company",
        ".organization",
        "[class*=\"company\"]",
        "[class*=\"org\"]",
    ])
});

/// Collapse whitespace and drop `Speaker:` / `Name:` labels
pub fn clean_text(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    collapsed
        .replace("Speaker:", "")
        .replace("Name:", "")
        .trim()
        .to_string()
}

fn first_text(card: &ElementRef<'_>, candidates: &[(String, Selector)]) -> String {
    candidates
        .iter()
        .find_map(|(_, selector)| card.select(selector).next())
        .map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default()
}

/// Extract speakers from an HTML page.
///
/// Card selectors are tried in order and the first one that matches anything
/// is used. Cards missing any of the three fields are skipped.
pub fn parse_speakers_html(html: &str) -> Vec<RawSpeaker> {
    let document = Html::parse_document(html);

    let Some((pattern, cards)) = CARD_SELECTORS.iter().find_map(|(pattern, selector)| {
        let cards: Vec<ElementRef<'_>> = document.select(selector).collect();
        (!cards.is_empty()).then_some((pattern, cards))
    }) else {
        warn!("No speaker cards found in page");
        return Vec::new();
    };

    info!("Found {} speaker cards using selector: {}", cards.len(), pattern);

    cards
        .iter()
        .filter_map(|card| {
            let speaker = RawSpeaker {
                name: first_text(card, &NAME_SELECTORS),
                title: first_text(card, &TITLE_SELECTORS),
                company: first_text(card, &COMPANY_SELECTORS),
            };
            if speaker.name.is_empty() || speaker.title.is_empty() || speaker.company.is_empty() {
                debug!("Skipping incomplete speaker card: {:?}", speaker);
                None
            } else {
                Some(speaker)
            }
        })
        .collect()
}

/// Turn raw speakers into validated records, dropping invalid ones with a warning
pub fn validate_speakers(raw: Vec<RawSpeaker>, limits: &ValidationConfig) -> Vec<SpeakerRecord> {
    let total = raw.len();
    let records: Vec<SpeakerRecord> = raw
        .into_iter()
        .filter_map(
            |speaker| match SpeakerRecord::new(&speaker.name, &speaker.title, &speaker.company, limits) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Invalid speaker data for {:?}: {}", speaker.name, e);
                    None
                }
            },
        )
        .collect();

    if records.len() < total {
        info!("Validated {} of {} speakers", records.len(), total);
    }
    records
}

/// Live speaker page with a local HTML fallback
pub struct HtmlSpeakerSource {
    http: reqwest::Client,
    url: Option<String>,
    fallback_html: Option<PathBuf>,
}

impl HtmlSpeakerSource {
    /// Create a source.
    ///
    /// # Arguments
    /// * `url` - Live page to try first; `None` goes straight to the file
    /// * `fallback_html` - Local HTML copy used when the live page fails or is empty
    /// * `timeout` - Timeout for the live request
    pub fn new(url: Option<String>, fallback_html: Option<PathBuf>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OutreachError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url,
            fallback_html,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(
            Some(config.url.clone()),
            config.fallback_html.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn fetch_live(&self, url: &str) -> Result<Vec<RawSpeaker>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| OutreachError::FetchError(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OutreachError::FetchError(format!("{}: HTTP {}", url, status.as_u16())));
        }

        let html = response
            .text()
            .await
            .map_err(|e| OutreachError::FetchError(format!("{}: {}", url, e)))?;
        Ok(parse_speakers_html(&html))
    }

    async fn fetch_file(&self, path: &Path) -> Result<Vec<RawSpeaker>> {
        let html = tokio::fs::read_to_string(path).await.map_err(|e| {
            OutreachError::FetchError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(parse_speakers_html(&html))
    }
}

#[async_trait]
impl SpeakerSource for HtmlSpeakerSource {
    async fn fetch(&self) -> Result<Vec<RawSpeaker>> {
        if let Some(url) = &self.url {
            match self.fetch_live(url).await {
                Ok(speakers) if !speakers.is_empty() => {
                    info!("Scraped {} speakers from {}", speakers.len(), url);
                    return Ok(speakers);
                }
                Ok(_) => warn!("Live page {} had no speakers", url),
                Err(e) => warn!("Live scraping failed: {}", e),
            }
        }

        if let Some(path) = &self.fallback_html {
            match self.fetch_file(path).await {
                Ok(speakers) if !speakers.is_empty() => {
                    info!("Scraped {} speakers from {}", speakers.len(), path.display());
                    return Ok(speakers);
                }
                Ok(_) => warn!("Fallback file {} had no speakers", path.display()),
                Err(e) => warn!("Fallback scraping failed: {}", e),
            }
        }

        Err(OutreachError::FetchError(
            "No speakers found from the live page or the fallback file".to_string(),
        ))
    }
}
