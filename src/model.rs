//! Data carried through a workflow run.
//!
//! Everything here is plain data: created by one stage, read by the next,
//! never mutated in place by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A caller's free-text job query, with optional structured hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQuery {
    pub raw: String,
    #[serde(default)]
    pub title_hint: Option<String>,
    #[serde(default)]
    pub location_hint: Option<String>,
    /// Overrides the configured listing cap for this query.
    #[serde(default)]
    pub max_results: Option<u32>,
}

impl JobQuery {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            title_hint: None,
            location_hint: None,
            max_results: None,
        }
    }

    pub fn with_hints(mut self, title: Option<String>, location: Option<String>) -> Self {
        self.title_hint = title.filter(|t| !t.trim().is_empty());
        self.location_hint = location.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

/// Which interpretation path produced a [`ParsedQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    Primary,
    Fallback,
}

impl std::fmt::Display for QuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuerySource::Primary => write!(f, "primary"),
            QuerySource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Structured, normalized form of a [`JobQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub title: String,
    pub location: String,
    /// Plausibility in `0.0..=1.0`.
    pub confidence: f64,
    pub source: QuerySource,
    /// Set when the result was accepted despite a failed validation or came
    /// from the local heuristic.
    pub low_confidence: bool,
}

impl ParsedQuery {
    pub fn key(&self) -> EnrichmentKey {
        EnrichmentKey {
            title: self.title.clone(),
            location: self.location.clone(),
        }
    }
}

/// One listing as returned by the scraping sub-service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListing {
    pub title: String,
    pub company: String,
    pub location: String,
    /// Raw salary text as shown on the listing, e.g. "$41.10 - $55.35 an hour".
    #[serde(default)]
    pub salary_range: Option<String>,
    pub url: String,
    #[serde(default = "Utc::now")]
    pub scraped_at: DateTime<Utc>,
}

/// Normalized (title, location) pair that enrichment data is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnrichmentKey {
    pub title: String,
    pub location: String,
}

impl std::fmt::Display for EnrichmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in {}", self.title, self.location)
    }
}

/// Labor-statistics reference data for an occupation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborStats {
    pub occupation: String,
    pub median_annual: Option<f64>,
    pub url: Option<String>,
}

/// Market salary reference data for a title in a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryData {
    pub min_annual: Option<f64>,
    pub max_annual: Option<f64>,
    pub median_annual: Option<f64>,
    pub currency: String,
}

/// Enrichment data from one source, or why it is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Enriched<T> {
    Available { data: T },
    Unavailable { reason: String },
}

impl<T> Enriched<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Enriched::Available { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Enriched::Available { data } => Some(data),
            Enriched::Unavailable { .. } => None,
        }
    }
}

/// Both enrichment sources for one [`EnrichmentKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub key: EnrichmentKey,
    pub labor: Enriched<LaborStats>,
    pub salary: Enriched<SalaryData>,
}

impl EnrichmentResult {
    pub fn fully_available(&self) -> bool {
        self.labor.is_available() && self.salary.is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_listing_deserializes_without_optional_fields() {
        let json = r#"{
            "title": "Software Engineer",
            "company": "Acme",
            "location": "Austin, TX",
            "url": "https://jobs.example/1"
        }"#;
        let listing: JobListing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.title, "Software Engineer");
        assert!(listing.salary_range.is_none());
    }

    #[test]
    fn job_listing_requires_url() {
        let json = r#"{"title": "x", "company": "y", "location": "z"}"#;
        assert!(serde_json::from_str::<JobListing>(json).is_err());
    }

    #[test]
    fn enriched_serializes_with_status_tag() {
        let value: Enriched<SalaryData> = Enriched::Unavailable {
            reason: "timeout".into(),
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["status"], "unavailable");
        assert_eq!(json["reason"], "timeout");
    }

    #[test]
    fn hints_drop_blank_values() {
        let query = JobQuery::new("nurse in Denver")
            .with_hints(Some("  ".into()), Some("Denver".into()));
        assert!(query.title_hint.is_none());
        assert_eq!(query.location_hint.as_deref(), Some("Denver"));
    }

    #[test]
    fn query_source_display() {
        assert_eq!(QuerySource::Primary.to_string(), "primary");
        assert_eq!(QuerySource::Fallback.to_string(), "fallback");
    }
}
