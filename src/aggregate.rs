//! Final merge of scraped listings with their enrichment data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::enrichment;
use crate::interpreter::vocabulary;
use crate::model::{
    Enriched, EnrichmentKey, EnrichmentResult, JobListing, LaborStats, ParsedQuery, SalaryData,
};

const HOURS_PER_YEAR: f64 = 2080.0;
const DAYS_PER_YEAR: f64 = 260.0;
const WEEKS_PER_YEAR: f64 = 52.0;
const MONTHS_PER_YEAR: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayPeriod {
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl PayPeriod {
    fn per_year(self) -> f64 {
        match self {
            PayPeriod::Hour => HOURS_PER_YEAR,
            PayPeriod::Day => DAYS_PER_YEAR,
            PayPeriod::Week => WEEKS_PER_YEAR,
            PayPeriod::Month => MONTHS_PER_YEAR,
            PayPeriod::Year => 1.0,
        }
    }

    // Markers match whole words only, so "holidays" is not a day rate.
    fn detect(text: &str) -> Option<Self> {
        let folded = vocabulary::fold(text);
        [
            ("hour", PayPeriod::Hour),
            ("hourly", PayPeriod::Hour),
            ("hr", PayPeriod::Hour),
            ("day", PayPeriod::Day),
            ("daily", PayPeriod::Day),
            ("week", PayPeriod::Week),
            ("weekly", PayPeriod::Week),
            ("month", PayPeriod::Month),
            ("monthly", PayPeriod::Month),
            ("year", PayPeriod::Year),
            ("yearly", PayPeriod::Year),
            ("yr", PayPeriod::Year),
            ("annual", PayPeriod::Year),
            ("annually", PayPeriod::Year),
        ]
        .into_iter()
        .find(|(marker, _)| vocabulary::contains_phrase(&folded, marker))
        .map(|(_, period)| period)
    }
}

/// Salary as printed on a listing, e.g. "$41.10 - $55.35 an hour".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalaryRange {
    pub min: f64,
    pub max: f64,
    pub period: PayPeriod,
}

impl SalaryRange {
    /// Parse the first one or two dollar amounts in `text`. A single amount
    /// ("Up to $26 an hour") is both bounds. Without a period marker, amounts
    /// under 200 are hourly and the rest yearly.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        let amounts = dollar_amounts(&lower);
        let (&first, rest) = amounts.split_first()?;
        let second = rest.first().copied().unwrap_or(first);
        let (min, max) = if first <= second { (first, second) } else { (second, first) };
        let period = PayPeriod::detect(&lower).unwrap_or(if max < 200.0 {
            PayPeriod::Hour
        } else {
            PayPeriod::Year
        });
        Some(Self { min, max, period })
    }

    pub fn annual(&self) -> AnnualRange {
        let factor = self.period.per_year();
        AnnualRange {
            min: (self.min * factor).round(),
            max: (self.max * factor).round(),
        }
    }
}

/// Yearly salary bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnualRange {
    pub min: f64,
    pub max: f64,
}

impl AnnualRange {
    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

// "$120,000", "$41.10", "$85k".
fn dollar_amounts(text: &str) -> Vec<f64> {
    let mut amounts = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find('$') {
        rest = &rest[at + 1..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == ',' || c == '.'))
            .unwrap_or(rest.len());
        let digits: String = rest[..end].chars().filter(|c| *c != ',').collect();
        let digits = digits.trim_end_matches('.');
        if let Ok(mut value) = digits.parse::<f64>() {
            if rest[end..].starts_with('k') {
                value *= 1000.0;
            }
            amounts.push(value);
        }
        rest = &rest[end..];
    }
    amounts
}

/// Where a listing's pay sits relative to the labor-statistics median.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedianComparison {
    Above,
    Below,
    AtMedian,
}

/// One listing in the final output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedListing {
    pub listing: JobListing,
    pub key: EnrichmentKey,
    pub annual_salary: Option<AnnualRange>,
    pub labor: Enriched<LaborStats>,
    pub salary: Enriched<SalaryData>,
    pub vs_labor_median: Option<MedianComparison>,
}

impl AggregatedListing {
    pub fn fully_enriched(&self) -> bool {
        self.labor.is_available() && self.salary.is_available()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_listings: usize,
    pub fully_enriched: usize,
    pub degraded: usize,
    pub annual_min: Option<f64>,
    pub annual_max: Option<f64>,
    pub average_annual_midpoint: Option<f64>,
    pub above_labor_median: usize,
    pub below_labor_median: usize,
}

/// What a completed run hands back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub listings: Vec<AggregatedListing>,
    pub summary: RunSummary,
}

/// Merge listings with whatever enrichment succeeded. A listing whose key
/// has no result keeps both sources as unavailable.
pub fn aggregate(
    parsed: &ParsedQuery,
    listings: &[JobListing],
    enrichment: &[EnrichmentResult],
) -> RunOutput {
    let by_key: HashMap<&EnrichmentKey, &EnrichmentResult> =
        enrichment.iter().map(|result| (&result.key, result)).collect();

    let listings: Vec<AggregatedListing> = listings
        .iter()
        .map(|listing| {
            let key = enrichment::key_for(listing, parsed);
            let (labor, salary) = match by_key.get(&key) {
                Some(result) => (result.labor.clone(), result.salary.clone()),
                None => (
                    Enriched::Unavailable {
                        reason: "not enriched".to_string(),
                    },
                    Enriched::Unavailable {
                        reason: "not enriched".to_string(),
                    },
                ),
            };
            let annual_salary = listing
                .salary_range
                .as_deref()
                .and_then(SalaryRange::parse)
                .map(|range| range.annual());
            let vs_labor_median = compare(annual_salary, labor.data().and_then(|l| l.median_annual));
            AggregatedListing {
                listing: listing.clone(),
                key,
                annual_salary,
                labor,
                salary,
                vs_labor_median,
            }
        })
        .collect();

    let summary = summarize(&listings);
    RunOutput { listings, summary }
}

fn compare(annual: Option<AnnualRange>, median: Option<f64>) -> Option<MedianComparison> {
    let midpoint = annual?.midpoint();
    let median = median?;
    Some(if midpoint > median {
        MedianComparison::Above
    } else if midpoint < median {
        MedianComparison::Below
    } else {
        MedianComparison::AtMedian
    })
}

fn summarize(listings: &[AggregatedListing]) -> RunSummary {
    let ranges: Vec<AnnualRange> = listings.iter().filter_map(|l| l.annual_salary).collect();
    let fully_enriched = listings.iter().filter(|l| l.fully_enriched()).count();
    let count = |wanted: MedianComparison| {
        listings
            .iter()
            .filter(|l| l.vs_labor_median == Some(wanted))
            .count()
    };

    RunSummary {
        total_listings: listings.len(),
        fully_enriched,
        degraded: listings.len() - fully_enriched,
        annual_min: ranges.iter().map(|r| r.min).reduce(f64::min),
        annual_max: ranges.iter().map(|r| r.max).reduce(f64::max),
        average_annual_midpoint: (!ranges.is_empty())
            .then(|| (ranges.iter().map(AnnualRange::midpoint).sum::<f64>() / ranges.len() as f64).round()),
        above_labor_median: count(MedianComparison::Above),
        below_labor_median: count(MedianComparison::Below),
    }
}
