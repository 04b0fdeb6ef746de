use super::vocabulary::{self, MatchKind};
use crate::model::JobQuery;

/// Highest confidence the local heuristic will ever report.
pub const MAX_CONFIDENCE: f64 = 0.6;

const STRUCTURE_MARKERS: &[&str] = &[" in ", " near ", " at ", " around "];
const FILLER_WORDS: &[&str] = &[
    "jobs", "job", "positions", "position", "roles", "role", "openings", "salary", "salaries",
    "hiring", "for", "looking", "find", "me", "a", "an", "the", "open",
];

/// Title/location extracted without the interpretation service.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicParse {
    pub title: Option<String>,
    pub location: Option<String>,
    pub confidence: f64,
}

/// Deterministic keyword extraction against the fixed vocabulary.
///
/// Scoring: vocabulary title 0.30 (alias 0.20, free text 0.10), vocabulary
/// location 0.25 (free text 0.10), "<title> in <location>" shape 0.05,
/// capped at [`MAX_CONFIDENCE`]. Structured hints win over extraction.
pub fn extract(query: &JobQuery) -> HeuristicParse {
    let raw = query.raw.trim();
    let lower = raw.to_ascii_lowercase();
    let split = STRUCTURE_MARKERS
        .iter()
        .filter_map(|marker| lower.find(marker).map(|at| (at, marker.len())))
        .min_by_key(|(at, _)| *at);
    let (title_part, location_part) = match split {
        Some((at, len)) => (&raw[..at], Some(&raw[at + len..])),
        None => (raw, None),
    };

    let mut score: f64 = 0.0;

    let title = match vocabulary::clean(query.title_hint.as_deref()) {
        Some(hint) => match vocabulary::canonical_title(&hint) {
            Some((canonical, _)) => {
                score += 0.3;
                Some(canonical.to_string())
            }
            None => {
                score += 0.2;
                Some(vocabulary::title_case(&hint))
            }
        },
        None => match vocabulary::find_title(title_part) {
            Some((canonical, MatchKind::Canonical)) => {
                score += 0.3;
                Some(canonical.to_string())
            }
            Some((canonical, MatchKind::Alias)) => {
                score += 0.2;
                Some(canonical.to_string())
            }
            None => strip_filler(title_part).map(|text| {
                score += 0.1;
                vocabulary::title_case(&text)
            }),
        },
    };

    let location = match vocabulary::clean(query.location_hint.as_deref()) {
        Some(hint) => {
            score += if vocabulary::is_known_location(&hint) { 0.25 } else { 0.15 };
            Some(vocabulary::normalize_location(&hint))
        }
        None => match location_part.and_then(vocabulary::find_location) {
            Some(location) => {
                score += 0.25;
                Some(location)
            }
            None => location_part
                .and_then(|text| vocabulary::clean(Some(text)))
                .map(|text| {
                    score += 0.1;
                    vocabulary::normalize_location(&text)
                }),
        },
    };

    if split.is_some() || (query.title_hint.is_some() && query.location_hint.is_some()) {
        score += 0.05;
    }

    HeuristicParse {
        title,
        location,
        confidence: f64::min((score * 100.0).round() / 100.0, MAX_CONFIDENCE),
    }
}

fn strip_filler(text: &str) -> Option<String> {
    let words: Vec<&str> = text
        .split_whitespace()
        .filter(|word| !FILLER_WORDS.contains(&word.to_lowercase().as_str()))
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}
