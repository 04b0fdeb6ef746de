//! Structural pre-check of raw queries and plausibility of parsed fields.

use super::vocabulary::{self, contains_phrase, fold};

const SEPARATORS: &[&str] = &[" and ", " or ", " & ", ",", ";", " / "];

const NON_JOB_TOPICS: &[&str] = &[
    "cost of living",
    "housing cost",
    "rent",
    "weather",
    "population",
    "demographics",
    "crime rate",
    "schools",
    "education",
    "transportation",
    "culture",
    "food",
    "restaurants",
    "nightlife",
    "tourism",
    "attractions",
    "shopping",
    "entertainment",
];

const JOB_TERMS: &[&str] = &[
    "salary", "salaries", "pay", "wage", "wages", "income", "benefits", "job", "jobs", "career",
    "position", "role", "roles", "employment", "work", "hire", "hiring", "openings",
];

const VAGUE_LOCATION_WORDS: &[&str] = &["various", "including", "multiple"];

pub const MAX_TITLE_LEN: usize = 80;
pub const MAX_LOCATION_LEN: usize = 50;

/// Why a raw query cannot be interpreted at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl Rejection {
    fn new(message: &str, suggestions: &[&str]) -> Self {
        Self {
            message: message.to_string(),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Reject queries that no interpretation could turn into one (title, location) pair.
pub fn precheck(raw: &str) -> Result<(), Rejection> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return Err(Rejection::new(
            "Please enter a query with both a job title and a location",
            &[
                "Try: 'Software Engineer in New York'",
                "Try: 'Marketing Manager in Los Angeles'",
            ],
        ));
    }

    let folded = fold(&lower);
    let off_topic = NON_JOB_TOPICS.iter().any(|topic| contains_phrase(&folded, topic));
    let job_related = JOB_TERMS.iter().any(|term| contains_phrase(&folded, term));
    if off_topic && !job_related {
        return Err(Rejection::new(
            "This looks like a general question rather than a job search",
            &[
                "Format: '[Job Title] in [Location]'",
                "Example: 'Marketing Manager in Los Angeles'",
            ],
        ));
    }

    let (title_part, location_part) = match lower.split_once(" in ") {
        Some((title, location)) => (title, Some(location)),
        None => (lower.as_str(), None),
    };

    if location_part.is_some_and(lists_several_locations) {
        return Err(Rejection::new(
            "Multiple locations detected. Please enter one location at a time",
            &[
                "Try: 'Software Engineer in New York'",
                "Submit a separate query for each location",
            ],
        ));
    }

    if location_part.is_some() && SEPARATORS.iter().any(|sep| title_part.contains(sep)) {
        return Err(Rejection::new(
            "Multiple job titles detected. Please enter one job title at a time",
            &[
                "Try: 'Software Engineer in New York'",
                "Submit a separate query for each job title",
            ],
        ));
    }

    Ok(())
}

// "austin, tx" names one place; "austin, dallas" or "austin and dallas" names two.
fn lists_several_locations(location: &str) -> bool {
    if let Some((_, state)) = location.rsplit_once(',')
        && vocabulary::is_state(state)
        && !SEPARATORS.iter().any(|sep| location.trim_end_matches(state).trim_end_matches(',').contains(sep))
    {
        return false;
    }
    SEPARATORS.iter().any(|sep| location.contains(sep))
}

/// Problems found with a parsed title. Empty when plausible.
pub fn title_problems(raw: &str, title: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if title.chars().count() > MAX_TITLE_LEN {
        problems.push(format!("title longer than {MAX_TITLE_LEN} characters"));
    }
    if !vocabulary::is_known_title(title) && !mentioned_in(raw, title) {
        problems.push(format!("title '{title}' does not match the query"));
    }
    problems
}

/// Problems found with a parsed location. Empty when plausible.
pub fn location_problems(raw: &str, location: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if location.chars().count() > MAX_LOCATION_LEN {
        problems.push(format!("location longer than {MAX_LOCATION_LEN} characters"));
    }
    let folded = fold(location);
    if VAGUE_LOCATION_WORDS.iter().any(|word| contains_phrase(&folded, word)) {
        problems.push(format!("location '{location}' is not a single place"));
    }
    let city = location.split(',').next().unwrap_or(location);
    if !vocabulary::is_known_location(location) && !contains_phrase(&fold(raw), &fold(city)) {
        problems.push(format!("location '{location}' does not match the query"));
    }
    problems
}

// Single-word titles must occur; longer ones need at least half their words.
fn mentioned_in(raw: &str, title: &str) -> bool {
    let raw = fold(raw);
    let words: Vec<String> = fold(title).split(' ').map(str::to_string).collect();
    let matching = words.iter().filter(|word| raw.contains(word.as_str())).count();
    match words.len() {
        0 => false,
        1 => matching == 1,
        n => matching * 2 >= n,
    }
}

/// Messages for missing required fields.
pub fn missing_fields(title: Option<&str>, location: Option<&str>) -> Option<Rejection> {
    let message = match (title.is_some(), location.is_some()) {
        (true, true) => return None,
        (false, false) => "Missing required fields: job title and location",
        (false, true) => "Missing required field: job title",
        (true, false) => "Missing required field: location",
    };
    Some(Rejection::new(
        message,
        &[
            "Try: 'Software Engineer in New York'",
            "Format: '[Job Title] in [Location]'",
        ],
    ))
}
