//! Fixed title/location vocabulary and text normalization helpers.

/// Canonical job titles with their lowercase aliases.
const TITLES: &[(&str, &[&str])] = &[
    (
        "Software Engineer",
        &["software developer", "software dev", "swe", "developer", "programmer", "coder"],
    ),
    ("Web Developer", &["web dev", "frontend developer", "front end developer"]),
    ("DevOps Engineer", &["devops", "site reliability engineer", "sre"]),
    ("Data Scientist", &["data science", "ml engineer", "machine learning engineer"]),
    ("Data Analyst", &["business analyst", "bi analyst"]),
    ("Product Manager", &["product owner"]),
    ("Project Manager", &["program manager"]),
    ("Registered Nurse", &["rn", "nurse", "nursing"]),
    ("Medical Assistant", &["clinical assistant"]),
    ("Pharmacist", &["pharmacy"]),
    ("Physical Therapist", &["physiotherapist", "physical therapy"]),
    ("Dental Hygienist", &["hygienist"]),
    ("HVAC Technician", &["hvac tech", "hvac", "hvac mechanic"]),
    ("Electrician", &["electrical technician"]),
    ("Plumber", &["pipefitter"]),
    ("Truck Driver", &["cdl driver", "trucker", "delivery driver"]),
    ("Accountant", &["cpa", "bookkeeper"]),
    ("Financial Analyst", &["finance analyst"]),
    ("Marketing Manager", &["marketing lead"]),
    ("Sales Representative", &["sales rep", "account executive"]),
    (
        "Customer Service Representative",
        &["customer service", "csr", "call center agent"],
    ),
    ("Teacher", &["educator", "school teacher"]),
    ("Mechanical Engineer", &["mechanical engineering"]),
    ("Civil Engineer", &["civil engineering"]),
    ("Electrical Engineer", &["electrical engineering"]),
    ("Graphic Designer", &["visual designer"]),
    ("UX Designer", &["ui ux designer", "ux", "product designer"]),
    ("Cybersecurity Analyst", &["security analyst", "infosec analyst"]),
];

/// Known cities as (city, state abbreviation, extra aliases).
const CITIES: &[(&str, &str, &[&str])] = &[
    ("New York", "NY", &["nyc", "new york city", "manhattan"]),
    ("Los Angeles", "CA", &["la"]),
    ("San Francisco", "CA", &["sf", "bay area"]),
    ("San Jose", "CA", &[]),
    ("San Diego", "CA", &[]),
    ("Seattle", "WA", &[]),
    ("Portland", "OR", &[]),
    ("Austin", "TX", &[]),
    ("Dallas", "TX", &[]),
    ("Houston", "TX", &[]),
    ("San Antonio", "TX", &[]),
    ("Denver", "CO", &[]),
    ("Phoenix", "AZ", &[]),
    ("Chicago", "IL", &["chi"]),
    ("Boston", "MA", &[]),
    ("Washington", "DC", &["dc", "washington dc"]),
    ("Atlanta", "GA", &["atl"]),
    ("Miami", "FL", &[]),
    ("Orlando", "FL", &[]),
    ("Tampa", "FL", &[]),
    ("Charlotte", "NC", &[]),
    ("Raleigh", "NC", &[]),
    ("Nashville", "TN", &[]),
    ("Minneapolis", "MN", &[]),
    ("Detroit", "MI", &[]),
    ("Philadelphia", "PA", &["philly"]),
    ("Pittsburgh", "PA", &[]),
    ("Las Vegas", "NV", &["vegas"]),
    ("Salt Lake City", "UT", &["slc"]),
    ("Columbus", "OH", &[]),
];

const STATES: &[(&str, &str)] = &[
    ("AL", "alabama"), ("AK", "alaska"), ("AZ", "arizona"), ("AR", "arkansas"),
    ("CA", "california"), ("CO", "colorado"), ("CT", "connecticut"), ("DE", "delaware"),
    ("DC", "district of columbia"), ("FL", "florida"), ("GA", "georgia"), ("HI", "hawaii"),
    ("ID", "idaho"), ("IL", "illinois"), ("IN", "indiana"), ("IA", "iowa"),
    ("KS", "kansas"), ("KY", "kentucky"), ("LA", "louisiana"), ("ME", "maine"),
    ("MD", "maryland"), ("MA", "massachusetts"), ("MI", "michigan"), ("MN", "minnesota"),
    ("MS", "mississippi"), ("MO", "missouri"), ("MT", "montana"), ("NE", "nebraska"),
    ("NV", "nevada"), ("NH", "new hampshire"), ("NJ", "new jersey"), ("NM", "new mexico"),
    ("NY", "new york"), ("NC", "north carolina"), ("ND", "north dakota"), ("OH", "ohio"),
    ("OK", "oklahoma"), ("OR", "oregon"), ("PA", "pennsylvania"), ("RI", "rhode island"),
    ("SC", "south carolina"), ("SD", "south dakota"), ("TN", "tennessee"), ("TX", "texas"),
    ("UT", "utah"), ("VT", "vermont"), ("VA", "virginia"), ("WA", "washington"),
    ("WV", "west virginia"), ("WI", "wisconsin"), ("WY", "wyoming"),
];

const REMOTE: &str = "Remote";

/// How a vocabulary entry was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Canonical,
    Alias,
}

/// Lowercase, punctuation folded to spaces, whitespace collapsed.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when `phrase` occurs in `haystack` on word boundaries. Both folded.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    !phrase.is_empty() && format!(" {haystack} ").contains(&format!(" {phrase} "))
}

/// Drop placeholder values ("none", "n/a", ...) and surrounding whitespace.
pub fn clean(text: Option<&str>) -> Option<String> {
    let text = text?.trim();
    if text.is_empty() {
        return None;
    }
    match text.to_lowercase().as_str() {
        "none" | "n/a" | "na" | "null" | "unknown" | "not specified" => None,
        _ => Some(text.to_string()),
    }
}

/// Title-case each word, keeping short all-caps tokens (HVAC, TX) as they are.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
            if !letters.is_empty() && letters.len() <= 4 && letters.iter().all(|c| c.is_uppercase()) {
                return word.to_string();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Exact lookup of a whole title (canonical name or alias).
pub fn canonical_title(text: &str) -> Option<(&'static str, MatchKind)> {
    let folded = fold(text);
    TITLES.iter().find_map(|(canonical, aliases)| {
        if fold(canonical) == folded {
            Some((*canonical, MatchKind::Canonical))
        } else if aliases.iter().any(|alias| fold(alias) == folded) {
            Some((*canonical, MatchKind::Alias))
        } else {
            None
        }
    })
}

/// Longest vocabulary title mentioned anywhere in `text`.
pub fn find_title(text: &str) -> Option<(&'static str, MatchKind)> {
    let folded = fold(text);
    let mut best: Option<(&'static str, MatchKind, usize)> = None;
    for (canonical, aliases) in TITLES {
        let candidates = std::iter::once((*canonical, MatchKind::Canonical))
            .chain(aliases.iter().map(|alias| (*alias, MatchKind::Alias)));
        for (phrase, kind) in candidates {
            let phrase = fold(phrase);
            if contains_phrase(&folded, &phrase)
                && best.is_none_or(|(_, _, len)| phrase.len() > len)
            {
                best = Some((*canonical, kind, phrase.len()));
            }
        }
    }
    best.map(|(canonical, kind, _)| (canonical, kind))
}

fn city_phrases(city: &str, state: &str, extras: &[&str]) -> Vec<String> {
    let city = fold(city);
    let state_name = STATES
        .iter()
        .find(|(abbr, _)| *abbr == state)
        .map(|(_, name)| *name)
        .unwrap_or_default();
    let mut phrases = vec![
        format!("{city} {}", state.to_lowercase()),
        format!("{city} {state_name}"),
        city,
    ];
    phrases.extend(extras.iter().map(|extra| fold(extra)));
    phrases
}

/// Exact lookup of a whole location, e.g. "austin", "Austin, Texas", "nyc".
pub fn canonical_location(text: &str) -> Option<String> {
    let folded = fold(text);
    if folded == "remote" {
        return Some(REMOTE.to_string());
    }
    CITIES.iter().find_map(|(city, state, extras)| {
        city_phrases(city, state, extras)
            .iter()
            .any(|phrase| *phrase == folded)
            .then(|| format!("{city}, {state}"))
    })
}

/// Longest vocabulary location mentioned anywhere in `text`.
pub fn find_location(text: &str) -> Option<String> {
    let folded = fold(text);
    let mut best: Option<(String, usize)> = None;
    for (city, state, extras) in CITIES {
        for phrase in city_phrases(city, state, extras) {
            if contains_phrase(&folded, &phrase)
                && best.as_ref().is_none_or(|(_, len)| phrase.len() > *len)
            {
                best = Some((format!("{city}, {state}"), phrase.len()));
            }
        }
    }
    best.map(|(location, _)| location)
        .or_else(|| contains_phrase(&folded, "remote").then(|| REMOTE.to_string()))
}

pub fn is_known_title(title: &str) -> bool {
    canonical_title(title).is_some()
}

pub fn is_known_location(location: &str) -> bool {
    canonical_location(location).is_some()
}

/// "TX", "texas", "New York" (the state).
pub fn is_state(text: &str) -> bool {
    let folded = fold(text);
    STATES
        .iter()
        .any(|(abbr, name)| abbr.to_lowercase() == folded || *name == folded)
}

/// Canonical form of a title: vocabulary name if known, title-cased otherwise.
pub fn normalize_title(text: &str) -> String {
    canonical_title(text)
        .map(|(canonical, _)| canonical.to_string())
        .unwrap_or_else(|| title_case(text.trim()))
}

/// Canonical form of a location: "City, ST" if known, title-cased otherwise.
pub fn normalize_location(text: &str) -> String {
    canonical_location(text).unwrap_or_else(|| {
        let text = text.trim();
        match text.rsplit_once(',') {
            Some((city, state)) if is_state(state) => {
                let state = STATES
                    .iter()
                    .find(|(abbr, name)| abbr.eq_ignore_ascii_case(state.trim()) || *name == fold(state))
                    .map(|(abbr, _)| abbr.to_string())
                    .unwrap_or_else(|| state.trim().to_uppercase());
                format!("{}, {state}", title_case(city))
            }
            _ => title_case(text),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_drops_placeholders() {
        assert_eq!(clean(Some("  N/A ")), None);
        assert_eq!(clean(Some("Not specified")), None);
        assert_eq!(clean(Some("")), None);
        assert_eq!(clean(None), None);
        assert_eq!(clean(Some(" Nurse ")).as_deref(), Some("Nurse"));
    }

    #[test]
    fn title_case_keeps_acronyms() {
        assert_eq!(title_case("hvac technician"), "Hvac Technician");
        assert_eq!(title_case("HVAC technician"), "HVAC Technician");
        assert_eq!(title_case("sOFTWARE   engineer"), "Software Engineer");
    }

    #[test]
    fn titles_resolve_through_aliases() {
        assert_eq!(
            canonical_title("SWE"),
            Some(("Software Engineer", MatchKind::Alias))
        );
        assert_eq!(
            canonical_title("software engineer"),
            Some(("Software Engineer", MatchKind::Canonical))
        );
        assert_eq!(canonical_title("astronaut"), None);
        assert_eq!(normalize_title("hvac tech"), "HVAC Technician");
        assert_eq!(normalize_title("underwater welder"), "Underwater Welder");
    }

    #[test]
    fn find_title_prefers_longest_phrase() {
        assert_eq!(
            find_title("senior web developer jobs"),
            Some(("Web Developer", MatchKind::Canonical))
        );
        assert_eq!(
            find_title("developer roles in denver"),
            Some(("Software Engineer", MatchKind::Alias))
        );
        assert_eq!(find_title("astronaut in houston"), None);
    }

    #[test]
    fn locations_canonicalize() {
        assert_eq!(canonical_location("austin").as_deref(), Some("Austin, TX"));
        assert_eq!(canonical_location("Austin, Texas").as_deref(), Some("Austin, TX"));
        assert_eq!(canonical_location("NYC").as_deref(), Some("New York, NY"));
        assert_eq!(canonical_location("remote").as_deref(), Some("Remote"));
        assert_eq!(canonical_location("Smallville"), None);
        assert_eq!(normalize_location("smallville, kansas"), "Smallville, KS");
        assert_eq!(normalize_location("smallville"), "Smallville");
    }

    #[test]
    fn find_location_in_free_text() {
        assert_eq!(
            find_location("software engineer in Salt Lake City").as_deref(),
            Some("Salt Lake City, UT")
        );
        assert_eq!(find_location("nurse jobs in the bay area").as_deref(), Some("San Francisco, CA"));
        assert_eq!(find_location("nurse jobs"), None);
    }

    #[test]
    fn recognizes_states() {
        assert!(is_state("TX"));
        assert!(is_state(" texas "));
        assert!(!is_state("houston"));
    }
}
