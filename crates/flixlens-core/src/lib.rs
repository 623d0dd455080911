//! Core domain model and normalization helpers for Flixlens.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "flixlens-core";

/// Accepted `date_added` input formats, tried in order. Output is always `%Y-%m-%d`.
pub const DATE_FORMATS: [&str; 4] = ["%B %d, %Y", "%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

/// One row of the `netflix_titles` table.
///
/// Multi-valued text fields (`country`, `listed_in`) are stored as-is;
/// normalization happens per consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TitleRecord {
    pub show_id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub director: Option<String>,
    pub cast: Option<String>,
    pub country: Option<String>,
    pub date_added: Option<String>,
    pub release_year: Option<i64>,
    pub rating: Option<String>,
    pub duration: Option<String>,
    pub listed_in: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub awards: i64,
    #[serde(default)]
    pub political_context_score: f64,
    pub conflict_intensity: Option<String>,
    pub event_keywords: Option<String>,
    pub genre: Option<String>,
}

/// Export variant that keeps multi-valued fields as lists and derives a
/// duration kind/value pair from the free-text duration field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedTitle {
    pub show_id: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub director: Option<String>,
    pub cast: Option<String>,
    pub country: Option<String>,
    pub date_added: Option<String>,
    pub release_year: Option<i64>,
    pub rating: Option<String>,
    pub duration: Option<String>,
    pub listed_in: Option<String>,
    pub description: Option<String>,
    pub awards: i64,
    pub political_context_score: f64,
    pub conflict_intensity: Option<String>,
    pub event_keywords: Option<String>,
    pub genre: Option<String>,
    pub countries: Vec<String>,
    pub genres: Vec<String>,
    #[serde(rename = "duration_type")]
    pub duration_kind: Option<DurationKind>,
    pub duration_value: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationKind {
    Seasons,
    Minutes,
}

/// Per-country content preference, persisted to `country_preferences.json`
/// and recomputed in full on every dashboard run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryPreference {
    pub country: String,
    pub escapism_score: f64,
    pub reality_score: f64,
    pub preference_ratio: f64,
    pub preference: String,
}

pub const ESCAPISM_LABEL: &str = "Preference for Escapism";
pub const REALITY_LABEL: &str = "Preference for Reality";
pub const BALANCED_LABEL: &str = "Balanced Content Preference";

/// Label a preference ratio. NaN (0/0) falls through to balanced.
pub fn preference_label(ratio: f64) -> &'static str {
    if ratio > 1.2 {
        ESCAPISM_LABEL
    } else if ratio < 0.8 {
        REALITY_LABEL
    } else {
        BALANCED_LABEL
    }
}

/// First comma-separated token, trimmed. None for empty input.
pub fn first_token(raw: &str) -> Option<String> {
    raw.split(',')
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Split a comma-separated field into trimmed, non-empty tokens.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reparse a free-text `date_added` value into `%Y-%m-%d`.
///
/// First matching format wins; unparseable input yields None, never an error.
pub fn normalize_date_added(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(trimmed, fmt)
            .ok()
            .map(|date| date.format("%Y-%m-%d").to_string())
    })
}

/// Detect whether a duration denotes seasons or minutes and extract the
/// embedded integer, e.g. "90 min" -> (Minutes, 90), "2 Seasons" -> (Seasons, 2).
pub fn parse_duration(raw: &str) -> Option<(DurationKind, i64)> {
    let kind = if raw.contains("Season") || raw.contains("season") {
        DurationKind::Seasons
    } else if raw.contains("min") {
        DurationKind::Minutes
    } else {
        return None;
    };
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().ok().map(|value| (kind, value))
}

/// Explode multi-valued country fields into a sorted, deduplicated list.
pub fn explode_countries<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: Vec<String> = values
        .into_iter()
        .flat_map(|v| split_list(v))
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_token_takes_first_trimmed_value() {
        assert_eq!(first_token("A, B, C"), Some("A".to_string()));
        assert_eq!(first_token("  United States , Canada"), Some("United States".to_string()));
        assert_eq!(first_token("France"), Some("France".to_string()));
        assert_eq!(first_token(""), None);
        assert_eq!(first_token("   "), None);
    }

    #[test]
    fn all_accepted_date_formats_normalize() {
        assert_eq!(normalize_date_added("September 9, 2019"), Some("2019-09-09".to_string()));
        assert_eq!(normalize_date_added("2019-09-09"), Some("2019-09-09".to_string()));
        assert_eq!(normalize_date_added("09/12/2019"), Some("2019-12-09".to_string()));
        // %d/%m/%Y wins over %m/%d/%Y when both could match
        assert_eq!(normalize_date_added("25/12/2020"), Some("2020-12-25".to_string()));
    }

    #[test]
    fn unparseable_dates_yield_none() {
        assert_eq!(normalize_date_added("sometime in 2019"), None);
        assert_eq!(normalize_date_added("2019/09/09"), None);
        assert_eq!(normalize_date_added(""), None);
    }

    #[test]
    fn duration_parsing_detects_kind_and_value() {
        assert_eq!(parse_duration("90 min"), Some((DurationKind::Minutes, 90)));
        assert_eq!(parse_duration("2 Seasons"), Some((DurationKind::Seasons, 2)));
        assert_eq!(parse_duration("1 Season"), Some((DurationKind::Seasons, 1)));
        assert_eq!(parse_duration("unknown"), None);
    }

    #[test]
    fn preference_label_thresholds() {
        assert_eq!(preference_label(1.5), ESCAPISM_LABEL);
        assert_eq!(preference_label(0.5), REALITY_LABEL);
        assert_eq!(preference_label(1.0), BALANCED_LABEL);
        assert_eq!(preference_label(1.2), BALANCED_LABEL);
        assert_eq!(preference_label(0.8), BALANCED_LABEL);
        assert_eq!(preference_label(f64::INFINITY), ESCAPISM_LABEL);
        assert_eq!(preference_label(f64::NAN), BALANCED_LABEL);
    }

    #[test]
    fn explode_countries_dedups_and_sorts() {
        let exploded = explode_countries(["United States, Canada", "France"]);
        assert_eq!(exploded, vec!["Canada", "France", "United States"]);
    }
}
