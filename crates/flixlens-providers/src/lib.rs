//! External metadata lookups and the static political-events table.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

pub mod events;

pub use events::{EventEntry, Intensity, PoliticalEventsTable};

pub const CRATE_NAME: &str = "flixlens-providers";

pub const DEFAULT_OMDB_URL: &str = "http://www.omdbapi.com/";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} looking up {title:?}")]
    HttpStatus { status: u16, title: String },
}

/// What a title lookup yields. All fields are best-effort; the service is
/// treated as unreliable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TitleMetadata {
    pub title: Option<String>,
    pub country: Option<String>,
    pub awards_text: Option<String>,
}

/// Search-by-title seam over the movie-metadata service. Jobs depend on the
/// trait so tests can substitute a canned provider.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Returns None when the service reports no match.
    async fn lookup_title(&self, title: &str) -> Result<Option<TitleMetadata>, ProviderError>;
}

#[derive(Debug, Clone, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Country")]
    country: Option<String>,
    #[serde(rename = "Awards")]
    awards: Option<String>,
}

/// OMDb-style title search client.
#[derive(Debug, Clone)]
pub struct OmdbClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OmdbClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl MetadataProvider for OmdbClient {
    async fn lookup_title(&self, title: &str) -> Result<Option<TitleMetadata>, ProviderError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("t", title), ("apikey", &self.api_key)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                title: title.to_string(),
            });
        }

        let body: OmdbResponse = response.json().await?;
        if body.response != "True" {
            return Ok(None);
        }
        Ok(Some(TitleMetadata {
            title: body.title,
            country: body.country,
            awards_text: body.awards,
        }))
    }
}

/// Sum of nomination/win mentions in a free-text awards description,
/// e.g. "Won 2 Oscars. 5 wins & 3 nominations total." counts 3.
pub fn count_award_mentions(awards_text: &str) -> i64 {
    let lowered = awards_text.to_lowercase();
    let count = |needle: &str| lowered.matches(needle).count() as i64;
    count("nominat") + count("win") + count("won")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn award_mentions_sum_substring_hits() {
        assert_eq!(count_award_mentions("Won 2 Oscars. 5 wins & 3 nominations total."), 3);
        assert_eq!(count_award_mentions("Nominated for 1 Oscar. Another 4 wins & 2 nominations."), 3);
        assert_eq!(count_award_mentions("N/A"), 0);
        assert_eq!(count_award_mentions(""), 0);
    }

    #[test]
    fn omdb_response_parses_and_gates_on_response_flag() {
        let hit: OmdbResponse = serde_json::from_str(
            r#"{"Title":"Example","Country":"United States, Canada","Awards":"1 win.","Response":"True"}"#,
        )
        .unwrap();
        assert_eq!(hit.response, "True");
        assert_eq!(hit.country.as_deref(), Some("United States, Canada"));

        let miss: OmdbResponse =
            serde_json::from_str(r#"{"Response":"False","Error":"Movie not found!"}"#).unwrap();
        assert_eq!(miss.response, "False");
        assert_eq!(miss.country, None);
    }
}
