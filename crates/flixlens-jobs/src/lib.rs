//! Batch jobs over the title catalog: enrichment fills, cleaning/processing
//! exports, and dashboard generation. Jobs are run manually, in sequence,
//! each against its own run of the shared SQLite store.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flixlens_core::{
    first_token, normalize_date_added, parse_duration, split_list, ProcessedTitle, TitleRecord,
};
use flixlens_providers::{count_award_mentions, MetadataProvider, PoliticalEventsTable};
use flixlens_store::EnrichmentUpdate;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

pub mod dashboards;

pub const CRATE_NAME: &str = "flixlens-jobs";

/// Rows per transaction when rewriting the cleaned table.
const CLEAN_COMMIT_BATCH: usize = 100;

/// Explicit configuration passed into each job; no process-wide constants.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub dashboards_dir: PathBuf,
    pub metadata_base_url: String,
    pub metadata_api_key: String,
    pub request_pause: Duration,
}

impl JobConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("FLIXLENS_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("netflix_titles.db")),
            data_dir: std::env::var("FLIXLENS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            dashboards_dir: std::env::var("FLIXLENS_DASHBOARDS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("dashboards")),
            metadata_base_url: std::env::var("OMDB_API_URL")
                .unwrap_or_else(|_| flixlens_providers::DEFAULT_OMDB_URL.to_string()),
            metadata_api_key: std::env::var("OMDB_API_KEY").unwrap_or_default(),
            request_pause: std::env::var("FLIXLENS_REQUEST_PAUSE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FillCountriesSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scanned: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Fill missing countries from the metadata provider, one row at a time,
/// pausing between requests to respect the provider's rate limits.
///
/// Lookup failures are logged and leave the row unchanged.
pub async fn fill_missing_countries(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    pause: Duration,
) -> Result<FillCountriesSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();

    let rows = flixlens_store::titles_missing_country(pool).await?;
    info!("Found {} titles missing country data", rows.len());

    let mut updated = 0usize;
    let mut skipped = 0usize;
    for (index, row) in rows.iter().enumerate() {
        let Some(title) = row.title.as_deref().filter(|t| !t.trim().is_empty()) else {
            skipped += 1;
            continue;
        };
        match provider.lookup_title(title).await {
            Ok(Some(meta)) => {
                // first country reported by the source
                if let Some(country) = meta.country.as_deref().and_then(first_token) {
                    flixlens_store::update_country(pool, &row.show_id, &country).await?;
                    info!("Updated '{}' with country: {}", title, country);
                    updated += 1;
                } else {
                    info!("No country found for: {}", title);
                    skipped += 1;
                }
            }
            Ok(None) => {
                info!("No results for: {}", title);
                skipped += 1;
            }
            Err(err) => {
                warn!("Error with '{}': {}", title, err);
                skipped += 1;
            }
        }
        if index + 1 < rows.len() && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    Ok(FillCountriesSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        scanned: rows.len(),
        updated,
        skipped,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: usize,
    pub lookup_failures: usize,
}

/// One pass over every row filling awards, political context score and
/// intensity/keywords, and the primary genre. Per-row failures never abort
/// the pass; a failed awards lookup writes 0.
pub async fn enrich_titles(
    pool: &SqlitePool,
    provider: &dyn MetadataProvider,
    events: &PoliticalEventsTable,
) -> Result<EnrichSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();

    let targets = flixlens_store::enrichment_targets(pool).await?;
    let mut lookup_failures = 0usize;

    for target in &targets {
        let mut awards = 0i64;
        if let Some(title) = target.title.as_deref().filter(|t| !t.trim().is_empty()) {
            match provider.lookup_title(title).await {
                Ok(Some(meta)) => {
                    awards = meta.awards_text.as_deref().map(count_award_mentions).unwrap_or(0);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("Error getting awards for {}: {}", title, err);
                    lookup_failures += 1;
                }
            }
        }

        // Highest-scoring country wins; its event entry supplies the
        // intensity label and keyword list.
        let mut max_score = 0.0f64;
        let mut best_entry = None;
        if let (Some(country), Some(year)) = (target.country.as_deref(), target.release_year) {
            for candidate in split_list(country) {
                let score = events.score(Some(&candidate), Some(year));
                if score > max_score {
                    max_score = score;
                    best_entry = events.entry(&candidate, year);
                }
            }
        }

        let update = EnrichmentUpdate {
            awards,
            political_context_score: max_score,
            conflict_intensity: best_entry.map(|e| e.intensity.as_str().to_string()),
            event_keywords: best_entry.map(|e| e.keywords.clone()),
            genre: target.listed_in.as_deref().and_then(first_token),
        };
        flixlens_store::update_enrichment(pool, &target.show_id, &update).await?;
        info!(
            "Updated {:?}: Awards={}, Political Score={}, Genre={:?}",
            target.title, update.awards, update.political_context_score, update.genre
        );
    }

    Ok(EnrichSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        rows: targets.len(),
        lookup_failures,
    })
}

/// Reduce multi-valued fields to their first token and normalize the
/// date_added format. An unparseable date clears the field.
pub fn clean_title(record: &TitleRecord) -> TitleRecord {
    let mut cleaned = record.clone();
    cleaned.country = cleaned.country.as_deref().and_then(first_token);
    cleaned.listed_in = cleaned.listed_in.as_deref().and_then(first_token);
    if let Some(raw) = cleaned.date_added.as_deref() {
        let normalized = normalize_date_added(raw);
        if normalized.is_none() {
            warn!("Could not parse date '{}' for title {:?}", raw, cleaned.title);
        }
        cleaned.date_added = normalized;
    }
    cleaned
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanSummary {
    pub run_id: Uuid,
    pub rows: usize,
    pub distinct_countries: i64,
    pub distinct_genres: i64,
    pub snapshot_path: String,
}

/// Rewrite `netflix_titles_cleaned` from the source table and export the
/// cleaned rows to `data/netflix_titles.json`.
pub async fn run_clean(pool: &SqlitePool, config: &JobConfig) -> Result<CleanSummary> {
    let run_id = Uuid::new_v4();
    info!("Starting data cleanup process");

    let titles = flixlens_store::all_titles(pool).await?;
    info!("Found {} records to process", titles.len());

    let cleaned: Vec<TitleRecord> = titles.iter().map(clean_title).collect();
    flixlens_store::write_cleaned_rows(pool, &cleaned, CLEAN_COMMIT_BATCH).await?;

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let snapshot_path = config.data_dir.join("netflix_titles.json");
    let bytes = serde_json::to_vec_pretty(&cleaned).context("serializing cleaned snapshot")?;
    tokio::fs::write(&snapshot_path, bytes)
        .await
        .with_context(|| format!("writing {}", snapshot_path.display()))?;

    let stats = flixlens_store::cleaned_stats(pool).await?;
    info!(
        "Data cleanup complete: {} records, {} unique countries, {} unique primary genres",
        stats.total_rows, stats.distinct_countries, stats.distinct_genres
    );

    Ok(CleanSummary {
        run_id,
        rows: cleaned.len(),
        distinct_countries: stats.distinct_countries,
        distinct_genres: stats.distinct_genres,
        snapshot_path: snapshot_path.display().to_string(),
    })
}

/// Export variant that keeps countries/genres as lists and derives the
/// duration kind/value pair.
pub fn process_title(record: &TitleRecord) -> ProcessedTitle {
    let countries = record.country.as_deref().map(split_list).unwrap_or_default();
    let genres = record.listed_in.as_deref().map(split_list).unwrap_or_default();

    let date_added = record.date_added.as_deref().and_then(|raw| {
        let normalized = normalize_date_added(raw);
        if normalized.is_none() {
            warn!("Could not parse date '{}'", raw);
        }
        normalized
    });

    let (duration_kind, duration_value) = match record.duration.as_deref().and_then(parse_duration)
    {
        Some((kind, value)) => (Some(kind), Some(value)),
        None => (None, None),
    };

    ProcessedTitle {
        show_id: record.show_id.clone(),
        kind: record.kind.clone(),
        title: record.title.clone(),
        director: record.director.clone(),
        cast: record.cast.clone(),
        country: record.country.clone(),
        date_added,
        release_year: record.release_year,
        rating: record.rating.clone(),
        duration: record.duration.clone(),
        listed_in: record.listed_in.clone(),
        description: record.description.clone(),
        awards: record.awards,
        political_context_score: record.political_context_score,
        conflict_intensity: record.conflict_intensity.clone(),
        event_keywords: record.event_keywords.clone(),
        genre: record.genre.clone(),
        countries,
        genres,
        duration_kind,
        duration_value,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub run_id: Uuid,
    pub rows: usize,
    pub unique_countries: usize,
    pub snapshot_path: String,
}

/// The list-preserving export over the same source table; writes the named
/// variant snapshot and logs a country-volume ranking.
pub async fn run_process(pool: &SqlitePool, config: &JobConfig) -> Result<ProcessSummary> {
    let run_id = Uuid::new_v4();
    info!("Starting data processing");

    let titles = flixlens_store::all_titles(pool).await?;
    let processed: Vec<ProcessedTitle> = titles.iter().map(process_title).collect();

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let snapshot_path = config.data_dir.join("netflix_titles_processed.json");
    let bytes = serde_json::to_vec_pretty(&processed).context("serializing processed snapshot")?;
    tokio::fs::write(&snapshot_path, bytes)
        .await
        .with_context(|| format!("writing {}", snapshot_path.display()))?;

    // Country volume ranking, movies/shows split
    let mut by_country: std::collections::BTreeMap<String, (usize, usize)> = Default::default();
    for item in &processed {
        for country in &item.countries {
            let slot = by_country.entry(country.clone()).or_default();
            match item.kind.as_deref() {
                Some("Movie") => slot.0 += 1,
                Some("TV Show") => slot.1 += 1,
                _ => {}
            }
        }
    }
    let unique_countries = by_country.len();

    let mut ranked: Vec<_> = by_country.into_iter().collect();
    ranked.sort_by(|a, b| (b.1 .0 + b.1 .1).cmp(&(a.1 .0 + a.1 .1)));
    info!("Top 10 countries by content volume:");
    for (country, (movies, shows)) in ranked.into_iter().take(10) {
        info!(
            "{}: {} titles ({} movies, {} shows)",
            country,
            movies + shows,
            movies,
            shows
        );
    }

    Ok(ProcessSummary {
        run_id,
        rows: processed.len(),
        unique_countries,
        snapshot_path: snapshot_path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flixlens_core::DurationKind;
    use flixlens_providers::{ProviderError, TitleMetadata};
    use std::collections::HashMap;

    struct CannedProvider {
        by_title: HashMap<String, TitleMetadata>,
    }

    #[async_trait]
    impl MetadataProvider for CannedProvider {
        async fn lookup_title(&self, title: &str) -> Result<Option<TitleMetadata>, ProviderError> {
            Ok(self.by_title.get(title).cloned())
        }
    }

    fn fixture_title(show_id: &str, title: &str, country: Option<&str>) -> TitleRecord {
        TitleRecord {
            show_id: show_id.to_string(),
            kind: Some("Movie".to_string()),
            title: Some(title.to_string()),
            country: country.map(str::to_string),
            date_added: Some("September 9, 2019".to_string()),
            release_year: Some(2020),
            listed_in: Some("Dramas, International Movies".to_string()),
            duration: Some("90 min".to_string()),
            ..TitleRecord::default()
        }
    }

    #[test]
    fn clean_title_reduces_and_normalizes() {
        let record = TitleRecord {
            show_id: "s1".to_string(),
            country: Some("United States, Canada".to_string()),
            listed_in: Some("Dramas, International Movies".to_string()),
            date_added: Some("September 9, 2019".to_string()),
            ..TitleRecord::default()
        };
        let cleaned = clean_title(&record);
        assert_eq!(cleaned.country.as_deref(), Some("United States"));
        assert_eq!(cleaned.listed_in.as_deref(), Some("Dramas"));
        assert_eq!(cleaned.date_added.as_deref(), Some("2019-09-09"));
    }

    #[test]
    fn clean_title_clears_unparseable_dates() {
        let record = TitleRecord {
            show_id: "s1".to_string(),
            date_added: Some("sometime in 2019".to_string()),
            ..TitleRecord::default()
        };
        assert_eq!(clean_title(&record).date_added, None);
    }

    #[test]
    fn process_title_keeps_lists_and_derives_duration() {
        let record = TitleRecord {
            show_id: "s1".to_string(),
            country: Some("United States, Canada".to_string()),
            listed_in: Some("Dramas, International Movies".to_string()),
            duration: Some("2 Seasons".to_string()),
            ..TitleRecord::default()
        };
        let processed = process_title(&record);
        assert_eq!(processed.countries, vec!["United States", "Canada"]);
        assert_eq!(processed.genres, vec!["Dramas", "International Movies"]);
        assert_eq!(processed.duration_kind, Some(DurationKind::Seasons));
        assert_eq!(processed.duration_value, Some(2));
        // originals preserved alongside the lists
        assert_eq!(processed.country.as_deref(), Some("United States, Canada"));
    }

    #[tokio::test]
    async fn fill_countries_updates_from_first_reported_country() {
        let pool = flixlens_store::connect_memory().await.unwrap();
        flixlens_store::init_schema(&pool).await.unwrap();
        flixlens_store::insert_title(&pool, &fixture_title("s1", "Known Movie", None))
            .await
            .unwrap();
        flixlens_store::insert_title(&pool, &fixture_title("s2", "Unknown Movie", None))
            .await
            .unwrap();
        flixlens_store::insert_title(&pool, &fixture_title("s3", "Homebound", Some("France")))
            .await
            .unwrap();

        let provider = CannedProvider {
            by_title: HashMap::from([(
                "Known Movie".to_string(),
                TitleMetadata {
                    country: Some("United States, Canada".to_string()),
                    ..TitleMetadata::default()
                },
            )]),
        };

        let summary = fill_missing_countries(&pool, &provider, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 1);

        let titles = flixlens_store::all_titles(&pool).await.unwrap();
        assert_eq!(titles[0].country.as_deref(), Some("United States"));
        assert_eq!(titles[1].country, None);
        assert_eq!(titles[2].country.as_deref(), Some("France"));
    }

    #[tokio::test]
    async fn enrich_fills_awards_score_and_genre() {
        let pool = flixlens_store::connect_memory().await.unwrap();
        flixlens_store::init_schema(&pool).await.unwrap();
        flixlens_store::insert_title(
            &pool,
            &fixture_title("s1", "Decorated Movie", Some("USA, India")),
        )
        .await
        .unwrap();

        let provider = CannedProvider {
            by_title: HashMap::from([(
                "Decorated Movie".to_string(),
                TitleMetadata {
                    awards_text: Some("Won 2 Oscars. 5 wins & 3 nominations total.".to_string()),
                    ..TitleMetadata::default()
                },
            )]),
        };
        let events = PoliticalEventsTable::builtin();

        enrich_titles(&pool, &provider, &events).await.unwrap();

        let titles = flixlens_store::all_titles(&pool).await.unwrap();
        assert_eq!(titles[0].awards, 3);
        // USA 2020 (7.5) beats India 2020 (6.0)
        assert_eq!(titles[0].political_context_score, 7.5);
        assert_eq!(titles[0].conflict_intensity.as_deref(), Some("High"));
        assert_eq!(
            titles[0].event_keywords.as_deref(),
            Some("pandemic,protests,election")
        );
        assert_eq!(titles[0].genre.as_deref(), Some("Dramas"));
    }

    #[tokio::test]
    async fn clean_job_exports_first_tokens_end_to_end() {
        let pool = flixlens_store::connect_memory().await.unwrap();
        flixlens_store::init_schema(&pool).await.unwrap();
        flixlens_store::insert_title(
            &pool,
            &fixture_title("s1", "One", Some("United States, Canada")),
        )
        .await
        .unwrap();
        flixlens_store::insert_title(&pool, &fixture_title("s2", "Two", Some("France")))
            .await
            .unwrap();
        flixlens_store::insert_title(
            &pool,
            &fixture_title("s3", "Three", Some("India, United Kingdom")),
        )
        .await
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let config = JobConfig {
            db_path: dir.path().join("unused.db"),
            data_dir: dir.path().join("data"),
            dashboards_dir: dir.path().join("dashboards"),
            metadata_base_url: String::new(),
            metadata_api_key: String::new(),
            request_pause: Duration::ZERO,
        };

        let summary = run_clean(&pool, &config).await.unwrap();
        assert_eq!(summary.rows, 3);

        let raw = std::fs::read_to_string(dir.path().join("data/netflix_titles.json")).unwrap();
        let rows: Vec<TitleRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].country.as_deref(), Some("United States"));
        assert_eq!(rows[1].country.as_deref(), Some("France"));
        assert_eq!(rows[2].country.as_deref(), Some("India"));
    }

    #[tokio::test]
    async fn process_job_writes_named_variant_snapshot() {
        let pool = flixlens_store::connect_memory().await.unwrap();
        flixlens_store::init_schema(&pool).await.unwrap();
        flixlens_store::insert_title(
            &pool,
            &fixture_title("s1", "One", Some("United States, Canada")),
        )
        .await
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let config = JobConfig {
            db_path: dir.path().join("unused.db"),
            data_dir: dir.path().join("data"),
            dashboards_dir: dir.path().join("dashboards"),
            metadata_base_url: String::new(),
            metadata_api_key: String::new(),
            request_pause: Duration::ZERO,
        };

        let summary = run_process(&pool, &config).await.unwrap();
        assert_eq!(summary.rows, 1);
        assert_eq!(summary.unique_countries, 2);

        let raw =
            std::fs::read_to_string(dir.path().join("data/netflix_titles_processed.json")).unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(rows[0]["countries"], serde_json::json!(["United States", "Canada"]));
        assert_eq!(rows[0]["duration_type"], serde_json::json!("Minutes"));
        assert_eq!(rows[0]["duration_value"], serde_json::json!(90));
    }
}
