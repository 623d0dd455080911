//! SQLite persistence for the title catalog: pool setup, guarded schema
//! sync, and every row query/update the batch jobs and the API use.

use std::path::Path;

use flixlens_core::TitleRecord;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "flixlens-store";

pub const TITLES_TABLE: &str = "netflix_titles";
pub const CLEANED_TABLE: &str = "netflix_titles_cleaned";

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Open (or create) the catalog database file.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    Ok(pool)
}

/// In-memory database for tests. Pinned to a single connection so every
/// query sees the same memory store.
pub async fn connect_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

const CREATE_TITLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS netflix_titles (
        show_id TEXT PRIMARY KEY,
        type TEXT,
        title TEXT,
        director TEXT,
        "cast" TEXT,
        country TEXT,
        date_added TEXT,
        release_year INTEGER,
        rating TEXT,
        duration TEXT,
        listed_in TEXT,
        description TEXT
    )
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub default_value: Option<&'static str>,
}

/// The five derived-signal columns the enrichment jobs populate.
pub fn enrichment_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef { name: "awards", sql_type: "INTEGER", default_value: Some("0") },
        ColumnDef { name: "political_context_score", sql_type: "REAL", default_value: Some("0") },
        ColumnDef { name: "conflict_intensity", sql_type: "TEXT", default_value: None },
        ColumnDef { name: "event_keywords", sql_type: "TEXT", default_value: None },
        ColumnDef { name: "genre", sql_type: "TEXT", default_value: None },
    ]
}

/// Read actual column names via PRAGMA table_info.
pub async fn existing_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    let query = format!("PRAGMA table_info({table})");
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    Ok(rows.iter().map(|row| row.get("name")).collect())
}

/// Add any missing enrichment column. Idempotent; a failure adding one
/// column is logged and skipped, the remaining columns still run.
///
/// Returns the number of columns added.
pub async fn sync_enrichment_columns(pool: &SqlitePool) -> Result<usize> {
    let existing = existing_columns(pool, TITLES_TABLE).await?;
    let mut added = 0usize;

    for column in enrichment_columns() {
        if existing.iter().any(|name| name == column.name) {
            continue;
        }
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            TITLES_TABLE, column.name, column.sql_type
        );
        if let Some(default) = column.default_value {
            sql.push_str(&format!(" DEFAULT {default}"));
        }
        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => {
                info!("Added column: {}.{}", TITLES_TABLE, column.name);
                added += 1;
            }
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
                info!("Column {}.{} already present", TITLES_TABLE, column.name);
            }
            Err(err) => {
                warn!("Error adding column {}.{}: {}", TITLES_TABLE, column.name, err);
            }
        }
    }

    Ok(added)
}

/// Create the titles table if needed and bring the enrichment columns up to
/// date. Safe to run any number of times.
pub async fn init_schema(pool: &SqlitePool) -> Result<usize> {
    sqlx::query(CREATE_TITLES_SQL).execute(pool).await?;
    sync_enrichment_columns(pool).await
}

#[derive(Debug, Clone)]
pub struct MissingCountryRow {
    pub show_id: String,
    pub title: Option<String>,
}

/// Rows whose country is null or blank, the fill-countries job's input.
pub async fn titles_missing_country(pool: &SqlitePool) -> Result<Vec<MissingCountryRow>> {
    let rows = sqlx::query(
        "SELECT show_id, title FROM netflix_titles WHERE country IS NULL OR TRIM(country) = '' ORDER BY show_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| MissingCountryRow {
            show_id: row.get("show_id"),
            title: row.get("title"),
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct EnrichmentTarget {
    pub show_id: String,
    pub title: Option<String>,
    pub country: Option<String>,
    pub release_year: Option<i64>,
    pub listed_in: Option<String>,
}

/// Every row, with just the fields the enrich job reads.
pub async fn enrichment_targets(pool: &SqlitePool) -> Result<Vec<EnrichmentTarget>> {
    let rows = sqlx::query(
        "SELECT show_id, title, country, release_year, listed_in FROM netflix_titles ORDER BY show_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| EnrichmentTarget {
            show_id: row.get("show_id"),
            title: row.get("title"),
            country: row.get("country"),
            release_year: row.get("release_year"),
            listed_in: row.get("listed_in"),
        })
        .collect())
}

fn title_from_row(row: &SqliteRow) -> Result<TitleRecord> {
    Ok(TitleRecord {
        show_id: row.try_get("show_id")?,
        kind: row.try_get("type")?,
        title: row.try_get("title")?,
        director: row.try_get("director")?,
        cast: row.try_get("cast")?,
        country: row.try_get("country")?,
        date_added: row.try_get("date_added")?,
        release_year: row.try_get("release_year")?,
        rating: row.try_get("rating")?,
        duration: row.try_get("duration")?,
        listed_in: row.try_get("listed_in")?,
        description: row.try_get("description")?,
        awards: row.try_get::<Option<i64>, _>("awards")?.unwrap_or(0),
        political_context_score: row
            .try_get::<Option<f64>, _>("political_context_score")?
            .unwrap_or(0.0),
        conflict_intensity: row.try_get("conflict_intensity")?,
        event_keywords: row.try_get("event_keywords")?,
        genre: row.try_get("genre")?,
    })
}

const SELECT_TITLE_COLUMNS: &str = r#"
    SELECT show_id, type, title, director, "cast", country, date_added,
           release_year, rating, duration, listed_in, description, awards,
           political_context_score, conflict_intensity, event_keywords, genre
    FROM netflix_titles
    ORDER BY show_id
"#;

/// Load the full table into memory.
pub async fn all_titles(pool: &SqlitePool) -> Result<Vec<TitleRecord>> {
    let rows = sqlx::query(SELECT_TITLE_COLUMNS).fetch_all(pool).await?;
    rows.iter().map(title_from_row).collect()
}

pub async fn count_titles(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM netflix_titles")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn update_country(pool: &SqlitePool, show_id: &str, country: &str) -> Result<()> {
    sqlx::query("UPDATE netflix_titles SET country = ?1 WHERE show_id = ?2")
        .bind(country)
        .bind(show_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentUpdate {
    pub awards: i64,
    pub political_context_score: f64,
    pub conflict_intensity: Option<String>,
    pub event_keywords: Option<String>,
    pub genre: Option<String>,
}

pub async fn update_enrichment(
    pool: &SqlitePool,
    show_id: &str,
    update: &EnrichmentUpdate,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE netflix_titles
           SET awards = ?1,
               political_context_score = ?2,
               conflict_intensity = ?3,
               event_keywords = ?4,
               genre = ?5
         WHERE show_id = ?6
        "#,
    )
    .bind(update.awards)
    .bind(update.political_context_score)
    .bind(update.conflict_intensity.as_deref())
    .bind(update.event_keywords.as_deref())
    .bind(update.genre.as_deref())
    .bind(show_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Insert a full record; used by the initial load path and test fixtures.
pub async fn insert_title(pool: &SqlitePool, record: &TitleRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO netflix_titles
            (show_id, type, title, director, "cast", country, date_added,
             release_year, rating, duration, listed_in, description, awards,
             political_context_score, conflict_intensity, event_keywords, genre)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        "#,
    )
    .bind(&record.show_id)
    .bind(record.kind.as_deref())
    .bind(record.title.as_deref())
    .bind(record.director.as_deref())
    .bind(record.cast.as_deref())
    .bind(record.country.as_deref())
    .bind(record.date_added.as_deref())
    .bind(record.release_year)
    .bind(record.rating.as_deref())
    .bind(record.duration.as_deref())
    .bind(record.listed_in.as_deref())
    .bind(record.description.as_deref())
    .bind(record.awards)
    .bind(record.political_context_score)
    .bind(record.conflict_intensity.as_deref())
    .bind(record.event_keywords.as_deref())
    .bind(record.genre.as_deref())
    .execute(pool)
    .await?;
    Ok(())
}

const CREATE_CLEANED_SQL: &str = r#"
    CREATE TABLE netflix_titles_cleaned (
        show_id TEXT PRIMARY KEY,
        type TEXT,
        title TEXT,
        director TEXT,
        "cast" TEXT,
        country TEXT,
        date_added TEXT,
        release_year INTEGER,
        rating TEXT,
        duration TEXT,
        listed_in TEXT,
        description TEXT,
        awards INTEGER DEFAULT 0,
        political_context_score REAL DEFAULT 0,
        conflict_intensity TEXT,
        event_keywords TEXT,
        genre TEXT
    )
"#;

/// Drop and recreate the cleaned copy, then insert every row, committing in
/// batches to bound transaction size.
pub async fn write_cleaned_rows(
    pool: &SqlitePool,
    rows: &[TitleRecord],
    batch_size: usize,
) -> Result<()> {
    sqlx::query("DROP TABLE IF EXISTS netflix_titles_cleaned")
        .execute(pool)
        .await?;
    sqlx::query(CREATE_CLEANED_SQL).execute(pool).await?;

    let batch_size = batch_size.max(1);
    let mut tx = pool.begin().await?;
    for (index, record) in rows.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO netflix_titles_cleaned
                (show_id, type, title, director, "cast", country, date_added,
                 release_year, rating, duration, listed_in, description, awards,
                 political_context_score, conflict_intensity, event_keywords, genre)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&record.show_id)
        .bind(record.kind.as_deref())
        .bind(record.title.as_deref())
        .bind(record.director.as_deref())
        .bind(record.cast.as_deref())
        .bind(record.country.as_deref())
        .bind(record.date_added.as_deref())
        .bind(record.release_year)
        .bind(record.rating.as_deref())
        .bind(record.duration.as_deref())
        .bind(record.listed_in.as_deref())
        .bind(record.description.as_deref())
        .bind(record.awards)
        .bind(record.political_context_score)
        .bind(record.conflict_intensity.as_deref())
        .bind(record.event_keywords.as_deref())
        .bind(record.genre.as_deref())
        .execute(&mut *tx)
        .await?;

        if (index + 1) % batch_size == 0 {
            tx.commit().await?;
            info!("Committed {}/{} cleaned rows", index + 1, rows.len());
            tx = pool.begin().await?;
        }
    }
    tx.commit().await?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct CleanedStats {
    pub total_rows: i64,
    pub distinct_countries: i64,
    pub distinct_genres: i64,
}

pub async fn cleaned_stats(pool: &SqlitePool) -> Result<CleanedStats> {
    let total_rows = sqlx::query_scalar("SELECT COUNT(*) FROM netflix_titles_cleaned")
        .fetch_one(pool)
        .await?;
    let distinct_countries = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT country) FROM netflix_titles_cleaned WHERE country IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;
    let distinct_genres = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT listed_in) FROM netflix_titles_cleaned WHERE listed_in IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;
    Ok(CleanedStats {
        total_rows,
        distinct_countries,
        distinct_genres,
    })
}
