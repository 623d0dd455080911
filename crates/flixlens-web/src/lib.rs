//! Axum JSON API over the enriched catalog, plus the generic CORS static
//! file server for generated dashboards. All reads are synchronous per
//! request with no caching layer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

pub const CRATE_NAME: &str = "flixlens-web";

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub dashboards_dir: PathBuf,
}

impl AppState {
    pub fn new(pool: SqlitePool, dashboards_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            dashboards_dir: dashboards_dir.into(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/countries", get(countries_handler))
        .route("/api/country/{name}", get(country_detail_handler))
        .route("/api/covid-analysis", get(covid_analysis_handler))
        .route("/api/political-matrix", get(political_matrix_handler))
        .route("/api/global-preferences", get(global_preferences_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("API listening on port {port}");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Distinct countries, exploded from comma-separated values, sorted unique.
async fn countries_handler(State(state): State<Arc<AppState>>) -> Response {
    let result: Result<Vec<String>, sqlx::Error> = sqlx::query_scalar(
        "SELECT DISTINCT country FROM netflix_titles WHERE country IS NOT NULL",
    )
    .fetch_all(&state.pool)
    .await;

    match result {
        Ok(values) => {
            let exploded =
                flixlens_core::explode_countries(values.iter().map(String::as_str));
            Json(exploded).into_response()
        }
        Err(err) => server_error(err.into()),
    }
}

#[derive(Debug, Clone, Serialize)]
struct YearlyRow {
    release_year: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    genre: Option<String>,
    awards: i64,
    political_context_score: f64,
}

#[derive(Debug, Serialize)]
struct CountryDetail {
    preferences: Option<Value>,
    yearly_data: Vec<YearlyRow>,
}

/// Preference record plus per-title rows for one country. The LIKE pattern
/// is parameter-bound; an unknown country yields empty rows, not a 404.
async fn country_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
) -> Response {
    let preferences = match load_preferences(&state.dashboards_dir).await {
        Ok(entries) => entries
            .into_iter()
            .find(|entry| entry.get("country").and_then(Value::as_str) == Some(name.as_str())),
        Err(err) => return server_error(err),
    };

    let rows = sqlx::query(
        r#"
        SELECT release_year, type, genre, awards, political_context_score
          FROM netflix_titles
         WHERE country LIKE '%' || ?1 || '%'
        "#,
    )
    .bind(&name)
    .fetch_all(&state.pool)
    .await;

    match rows {
        Ok(rows) => {
            let yearly_data = rows
                .iter()
                .map(|row| YearlyRow {
                    release_year: row.get("release_year"),
                    kind: row.get("type"),
                    genre: row.get("genre"),
                    awards: row.get::<Option<i64>, _>("awards").unwrap_or(0),
                    political_context_score: row
                        .get::<Option<f64>, _>("political_context_score")
                        .unwrap_or(0.0),
                })
                .collect();
            Json(CountryDetail {
                preferences,
                yearly_data,
            })
            .into_response()
        }
        Err(err) => server_error(err.into()),
    }
}

#[derive(Debug, Clone, Serialize)]
struct CovidRow {
    country: Option<String>,
    release_year: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    genre: Option<String>,
    awards: i64,
}

/// Fixed 2020-2022 release window for the pandemic-period view.
async fn covid_analysis_handler(State(state): State<Arc<AppState>>) -> Response {
    let rows = sqlx::query(
        r#"
        SELECT country, release_year, type, genre, awards
          FROM netflix_titles
         WHERE release_year BETWEEN 2020 AND 2022
        "#,
    )
    .fetch_all(&state.pool)
    .await;

    match rows {
        Ok(rows) => {
            let out: Vec<CovidRow> = rows
                .iter()
                .map(|row| CovidRow {
                    country: row.get("country"),
                    release_year: row.get("release_year"),
                    kind: row.get("type"),
                    genre: row.get("genre"),
                    awards: row.get::<Option<i64>, _>("awards").unwrap_or(0),
                })
                .collect();
            Json(out).into_response()
        }
        Err(err) => server_error(err.into()),
    }
}

#[derive(Debug, Clone, Serialize)]
struct MatrixRow {
    country: String,
    release_year: i64,
    political_context_score: f64,
    awards: f64,
    genre: Option<String>,
}

/// Scored rows grouped by country and year: mean score, mean awards, and the
/// most frequent genre (ties resolved to the lexicographically smallest).
async fn political_matrix_handler(State(state): State<Arc<AppState>>) -> Response {
    let rows = sqlx::query(
        r#"
        SELECT country, release_year, genre, awards, political_context_score
          FROM netflix_titles
         WHERE political_context_score > 0
        "#,
    )
    .fetch_all(&state.pool)
    .await;

    let rows = match rows {
        Ok(rows) => rows,
        Err(err) => return server_error(err.into()),
    };

    struct Cell {
        score_sum: f64,
        awards_sum: f64,
        count: usize,
        genres: BTreeMap<String, usize>,
    }

    let mut cells: BTreeMap<(String, i64), Cell> = BTreeMap::new();
    for row in &rows {
        let (Some(country), Some(year)) = (
            row.get::<Option<String>, _>("country"),
            row.get::<Option<i64>, _>("release_year"),
        ) else {
            continue;
        };
        let cell = cells.entry((country, year)).or_insert_with(|| Cell {
            score_sum: 0.0,
            awards_sum: 0.0,
            count: 0,
            genres: BTreeMap::new(),
        });
        cell.score_sum += row
            .get::<Option<f64>, _>("political_context_score")
            .unwrap_or(0.0);
        cell.awards_sum += row.get::<Option<i64>, _>("awards").unwrap_or(0) as f64;
        cell.count += 1;
        if let Some(genre) = row.get::<Option<String>, _>("genre") {
            *cell.genres.entry(genre).or_default() += 1;
        }
    }

    let out: Vec<MatrixRow> = cells
        .into_iter()
        .map(|((country, release_year), cell)| {
            let modal_genre = cell
                .genres
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(genre, _)| genre.clone());
            MatrixRow {
                country,
                release_year,
                political_context_score: cell.score_sum / cell.count as f64,
                awards: cell.awards_sum / cell.count as f64,
                genre: modal_genre,
            }
        })
        .collect();

    Json(out).into_response()
}

/// Pass-through of the precomputed preference snapshot.
async fn global_preferences_handler(State(state): State<Arc<AppState>>) -> Response {
    match load_preferences(&state.dashboards_dir).await {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => server_error(err),
    }
}

async fn load_preferences(dashboards_dir: &Path) -> anyhow::Result<Vec<Value>> {
    let path = dashboards_dir.join("country_preferences.json");
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|err| anyhow::anyhow!("reading {}: {err}", path.display()))?;
    let entries: Vec<Value> = serde_json::from_str(&raw)
        .map_err(|err| anyhow::anyhow!("parsing {}: {err}", path.display()))?;
    Ok(entries)
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Server error: {err}"),
    )
        .into_response()
}

/// Serve a directory with permissive cross-origin GET and caching disabled;
/// generic, no domain logic.
pub fn static_app(root: impl AsRef<Path>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET]);
    let no_cache = SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    Router::new()
        .fallback_service(ServeDir::new(root.as_ref()))
        .layer(no_cache)
        .layer(cors)
}

pub async fn serve_static(root: impl AsRef<Path>, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Static server listening on port {port}");
    axum::serve(listener, static_app(root)).await?;
    Ok(())
}
