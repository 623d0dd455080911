//! Dashboard generation: in-memory aggregation over the enriched table and
//! static chart files with inline Plotly figure JSON. Regenerating
//! overwrites prior output.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flixlens_core::{preference_label, CountryPreference, TitleRecord};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::JobConfig;

/// Genres that read as escapist content.
pub const ESCAPIST_GENRES: [&str; 8] = [
    "Fantasy",
    "Animation",
    "Musical",
    "Romance",
    "Comedy",
    "Science Fiction",
    "Adventure",
    "Family",
];

/// Genres that read as reality-grounded content.
pub const REALITY_GENRES: [&str; 7] = [
    "Documentary",
    "Crime",
    "War",
    "Political",
    "Biography",
    "History",
    "News",
];

const REALITY_KEYWORDS: [&str; 7] = [
    "war",
    "politics",
    "crisis",
    "conflict",
    "documentary",
    "true story",
    "based on",
];

const ESCAPIST_KEYWORDS: [&str; 6] = [
    "magical",
    "fantasy",
    "adventure",
    "dream",
    "imagination",
    "fairy tale",
];

/// Minimum observations for a genre to appear in the awards bar chart.
const GENRE_AWARDS_MIN_COUNT: usize = 10;

/// Scatter plot is restricted to this many most-frequent countries.
const SCATTER_COUNTRY_LIMIT: usize = 10;

/// Heuristic per-title escapism/reality points: one point per matching genre
/// in the listed_in field, half a point per description keyword hit.
pub fn preference_scores(listed_in: Option<&str>, description: Option<&str>) -> (f64, f64) {
    let mut escapism = 0.0;
    let mut reality = 0.0;

    if let Some(listed) = listed_in {
        let lowered = listed.to_lowercase();
        for genre in ESCAPIST_GENRES {
            if lowered.contains(&genre.to_lowercase()) {
                escapism += 1.0;
            }
        }
        for genre in REALITY_GENRES {
            if lowered.contains(&genre.to_lowercase()) {
                reality += 1.0;
            }
        }
    }

    if let Some(desc) = description {
        let lowered = desc.to_lowercase();
        for keyword in REALITY_KEYWORDS {
            if lowered.contains(keyword) {
                reality += 0.5;
            }
        }
        for keyword in ESCAPIST_KEYWORDS {
            if lowered.contains(keyword) {
                escapism += 0.5;
            }
        }
    }

    (escapism, reality)
}

/// Per-country mean scores, ratio, and label. Groups by the raw country
/// string (multi-country rows form their own group); rows without a country
/// are dropped.
pub fn compute_country_preferences(titles: &[TitleRecord]) -> Vec<CountryPreference> {
    let mut groups: BTreeMap<String, (f64, f64, usize)> = BTreeMap::new();
    for title in titles {
        let Some(country) = title
            .country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            continue;
        };
        let (escapism, reality) =
            preference_scores(title.listed_in.as_deref(), title.description.as_deref());
        let slot = groups.entry(country.to_string()).or_insert((0.0, 0.0, 0));
        slot.0 += escapism;
        slot.1 += reality;
        slot.2 += 1;
    }

    groups
        .into_iter()
        .map(|(country, (escapism, reality, count))| {
            let escapism_score = escapism / count as f64;
            let reality_score = reality / count as f64;
            let preference_ratio = escapism_score / reality_score;
            CountryPreference {
                country,
                escapism_score,
                reality_score,
                preference_ratio,
                preference: preference_label(preference_ratio).to_string(),
            }
        })
        .collect()
}

fn sorted_years(titles: &[TitleRecord]) -> Vec<i64> {
    let years: BTreeSet<i64> = titles.iter().filter_map(|t| t.release_year).collect();
    years.into_iter().collect()
}

fn line_traces<F>(titles: &[TitleRecord], years: &[i64], series_key: F, axis: Option<&str>) -> Vec<Value>
where
    F: Fn(&TitleRecord) -> Option<String>,
{
    let mut counts: BTreeMap<String, BTreeMap<i64, usize>> = BTreeMap::new();
    for title in titles {
        let (Some(series), Some(year)) = (series_key(title), title.release_year) else {
            continue;
        };
        *counts.entry(series).or_default().entry(year).or_default() += 1;
    }

    counts
        .into_iter()
        .map(|(series, by_year)| {
            let y: Vec<usize> = years
                .iter()
                .map(|year| by_year.get(year).copied().unwrap_or(0))
                .collect();
            let mut trace = json!({
                "type": "scatter",
                "mode": "lines+markers",
                "name": series,
                "x": years,
                "y": y,
            });
            if let Some(axis) = axis {
                trace["xaxis"] = json!(format!("x{axis}"));
                trace["yaxis"] = json!(format!("y{axis}"));
            }
            trace
        })
        .collect()
}

/// Per-year volume by type on the top row, by genre on the bottom row.
pub fn content_timeline_figure(titles: &[TitleRecord]) -> Value {
    let years = sorted_years(titles);
    let mut traces = line_traces(titles, &years, |t| t.kind.clone(), None);
    traces.extend(line_traces(titles, &years, |t| t.genre.clone(), Some("2")));

    json!({
        "data": traces,
        "layout": {
            "title": "Netflix Content Trends Over Time",
            "grid": {"rows": 2, "columns": 1, "pattern": "independent"},
            "height": 800,
        }
    })
}

/// Heatmap of mean awards per country x genre.
pub fn country_genre_awards_figure(titles: &[TitleRecord]) -> Value {
    let mut cells: BTreeMap<(String, String), (i64, usize)> = BTreeMap::new();
    for title in titles {
        let (Some(country), Some(genre)) = (title.country.as_deref(), title.genre.as_deref())
        else {
            continue;
        };
        let slot = cells
            .entry((country.to_string(), genre.to_string()))
            .or_default();
        slot.0 += title.awards;
        slot.1 += 1;
    }

    let countries: Vec<String> = cells.keys().map(|(c, _)| c.clone()).collect::<BTreeSet<_>>().into_iter().collect();
    let genres: Vec<String> = cells.keys().map(|(_, g)| g.clone()).collect::<BTreeSet<_>>().into_iter().collect();

    let z: Vec<Vec<Value>> = countries
        .iter()
        .map(|country| {
            genres
                .iter()
                .map(|genre| {
                    match cells.get(&(country.clone(), genre.clone())) {
                        Some((sum, count)) => json!(*sum as f64 / *count as f64),
                        None => Value::Null,
                    }
                })
                .collect()
        })
        .collect();

    json!({
        "data": [{
            "type": "heatmap",
            "x": genres,
            "y": countries,
            "z": z,
            "colorscale": "YlOrRd",
        }],
        "layout": {
            "title": "Awards Distribution: Country vs Genre",
        }
    })
}

/// Political score vs release year for the most frequent countries, one
/// trace per genre, marker size from awards.
pub fn political_context_figure(titles: &[TitleRecord]) -> Value {
    let mut frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for title in titles {
        if let Some(country) = title.country.as_deref() {
            *frequency.entry(country).or_default() += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    let main_countries: BTreeSet<&str> =
        ranked.into_iter().take(SCATTER_COUNTRY_LIMIT).map(|(c, _)| c).collect();

    let mut by_genre: BTreeMap<String, Vec<&TitleRecord>> = BTreeMap::new();
    for title in titles {
        let in_scope = title
            .country
            .as_deref()
            .map(|c| main_countries.contains(c))
            .unwrap_or(false);
        if !in_scope {
            continue;
        }
        let genre = title.genre.clone().unwrap_or_else(|| "Uncategorized".to_string());
        by_genre.entry(genre).or_default().push(title);
    }

    let traces: Vec<Value> = by_genre
        .into_iter()
        .map(|(genre, rows)| {
            let x: Vec<Option<i64>> = rows.iter().map(|t| t.release_year).collect();
            let y: Vec<f64> = rows.iter().map(|t| t.political_context_score).collect();
            let sizes: Vec<i64> = rows.iter().map(|t| t.awards.max(4)).collect();
            let text: Vec<String> = rows
                .iter()
                .map(|t| {
                    format!(
                        "{} ({})",
                        t.title.as_deref().unwrap_or("Untitled"),
                        t.country.as_deref().unwrap_or("Unknown")
                    )
                })
                .collect();
            json!({
                "type": "scatter",
                "mode": "markers",
                "name": genre,
                "x": x,
                "y": y,
                "text": text,
                "marker": {"size": sizes, "sizemode": "area"},
            })
        })
        .collect();

    json!({
        "data": traces,
        "layout": {
            "title": "Content Release vs Political Context",
            "xaxis": {"title": "Release Year"},
            "yaxis": {"title": "Political Context Score"},
        }
    })
}

/// Mean awards per genre, restricted to genres with enough observations.
pub fn genre_awards_figure(titles: &[TitleRecord]) -> Value {
    let mut per_genre: BTreeMap<String, (i64, usize)> = BTreeMap::new();
    for title in titles {
        let Some(genre) = title.genre.as_deref() else {
            continue;
        };
        let slot = per_genre.entry(genre.to_string()).or_default();
        slot.0 += title.awards;
        slot.1 += 1;
    }

    let mut genres = Vec::new();
    let mut means = Vec::new();
    for (genre, (sum, count)) in per_genre {
        if count >= GENRE_AWARDS_MIN_COUNT {
            genres.push(genre);
            means.push(sum as f64 / count as f64);
        }
    }

    json!({
        "data": [{
            "type": "bar",
            "x": genres,
            "y": means,
        }],
        "layout": {
            "title": "Average Awards per Genre",
            "xaxis": {"title": "Genre"},
            "yaxis": {"title": "Average Awards"},
        }
    })
}

/// One-row heatmap of preference ratios, most escapist first.
pub fn global_preference_heatmap_figure(preferences: &[CountryPreference]) -> Value {
    let mut sorted: Vec<&CountryPreference> = preferences.iter().collect();
    sorted.sort_by(|a, b| b.preference_ratio.total_cmp(&a.preference_ratio));

    let countries: Vec<&str> = sorted.iter().map(|p| p.country.as_str()).collect();
    let ratios: Vec<f64> = sorted.iter().map(|p| p.preference_ratio).collect();

    json!({
        "data": [{
            "type": "heatmap",
            "x": countries,
            "y": ["Content Preference"],
            "z": [ratios],
            "colorscale": "RdBu",
            "colorbar": {"title": "Escapism vs Reality Ratio"},
        }],
        "layout": {
            "title": "Global Content Preference Heatmap",
            "height": 200,
            "xaxis": {"tickangle": 45},
            "yaxis": {"visible": false},
        }
    })
}

/// Top-5 escapist-leaning vs top-5 reality-leaning countries.
pub fn preference_comparison_figure(preferences: &[CountryPreference]) -> Value {
    let mut sorted: Vec<&CountryPreference> = preferences.iter().collect();
    sorted.sort_by(|a, b| b.preference_ratio.total_cmp(&a.preference_ratio));

    let most_escapist: Vec<&CountryPreference> = sorted.iter().take(5).copied().collect();
    let most_reality: Vec<&CountryPreference> = sorted.iter().rev().take(5).copied().collect();

    json!({
        "data": [
            {
                "type": "bar",
                "name": "Escapism Preference",
                "x": most_escapist.iter().map(|p| p.country.as_str()).collect::<Vec<_>>(),
                "y": most_escapist.iter().map(|p| p.preference_ratio).collect::<Vec<_>>(),
                "marker": {"color": "blue"},
            },
            {
                "type": "bar",
                "name": "Reality Preference",
                "x": most_reality.iter().map(|p| p.country.as_str()).collect::<Vec<_>>(),
                "y": most_reality.iter().map(|p| p.preference_ratio).collect::<Vec<_>>(),
                "xaxis": "x2",
                "yaxis": "y2",
                "marker": {"color": "red"},
            }
        ],
        "layout": {
            "title": "Global Content Preference Extremes",
            "grid": {"rows": 2, "columns": 1, "pattern": "independent"},
            "height": 800,
        }
    })
}

/// Wrap a figure into a self-contained HTML page.
pub fn chart_page(title: &str, figure: &Value) -> String {
    let figure_json = figure.to_string();
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title}</title>
<script src="https://cdn.plot.ly/plotly-2.32.0.min.js"></script>
</head>
<body>
<div id="chart"></div>
<script>
var figure = {figure_json};
Plotly.newPlot("chart", figure.data, figure.layout);
</script>
</body>
</html>
"#
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub countries: usize,
    pub charts_written: usize,
    pub preferences_path: String,
}

/// Load the enriched table, recompute every aggregate, and overwrite the
/// dashboard directory's chart files and preference snapshot.
pub async fn run_dashboards(pool: &SqlitePool, config: &JobConfig) -> Result<DashboardSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();

    let titles = flixlens_store::all_titles(pool).await?;
    let preferences = compute_country_preferences(&titles);

    // Charts aggregate over filled-in placeholders instead of dropping rows
    let mut chart_titles = titles;
    for title in &mut chart_titles {
        if title.country.as_deref().map_or(true, |c| c.trim().is_empty()) {
            title.country = Some("Unknown".to_string());
        }
        if title.genre.as_deref().map_or(true, |g| g.trim().is_empty()) {
            title.genre = Some("Uncategorized".to_string());
        }
    }

    tokio::fs::create_dir_all(&config.dashboards_dir)
        .await
        .with_context(|| format!("creating {}", config.dashboards_dir.display()))?;

    let charts = [
        ("content_timeline.html", "Netflix Content Trends Over Time", content_timeline_figure(&chart_titles)),
        ("country_genre_awards.html", "Awards Distribution: Country vs Genre", country_genre_awards_figure(&chart_titles)),
        ("political_context.html", "Content Release vs Political Context", political_context_figure(&chart_titles)),
        ("genre_awards.html", "Average Awards per Genre", genre_awards_figure(&chart_titles)),
        ("global_preference_heatmap.html", "Global Content Preference Heatmap", global_preference_heatmap_figure(&preferences)),
        ("global_preference_comparison.html", "Global Content Preference Extremes", preference_comparison_figure(&preferences)),
    ];
    for (file_name, page_title, figure) in &charts {
        let path = config.dashboards_dir.join(file_name);
        tokio::fs::write(&path, chart_page(page_title, figure))
            .await
            .with_context(|| format!("writing {}", path.display()))?;
    }

    let preferences_path = config.dashboards_dir.join("country_preferences.json");
    let bytes =
        serde_json::to_vec_pretty(&preferences).context("serializing country preferences")?;
    tokio::fs::write(&preferences_path, bytes)
        .await
        .with_context(|| format!("writing {}", preferences_path.display()))?;

    info!(
        "Dashboards generated: {} charts, {} countries",
        charts.len(),
        preferences.len()
    );

    Ok(DashboardSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        countries: preferences.len(),
        charts_written: charts.len(),
        preferences_path: preferences_path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flixlens_core::{BALANCED_LABEL, ESCAPISM_LABEL, REALITY_LABEL};
    use std::time::Duration;

    fn title_with(country: &str, listed_in: &str, description: &str) -> TitleRecord {
        TitleRecord {
            show_id: format!("s{}", next_fixture_id()),
            country: Some(country.to_string()),
            listed_in: Some(listed_in.to_string()),
            description: Some(description.to_string()),
            release_year: Some(2020),
            ..TitleRecord::default()
        }
    }

    // Monotonic fixture ids; tests only need uniqueness within a run.
    fn next_fixture_id() -> usize {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        NEXT.fetch_add(1, Ordering::Relaxed)
    }

    #[test]
    fn scores_accumulate_from_genres_and_keywords() {
        let (escapism, reality) =
            preference_scores(Some("Fantasy, Animation, Documentary"), Some("A magical true story"));
        assert_eq!(escapism, 2.5); // two genres + one keyword
        assert_eq!(reality, 1.5); // one genre + one keyword
    }

    #[test]
    fn escapism_vs_reality_example_ratio() {
        // escapism mean 3.0, reality mean 2.0 -> ratio 1.5 -> escapism
        let titles = vec![title_with(
            "Japan",
            "Fantasy, Animation, Musical, Documentary, Crime",
            "",
        )];
        let preferences = compute_country_preferences(&titles);
        assert_eq!(preferences.len(), 1);
        assert_eq!(preferences[0].escapism_score, 3.0);
        assert_eq!(preferences[0].reality_score, 2.0);
        assert_eq!(preferences[0].preference_ratio, 1.5);
        assert_eq!(preferences[0].preference, ESCAPISM_LABEL);
    }

    #[test]
    fn preference_labels_cover_all_three_buckets() {
        let titles = vec![
            title_with("A", "Fantasy, Documentary", ""), // ratio 1.0 -> balanced
            title_with("B", "Documentary, Crime", ""),   // ratio 0.0 -> reality
            title_with("C", "Fantasy, Comedy", ""),      // reality 0 -> inf -> escapism
        ];
        let preferences = compute_country_preferences(&titles);
        let by_country: std::collections::HashMap<_, _> = preferences
            .iter()
            .map(|p| (p.country.as_str(), p.preference.as_str()))
            .collect();
        assert_eq!(by_country["A"], BALANCED_LABEL);
        assert_eq!(by_country["B"], REALITY_LABEL);
        assert_eq!(by_country["C"], ESCAPISM_LABEL);
    }

    #[test]
    fn preferences_group_by_raw_country_string() {
        let titles = vec![
            title_with("United States, Canada", "Fantasy", ""),
            title_with("United States", "Documentary", ""),
        ];
        let preferences = compute_country_preferences(&titles);
        let countries: Vec<_> = preferences.iter().map(|p| p.country.as_str()).collect();
        assert_eq!(countries, vec!["United States", "United States, Canada"]);
    }

    #[test]
    fn genre_awards_figure_applies_min_count() {
        let mut titles = Vec::new();
        for _ in 0..10 {
            let mut t = title_with("A", "Dramas", "");
            t.genre = Some("Dramas".to_string());
            t.awards = 2;
            titles.push(t);
        }
        let mut rare = title_with("A", "Anime", "");
        rare.genre = Some("Anime".to_string());
        rare.awards = 9;
        titles.push(rare);

        let figure = genre_awards_figure(&titles);
        assert_eq!(figure["data"][0]["x"], json!(["Dramas"]));
        assert_eq!(figure["data"][0]["y"], json!([2.0]));
    }

    #[tokio::test]
    async fn dashboard_run_writes_charts_and_preferences() {
        let pool = flixlens_store::connect_memory().await.unwrap();
        flixlens_store::init_schema(&pool).await.unwrap();
        let mut record = title_with("France", "Comedies, Dramas", "A dream");
        record.genre = Some("Comedies".to_string());
        flixlens_store::insert_title(&pool, &record).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let config = JobConfig {
            db_path: dir.path().join("unused.db"),
            data_dir: dir.path().join("data"),
            dashboards_dir: dir.path().join("dashboards"),
            metadata_base_url: String::new(),
            metadata_api_key: String::new(),
            request_pause: Duration::ZERO,
        };

        let summary = run_dashboards(&pool, &config).await.unwrap();
        assert_eq!(summary.charts_written, 6);
        assert_eq!(summary.countries, 1);

        for file in [
            "content_timeline.html",
            "country_genre_awards.html",
            "political_context.html",
            "genre_awards.html",
            "global_preference_heatmap.html",
            "global_preference_comparison.html",
            "country_preferences.json",
        ] {
            assert!(dir.path().join("dashboards").join(file).exists(), "{file} missing");
        }

        let raw =
            std::fs::read_to_string(dir.path().join("dashboards/country_preferences.json")).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed[0]["country"], json!("France"));
    }
}
