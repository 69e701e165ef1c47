//! Read-only aggregate queries, charts and the markdown report over a normalized table.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use reel_core::{MovieTable, NormalizedMovieRow};
use serde::{Deserialize, Serialize};

mod charts;
mod report;

pub use charts::{render_all_charts, ChartKind};
pub use report::render_markdown_report;

pub const CRATE_NAME: &str = "reel-analytics";

pub const TOP_GROUPS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreCastQuery {
    pub genres: Vec<String>,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastDirectorQuery {
    pub actor: String,
    pub director: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPresets {
    #[serde(default)]
    pub genre_cast: Vec<GenreCastQuery>,
    #[serde(default)]
    pub cast_director: Vec<CastDirectorQuery>,
}

impl Default for SearchPresets {
    fn default() -> Self {
        Self {
            genre_cast: vec![GenreCastQuery {
                genres: vec!["Science Fiction".to_string(), "Action".to_string()],
                actor: "Bruce Willis".to_string(),
            }],
            cast_director: vec![CastDirectorQuery {
                actor: "Uma Thurman".to_string(),
                director: "Quentin Tarantino".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionStats {
    pub movies: usize,
    pub mean_revenue_musd: Option<f64>,
    pub mean_roi: Option<f64>,
    pub mean_budget_musd: Option<f64>,
    pub mean_popularity: Option<f64>,
    pub mean_vote_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FranchiseComparison {
    pub franchise: PartitionStats,
    pub standalone: PartitionStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FranchiseGroup {
    pub collection: String,
    pub movies: usize,
    pub budget_musd_sum: f64,
    pub budget_musd_mean: Option<f64>,
    pub revenue_musd_sum: f64,
    pub revenue_musd_mean: Option<f64>,
    pub vote_average_mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectorGroup {
    pub director: String,
    pub movies: usize,
    pub revenue_musd_sum: f64,
    pub vote_average_mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreCastHit {
    pub title: Option<String>,
    pub genres: Option<String>,
    pub vote_average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CastDirectorHit {
    pub title: Option<String>,
    pub runtime: Option<f64>,
    pub director: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreRoi {
    pub genre: String,
    pub rois: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlyRevenue {
    pub year: i32,
    pub mean_revenue_musd: Option<f64>,
}

fn mean<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn sum<I: IntoIterator<Item = Option<f64>>>(values: I) -> f64 {
    values.into_iter().flatten().sum()
}

fn cmp_missing_last(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn contains(field: &Option<String>, needle: &str) -> bool {
    field.as_deref().is_some_and(|v| v.contains(needle))
}

fn partition_stats<'a>(rows: impl Iterator<Item = &'a NormalizedMovieRow> + Clone) -> PartitionStats {
    PartitionStats {
        movies: rows.clone().count(),
        mean_revenue_musd: mean(rows.clone().map(|r| r.revenue_musd)),
        mean_roi: mean(rows.clone().map(|r| r.roi)),
        mean_budget_musd: mean(rows.clone().map(|r| r.budget_musd)),
        mean_popularity: mean(rows.clone().map(|r| r.popularity)),
        mean_vote_average: mean(rows.map(|r| r.vote_average)),
    }
}

pub fn franchise_vs_standalone(table: &MovieTable) -> FranchiseComparison {
    FranchiseComparison {
        franchise: partition_stats(table.rows.iter().filter(|r| r.is_franchise())),
        standalone: partition_stats(table.rows.iter().filter(|r| !r.is_franchise())),
    }
}

pub fn franchise_groups(table: &MovieTable) -> Vec<FranchiseGroup> {
    let mut groups: BTreeMap<&str, Vec<&NormalizedMovieRow>> = BTreeMap::new();
    for row in &table.rows {
        if let Some(collection) = row.belongs_to_collection.as_deref() {
            groups.entry(collection).or_default().push(row);
        }
    }

    let mut out: Vec<FranchiseGroup> = groups
        .into_iter()
        .map(|(collection, rows)| FranchiseGroup {
            collection: collection.to_string(),
            movies: rows.iter().filter(|r| r.id.is_some()).count(),
            budget_musd_sum: sum(rows.iter().map(|r| r.budget_musd)),
            budget_musd_mean: mean(rows.iter().map(|r| r.budget_musd)),
            revenue_musd_sum: sum(rows.iter().map(|r| r.revenue_musd)),
            revenue_musd_mean: mean(rows.iter().map(|r| r.revenue_musd)),
            vote_average_mean: mean(rows.iter().map(|r| r.vote_average)),
        })
        .collect();
    out.sort_by(|a, b| {
        cmp_missing_last(Some(a.revenue_musd_sum), Some(b.revenue_musd_sum), true)
    });
    out.truncate(TOP_GROUPS);
    out
}

pub fn director_groups(table: &MovieTable) -> Vec<DirectorGroup> {
    let mut groups: BTreeMap<&str, Vec<&NormalizedMovieRow>> = BTreeMap::new();
    for row in &table.rows {
        if let Some(director) = row.director.as_deref() {
            groups.entry(director).or_default().push(row);
        }
    }

    let mut out: Vec<DirectorGroup> = groups
        .into_iter()
        .map(|(director, rows)| DirectorGroup {
            director: director.to_string(),
            movies: rows.iter().filter(|r| r.id.is_some()).count(),
            revenue_musd_sum: sum(rows.iter().map(|r| r.revenue_musd)),
            vote_average_mean: mean(rows.iter().map(|r| r.vote_average)),
        })
        .collect();
    out.sort_by(|a, b| {
        cmp_missing_last(Some(a.revenue_musd_sum), Some(b.revenue_musd_sum), true)
    });
    out.truncate(TOP_GROUPS);
    out
}

pub fn search_genres_with_cast(table: &MovieTable, query: &GenreCastQuery) -> Vec<GenreCastHit> {
    let mut hits: Vec<&NormalizedMovieRow> = table
        .rows
        .iter()
        .filter(|r| {
            query.genres.iter().all(|g| contains(&r.genres, g)) && contains(&r.cast, &query.actor)
        })
        .collect();
    hits.sort_by(|a, b| cmp_missing_last(a.vote_average, b.vote_average, true));
    hits.into_iter()
        .map(|r| GenreCastHit {
            title: r.title.clone(),
            genres: r.genres.clone(),
            vote_average: r.vote_average,
        })
        .collect()
}

pub fn search_cast_with_director(
    table: &MovieTable,
    query: &CastDirectorQuery,
) -> Vec<CastDirectorHit> {
    let mut hits: Vec<&NormalizedMovieRow> = table
        .rows
        .iter()
        .filter(|r| {
            contains(&r.cast, &query.actor) && r.director.as_deref() == Some(query.director.as_str())
        })
        .collect();
    hits.sort_by(|a, b| cmp_missing_last(a.runtime, b.runtime, false));
    hits.into_iter()
        .map(|r| CastDirectorHit {
            title: r.title.clone(),
            runtime: r.runtime,
            director: r.director.clone(),
        })
        .collect()
}

pub fn explode_genre_roi(table: &MovieTable) -> Vec<GenreRoi> {
    let mut out: Vec<GenreRoi> = Vec::new();
    for row in &table.rows {
        let Some(roi) = row.roi else {
            continue;
        };
        for genre in row.genre_tokens().filter(|g| !g.is_empty()) {
            match out.iter_mut().find(|g| g.genre == genre) {
                Some(entry) => entry.rois.push(roi),
                None => out.push(GenreRoi {
                    genre: genre.to_string(),
                    rois: vec![roi],
                }),
            }
        }
    }
    out
}

pub fn yearly_average_revenue(table: &MovieTable) -> Vec<YearlyRevenue> {
    let mut years: BTreeMap<i32, Vec<Option<f64>>> = BTreeMap::new();
    for row in &table.rows {
        if let Some(year) = row.release_year() {
            years.entry(year).or_default().push(row.revenue_musd);
        }
    }
    years
        .into_iter()
        .map(|(year, revenues)| YearlyRevenue {
            year,
            mean_revenue_musd: mean(revenues),
        })
        .collect()
}
