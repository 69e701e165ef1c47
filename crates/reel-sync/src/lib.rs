//! ETL pipeline orchestration: fetch, archive, transform, persist, chart and report.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Datelike, Utc};
use parquet::arrow::ArrowWriter;
use reel_adapters::{
    FetchContext, FetchFailure, FixtureSource, MovieSource, TmdbSource, DEFAULT_MOVIE_IDS,
    DEFAULT_TMDB_BASE_URL,
};
use reel_analytics::{
    render_all_charts, render_markdown_report, CastDirectorQuery, GenreCastQuery, SearchPresets,
};
use reel_core::{CellValue, Column, ColumnKind, MovieTable, RawMovieRecord};
use reel_storage::{write_movie_table_csv, ArtifactStore, HttpClientConfig, HttpFetcher};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

pub mod transform;

pub use transform::{transform, transform_with_stats, TransformStats};

pub const CRATE_NAME: &str = "reel-sync";

// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default = "default_movie_ids")]
    pub movie_ids: Vec<i64>,
    #[serde(default = "default_genre_cast_searches")]
    pub genre_cast_searches: Vec<GenreCastQuery>,
    #[serde(default = "default_cast_director_searches")]
    pub cast_director_searches: Vec<CastDirectorQuery>,
}

fn default_movie_ids() -> Vec<i64> {
    DEFAULT_MOVIE_IDS.to_vec()
}

fn default_genre_cast_searches() -> Vec<GenreCastQuery> {
    SearchPresets::default().genre_cast
}

fn default_cast_director_searches() -> Vec<CastDirectorQuery> {
    SearchPresets::default().cast_director
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            movie_ids: default_movie_ids(),
            genre_cast_searches: default_genre_cast_searches(),
            cast_director_searches: default_cast_director_searches(),
        }
    }
}

impl Catalog {
    pub fn presets(&self) -> SearchPresets {
        SearchPresets {
            genre_cast: self.genre_cast_searches.clone(),
            cast_director: self.cast_director_searches.clone(),
        }
    }
}

pub fn load_catalog(workspace_root: &Path) -> Result<Catalog> {
    let path = workspace_root.join("catalog.yaml");
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "catalog not found; using built-in movie ids");
            return Ok(Catalog::default());
        }
        Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
    };
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_token: Option<String>,
    pub api_base_url: String,
    pub output_dir: PathBuf,
    pub csv_file_name: String,
    pub charts_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub fixture_path: Option<PathBuf>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub workspace_root: PathBuf,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let output_dir = std::env::var("REEL_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("output"));
        Self {
            api_token: std::env::var("TMDB_API_KEY").ok().filter(|v| !v.trim().is_empty()),
            api_base_url: std::env::var("TMDB_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_TMDB_BASE_URL.to_string()),
            csv_file_name: std::env::var("REEL_CSV_FILE")
                .unwrap_or_else(|_| "clean_movies.csv".to_string()),
            charts_dir: std::env::var("REEL_CHARTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| output_dir.join("visualizations")),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./artifacts")),
            fixture_path: std::env::var("REEL_FIXTURE_PATH").ok().map(PathBuf::from),
            user_agent: std::env::var("REEL_USER_AGENT")
                .unwrap_or_else(|_| "reel-etl/0.1".to_string()),
            http_timeout_secs: std::env::var("REEL_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            workspace_root: PathBuf::from("."),
            output_dir,
        }
    }

    pub fn for_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            api_token: None,
            api_base_url: DEFAULT_TMDB_BASE_URL.to_string(),
            csv_file_name: "clean_movies.csv".to_string(),
            charts_dir: output_dir.join("visualizations"),
            artifacts_dir: output_dir.join("artifacts"),
            fixture_path: None,
            user_agent: "reel-etl/0.1".to_string(),
            http_timeout_secs: 20,
            workspace_root: PathBuf::from("."),
            output_dir,
        }
    }

    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(&self.csv_file_name)
    }

    pub fn reports_root(&self) -> PathBuf {
        self.output_dir.join("reports")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub source_id: String,
    pub requested_ids: usize,
    pub fetched_records: usize,
    pub failed_fetches: Vec<FetchFailure>,
    pub archived_artifacts: usize,
    pub input_records: usize,
    pub retained_rows: usize,
    pub dropped_rows: usize,
    pub csv_path: String,
    pub charts: Vec<String>,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

#[derive(Debug, Clone)]
pub struct SyncRun {
    pub summary: SyncRunSummary,
    pub table: MovieTable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub struct SyncPipeline {
    config: SyncConfig,
    artifact_store: ArtifactStore,
    source: Box<dyn MovieSource>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let artifact_store = ArtifactStore::new(config.artifacts_dir.clone());
        let source: Box<dyn MovieSource> = match &config.fixture_path {
            Some(path) => Box::new(FixtureSource::load(path)?),
            None => {
                if config.api_token.is_none() {
                    warn!("TMDB_API_KEY is not set; every request will be rejected");
                }
                let http = HttpFetcher::new(HttpClientConfig {
                    timeout: Duration::from_secs(config.http_timeout_secs),
                    user_agent: Some(config.user_agent.clone()),
                    bearer_token: config.api_token.clone(),
                })?;
                Box::new(TmdbSource::new(http, config.api_base_url.clone()))
            }
        };
        Ok(Self {
            config,
            artifact_store,
            source,
        })
    }

    pub fn with_source(mut self, source: Box<dyn MovieSource>) -> Self {
        self.source = source;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<SyncRun> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let catalog = load_catalog(&self.config.workspace_root)?;
        info!(
            %run_id,
            source = self.source.source_id(),
            ids = catalog.movie_ids.len(),
            "starting pipeline run"
        );

        let ctx = FetchContext::new(run_id);
        let outcome = self
            .source
            .fetch_records(&ctx, &catalog.movie_ids)
            .await
            .context("fetching movie records")?;
        info!(
            fetched = outcome.records.len(),
            failed = outcome.failures.len(),
            "fetch complete"
        );

        let archived_artifacts = self.archive_raw_records(started_at, &outcome.records).await?;

        let (table, stats) = transform_with_stats(&outcome.records);
        info!(
            input = stats.input_records,
            retained = stats.retained_rows,
            dropped = stats.dropped.len(),
            "transform complete"
        );

        let csv_path = self.config.csv_path();
        write_movie_table_csv(&csv_path, &table)
            .with_context(|| format!("writing {}", csv_path.display()))?;
        info!(path = %csv_path.display(), rows = table.len(), "saved movie table");

        let charts = render_all_charts(&table, &self.config.charts_dir)?;

        let reports_dir = self.config.reports_root().join(run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;
        let manifest_path = export_parquet_snapshot(&reports_dir, &table).await?;

        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            source_id: self.source.source_id().to_string(),
            requested_ids: catalog.movie_ids.len(),
            fetched_records: outcome.records.len(),
            failed_fetches: outcome.failures,
            archived_artifacts,
            input_records: stats.input_records,
            retained_rows: stats.retained_rows,
            dropped_rows: stats.dropped.len(),
            csv_path: csv_path.display().to_string(),
            charts: charts.iter().map(|p| p.display().to_string()).collect(),
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.display().to_string(),
        };
        write_reports(&reports_dir, &summary, &table, &catalog.presets()).await?;
        info!(%run_id, reports = %reports_dir.display(), "pipeline run finished");

        Ok(SyncRun { summary, table })
    }

    async fn archive_raw_records(
        &self,
        fetched_at: DateTime<Utc>,
        records: &[RawMovieRecord],
    ) -> Result<usize> {
        let mut stored = 0usize;
        for record in records {
            let bytes = serde_json::to_vec(record).context("serializing raw record")?;
            let artifact = self
                .artifact_store
                .store_bytes(fetched_at, self.source.source_id(), "json", &bytes)
                .await?;
            if !artifact.deduplicated {
                stored += 1;
            }
        }
        Ok(stored)
    }
}

async fn write_reports(
    reports_dir: &Path,
    summary: &SyncRunSummary,
    table: &MovieTable,
    presets: &SearchPresets,
) -> Result<()> {
    let mut brief = format!(
        "# Reel Run Brief\n\n- Run ID: `{}`\n- Started: {}\n- Finished: {}\n- Source: {}\n- Requested ids: {}\n- Fetched records: {}\n- Retained rows: {}\n- Dropped rows: {}\n",
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        summary.source_id,
        summary.requested_ids,
        summary.fetched_records,
        summary.retained_rows,
        summary.dropped_rows,
    );
    if !summary.failed_fetches.is_empty() {
        brief.push_str("\n## Failed Fetches\n");
        for failure in &summary.failed_fetches {
            brief.push_str(&format!("- {}: {}\n", failure.movie_id, failure.reason));
        }
    }
    brief.push('\n');
    brief.push_str(&render_markdown_report(table, presets));

    fs::write(reports_dir.join("run_brief.md"), brief)
        .await
        .context("writing run_brief.md")?;

    let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(reports_dir.join("run_summary.json"), json)
        .await
        .context("writing run_summary.json")?;
    Ok(())
}

async fn export_parquet_snapshot(reports_dir: &Path, table: &MovieTable) -> Result<PathBuf> {
    let snapshot_dir = reports_dir.join("snapshots");
    fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let movies_path = snapshot_dir.join("movies.parquet");
    write_parquet(&movies_path, movie_table_batch(table)?)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        files: vec![manifest_entry("movies", reports_dir, &movies_path)?],
    };
    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    fs::write(&manifest_path, bytes)
        .await
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

pub async fn run_sync_once_from_env() -> Result<SyncRun> {
    SyncPipeline::new(SyncConfig::from_env())?.run_once().await
}

pub fn report_recent_runs_markdown(runs: usize, output_dir: Option<PathBuf>) -> Result<String> {
    let root = output_dir.unwrap_or_else(|| PathBuf::from("output"));
    let reports_root = root.join("reports");
    // Runs that failed part-way never wrote a summary and are not listed.
    let mut dirs = std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join("run_summary.json").is_file())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# Reel Recent Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let summary_path = dir.path().join("run_summary.json");
        let brief_path = dir.path().join("run_brief.md");
        let manifest_path = dir.path().join("snapshots").join("manifest.json");

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;
        let count = |key: &str| summary.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
        let failed = summary
            .get("failed_fetches")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        let source = summary
            .get("source_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- source: {source}"));
        lines.push(format!("- fetched records: {}", count("fetched_records")));
        lines.push(format!("- failed fetches: {failed}"));
        lines.push(format!("- retained rows: {}", count("retained_rows")));
        lines.push(format!("- summary: `{}`", summary_path.display()));
        if brief_path.exists() {
            lines.push(format!("- run brief: `{}`", brief_path.display()));
        }
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

fn column_values<'a, T>(
    table: &'a MovieTable,
    column: Column,
    pick: impl Fn(CellValue<'a>) -> Option<T>,
) -> Vec<Option<T>> {
    table.rows.iter().map(|row| pick(row.value(column))).collect()
}

fn movie_table_batch(table: &MovieTable) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns.len());
    for &column in &table.columns {
        let (data_type, array): (DataType, ArrayRef) = match column.kind() {
            ColumnKind::Integer => (
                DataType::Int64,
                Arc::new(Int64Array::from(column_values(table, column, |v| match v {
                    CellValue::Integer(v) => v,
                    _ => None,
                }))),
            ),
            ColumnKind::Float => (
                DataType::Float64,
                Arc::new(Float64Array::from(column_values(table, column, |v| match v {
                    CellValue::Float(v) => v,
                    _ => None,
                }))),
            ),
            ColumnKind::Date => (
                DataType::Date32,
                Arc::new(Date32Array::from(column_values(table, column, |v| match v {
                    CellValue::Date(d) => d.map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE),
                    _ => None,
                }))),
            ),
            ColumnKind::Text => (
                DataType::Utf8,
                Arc::new(StringArray::from(column_values(table, column, |v| match v {
                    CellValue::Text(t) => t,
                    _ => None,
                }))),
            ),
        };
        fields.push(ArrowField::new(column.name(), data_type, true));
        arrays.push(array);
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .context("building movies record batch")
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256: ArtifactStore::sha256_hex(&bytes),
        bytes: bytes.len() as u64,
    })
}
