//! Movie source contracts: the live TMDB source and a fixture-backed source.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reel_core::RawMovieRecord;
use reel_storage::{FetchError, HttpFetcher};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "reel-adapters";

pub const TMDB_SOURCE_ID: &str = "tmdb";
pub const FIXTURE_SOURCE_ID: &str = "fixture";
pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3/movie/";

/// Identifiers fetched when no catalog file overrides them. `0` is not a valid
/// TMDB id and exercises the per-identifier failure path.
pub const DEFAULT_MOVIE_IDS: [i64; 19] = [
    0, 299534, 19995, 140607, 299536, 597, 135397, 420818, 24428, 168259, 99861, 284054, 12445,
    181808, 330457, 351286, 109445, 321612, 260513,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchContext {
    pub run_id: Uuid,
}

impl FetchContext {
    pub fn new(run_id: Uuid) -> Self {
        Self { run_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub movie_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub records: Vec<RawMovieRecord>,
    pub failures: Vec<FetchFailure>,
}

impl FetchOutcome {
    fn skip(&mut self, movie_id: i64, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(movie_id, %reason, "failed to fetch movie");
        self.failures.push(FetchFailure { movie_id, reason });
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
}

#[async_trait]
pub trait MovieSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// Fetches one record per identifier. Individual failures are reported in the
    /// outcome and never abort the batch.
    async fn fetch_records(
        &self,
        ctx: &FetchContext,
        movie_ids: &[i64],
    ) -> Result<FetchOutcome, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct TmdbSource {
    http: HttpFetcher,
    base_url: String,
}

impl TmdbSource {
    pub fn new(http: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn movie_url(&self, movie_id: i64) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/{movie_id}?append_to_response=credits")
    }
}

pub fn parse_record_body(body: &[u8]) -> Result<RawMovieRecord, AdapterError> {
    let value: JsonValue = serde_json::from_slice(body)
        .map_err(|e| AdapterError::Message(format!("invalid json body: {e}")))?;
    RawMovieRecord::from_value(value)
        .ok_or_else(|| AdapterError::Message("response body is not a json object".to_string()))
}

#[async_trait]
impl MovieSource for TmdbSource {
    fn source_id(&self) -> &'static str {
        TMDB_SOURCE_ID
    }

    async fn fetch_records(
        &self,
        ctx: &FetchContext,
        movie_ids: &[i64],
    ) -> Result<FetchOutcome, AdapterError> {
        let mut outcome = FetchOutcome::default();
        for &movie_id in movie_ids {
            let url = self.movie_url(movie_id);
            match self.http.fetch_bytes(ctx.run_id, TMDB_SOURCE_ID, &url).await {
                Ok(resp) => match parse_record_body(&resp.body) {
                    Ok(record) => {
                        info!(movie_id, "fetched movie");
                        outcome.records.push(record);
                    }
                    Err(err) => outcome.skip(movie_id, err.to_string()),
                },
                Err(FetchError::HttpStatus { status, .. }) => {
                    outcome.skip(movie_id, format!("http status {status}"))
                }
                Err(err) => outcome.skip(movie_id, err.to_string()),
            }
        }
        Ok(outcome)
    }
}

#[derive(Debug, Clone)]
pub struct FixtureSource {
    path: PathBuf,
    records: HashMap<i64, RawMovieRecord>,
}

impl FixtureSource {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let records = load_fixture_records(path)?
            .into_iter()
            .filter_map(|r| r.id().map(|id| (id, r)))
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MovieSource for FixtureSource {
    fn source_id(&self) -> &'static str {
        FIXTURE_SOURCE_ID
    }

    async fn fetch_records(
        &self,
        _ctx: &FetchContext,
        movie_ids: &[i64],
    ) -> Result<FetchOutcome, AdapterError> {
        let mut outcome = FetchOutcome::default();
        for &movie_id in movie_ids {
            match self.records.get(&movie_id) {
                Some(record) => outcome.records.push(record.clone()),
                None => outcome.skip(
                    movie_id,
                    format!("not present in fixture {}", self.path.display()),
                ),
            }
        }
        Ok(outcome)
    }
}

pub fn load_fixture_records(path: impl AsRef<Path>) -> Result<Vec<RawMovieRecord>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let values: Vec<JsonValue> =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(values
        .into_iter()
        .filter_map(RawMovieRecord::from_value)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_storage::HttpClientConfig;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Answers one connection per canned response, in order, then closes it.
    async fn serve_responses(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                loop {
                    let n = socket.read(&mut buf[read..]).await.unwrap();
                    read += n;
                    if n == 0 || buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let reason = if status == 200 { "OK" } else { "Unauthorized" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/3/movie/")
    }

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn fixture_path() -> PathBuf {
        workspace_root()
            .join("fixtures")
            .join("tmdb")
            .join("sample")
            .join("movies.json")
    }

    #[test]
    fn movie_url_requests_embedded_credits() {
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        let source = TmdbSource::new(http.clone(), DEFAULT_TMDB_BASE_URL);
        assert_eq!(
            source.movie_url(597),
            "https://api.themoviedb.org/3/movie/597?append_to_response=credits"
        );
        let bare = TmdbSource::new(http, "http://localhost:9000/3/movie");
        assert_eq!(
            bare.movie_url(19995),
            "http://localhost:9000/3/movie/19995?append_to_response=credits"
        );
    }

    #[test]
    fn fetch_context_serializes_the_run_id() {
        let ctx = FetchContext::new(Uuid::nil());
        let value = serde_json::to_value(&ctx).expect("serialize");
        assert_eq!(value, serde_json::json!({"run_id": "00000000-0000-0000-0000-000000000000"}));
        let back: FetchContext = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, ctx);
    }

    #[tokio::test]
    async fn tmdb_source_skips_rejected_ids_and_keeps_going() {
        let base_url = serve_responses(vec![
            (401, r#"{"status_code":7,"status_message":"Invalid API key"}"#),
            (200, r#"{"id":597,"title":"Titanic"}"#),
        ])
        .await;
        let source = TmdbSource::new(HttpFetcher::new(HttpClientConfig::default()).unwrap(), base_url);

        let outcome = source
            .fetch_records(&FetchContext::new(Uuid::new_v4()), &[0, 597])
            .await
            .unwrap();

        let ids: Vec<_> = outcome.records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![Some(597)]);
        assert_eq!(
            outcome.failures,
            vec![FetchFailure {
                movie_id: 0,
                reason: "http status 401".to_string(),
            }]
        );
    }

    #[test]
    fn record_bodies_must_be_objects() {
        let record = parse_record_body(br#"{"id": 597, "title": "Titanic"}"#).unwrap();
        assert_eq!(record.id(), Some(597));
        assert!(parse_record_body(b"[1,2,3]").is_err());
        assert!(parse_record_body(b"<html>").is_err());
    }

    #[tokio::test]
    async fn fixture_source_answers_in_request_order_and_reports_misses() {
        let source = FixtureSource::load(fixture_path()).unwrap();
        let ctx = FetchContext::new(Uuid::new_v4());
        let outcome = source.fetch_records(&ctx, &[0, 597, 19995]).await.unwrap();

        let ids: Vec<_> = outcome.records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![Some(597), Some(19995)]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].movie_id, 0);
    }

    #[test]
    fn fixture_loader_skips_non_object_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, r#"[{"id": 1}, 42, "text", {"id": 2}]"#).unwrap();
        let records = load_fixture_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(load_fixture_records(dir.path().join("missing.json")).is_err());
    }
}
