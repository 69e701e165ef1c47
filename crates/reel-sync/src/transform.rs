//! Flattening of raw API records into the normalized movie table.

use reel_core::{
    parse_release_date, Column, MovieTable, NormalizedMovieRow, RawMovieRecord, FINAL_COLUMNS,
    LIST_SEPARATOR,
};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

pub const DROPPED_SOURCE_KEYS: [&str; 5] = ["adult", "imdb_id", "original_title", "video", "homepage"];

pub const MIN_NON_MISSING_FIELDS: usize = 10;

pub const CAST_LIMIT: usize = 10;

const MUSD: f64 = 1_000_000.0;

/// Keys mapped onto typed row fields. Any other surviving key only counts toward
/// row completeness.
const MODELED_SOURCE_KEYS: [&str; 18] = [
    "id",
    "title",
    "tagline",
    "overview",
    "original_language",
    "release_date",
    "genres",
    "production_countries",
    "production_companies",
    "spoken_languages",
    "belongs_to_collection",
    "poster_path",
    "popularity",
    "vote_count",
    "vote_average",
    "runtime",
    "budget",
    "revenue",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreditsSummary {
    pub cast: Option<String>,
    pub cast_size: Option<u32>,
    pub director: Option<String>,
    pub crew_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedRow {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub non_missing: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformStats {
    pub input_records: usize,
    pub retained_rows: usize,
    pub dropped: Vec<DroppedRow>,
}

/// A flattened, coerced record: the typed row plus what still feeds the completeness
/// count but never reaches the output (raw `budget`/`revenue`, unmodeled keys).
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingRow {
    pub row: NormalizedMovieRow,
    pub budget: Option<f64>,
    pub revenue: Option<f64>,
    carried_non_missing: usize,
}

impl WorkingRow {
    pub fn from_record(record: &RawMovieRecord) -> Self {
        let field = |key: &str| {
            if DROPPED_SOURCE_KEYS.contains(&key) {
                None
            } else {
                record.get(key).filter(|v| !v.is_null())
            }
        };

        let credits = summarize_credits(field("credits"));
        let budget = missing_if_zero(field("budget").and_then(coerce_number));
        let revenue = missing_if_zero(field("revenue").and_then(coerce_number));

        let row = NormalizedMovieRow {
            id: record.id(),
            title: field("title").and_then(coerce_text),
            tagline: field("tagline").and_then(coerce_text),
            release_date: field("release_date")
                .and_then(JsonValue::as_str)
                .and_then(parse_release_date),
            genres: join_names(field("genres")),
            belongs_to_collection: collection_name(field("belongs_to_collection")),
            original_language: field("original_language").and_then(coerce_text),
            budget_musd: budget.map(|b| b / MUSD),
            revenue_musd: revenue.map(|r| r / MUSD),
            production_companies: join_names(field("production_companies")),
            production_countries: join_names(field("production_countries")),
            vote_count: field("vote_count").and_then(coerce_number),
            vote_average: field("vote_average").and_then(coerce_number),
            popularity: field("popularity").and_then(coerce_number),
            runtime: missing_if_zero(field("runtime").and_then(coerce_number)),
            overview: field("overview").and_then(coerce_text),
            spoken_languages: join_names(field("spoken_languages")),
            poster_path: field("poster_path").and_then(coerce_text),
            cast: credits.cast,
            cast_size: credits.cast_size,
            director: credits.director,
            crew_size: credits.crew_size,
            profit: None,
            roi: None,
        };

        let carried_non_missing = record
            .fields()
            .iter()
            .filter(|(key, value)| {
                !DROPPED_SOURCE_KEYS.contains(&key.as_str())
                    && !MODELED_SOURCE_KEYS.contains(&key.as_str())
                    && !value.is_null()
            })
            .count();

        Self {
            row,
            budget,
            revenue,
            carried_non_missing,
        }
    }

    pub fn non_missing(&self) -> usize {
        self.row.non_missing_count()
            + usize::from(self.budget.is_some())
            + usize::from(self.revenue.is_some())
            + self.carried_non_missing
    }

    pub fn is_complete(&self) -> bool {
        self.non_missing() >= MIN_NON_MISSING_FIELDS
    }
}

pub fn transform(records: &[RawMovieRecord]) -> MovieTable {
    transform_with_stats(records).0
}

pub fn transform_with_stats(records: &[RawMovieRecord]) -> (MovieTable, TransformStats) {
    let mut stats = TransformStats {
        input_records: records.len(),
        ..Default::default()
    };

    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let working = WorkingRow::from_record(record);
        if !working.is_complete() {
            debug!(
                id = ?working.row.id,
                non_missing = working.non_missing(),
                "dropping sparse record"
            );
            stats.dropped.push(DroppedRow {
                id: working.row.id,
                title: working.row.title.clone(),
                non_missing: working.non_missing(),
            });
            continue;
        }
        let mut row = working.row;
        compute_kpis(&mut row);
        rows.push(row);
    }
    stats.retained_rows = rows.len();

    (MovieTable::new(present_columns(records), rows), stats)
}

pub fn present_columns(records: &[RawMovieRecord]) -> Vec<Column> {
    FINAL_COLUMNS
        .iter()
        .copied()
        .filter(|c| !c.is_passthrough() || records.iter().any(|r| r.contains_key(c.name())))
        .collect()
}

pub fn compute_kpis(row: &mut NormalizedMovieRow) {
    match (row.revenue_musd, row.budget_musd) {
        (Some(revenue), Some(budget)) => {
            row.profit = Some(revenue - budget);
            row.roi = Some(revenue / budget).filter(|r| r.is_finite());
        }
        _ => {
            row.profit = None;
            row.roi = None;
        }
    }
}

pub fn summarize_credits(credits: Option<&JsonValue>) -> CreditsSummary {
    let Some(credits) = credits.and_then(JsonValue::as_object) else {
        return CreditsSummary::default();
    };

    let mut summary = CreditsSummary::default();
    if let Some(cast) = credits.get("cast").and_then(JsonValue::as_array) {
        summary.cast = Some(join_entry_names(cast.iter().take(CAST_LIMIT)));
        summary.cast_size = u32::try_from(cast.len()).ok();
    }
    if let Some(crew) = credits.get("crew").and_then(JsonValue::as_array) {
        summary.director = crew
            .iter()
            .find(|member| member.get("job").and_then(JsonValue::as_str) == Some("Director"))
            .and_then(|member| member.get("name"))
            .and_then(coerce_text);
        summary.crew_size = u32::try_from(crew.len()).ok();
    }
    summary
}

pub fn join_names(value: Option<&JsonValue>) -> Option<String> {
    value
        .and_then(JsonValue::as_array)
        .map(|entries| join_entry_names(entries.iter()))
}

fn join_entry_names<'a>(entries: impl Iterator<Item = &'a JsonValue>) -> String {
    let separator = LIST_SEPARATOR.to_string();
    entries
        .map(|entry| entry.get("name").and_then(coerce_text).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(separator.as_str())
}

pub fn collection_name(value: Option<&JsonValue>) -> Option<String> {
    value
        .and_then(JsonValue::as_object)
        .and_then(|c| c.get("name"))
        .and_then(coerce_text)
}

pub fn coerce_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn coerce_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn missing_if_zero(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(value: JsonValue) -> RawMovieRecord {
        RawMovieRecord::from_value(value).expect("object")
    }

    fn titanic() -> RawMovieRecord {
        record(json!({
            "id": 597,
            "title": "Titanic",
            "adult": false,
            "imdb_id": "tt0120338",
            "release_date": "1997-12-19",
            "genres": [{"id": 18, "name": "Drama"}, {"id": 10749, "name": "Romance"}],
            "budget": 200000000,
            "revenue": 1800000000,
            "runtime": 194,
            "vote_average": 7.9,
            "vote_count": 24000,
            "credits": {
                "cast": [{"name": "Leonardo DiCaprio"}],
                "crew": [{"name": "James Cameron", "job": "Director"}]
            }
        }))
    }

    fn only_row(table: &MovieTable) -> &NormalizedMovieRow {
        assert_eq!(table.len(), 1, "expected exactly one retained row");
        &table.rows[0]
    }

    #[test]
    fn titanic_flattens_to_expected_kpis() {
        let (table, stats) = transform_with_stats(&[titanic()]);
        let row = only_row(&table);
        assert_eq!(row.id, Some(597));
        assert_eq!(row.genres.as_deref(), Some("Drama|Romance"));
        assert_eq!(row.cast.as_deref(), Some("Leonardo DiCaprio"));
        assert_eq!(row.cast_size, Some(1));
        assert_eq!(row.director.as_deref(), Some("James Cameron"));
        assert_eq!(row.crew_size, Some(1));
        assert_eq!(row.release_date, NaiveDate::from_ymd_opt(1997, 12, 19));
        assert_eq!(row.budget_musd, Some(200.0));
        assert_eq!(row.revenue_musd, Some(1800.0));
        assert_eq!(row.profit, Some(1600.0));
        assert_eq!(row.roi, Some(9.0));
        assert_eq!(stats.input_records, 1);
        assert_eq!(stats.retained_rows, 1);
        assert!(stats.dropped.is_empty());
    }

    #[test]
    fn missing_credits_leave_derived_fields_missing() {
        let mut fields = titanic().into_fields();
        fields.remove("credits");
        let working = WorkingRow::from_record(&RawMovieRecord::new(fields));
        assert_eq!(working.row.cast, None);
        assert_eq!(working.row.director, None);
        assert_eq!(working.row.cast_size, None);
        assert_eq!(working.row.crew_size, None);

        let not_an_object = summarize_credits(Some(&json!("n/a")));
        assert_eq!(not_an_object, CreditsSummary::default());
    }

    #[test]
    fn cast_keeps_first_ten_names_but_counts_everyone() {
        let cast: Vec<JsonValue> = (1..=15).map(|i| json!({"name": format!("Actor {i}")})).collect();
        let summary = summarize_credits(Some(&json!({"cast": cast, "crew": []})));
        let cast = summary.cast.expect("cast");
        assert_eq!(cast.split('|').count(), 10);
        assert!(cast.starts_with("Actor 1|Actor 2|"));
        assert!(cast.ends_with("|Actor 10"));
        assert_eq!(summary.cast_size, Some(15));
        assert_eq!(summary.director, None);
        assert_eq!(summary.crew_size, Some(0));
    }

    #[test]
    fn director_is_first_crew_member_with_director_job() {
        let summary = summarize_credits(Some(&json!({
            "crew": [
                {"name": "A Writer", "job": "Screenplay"},
                {"name": "First Director", "job": "Director"},
                {"name": "Second Director", "job": "Director"}
            ]
        })));
        assert_eq!(summary.director.as_deref(), Some("First Director"));
        assert_eq!(summary.crew_size, Some(3));
        assert_eq!(summary.cast, None);
        assert_eq!(summary.cast_size, None);
    }

    #[test]
    fn zero_budget_is_missing_and_blocks_kpis() {
        let mut fields = titanic().into_fields();
        fields.insert("budget".into(), json!(0));
        fields.insert("runtime".into(), json!(0));
        let table = transform(&[RawMovieRecord::new(fields)]);
        let row = only_row(&table);
        assert_eq!(row.budget_musd, None);
        assert_eq!(row.runtime, None);
        assert_eq!(row.revenue_musd, Some(1800.0));
        assert_eq!(row.profit, None);
        assert_eq!(row.roi, None);
    }

    #[test]
    fn infinite_roi_becomes_missing_but_profit_survives() {
        let mut fields = titanic().into_fields();
        fields.insert("budget".into(), json!(1e-300));
        fields.insert("revenue".into(), json!(1e10));
        let table = transform(&[RawMovieRecord::new(fields)]);
        let row = only_row(&table);
        assert_eq!(row.roi, None);
        let profit = row.profit.expect("profit");
        assert!((profit - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn profit_identity_holds_on_fixture_rows() {
        let records = reel_adapters::load_fixture_records(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("../../fixtures/tmdb/sample/movies.json"),
        )
        .expect("fixture");
        let table = transform(&records);
        assert!(!table.is_empty());
        for row in &table.rows {
            match (row.revenue_musd, row.budget_musd) {
                (Some(r), Some(b)) => {
                    assert!((row.profit.expect("profit") - (r - b)).abs() < 1e-9);
                    if let Some(roi) = row.roi {
                        assert!(roi.is_finite());
                        assert!((roi - r / b).abs() < 1e-9);
                    }
                }
                _ => {
                    assert_eq!(row.profit, None);
                    assert_eq!(row.roi, None);
                }
            }
        }
    }

    #[test]
    fn completeness_threshold_is_inclusive_at_ten() {
        let sparse = record(json!({"id": 1, "title": "Sparse", "overview": "three fields"}));
        let ten = record(json!({
            "id": 2,
            "title": "Ten",
            "tagline": "t",
            "overview": "o",
            "original_language": "en",
            "release_date": "2001-01-01",
            "popularity": 1.5,
            "vote_average": 6.0,
            "vote_count": 10,
            "poster_path": "/p.jpg"
        }));
        let mut nine = ten.clone().into_fields();
        nine.remove("poster_path");
        nine.insert("id".into(), json!(3));

        let (table, stats) = transform_with_stats(&[sparse, ten, RawMovieRecord::new(nine)]);
        assert_eq!(table.rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![Some(2)]);
        assert_eq!(stats.retained_rows, 1);
        assert_eq!(
            stats.dropped.iter().map(|d| (d.id, d.non_missing)).collect::<Vec<_>>(),
            vec![(Some(1), 3), (Some(3), 9)]
        );
    }

    #[test]
    fn dropped_keys_do_not_count_toward_completeness() {
        let record = record(json!({
            "id": 4,
            "title": "Nine",
            "tagline": "t",
            "overview": "o",
            "original_language": "en",
            "release_date": "2001-01-01",
            "popularity": 1.5,
            "vote_average": 6.0,
            "vote_count": 10,
            "adult": false,
            "imdb_id": "tt1",
            "original_title": "Nine",
            "video": false,
            "homepage": "https://example.test"
        }));
        assert_eq!(WorkingRow::from_record(&record).non_missing(), 9);
        assert!(transform(&[record]).is_empty());
    }

    #[test]
    fn unmodeled_keys_and_raw_money_count_toward_completeness() {
        let record = record(json!({
            "id": 5,
            "title": "Counted",
            "budget": 1000000,
            "revenue": 3000000,
            "status": "Released",
            "backdrop_path": "/b.jpg",
            "origin_country": ["US"],
            "credits": {"cast": [], "crew": []}
        }));
        let working = WorkingRow::from_record(&record);
        // id, title, budget_musd, revenue_musd, cast, cast_size, crew_size, budget,
        // revenue, status, backdrop_path, origin_country, credits
        assert_eq!(working.non_missing(), 13);
        let table = transform(&[record]);
        let row = only_row(&table);
        assert_eq!(row.cast.as_deref(), Some(""));
        assert_eq!(row.roi, Some(3.0));
    }

    #[test]
    fn coercion_failures_become_missing_but_odd_numbers_stay() {
        let mut fields = titanic().into_fields();
        fields.insert("budget".into(), json!("150000000"));
        fields.insert("runtime".into(), json!("unknown"));
        fields.insert("vote_count".into(), json!(-3));
        fields.insert("release_date".into(), json!("someday"));
        fields.insert("belongs_to_collection".into(), json!("not an object"));
        let table = transform(&[RawMovieRecord::new(fields)]);
        let row = only_row(&table);
        assert_eq!(row.budget_musd, Some(150.0));
        assert_eq!(row.runtime, None);
        assert_eq!(row.vote_count, Some(-3.0));
        assert_eq!(row.release_date, None);
        assert_eq!(row.belongs_to_collection, None);
        assert_eq!(row.roi, Some(12.0));
    }

    #[test]
    fn fractional_vote_counts_are_kept() {
        let mut fields = titanic().into_fields();
        fields.insert("vote_count".into(), json!(12.5));
        let table = transform(&[RawMovieRecord::new(fields)]);
        assert_eq!(only_row(&table).vote_count, Some(12.5));
    }

    #[test]
    fn passthrough_columns_follow_input_keys() {
        let table = transform(&[titanic()]);
        assert!(table.has_column(Column::Id));
        assert!(table.has_column(Column::Title));
        assert!(!table.has_column(Column::Tagline));
        assert!(!table.has_column(Column::PosterPath));
        assert!(table.has_column(Column::Cast));
        assert!(table.has_column(Column::BelongsToCollection));
        assert_eq!(table.columns.last(), Some(&Column::Roi));

        let empty = transform(&[]);
        assert!(empty.is_empty());
        assert!(!empty.has_column(Column::Id));
        assert!(empty.has_column(Column::Genres));
    }

    #[test]
    fn input_records_are_left_untouched() {
        let records = vec![titanic()];
        let before = records.clone();
        let _ = transform(&records);
        assert_eq!(records, before);
        assert!(records[0].contains_key("adult"));
    }
}
