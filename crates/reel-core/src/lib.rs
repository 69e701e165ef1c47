//! Core domain model for Reel: raw TMDB records, normalized rows and the output table.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub const CRATE_NAME: &str = "reel-core";

pub const LIST_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawMovieRecord(Map<String, JsonValue>);

impl RawMovieRecord {
    pub fn new(fields: Map<String, JsonValue>) -> Self {
        Self(fields)
    }

    pub fn from_value(value: JsonValue) -> Option<Self> {
        match value {
            JsonValue::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, JsonValue> {
        self.0
    }

    pub fn id(&self) -> Option<i64> {
        match self.0.get("id")? {
            JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_number)),
            JsonValue::String(s) => parse_integer(s),
            _ => None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(JsonValue::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    Title,
    Tagline,
    ReleaseDate,
    Genres,
    BelongsToCollection,
    OriginalLanguage,
    BudgetMusd,
    RevenueMusd,
    ProductionCompanies,
    ProductionCountries,
    VoteCount,
    VoteAverage,
    Popularity,
    Runtime,
    Overview,
    SpokenLanguages,
    PosterPath,
    Cast,
    CastSize,
    Director,
    CrewSize,
    Profit,
    Roi,
}

pub const FINAL_COLUMNS: [Column; 24] = [
    Column::Id,
    Column::Title,
    Column::Tagline,
    Column::ReleaseDate,
    Column::Genres,
    Column::BelongsToCollection,
    Column::OriginalLanguage,
    Column::BudgetMusd,
    Column::RevenueMusd,
    Column::ProductionCompanies,
    Column::ProductionCountries,
    Column::VoteCount,
    Column::VoteAverage,
    Column::Popularity,
    Column::Runtime,
    Column::Overview,
    Column::SpokenLanguages,
    Column::PosterPath,
    Column::Cast,
    Column::CastSize,
    Column::Director,
    Column::CrewSize,
    Column::Profit,
    Column::Roi,
];

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::Title => "title",
            Column::Tagline => "tagline",
            Column::ReleaseDate => "release_date",
            Column::Genres => "genres",
            Column::BelongsToCollection => "belongs_to_collection",
            Column::OriginalLanguage => "original_language",
            Column::BudgetMusd => "budget_musd",
            Column::RevenueMusd => "revenue_musd",
            Column::ProductionCompanies => "production_companies",
            Column::ProductionCountries => "production_countries",
            Column::VoteCount => "vote_count",
            Column::VoteAverage => "vote_average",
            Column::Popularity => "popularity",
            Column::Runtime => "runtime",
            Column::Overview => "overview",
            Column::SpokenLanguages => "spoken_languages",
            Column::PosterPath => "poster_path",
            Column::Cast => "cast",
            Column::CastSize => "cast_size",
            Column::Director => "director",
            Column::CrewSize => "crew_size",
            Column::Profit => "profit",
            Column::Roi => "roi",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        FINAL_COLUMNS.iter().copied().find(|c| c.name() == name)
    }

    /// Columns copied straight from the source record. They only exist in the output
    /// when at least one input record carried the key; every other column is derived
    /// or coerced and is always present.
    pub fn is_passthrough(self) -> bool {
        matches!(
            self,
            Column::Id
                | Column::Title
                | Column::Tagline
                | Column::OriginalLanguage
                | Column::Overview
                | Column::PosterPath
        )
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::Id | Column::CastSize | Column::CrewSize => ColumnKind::Integer,
            Column::VoteCount
            | Column::BudgetMusd
            | Column::RevenueMusd
            | Column::VoteAverage
            | Column::Popularity
            | Column::Runtime
            | Column::Profit
            | Column::Roi => ColumnKind::Float,
            Column::ReleaseDate => ColumnKind::Date,
            _ => ColumnKind::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Date,
    Text,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedMovieRow {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub tagline: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub genres: Option<String>,
    pub belongs_to_collection: Option<String>,
    pub original_language: Option<String>,
    pub budget_musd: Option<f64>,
    pub revenue_musd: Option<f64>,
    pub production_companies: Option<String>,
    pub production_countries: Option<String>,
    pub vote_count: Option<f64>,
    pub vote_average: Option<f64>,
    pub popularity: Option<f64>,
    pub runtime: Option<f64>,
    pub overview: Option<String>,
    pub spoken_languages: Option<String>,
    pub poster_path: Option<String>,
    pub cast: Option<String>,
    pub cast_size: Option<u32>,
    pub director: Option<String>,
    pub crew_size: Option<u32>,
    pub profit: Option<f64>,
    pub roi: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue<'a> {
    Integer(Option<i64>),
    Float(Option<f64>),
    Date(Option<NaiveDate>),
    Text(Option<&'a str>),
}

impl CellValue<'_> {
    pub fn is_present(&self) -> bool {
        match self {
            CellValue::Integer(v) => v.is_some(),
            CellValue::Float(v) => v.is_some(),
            CellValue::Date(v) => v.is_some(),
            CellValue::Text(v) => v.is_some(),
        }
    }

    pub fn render(&self) -> Option<String> {
        match self {
            CellValue::Integer(v) => v.map(|v| v.to_string()),
            CellValue::Float(v) => v.map(format_float),
            CellValue::Date(v) => v.map(|d| d.format("%Y-%m-%d").to_string()),
            CellValue::Text(v) => v.map(ToString::to_string),
        }
    }
}

impl NormalizedMovieRow {
    pub fn value(&self, column: Column) -> CellValue<'_> {
        use CellValue::{Date, Float, Integer, Text};
        match column {
            Column::Id => Integer(self.id),
            Column::Title => Text(self.title.as_deref()),
            Column::Tagline => Text(self.tagline.as_deref()),
            Column::ReleaseDate => Date(self.release_date),
            Column::Genres => Text(self.genres.as_deref()),
            Column::BelongsToCollection => Text(self.belongs_to_collection.as_deref()),
            Column::OriginalLanguage => Text(self.original_language.as_deref()),
            Column::BudgetMusd => Float(self.budget_musd),
            Column::RevenueMusd => Float(self.revenue_musd),
            Column::ProductionCompanies => Text(self.production_companies.as_deref()),
            Column::ProductionCountries => Text(self.production_countries.as_deref()),
            Column::VoteCount => Float(self.vote_count),
            Column::VoteAverage => Float(self.vote_average),
            Column::Popularity => Float(self.popularity),
            Column::Runtime => Float(self.runtime),
            Column::Overview => Text(self.overview.as_deref()),
            Column::SpokenLanguages => Text(self.spoken_languages.as_deref()),
            Column::PosterPath => Text(self.poster_path.as_deref()),
            Column::Cast => Text(self.cast.as_deref()),
            Column::CastSize => Integer(self.cast_size.map(i64::from)),
            Column::Director => Text(self.director.as_deref()),
            Column::CrewSize => Integer(self.crew_size.map(i64::from)),
            Column::Profit => Float(self.profit),
            Column::Roi => Float(self.roi),
        }
    }

    pub fn cell(&self, column: Column) -> Option<String> {
        self.value(column).render()
    }

    pub fn set_cell(&mut self, column: Column, raw: &str) {
        let text = text_or_none(raw);
        match column {
            Column::Id => self.id = text.as_deref().and_then(parse_integer),
            Column::Title => self.title = text,
            Column::Tagline => self.tagline = text,
            Column::ReleaseDate => self.release_date = text.as_deref().and_then(parse_release_date),
            Column::Genres => self.genres = text,
            Column::BelongsToCollection => self.belongs_to_collection = text,
            Column::OriginalLanguage => self.original_language = text,
            Column::BudgetMusd => self.budget_musd = text.as_deref().and_then(parse_float),
            Column::RevenueMusd => self.revenue_musd = text.as_deref().and_then(parse_float),
            Column::ProductionCompanies => self.production_companies = text,
            Column::ProductionCountries => self.production_countries = text,
            Column::VoteCount => self.vote_count = text.as_deref().and_then(parse_float),
            Column::VoteAverage => self.vote_average = text.as_deref().and_then(parse_float),
            Column::Popularity => self.popularity = text.as_deref().and_then(parse_float),
            Column::Runtime => self.runtime = text.as_deref().and_then(parse_float),
            Column::Overview => self.overview = text,
            Column::SpokenLanguages => self.spoken_languages = text,
            Column::PosterPath => self.poster_path = text,
            Column::Cast => self.cast = text,
            Column::CastSize => {
                self.cast_size = text.as_deref().and_then(parse_integer).and_then(|v| u32::try_from(v).ok())
            }
            Column::Director => self.director = text,
            Column::CrewSize => {
                self.crew_size = text.as_deref().and_then(parse_integer).and_then(|v| u32::try_from(v).ok())
            }
            Column::Profit => self.profit = text.as_deref().and_then(parse_float),
            Column::Roi => self.roi = text.as_deref().and_then(parse_float),
        }
    }

    pub fn is_present(&self, column: Column) -> bool {
        self.value(column).is_present()
    }

    pub fn non_missing_count(&self) -> usize {
        FINAL_COLUMNS.iter().filter(|c| self.is_present(**c)).count()
    }

    pub fn genre_tokens(&self) -> impl Iterator<Item = &str> {
        self.genres
            .as_deref()
            .into_iter()
            .flat_map(|g| g.split(LIST_SEPARATOR))
    }

    pub fn release_year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.release_date.map(|d| d.year())
    }

    pub fn is_franchise(&self) -> bool {
        self.belongs_to_collection.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MovieTable {
    pub columns: Vec<Column>,
    pub rows: Vec<NormalizedMovieRow>,
}

impl MovieTable {
    pub fn new(columns: Vec<Column>, rows: Vec<NormalizedMovieRow>) -> Self {
        Self { columns, rows }
    }

    pub fn with_full_schema(rows: Vec<NormalizedMovieRow>) -> Self {
        Self::new(FINAL_COLUMNS.to_vec(), rows)
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name()).collect()
    }
}

pub fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok())
}

fn text_or_none(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| parse_float(raw).and_then(whole_number))
}

fn whole_number(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64).then_some(value as i64)
}

fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
