// src/model.rs
//! Record shapes: per-source silver rows, the unified gold record, cursors and
//! the query-side views served over HTTP.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator between source-kind and native id in the composite identifier.
pub const ID_SEPARATOR: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    JpMinkabu,
    CnWind,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::JpMinkabu, SourceKind::CnWind];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::JpMinkabu => "jp_minkabu",
            SourceKind::CnWind => "cn_wind",
        }
    }

    /// Country code accepted by the query surface ("JP"/"CN", case-insensitive).
    pub fn from_country(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "JP" => Some(SourceKind::JpMinkabu),
            "CN" => Some(SourceKind::CnWind),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| format!("unknown source kind: {t}"))
    }
}

/// Build the stable composite identifier `<source>_<native id>`.
pub fn composite_id(kind: SourceKind, native_id: &str) -> String {
    format!("{}{}{}", kind.as_str(), ID_SEPARATOR, native_id)
}

/// Split a composite identifier back into its key fields.
/// The longest matching source-kind prefix wins; the native id may contain `_`.
pub fn parse_composite_id(id: &str) -> Option<(SourceKind, String)> {
    let mut kinds = SourceKind::ALL;
    kinds.sort_by_key(|k| std::cmp::Reverse(k.as_str().len()));
    kinds.into_iter().find_map(|k| {
        let rest = id.strip_prefix(k.as_str())?.strip_prefix(ID_SEPARATOR)?;
        (!rest.is_empty()).then(|| (k, rest.to_string()))
    })
}

/// Position in a source table: last-updated time with the native id as tie-break.
/// Field order gives the lexicographic ordering used for cursoring.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    pub updated_at: DateTime<Utc>,
    pub native_id: String,
}

impl Cursor {
    pub fn new(updated_at: DateTime<Utc>, native_id: impl Into<String>) -> Self {
        Self {
            updated_at,
            native_id: native_id.into(),
        }
    }
}

/// Persisted sync progress for one source-kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub source: SourceKind,
    pub cursor: Cursor,
    pub last_sync_count: i64,
    pub last_success_at: DateTime<Utc>,
}

/// Silver row of the Japanese Minkabu feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct JpMinkabuRecord {
    pub id: i64,
    pub news_id: String,
    pub original_headline: String,
    pub original_story: Option<String>,
    pub translated_headline: String,
    pub translated_story: Option<String>,
    pub providers: Vec<String>,
    pub topics: Vec<String>,
    pub tickers: Vec<String>,
    pub creation_time: DateTime<Utc>,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Silver row of the Chinese Wind feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CnWindRecord {
    pub id: i64,
    pub object_id: String,
    pub original_title: String,
    pub original_content: Option<String>,
    pub translated_title: String,
    pub translated_content: Option<String>,
    pub publish_date: DateTime<Utc>,
    pub source: Option<String>,
    pub sections: Vec<String>,
    pub wind_codes: Vec<String>,
    pub keywords: Option<Vec<String>>,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A silver row of any registered source-kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceRecord {
    JpMinkabu(JpMinkabuRecord),
    CnWind(CnWindRecord),
}

impl SourceRecord {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceRecord::JpMinkabu(_) => SourceKind::JpMinkabu,
            SourceRecord::CnWind(_) => SourceKind::CnWind,
        }
    }

    pub fn native_id(&self) -> &str {
        match self {
            SourceRecord::JpMinkabu(r) => &r.news_id,
            SourceRecord::CnWind(r) => &r.object_id,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            SourceRecord::JpMinkabu(r) => r.updated_at,
            SourceRecord::CnWind(r) => r.updated_at,
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.updated_at(), self.native_id())
    }
}

/// Unified gold record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub source: SourceKind,
    pub source_news_id: String,
    pub original_headline: String,
    pub original_content: Option<String>,
    pub translated_headline: String,
    pub translated_content: Option<String>,
    pub tickers: Vec<String>,
    pub topics: Vec<String>,
    pub keywords: Option<Vec<String>>,
    pub provider: Option<String>,
    pub published_at: DateTime<Utc>,
    pub model_name: String,
    pub source_created_at: Option<DateTime<Utc>>,
    pub source_updated_at: Option<DateTime<Utc>>,
    /// Stamped by the target store on every upsert.
    pub synced_at: Option<DateTime<Utc>>,
}

impl CanonicalRecord {
    pub fn composite_id(&self) -> String {
        composite_id(self.source, &self.source_news_id)
    }
}

// ---- query side ----

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsFilter {
    pub source: Option<SourceKind>,
    pub ticker: Option<String>,
    /// Restrict to records carrying at least one ticker with this exchange suffix.
    pub exchange: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: u32,
    pub limit: u32,
}

impl NewsFilter {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp paging into its valid range.
    pub fn normalized(mut self) -> Self {
        if self.page == 0 {
            self.page = 1;
        }
        if self.limit == 0 {
            self.limit = Self::DEFAULT_LIMIT;
        }
        self.limit = self.limit.min(Self::MAX_LIMIT);
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// In-process evaluation of the filter (used by the memory store).
    pub fn matches(&self, r: &CanonicalRecord) -> bool {
        if self.source.is_some_and(|s| s != r.source) {
            return false;
        }
        if let Some(t) = &self.ticker {
            if !r.tickers.iter().any(|x| x == t) {
                return false;
            }
        }
        if let Some(ex) = &self.exchange {
            let suffix = format!(".{ex}");
            if !r.tickers.iter().any(|x| x.ends_with(&suffix)) {
                return false;
            }
        }
        if self.from.is_some_and(|f| r.published_at < f) {
            return false;
        }
        if self.to.is_some_and(|t| r.published_at > t) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsListItem {
    pub id: String,
    pub source: SourceKind,
    pub date: String,
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    pub headline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub tickers: Vec<String>,
    pub published_at: DateTime<Utc>,
}

impl From<&CanonicalRecord> for NewsListItem {
    fn from(r: &CanonicalRecord) -> Self {
        Self {
            id: r.composite_id(),
            source: r.source,
            date: r.published_at.format("%Y-%m-%d").to_string(),
            time: r.published_at.format("%H:%M:%S").to_string(),
            publisher: r.provider.clone(),
            headline: r.translated_headline.clone(),
            content: r.translated_content.clone(),
            tickers: r.tickers.clone(),
            published_at: r.published_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsDetail {
    pub id: String,
    pub source: SourceKind,
    pub original_headline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    pub translated_headline: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_content: Option<String>,
    pub tickers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    pub published_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub model_name: String,
}

impl From<CanonicalRecord> for NewsDetail {
    fn from(r: CanonicalRecord) -> Self {
        Self {
            id: r.composite_id(),
            source: r.source,
            original_headline: r.original_headline,
            original_content: r.original_content,
            translated_headline: r.translated_headline,
            translated_content: r.translated_content,
            tickers: r.tickers,
            topics: r.topics,
            keywords: r.keywords,
            published_at: r.published_at,
            provider: r.provider,
            model_name: r.model_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsListResponse {
    pub data: Vec<NewsListItem>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn composite_id_survives_underscores_in_native_id() {
        let id = composite_id(SourceKind::JpMinkabu, "N_2025_001");
        assert_eq!(id, "jp_minkabu_N_2025_001");
        assert_eq!(
            parse_composite_id(&id),
            Some((SourceKind::JpMinkabu, "N_2025_001".to_string()))
        );
        assert_eq!(
            parse_composite_id("cn_wind_abc"),
            Some((SourceKind::CnWind, "abc".to_string()))
        );
        assert_eq!(parse_composite_id("cn_wind_"), None);
        assert_eq!(parse_composite_id("us_x_1"), None);
        assert_eq!(parse_composite_id("jp_minkabu"), None);
    }

    #[test]
    fn cursor_orders_by_time_then_id() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let a = Cursor::new(t, "a");
        let b = Cursor::new(t, "b");
        let later = Cursor::new(t + chrono::Duration::seconds(1), "0");
        assert!(a < b);
        assert!(b < later);
    }

    #[test]
    fn source_kind_parses_case_insensitively() {
        assert_eq!("JP_MINKABU".parse::<SourceKind>(), Ok(SourceKind::JpMinkabu));
        assert_eq!(" cn_wind ".parse::<SourceKind>(), Ok(SourceKind::CnWind));
        assert!("bloomberg".parse::<SourceKind>().is_err());
        assert_eq!(SourceKind::from_country("cn"), Some(SourceKind::CnWind));
        assert_eq!(SourceKind::from_country("US"), None);
    }

    #[test]
    fn filter_paging_is_clamped() {
        let f = NewsFilter {
            page: 0,
            limit: 500,
            ..Default::default()
        }
        .normalized();
        assert_eq!((f.page, f.limit), (1, 100));
        let f = NewsFilter {
            page: 3,
            limit: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(f.limit, 20);
        assert_eq!(f.offset(), 40);
    }
}
