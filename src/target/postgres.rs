// src/target/postgres.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::error::StoreError;
use crate::model::{
    CanonicalRecord, Cursor, NewsDetail, NewsFilter, NewsListItem, SourceKind, Watermark,
};
use crate::target::{NewsQuery, TargetWriter};

const MIGRATION_0001: &str = include_str!("../../migrations/0001_gold.sql");

// Conflicts keep the first-seen `source_created_at`.
const UPSERT_NEWS: &str = r#"
INSERT INTO gold.translated_news
    (source, source_news_id, original_headline, original_content,
     translated_headline, translated_content, tickers, topics, keywords,
     provider, published_at, model_name, source_created_at, source_updated_at, synced_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())
ON CONFLICT (source, source_news_id) DO UPDATE SET
    original_headline = EXCLUDED.original_headline,
    original_content = EXCLUDED.original_content,
    translated_headline = EXCLUDED.translated_headline,
    translated_content = EXCLUDED.translated_content,
    tickers = EXCLUDED.tickers,
    topics = EXCLUDED.topics,
    keywords = EXCLUDED.keywords,
    provider = EXCLUDED.provider,
    published_at = EXCLUDED.published_at,
    model_name = EXCLUDED.model_name,
    source_updated_at = EXCLUDED.source_updated_at,
    synced_at = NOW()
"#;

const ADVANCE_WATERMARK: &str = r#"
INSERT INTO gold.sync_metadata AS m
    (source, last_synced_at, last_source_id, last_sync_count, updated_at)
VALUES ($1, $2, $3, $4, NOW())
ON CONFLICT (source) DO UPDATE SET
    last_synced_at = EXCLUDED.last_synced_at,
    last_source_id = EXCLUDED.last_source_id,
    last_sync_count = EXCLUDED.last_sync_count,
    updated_at = NOW()
WHERE m.last_synced_at IS NULL
   OR (m.last_synced_at, COALESCE(m.last_source_id, '') COLLATE "C")
      <= (EXCLUDED.last_synced_at, EXCLUDED.last_source_id COLLATE "C")
"#;

const GET_WATERMARK: &str = r#"
SELECT last_synced_at, COALESCE(last_source_id, '') AS last_source_id,
       last_sync_count, updated_at
  FROM gold.sync_metadata
 WHERE source = $1
"#;

const GOLD_COLUMNS: &str = r#"
SELECT source, source_news_id, original_headline, original_content,
       translated_headline, translated_content,
       COALESCE(tickers, '{}') AS tickers, COALESCE(topics, '{}') AS topics, keywords,
       provider, published_at, model_name, source_created_at, source_updated_at, synced_at
  FROM gold.translated_news"#;

#[derive(Debug, sqlx::FromRow)]
struct GoldRow {
    source: String,
    source_news_id: String,
    original_headline: String,
    original_content: Option<String>,
    translated_headline: String,
    translated_content: Option<String>,
    tickers: Vec<String>,
    topics: Vec<String>,
    keywords: Option<Vec<String>>,
    provider: Option<String>,
    published_at: DateTime<Utc>,
    model_name: String,
    source_created_at: Option<DateTime<Utc>>,
    source_updated_at: Option<DateTime<Utc>>,
    synced_at: Option<DateTime<Utc>>,
}

impl TryFrom<GoldRow> for CanonicalRecord {
    type Error = StoreError;

    fn try_from(r: GoldRow) -> Result<Self, Self::Error> {
        let source = r
            .source
            .parse::<SourceKind>()
            .map_err(|e| StoreError::message(format!("invalid source in gold: {e}")))?;
        Ok(CanonicalRecord {
            source,
            source_news_id: r.source_news_id,
            original_headline: r.original_headline,
            original_content: r.original_content,
            translated_headline: r.translated_headline,
            translated_content: r.translated_content,
            tickers: r.tickers,
            topics: r.topics,
            keywords: r.keywords,
            provider: r.provider,
            published_at: r.published_at,
            model_name: r.model_name,
            source_created_at: r.source_created_at,
            source_updated_at: r.source_updated_at,
            synced_at: r.synced_at,
        })
    }
}

/// Unified gold table plus per-source sync metadata.
#[derive(Clone)]
pub struct PgTargetStore {
    pool: PgPool,
}

impl PgTargetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the gold schema. Every statement is idempotent.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for stmt in MIGRATION_0001
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, f: &NewsFilter) {
    let mut sep = " WHERE ";
    if let Some(s) = f.source {
        qb.push(sep).push("source = ").push_bind(s.as_str());
        sep = " AND ";
    }
    if let Some(t) = &f.ticker {
        qb.push(sep).push_bind(t.clone()).push(" = ANY(tickers)");
        sep = " AND ";
    }
    if let Some(ex) = &f.exchange {
        qb.push(sep)
            .push("EXISTS (SELECT 1 FROM unnest(tickers) AS t(code) WHERE t.code LIKE ")
            .push_bind(format!("%.{ex}"))
            .push(")");
        sep = " AND ";
    }
    if let Some(from) = f.from {
        qb.push(sep).push("published_at >= ").push_bind(from);
        sep = " AND ";
    }
    if let Some(to) = f.to {
        qb.push(sep).push("published_at <= ").push_bind(to);
    }
}

#[async_trait]
impl TargetWriter for PgTargetStore {
    #[tracing::instrument(level = "debug", skip_all, fields(records = records.len()))]
    async fn upsert(&self, records: &[CanonicalRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;
        for n in records {
            let res = sqlx::query(UPSERT_NEWS)
                .bind(n.source.as_str())
                .bind(&n.source_news_id)
                .bind(&n.original_headline)
                .bind(&n.original_content)
                .bind(&n.translated_headline)
                .bind(&n.translated_content)
                .bind(&n.tickers)
                .bind(&n.topics)
                .bind(&n.keywords)
                .bind(&n.provider)
                .bind(n.published_at)
                .bind(&n.model_name)
                .bind(n.source_created_at)
                .bind(n.source_updated_at)
                .execute(&mut *tx)
                .await?;
            affected += res.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(source = %kind))]
    async fn get_watermark(&self, kind: SourceKind) -> Result<Option<Watermark>, StoreError> {
        let row = sqlx::query(GET_WATERMARK)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let last_synced_at: Option<DateTime<Utc>> = row.try_get("last_synced_at")?;
        let Some(updated_at) = last_synced_at else {
            return Ok(None);
        };
        Ok(Some(Watermark {
            source: kind,
            cursor: Cursor::new(updated_at, row.try_get::<String, _>("last_source_id")?),
            last_sync_count: row.try_get("last_sync_count")?,
            last_success_at: row.try_get("updated_at")?,
        }))
    }

    #[tracing::instrument(level = "debug", skip(self, cursor), fields(source = %kind))]
    async fn advance_watermark(
        &self,
        kind: SourceKind,
        cursor: &Cursor,
        count: u64,
    ) -> Result<(), StoreError> {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        sqlx::query(ADVANCE_WATERMARK)
            .bind(kind.as_str())
            .bind(cursor.updated_at)
            .bind(&cursor.native_id)
            .bind(count)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NewsQuery for PgTargetStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_news(&self, filter: &NewsFilter) -> Result<(Vec<NewsListItem>, u64), StoreError> {
        let mut count_q = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM gold.translated_news");
        push_filters(&mut count_q, filter);
        let total: i64 = count_q.build_query_scalar().fetch_one(&self.pool).await?;

        let mut data_q = QueryBuilder::<Postgres>::new(GOLD_COLUMNS);
        push_filters(&mut data_q, filter);
        data_q
            .push(" ORDER BY published_at DESC, source_news_id DESC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));

        let rows: Vec<GoldRow> = data_q.build_query_as().fetch_all(&self.pool).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let rec = CanonicalRecord::try_from(row)?;
            items.push(NewsListItem::from(&rec));
        }
        Ok((items, u64::try_from(total).unwrap_or_default()))
    }

    #[tracing::instrument(level = "debug", skip(self), fields(source = %kind))]
    async fn get_news(
        &self,
        kind: SourceKind,
        native_id: &str,
    ) -> Result<Option<NewsDetail>, StoreError> {
        let sql = format!("{GOLD_COLUMNS} WHERE source = $1 AND source_news_id = $2");
        let row: Option<GoldRow> = sqlx::query_as(&sql)
            .bind(kind.as_str())
            .bind(native_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| CanonicalRecord::try_from(r).map(NewsDetail::from))
            .transpose()
    }
}
