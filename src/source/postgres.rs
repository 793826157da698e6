// src/source/postgres.rs
use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::model::{CnWindRecord, Cursor, JpMinkabuRecord, SourceKind, SourceRecord};
use crate::source::SourceReader;

// Row comparison keeps the (updated_at, id) cursor exact across batch boundaries,
// even when many rows share one updated_at. Ids compare bytewise (`COLLATE "C"`),
// matching `Cursor`'s ordering.
const JP_MINKABU_SINCE: &str = r#"
SELECT id, news_id, original_headline, original_story,
       translated_headline, translated_story,
       COALESCE(providers, '{}') AS providers,
       COALESCE(topics, '{}') AS topics,
       COALESCE(tickers, '{}') AS tickers,
       creation_time, model_name, created_at, updated_at
  FROM silver.jp_minkabu_translated_news
 WHERE $1::timestamptz IS NULL
    OR (updated_at, news_id COLLATE "C") > ($1::timestamptz, $2::text COLLATE "C")
 ORDER BY updated_at ASC, news_id COLLATE "C" ASC
 LIMIT $3
"#;

const CN_WIND_SINCE: &str = r#"
SELECT id, object_id, original_title, original_content,
       translated_title, translated_content, publish_date, source,
       COALESCE(sections, '{}') AS sections,
       COALESCE(wind_codes, '{}') AS wind_codes,
       keywords, model_name, created_at, updated_at
  FROM silver.cn_wind_translated_news
 WHERE $1::timestamptz IS NULL
    OR (updated_at, object_id COLLATE "C") > ($1::timestamptz, $2::text COLLATE "C")
 ORDER BY updated_at ASC, object_id COLLATE "C" ASC
 LIMIT $3
"#;

/// Reads the upstream silver tables through a read-only pool.
#[derive(Clone)]
pub struct PgSourceReader {
    pool: PgPool,
}

impl PgSourceReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceReader for PgSourceReader {
    #[tracing::instrument(level = "debug", skip(self, cursor), fields(source = %kind))]
    async fn fetch_since(
        &self,
        kind: SourceKind,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, StoreError> {
        let limit = i64::try_from(limit).map_err(|_| StoreError::message("limit too large"))?;
        let since = cursor.map(|c| c.updated_at);
        let since_id = cursor.map(|c| c.native_id.as_str());

        let out = match kind {
            SourceKind::JpMinkabu => sqlx::query_as::<_, JpMinkabuRecord>(JP_MINKABU_SINCE)
                .bind(since)
                .bind(since_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(SourceRecord::JpMinkabu)
                .collect(),
            SourceKind::CnWind => sqlx::query_as::<_, CnWindRecord>(CN_WIND_SINCE)
                .bind(since)
                .bind(since_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(SourceRecord::CnWind)
                .collect(),
        };
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "postgres-silver"
    }
}
