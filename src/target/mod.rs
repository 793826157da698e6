// src/target/mod.rs
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{CanonicalRecord, Cursor, NewsDetail, NewsFilter, NewsListItem, SourceKind, Watermark};

/// Write side of the unified gold store.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Insert-or-update keyed by (source, source_news_id), applied as one unit.
    /// Existing rows keep their original `source_created_at`.
    /// Returns the number of rows affected; empty input is a no-op returning 0.
    async fn upsert(&self, records: &[CanonicalRecord]) -> Result<u64, StoreError>;

    /// `None` means the source-kind has never been synced.
    async fn get_watermark(&self, kind: SourceKind) -> Result<Option<Watermark>, StoreError>;

    /// Record progress for `kind`. Never moves an existing watermark backwards.
    async fn advance_watermark(
        &self,
        kind: SourceKind,
        cursor: &Cursor,
        count: u64,
    ) -> Result<(), StoreError>;
}

/// Read side of the gold store used by the HTTP surface.
#[async_trait]
pub trait NewsQuery: Send + Sync {
    /// One page of records, newest first, plus the total matching count.
    async fn list_news(&self, filter: &NewsFilter) -> Result<(Vec<NewsListItem>, u64), StoreError>;

    async fn get_news(
        &self,
        kind: SourceKind,
        native_id: &str,
    ) -> Result<Option<NewsDetail>, StoreError>;
}
