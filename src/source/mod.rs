// src/source/mod.rs
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Cursor, SourceKind, SourceRecord};

/// Read side of the silver tables.
///
/// `fetch_since` returns at most `limit` records strictly after `cursor` in
/// `(updated_at, native_id)` order, oldest first. With no cursor it returns the
/// oldest records. A failed read returns nothing (never a partial batch).
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn fetch_since(
        &self,
        kind: SourceKind,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, StoreError>;

    fn name(&self) -> &'static str;
}
