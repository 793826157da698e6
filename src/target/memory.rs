// src/target/memory.rs
//! In-process gold store with failure injection, used by tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StoreError;
use crate::model::{
    CanonicalRecord, Cursor, NewsDetail, NewsFilter, NewsListItem, SourceKind, Watermark,
};
use crate::target::{NewsQuery, TargetWriter};

type Key = (SourceKind, String);

#[derive(Default)]
pub struct MemoryTarget {
    rows: Mutex<HashMap<Key, CanonicalRecord>>,
    watermarks: Mutex<HashMap<SourceKind, Watermark>>,
    /// Upserts after this many successful calls fail.
    fail_upserts_after: Mutex<Option<usize>>,
    fail_watermark: AtomicBool,
    pub upsert_calls: AtomicUsize,
    pub advance_calls: AtomicUsize,
    /// Every record ever passed to a successful upsert, in order.
    pub upsert_log: Mutex<Vec<Key>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the next `n` upserts succeed, then fail every following one.
    pub fn fail_upserts_after(&self, n: Option<usize>) {
        let done = self.upsert_calls.load(Ordering::SeqCst);
        *self.fail_upserts_after.lock().expect("memory target mutex poisoned") = n.map(|n| done + n);
    }

    pub fn fail_watermark_writes(&self, fail: bool) {
        self.fail_watermark.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("memory target mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, kind: SourceKind, native_id: &str) -> Option<CanonicalRecord> {
        self.rows
            .lock()
            .expect("memory target mutex poisoned")
            .get(&(kind, native_id.to_string()))
            .cloned()
    }

    pub fn watermark(&self, kind: SourceKind) -> Option<Watermark> {
        self.watermarks.lock().expect("memory target mutex poisoned").get(&kind).cloned()
    }

    /// Seed a watermark directly, bypassing the monotonic check.
    pub fn set_watermark(&self, wm: Watermark) {
        self.watermarks.lock().expect("memory target mutex poisoned").insert(wm.source, wm);
    }

    /// How many times each key was written.
    pub fn write_counts(&self) -> HashMap<Key, usize> {
        let mut out = HashMap::new();
        for k in self.upsert_log.lock().expect("memory target mutex poisoned").iter() {
            *out.entry(k.clone()).or_insert(0) += 1;
        }
        out
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn upsert(&self, records: &[CanonicalRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let limit = *self.fail_upserts_after.lock().expect("memory target mutex poisoned");
        if limit.is_some_and(|limit| call >= limit) {
            return Err(StoreError::message("gold store unavailable"));
        }

        let now = Utc::now();
        let mut rows = self.rows.lock().expect("memory target mutex poisoned");
        let mut log = self.upsert_log.lock().expect("memory target mutex poisoned");
        for r in records {
            let key = (r.source, r.source_news_id.clone());
            let mut next = r.clone();
            next.synced_at = Some(now);
            if let Some(existing) = rows.get(&key) {
                next.source_created_at = existing.source_created_at;
            }
            rows.insert(key.clone(), next);
            log.push(key);
        }
        Ok(records.len() as u64)
    }

    async fn get_watermark(&self, kind: SourceKind) -> Result<Option<Watermark>, StoreError> {
        Ok(self.watermark(kind))
    }

    async fn advance_watermark(
        &self,
        kind: SourceKind,
        cursor: &Cursor,
        count: u64,
    ) -> Result<(), StoreError> {
        self.advance_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_watermark.load(Ordering::SeqCst) {
            return Err(StoreError::message("sync_metadata write failed"));
        }
        let mut wms = self.watermarks.lock().expect("memory target mutex poisoned");
        if wms.get(&kind).is_some_and(|w| w.cursor > *cursor) {
            return Ok(());
        }
        wms.insert(
            kind,
            Watermark {
                source: kind,
                cursor: cursor.clone(),
                last_sync_count: i64::try_from(count).unwrap_or(i64::MAX),
                last_success_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl NewsQuery for MemoryTarget {
    async fn list_news(&self, filter: &NewsFilter) -> Result<(Vec<NewsListItem>, u64), StoreError> {
        let rows = self.rows.lock().expect("memory target mutex poisoned");
        let mut hits: Vec<&CanonicalRecord> = rows.values().filter(|r| filter.matches(r)).collect();
        hits.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.source_news_id.cmp(&a.source_news_id))
        });
        let total = hits.len() as u64;
        let page = hits
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(filter.limit as usize)
            .map(NewsListItem::from)
            .collect();
        Ok((page, total))
    }

    async fn get_news(
        &self,
        kind: SourceKind,
        native_id: &str,
    ) -> Result<Option<NewsDetail>, StoreError> {
        Ok(self.get(kind, native_id).map(NewsDetail::from))
    }
}
