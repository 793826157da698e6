// src/source/memory.rs
//! In-process silver tables for tests and local dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Cursor, SourceKind, SourceRecord};
use crate::source::SourceReader;

#[derive(Default)]
pub struct MemorySource {
    records: Mutex<Vec<SourceRecord>>,
    fail_reads: AtomicUsize,
    read_delay: Mutex<Option<Duration>>,
    pub fetch_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SourceRecord>) -> Self {
        let s = Self::new();
        s.extend(records);
        s
    }

    pub fn extend(&self, records: Vec<SourceRecord>) {
        self.records.lock().expect("memory source mutex poisoned").extend(records);
    }

    /// Replace a record with the same (kind, native id), or append it.
    pub fn put(&self, record: SourceRecord) {
        let mut v = self.records.lock().expect("memory source mutex poisoned");
        match v
            .iter_mut()
            .find(|r| r.kind() == record.kind() && r.native_id() == record.native_id())
        {
            Some(slot) => *slot = record,
            None => v.push(record),
        }
    }

    /// Make the next `n` reads fail.
    pub fn fail_next_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    /// Sleep before answering each read.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock().expect("memory source mutex poisoned") = delay;
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn fetch_since(
        &self,
        kind: SourceKind,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.read_delay.lock().expect("memory source mutex poisoned");
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let failing = self
            .fail_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::message(format!("{kind} source unreachable")));
        }

        let mut out: Vec<SourceRecord> = self
            .records
            .lock()
            .expect("memory source mutex poisoned")
            .iter()
            .filter(|r| r.kind() == kind)
            .filter(|r| cursor.map_or(true, |c| r.cursor() > *c))
            .cloned()
            .collect();
        out.sort_by_key(SourceRecord::cursor);
        out.truncate(limit);
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "memory-silver"
    }
}
