// src/sync.rs
//! Watermark-driven silver → gold sync.
//!
//! Per source-kind: load watermark, then read → normalize → upsert → move the
//! cursor, until a batch comes back shorter than the batch size. The engine has
//! no internal exclusion; the scheduler guarantees one pass at a time.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Stage, StoreError, SyncError};
use crate::model::{Cursor, SourceKind};
use crate::normalize::normalize_batch;
use crate::source::SourceReader;
use crate::target::TargetWriter;

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Time a watermark write may still take after cancellation. Kept below the
/// scheduler's post-abort wait.
pub const CANCELLED_PERSIST_GRACE: Duration = Duration::from_millis(500);

/// Outcome of one successful source-kind run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: SourceKind,
    /// Rows affected in gold.
    pub records: u64,
    pub batches: usize,
    pub watermark: Option<Cursor>,
    /// False when the upserts landed but the watermark write did not.
    pub watermark_persisted: bool,
}

#[derive(Debug)]
pub struct SourceOutcome {
    pub source: SourceKind,
    pub result: Result<SourceReport, SyncError>,
}

/// Result of syncing every registered source-kind once.
#[derive(Debug, Default)]
pub struct PassReport {
    pub outcomes: Vec<SourceOutcome>,
    pub duration: Duration,
}

impl PassReport {
    pub fn total_records(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|r| r.records)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Progress made inside one run, kept even when the run aborts.
#[derive(Debug, Default)]
struct Progress {
    cursor: Option<Cursor>,
    records: u64,
    batches: usize,
}

pub struct SyncEngine {
    reader: Arc<dyn SourceReader>,
    writer: Arc<dyn TargetWriter>,
    sources: Vec<SourceKind>,
    batch_size: usize,
}

impl SyncEngine {
    pub fn new(reader: Arc<dyn SourceReader>, writer: Arc<dyn TargetWriter>) -> Self {
        Self {
            reader,
            writer,
            sources: SourceKind::ALL.to_vec(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Zero is treated as 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceKind>) -> Self {
        self.sources = sources;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn sources(&self) -> &[SourceKind] {
        &self.sources
    }

    /// Sync every registered source-kind. A failing source-kind is reported and
    /// does not stop the others.
    #[tracing::instrument(level = "info", name = "sync.pass", skip_all)]
    pub async fn sync_all(&self, cancel: &CancellationToken) -> PassReport {
        let t0 = Instant::now();
        tracing::info!(
            reader = self.reader.name(),
            sources = self.sources.len(),
            "starting sync pass"
        );

        let mut outcomes = Vec::with_capacity(self.sources.len());
        for &kind in &self.sources {
            let result = self.sync_source(kind, cancel).await;
            match &result {
                Ok(r) => tracing::info!(
                    source = %kind,
                    records = r.records,
                    batches = r.batches,
                    watermark_persisted = r.watermark_persisted,
                    "source synced"
                ),
                Err(e) => tracing::error!(source = %kind, error = %e, "source sync failed"),
            }
            outcomes.push(SourceOutcome {
                source: kind,
                result,
            });
        }

        let report = PassReport {
            outcomes,
            duration: t0.elapsed(),
        };
        histogram!("sync_pass_duration_ms").record(report.duration.as_secs_f64() * 1_000.0);
        gauge!("sync_pass_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        tracing::info!(
            duration_ms = report.duration.as_millis() as u64,
            records = report.total_records(),
            failed = report.failures().count(),
            "sync pass completed"
        );
        report
    }

    /// Drain all pending records for one source-kind.
    #[tracing::instrument(level = "info", name = "sync.source", skip(self, cancel), fields(source = %kind))]
    pub async fn sync_source(
        &self,
        kind: SourceKind,
        cancel: &CancellationToken,
    ) -> Result<SourceReport, SyncError> {
        let start = guard(cancel, kind, Stage::LoadWatermark, self.writer.get_watermark(kind))
            .await
            .map_err(|e| read_err(kind, Stage::LoadWatermark, e))?;

        let mut progress = Progress {
            cursor: start.map(|w| w.cursor),
            ..Progress::default()
        };

        let drained = self.drain(kind, &mut progress, cancel).await;

        // Batches that landed before a failure still get their watermark, so the
        // next run resumes after them instead of re-reading them.
        let watermark_persisted = if progress.records > 0 {
            self.persist_watermark(kind, &progress, cancel).await
        } else {
            true
        };

        if let Err(e) = drained {
            counter!(
                "sync_failures_total",
                "source" => kind.as_str(),
                "stage" => e.stage().map(|s| s.as_str()).unwrap_or("unknown")
            )
            .increment(1);
            return Err(e);
        }

        Ok(SourceReport {
            source: kind,
            records: progress.records,
            batches: progress.batches,
            watermark: progress.cursor,
            watermark_persisted,
        })
    }

    async fn drain(
        &self,
        kind: SourceKind,
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        loop {
            let batch = guard(
                cancel,
                kind,
                Stage::Fetch,
                self.reader
                    .fetch_since(kind, progress.cursor.as_ref(), self.batch_size),
            )
            .await
            .map_err(|e| read_err(kind, Stage::Fetch, e))?;

            let Some(last) = batch.last() else {
                break;
            };
            let next_cursor = last.cursor();
            let fetched = batch.len();
            counter!("sync_batches_total", "source" => kind.as_str()).increment(1);
            tracing::debug!(source = %kind, count = fetched, "fetched batch");

            let canonical = normalize_batch(&batch);
            let affected = guard(cancel, kind, Stage::Upsert, self.writer.upsert(&canonical))
                .await
                .map_err(|e| match e {
                    GuardError::Cancelled(e) => e,
                    GuardError::Store(source) => SyncError::Write { kind, source },
                })?;

            counter!("sync_records_total", "source" => kind.as_str()).increment(affected);
            progress.records += affected;
            progress.batches += 1;
            progress.cursor = Some(next_cursor);

            if fetched < self.batch_size {
                break;
            }
        }
        Ok(())
    }

    /// Tolerated failure: logged, the next run re-processes the batch.
    async fn persist_watermark(
        &self,
        kind: SourceKind,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> bool {
        let Some(cursor) = progress.cursor.as_ref() else {
            return true;
        };
        let write = self.writer.advance_watermark(kind, cursor, progress.records);

        match persist_bounded(cancel, write).await {
            Ok(()) => {
                gauge!("sync_watermark_ts", "source" => kind.as_str())
                    .set(cursor.updated_at.timestamp() as f64);
                true
            }
            Err(source) => {
                let err = SyncError::WatermarkPersist { kind, source };
                counter!("sync_watermark_persist_failures_total", "source" => kind.as_str())
                    .increment(1);
                tracing::warn!(source = %kind, error = %err, "failed to update sync metadata");
                false
            }
        }
    }
}

enum GuardError {
    Cancelled(SyncError),
    Store(StoreError),
}

/// Race a store call against the cancellation token.
async fn guard<T>(
    cancel: &CancellationToken,
    kind: SourceKind,
    stage: Stage,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, GuardError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GuardError::Cancelled(SyncError::Cancelled { kind, stage })),
        res = fut => res.map_err(GuardError::Store),
    }
}

/// Run a watermark write to completion. Once `cancel` fires the write gets
/// at most [`CANCELLED_PERSIST_GRACE`] more before it is abandoned.
async fn persist_bounded(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<(), StoreError>>,
) -> Result<(), StoreError> {
    tokio::pin!(fut);
    tokio::select! {
        biased;
        res = &mut fut => return res,
        _ = cancel.cancelled() => {}
    }
    tokio::time::timeout(CANCELLED_PERSIST_GRACE, fut)
        .await
        .map_err(|_| StoreError::message("watermark write abandoned after cancellation"))?
}

fn read_err(kind: SourceKind, stage: Stage, e: GuardError) -> SyncError {
    match e {
        GuardError::Cancelled(e) => e,
        GuardError::Store(source) => SyncError::Read {
            kind,
            stage,
            source,
        },
    }
}
