// src/error.rs
use std::fmt;

use crate::model::SourceKind;

/// Failure raised by a storage adapter (silver reader, gold writer).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("{0}")]
    Message(String),
}

impl StoreError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// Where in a source-kind run a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LoadWatermark,
    Fetch,
    Upsert,
    AdvanceWatermark,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LoadWatermark => "load_watermark",
            Stage::Fetch => "fetch",
            Stage::Upsert => "upsert",
            Stage::AdvanceWatermark => "advance_watermark",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("read failure for {kind} during {stage}: {source}")]
    Read {
        kind: SourceKind,
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("write failure for {kind}: {source}")]
    Write {
        kind: SourceKind,
        #[source]
        source: StoreError,
    },

    #[error("watermark persist failure for {kind}: {source}")]
    WatermarkPersist {
        kind: SourceKind,
        #[source]
        source: StoreError,
    },

    #[error("sync for {kind} cancelled during {stage}")]
    Cancelled { kind: SourceKind, stage: Stage },

    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl SyncError {
    pub fn kind(&self) -> Option<SourceKind> {
        match self {
            SyncError::Read { kind, .. }
            | SyncError::Write { kind, .. }
            | SyncError::WatermarkPersist { kind, .. }
            | SyncError::Cancelled { kind, .. } => Some(*kind),
            SyncError::Configuration(_) => None,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            SyncError::Read { stage, .. } | SyncError::Cancelled { stage, .. } => Some(*stage),
            SyncError::Write { .. } => Some(Stage::Upsert),
            SyncError::WatermarkPersist { .. } => Some(Stage::AdvanceWatermark),
            SyncError::Configuration(_) => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_kind_and_stage() {
        let e = SyncError::Read {
            kind: SourceKind::CnWind,
            stage: Stage::Fetch,
            source: StoreError::message("connection refused"),
        };
        assert_eq!(e.kind(), Some(SourceKind::CnWind));
        assert_eq!(e.stage(), Some(Stage::Fetch));
        assert_eq!(
            e.to_string(),
            "read failure for cn_wind during fetch: connection refused"
        );

        let w = SyncError::Write {
            kind: SourceKind::JpMinkabu,
            source: StoreError::message("unique violation"),
        };
        assert_eq!(w.stage(), Some(Stage::Upsert));
        assert!(SyncError::Configuration("x".into()).kind().is_none());
    }
}
