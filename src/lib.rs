// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod scheduler;
pub mod source;
pub mod sync;
pub mod target;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::error::{Stage, StoreError, SyncError};
pub use crate::scheduler::{Scheduler, SchedulerCfg};
pub use crate::sync::{PassReport, SourceReport, SyncEngine};
