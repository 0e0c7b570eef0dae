//! Append-only, crash-safe run storage.
//!
//! Each run owns one directory under the data root holding `run.json` (the
//! mutable summary, overwritten atomically) and `events.jsonl` (the
//! append-only event log, one JSON object per line, flushed per append).

mod error;
mod store;

pub use error::StoreError;
pub use store::{validate_run_id, RunLog, RunStore, EVENT_LOG_FILE, RUN_META_FILE};
