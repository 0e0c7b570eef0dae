use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use agentdbg_core::{Event, RunMeta};

use crate::error::StoreError;

/// File name of the mutable run summary.
pub const RUN_META_FILE: &str = "run.json";
/// File name of the append-only event log.
pub const EVENT_LOG_FILE: &str = "events.jsonl";

/// Reader/writer for the run directory layout under a data root.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    /// Creates a store rooted at `root`. The root itself is created lazily
    /// when the first run opens.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves the directory for a run id, rejecting ids that could escape
    /// the root.
    pub fn run_dir(&self, run_id: &str) -> Result<PathBuf, StoreError> {
        validate_run_id(run_id)?;
        Ok(self.root.join(run_id))
    }

    /// Creates the run directory eagerly, writes the initial summary, and
    /// opens the event log for appending.
    pub fn open_run(&self, meta: &RunMeta) -> Result<RunLog, StoreError> {
        let dir = self.run_dir(&meta.run_id)?;
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::io("creating run directory", &dir, e))?;
        write_json_atomic(&dir.join(RUN_META_FILE), meta)?;

        let path = dir.join(EVENT_LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::io("opening event log", &path, e))?;
        Ok(RunLog { path, file })
    }

    /// Overwrites the run summary atomically (write-to-temp-then-rename);
    /// readers never observe a partial summary.
    pub fn finalize_run(&self, meta: &RunMeta) -> Result<(), StoreError> {
        let dir = self.run_dir(&meta.run_id)?;
        write_json_atomic(&dir.join(RUN_META_FILE), meta)
    }

    /// Loads the summary for a run.
    pub fn load_run(&self, run_id: &str) -> Result<RunMeta, StoreError> {
        let dir = self.run_dir(run_id)?;
        let path = dir.join(RUN_META_FILE);
        if !path.is_file() {
            return Err(StoreError::RunNotFound {
                run_id: run_id.to_string(),
                root: self.root.clone(),
            });
        }
        let raw = fs::read_to_string(&path)
            .map_err(|e| StoreError::io("reading run summary", &path, e))?;
        serde_json::from_str(&raw).map_err(|e| StoreError::Serialize { path, source: e })
    }

    /// Loads all events for a run in sequence order.
    ///
    /// A trailing partial line (the in-flight write of a crashed process) is
    /// ignored; a malformed line anywhere else is an error.
    pub fn load_events(&self, run_id: &str) -> Result<Vec<Event>, StoreError> {
        let dir = self.run_dir(run_id)?;
        let path = dir.join(EVENT_LOG_FILE);
        if !path.is_file() {
            if !dir.join(RUN_META_FILE).is_file() {
                return Err(StoreError::RunNotFound {
                    run_id: run_id.to_string(),
                    root: self.root.clone(),
                });
            }
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&path)
            .map_err(|e| StoreError::io("reading event log", &path, e))?;
        let last_line = raw
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, _)| i)
            .last();

        let mut events = Vec::new();
        for (i, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(source) => {
                    if Some(i) == last_line {
                        tracing::debug!(
                            "ignoring partial trailing line in {}",
                            path.display()
                        );
                        break;
                    }
                    return Err(StoreError::EventLine { path, line: i + 1, source });
                }
            }
        }
        Ok(events)
    }

    /// Lists run summaries, newest first, up to `limit`. Directories without
    /// a readable summary are skipped with a warning.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunMeta>, StoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root)
            .map_err(|e| StoreError::io("listing data root", &self.root, e))?;

        let mut runs = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| StoreError::io("listing data root", &self.root, e))?;
            let meta_path = entry.path().join(RUN_META_FILE);
            if !meta_path.is_file() {
                continue;
            }
            let parsed = fs::read_to_string(&meta_path)
                .map_err(|e| StoreError::io("reading run summary", &meta_path, e))
                .and_then(|raw| {
                    serde_json::from_str::<RunMeta>(&raw)
                        .map_err(|e| StoreError::Serialize { path: meta_path.clone(), source: e })
                });
            match parsed {
                Ok(meta) => runs.push(meta),
                Err(e) => tracing::warn!("skipping unreadable run summary: {}", e),
            }
        }

        runs.sort_by(|a, b| {
            b.started_at_ms.cmp(&a.started_at_ms).then_with(|| b.run_id.cmp(&a.run_id))
        });
        runs.truncate(limit);
        Ok(runs)
    }
}

/// Append handle for one run's event log.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Appends one event as a single line and flushes before returning, so
    /// a crash after this call cannot lose the event.
    pub fn append(&mut self, event: &Event) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(event)
            .map_err(|e| StoreError::Serialize { path: self.path.clone(), source: e })?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(|e| StoreError::io("appending event", &self.path, e))?;
        self.file.flush().map_err(|e| StoreError::io("flushing event log", &self.path, e))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Validates a run id before it is joined to the data root: non-empty, no
/// path separators, no leading dot, ASCII alphanumerics plus `-`, `_`, `.`.
pub fn validate_run_id(run_id: &str) -> Result<(), StoreError> {
    let valid = !run_id.is_empty()
        && !run_id.starts_with('.')
        && run_id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidRunId { run_id: run_id.to_string() })
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec(value)
        .map_err(|e| StoreError::Serialize { path: path.to_path_buf(), source: e })?;
    fs::write(&tmp, &data).map_err(|e| StoreError::io("writing summary temp file", &tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io("renaming summary into place", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentdbg_core::{EventKind, RunStatus};
    use serde_json::{json, Value};

    fn sample_event(run_id: &str, seq: u64) -> Event {
        Event {
            seq,
            run_id: run_id.to_string(),
            ts_ms: 1700000000000 + seq as i64,
            event_type: EventKind::ToolCall,
            status: None,
            payload: json!({"name": "search", "args": {"query": format!("q{seq}")}}),
            meta: Value::Null,
        }
    }

    #[test]
    fn test_open_append_and_read_back_in_order() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::new(root.path());
        let meta = RunMeta::new("run-1", "demo", 1700000000000);

        let mut log = store.open_run(&meta).unwrap();
        for seq in 0..5 {
            log.append(&sample_event("run-1", seq)).unwrap();
        }

        let events = store.load_events("run-1").unwrap();
        assert_eq!(events.len(), 5);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seq, i as u64);
            assert_eq!(event.payload, sample_event("run-1", i as u64).payload);
        }
    }

    #[test]
    fn test_trailing_partial_line_is_ignored() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::new(root.path());
        let meta = RunMeta::new("run-1", "demo", 1700000000000);

        let mut log = store.open_run(&meta).unwrap();
        log.append(&sample_event("run-1", 0)).unwrap();
        log.append(&sample_event("run-1", 1)).unwrap();

        // Simulate a crash mid-write.
        let log_path = root.path().join("run-1").join(EVENT_LOG_FILE);
        let mut raw = fs::read_to_string(&log_path).unwrap();
        raw.push_str("{\"seq\": 2, \"run_id\": \"run-");
        fs::write(&log_path, raw).unwrap();

        let events = store.load_events("run-1").unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_malformed_middle_line_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::new(root.path());
        let meta = RunMeta::new("run-1", "demo", 1700000000000);

        let mut log = store.open_run(&meta).unwrap();
        log.append(&sample_event("run-1", 0)).unwrap();

        let log_path = root.path().join("run-1").join(EVENT_LOG_FILE);
        let mut raw = fs::read_to_string(&log_path).unwrap();
        raw.push_str("not json\n");
        fs::write(&log_path, raw).unwrap();
        log.append(&sample_event("run-1", 1)).unwrap();

        let err = store.load_events("run-1").unwrap_err();
        assert!(matches!(err, StoreError::EventLine { line: 2, .. }));
    }

    #[test]
    fn test_finalize_overwrites_summary_atomically() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::new(root.path());
        let mut meta = RunMeta::new("run-1", "demo", 1700000000000);
        store.open_run(&meta).unwrap();

        meta.status = RunStatus::Ok;
        meta.ended_at_ms = Some(1700000001000);
        meta.counts.tool_calls = 2;
        store.finalize_run(&meta).unwrap();

        let loaded = store.load_run("run-1").unwrap();
        assert_eq!(loaded.status, RunStatus::Ok);
        assert_eq!(loaded.ended_at_ms, Some(1700000001000));
        assert_eq!(loaded.counts.tool_calls, 2);
        // No temp file left behind.
        assert!(!root.path().join("run-1").join("run.json.tmp").exists());
    }

    #[test]
    fn test_list_runs_newest_first_with_limit() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::new(root.path());
        for (i, id) in ["run-a", "run-b", "run-c"].iter().enumerate() {
            let meta = RunMeta::new(*id, "demo", 1700000000000 + i as i64);
            store.open_run(&meta).unwrap();
        }

        let runs = store.list_runs(2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "run-c");
        assert_eq!(runs[1].run_id, "run-b");
    }

    #[test]
    fn test_in_progress_runs_are_discoverable() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::new(root.path());
        let meta = RunMeta::new("run-1", "demo", 1700000000000);
        store.open_run(&meta).unwrap();

        let runs = store.list_runs(10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Running);
    }

    #[test]
    fn test_missing_run_reported_as_not_found() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::new(root.path());
        assert!(matches!(store.load_run("absent"), Err(StoreError::RunNotFound { .. })));
        assert!(matches!(store.load_events("absent"), Err(StoreError::RunNotFound { .. })));
    }

    #[test]
    fn test_traversal_run_ids_rejected() {
        let root = tempfile::tempdir().unwrap();
        let store = RunStore::new(root.path());
        for bad in ["..", "../other", "a/b", "a\\b", ".hidden", ""] {
            assert!(
                matches!(store.load_run(bad), Err(StoreError::InvalidRunId { .. })),
                "expected '{bad}' to be rejected"
            );
        }
        assert!(validate_run_id("2026-08-07T12-00-00Z_ab12cd34").is_ok());
    }
}
