//! Run summary types.

use serde::{Deserialize, Serialize};

/// Version of the run summary and event formats.
pub const FORMAT_VERSION: u32 = 1;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run is still in progress (or the process died before finalizing).
    Running,
    /// Run completed successfully.
    Ok,
    /// Run ended with an error.
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "running" => RunStatus::Running,
            "ok" => RunStatus::Ok,
            _ => RunStatus::Error,
        }
    }
}

/// Per-kind event counters for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    #[serde(default)]
    pub llm_calls: u64,
    #[serde(default)]
    pub tool_calls: u64,
    #[serde(default)]
    pub errors: u64,
    #[serde(default)]
    pub loop_warnings: u64,
}

/// Mutable summary record for a run, overwritten atomically on finalize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    /// Summary format version.
    pub version: u32,
    /// Unique, time-sortable run identifier.
    pub run_id: String,
    /// Display name.
    pub run_name: String,
    /// Unix timestamp (milliseconds) when the run started.
    pub started_at_ms: i64,
    /// Unix timestamp (milliseconds) when the run finalized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<i64>,
    /// Run status.
    pub status: RunStatus,
    /// Per-kind event counters.
    #[serde(default)]
    pub counts: RunCounts,
}

impl RunMeta {
    /// Creates a summary for a freshly started run.
    pub fn new(run_id: impl Into<String>, run_name: impl Into<String>, started_at_ms: i64) -> Self {
        Self {
            version: FORMAT_VERSION,
            run_id: run_id.into(),
            run_name: run_name.into(),
            started_at_ms,
            ended_at_ms: None,
            status: RunStatus::Running,
            counts: RunCounts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_running_with_zero_counts() {
        let meta = RunMeta::new("run-1", "demo", 1700000000000);
        assert_eq!(meta.status, RunStatus::Running);
        assert_eq!(meta.counts, RunCounts::default());
        assert!(meta.ended_at_ms.is_none());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [RunStatus::Running, RunStatus::Ok, RunStatus::Error] {
            assert_eq!(RunStatus::from_str(status.as_str()), status);
        }
        assert_eq!(RunStatus::from_str("bogus"), RunStatus::Error);
    }

    #[test]
    fn test_summary_json_omits_unset_end_time() {
        let meta = RunMeta::new("run-1", "demo", 1700000000000);
        let raw = serde_json::to_string(&meta).unwrap();
        assert!(!raw.contains("ended_at_ms"));
        assert!(raw.contains("\"running\""));
    }
}
