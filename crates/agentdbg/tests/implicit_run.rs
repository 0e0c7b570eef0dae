//! Implicit-run behavior: with AGENTDBG_IMPLICIT_RUN enabled, the first
//! recording call creates a run and later calls — from any thread — attach
//! to the same one. Kept in its own test binary because it drives the
//! process-wide environment and the process-wide implicit run slot.

use serde_json::json;

use agentdbg::{record_tool_call, shutdown, EventKind, RunStatus, RunStore, ToolCall};

#[test]
fn test_recording_without_a_run_creates_and_reuses_the_implicit_run() {
    let root = tempfile::tempdir().unwrap();
    std::env::set_var("AGENTDBG_DATA_DIR", root.path());
    std::env::set_var("AGENTDBG_IMPLICIT_RUN", "1");

    let first = record_tool_call(ToolCall::new("no_trace_tool", json!({"x": 1}))).unwrap();

    // An unrelated later call, from a different thread, attaches to the
    // same implicit run.
    let run_id = first.run_id.clone();
    let handle = std::thread::spawn(move || {
        let second = record_tool_call(ToolCall::new("no_trace_tool", json!({"x": 2}))).unwrap();
        assert_eq!(second.run_id, run_id);
    });
    handle.join().unwrap();

    shutdown();

    let store = RunStore::new(root.path());
    let runs = store.list_runs(10).unwrap();
    assert_eq!(runs.len(), 1, "expected exactly one implicit run");
    let meta = &runs[0];
    assert_eq!(meta.run_name, "implicit");
    assert_eq!(meta.status, RunStatus::Ok);
    assert_eq!(meta.counts.tool_calls, 2);

    let events = store.load_events(&meta.run_id).unwrap();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![EventKind::RunStart, EventKind::ToolCall, EventKind::ToolCall, EventKind::RunEnd]
    );

    std::env::remove_var("AGENTDBG_DATA_DIR");
    std::env::remove_var("AGENTDBG_IMPLICIT_RUN");
}
