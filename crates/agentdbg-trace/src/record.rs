//! Recording API for instrumented code.
//!
//! Every recorder resolves the active run, sanitizes its payload, assigns
//! the next sequence number, appends the event, and feeds it to the loop
//! detector — synchronously, before returning. With no active run (and
//! implicit mode off) recorders return `None` without effect; silence is
//! the contract, recording never raises into instrumented code.

use serde_json::Value;

use agentdbg_core::{Event, EventKind, LlmCall, StateSnapshot, ToolCall};

use crate::registry;

/// Records a call to an external model. Returns the persisted event, or
/// `None` when no run is active or the append failed.
pub fn record_llm_call(call: LlmCall) -> Option<Event> {
    let handle = registry::resolve_active()?;
    let payload = serde_json::to_value(&call)
        .unwrap_or_else(|_| Value::String(format!("{call:?}")));
    let LlmCall { status, meta, .. } = call;
    handle.record(EventKind::LlmCall, payload, Some(status), meta)
}

/// Records a call to a tool. Returns the persisted event, or `None` when no
/// run is active or the append failed.
pub fn record_tool_call(call: ToolCall) -> Option<Event> {
    let handle = registry::resolve_active()?;
    let payload = serde_json::to_value(&call)
        .unwrap_or_else(|_| Value::String(format!("{call:?}")));
    let ToolCall { status, meta, .. } = call;
    handle.record(EventKind::ToolCall, payload, Some(status), meta)
}

/// Records a snapshot of agent state. Returns the persisted event, or `None`
/// when no run is active or the append failed.
pub fn record_state(snapshot: StateSnapshot) -> Option<Event> {
    let handle = registry::resolve_active()?;
    let payload = serde_json::to_value(&snapshot)
        .unwrap_or_else(|_| Value::String(format!("{snapshot:?}")));
    let StateSnapshot { meta, .. } = snapshot;
    handle.record(EventKind::State, payload, None, meta)
}
