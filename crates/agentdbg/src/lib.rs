//! AgentDbg: local-first agent debugging.
//!
//! Open a run, record what the agent did, and inspect it later:
//!
//! ```no_run
//! use agentdbg::prelude::*;
//! use serde_json::json;
//!
//! let run = traced_run(Some("support-agent"));
//! record_llm_call(LlmCall::new("gpt-4-turbo", "classify this ticket", "billing"));
//! record_tool_call(ToolCall::new("lookup_account", json!({"id": 42})).with_result("found"));
//! run.success();
//! ```
//!
//! Every recording call persists its event before returning; runs live under
//! the configured data root as one directory each, readable by the viewer
//! server and by [`RunStore`] directly.

pub use agentdbg_config::Config;
pub use agentdbg_core::{
    sanitize, CallStatus, Event, EventKind, LlmCall, RunCounts, RunMeta, RunStatus,
    SanitizePolicy, StateSnapshot, TokenUsage, ToolCall, FORMAT_VERSION, REDACTED_MARKER,
    TRUNCATED_MARKER,
};
pub use agentdbg_store::{RunStore, StoreError};
pub use agentdbg_trace::{
    default_fingerprint, record_llm_call, record_state, record_tool_call, set_fingerprint,
    shutdown, trace, trace_with, traced_run, traced_run_with, FingerprintFn, LoopDetector,
    LoopWarning, RunGuard, TraceError,
};

/// Commonly used items for instrumenting an agent.
pub mod prelude {
    pub use crate::{
        record_llm_call, record_state, record_tool_call, trace, traced_run, Config, LlmCall,
        StateSnapshot, ToolCall,
    };
}
