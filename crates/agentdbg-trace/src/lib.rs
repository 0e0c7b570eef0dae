//! Run lifecycle, recording API, and loop detection for agentdbg.
//!
//! Instrumented code opens a run with [`traced_run`] (scoped guard) or
//! [`trace`] (closure wrapper), then calls [`record_llm_call`],
//! [`record_tool_call`], and [`record_state`] anywhere below it on the same
//! thread. Each recording call blocks until its event is sanitized,
//! sequenced, appended, and loop-checked, so a crash immediately afterwards
//! never loses it.

mod guard;
mod loop_detect;
mod record;
mod registry;

pub use guard::{trace, trace_with, traced_run, traced_run_with, RunGuard, TraceError};
pub use loop_detect::{
    default_fingerprint, set_fingerprint, FingerprintFn, LoopDetector, LoopWarning,
};
pub use record::{record_llm_call, record_state, record_tool_call};
pub use registry::{shutdown, RunHandle};
