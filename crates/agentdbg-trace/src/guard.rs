//! Run lifecycle surface: scoped guards and the closure wrapper.
//!
//! The pipeline observes faults, it never handles them: a fault raised by
//! instrumented code is recorded as an `error` event and then reaches the
//! original caller unchanged. Internal trace failures go the other way —
//! they degrade to warnings and never alter the instrumented program's
//! control flow.

use std::backtrace::Backtrace;

use serde_json::{json, Value};
use thiserror::Error;

use agentdbg_config::Config;
use agentdbg_core::{EventKind, RunMeta, RunStatus};
use agentdbg_store::StoreError;

use crate::registry;

/// Errors surfaced by explicit lifecycle calls.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Scoped handle for one entry into the lifecycle controller.
///
/// Dropping the guard closes the entry; only the outermost guard finalizes
/// the run — `ok` on a normal exit, `error` when the thread is panicking
/// (an `error` event is recorded first and the panic continues unchanged).
#[must_use = "the run stays open until the guard is dropped or finished"]
pub struct RunGuard {
    active: bool,
    done: bool,
}

/// Opens a run (or joins the active one) on the current thread.
pub fn traced_run(name: Option<&str>) -> RunGuard {
    RunGuard::start(name, None)
}

/// Like [`traced_run`], with an explicit configuration instead of the
/// environment-resolved one.
pub fn traced_run_with(config: &Config, name: Option<&str>) -> RunGuard {
    RunGuard::start(name, Some(config))
}

/// Runs `f` inside a run. On `Err`, records an `error` event (error type,
/// message, captured backtrace), finalizes the run as `error`, and returns
/// the original error unchanged.
pub fn trace<T, E, F>(name: Option<&str>, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    trace_with(&Config::load(), name, f)
}

/// Like [`trace`], with an explicit configuration.
pub fn trace_with<T, E, F>(config: &Config, name: Option<&str>, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: std::fmt::Display,
{
    let guard = traced_run_with(config, name);
    match f() {
        Ok(value) => {
            guard.success();
            Ok(value)
        }
        Err(err) => {
            guard.fail(&err);
            Err(err)
        }
    }
}

impl RunGuard {
    fn start(name: Option<&str>, config: Option<&Config>) -> Self {
        match registry::enter(name, config) {
            Ok(_) => Self { active: true, done: false },
            Err(e) => {
                tracing::warn!("failed to start traced run: {}", e);
                Self { active: false, done: true }
            }
        }
    }

    /// Identifier of the run this guard belongs to.
    pub fn run_id(&self) -> Option<String> {
        if !self.active {
            return None;
        }
        registry::resolve_run_id()
    }

    /// Closes this entry with status `ok`, surfacing any storage fault that
    /// was deferred during recording. Returns the finalized summary when
    /// this was the outermost entry.
    pub fn finish(mut self) -> Result<Option<RunMeta>, TraceError> {
        self.done = true;
        if !self.active {
            return Ok(None);
        }
        Ok(registry::exit(RunStatus::Ok)?)
    }

    /// Closes this entry with status `ok`, logging instead of returning any
    /// deferred storage fault.
    pub fn success(mut self) {
        self.done = true;
        if !self.active {
            return;
        }
        if let Err(e) = registry::exit(RunStatus::Ok) {
            tracing::warn!("failed to finalize run: {}", e);
        }
    }

    /// Records the fault as an `error` event and closes this entry with
    /// status `error`. The caller keeps and re-raises the fault itself.
    pub fn fail<E: std::fmt::Display>(mut self, err: &E) {
        self.done = true;
        if !self.active {
            return;
        }
        record_fault(std::any::type_name::<E>(), &err.to_string());
        if let Err(e) = registry::exit(RunStatus::Error) {
            tracing::warn!("failed to finalize run: {}", e);
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        if !self.active {
            return;
        }
        let status = if std::thread::panicking() {
            record_fault("panic", "panic during traced run");
            RunStatus::Error
        } else {
            RunStatus::Ok
        };
        if let Err(e) = registry::exit(status) {
            tracing::warn!("failed to finalize run: {}", e);
        }
    }
}

fn record_fault(error_type: &str, message: &str) {
    let Some(handle) = registry::resolve_active() else {
        return;
    };
    handle.record(
        EventKind::Error,
        json!({
            "error_type": error_type,
            "message": message,
            "stack": Backtrace::force_capture().to_string(),
        }),
        None,
        Value::Null,
    );
}
