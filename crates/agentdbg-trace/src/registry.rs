//! Active-run tracking and the sanitize → sequence → append → detect chain.
//!
//! The active run is a thread-local slot with a nesting depth counter, never
//! a shared global: independent threads each trace their own run, while
//! recording calls that resolve to the same run serialize on that run's
//! mutex so sequence numbers stay a total order.

use std::cell::RefCell;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use agentdbg_config::Config;
use agentdbg_core::{
    redact_argv, sanitize, CallStatus, Event, EventKind, RunMeta, RunStatus, SanitizePolicy,
};
use agentdbg_store::{RunLog, RunStore, StoreError};

use crate::loop_detect::LoopDetector;

/// Display name given to lazily created runs.
pub(crate) const IMPLICIT_RUN_NAME: &str = "implicit";

pub(crate) struct RunInner {
    meta: RunMeta,
    next_seq: u64,
    log: RunLog,
    store: RunStore,
    policy: SanitizePolicy,
    detector: LoopDetector,
    finalized: bool,
    storage_error: Option<StoreError>,
}

impl RunInner {
    fn record_locked(
        &mut self,
        kind: EventKind,
        payload: Value,
        status: Option<CallStatus>,
        meta: Value,
    ) -> Option<Event> {
        if self.finalized {
            return None;
        }

        let payload = sanitize(&payload, &self.policy);
        let meta = if meta.is_null() { meta } else { sanitize(&meta, &self.policy) };
        let seq = self.next_seq;
        let event = Event {
            seq,
            run_id: self.meta.run_id.clone(),
            ts_ms: now_ms(),
            event_type: kind,
            status,
            payload,
            meta,
        };

        if let Err(e) = self.log.append(&event) {
            tracing::warn!("failed to append event: {}", e);
            if self.storage_error.is_none() {
                self.storage_error = Some(e);
            }
            return None;
        }
        self.next_seq += 1;

        match kind {
            EventKind::LlmCall => self.meta.counts.llm_calls += 1,
            EventKind::ToolCall => self.meta.counts.tool_calls += 1,
            EventKind::Error => self.meta.counts.errors += 1,
            EventKind::LoopWarning => self.meta.counts.loop_warnings += 1,
            _ => {}
        }

        if kind.is_call() {
            if let Some(warning) = self.detector.observe(&event) {
                let payload = serde_json::to_value(&warning).unwrap_or(Value::Null);
                self.record_locked(EventKind::LoopWarning, payload, None, Value::Null);
            }
        }

        Some(event)
    }

    /// Writes the terminal event and overwrites the summary. Idempotent: a
    /// second call is a no-op.
    fn finalize_locked(&mut self, status: RunStatus) -> Result<(), StoreError> {
        if self.finalized {
            return Ok(());
        }
        self.record_locked(EventKind::RunEnd, json!({ "status": status.as_str() }), None, Value::Null);
        self.finalized = true;
        self.meta.status = status;
        self.meta.ended_at_ms = Some(now_ms());
        if let Some(e) = self.storage_error.take() {
            self.store.finalize_run(&self.meta)?;
            return Err(e);
        }
        self.store.finalize_run(&self.meta)
    }
}

/// Shared handle to one run's state.
#[derive(Clone)]
pub struct RunHandle {
    inner: Arc<Mutex<RunInner>>,
}

impl RunHandle {
    pub fn run_id(&self) -> String {
        match self.inner.lock() {
            Ok(inner) => inner.meta.run_id.clone(),
            Err(_) => String::new(),
        }
    }

    pub fn meta(&self) -> Option<RunMeta> {
        self.inner.lock().ok().map(|inner| inner.meta.clone())
    }

    /// Runs the sanitize → sequence → append → detect chain for one event.
    /// Never fails: internal faults degrade to a warning plus a deferred
    /// storage error on the handle.
    pub(crate) fn record(
        &self,
        kind: EventKind,
        payload: Value,
        status: Option<CallStatus>,
        meta: Value,
    ) -> Option<Event> {
        let Ok(mut inner) = self.inner.lock() else {
            tracing::warn!("run state lock poisoned; dropping event");
            return None;
        };
        inner.record_locked(kind, payload, status, meta)
    }

    pub(crate) fn finalize(&self, status: RunStatus) -> Result<Option<RunMeta>, StoreError> {
        let Ok(mut inner) = self.inner.lock() else {
            tracing::warn!("run state lock poisoned; run left unfinalized");
            return Ok(None);
        };
        inner.finalize_locked(status)?;
        Ok(Some(inner.meta.clone()))
    }

}

struct ActiveRun {
    handle: RunHandle,
    depth: usize,
}

thread_local! {
    static ACTIVE: RefCell<Option<ActiveRun>> = const { RefCell::new(None) };
}

static IMPLICIT: OnceLock<Mutex<Option<RunHandle>>> = OnceLock::new();

fn implicit_slot() -> &'static Mutex<Option<RunHandle>> {
    IMPLICIT.get_or_init(|| Mutex::new(None))
}

/// Opens a run (or joins the active one) on the current thread. Nested
/// entries increment the depth counter and reuse the existing run without a
/// second run or `run_start` event.
pub(crate) fn enter(
    explicit_name: Option<&str>,
    config: Option<&Config>,
) -> Result<RunHandle, StoreError> {
    let existing = ACTIVE.with(|slot| {
        let mut slot = slot.borrow_mut();
        slot.as_mut().map(|active| {
            active.depth += 1;
            active.handle.clone()
        })
    });
    if let Some(handle) = existing {
        return Ok(handle);
    }

    let loaded;
    let config = match config {
        Some(config) => config,
        None => {
            loaded = Config::load();
            &loaded
        }
    };
    let handle = open_run(config, explicit_name)?;
    ACTIVE.with(|slot| {
        *slot.borrow_mut() = Some(ActiveRun { handle: handle.clone(), depth: 0 });
    });
    Ok(handle)
}

/// Leaves the innermost entry. Only the outermost exit finalizes the run and
/// returns its summary.
pub(crate) fn exit(outcome: RunStatus) -> Result<Option<RunMeta>, StoreError> {
    let finished = ACTIVE.with(|slot| {
        let mut slot = slot.borrow_mut();
        let depth = slot.as_ref().map(|active| active.depth);
        match depth {
            None => None,
            Some(depth) if depth > 0 => {
                if let Some(active) = slot.as_mut() {
                    active.depth -= 1;
                }
                None
            }
            Some(_) => slot.take().map(|active| active.handle),
        }
    });
    match finished {
        Some(handle) => handle.finalize(outcome),
        None => Ok(None),
    }
}

/// Identifier of the thread's active run, if any.
pub(crate) fn resolve_run_id() -> Option<String> {
    ACTIVE.with(|slot| slot.borrow().as_ref().map(|active| active.handle.run_id()))
}

/// Resolves the run a recording call belongs to: the thread's active run
/// first, then the process-wide implicit run (created lazily when enabled).
/// `None` means recording is a no-op.
pub(crate) fn resolve_active() -> Option<RunHandle> {
    let local = ACTIVE.with(|slot| slot.borrow().as_ref().map(|active| active.handle.clone()));
    if local.is_some() {
        return local;
    }

    let Ok(mut guard) = implicit_slot().lock() else {
        return None;
    };
    if let Some(handle) = guard.as_ref() {
        return Some(handle.clone());
    }
    let config = Config::load();
    if !config.implicit_run {
        return None;
    }
    match open_run(&config, Some(IMPLICIT_RUN_NAME)) {
        Ok(handle) => {
            *guard = Some(handle.clone());
            Some(handle)
        }
        Err(e) => {
            tracing::warn!("failed to open implicit run: {}", e);
            None
        }
    }
}

/// Finalizes the still-open implicit run, if any. Call once at process
/// shutdown; a process killed abruptly leaves the summary `running`, which
/// readers tolerate.
pub fn shutdown() {
    let Some(slot) = IMPLICIT.get() else {
        return;
    };
    let handle = {
        let Ok(mut guard) = slot.lock() else {
            return;
        };
        guard.take()
    };
    if let Some(handle) = handle {
        if let Err(e) = handle.finalize(RunStatus::Ok) {
            tracing::warn!("failed to finalize implicit run: {}", e);
        }
    }
}

fn open_run(config: &Config, explicit_name: Option<&str>) -> Result<RunHandle, StoreError> {
    let now = OffsetDateTime::now_utc();
    let run_id = new_run_id(&now);
    let run_name = config
        .run_name
        .clone()
        .or_else(|| explicit_name.map(str::to_string))
        .unwrap_or_else(|| default_run_name(&run_id));
    let meta = RunMeta::new(run_id, run_name, now_ms());

    let store = RunStore::new(&config.data_dir);
    let log = store.open_run(&meta)?;
    let policy = config.sanitize_policy();
    let detector = LoopDetector::new(config.loop_window, config.loop_repetitions)
        .with_fingerprint(crate::loop_detect::configured_fingerprint());

    let run_name = meta.run_name.clone();
    let handle = RunHandle {
        inner: Arc::new(Mutex::new(RunInner {
            meta,
            next_seq: 0,
            log,
            store,
            policy: policy.clone(),
            detector,
            finalized: false,
            storage_error: None,
        })),
    };

    let argv: Vec<String> = std::env::args().collect();
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    handle.record(
        EventKind::RunStart,
        json!({
            "run_name": run_name,
            "argv": redact_argv(&argv, &policy),
            "cwd": cwd,
        }),
        None,
        Value::Null,
    );
    Ok(handle)
}

/// Run ids are `<rfc3339-sanitized>_<uuid8>`: lexical order is creation
/// order, and the id is safe as a directory name.
fn new_run_id(now: &OffsetDateTime) -> String {
    let stamp = now
        .format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    let entropy = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}", sanitize_timestamp(&stamp), &entropy[..8])
}

fn sanitize_timestamp(stamp: &str) -> String {
    stamp
        .chars()
        .map(|c| match c {
            ':' | '/' | '\\' | ' ' | '+' => '-',
            _ => c,
        })
        .collect()
}

fn default_run_name(run_id: &str) -> String {
    format!("run-{run_id}")
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
