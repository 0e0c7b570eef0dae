//! Core event model and payload sanitization for agentdbg.
//!
//! This crate provides the types shared across the agentdbg workspace:
//!
//! - [`Event`] and [`EventKind`] — one sequenced observation within a run
//! - [`RunMeta`], [`RunStatus`], [`RunCounts`] — the mutable run summary
//! - [`LlmCall`], [`ToolCall`], [`StateSnapshot`] — recording payloads
//! - [`sanitize`] — redaction and truncation applied before persistence

mod events;
mod run;
pub mod sanitize;

pub use events::{CallStatus, Event, EventKind, LlmCall, StateSnapshot, TokenUsage, ToolCall};
pub use run::{RunCounts, RunMeta, RunStatus, FORMAT_VERSION};
pub use sanitize::{
    redact_argv, sanitize, SanitizePolicy, DEFAULT_MAX_FIELD_BYTES, DEFAULT_REDACT_KEYS,
    DEPTH_LIMIT, REDACTED_MARKER, TRUNCATED_MARKER,
};
