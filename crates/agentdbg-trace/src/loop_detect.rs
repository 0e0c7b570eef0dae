//! Online detection of repetitive call behavior.
//!
//! The detector watches the stream of call-shaped events for one run and
//! fires a warning when the same call pattern repeats consecutively at least
//! `repetitions` times. One warning per maximal streak: once fired, the
//! streak must break and reform before the detector fires again.

use std::collections::VecDeque;
use std::sync::OnceLock;

use serde::Serialize;
use sha2::{Digest, Sha256};

use agentdbg_core::{Event, EventKind};

/// Derives the pattern identity of an event; `None` excludes the event from
/// loop detection. Installable via [`LoopDetector::with_fingerprint`] when
/// call arguments contain non-deterministic fields (timestamps, request ids)
/// that the default content hash would treat as distinct.
pub type FingerprintFn = fn(&Event) -> Option<String>;

/// Default fingerprint: event kind, identifying name (tool name or model),
/// and a 16-hex-char SHA-256 prefix over the identifying content (tool args
/// or prompt). Events that are not call-shaped have no fingerprint.
pub fn default_fingerprint(event: &Event) -> Option<String> {
    let (name_key, content_key) = match event.event_type {
        EventKind::LlmCall => ("model", "prompt"),
        EventKind::ToolCall => ("name", "args"),
        _ => return None,
    };
    let name = event.payload.get(name_key).and_then(|v| v.as_str()).unwrap_or("?");
    let content = event.payload.get(content_key).cloned().unwrap_or(serde_json::Value::Null);

    let digest = Sha256::digest(content.to_string().as_bytes());
    let hash: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    Some(format!("{}:{}:{}", event.event_type.as_str(), name, hash))
}

static CUSTOM_FINGERPRINT: OnceLock<FingerprintFn> = OnceLock::new();

/// Installs a process-wide fingerprint function used by runs opened from now
/// on. Takes effect once; later calls are ignored.
pub fn set_fingerprint(fingerprint: FingerprintFn) {
    let _ = CUSTOM_FINGERPRINT.set(fingerprint);
}

pub(crate) fn configured_fingerprint() -> FingerprintFn {
    match CUSTOM_FINGERPRINT.get() {
        Some(fingerprint) => *fingerprint,
        None => default_fingerprint,
    }
}

/// Payload of a synthesized loop warning event.
#[derive(Debug, Clone, Serialize)]
pub struct LoopWarning {
    /// Description of the repeated pattern.
    pub pattern: String,
    /// Length of the streak when the warning fired.
    pub repetitions: usize,
    /// Sequence numbers of the matched evidence events.
    pub evidence_seqs: Vec<u64>,
}

/// Sliding-window loop detector for one run. Window and streak state are
/// discarded with the run.
#[derive(Debug)]
pub struct LoopDetector {
    window: usize,
    repetitions: usize,
    fingerprint: FingerprintFn,
    recent: VecDeque<(String, u64)>,
    streak_len: usize,
    streak_fp: Option<String>,
    warned: bool,
}

impl LoopDetector {
    /// Creates a detector with the given window length and repetition
    /// threshold (already clamped by configuration).
    pub fn new(window: usize, repetitions: usize) -> Self {
        Self {
            window: window.max(1),
            repetitions: repetitions.max(2),
            fingerprint: default_fingerprint,
            recent: VecDeque::new(),
            streak_len: 0,
            streak_fp: None,
            warned: false,
        }
    }

    /// Replaces the fingerprint function.
    pub fn with_fingerprint(mut self, fingerprint: FingerprintFn) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Observes one event; returns a warning payload when a fresh streak
    /// reaches the repetition threshold.
    pub fn observe(&mut self, event: &Event) -> Option<LoopWarning> {
        if !event.event_type.is_call() {
            return None;
        }
        let fp = (self.fingerprint)(event)?;

        if self.streak_fp.as_deref() == Some(fp.as_str()) {
            self.streak_len += 1;
        } else {
            self.streak_fp = Some(fp.clone());
            self.streak_len = 1;
            self.warned = false;
        }

        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back((fp, event.seq));

        if self.streak_len >= self.repetitions && !self.warned {
            self.warned = true;
            let mut evidence: Vec<u64> =
                self.recent.iter().rev().take(self.streak_len.min(self.window)).map(|(_, seq)| *seq).collect();
            evidence.reverse();
            return Some(LoopWarning {
                pattern: self.streak_fp.clone().unwrap_or_default(),
                repetitions: self.streak_len,
                evidence_seqs: evidence,
            });
        }
        None
    }
}
