//! Trace event types and recording payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// First event of a run.
    RunStart,
    /// Last event of a run, carries the terminal status.
    RunEnd,
    /// A call to an external model.
    LlmCall,
    /// A call to a tool.
    ToolCall,
    /// A snapshot of agent state.
    State,
    /// A fault observed in instrumented code.
    Error,
    /// Synthesized warning about repetitive call behavior.
    LoopWarning,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RunStart => "run_start",
            EventKind::RunEnd => "run_end",
            EventKind::LlmCall => "llm_call",
            EventKind::ToolCall => "tool_call",
            EventKind::State => "state",
            EventKind::Error => "error",
            EventKind::LoopWarning => "loop_warning",
        }
    }

    /// Call-shaped events are the ones the loop detector inspects.
    pub fn is_call(&self) -> bool {
        matches!(self, EventKind::LlmCall | EventKind::ToolCall)
    }
}

/// Outcome of a call-shaped event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// The call completed normally.
    Ok,
    /// The call failed.
    Error,
}

/// One immutable, sequenced observation within a run.
///
/// `seq` plus `run_id` is the unique key; events are appended in `seq` order
/// and never mutated or reordered afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Strictly increasing sequence number, assigned at append time.
    pub seq: u64,
    /// Owning run identifier.
    pub run_id: String,
    /// Unix timestamp (milliseconds) when the event was recorded.
    pub ts_ms: i64,
    /// Event kind.
    pub event_type: EventKind,
    /// Outcome, for call-shaped events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    /// Kind-specific payload, sanitized before persistence.
    pub payload: Value,
    /// Caller-supplied metadata, sanitized before persistence.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub meta: Value,
}

/// Token usage reported for an LLM call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Payload for recording a call to an external model.
#[derive(Debug, Clone, Serialize)]
pub struct LlmCall {
    /// Model identifier (e.g. "gpt-4-turbo", "claude-3-opus").
    pub model: String,
    /// Prompt sent to the model.
    pub prompt: Value,
    /// Response returned by the model.
    pub response: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Error message when the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Outcome; stored on the event rather than in the payload.
    #[serde(skip)]
    pub status: CallStatus,
    /// Caller metadata; stored on the event rather than in the payload.
    #[serde(skip)]
    pub meta: Value,
}

impl LlmCall {
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<Value>,
        response: impl Into<Value>,
    ) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            response: response.into(),
            usage: None,
            provider: None,
            temperature: None,
            stop_reason: None,
            error: None,
            status: CallStatus::Ok,
            meta: Value::Null,
        }
    }

    pub fn with_usage(mut self, input_tokens: u32, output_tokens: u32) -> Self {
        self.usage = Some(TokenUsage { input_tokens, output_tokens });
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_stop_reason(mut self, stop_reason: impl Into<String>) -> Self {
        self.stop_reason = Some(stop_reason.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    /// Marks the call as failed with the given error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error = Some(error.into());
        self
    }
}

/// Payload for recording a call to a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCall {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    pub args: Value,
    /// Tool result.
    pub result: Value,
    /// Error message when the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Outcome; stored on the event rather than in the payload.
    #[serde(skip)]
    pub status: CallStatus,
    /// Caller metadata; stored on the event rather than in the payload.
    #[serde(skip)]
    pub meta: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            args: args.into(),
            result: Value::Null,
            error: None,
            status: CallStatus::Ok,
            meta: Value::Null,
        }
    }

    pub fn with_result(mut self, result: impl Into<Value>) -> Self {
        self.result = result.into();
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }

    /// Marks the call as failed with the given error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error = Some(error.into());
        self
    }
}

/// Payload for recording an agent state snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Current agent state.
    pub state: Value,
    /// Delta against the previous snapshot, if the caller computed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<Value>,
    /// Caller metadata; stored on the event rather than in the payload.
    #[serde(skip)]
    pub meta: Value,
}

impl StateSnapshot {
    pub fn new(state: impl Into<Value>) -> Self {
        Self { state: state.into(), diff: None, meta: Value::Null }
    }

    pub fn with_diff(mut self, diff: impl Into<Value>) -> Self {
        self.diff = Some(diff.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_round_trips_through_json() {
        let event = Event {
            seq: 3,
            run_id: "run-1".to_string(),
            ts_ms: 1700000000000,
            event_type: EventKind::ToolCall,
            status: Some(CallStatus::Ok),
            payload: json!({"name": "search", "args": {"query": "rust"}}),
            meta: Value::Null,
        };

        let line = serde_json::to_string(&event).unwrap();
        assert!(line.contains("\"tool_call\""));
        // Null meta is omitted from the wire format.
        assert!(!line.contains("\"meta\""));

        let back: Event = serde_json::from_str(&line).unwrap();
        assert_eq!(back.seq, 3);
        assert_eq!(back.event_type, EventKind::ToolCall);
        assert_eq!(back.payload, event.payload);
        assert!(back.meta.is_null());
    }

    #[test]
    fn test_llm_call_builder() {
        let call = LlmCall::new("gpt-4-turbo", "hello", "hi")
            .with_usage(10, 5)
            .with_provider("openai")
            .with_stop_reason("end_turn");

        assert_eq!(call.status, CallStatus::Ok);
        let payload = serde_json::to_value(&call).unwrap();
        assert_eq!(payload["model"], "gpt-4-turbo");
        assert_eq!(payload["usage"]["input_tokens"], 10);
        // Status and meta live on the event, not in the payload.
        assert!(payload.get("status").is_none());
        assert!(payload.get("meta").is_none());
    }

    #[test]
    fn test_failed_tool_call_sets_status_and_error() {
        let call = ToolCall::new("search", json!({"query": "x"})).failed("timeout");
        assert_eq!(call.status, CallStatus::Error);
        let payload = serde_json::to_value(&call).unwrap();
        assert_eq!(payload["error"], "timeout");
    }
}
