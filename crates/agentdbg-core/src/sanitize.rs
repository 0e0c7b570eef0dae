//! Payload sanitization: key-based redaction, oversized-value truncation, and
//! a recursion depth cap.
//!
//! Every payload and metadata value passes through [`sanitize`] before it is
//! handed to storage. Sanitization never fails: unknown shapes pass through
//! as JSON values and the redaction/truncation rules apply to whatever is
//! there.

use serde_json::{Map, Value};

/// Marker substituted for redacted values.
pub const REDACTED_MARKER: &str = "__REDACTED__";
/// Marker appended to truncated strings and substituted for values past the
/// depth cap.
pub const TRUNCATED_MARKER: &str = "__TRUNCATED__";
/// Maximum traversal depth; values first encountered beyond it are replaced
/// with [`TRUNCATED_MARKER`].
pub const DEPTH_LIMIT: usize = 10;
/// Default cap on a single field's UTF-8 byte length.
pub const DEFAULT_MAX_FIELD_BYTES: usize = 20_000;

/// Key-substring patterns redacted by default.
pub const DEFAULT_REDACT_KEYS: [&str; 6] =
    ["api_key", "authorization", "cookie", "password", "secret", "token"];

/// Redaction and truncation rules, immutable once resolved.
#[derive(Debug, Clone)]
pub struct SanitizePolicy {
    /// Whether key-based redaction is enabled.
    pub redact: bool,
    /// Lowercased key-substring patterns that trigger redaction.
    pub redact_keys: Vec<String>,
    /// Maximum UTF-8 byte length for a string field.
    pub max_field_bytes: usize,
    /// Maximum traversal depth.
    pub depth_limit: usize,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            redact: true,
            redact_keys: DEFAULT_REDACT_KEYS.iter().map(|k| k.to_string()).collect(),
            max_field_bytes: DEFAULT_MAX_FIELD_BYTES,
            depth_limit: DEPTH_LIMIT,
        }
    }
}

impl SanitizePolicy {
    /// Creates a policy with the given key patterns, lowercased for matching.
    pub fn new(redact: bool, redact_keys: &[String], max_field_bytes: usize) -> Self {
        Self {
            redact,
            redact_keys: redact_keys.iter().map(|k| k.to_lowercase()).collect(),
            max_field_bytes,
            depth_limit: DEPTH_LIMIT,
        }
    }

    /// True when the key contains any redaction pattern, case-insensitively.
    pub fn key_matches(&self, key: &str) -> bool {
        if !self.redact {
            return false;
        }
        let key = key.to_lowercase();
        self.redact_keys.iter().any(|p| !p.is_empty() && key.contains(p.as_str()))
    }
}

/// Applies redaction, truncation, and the depth cap to an arbitrary value
/// tree. Pure and deterministic given the same policy.
pub fn sanitize(value: &Value, policy: &SanitizePolicy) -> Value {
    sanitize_at(value, policy, 0)
}

fn sanitize_at(value: &Value, policy: &SanitizePolicy, depth: usize) -> Value {
    if depth > policy.depth_limit {
        return Value::String(TRUNCATED_MARKER.to_string());
    }
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                if policy.key_matches(key) {
                    out.insert(key.clone(), Value::String(REDACTED_MARKER.to_string()));
                } else {
                    out.insert(key.clone(), sanitize_at(child, policy, depth + 1));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| sanitize_at(v, policy, depth + 1)).collect())
        }
        Value::String(s) => Value::String(truncate_field(s, policy.max_field_bytes)),
        other => other.clone(),
    }
}

/// Truncates `s` to at most `max_bytes` UTF-8 bytes (cut at a char boundary)
/// and appends the truncation marker. Strings within the limit pass through.
fn truncate_field(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut cut = max_bytes;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &s[..cut], TRUNCATED_MARKER)
}

/// Redacts option values in command-line arguments: `--api-key=secret`
/// becomes `--api-key=__REDACTED__` when the flag name matches a redaction
/// pattern (dashes normalized to underscores). Flags and positional
/// arguments are kept verbatim.
pub fn redact_argv(argv: &[String], policy: &SanitizePolicy) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            if let Some((flag, _)) = arg.split_once('=') {
                let name = flag.trim_start_matches('-').replace('-', "_");
                if policy.key_matches(&name) {
                    return format!("{flag}={REDACTED_MARKER}");
                }
            }
            arg.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_key_redacted_at_any_depth() {
        let policy = SanitizePolicy::default();
        let value = json!({
            "query": "hello",
            "token": "sk-abc123",
            "nested": {"auth": {"Api-Token": {"k": "v"}, "other": 1}}
        });

        let out = sanitize(&value, &policy);
        assert_eq!(out["token"], REDACTED_MARKER);
        assert_eq!(out["query"], "hello");
        // Substring match is case-insensitive and redaction is wholesale.
        assert_eq!(out["nested"]["auth"]["Api-Token"], REDACTED_MARKER);
        assert_eq!(out["nested"]["auth"]["other"], 1);
    }

    #[test]
    fn test_redaction_disabled_keeps_values() {
        let policy = SanitizePolicy::new(false, &["token".to_string()], 1000);
        let out = sanitize(&json!({"token": "keep-me"}), &policy);
        assert_eq!(out["token"], "keep-me");
    }

    #[test]
    fn test_oversized_string_truncated_to_exact_byte_length() {
        let policy = SanitizePolicy { max_field_bytes: 100, ..SanitizePolicy::default() };
        let long = "x".repeat(500);
        let out = sanitize(&json!(long), &policy);

        let stored = out.as_str().unwrap();
        assert_eq!(stored.len(), 100 + TRUNCATED_MARKER.len());
        assert!(stored.ends_with(TRUNCATED_MARKER));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let policy = SanitizePolicy { max_field_bytes: 100, ..SanitizePolicy::default() };
        // Multi-byte chars: a naive byte cut at 100 would split one in half.
        let long = "é".repeat(200);
        let out = sanitize(&json!(long), &policy);

        let stored = out.as_str().unwrap();
        assert!(stored.len() <= 100 + TRUNCATED_MARKER.len());
        assert!(stored.ends_with(TRUNCATED_MARKER));
    }

    #[test]
    fn test_value_beyond_depth_limit_becomes_marker() {
        let policy = SanitizePolicy::default();
        let mut deep = json!("leaf");
        for _ in 0..policy.depth_limit + 1 {
            deep = json!([deep]);
        }

        let out = sanitize(&deep, &policy);
        let mut inner = &out;
        for _ in 0..policy.depth_limit + 1 {
            let items = inner.as_array().unwrap();
            assert_eq!(items.len(), 1);
            inner = &items[0];
        }
        assert_eq!(*inner, json!(TRUNCATED_MARKER));
    }

    #[test]
    fn test_value_at_depth_limit_is_preserved() {
        let policy = SanitizePolicy::default();
        let mut nested = json!("ok");
        for _ in 0..policy.depth_limit {
            nested = json!([nested]);
        }

        let out = sanitize(&nested, &policy);
        let mut inner = &out;
        for _ in 0..policy.depth_limit {
            inner = &inner.as_array().unwrap()[0];
        }
        assert_eq!(*inner, json!("ok"));
    }

    #[test]
    fn test_scalars_pass_through() {
        let policy = SanitizePolicy::default();
        assert_eq!(sanitize(&json!(42), &policy), json!(42));
        assert_eq!(sanitize(&json!(true), &policy), json!(true));
        assert_eq!(sanitize(&Value::Null, &policy), Value::Null);
    }

    #[test]
    fn test_argv_option_values_redacted() {
        let policy = SanitizePolicy::default();
        let argv: Vec<String> =
            ["script.py", "--api-key=sk-secret-1234", "--verbose"].map(String::from).to_vec();

        let out = redact_argv(&argv, &policy);
        assert_eq!(out, vec![
            "script.py".to_string(),
            format!("--api-key={REDACTED_MARKER}"),
            "--verbose".to_string(),
        ]);
    }
}
