use crate::error::Result;
use crate::types::TraceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Separator between a step's namespace and its operation name.
pub const NAMESPACE_SEPARATOR: char = ':';

// ---------------------------------------------------------------------------
// Detail
// ---------------------------------------------------------------------------

/// A sub-operation recorded under a step (typically one external API call).
///
/// Passed through to annotated nodes untouched; unknown fields are kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detail {
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub output: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// ExecutedStep
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedStep {
    /// Usually `<namespace>:<operation>`; some providers omit the namespace.
    #[serde(alias = "qualifiedName", alias = "name")]
    pub qualified_name: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub details: Vec<Detail>,
    #[serde(default, alias = "executedAt", skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ExecutedStep {
    pub fn new(qualified_name: impl Into<String>, output: Value) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            output,
            details: Vec::new(),
            executed_at: None,
            duration_ms: None,
        }
    }

    pub fn with_details(mut self, details: Vec<Detail>) -> Self {
        self.details = details;
        self
    }

    pub fn bare_name(&self) -> &str {
        bare_name(&self.qualified_name)
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub status: TraceStatus,
    #[serde(default, alias = "resultAction", skip_serializing_if = "Option::is_none")]
    pub result_action: Option<String>,
    #[serde(default, alias = "responseBody", skip_serializing_if = "Option::is_none")]
    pub response_body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, alias = "triggerKey", skip_serializing_if = "Option::is_none")]
    pub trigger_key: Option<String>,
    /// Selects the result classifier; falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Trace {
    pub fn new(status: TraceStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_result_action(mut self, action: impl Into<String>) -> Self {
        self.result_action = Some(action.into());
        self
    }

    pub fn with_response_body(mut self, body: Value) -> Self {
        self.response_body = Some(body);
        self
    }

    /// The identifier a trigger resolver should look up: explicit trigger
    /// key first, then the endpoint path.
    pub fn trigger_identifier(&self) -> Option<&str> {
        self.trigger_key
            .as_deref()
            .or(self.endpoint.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// TraceBundle
// ---------------------------------------------------------------------------

/// One captured invocation: the final trace record plus its ordered steps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TraceBundle {
    pub trace: Trace,
    #[serde(default)]
    pub steps: Vec<ExecutedStep>,
    /// Inbound webhook payload, used for trigger aliasing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl TraceBundle {
    pub fn from_json_str(src: &str) -> Result<Self> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        TraceBundle::from_json_str(&data)
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// The operation name after the last namespace separator.
pub fn bare_name(qualified: &str) -> &str {
    match qualified.rfind(NAMESPACE_SEPARATOR) {
        Some(i) => &qualified[i + NAMESPACE_SEPARATOR.len_utf8()..],
        None => qualified,
    }
}

/// Resolve a plain key or a dotted path inside a JSON object.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(direct) = value.get(path) {
        return Some(direct);
    }
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_name_strips_last_namespace() {
        assert_eq!(bare_name("svc:op"), "op");
        assert_eq!(bare_name("a:b:c"), "c");
        assert_eq!(bare_name("plain"), "plain");
        assert_eq!(bare_name("trailing:"), "");
    }

    #[test]
    fn lookup_path_prefers_literal_key() {
        let v = json!({"a.b": 1, "a": {"b": 2}});
        assert_eq!(lookup_path(&v, "a.b"), Some(&json!(1)));
        let v = json!({"a": {"b": {"c": true}}});
        assert_eq!(lookup_path(&v, "a.b.c"), Some(&json!(true)));
        assert_eq!(lookup_path(&v, "a.x"), None);
        assert_eq!(lookup_path(&json!("scalar"), "a"), None);
    }

    #[test]
    fn truthiness() {
        for v in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            assert!(!is_truthy(&v), "expected falsy: {v}");
        }
        for v in [json!(true), json!(3), json!("x"), json!([0]), json!({"k": 1})] {
            assert!(is_truthy(&v), "expected truthy: {v}");
        }
    }

    #[test]
    fn bundle_accepts_camel_case_fields() {
        let bundle = TraceBundle::from_json_str(
            r#"{
                "trace": {"status": "completed", "resultAction": "Done", "triggerKey": "booking"},
                "steps": [
                    {"qualifiedName": "svc:op", "output": {"ok": true},
                     "details": [{"operation": "crm.createContact", "output": {"id": 7}, "status": 200}]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(bundle.trace.status, TraceStatus::Completed);
        assert_eq!(bundle.trace.result_action.as_deref(), Some("Done"));
        assert_eq!(bundle.trace.trigger_identifier(), Some("booking"));
        assert_eq!(bundle.steps[0].bare_name(), "op");
        assert_eq!(bundle.steps[0].details[0].extra.get("status"), Some(&json!(200)));
    }
}
