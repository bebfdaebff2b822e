use crate::trace::{is_truthy, lookup_path, Trace};
use crate::types::TraceStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const ERROR_ACTION: &str = "error";
pub const PARTIAL_ACTION: &str = "partial";

// ---------------------------------------------------------------------------
// ResultClassifier
// ---------------------------------------------------------------------------

/// Derives a trace's result action when the trace does not carry one.
///
/// Implementors supply the provider-specific part: which shape of a
/// successful response body means which action. The precedence around it is
/// shared:
///
/// 1. `response_body.action`, if present;
/// 2. completed + truthy `response_body.success` → [`infer_success_action`];
/// 3. failed, or `response_body.success == false` → `"error"`;
/// 4. partial → `"partial"`;
/// 5. otherwise the empty string, which matches nothing.
///
/// The result is always lowercase.
///
/// [`infer_success_action`]: ResultClassifier::infer_success_action
pub trait ResultClassifier: Send + Sync {
    fn infer_success_action(&self, body: &Value) -> Option<String>;

    fn classify(&self, trace: &Trace) -> String {
        let body = trace.response_body.as_ref();

        if let Some(action) = body
            .and_then(|b| b.get("action"))
            .and_then(Value::as_str)
            .filter(|a| !a.is_empty())
        {
            return action.to_lowercase();
        }

        let success = body.and_then(|b| b.get("success"));
        if trace.status == TraceStatus::Completed && success.map(is_truthy).unwrap_or(false) {
            if let Some(action) = body.and_then(|b| self.infer_success_action(b)) {
                return action.to_lowercase();
            }
        }

        if trace.status == TraceStatus::Failed || success == Some(&Value::Bool(false)) {
            return ERROR_ACTION.to_string();
        }
        if trace.status == TraceStatus::Partial {
            return PARTIAL_ACTION.to_string();
        }
        String::new()
    }
}

// ---------------------------------------------------------------------------
// Shape rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeCheck {
    /// Numeric field greater than zero.
    Positive,
    /// Numeric field equal to zero.
    Zero,
    /// Field present and not null.
    Present,
    Truthy,
}

impl ShapeCheck {
    pub fn holds(self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            ShapeCheck::Positive => value.as_f64().map(|n| n > 0.0).unwrap_or(false),
            ShapeCheck::Zero => value.as_f64().map(|n| n == 0.0).unwrap_or(false),
            ShapeCheck::Present => !value.is_null(),
            ShapeCheck::Truthy => is_truthy(value),
        }
    }
}

/// `field` of a successful response body, tested by `when`, implies `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRule {
    pub field: String,
    pub when: ShapeCheck,
    pub action: String,
}

/// Configured rule table for one provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassifierRules {
    #[serde(default)]
    pub rules: Vec<ShapeRule>,
}

// ---------------------------------------------------------------------------
// RuleClassifier
// ---------------------------------------------------------------------------

/// Table-driven classifier: first matching rule in declaration order wins.
#[derive(Debug, Clone, Default)]
pub struct RuleClassifier {
    rules: Vec<ShapeRule>,
}

impl RuleClassifier {
    pub fn new(rules: Vec<ShapeRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ShapeRule] {
        &self.rules
    }
}

impl From<&ClassifierRules> for RuleClassifier {
    fn from(cfg: &ClassifierRules) -> Self {
        RuleClassifier::new(cfg.rules.clone())
    }
}

impl ResultClassifier for RuleClassifier {
    fn infer_success_action(&self, body: &Value) -> Option<String> {
        self.rules
            .iter()
            .find(|rule| rule.when.holds(lookup_path(body, &rule.field)))
            .map(|rule| rule.action.clone())
    }
}

// ---------------------------------------------------------------------------
// ClassifierSet
// ---------------------------------------------------------------------------

/// Classifiers keyed by provider name.
#[derive(Clone, Default)]
pub struct ClassifierSet {
    providers: HashMap<String, Arc<dyn ResultClassifier>>,
    default_provider: Option<String>,
    fallback: RuleClassifier,
}

impl ClassifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(
        tables: &HashMap<String, ClassifierRules>,
        default_provider: Option<&str>,
    ) -> Self {
        let mut set = ClassifierSet::new();
        for (provider, table) in tables {
            set.insert(provider.clone(), Arc::new(RuleClassifier::from(table)));
        }
        set.default_provider = default_provider.map(str::to_string);
        set
    }

    pub fn insert(&mut self, provider: impl Into<String>, classifier: Arc<dyn ResultClassifier>) {
        self.providers.insert(provider.into(), classifier);
    }

    /// The trace's own provider, then the default provider, then an empty
    /// rule table (which still applies the shared precedence).
    pub fn for_trace(&self, trace: &Trace) -> &dyn ResultClassifier {
        trace
            .provider
            .as_deref()
            .or(self.default_provider.as_deref())
            .and_then(|p| self.providers.get(p))
            .map(|c| c.as_ref())
            .unwrap_or(&self.fallback)
    }
}

impl std::fmt::Debug for ClassifierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<_> = self.providers.keys().collect();
        providers.sort();
        f.debug_struct("ClassifierSet")
            .field("providers", &providers)
            .field("default_provider", &self.default_provider)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
