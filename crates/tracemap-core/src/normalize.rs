//! Turns a raw step list plus the final trace record into lookup structures
//! the reconciler can query without re-walking the input.

use crate::classify::ResultClassifier;
use crate::observer::ReconcileObserver;
use crate::trace::{bare_name, lookup_path, Detail, ExecutedStep, Trace};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A detail record tagged with the step that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaggedDetail<'a> {
    pub step: &'a str,
    #[serde(flatten)]
    pub detail: &'a Detail,
}

/// Two differently-qualified steps shared a bare operation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasCollision {
    pub alias: String,
    pub replaced: String,
    pub kept: String,
}

#[derive(Debug, Clone)]
pub struct NormalizedContext<'a> {
    steps: &'a [ExecutedStep],
    exact: HashMap<&'a str, usize>,
    aliases: HashMap<&'a str, usize>,
    result_action: String,
    details: Vec<TaggedDetail<'a>>,
    collisions: Vec<AliasCollision>,
}

/// Index `steps` and derive the trace's result action.
///
/// Never fails: missing or malformed fields simply match nothing later.
pub fn normalize<'a>(
    steps: &'a [ExecutedStep],
    trace: &Trace,
    classifier: &dyn ResultClassifier,
    observer: &dyn ReconcileObserver,
) -> NormalizedContext<'a> {
    let mut exact = HashMap::new();
    for (i, step) in steps.iter().enumerate() {
        exact.insert(step.qualified_name.as_str(), i);
    }

    let mut aliases: HashMap<&str, usize> = HashMap::new();
    let mut collisions = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        let bare = step.bare_name();
        if bare == step.qualified_name || bare.is_empty() {
            continue;
        }
        if let Some(prev) = aliases.insert(bare, i) {
            let replaced = &steps[prev].qualified_name;
            if *replaced != step.qualified_name {
                observer.alias_collision(bare, replaced, &step.qualified_name);
                collisions.push(AliasCollision {
                    alias: bare.to_string(),
                    replaced: replaced.clone(),
                    kept: step.qualified_name.clone(),
                });
            }
        }
    }

    let details = steps
        .iter()
        .flat_map(|step| {
            step.details.iter().map(move |detail| TaggedDetail {
                step: step.qualified_name.as_str(),
                detail,
            })
        })
        .collect();

    let result_action = match trace.result_action.as_deref().map(str::trim) {
        Some(explicit) if !explicit.is_empty() => explicit.to_lowercase(),
        _ => classifier.classify(trace),
    };

    NormalizedContext {
        steps,
        exact,
        aliases,
        result_action,
        details,
        collisions,
    }
}

impl<'a> NormalizedContext<'a> {
    /// Look a step up by template match key.
    ///
    /// Order: exact qualified name, then bare-name alias, then the key's own
    /// bare name (template qualified, trace recorded without namespace).
    pub fn step(&self, key: &str) -> Option<&'a ExecutedStep> {
        let steps = self.steps;
        self.exact
            .get(key)
            .or_else(|| self.aliases.get(key))
            .or_else(|| self.exact.get(bare_name(key)))
            .map(|&i| &steps[i])
    }

    pub fn has_step(&self, key: &str) -> bool {
        self.step(key).is_some()
    }

    /// A field (plain key or dotted path) of a step's recorded output.
    pub fn output_field(&self, step: &str, field: &str) -> Option<&'a Value> {
        self.step(step).and_then(|s| lookup_path(&s.output, field))
    }

    /// Always lowercase; empty when nothing could be derived.
    pub fn result_action(&self) -> &str {
        &self.result_action
    }

    pub fn details(&self) -> &[TaggedDetail<'a>] {
        &self.details
    }

    pub fn collisions(&self) -> &[AliasCollision] {
        &self.collisions
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.result_action.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
