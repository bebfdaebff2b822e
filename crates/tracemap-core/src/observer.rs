use serde_json::Value;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// ReconcileObserver
// ---------------------------------------------------------------------------

/// Diagnostic hooks called by the normalizer and reconciler.
///
/// The engine performs no logging of its own; every event goes through this
/// port. All methods default to no-ops.
pub trait ReconcileObserver: Send + Sync {
    fn step_matched(&self, _node: &str, _step: &str, _depth: usize) {}

    fn outcome_matched(&self, _node: &str, _action: &str, _depth: usize) {}

    fn branch_resolved(&self, _decision: &str, _branch: &str, _active: bool) {}

    /// A decision bound to a step output found no value; `false` was assumed.
    fn unresolved_activation(&self, _decision: &str, _step: &str, _field: &str) {}

    fn current_selected(&self, _node: Option<&str>) {}

    /// Two steps share a bare operation name; `kept` now owns the alias.
    fn alias_collision(&self, _alias: &str, _replaced: &str, _kept: &str) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ReconcileObserver for NoopObserver {}

// ---------------------------------------------------------------------------
// TracingObserver
// ---------------------------------------------------------------------------

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ReconcileObserver for TracingObserver {
    fn step_matched(&self, node: &str, step: &str, depth: usize) {
        tracing::debug!(node, step, depth, "step node matched");
    }

    fn outcome_matched(&self, node: &str, action: &str, depth: usize) {
        tracing::debug!(node, action, depth, "outcome node matched");
    }

    fn branch_resolved(&self, decision: &str, branch: &str, active: bool) {
        tracing::debug!(decision, branch, active, "branch resolved");
    }

    fn unresolved_activation(&self, decision: &str, step: &str, field: &str) {
        tracing::debug!(decision, step, field, "activation value missing, assuming false");
    }

    fn current_selected(&self, node: Option<&str>) {
        tracing::debug!(node = node.unwrap_or("<none>"), "current node selected");
    }

    fn alias_collision(&self, alias: &str, replaced: &str, kept: &str) {
        tracing::warn!(alias, replaced, kept, "bare step name collision");
    }
}

// ---------------------------------------------------------------------------
// RecordingObserver
// ---------------------------------------------------------------------------

/// Keeps every event in memory, in call order. Useful in tests and for
/// rendering a debug log next to the annotated tree.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedEvent {
    pub kind: &'static str,
    pub fields: Value,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn of_kind(&self, kind: &str) -> Vec<ObservedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    fn push(&self, kind: &'static str, fields: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(ObservedEvent { kind, fields });
        }
    }
}

impl ReconcileObserver for RecordingObserver {
    fn step_matched(&self, node: &str, step: &str, depth: usize) {
        self.push(
            "step_matched",
            serde_json::json!({"node": node, "step": step, "depth": depth}),
        );
    }

    fn outcome_matched(&self, node: &str, action: &str, depth: usize) {
        self.push(
            "outcome_matched",
            serde_json::json!({"node": node, "action": action, "depth": depth}),
        );
    }

    fn branch_resolved(&self, decision: &str, branch: &str, active: bool) {
        self.push(
            "branch_resolved",
            serde_json::json!({"decision": decision, "branch": branch, "active": active}),
        );
    }

    fn unresolved_activation(&self, decision: &str, step: &str, field: &str) {
        self.push(
            "unresolved_activation",
            serde_json::json!({"decision": decision, "step": step, "field": field}),
        );
    }

    fn current_selected(&self, node: Option<&str>) {
        self.push("current_selected", serde_json::json!({"node": node}));
    }

    fn alias_collision(&self, alias: &str, replaced: &str, kept: &str) {
        self.push(
            "alias_collision",
            serde_json::json!({"alias": alias, "replaced": replaced, "kept": kept}),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_observer_keeps_order() {
        let obs = RecordingObserver::new();
        obs.step_matched("webhook", "hooks:webhook", 0);
        obs.branch_resolved("d", "yes", true);
        obs.current_selected(None);

        let kinds: Vec<_> = obs.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["step_matched", "branch_resolved", "current_selected"]);
        assert_eq!(obs.of_kind("branch_resolved")[0].fields["active"], true);
        assert!(obs.of_kind("current_selected")[0].fields["node"].is_null());
    }
}
