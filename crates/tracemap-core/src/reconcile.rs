//! Maps one recorded execution onto a workflow template.
//!
//! Two passes over the template:
//!
//! 1. [`Reconciler::find_taken`] marks every node whose own predicate holds
//!    (step present, outcome action matched).
//! 2. [`Reconciler::annotate`] resolves each decision's activation rule and
//!    rebuilds the tree, keeping a node `taken` only if it also sits under
//!    active branches and taken ancestors.
//!
//! The "current" node is then picked from what survived pass 2: the deepest
//! taken node, with any outcome outranking any step.

use crate::classify::ResultClassifier;
use crate::normalize::{normalize, AliasCollision, NormalizedContext};
use crate::observer::{ReconcileObserver, TracingObserver};
use crate::template::{
    ActivationRule, Branch, DecisionNode, Node, OutcomeNode, OutputRule, StepNode,
    WorkflowTemplate,
};
use crate::trace::{is_truthy, Detail, ExecutedStep, Trace};
use crate::types::{MatchStatus, OutcomeStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedStep {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_output_rule: Option<OutputRule>,
    pub match_status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_data: Option<ExecutedStep>,
    #[serde(default)]
    pub details: Vec<Detail>,
    #[serde(default)]
    pub children: Vec<AnnotatedNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedBranch {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_trace_action: Option<String>,
    /// Consistent with the decision's activation rule.
    pub active: bool,
    /// Active and leads to at least one taken node.
    pub taken: bool,
    pub node: Box<AnnotatedNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDecision {
    pub id: String,
    pub display_name: String,
    pub condition: String,
    pub activation: ActivationRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_output_rule: Option<OutputRule>,
    pub match_status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_data: Option<ExecutedStep>,
    #[serde(default)]
    pub details: Vec<Detail>,
    pub branches: Vec<AnnotatedBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedOutcome {
    pub id: String,
    pub display_name: String,
    pub status: OutcomeStatus,
    pub match_action: String,
    pub match_status: MatchStatus,
    #[serde(default)]
    pub details: Vec<Detail>,
}

/// A template node annotated against one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotatedNode {
    Step(AnnotatedStep),
    Decision(AnnotatedDecision),
    Outcome(AnnotatedOutcome),
}

impl AnnotatedNode {
    pub fn id(&self) -> &str {
        match self {
            AnnotatedNode::Step(n) => &n.id,
            AnnotatedNode::Decision(n) => &n.id,
            AnnotatedNode::Outcome(n) => &n.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            AnnotatedNode::Step(n) => &n.display_name,
            AnnotatedNode::Decision(n) => &n.display_name,
            AnnotatedNode::Outcome(n) => &n.display_name,
        }
    }

    pub fn match_status(&self) -> MatchStatus {
        match self {
            AnnotatedNode::Step(n) => n.match_status,
            AnnotatedNode::Decision(n) => n.match_status,
            AnnotatedNode::Outcome(n) => n.match_status,
        }
    }

    pub fn children(&self) -> Vec<&AnnotatedNode> {
        match self {
            AnnotatedNode::Step(n) => n.children.iter().collect(),
            AnnotatedNode::Decision(n) => n.branches.iter().map(|b| b.node.as_ref()).collect(),
            AnnotatedNode::Outcome(_) => Vec::new(),
        }
    }

    /// Pre-order, declaration-order traversal.
    pub fn walk(&self) -> Vec<&AnnotatedNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children().into_iter().rev());
        }
        out
    }

    pub fn find(&self, id: &str) -> Option<&AnnotatedNode> {
        self.walk().into_iter().find(|n| n.id() == id)
    }
}

/// Result of reconciling one execution against one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub template_id: String,
    pub trigger_key: String,
    pub result_action: String,
    /// The node marked `current`; `None` only when nothing is taken.
    pub current: Option<String>,
    /// Taken nodes, current included.
    pub taken_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias_collisions: Vec<AliasCollision>,
    pub root: AnnotatedNode,
}

// ---------------------------------------------------------------------------
// Pass 1 result
// ---------------------------------------------------------------------------

/// Nodes whose own predicate held, before branch activation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TakenSet<'t> {
    pub taken: HashSet<&'t str>,
}

impl TakenSet<'_> {
    pub fn contains(&self, id: &str) -> bool {
        self.taken.contains(id)
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate<'t> {
    id: &'t str,
    depth: usize,
    outcome: bool,
}

impl Candidate<'_> {
    /// Outcomes outrank steps; then depth. Equal-depth steps: the later one
    /// wins. Equal-depth outcomes: the first one keeps it.
    fn beats(&self, other: &Candidate<'_>) -> bool {
        match (self.outcome, other.outcome) {
            (true, false) => true,
            (false, true) => false,
            (true, true) => self.depth > other.depth,
            (false, false) => self.depth >= other.depth,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<'o> {
    observer: &'o dyn ReconcileObserver,
}

impl Default for Reconciler<'static> {
    fn default() -> Self {
        Reconciler {
            observer: &TracingObserver,
        }
    }
}

impl<'o> Reconciler<'o> {
    pub fn new(observer: &'o dyn ReconcileObserver) -> Self {
        Self { observer }
    }

    /// Normalize `steps` + `trace` and reconcile them against `template`.
    pub fn reconcile_trace(
        &self,
        template: &WorkflowTemplate,
        steps: &[ExecutedStep],
        trace: &Trace,
        classifier: &dyn ResultClassifier,
    ) -> Reconciliation {
        let ctx = normalize(steps, trace, classifier, self.observer);
        self.reconcile(template, &ctx)
    }

    pub fn reconcile(&self, template: &WorkflowTemplate, ctx: &NormalizedContext<'_>) -> Reconciliation {
        let taken = self.find_taken(template.root(), ctx);
        let mut root = self.annotate(template.root(), ctx, &taken);
        let current = select_current(&mut root);
        self.observer.current_selected(current.as_deref());

        let taken_count = root
            .walk()
            .into_iter()
            .filter(|n| n.match_status().is_taken())
            .count();

        Reconciliation {
            template_id: template.id().to_string(),
            trigger_key: template.trigger_key().to_string(),
            result_action: ctx.result_action().to_string(),
            current,
            taken_count,
            alias_collisions: ctx.collisions().to_vec(),
            root,
        }
    }

    // -----------------------------------------------------------------------
    // Pass 1
    // -----------------------------------------------------------------------

    pub fn find_taken<'t>(&self, root: &'t Node, ctx: &NormalizedContext<'_>) -> TakenSet<'t> {
        let mut taken = HashSet::new();
        self.visit(root, 0, ctx, &mut taken);
        TakenSet { taken }
    }

    /// Returns whether anything in `node`'s subtree is taken.
    fn visit<'t>(
        &self,
        node: &'t Node,
        depth: usize,
        ctx: &NormalizedContext<'_>,
        taken: &mut HashSet<&'t str>,
    ) -> bool {
        match node {
            Node::Step(step) => {
                let matched = step_key(&step.match_key, &step.match_output_rule)
                    .map(|key| step_matches(key, step.match_output_rule.as_ref(), ctx))
                    .unwrap_or(false);
                if matched {
                    if let Some(key) = step_key(&step.match_key, &step.match_output_rule) {
                        self.observer.step_matched(&step.id, key, depth);
                    }
                    taken.insert(&step.id);
                }
                let mut below = false;
                for child in &step.children {
                    below |= self.visit(child, depth + 1, ctx, taken);
                }
                matched || below
            }
            Node::Decision(decision) => {
                let mut any = false;
                for branch in &decision.branches {
                    any |= self.visit(&branch.node, depth + 1, ctx, taken);
                }
                if any {
                    taken.insert(&decision.id);
                }
                any
            }
            Node::Outcome(outcome) => {
                let matched = outcome_matches(outcome, ctx.result_action());
                if matched {
                    self.observer.outcome_matched(&outcome.id, ctx.result_action(), depth);
                    taken.insert(&outcome.id);
                }
                matched
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pass 2
    // -----------------------------------------------------------------------

    pub fn annotate(&self, root: &Node, ctx: &NormalizedContext<'_>, taken: &TakenSet<'_>) -> AnnotatedNode {
        self.annotate_node(root, true, ctx, taken)
    }

    fn annotate_node(
        &self,
        node: &Node,
        branch_active: bool,
        ctx: &NormalizedContext<'_>,
        taken: &TakenSet<'_>,
    ) -> AnnotatedNode {
        match node {
            Node::Step(step) => self.annotate_step(step, branch_active, ctx, taken),
            Node::Decision(decision) => self.annotate_decision(decision, branch_active, ctx, taken),
            Node::Outcome(outcome) => annotate_outcome(outcome, branch_active, ctx, taken),
        }
    }

    fn annotate_step(
        &self,
        step: &StepNode,
        branch_active: bool,
        ctx: &NormalizedContext<'_>,
        taken: &TakenSet<'_>,
    ) -> AnnotatedNode {
        let key = step_key(&step.match_key, &step.match_output_rule);
        let (match_status, children) = match key {
            // A bound step gates its chain: nothing below an unmatched step is taken.
            Some(_) => {
                let match_status = status_for(&step.id, branch_active, taken);
                let children: Vec<AnnotatedNode> = step
                    .children
                    .iter()
                    .map(|child| self.annotate_node(child, match_status.is_taken(), ctx, taken))
                    .collect();
                (match_status, children)
            }
            // An unbound step is structural, taken when something below it is.
            None => {
                let children: Vec<AnnotatedNode> = step
                    .children
                    .iter()
                    .map(|child| self.annotate_node(child, branch_active, ctx, taken))
                    .collect();
                let below = children.iter().any(|c| c.match_status().is_taken());
                (if below { MatchStatus::Taken } else { MatchStatus::NotTaken }, children)
            }
        };
        let step_data = if match_status.is_taken() {
            key.and_then(|key| ctx.step(key))
        } else {
            None
        };

        AnnotatedNode::Step(AnnotatedStep {
            id: step.id.clone(),
            display_name: step.display_name.clone(),
            layer: step.layer.clone(),
            match_key: step.match_key.clone(),
            match_output_rule: step.match_output_rule.clone(),
            match_status,
            details: step_data.map(|s| s.details.clone()).unwrap_or_default(),
            step_data: step_data.cloned(),
            children,
        })
    }

    fn annotate_decision(
        &self,
        decision: &DecisionNode,
        branch_active: bool,
        ctx: &NormalizedContext<'_>,
        taken: &TakenSet<'_>,
    ) -> AnnotatedNode {
        let actual = self.resolve_activation(decision, ctx);

        let branches: Vec<AnnotatedBranch> = decision
            .branches
            .iter()
            .map(|branch| {
                let active = branch_active && branch_is_active(branch, actual.as_ref(), ctx);
                self.observer.branch_resolved(&decision.id, &branch.label, active);
                let node = self.annotate_node(&branch.node, active, ctx, taken);
                let subtree_taken = node.walk().iter().any(|n| n.match_status().is_taken());
                AnnotatedBranch {
                    label: branch.label.clone(),
                    match_value: branch.match_value.clone(),
                    match_trace_action: branch.match_trace_action.clone(),
                    active,
                    taken: active && subtree_taken,
                    node: Box::new(node),
                }
            })
            .collect();

        let is_taken = branches.iter().any(|b| b.taken);
        let step_data = if is_taken {
            step_key(&decision.match_key, &decision.match_output_rule)
                .filter(|key| step_matches(key, decision.match_output_rule.as_ref(), ctx))
                .and_then(|key| ctx.step(key))
        } else {
            None
        };

        AnnotatedNode::Decision(AnnotatedDecision {
            id: decision.id.clone(),
            display_name: decision.display_name.clone(),
            condition: decision.condition.clone(),
            activation: decision.activation.clone(),
            match_key: decision.match_key.clone(),
            match_output_rule: decision.match_output_rule.clone(),
            match_status: if is_taken {
                MatchStatus::Taken
            } else {
                MatchStatus::NotTaken
            },
            details: step_data.map(|s| s.details.clone()).unwrap_or_default(),
            step_data: step_data.cloned(),
            branches,
        })
    }

    /// The value branches are compared against; `None` means every branch
    /// inherits the parent's activity.
    fn resolve_activation(&self, decision: &DecisionNode, ctx: &NormalizedContext<'_>) -> Option<Value> {
        match &decision.activation {
            ActivationRule::StepOutput { step, field } => match ctx.output_field(step, field) {
                Some(value) => Some(value.clone()),
                None => {
                    self.observer.unresolved_activation(&decision.id, step, field);
                    Some(Value::Bool(false))
                }
            },
            ActivationRule::TraceResult => Some(Value::String(ctx.result_action().to_string())),
            ActivationRule::Inherit => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Current selection
// ---------------------------------------------------------------------------

/// Promote the best taken step or outcome to `current` and return its id.
fn select_current(root: &mut AnnotatedNode) -> Option<String> {
    let mut best = None;
    rank(&*root, 0, &mut best);
    let id = best.map(|c| c.id.to_string())?;
    mark_current(root, &id);
    Some(id)
}

fn rank<'a>(node: &'a AnnotatedNode, depth: usize, best: &mut Option<Candidate<'a>>) {
    let candidate = match node {
        AnnotatedNode::Step(step) if step.match_status.is_taken() => Some(Candidate {
            id: &step.id,
            depth,
            outcome: false,
        }),
        AnnotatedNode::Outcome(outcome) if outcome.match_status.is_taken() => Some(Candidate {
            id: &outcome.id,
            depth,
            outcome: true,
        }),
        _ => None,
    };
    if let Some(candidate) = candidate {
        if best.as_ref().map(|b| candidate.beats(b)).unwrap_or(true) {
            *best = Some(candidate);
        }
    }
    for child in node.children() {
        rank(child, depth + 1, best);
    }
}

fn mark_current(node: &mut AnnotatedNode, id: &str) -> bool {
    match node {
        AnnotatedNode::Step(step) if step.id == id => {
            step.match_status = MatchStatus::Current;
            true
        }
        AnnotatedNode::Outcome(outcome) if outcome.id == id => {
            outcome.match_status = MatchStatus::Current;
            true
        }
        AnnotatedNode::Step(step) => step.children.iter_mut().any(|c| mark_current(c, id)),
        AnnotatedNode::Decision(decision) => decision
            .branches
            .iter_mut()
            .any(|b| mark_current(&mut b.node, id)),
        AnnotatedNode::Outcome(_) => false,
    }
}

/// Reconcile with the default `tracing`-backed observer.
pub fn reconcile(template: &WorkflowTemplate, ctx: &NormalizedContext<'_>) -> Reconciliation {
    Reconciler::default().reconcile(template, ctx)
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

/// The step a node is bound to: its match key, else its output rule's step.
fn step_key<'n>(match_key: &'n Option<String>, rule: &'n Option<OutputRule>) -> Option<&'n str> {
    match_key
        .as_deref()
        .or_else(|| rule.as_ref().map(|r| r.step_name.as_str()))
        .filter(|k| !k.is_empty())
}

fn step_matches(key: &str, rule: Option<&OutputRule>, ctx: &NormalizedContext<'_>) -> bool {
    if !ctx.has_step(key) {
        return false;
    }
    let Some(rule) = rule else {
        return true;
    };
    let actual = ctx.output_field(&rule.step_name, &rule.output_field);
    match (&rule.expected_value, actual) {
        (Some(expected), Some(actual)) => values_match(expected, actual),
        (Some(_), None) => false,
        (None, actual) => actual.map(is_truthy).unwrap_or(false),
    }
}

/// Case-insensitive equality or containment; an empty action matches nothing.
fn action_matches(result_action: &str, wanted: &str) -> bool {
    if result_action.is_empty() || wanted.is_empty() {
        return false;
    }
    result_action.contains(&wanted.to_lowercase())
}

fn outcome_matches(outcome: &OutcomeNode, result_action: &str) -> bool {
    action_matches(result_action, &outcome.match_action)
}

/// JSON equality, treating numerically equal numbers (`1` and `1.0`) as equal.
fn values_match(expected: &Value, actual: &Value) -> bool {
    if expected == actual {
        return true;
    }
    match (expected.as_f64(), actual.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn branch_is_active(branch: &Branch, actual: Option<&Value>, ctx: &NormalizedContext<'_>) -> bool {
    let Some(actual) = actual else {
        return true;
    };
    let by_value = branch
        .match_value
        .as_ref()
        .map(|expected| match (expected, actual) {
            (Value::String(e), Value::String(a)) => e.eq_ignore_ascii_case(a),
            _ => values_match(expected, actual),
        })
        .unwrap_or(false);
    let by_trace = branch
        .match_trace_action
        .as_deref()
        .map(|wanted| {
            let result = ctx.result_action();
            !result.is_empty() && wanted.to_lowercase() == result
        })
        .unwrap_or(false);
    by_value || by_trace
}

fn status_for(id: &str, reachable: bool, taken: &TakenSet<'_>) -> MatchStatus {
    if reachable && taken.contains(id) {
        MatchStatus::Taken
    } else {
        MatchStatus::NotTaken
    }
}

fn annotate_outcome(
    outcome: &OutcomeNode,
    branch_active: bool,
    ctx: &NormalizedContext<'_>,
    taken: &TakenSet<'_>,
) -> AnnotatedNode {
    let match_status = status_for(&outcome.id, branch_active, taken);
    let details = if match_status.is_taken() {
        let wanted = outcome.match_action.to_lowercase();
        ctx.details()
            .iter()
            .filter(|tagged| {
                let detail = tagged.detail;
                detail.operation.to_lowercase().contains(&wanted)
                    || detail
                        .output
                        .get("action")
                        .and_then(Value::as_str)
                        .map(|a| a.to_lowercase().contains(&wanted))
                        .unwrap_or(false)
            })
            .map(|tagged| tagged.detail.clone())
            .collect()
    } else {
        Vec::new()
    };

    AnnotatedNode::Outcome(AnnotatedOutcome {
        id: outcome.id.clone(),
        display_name: outcome.display_name.clone(),
        status: outcome.status,
        match_action: outcome.match_action.clone(),
        match_status,
        details,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
