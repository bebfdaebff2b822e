use crate::error::{Result, TracemapError};
use crate::paths::validate_identifier;
use crate::types::{NodeKind, OutcomeStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// Matching rules
// ---------------------------------------------------------------------------

/// Names a step and a field of its recorded output to test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRule {
    pub step_name: String,
    /// Plain key or dotted path (`contact.created`).
    pub output_field: String,
    /// When absent the field only has to be truthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<Value>,
}

/// How a decision picks its active branch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationRule {
    /// Compare each branch's `match_value` with a step's output field.
    StepOutput { step: String, field: String },
    /// Compare each branch's `match_value` with the trace's result action.
    TraceResult,
    /// Every branch inherits the parent's activity.
    #[default]
    #[serde(rename = "none")]
    Inherit,
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNode {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_output_rule: Option<OutputRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_trace_action: Option<String>,
    pub node: Box<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionNode {
    pub id: String,
    pub display_name: String,
    /// Human-readable description of what is being decided.
    #[serde(default)]
    pub condition: String,
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub activation: ActivationRule,
    /// A "virtual" decision that also stands for an executed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_output_rule: Option<OutputRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeNode {
    pub id: String,
    pub display_name: String,
    pub status: OutcomeStatus,
    pub match_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Step(StepNode),
    Decision(DecisionNode),
    Outcome(OutcomeNode),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Step(n) => &n.id,
            Node::Decision(n) => &n.id,
            Node::Outcome(n) => &n.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Node::Step(n) => &n.display_name,
            Node::Decision(n) => &n.display_name,
            Node::Outcome(n) => &n.display_name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Step(_) => NodeKind::Step,
            Node::Decision(_) => NodeKind::Decision,
            Node::Outcome(_) => NodeKind::Outcome,
        }
    }

    /// Direct descendants in declaration order; a decision's are its branch targets.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Step(n) => n.children.iter().collect(),
            Node::Decision(n) => n.branches.iter().map(|b| b.node.as_ref()).collect(),
            Node::Outcome(_) => Vec::new(),
        }
    }
}

/// Pre-order, declaration-order traversal.
pub struct Walk<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().into_iter().rev());
        Some(node)
    }
}

// ---------------------------------------------------------------------------
// WorkflowTemplate
// ---------------------------------------------------------------------------

/// On-disk shape of a template, before invariants are checked.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSpec {
    pub id: String,
    pub name: String,
    pub trigger_key: String,
    #[serde(default)]
    pub description: Option<String>,
    pub root: Node,
}

/// One automation's possible control flow. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemplateSpec")]
pub struct WorkflowTemplate {
    id: String,
    name: String,
    trigger_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    root: Node,
}

impl TryFrom<TemplateSpec> for WorkflowTemplate {
    type Error = TracemapError;

    fn try_from(spec: TemplateSpec) -> Result<Self> {
        let template = WorkflowTemplate {
            id: spec.id,
            name: spec.name,
            trigger_key: spec.trigger_key,
            description: spec.description,
            root: spec.root,
        };
        template.validate()?;
        Ok(template)
    }
}

impl WorkflowTemplate {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        trigger_key: impl Into<String>,
        root: Node,
    ) -> Result<Self> {
        WorkflowTemplate::try_from(TemplateSpec {
            id: id.into(),
            name: name.into(),
            trigger_key: trigger_key.into(),
            description: None,
            root,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trigger_key(&self) -> &str {
        &self.trigger_key
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn walk(&self) -> Walk<'_> {
        Walk {
            stack: vec![&self.root],
        }
    }

    pub fn node_count(&self) -> usize {
        self.walk().count()
    }

    pub fn find(&self, id: &str) -> Option<&Node> {
        self.walk().find(|n| n.id() == id)
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Parse a YAML template. `origin` names the source in error messages.
    pub fn from_yaml_str(src: &str, origin: &str) -> Result<Self> {
        let spec: TemplateSpec = serde_yaml::from_str(src)
            .map_err(|e| TracemapError::template(origin, e.to_string()))?;
        WorkflowTemplate::try_from(spec)
    }

    pub fn from_json_str(src: &str, origin: &str) -> Result<Self> {
        let spec: TemplateSpec = serde_json::from_str(src)
            .map_err(|e| TracemapError::template(origin, e.to_string()))?;
        WorkflowTemplate::try_from(spec)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let origin = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => WorkflowTemplate::from_json_str(&data, &origin),
            _ => WorkflowTemplate::from_yaml_str(&data, &origin),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| TracemapError::template(&self.id, reason);

        validate_identifier(&self.id).map_err(|_| invalid(format!("bad template id '{}'", self.id)))?;
        validate_identifier(&self.trigger_key)
            .map_err(|_| invalid(format!("bad trigger key '{}'", self.trigger_key)))?;

        let mut seen = HashSet::new();
        for node in self.walk() {
            let id = node.id();
            if id.trim().is_empty() {
                return Err(invalid("empty node id".to_string()));
            }
            if !seen.insert(id) {
                return Err(invalid(format!("duplicate node id '{id}'")));
            }

            match node {
                Node::Step(step) => {
                    if let Some(rule) = &step.match_output_rule {
                        check_output_rule(rule).map_err(|r| invalid(format!("node '{id}': {r}")))?;
                    }
                    let chained = step
                        .children
                        .iter()
                        .filter(|c| !matches!(c, Node::Decision(_)))
                        .count();
                    if chained > 1 {
                        return Err(invalid(format!(
                            "step '{id}' has {chained} non-decision children; steps form a linear chain"
                        )));
                    }
                }
                Node::Decision(decision) => {
                    if decision.branches.is_empty() {
                        return Err(invalid(format!("decision '{id}' has no branches")));
                    }
                    if let ActivationRule::StepOutput { step, field } = &decision.activation {
                        if step.trim().is_empty() || field.trim().is_empty() {
                            return Err(invalid(format!(
                                "decision '{id}' activation needs both step and field"
                            )));
                        }
                    }
                    if let Some(rule) = &decision.match_output_rule {
                        check_output_rule(rule).map_err(|r| invalid(format!("node '{id}': {r}")))?;
                    }
                }
                Node::Outcome(outcome) => {
                    if outcome.match_action.trim().is_empty() {
                        return Err(invalid(format!("outcome '{id}' has an empty match_action")));
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_output_rule(rule: &OutputRule) -> std::result::Result<(), String> {
    if rule.step_name.trim().is_empty() {
        return Err("output rule has an empty step_name".to_string());
    }
    if rule.output_field.trim().is_empty() {
        return Err("output rule has an empty output_field".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BOOKING: &str = r#"
id: booking
name: Booking created
trigger_key: booking_created
root:
  type: step
  id: webhook
  display_name: Webhook received
  layer: trigger
  match_key: "hooks:webhook"
  children:
    - type: decision
      id: has_contact
      display_name: Contact exists?
      condition: contact lookup returned a record
      activation:
        kind: step_output
        step: lookup
        field: found
      branches:
        - label: "yes"
          match_value: true
          node:
            type: outcome
            id: synced
            display_name: Synced
            status: success
            match_action: contact_synced
        - label: "no"
          match_value: false
          node:
            type: outcome
            id: skipped
            display_name: Skipped
            status: skipped
            match_action: skipped
"#;

    #[test]
    fn parses_tagged_nodes() {
        let t = WorkflowTemplate::from_yaml_str(BOOKING, "booking.yaml").unwrap();
        assert_eq!(t.id(), "booking");
        assert_eq!(t.trigger_key(), "booking_created");
        assert_eq!(t.node_count(), 4);
        assert_eq!(t.root().kind(), NodeKind::Step);

        let Some(Node::Decision(d)) = t.find("has_contact") else {
            panic!("expected decision");
        };
        assert_eq!(
            d.activation,
            ActivationRule::StepOutput {
                step: "lookup".to_string(),
                field: "found".to_string()
            }
        );
        assert_eq!(d.branches[0].match_value, Some(Value::Bool(true)));
    }

    #[test]
    fn walk_is_declaration_order() {
        let t = WorkflowTemplate::from_yaml_str(BOOKING, "booking.yaml").unwrap();
        let ids: Vec<_> = t.walk().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["webhook", "has_contact", "synced", "skipped"]);
    }

    #[test]
    fn activation_defaults_to_inherit() {
        let yaml = r#"
id: t
name: T
trigger_key: t
root:
  type: decision
  id: d
  display_name: D
  branches:
    - label: a
      node: { type: outcome, id: a, display_name: A, status: success, match_action: a }
"#;
        let t = WorkflowTemplate::from_yaml_str(yaml, "t.yaml").unwrap();
        let Node::Decision(d) = t.root() else {
            panic!("expected decision root");
        };
        assert_eq!(d.activation, ActivationRule::Inherit);
    }

    #[test]
    fn duplicate_node_ids_rejected() {
        let yaml = BOOKING.replace("id: skipped", "id: synced");
        let err = WorkflowTemplate::from_yaml_str(&yaml, "booking.yaml").unwrap_err();
        assert!(matches!(err, TracemapError::TemplateInvalid { .. }));
        assert!(err.to_string().contains("duplicate node id 'synced'"));
    }

    #[test]
    fn node_ids_only_need_to_be_unique() {
        let yaml = BOOKING.replace("id: skipped", "id: \"svc:skip step\"");
        let t = WorkflowTemplate::from_yaml_str(&yaml, "booking.yaml").unwrap();
        assert!(t.find("svc:skip step").is_some());

        let blank = BOOKING.replace("id: skipped", "id: \" \"");
        let err = WorkflowTemplate::from_yaml_str(&blank, "booking.yaml").unwrap_err();
        assert!(err.to_string().contains("empty node id"));
    }

    #[test]
    fn branch_without_node_rejected() {
        let yaml = r#"
id: t
name: T
trigger_key: t
root:
  type: decision
  id: d
  display_name: D
  branches:
    - label: orphan
"#;
        let err = WorkflowTemplate::from_yaml_str(yaml, "t.yaml").unwrap_err();
        match err {
            TracemapError::TemplateInvalid { template, reason } => {
                assert_eq!(template, "t.yaml");
                assert!(reason.contains("node"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decision_without_branches_rejected() {
        let root = Node::Decision(DecisionNode {
            id: "d".to_string(),
            display_name: "D".to_string(),
            condition: String::new(),
            branches: vec![],
            activation: ActivationRule::TraceResult,
            match_key: None,
            match_output_rule: None,
        });
        let err = WorkflowTemplate::new("t", "T", "t", root).unwrap_err();
        assert!(err.to_string().contains("no branches"));
    }

    #[test]
    fn step_fan_out_rejected() {
        let leaf = |id: &str| {
            Node::Outcome(OutcomeNode {
                id: id.to_string(),
                display_name: id.to_string(),
                status: OutcomeStatus::Success,
                match_action: id.to_string(),
            })
        };
        let root = Node::Step(StepNode {
            id: "s".to_string(),
            display_name: "S".to_string(),
            layer: None,
            match_key: Some("s".to_string()),
            match_output_rule: None,
            children: vec![leaf("a"), leaf("b")],
        });
        let err = WorkflowTemplate::new("t", "T", "t", root).unwrap_err();
        assert!(err.to_string().contains("linear chain"));
    }

    #[test]
    fn empty_match_action_rejected() {
        let yaml = BOOKING.replace("match_action: skipped", "match_action: \"\"");
        assert!(WorkflowTemplate::from_yaml_str(&yaml, "booking.yaml").is_err());
    }

    #[test]
    fn serde_try_from_enforces_invariants() {
        let yaml = BOOKING.replace("id: skipped", "id: synced");
        let parsed: std::result::Result<WorkflowTemplate, _> = serde_yaml::from_str(&yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn load_json_and_yaml_files() {
        let dir = TempDir::new().unwrap();
        let yaml_path = dir.path().join("booking.yaml");
        std::fs::write(&yaml_path, BOOKING).unwrap();
        let from_yaml = WorkflowTemplate::load(&yaml_path).unwrap();

        let json_path = dir.path().join("booking.json");
        std::fs::write(&json_path, serde_json::to_string(&from_yaml).unwrap()).unwrap();
        let from_json = WorkflowTemplate::load(&json_path).unwrap();

        assert_eq!(from_yaml, from_json);
    }
}
