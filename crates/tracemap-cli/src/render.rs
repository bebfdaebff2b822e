use std::fmt::Write;
use tracemap_core::reconcile::AnnotatedNode;
use tracemap_core::template::Node;
use tracemap_core::types::MatchStatus;

const INDENT: &str = "  ";

fn marker(status: MatchStatus) -> char {
    match status {
        MatchStatus::Current => '●',
        MatchStatus::Taken => '✓',
        MatchStatus::NotTaken => '·',
    }
}

// ---------------------------------------------------------------------------
// Template tree
// ---------------------------------------------------------------------------

pub fn template_tree(root: &Node) -> String {
    let mut out = String::new();
    write_template(&mut out, root, 0);
    out
}

fn write_template(out: &mut String, node: &Node, depth: usize) {
    let pad = INDENT.repeat(depth);
    match node {
        Node::Step(step) => {
            let key = step
                .match_key
                .as_deref()
                .or(step.match_output_rule.as_ref().map(|r| r.step_name.as_str()));
            let _ = write!(out, "{pad}step {} ({})", step.display_name, step.id);
            if let Some(key) = key {
                let _ = write!(out, " <- {key}");
            }
            out.push('\n');
            for child in &step.children {
                write_template(out, child, depth + 1);
            }
        }
        Node::Decision(decision) => {
            let _ = writeln!(out, "{pad}decision {} ({})", decision.display_name, decision.id);
            for branch in &decision.branches {
                let _ = writeln!(out, "{pad}{INDENT}[{}]", branch.label);
                write_template(out, &branch.node, depth + 2);
            }
        }
        Node::Outcome(outcome) => {
            let _ = writeln!(
                out,
                "{pad}outcome {} ({}) = {} [{}]",
                outcome.display_name,
                outcome.id,
                outcome.match_action,
                outcome.status.as_str()
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Annotated tree
// ---------------------------------------------------------------------------

/// `●` current, `✓` taken, `·` not taken.
pub fn annotated_tree(root: &AnnotatedNode) -> String {
    let mut out = String::new();
    write_annotated(&mut out, root, 0);
    out
}

fn write_annotated(out: &mut String, node: &AnnotatedNode, depth: usize) {
    let pad = INDENT.repeat(depth);
    let _ = writeln!(
        out,
        "{pad}{} {} ({})",
        marker(node.match_status()),
        node.display_name(),
        node.id()
    );
    match node {
        AnnotatedNode::Step(step) => {
            for child in &step.children {
                write_annotated(out, child, depth + 1);
            }
        }
        AnnotatedNode::Decision(decision) => {
            for branch in &decision.branches {
                let status = if branch.taken {
                    MatchStatus::Taken
                } else {
                    MatchStatus::NotTaken
                };
                let _ = writeln!(out, "{pad}{INDENT}{} [{}]", marker(status), branch.label);
                write_annotated(out, &branch.node, depth + 2);
            }
        }
        AnnotatedNode::Outcome(_) => {}
    }
}
