use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// MatchStatus
// ---------------------------------------------------------------------------

/// How a template node relates to one recorded execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Taken,
    Current,
    NotTaken,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Taken => "taken",
            MatchStatus::Current => "current",
            MatchStatus::NotTaken => "not_taken",
        }
    }

    /// `Taken` and `Current` both mean execution passed through the node.
    pub fn is_taken(self) -> bool {
        matches!(self, MatchStatus::Taken | MatchStatus::Current)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OutcomeStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Error => "error",
            OutcomeStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutcomeStatus {
    type Err = crate::error::TracemapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(OutcomeStatus::Success),
            "error" => Ok(OutcomeStatus::Error),
            "skipped" => Ok(OutcomeStatus::Skipped),
            _ => Err(crate::error::TracemapError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TraceStatus
// ---------------------------------------------------------------------------

/// Final status recorded by the trace-capture subsystem.
///
/// Unrecognised values deserialize as `Other` so an unexpected status never
/// fails a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Completed,
    Failed,
    Partial,
    Running,
    #[default]
    #[serde(other)]
    Other,
}

impl TraceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceStatus::Completed => "completed",
            TraceStatus::Failed => "failed",
            TraceStatus::Partial => "partial",
            TraceStatus::Running => "running",
            TraceStatus::Other => "other",
        }
    }
}

impl fmt::Display for TraceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Step,
    Decision,
    Outcome,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Step => "step",
            NodeKind::Decision => "decision",
            NodeKind::Outcome => "outcome",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_status_serializes_snake_case() {
        let json = serde_json::to_string(&MatchStatus::NotTaken).unwrap();
        assert_eq!(json, "\"not_taken\"");
        assert!(MatchStatus::Current.is_taken());
        assert!(!MatchStatus::NotTaken.is_taken());
    }

    #[test]
    fn unknown_trace_status_is_other() {
        let status: TraceStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, TraceStatus::Other);
        let status: TraceStatus = serde_json::from_str("\"partial\"").unwrap();
        assert_eq!(status, TraceStatus::Partial);
    }

    #[test]
    fn outcome_status_from_str() {
        assert_eq!("skipped".parse::<OutcomeStatus>().unwrap(), OutcomeStatus::Skipped);
        assert!("done".parse::<OutcomeStatus>().is_err());
    }
}
