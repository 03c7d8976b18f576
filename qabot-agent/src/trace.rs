//! Run trace: the ordered record of what happened during a run

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    /// The requirement as received
    Input,
    /// Free text the model produced alongside (or instead of) tool calls
    Thought,
    /// A tool invocation, with its arguments
    Action,
    /// A tool result, or the reason a call was rejected
    Observation,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Input => "INPUT",
            StepKind::Thought => "THOUGHT",
            StepKind::Action => "ACTION",
            StepKind::Observation => "OBSERVATION",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    pub kind: StepKind,
    pub content: String,
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]\n{}", self.kind, self.content)
    }
}
