//! The fixed set of tools a model may call, with their declared contracts.

use crate::provider::ToolDefinition;
use crate::{Error, ParsedRequirement, Result, TestCase, PARSED_STATUS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three capabilities, in the only order they may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    ParseRequirement,
    GenerateTestCases,
    FormatReport,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::ParseRequirement, Tool::GenerateTestCases, Tool::FormatReport];

    /// Wire name the model uses
    pub fn name(&self) -> &'static str {
        match self {
            Tool::ParseRequirement => "requirement_structure_tool",
            Tool::GenerateTestCases => "generic_test_generator",
            Tool::FormatReport => "report_formatter",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    /// 0-based position in the pipeline
    pub fn position(&self) -> usize {
        match self {
            Tool::ParseRequirement => 0,
            Tool::GenerateTestCases => 1,
            Tool::FormatReport => 2,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        match self {
            Tool::ParseRequirement => ToolDefinition::new(
                self.name(),
                "Takes the raw requirement text and confirms understanding. \
                 Returns the word count and, when it can detect them, a suggested action and expected outcome.",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "requirement": { "type": "string", "description": "The raw requirement text" }
                },
                "required": ["requirement"]
            })),
            Tool::GenerateTestCases => ToolDefinition::new(
                self.name(),
                "Generates the POSITIVE, NEGATIVE, BOUNDARY and SECURITY test cases for an action and its expected outcome.",
            )
            .with_parameters(serde_json::json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "description": "Short verb phrase, e.g. 'reset password'" },
                    "expected_outcome": { "type": "string", "description": "What the user observes on success" }
                },
                "required": ["action", "expected_outcome"]
            })),
            Tool::FormatReport => ToolDefinition::new(
                self.name(),
                "Formats the generated test cases into the final QA report. Call it last; the report is the final answer.",
            ),
        }
    }

    /// Contracts for all tools, in pipeline order
    pub fn definitions() -> Vec<ToolDefinition> {
        Tool::ALL.iter().map(Tool::definition).collect()
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ParseArgs {
    pub requirement: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateArgs {
    pub action: String,
    pub expected_outcome: String,
}

impl GenerateArgs {
    pub fn into_parsed(self) -> Result<ParsedRequirement> {
        ParsedRequirement::new(self.action, self.expected_outcome)
            .map_err(|e| Error::tool_rejected(Tool::GenerateTestCases.name(), e.message()))
    }
}

/// Decode a tool call's raw JSON arguments against the tool's contract
pub fn decode_args<T: serde::de::DeserializeOwned>(tool: Tool, arguments: &str) -> Result<T> {
    let raw = if arguments.trim().is_empty() { "{}" } else { arguments };
    serde_json::from_str(raw).map_err(|e| {
        Error::tool_rejected(tool.name(), format!("invalid arguments: {}", e))
            .with_context("arguments", arguments)
    })
}

// =============================================================================
// Observations
// =============================================================================

/// What the parse tool reports back to the model
#[derive(Debug, Clone, Serialize)]
pub struct ParseObservation {
    pub analyzed_length: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ParseObservation {
    pub fn new(requirement: &str, parsed: Option<&ParsedRequirement>) -> Self {
        Self {
            analyzed_length: crate::word_count(requirement),
            status: PARSED_STATUS,
            action: parsed.map(|p| p.action.clone()),
            expected_outcome: parsed.map(|p| p.expected_outcome.clone()),
            note: parsed
                .is_none()
                .then(|| "no action phrase detected; extract action and expected_outcome yourself".to_string()),
        }
    }
}

/// What the generator reports back to the model
#[derive(Debug, Clone, Serialize)]
pub struct GenerateObservation {
    pub test_cases: Vec<String>,
}

impl GenerateObservation {
    pub fn new(cases: &[TestCase]) -> Self {
        Self {
            test_cases: cases
                .iter()
                .map(|c| format!("{}: {}", c.category, c.description))
                .collect(),
        }
    }
}
