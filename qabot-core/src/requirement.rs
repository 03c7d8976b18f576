//! Requirement parsing: free text -> `{action, expected_outcome}`
//!
//! Two strategies share the same output type:
//! - [`parse_requirement`]: rule-based, no network
//! - [`extraction_prompt`] + [`parse_model_reply`]: delegated to a model,
//!   the caller owns the actual completion call

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Status line reported by the parse tool, kept from the original tool output
pub const PARSED_STATUS: &str = "Requirement Received & Parsed";

/// Modal marker followed by the action clause. The clause ends at a sentence
/// terminator followed by whitespace or end of input, so `9.99` stays whole.
static MODAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:must|should|shall|will|can|needs?\s+to|wants?\s+to|(?:is|are)\s+able\s+to)(?:\s+be\s+able\s+to)?\s+(?P<clause>[^.!?;]+(?:[.!?;]+[^\s.!?;][^.!?;]*)*)",
    )
    .expect("modal pattern is valid")
});

/// Leftmost outcome connector inside an action clause.
static CONNECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)\s+(?:(?P<purpose>so\s+that|in\s+order\s+to)|(?P<observe>and\s+(?:then\s+)?(?:see|receive|get|view))|(?P<channel>via|through))\s+(?P<rest>.+)$",
    )
    .expect("connector pattern is valid")
});

const FILLER_WORDS: &[&str] = &[
    "the", "a", "an", "their", "his", "her", "its", "my", "your", "our",
];

/// The structured form of a requirement. Both fields are always non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRequirement {
    pub action: String,
    pub expected_outcome: String,
}

impl ParsedRequirement {
    /// Build from raw phrases; trims both and rejects empties.
    pub fn new(action: impl Into<String>, expected_outcome: impl Into<String>) -> Result<Self> {
        let action = action.into().trim().to_string();
        let expected_outcome = expected_outcome.into().trim().to_string();

        if action.is_empty() {
            return Err(Error::parse_failed("action phrase is empty"));
        }
        if expected_outcome.is_empty() {
            return Err(Error::parse_failed("expected outcome is empty")
                .with_context("action", action));
        }

        Ok(Self {
            action,
            expected_outcome,
        })
    }
}

/// Reject blank input before any parsing strategy runs
pub fn ensure_not_empty(requirement: &str) -> Result<&str> {
    let trimmed = requirement.trim();
    if trimmed.is_empty() {
        return Err(Error::parse_failed("requirement is empty").with_operation("requirement::parse"));
    }
    Ok(trimmed)
}

/// Number of whitespace-separated words, as reported by the parse tool
pub fn word_count(requirement: &str) -> usize {
    requirement.split_whitespace().count()
}

/// Rule-based extraction.
///
/// # Example
///
/// ```rust
/// use qabot_core::parse_requirement;
///
/// let parsed = parse_requirement("Users must be able to reset their password via email link.").unwrap();
/// assert_eq!(parsed.action, "reset password");
/// assert_eq!(parsed.expected_outcome, "email link sent");
/// ```
pub fn parse_requirement(requirement: &str) -> Result<ParsedRequirement> {
    let text = ensure_not_empty(requirement)?;

    let clause = MODAL
        .captures(text)
        .and_then(|caps| caps.name("clause"))
        .map(|m| m.as_str().trim())
        .ok_or_else(|| {
            Error::parse_failed("no action phrase found")
                .with_operation("requirement::parse")
                .with_context("input", text)
        })?;

    let (action_part, outcome) = match CONNECTOR.captures(clause) {
        Some(caps) => {
            let start = caps.get(0).map_or(clause.len(), |m| m.start());
            let rest = clean_phrase(caps.name("rest").map_or("", |m| m.as_str()));
            let action_part = &clause[..start];
            let outcome = if rest.is_empty() {
                None
            } else if caps.name("channel").is_some() {
                Some(format!("{} sent", rest))
            } else {
                Some(rest)
            };
            (action_part, outcome)
        }
        None => (clause, None),
    };

    let action = clean_phrase(action_part);
    if action.is_empty() {
        return Err(Error::parse_failed("no action phrase found")
            .with_operation("requirement::parse")
            .with_context("input", text));
    }

    let expected_outcome = outcome.unwrap_or_else(|| format!("{} succeeds", action));
    ParsedRequirement::new(action, expected_outcome)
}

/// Drop filler words and stray punctuation, collapse whitespace
fn clean_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| matches!(c, ',' | ':' | '"' | '(' | ')')))
        .filter(|w| !w.is_empty())
        .filter(|w| !FILLER_WORDS.iter().any(|f| f.eq_ignore_ascii_case(w)))
        .collect::<Vec<_>>()
        .join(" ")
}

// =============================================================================
// Model-backed extraction
// =============================================================================

/// Prompt asking a model for the structured pair as bare JSON
pub fn extraction_prompt(requirement: &str) -> String {
    format!(
        r#"Extract the primary user action and the expected observable outcome from this software requirement.

Requirement: {requirement}

Rules:
- "action" is a short verb phrase (2-5 words), lowercase, without articles or possessives.
- "expected_outcome" is a short phrase describing what the user observes on success.
- If the text describes no user action, return empty strings.

Return ONLY a JSON object: {{"action": "...", "expected_outcome": "..."}}. No markdown, no explanation."#
    )
}

/// Decode a model reply into a `ParsedRequirement`.
///
/// Markdown fences are tolerated. Undecodable JSON is an upstream
/// (`SerializationFailed`) error; empty fields are a `ParseFailed`.
pub fn parse_model_reply(content: &str) -> Result<ParsedRequirement> {
    let json_str = strip_code_fences(content);

    let parsed: ModelExtraction = serde_json::from_str(json_str).map_err(|e| {
        Error::new(
            crate::ErrorKind::SerializationFailed,
            format!("model reply is not a valid extraction: {}", e),
        )
        .permanent()
        .with_operation("requirement::parse_model_reply")
        .with_context("reply", json_str)
        .set_source(e)
    })?;

    ParsedRequirement::new(parsed.action, parsed.expected_outcome)
        .map_err(|e| e.with_operation("requirement::parse_model_reply"))
}

#[derive(Deserialize)]
struct ModelExtraction {
    #[serde(default)]
    action: String,
    #[serde(default)]
    expected_outcome: String,
}

/// Extract the body of a ```json or ``` fenced block, else the trimmed text
pub fn strip_code_fences(content: &str) -> &str {
    if content.contains("```json") {
        content
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .unwrap_or(content)
    } else if content.contains("```") {
        content
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .unwrap_or(content)
    } else {
        content.trim()
    }
}
