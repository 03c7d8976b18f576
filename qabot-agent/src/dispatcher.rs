//! Tool dispatcher for model-driven runs.
//!
//! A small state machine over the three tools. Calls that do not match the
//! next expected tool are refused without running anything, and the refusal
//! goes back to the model as an observation.

use qabot_core::{
    decode_args, ensure_not_empty, format_report, generate_test_cases, parse_requirement, Error,
    GenerateArgs, GenerateObservation, ParseArgs, ParseObservation, ParsedRequirement, Report,
    Result, TestCase, Tool, ToolCall,
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitingParse,
    Parsed,
    Generated,
    Done,
}

impl Stage {
    /// The only tool allowed in this stage
    pub fn next_tool(&self) -> Option<Tool> {
        match self {
            Stage::AwaitingParse => Some(Tool::ParseRequirement),
            Stage::Parsed => Some(Tool::GenerateTestCases),
            Stage::Generated => Some(Tool::FormatReport),
            Stage::Done => None,
        }
    }
}

/// Result of one dispatched call, ready to hand back to the model
#[derive(Debug, Clone)]
pub struct Observation {
    pub tool: Option<Tool>,
    pub content: String,
    pub accepted: bool,
}

#[derive(Debug)]
pub struct Dispatcher {
    stage: Stage,
    suggestion: Option<ParsedRequirement>,
    parsed: Option<ParsedRequirement>,
    cases: Vec<TestCase>,
    report: Option<Report>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            stage: Stage::AwaitingParse,
            suggestion: None,
            parsed: None,
            cases: Vec::new(),
            report: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// What the rule-based parser detected during the parse step, if anything
    pub fn suggestion(&self) -> Option<&ParsedRequirement> {
        self.suggestion.as_ref()
    }

    /// The pair the model passed to the generator
    pub fn parsed(&self) -> Option<&ParsedRequirement> {
        self.parsed.as_ref()
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn into_parts(self) -> (Option<ParsedRequirement>, Vec<TestCase>, Option<Report>) {
        (self.parsed, self.cases, self.report)
    }

    /// Run one call. Never fails: rejections become error observations.
    pub fn dispatch(&mut self, call: &ToolCall) -> Observation {
        match self.try_dispatch(call) {
            Ok((tool, content)) => {
                debug!(tool = %tool, stage = ?self.stage, "tool call accepted");
                Observation {
                    tool: Some(tool),
                    content,
                    accepted: true,
                }
            }
            Err(err) => {
                warn!(tool = %call.name, reason = err.message(), "tool call rejected");
                Observation {
                    tool: Tool::from_name(&call.name),
                    content: serde_json::json!({ "error": err.message() }).to_string(),
                    accepted: false,
                }
            }
        }
    }

    fn try_dispatch(&mut self, call: &ToolCall) -> Result<(Tool, String)> {
        let tool = Tool::from_name(&call.name).ok_or_else(|| {
            Error::tool_rejected(
                call.name.as_str(),
                format!(
                    "unknown tool '{}'; available: {}",
                    call.name,
                    Tool::ALL.map(|t| t.name()).join(", ")
                ),
            )
        })?;
        self.check_order(tool)?;

        let content = match tool {
            Tool::ParseRequirement => {
                let args: ParseArgs = decode_args(tool, &call.arguments)?;
                let text = ensure_not_empty(&args.requirement)
                    .map_err(|e| Error::tool_rejected(tool.name(), e.message()))?;

                self.suggestion = parse_requirement(text).ok();
                self.stage = Stage::Parsed;
                to_json(&ParseObservation::new(text, self.suggestion.as_ref()))
            }
            Tool::GenerateTestCases => {
                let args: GenerateArgs = decode_args(tool, &call.arguments)?;
                let parsed = args.into_parsed()?;

                self.cases = generate_test_cases(&parsed);
                self.parsed = Some(parsed);
                self.stage = Stage::Generated;
                to_json(&GenerateObservation::new(&self.cases))
            }
            Tool::FormatReport => {
                let report = format_report(&self.cases);
                let content = report.as_str().to_string();
                self.report = Some(report);
                self.stage = Stage::Done;
                content
            }
        };

        Ok((tool, content))
    }

    fn check_order(&self, tool: Tool) -> Result<()> {
        match self.stage.next_tool() {
            Some(next) if next == tool => Ok(()),
            Some(next) if tool.position() < next.position() => Err(Error::tool_rejected(
                tool.name(),
                format!("{} already ran; call {} next", tool, next),
            )),
            Some(next) => Err(Error::tool_rejected(
                tool.name(),
                format!("{} called out of order; call {} first", tool, next),
            )),
            None => Err(Error::tool_rejected(
                tool.name(),
                "the report is complete; no further tool calls are accepted",
            )),
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn parse_call() -> ToolCall {
        call(
            "requirement_structure_tool",
            serde_json::json!({ "requirement": "Users must be able to reset their password via email link." }),
        )
    }

    fn generate_call() -> ToolCall {
        call(
            "generic_test_generator",
            serde_json::json!({ "action": "reset password", "expected_outcome": "email link sent" }),
        )
    }

    #[test]
    fn test_happy_path() {
        let mut d = Dispatcher::new();

        let obs = d.dispatch(&parse_call());
        assert!(obs.accepted);
        let json: serde_json::Value = serde_json::from_str(&obs.content).unwrap();
        assert_eq!(json["analyzed_length"], 11);
        assert_eq!(json["action"], "reset password");
        assert_eq!(d.stage(), Stage::Parsed);

        assert!(d.dispatch(&generate_call()).accepted);
        assert_eq!(d.test_cases().len(), 4);

        let obs = d.dispatch(&call("report_formatter", serde_json::json!({})));
        assert!(obs.accepted);
        assert!(d.is_done());
        assert!(obs.content.starts_with("--- QA AUTOMATION REPORT ---\nTC_001: POSITIVE"));
        assert_eq!(d.report().map(Report::as_str), Some(obs.content.as_str()));
    }

    #[test]
    fn test_unknown_tool_is_rejected() {
        let mut d = Dispatcher::new();
        let obs = d.dispatch(&call("shell_exec", serde_json::json!({ "cmd": "ls" })));
        assert!(!obs.accepted);
        assert!(obs.tool.is_none());
        assert!(obs.content.contains("unknown tool 'shell_exec'"));
        assert_eq!(d.stage(), Stage::AwaitingParse);
    }

    #[test]
    fn test_out_of_order_is_rejected() {
        let mut d = Dispatcher::new();
        let obs = d.dispatch(&call("report_formatter", serde_json::json!({})));
        assert!(!obs.accepted);
        assert!(obs.content.contains("call requirement_structure_tool first"));
        assert!(d.report().is_none());
    }

    #[test]
    fn test_repeat_is_rejected() {
        let mut d = Dispatcher::new();
        assert!(d.dispatch(&parse_call()).accepted);
        let obs = d.dispatch(&parse_call());
        assert!(!obs.accepted);
        assert!(obs.content.contains("already ran"));
        assert_eq!(d.stage(), Stage::Parsed);
    }

    #[test]
    fn test_calls_after_done_are_rejected() {
        let mut d = Dispatcher::new();
        d.dispatch(&parse_call());
        d.dispatch(&generate_call());
        d.dispatch(&call("report_formatter", serde_json::json!({})));

        let obs = d.dispatch(&call("report_formatter", serde_json::json!({})));
        assert!(!obs.accepted);
        assert!(obs.content.contains("report is complete"));
    }

    #[test]
    fn test_invalid_generate_args_keep_stage() {
        let mut d = Dispatcher::new();
        d.dispatch(&parse_call());

        let obs = d.dispatch(&call(
            "generic_test_generator",
            serde_json::json!({ "action": "reset password", "expected_outcome": "" }),
        ));
        assert!(!obs.accepted);
        assert_eq!(d.stage(), Stage::Parsed);

        let obs = d.dispatch(&call("generic_test_generator", serde_json::json!({ "action": 3 })));
        assert!(!obs.accepted);
        assert!(obs.content.contains("invalid arguments"));

        assert!(d.dispatch(&generate_call()).accepted);
    }

    #[test]
    fn test_parse_without_detectable_action_still_advances() {
        let mut d = Dispatcher::new();
        let obs = d.dispatch(&call(
            "requirement_structure_tool",
            serde_json::json!({ "requirement": "Password reset over email" }),
        ));
        assert!(obs.accepted);
        assert!(d.suggestion().is_none());
        let json: serde_json::Value = serde_json::from_str(&obs.content).unwrap();
        assert!(json["note"].is_string());
        assert_eq!(d.stage(), Stage::Parsed);
    }

    #[test]
    fn test_blank_requirement_is_rejected() {
        let mut d = Dispatcher::new();
        let obs = d.dispatch(&call(
            "requirement_structure_tool",
            serde_json::json!({ "requirement": "   " }),
        ));
        assert!(!obs.accepted);
        assert_eq!(d.stage(), Stage::AwaitingParse);
    }
}
