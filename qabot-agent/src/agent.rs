//! Agent implementation - sequences parse -> generate -> format

use crate::dispatcher::Dispatcher;
use crate::trace::{StepKind, TraceStep};
use qabot_core::{
    ensure_not_empty, extraction_prompt, format_report, generate_test_cases, parse_model_reply,
    parse_requirement, AgentSchema, ChatMessage, CompletionRequest, CompletionResponse, Error,
    ErrorKind, LlmProvider, ParsedRequirement, Report, Result, TestCase, Tool, ToolChoice,
    UsageTracker,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome used by direct generation when none is given
pub const DEFAULT_OUTCOME: &str = "Success";

/// How the run is sequenced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Fixed parse -> generate -> format pipeline
    #[default]
    Pipeline,
    /// The model picks tool calls, bounded by the dispatcher and `max_steps`
    Agent,
}

/// How the pipeline extracts `{action, expected_outcome}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserMode {
    /// Rule-based, no network
    Heuristic,
    /// One model call returning JSON
    #[default]
    Model,
}

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub mode: Mode,
    pub parser: ParserMode,
    /// Hard cap on model turns in agent mode
    pub max_steps: usize,
    /// Extra attempts for retryable model errors
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    pub retry_backoff_ms: u64,
    /// Upper bound on any single retry delay, including a server's Retry-After
    pub max_backoff_ms: u64,
    pub temperature: f32,
    /// Overrides the provider's default model
    pub model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Pipeline,
            parser: ParserMode::Model,
            max_steps: 6,
            max_retries: 0,
            retry_backoff_ms: 500,
            max_backoff_ms: 30_000,
            temperature: 0.0,
            model: None,
        }
    }
}

/// Result from a run
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub report: Report,
    /// The pair the test cases were built from
    pub parsed: Option<ParsedRequirement>,
    pub test_cases: Vec<TestCase>,
    /// Model turns used (0 for offline runs)
    pub model_turns: usize,
}

/// The orchestrator. Holds an optional provider: without one, only the
/// heuristic pipeline and direct generation are available.
pub struct Agent<P> {
    provider: Option<P>,
    config: AgentConfig,
    trace: Vec<TraceStep>,
    usage: UsageTracker,
}

impl<P: LlmProvider> Agent<P> {
    pub fn new(provider: P, config: AgentConfig) -> Self {
        Self {
            provider: Some(provider),
            config,
            trace: Vec::new(),
            usage: UsageTracker::new(),
        }
    }

    /// An agent that never talks to a model
    pub fn offline(config: AgentConfig) -> Self {
        Self {
            provider: None,
            config: AgentConfig {
                mode: Mode::Pipeline,
                parser: ParserMode::Heuristic,
                ..config
            },
            trace: Vec::new(),
            usage: UsageTracker::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Ordered record of the most recent run
    pub fn trace(&self) -> &[TraceStep] {
        &self.trace
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Run a requirement to a report
    pub async fn run(&mut self, requirement: &str) -> Result<AgentResult> {
        self.trace.clear();
        let requirement = ensure_not_empty(requirement).map_err(|e| e.with_operation("agent::run"))?;
        self.record(StepKind::Input, requirement);

        match self.config.mode {
            Mode::Pipeline => self.run_pipeline(requirement).await,
            Mode::Agent => self.run_agent(requirement).await,
        }
    }

    /// Skip parsing: build the report straight from an action/outcome pair
    pub fn generate(&mut self, action: &str, expected_outcome: Option<&str>) -> Result<AgentResult> {
        self.trace.clear();
        let expected_outcome = expected_outcome.unwrap_or(DEFAULT_OUTCOME);
        let parsed = ParsedRequirement::new(action, expected_outcome)
            .map_err(|e| e.with_operation("agent::generate"))?;
        self.record(
            StepKind::Action,
            format!(
                "Tool: {} | Args: {{action: '{}', expected_outcome: '{}'}}",
                Tool::GenerateTestCases,
                parsed.action,
                parsed.expected_outcome
            ),
        );
        Ok(self.finish(parsed, 0))
    }

    // =========================================================================
    // Pipeline mode
    // =========================================================================

    async fn run_pipeline(&mut self, requirement: &str) -> Result<AgentResult> {
        let turns_before = self.usage.total_calls;
        let parsed = self.parse(requirement).await?;
        info!(action = %parsed.action, expected_outcome = %parsed.expected_outcome, "requirement parsed");
        self.record(
            StepKind::Observation,
            format!(
                "{} -> action: '{}', expected_outcome: '{}'",
                Tool::ParseRequirement,
                parsed.action,
                parsed.expected_outcome
            ),
        );
        let turns = self.usage.total_calls - turns_before;
        Ok(self.finish(parsed, turns))
    }

    /// Extract the structured pair using the configured parser
    pub async fn parse(&mut self, requirement: &str) -> Result<ParsedRequirement> {
        let requirement = ensure_not_empty(requirement).map_err(|e| e.with_operation("agent::parse"))?;

        match self.config.parser {
            ParserMode::Heuristic => {
                parse_requirement(requirement).map_err(|e| e.with_operation("agent::parse"))
            }
            ParserMode::Model => {
                let request = CompletionRequest::new(vec![
                    ChatMessage::system("You extract structured data from software requirements. Reply with JSON only."),
                    ChatMessage::user(extraction_prompt(requirement)),
                ]);
                let response = self.complete(request).await?;
                let content = response.text().ok_or_else(|| {
                    Error::inference_failed("model returned an empty reply")
                        .permanent()
                        .with_operation("agent::parse")
                })?;
                debug!(chars = content.len(), "extraction reply received");
                parse_model_reply(content).map_err(|e| e.with_operation("agent::parse"))
            }
        }
    }

    fn finish(&mut self, parsed: ParsedRequirement, model_turns: usize) -> AgentResult {
        let test_cases = generate_test_cases(&parsed);
        let report = format_report(&test_cases);
        info!(cases = test_cases.len(), "report rendered");
        AgentResult {
            report,
            parsed: Some(parsed),
            test_cases,
            model_turns,
        }
    }

    // =========================================================================
    // Agent mode
    // =========================================================================

    async fn run_agent(&mut self, requirement: &str) -> Result<AgentResult> {
        let schema = AgentSchema::new(self.config.max_steps);
        let mut messages = vec![
            ChatMessage::system(schema.system_prompt()),
            ChatMessage::user(schema.user_prompt(requirement)),
        ];
        let mut dispatcher = Dispatcher::new();

        for step in 1..=self.config.max_steps {
            let request = CompletionRequest::new(messages.clone())
                .with_tools(Tool::definitions())
                .with_tool_choice(ToolChoice::Auto);
            let response = self.complete(request).await?;

            if let Some(thought) = response.text() {
                self.record(StepKind::Thought, thought);
            }

            if response.tool_calls.is_empty() {
                return Err(Error::inference_failed("model stopped before the report was produced")
                    .permanent()
                    .with_operation("agent::run_agent")
                    .with_context("step", step.to_string())
                    .with_context("stage", format!("{:?}", dispatcher.stage())));
            }

            messages.push(ChatMessage::assistant_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                info!(step, tool = %call.name, "tool call");
                self.record(
                    StepKind::Action,
                    format!("Tool: {} | Args: {}", call.name, call.arguments),
                );

                let observation = dispatcher.dispatch(call);
                self.record(StepKind::Observation, observation.content.as_str());
                messages.push(ChatMessage::tool_result(call.id.as_str(), observation.content));

                if dispatcher.is_done() {
                    let (parsed, test_cases, report) = dispatcher.into_parts();
                    let report = report.ok_or_else(|| {
                        Error::unexpected("dispatcher finished without a report")
                            .with_operation("agent::run_agent")
                    })?;
                    info!(steps = step, "report produced by model-driven run");
                    return Ok(AgentResult {
                        report,
                        parsed,
                        test_cases,
                        model_turns: step,
                    });
                }
            }
        }

        Err(Error::step_limit_exceeded(self.config.max_steps).with_operation("agent::run_agent"))
    }

    // =========================================================================
    // Model calls
    // =========================================================================

    /// One completion, with bounded retry on retryable errors
    async fn complete(&mut self, mut request: CompletionRequest) -> Result<CompletionResponse> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            Error::config_invalid("no language-model provider configured")
                .with_operation("agent::complete")
        })?;

        if request.model.is_none() {
            request.model = self.config.model.clone();
        }
        if request.temperature.is_none() {
            request.temperature = Some(self.config.temperature);
        }
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());

        let mut attempt: u32 = 0;
        loop {
            match provider.complete(request.clone()).await {
                Ok(response) => {
                    self.usage.track(&model, &response.usage);
                    debug!(
                        provider = provider.name(),
                        model = %model,
                        tokens = response.usage.total_tokens,
                        "completion received"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    let err = Error::from(err)
                        .with_operation("agent::complete")
                        .with_context("model", model.as_str())
                        .with_context("attempt", (attempt + 1).to_string());

                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= self.config.max_retries {
                        return Err(if attempt > 0 { err.persist() } else { err });
                    }

                    let delay = self.backoff(attempt, &err);
                    warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "retrying model call");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn backoff(&self, attempt: u32, err: &Error) -> Duration {
        let exponential = self
            .config
            .retry_backoff_ms
            .saturating_mul(1u64 << attempt.min(16));
        let requested = if err.kind() == ErrorKind::RateLimited {
            err.context_value("retry_after")
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(0)
        } else {
            0
        };
        Duration::from_millis(exponential.max(requested).min(self.config.max_backoff_ms))
    }

    fn record(&mut self, kind: StepKind, content: impl Into<String>) {
        let step = TraceStep {
            kind,
            content: content.into(),
        };
        info!(kind = %step.kind, "{}", step.content);
        self.trace.push(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qabot_core::{FinishReason, ProviderError, ToolCall, Usage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const PASSWORD_RESET: &str = "Users must be able to reset their password via email link.";

    const PASSWORD_RESET_REPORT: &str = "--- QA AUTOMATION REPORT ---
TC_001: POSITIVE: Verify user can 'reset password' and see 'email link sent'.
TC_002: NEGATIVE: Verify 'reset password' with empty data does NOT show 'email link sent'.
TC_003: BOUNDARY: Verify 'reset password' with max character limit handles gracefully.
TC_004: SECURITY: Verify 'reset password' is protected against common vulnerabilities.
----------------------------";

    /// Replays canned replies and records every request it receives
    #[derive(Default)]
    struct ScriptedProvider {
        replies: Mutex<VecDeque<std::result::Result<CompletionResponse, ProviderError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<std::result::Result<CompletionResponse, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".into())))
        }
    }

    fn text(content: &str) -> std::result::Result<CompletionResponse, ProviderError> {
        Ok(CompletionResponse {
            id: "r".into(),
            model: "scripted-model".into(),
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
        })
    }

    fn calls(thought: Option<&str>, calls: &[(&str, serde_json::Value)]) -> std::result::Result<CompletionResponse, ProviderError> {
        Ok(CompletionResponse {
            id: "r".into(),
            model: "scripted-model".into(),
            content: thought.map(str::to_string),
            tool_calls: calls
                .iter()
                .enumerate()
                .map(|(i, (name, args))| ToolCall {
                    id: format!("call_{}", i),
                    name: name.to_string(),
                    arguments: args.to_string(),
                })
                .collect(),
            finish_reason: FinishReason::ToolCalls,
            usage: Usage::default(),
        })
    }

    fn parse_step() -> (&'static str, serde_json::Value) {
        ("requirement_structure_tool", serde_json::json!({ "requirement": PASSWORD_RESET }))
    }

    fn generate_step() -> (&'static str, serde_json::Value) {
        (
            "generic_test_generator",
            serde_json::json!({ "action": "reset password", "expected_outcome": "email link sent" }),
        )
    }

    fn format_step() -> (&'static str, serde_json::Value) {
        ("report_formatter", serde_json::json!({}))
    }

    fn agent_config() -> AgentConfig {
        AgentConfig {
            mode: Mode::Agent,
            retry_backoff_ms: 1,
            ..AgentConfig::default()
        }
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_offline_pipeline_end_to_end() {
        let mut agent = Agent::<ScriptedProvider>::offline(AgentConfig::default());
        let result = agent.run(PASSWORD_RESET).await.unwrap();

        assert_eq!(result.report.as_str(), PASSWORD_RESET_REPORT);
        assert_eq!(result.model_turns, 0);
        assert_eq!(result.parsed.unwrap().expected_outcome, "email link sent");
        assert_eq!(agent.trace()[0].kind, StepKind::Input);
    }

    #[tokio::test]
    async fn test_empty_input_produces_no_report() {
        let provider = ScriptedProvider::default();
        let mut agent = Agent::new(provider, AgentConfig::default());

        let err = agent.run("   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
        assert!(agent.trace().is_empty());
        assert_eq!(agent.provider.as_ref().map(|p| p.request_count()), Some(0));
    }

    #[tokio::test]
    async fn test_model_parser_pipeline() {
        let provider = ScriptedProvider::new(vec![text(
            "```json\n{\"action\": \"reset password\", \"expected_outcome\": \"email link sent\"}\n```",
        )]);
        let mut agent = Agent::new(provider, AgentConfig::default());

        let result = agent.run(PASSWORD_RESET).await.unwrap();
        assert_eq!(result.report.as_str(), PASSWORD_RESET_REPORT);
        assert_eq!(result.model_turns, 1);
        assert_eq!(agent.usage().total_tokens(), 15);

        let requests = agent.provider.as_ref().unwrap().requests.lock().unwrap();
        assert_eq!(requests[0].temperature, Some(0.0));
        assert!(requests[0].tools.is_none());
    }

    #[tokio::test]
    async fn test_model_parser_rejects_empty_pair() {
        let provider = ScriptedProvider::new(vec![text(r#"{"action": "", "expected_outcome": ""}"#)]);
        let mut agent = Agent::new(provider, AgentConfig::default());

        let err = agent.run("Hello there").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
        assert_eq!(err.operation(), "agent::parse");
    }

    #[tokio::test]
    async fn test_heuristic_parse_failure_aborts() {
        let config = AgentConfig {
            parser: ParserMode::Heuristic,
            ..AgentConfig::default()
        };
        let mut agent = Agent::new(ScriptedProvider::default(), config);

        let err = agent.run("Nice weather today").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
    }

    #[tokio::test]
    async fn test_repeated_runs_are_byte_identical() {
        let mut agent = Agent::<ScriptedProvider>::offline(AgentConfig::default());
        let first = agent.run(PASSWORD_RESET).await.unwrap().report;
        let second = agent.run(PASSWORD_RESET).await.unwrap().report;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_trace_covers_only_the_latest_run() {
        let mut agent = Agent::<ScriptedProvider>::offline(AgentConfig::default());
        agent.run(PASSWORD_RESET).await.unwrap();
        let first_len = agent.trace().len();

        agent.run("Admins can export reports").await.unwrap();
        assert_eq!(agent.trace().len(), first_len);
        assert_eq!(agent.trace()[0].content, "Admins can export reports");

        agent.generate("log in", None).unwrap();
        assert_eq!(agent.trace().len(), 1);
        assert_eq!(agent.trace()[0].kind, StepKind::Action);
    }

    #[test]
    fn test_direct_generation_defaults_outcome() {
        let mut agent = Agent::<ScriptedProvider>::offline(AgentConfig::default());
        let result = agent.generate("log in", None).unwrap();
        assert!(result
            .report
            .as_str()
            .contains("TC_001: POSITIVE: Verify user can 'log in' and see 'Success'."));

        let err = agent.generate("  ", Some("x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
    }

    // -------------------------------------------------------------------------
    // Retry
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Network("reset".into()))]);
        let mut agent = Agent::new(provider, AgentConfig::default());

        let err = agent.run(PASSWORD_RESET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkFailed);
        assert_eq!(agent.provider.as_ref().unwrap().request_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited { retry_after: None }),
            text(r#"{"action": "reset password", "expected_outcome": "email link sent"}"#),
        ]);
        let config = AgentConfig {
            max_retries: 2,
            retry_backoff_ms: 1,
            ..AgentConfig::default()
        };
        let mut agent = Agent::new(provider, config);

        let result = agent.run(PASSWORD_RESET).await.unwrap();
        assert_eq!(result.report.as_str(), PASSWORD_RESET_REPORT);
        assert_eq!(agent.provider.as_ref().unwrap().request_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_marks_persistent() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Api { status: 503, message: "busy".into() }),
            Err(ProviderError::Api { status: 503, message: "busy".into() }),
        ]);
        let config = AgentConfig {
            max_retries: 1,
            retry_backoff_ms: 1,
            ..AgentConfig::default()
        };
        let mut agent = Agent::new(provider, config);

        let err = agent.run(PASSWORD_RESET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert_eq!(err.status(), qabot_core::ErrorStatus::Persistent);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::AuthenticationFailed)]);
        let config = AgentConfig {
            max_retries: 3,
            retry_backoff_ms: 1,
            ..AgentConfig::default()
        };
        let mut agent = Agent::new(provider, config);

        let err = agent.run(PASSWORD_RESET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(agent.provider.as_ref().unwrap().request_count(), 1);
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let config = AgentConfig {
            retry_backoff_ms: 500,
            ..AgentConfig::default()
        };
        let agent = Agent::<ScriptedProvider>::offline(config);
        let err = Error::from(ProviderError::Network("reset".into()));

        assert_eq!(agent.backoff(0, &err), Duration::from_millis(500));
        assert_eq!(agent.backoff(1, &err), Duration::from_millis(1000));
        assert_eq!(agent.backoff(3, &err), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_honours_retry_after() {
        let agent = Agent::<ScriptedProvider>::offline(AgentConfig::default());

        let err = Error::from(ProviderError::RateLimited { retry_after: Some(7) });
        assert!(agent.backoff(0, &err) >= Duration::from_millis(7000));
        assert_eq!(agent.backoff(0, &err), Duration::from_millis(7000));

        // exponential wins once it exceeds the server's hint
        assert_eq!(agent.backoff(4, &err), Duration::from_millis(8000));

        let err = Error::from(ProviderError::RateLimited { retry_after: None });
        assert_eq!(agent.backoff(0, &err), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = AgentConfig {
            max_backoff_ms: 2_000,
            ..AgentConfig::default()
        };
        let agent = Agent::<ScriptedProvider>::offline(config);

        let err = Error::from(ProviderError::RateLimited { retry_after: Some(86_400) });
        assert_eq!(agent.backoff(0, &err), Duration::from_millis(2_000));

        let err = Error::from(ProviderError::Network("reset".into()));
        assert_eq!(agent.backoff(16, &err), Duration::from_millis(2_000));
    }

    // -------------------------------------------------------------------------
    // Agent mode
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_agent_mode_three_turns() {
        let provider = ScriptedProvider::new(vec![
            calls(Some("I will parse the requirement first."), &[parse_step()]),
            calls(None, &[generate_step()]),
            calls(None, &[format_step()]),
        ]);
        let mut agent = Agent::new(provider, agent_config());

        let result = agent.run(PASSWORD_RESET).await.unwrap();
        assert_eq!(result.report.as_str(), PASSWORD_RESET_REPORT);
        assert_eq!(result.model_turns, 3);
        assert_eq!(agent.provider.as_ref().unwrap().request_count(), 3);

        let kinds: Vec<StepKind> = agent.trace().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Input,
                StepKind::Thought,
                StepKind::Action,
                StepKind::Observation,
                StepKind::Action,
                StepKind::Observation,
                StepKind::Action,
                StepKind::Observation,
            ]
        );
    }

    #[tokio::test]
    async fn test_agent_mode_single_turn_with_all_calls() {
        let provider = ScriptedProvider::new(vec![calls(
            None,
            &[parse_step(), generate_step(), format_step(), format_step()],
        )]);
        let mut agent = Agent::new(provider, agent_config());

        let result = agent.run(PASSWORD_RESET).await.unwrap();
        assert_eq!(result.report.as_str(), PASSWORD_RESET_REPORT);
        assert_eq!(result.model_turns, 1);
        // stops right after the formatter; the trailing call is never dispatched
        let actions = agent.trace().iter().filter(|s| s.kind == StepKind::Action).count();
        assert_eq!(actions, 3);
    }

    #[tokio::test]
    async fn test_agent_mode_sends_tools_and_history() {
        let provider = ScriptedProvider::new(vec![
            calls(None, &[parse_step()]),
            calls(None, &[generate_step(), format_step()]),
        ]);
        let mut agent = Agent::new(provider, agent_config());
        agent.run(PASSWORD_RESET).await.unwrap();

        let requests = agent.provider.as_ref().unwrap().requests.lock().unwrap();
        assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(3));
        assert!(matches!(requests[0].tool_choice, Some(ToolChoice::Auto)));
        // system, user, assistant echo, tool result
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[3].tool_call_id.as_deref(), Some("call_0"));
    }

    #[tokio::test]
    async fn test_agent_mode_recovers_from_rejected_call() {
        let provider = ScriptedProvider::new(vec![
            calls(None, &[format_step()]),
            calls(None, &[parse_step()]),
            calls(None, &[generate_step()]),
            calls(None, &[format_step()]),
        ]);
        let mut agent = Agent::new(provider, agent_config());

        let result = agent.run(PASSWORD_RESET).await.unwrap();
        assert_eq!(result.model_turns, 4);
        assert!(agent.trace()[2].content.contains("out of order"));
    }

    #[tokio::test]
    async fn test_agent_mode_step_limit() {
        let provider = ScriptedProvider::new(vec![
            calls(None, &[parse_step()]),
            calls(None, &[parse_step()]),
            calls(None, &[parse_step()]),
        ]);
        let config = AgentConfig {
            max_steps: 3,
            ..agent_config()
        };
        let mut agent = Agent::new(provider, config);

        let err = agent.run(PASSWORD_RESET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StepLimitExceeded);
        assert_eq!(agent.provider.as_ref().unwrap().request_count(), 3);
    }

    #[tokio::test]
    async fn test_agent_mode_model_stops_early() {
        let provider = ScriptedProvider::new(vec![
            calls(None, &[parse_step()]),
            text("Here are some test ideas for you."),
        ]);
        let mut agent = Agent::new(provider, agent_config());

        let err = agent.run(PASSWORD_RESET).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert!(!err.is_retryable());
        assert_eq!(err.context_value("stage"), Some("Parsed"));
    }

    #[tokio::test]
    async fn test_agent_mode_requires_provider() {
        let config = AgentConfig {
            mode: Mode::Agent,
            ..AgentConfig::default()
        };
        // offline() forces the heuristic pipeline even if agent mode was asked for
        let mut agent = Agent::<ScriptedProvider>::offline(config);
        assert_eq!(agent.config().mode, Mode::Pipeline);
        assert!(agent.run(PASSWORD_RESET).await.is_ok());
    }
}
