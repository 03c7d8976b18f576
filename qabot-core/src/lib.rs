//! # qabot core
//!
//! The building blocks of a QA report run.
//!
//! ## Core Concepts
//! - **Requirement**: free text, parsed into an action and an expected outcome
//! - **Test cases**: one templated scenario per category, in fixed order
//! - **Report**: the fixed-layout text block handed back to the caller
//! - **Tools**: the three steps above as named, contract-checked capabilities
//! - **Provider**: trait-based LLM communication (OpenAI-compatible)

pub mod provider;
pub mod report;
pub mod requirement;
pub mod schema;
pub mod testcase;
pub mod tool;

pub use qabot_error::{Error, ErrorKind, ErrorStatus, Result};

pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
    OpenAIProvider, ProviderConfig, ProviderError, ProviderType, Role, ToolCall, ToolChoice,
    ToolDefinition, Usage, UsageTracker,
};
pub use report::{format_report, Report, REPORT_FOOTER, REPORT_HEADER};
pub use requirement::{
    ensure_not_empty, extraction_prompt, parse_model_reply, parse_requirement, word_count,
    ParsedRequirement, PARSED_STATUS,
};
pub use schema::AgentSchema;
pub use testcase::{generate_test_cases, Category, TestCase};
pub use tool::{decode_args, GenerateArgs, GenerateObservation, ParseArgs, ParseObservation, Tool};
