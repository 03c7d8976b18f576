//! # qabot agent
//!
//! The orchestrator turns one requirement into one report:
//! 1. The requirement is checked and recorded
//! 2. An action and expected outcome are extracted (rules or a model call)
//! 3. Four test cases are built from fixed templates
//! 4. The cases are rendered into the report
//!
//! In agent mode the model drives steps 2-4 through tool calls, and the
//! dispatcher refuses anything out of order.

mod agent;
mod dispatcher;
mod trace;

pub use agent::{Agent, AgentConfig, AgentResult, Mode, ParserMode, DEFAULT_OUTCOME};
pub use dispatcher::{Dispatcher, Observation, Stage};
pub use trace::{StepKind, TraceStep};
