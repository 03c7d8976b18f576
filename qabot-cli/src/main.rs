//! # qabot CLI
//!
//! Command-line interface for the QA report bot.
//!
//! Usage:
//!   qabot <requirement>
//!   qabot --file story.txt
//!   qabot generate --action "log in" --outcome "dashboard shown"
//!   qabot tools
//!
//! Examples:
//!   qabot "Users must be able to reset their password via email link."
//!   qabot --offline "Admins can export reports as CSV"
//!   qabot --mode agent --provider gemini "Users should be able to log out"

mod config;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use config::{resolve_provider, ProviderOptions};
use qabot_agent::{Agent, AgentConfig, AgentResult, Mode, ParserMode};
use qabot_core::{Error, ErrorKind, OpenAIProvider, ProviderType, Result, Tool};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Parser)]
#[command(name = "qabot")]
#[command(author, version, about = "qabot - turns a software requirement into a QA test report")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Requirement text (when not using subcommands)
    #[arg(trailing_var_arg = true)]
    requirement: Vec<String>,

    /// Read the requirement from a file
    #[arg(short, long, conflicts_with = "requirement")]
    file: Option<PathBuf>,

    /// How the run is sequenced
    #[arg(long, value_enum, default_value_t = ModeArg::Pipeline)]
    mode: ModeArg,

    /// How the action and expected outcome are extracted [default: model]
    #[arg(long, value_enum)]
    parser: Option<ParserArg>,

    /// Rule-based pipeline only, no model calls
    #[arg(long)]
    offline: bool,

    /// Language-model provider
    #[arg(long, value_enum, default_value_t = ProviderArg::Openai)]
    provider: ProviderArg,

    /// Model name (provider default when unset)
    #[arg(long, env = "QABOT_MODEL")]
    model: Option<String>,

    /// Override the provider endpoint
    #[arg(long, env = "QABOT_BASE_URL")]
    base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Model turns allowed in agent mode
    #[arg(long, default_value_t = 6)]
    max_steps: usize,

    /// Extra attempts for transient model errors
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Also write the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print the step trace to stderr after the run
    #[arg(long, global = true)]
    trace: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the report straight from an action and expected outcome
    Generate {
        /// What the user does
        #[arg(long)]
        action: String,

        /// What should happen (defaults to "Success")
        #[arg(long)]
        outcome: Option<String>,
    },
    /// Print the tool contracts offered to the model, as JSON
    Tools,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Pipeline,
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ParserArg {
    Heuristic,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderArg {
    Openai,
    Gemini,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Pipeline => Mode::Pipeline,
            ModeArg::Agent => Mode::Agent,
        }
    }
}

impl From<ParserArg> for ParserMode {
    fn from(arg: ParserArg) -> Self {
        match arg {
            ParserArg::Heuristic => ParserMode::Heuristic,
            ParserArg::Model => ParserMode::Model,
        }
    }
}

impl From<ProviderArg> for ProviderType {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Openai => ProviderType::OpenAI,
            ProviderArg::Gemini => ProviderType::Gemini,
        }
    }
}

impl Cli {
    fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            mode: self.mode.into(),
            parser: self.parser.unwrap_or(ParserArg::Model).into(),
            max_steps: self.max_steps,
            max_retries: self.retries,
            ..AgentConfig::default()
        }
    }

    fn provider_options(&self) -> ProviderOptions {
        ProviderOptions {
            provider: self.provider.into(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout,
        }
    }

    /// Whether `--offline` overrides a mode or parser the user asked for
    fn offline_overrides_request(&self) -> bool {
        self.offline && (self.mode == ModeArg::Agent || self.parser == Some(ParserArg::Model))
    }

    fn build_agent<F>(&self, lookup: F) -> Result<Agent<OpenAIProvider>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = self.agent_config();
        if self.offline {
            if self.offline_overrides_request() {
                warn!("--offline set; using the heuristic pipeline");
            }
            return Ok(Agent::offline(config));
        }

        let provider_config = resolve_provider(&self.provider_options(), lookup)?;
        let provider = OpenAIProvider::new(provider_config)
            .map_err(|e| Error::from(e).with_operation("cli::build_agent"))?;
        Ok(Agent::new(provider, config))
    }

    /// Credentials are checked before any input is read, so a missing key
    /// fails before the interactive prompt.
    fn prepare_run<F, R>(&self, lookup: F, read: R) -> Result<(Agent<OpenAIProvider>, String)>
    where
        F: Fn(&str) -> Option<String>,
        R: FnOnce(&Self) -> Result<String>,
    {
        let agent = self.build_agent(lookup)?;
        let requirement = read(self)?;
        Ok((agent, requirement))
    }

    fn stderr_level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    /// The log file always keeps the step trace (INFO), more with -vv
    fn file_level(&self) -> LevelFilter {
        LevelFilter::INFO.max(LevelFilter::from_level(self.stderr_level()))
    }

    fn log_subscriber<E, F>(
        &self,
        stderr: E,
        file: Option<F>,
    ) -> impl tracing::Subscriber + Send + Sync + 'static
    where
        E: for<'w> MakeWriter<'w> + Send + Sync + 'static,
        F: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        use tracing_subscriber::{layer::SubscriberExt, Layer};

        let filter = tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(self.stderr_level().into());

        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(stderr)
            .with_filter(filter);

        let file_layer = file.map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(self.file_level())
        });

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
    }

    fn setup_logging(&self) -> Result<()> {
        use tracing_subscriber::util::SubscriberInitExt;

        let file = match &self.log_file {
            Some(path) => Some(Mutex::new(File::create(path).map_err(|e| {
                Error::from(e)
                    .with_operation("cli::setup_logging")
                    .with_context("path", path.display().to_string())
            })?)),
            None => None,
        };

        self.log_subscriber(io::stderr, file).init();
        Ok(())
    }

    /// Positional args, then `--file`, then an interactive prompt
    fn read_requirement(&self) -> Result<String> {
        if let Some(path) = &self.file {
            return std::fs::read_to_string(path).map_err(|e| {
                Error::from(e)
                    .with_operation("cli::read_requirement")
                    .with_context("path", path.display().to_string())
            });
        }
        if !self.requirement.is_empty() {
            return Ok(self.requirement.join(" "));
        }

        eprint!("Enter your test scenario: ");
        io::stderr().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn exit_code(err: &Error) -> u8 {
    match err.kind() {
        ErrorKind::ConfigInvalid => 2,
        ErrorKind::ParseFailed => 3,
        _ => 1,
    }
}

fn print_tools() -> Result<()> {
    let json = serde_json::to_string_pretty(&Tool::definitions()).map_err(|e| {
        Error::new(ErrorKind::SerializationFailed, "failed to render tool contracts")
            .with_operation("cli::print_tools")
            .set_source(e)
    })?;
    println!("{}", json);
    Ok(())
}

fn print_result(result: &AgentResult, agent: &Agent<OpenAIProvider>, show_trace: bool) {
    if show_trace {
        eprintln!("--- Trace ({} steps) ---", agent.trace().len());
        for step in agent.trace() {
            eprintln!("{}\n", step);
        }
    }

    let usage = agent.usage();
    if usage.total_calls > 0 {
        info!(
            calls = usage.total_calls,
            tokens = usage.total_tokens(),
            turns = result.model_turns,
            "model usage"
        );
    }

    println!("{}", result.report);
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Some(Commands::Tools) => {
            print_tools()?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Generate { action, outcome }) => {
            let mut agent = Agent::<OpenAIProvider>::offline(cli.agent_config());
            let result = agent.generate(action, outcome.as_deref())?;
            print_result(&result, &agent, cli.trace);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            let (mut agent, requirement) = cli.prepare_run(env_var, Cli::read_requirement)?;
            if requirement.trim().is_empty() {
                eprintln!("Error: Scenario cannot be empty.");
                return Ok(ExitCode::FAILURE);
            }

            let result = agent.run(&requirement).await;
            if cli.trace && result.is_err() {
                for step in agent.trace() {
                    eprintln!("{}\n", step);
                }
            }
            let result = result?;
            print_result(&result, &agent, cli.trace);
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(err) = cli.setup_logging() {
        eprintln!("Error: {}", err);
        return ExitCode::from(exit_code(&err));
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(kind = %err.kind(), "run failed");
            eprintln!("Error: {}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}
