//! MassGen CLI - runs a coordination session from a TOML config file.
//!
//! A command-line entry point for the coordination core, following the
//! teacher's `machi-bot` CLI shape: `clap` for argument parsing, a single
//! `tracing-subscriber` filter driven by `-v` repeats, and a `run` config
//! subcommand for sanity-checking a session file before spending API calls.

#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use massgen_core::backend::anthropic::AnthropicBackend;
use massgen_core::backend::openai::OpenAiBackend;
use massgen_core::backend::SharedBackend;
use massgen_core::config::{BackendConfig, ProviderKind, SessionConfig};
use massgen_core::events::{DomainEvent, EventBus};
use massgen_core::tool::{ExternalToolRegistry, ToolRouter};
use massgen_core::workspace::policy::AllowAll;
use massgen_core::workspace::WorkspaceManager;
use massgen_core::{AgentHandle, Orchestrator, OrchestratorConfig};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// MassGen - concurrent multi-agent LLM coordination.
#[derive(Parser)]
#[command(name = "massgen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a coordination session from a config file
    Run(RunArgs),
    /// Validate a config file without starting a session
    Validate(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to the session's TOML config file
    #[arg(short, long, env = "MASSGEN_CONFIG")]
    config: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("massgen_core={level},massgen_cli={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::Validate(args) => cmd_validate(args).await,
    }
}

async fn cmd_validate(args: RunArgs) -> anyhow::Result<()> {
    let config = massgen_core::config::load_config(&args.config).await?;
    println!("config OK: {} agent(s), task: {}", config.agents.len(), config.task);
    Ok(())
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let config = massgen_core::config::load_config(&args.config).await?;

    let (event_bus, mut events) = EventBus::new(EventBus::DEFAULT_CAPACITY);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let workspace = Arc::new(WorkspaceManager::new(config.workspace_root.clone(), Arc::new(AllowAll)));
    let router = Arc::new(ToolRouter::new(ExternalToolRegistry::new(), config.planning_mode));

    let mut handles = Vec::with_capacity(config.agents.len());
    for agent in &config.agents {
        let backend_config = config
            .backends
            .get(&agent.backend_ref)
            .ok_or_else(|| anyhow::anyhow!("agent '{}' references unknown backend '{}'", agent.agent_id, agent.backend_ref))?;
        let backend = build_backend(backend_config)?;
        handles.push(Arc::new(AgentHandle {
            agent_id: agent.agent_id.clone(),
            backend,
            workspace: Arc::clone(&workspace),
            router: Arc::clone(&router),
            event_bus: event_bus.clone(),
            system_prompt: agent.system_prompt.clone(),
            task: config.task.clone(),
        }));
    }

    let orchestrator_config = OrchestratorConfig {
        planning_mode: config.planning_mode,
        planning_mode_instruction: config.planning_mode_instruction.clone(),
        session_timeout: config.session_timeout(),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(config.agents.iter().map(|a| a.agent_id.clone()), event_bus, orchestrator_config);

    let result = tokio::select! {
        result = orchestrator.run(handles) => result?,
        _ = tokio::signal::ctrl_c() => {
            println!("\ninterrupted");
            return Ok(());
        }
    };

    drop(printer);

    println!("\n--- outcome: {:?}", result.outcome);
    if let Some(answer) = result.final_answer {
        println!("\n{answer}");
    }
    Ok(())
}

fn build_backend(config: &BackendConfig) -> anyhow::Result<SharedBackend> {
    let api_key = config.resolve_api_key()?;
    let backend: SharedBackend = match config.provider {
        ProviderKind::Anthropic => Arc::new(AnthropicBackend::new(api_key, config.model.clone())),
        ProviderKind::OpenAi => Arc::new(OpenAiBackend::new(api_key, config.model.clone())),
    };
    Ok(backend)
}

fn print_event(event: &DomainEvent) {
    match event {
        DomainEvent::AgentTextDelta { agent, text } => print!("[{agent}] {text}"),
        DomainEvent::FinalAnswerDelta { text } => print!("{text}"),
        DomainEvent::AnswerPublished { label, author } => println!("\n>> {author} published {label}"),
        DomainEvent::VoteCast { voter, target, reason } => println!("\n>> {voter} voted for {target}: {reason}"),
        DomainEvent::AgentStatusChanged { agent, status } => println!("\n>> {agent} is now {status:?}"),
        DomainEvent::ConsensusReached { winner_label } => println!("\n>> consensus reached: {winner_label}"),
        DomainEvent::AgentStarted { agent } => println!("\n>> {agent} started"),
        DomainEvent::ToolCallObserved { agent, name, args_summary } => println!("\n>> {agent} called {name}({args_summary})"),
        DomainEvent::SessionEnded { .. } => {}
    }
}
