//! reel - writes Manim scenes with a language model and repairs them until they render

mod config;
mod tools;
mod utils;

use anyhow::{Context as _, bail};
use clap::Parser;
use reel_agent::{
    Agent, AgentConfig, AgentEvent, Error as AgentError, FreeTextPolicy, ProviderTransport,
    RetentionPolicy, RetryConfig, RunLog, Termination, Toolbox, Workspace,
};
use reel_ai::providers::{LlmProvider, OpenAIProvider};
use reel_ai::{Model, Provider, ReasoningLevel};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use crate::tools::{
    ModelGenerator, Quality, Renderer, RendererExecutor, RendererInspector, SourceStore,
};

const DEFAULT_MODEL: &str = "o3-mini";

/// reel - generate and render-test Manim scenes with a language model
#[derive(Parser, Debug)]
#[command(name = "reel")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Description of the animation
    #[arg(short, long, conflicts_with = "file", required_unless_present_any = ["file", "init_config"])]
    prompt: Option<String>,

    /// File containing the description
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Name of the Scene class to create
    #[arg(short, long, required_unless_present = "init_config")]
    scene: Option<String>,

    /// Maximum number of model requests (default: 25)
    #[arg(short = 'c', long)]
    max_iterations: Option<u32>,

    /// Model to use (default: o3-mini)
    #[arg(short, long)]
    model: Option<String>,

    /// Provider (openai, groq, openrouter, ollama, custom)
    #[arg(long)]
    provider: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Render quality
    #[arg(long, value_enum)]
    quality: Option<Quality>,

    /// Working directory for scene files
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Keep generated sources and timestamped backups in the working directory
    #[arg(long)]
    keep_source: bool,

    /// Write a JSON log of the run to this path
    #[arg(long)]
    log: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Setup tracing
    let filter = if args.verbose {
        EnvFilter::new("reel=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    // Initialize config and exit
    if args.init_config {
        let path = config::Config::init().context("Error creating config")?;
        println!("Config file at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(ExitCode::SUCCESS);
    }

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("loaded environment from {}", path.display());
    }
    let cfg = config::Config::load();

    let request = match (&args.prompt, &args.file) {
        (Some(prompt), _) => prompt.trim().to_string(),
        (None, Some(path)) => utils::read_prompt_file(path)?,
        (None, None) => bail!("either --prompt or --file is required"),
    };
    if request.is_empty() {
        bail!("the animation description is empty");
    }

    let scene = args.scene.clone().unwrap_or_default();
    if !utils::is_identifier(&scene) {
        bail!(
            "scene name '{}' is not a valid class name (letters, digits and underscores, not starting with a digit)",
            scene
        );
    }

    let max_iterations = args
        .max_iterations
        .or(cfg.max_iterations)
        .unwrap_or(AgentConfig::DEFAULT_MAX_ITERATIONS);
    if max_iterations == 0 {
        bail!("--max-iterations must be at least 1");
    }

    // Model and credentials
    let provider = Provider::parse(
        args.provider
            .as_deref()
            .or(cfg.provider.as_deref())
            .unwrap_or("openai"),
    );
    let api_key = match cfg.get_api_key(provider) {
        Some(key) => key,
        None if provider == Provider::Ollama => String::new(),
        None => bail!(
            "no API key for {}. Set {} (a .env file works too) or add it under [api_keys] in {}",
            provider.name(),
            provider.api_key_env_var().unwrap_or("OPENAI_API_KEY"),
            config::Config::config_path().display()
        ),
    };
    if provider == Provider::OpenAI && !api_key.starts_with("sk-") {
        tracing::warn!("OpenAI API key does not start with 'sk-'");
        eprintln!("Warning: the OpenAI API key does not look like a valid key (expected 'sk-' prefix)");
    }

    let base_url = args.base_url.as_deref().or(cfg.base_url.as_deref());
    let model_id = args
        .model
        .as_deref()
        .or(cfg.model.as_deref())
        .unwrap_or(DEFAULT_MODEL);
    let model = Model::new(provider, model_id, base_url);
    let generator_model = match cfg.generator_model.as_deref() {
        Some(id) => Model::new(provider, id, base_url),
        None => model.clone(),
    };
    let reasoning = cfg.reasoning_level.as_deref().map(ReasoningLevel::parse);
    let llm: Arc<dyn LlmProvider> = Arc::new(OpenAIProvider::new(api_key));

    // Renderer and workspace
    let mut renderer = match cfg.renderer.command.as_deref() {
        Some(command) => Renderer::from_command(command),
        None => Renderer::default(),
    };
    if let Some(ref config_args) = cfg.renderer.config_args {
        renderer.config_args = config_args.clone();
    }
    if let Some(ref env) = cfg.renderer.env {
        renderer.env.extend(env.clone());
    }

    let work_dir = args
        .work_dir
        .clone()
        .or_else(|| cfg.renderer.work_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let workspace = Arc::new(Workspace::acquire(&work_dir)?);
    let keep_source = args.keep_source || cfg.renderer.keep_source.unwrap_or(false);

    let executor = RendererExecutor::new(renderer.clone(), workspace.clone())
        .with_quality(args.quality.or(cfg.renderer.quality).unwrap_or_default())
        .with_timeout(
            cfg.renderer
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(RendererExecutor::DEFAULT_TIMEOUT),
        )
        .keep_source(keep_source);
    let mut generator = ModelGenerator::new(llm.clone(), generator_model).with_reasoning(reasoning);
    if keep_source {
        generator = generator.with_store(SourceStore::new(workspace.clone()));
    }
    let toolbox = Toolbox::new(
        Arc::new(generator),
        Arc::new(executor),
        Arc::new(RendererInspector::new(renderer)),
    );

    // Agent
    let transport = Arc::new(ProviderTransport::new(llm).with_retry_config(
        RetryConfig::default().with_max_retries(cfg.max_retries.unwrap_or(0)),
    ));
    let mut agent_config = AgentConfig::new(model.clone());
    agent_config.reasoning = reasoning;
    agent_config.max_iterations = max_iterations;
    agent_config.retention = RetentionPolicy {
        keep_recent_tokens: cfg.keep_recent_tokens,
    };
    if let Some(ref policy) = cfg.free_text_policy {
        match FreeTextPolicy::parse(policy) {
            Some(policy) => agent_config.free_text_policy = policy,
            None => eprintln!(
                "Warning: unknown free_text_policy '{}', using 'corrective'",
                policy
            ),
        }
    }

    let mut agent = Agent::new(agent_config, transport, toolbox);
    let receiver = agent.subscribe();
    let log = RunLog::new(request.clone(), scene.clone(), model.id.clone());
    let printer = tokio::spawn(print_events(receiver, log, args.verbose));

    let result = agent.run(&request, &scene).await;

    // Dropping the agent closes the event channel so the printer can finish
    drop(agent);
    let log = printer.await.context("event printer failed")?;

    if let Some(ref path) = args.log {
        match log.save(path) {
            Ok(()) => println!("Run log written to {}", path.display()),
            Err(e) => eprintln!("Warning: could not write run log: {}", e),
        }
    }

    match result {
        Ok(report) => {
            println!();
            println!(
                "Scene {} rendered after {} iteration{}.",
                report.entry_point,
                report.iterations,
                if report.iterations == 1 { "" } else { "s" }
            );
            if let Some(path) = report.source_path {
                println!("Source: {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ AgentError::BudgetExhausted { .. }) => {
            eprintln!("\nFailed: {}.", e);
            eprintln!("Try a more specific description or raise --max-iterations.");
            Ok(ExitCode::from(2))
        }
        Err(e) if e.is_model_failure() => {
            eprintln!("\nFailed: {}.", e);
            eprintln!("Check the API key, model name and network connection.");
            Ok(ExitCode::from(3))
        }
        Err(e) => {
            eprintln!("\nFailed: {}.", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print progress for each agent event and fold it into the run log.
/// Returns the log once the agent's event channel closes.
async fn print_events(
    mut receiver: tokio::sync::broadcast::Receiver<AgentEvent>,
    mut log: RunLog,
    verbose: bool,
) -> RunLog {
    loop {
        let event = match receiver.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("event printer fell behind, {} events dropped", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        log.record(&event);

        match event {
            AgentEvent::RunStart {
                entry_point,
                max_iterations,
                ..
            } => {
                println!("reel: building {} (up to {} iterations)", entry_point, max_iterations);
            }
            AgentEvent::IterationStart {
                iteration,
                max_iterations,
            } => {
                println!("\n[{}/{}]", iteration, max_iterations);
            }
            AgentEvent::FreeTextTurn {
                text, consecutive, ..
            } => {
                println!("  model replied without a tool call ({} in a row)", consecutive);
                if verbose {
                    println!("  {}", utils::truncate_chars(&text, 300));
                }
            }
            AgentEvent::ToolExecutionStart { tool_name, .. } => {
                println!("  -> {}", tool_name);
            }
            AgentEvent::ToolExecutionEnd {
                tool_name,
                rationale,
                result,
                is_error,
                ..
            } => {
                if let Some(rationale) = rationale {
                    println!("     reason: {}", utils::truncate_chars(&rationale, 200));
                }
                if is_error {
                    println!("  x {} failed: {}", tool_name, utils::truncate_chars(&result, 500));
                } else {
                    let limit = if verbose { 2000 } else { 200 };
                    println!("  ok {}: {}", tool_name, utils::truncate_chars(&result, limit));
                }
            }
            AgentEvent::ToolCallSkipped { tool_name, .. } => {
                println!("  skipped extra call to {}", tool_name);
            }
            AgentEvent::Error { message } => {
                eprintln!("Error: {}", message);
            }
            AgentEvent::RunEnd {
                termination,
                total_usage,
                ..
            } => {
                if let Termination::Fatal { message } = termination {
                    tracing::debug!("run stopped: {}", message);
                }
                println!(
                    "\n[Tokens: {} in, {} out]",
                    total_usage.input, total_usage.output
                );
            }
            _ => {}
        }
    }
    log
}
