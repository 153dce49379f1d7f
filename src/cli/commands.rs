//! CLI command definitions for task-finalizer.
//!
//! Each subcommand resolves a deployment (file, then `FINALIZER_*`
//! environment, then flags), builds an inference client and drives the
//! finalizer agent.

use crate::config::DeploymentConfig;
use crate::finalizer::{
    result_schema, response_format, AgentRunInput, Decision, FinalizationRequest,
    FinalizationResult, FinalizerAgent, FinalizerConfig, PromptBuilder, Task,
};
use crate::llm::{LiteLlmClient, LlmProvider};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Default number of concurrent finalizations in `batch`.
const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Decide whether an objective is met and write the report or the next tasks.
#[derive(Parser)]
#[command(name = "task-finalizer")]
#[command(about = "Decide whether an objective is met and produce a report or new tasks")]
#[command(version)]
#[command(
    long_about = "task-finalizer reviews the tasks performed towards an objective and asks an LLM for one decision: either the objective is met and a Markdown report is written, or it is not and the next tasks are proposed.\n\nExample usage:\n  task-finalizer finalize --objective \"Write a blog post about the weather in London.\" --tasks tasks.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Finalize one objective.
    Finalize(FinalizeArgs),

    /// Execute a run document (`tool_name` + `tool_input_data`).
    Run(RunArgs),

    /// Finalize one request per line of a JSONL file.
    Batch(BatchArgs),

    /// Render the prompts without calling the model.
    #[command(alias = "dry-run")]
    Prompt(PromptArgs),

    /// Print the JSON schema replies must follow.
    Schema(SchemaArgs),
}

/// Where the model settings and credentials come from.
#[derive(clap::Args, Debug)]
pub struct BackendArgs {
    /// Deployment file (.json, .yaml or .yml).
    #[arg(short = 'c', long)]
    pub config: Option<String>,

    /// Model override.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// API key (can also be set via OPENROUTER_API_KEY env var).
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL; OpenRouter is used when unset.
    #[arg(long, env = "LITELLM_API_BASE")]
    pub api_base: Option<String>,
}

/// The finalization request given on the command line.
#[derive(clap::Args, Debug)]
pub struct RequestArgs {
    /// The objective the tasks were working towards.
    #[arg(short = 'O', long)]
    pub objective: String,

    /// JSON file holding the task list.
    #[arg(short = 't', long)]
    pub tasks: Option<String>,

    /// Extra guidance appended to the prompt.
    #[arg(long)]
    pub context: Option<String>,
}

/// Arguments for `task-finalizer finalize`.
#[derive(Parser, Debug)]
pub struct FinalizeArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    #[command(flatten)]
    pub backend: BackendArgs,

    /// Write the output to a file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// Print the full result as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `task-finalizer run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// JSON run document.
    #[arg(short = 'i', long)]
    pub input: String,

    #[command(flatten)]
    pub backend: BackendArgs,

    /// Write the output to a file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<String>,
}

/// Arguments for `task-finalizer batch`.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// JSONL file with one finalization request per line.
    #[arg(short = 'i', long)]
    pub input: String,

    /// Maximum number of finalizations in flight.
    #[arg(long, default_value_t = DEFAULT_BATCH_CONCURRENCY)]
    pub concurrency: usize,

    #[command(flatten)]
    pub backend: BackendArgs,

    /// Write the JSONL output to a file instead of stdout.
    #[arg(short = 'o', long)]
    pub output: Option<String>,
}

/// Arguments for `task-finalizer prompt`.
#[derive(Parser, Debug)]
pub struct PromptArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Deployment file (.json, .yaml or .yml).
    #[arg(short = 'c', long)]
    pub config: Option<String>,

    /// Print the complete provider request as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `task-finalizer schema`.
#[derive(Parser, Debug)]
pub struct SchemaArgs {
    /// Print the `response_format` wrapper instead of the bare schema.
    #[arg(long)]
    pub response_format: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Finalize(args) => run_finalize_command(args).await,
        Commands::Run(args) => run_run_command(args).await,
        Commands::Batch(args) => run_batch_command(args).await,
        Commands::Prompt(args) => run_prompt_command(args),
        Commands::Schema(args) => run_schema_command(args),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_finalize_command(args: FinalizeArgs) -> anyhow::Result<()> {
    let request = load_request(&args.request)?;
    let agent = build_agent(&args.backend)?;

    let result = agent.finalize(&request).await?;
    let rendered = render_result(&result, args.json)?;
    emit(&rendered, args.output.as_deref())
}

async fn run_run_command(args: RunArgs) -> anyhow::Result<()> {
    let content = fs::read_to_string(&args.input)
        .map_err(|e| anyhow::anyhow!("Failed to read run document {}: {}", args.input, e))?;
    let input: AgentRunInput = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid run document {}: {}", args.input, e))?;

    let agent = build_agent(&args.backend)?;
    let result = agent.run(&input).await?;

    let json_output = serde_json::to_string_pretty(&result)
        .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
    emit(&json_output, args.output.as_deref())
}

/// One output line of `batch`.
#[derive(Debug, Serialize)]
struct BatchRecord {
    index: usize,
    objective: String,
    completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<FinalizationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn run_batch_command(args: BatchArgs) -> anyhow::Result<()> {
    let content = fs::read_to_string(&args.input)
        .map_err(|e| anyhow::anyhow!("Failed to read batch file {}: {}", args.input, e))?;
    let requests = parse_batch_requests(&content)?;
    if requests.is_empty() {
        anyhow::bail!("Batch file {} contains no requests", args.input);
    }

    let agent = build_agent(&args.backend)?;
    info!(
        requests = requests.len(),
        concurrency = args.concurrency,
        "Starting batch finalization"
    );

    let results = agent.finalize_batch(&requests, args.concurrency).await;
    let completed_at = Utc::now();

    let mut lines = Vec::with_capacity(results.len());
    for (index, (request, outcome)) in requests.iter().zip(results).enumerate() {
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let record = BatchRecord {
            index,
            objective: request.objective.clone(),
            completed_at,
            result,
            error,
        };
        lines.push(serde_json::to_string(&record)?);
    }

    emit(&lines.join("\n"), args.output.as_deref())
}

fn run_prompt_command(args: PromptArgs) -> anyhow::Result<()> {
    let request = load_request(&args.request)?;
    let deployment = load_deployment(args.config.as_deref(), None)?;
    let config = FinalizerConfig::from(&deployment);

    let prompt = PromptBuilder::from_optional(config.system_prompt.as_deref()).render(&request)?;

    if args.json {
        let generation = config.generation_request(prompt);
        println!("{}", serde_json::to_string_pretty(&generation)?);
    } else {
        println!("=== SYSTEM ===\n{}\n", prompt.system);
        println!("=== USER ===\n{}", prompt.user);
    }
    Ok(())
}

fn run_schema_command(args: SchemaArgs) -> anyhow::Result<()> {
    let json_output = if args.response_format {
        serde_json::to_string_pretty(&response_format())?
    } else {
        serde_json::to_string_pretty(&result_schema())?
    };
    println!("{}", json_output);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolves the deployment: file (or defaults), env overrides, then `--model`.
fn load_deployment(
    config_path: Option<&str>,
    model: Option<&str>,
) -> anyhow::Result<DeploymentConfig> {
    let deployment = match config_path {
        Some(path) => DeploymentConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load deployment {}: {}", path, e))?,
        None => DeploymentConfig::default(),
    };

    let mut deployment = deployment.with_env_overrides()?;
    if let Some(model) = model {
        deployment = deployment.with_model(model);
        deployment.validate()?;
    }
    Ok(deployment)
}

fn build_agent(backend: &BackendArgs) -> anyhow::Result<FinalizerAgent> {
    let deployment = load_deployment(backend.config.as_deref(), backend.model.as_deref())?;
    let llm_client = build_llm_client(
        backend.api_key.clone(),
        backend.api_base.clone(),
        &deployment.llm_config.model,
    )?;
    Ok(FinalizerAgent::from_deployment(llm_client, &deployment))
}

fn build_llm_client(
    api_key: Option<String>,
    api_base: Option<String>,
    model: &str,
) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let resolved_api_key = api_key.or_else(|| std::env::var("LITELLM_API_KEY").ok());

    match (api_base, resolved_api_key) {
        (Some(base), key) => {
            info!(api_base = %base, model = %model, "Using OpenAI-compatible endpoint");
            Ok(Arc::new(LiteLlmClient::new(base, key, model)?))
        }
        (None, Some(key)) => {
            info!(model = %model, "Using OpenRouter with specified API key");
            Ok(Arc::new(LiteLlmClient::new_with_defaults(key)?))
        }
        (None, None) => Err(anyhow::anyhow!(
            "No inference backend configured. Please provide --api-key or set OPENROUTER_API_KEY/LITELLM_API_KEY, or point --api-base/LITELLM_API_BASE at an OpenAI-compatible server."
        )),
    }
}

fn load_request(args: &RequestArgs) -> anyhow::Result<FinalizationRequest> {
    let tasks = match args.tasks.as_deref() {
        Some(path) => load_tasks(Path::new(path))?,
        None => Vec::new(),
    };

    let mut request = FinalizationRequest::new(args.objective.clone()).with_tasks(tasks);
    if let Some(context) = &args.context {
        request = request.with_context(context.clone());
    }
    Ok(request)
}

fn load_tasks(path: &Path) -> anyhow::Result<Vec<Task>> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read tasks file {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid tasks file {}: {}", path.display(), e))
}

/// Parses a JSONL batch file, skipping blank lines.
fn parse_batch_requests(content: &str) -> anyhow::Result<Vec<FinalizationRequest>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line)
                .map_err(|e| anyhow::anyhow!("Invalid request on line {}: {}", number + 1, e))
        })
        .collect()
}

/// Formats a result for display: Markdown report, task list, or JSON.
fn render_result(result: &FinalizationResult, json: bool) -> anyhow::Result<String> {
    if json {
        return serde_json::to_string_pretty(result)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e));
    }

    let text = match result.decision() {
        Decision::Report(report) => report.to_string(),
        Decision::NewTasks(tasks) => {
            let mut out = format!("Objective not met. {} new task(s):\n", tasks.len());
            for (i, task) in tasks.iter().enumerate() {
                out.push_str(&format!("\n{}. {}: {}", i + 1, task.name, task.description));
            }
            out
        }
    };
    Ok(text)
}

fn emit(content: &str, output: Option<&str>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, format!("{content}\n"))?;
            info!(path = %path, "Wrote output");
        }
        None => println!("{}", content),
    }
    Ok(())
}
