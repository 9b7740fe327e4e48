//! # actorflow
//!
//! Command-line runner for declarative workflow files.
//!
//! Every vertex of the workflow runs as its own actor; the run report is
//! printed as JSON on stdout, logs go to stderr.
//!
//! ## Quick Start
//! ```bash
//! actorflow validate pipeline.yaml
//! actorflow run pipeline.yaml --input '{"fetch": {"day": "2024-05-01"}}' --mermaid
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Configuration management
mod config;

/// Workflow file format
mod definition;

// =============================================================================
// IMPORTS
// =============================================================================
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use actorflow::{BuiltWorkflow, VertexId, WorkflowExecutionContext};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::definition::WorkflowFile;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
/// # Rust Concept: Subcommands with Clap
///
/// `#[derive(Subcommand)]` on an enum turns every variant into a subcommand
/// with its own arguments.
#[derive(Parser, Debug)]
#[command(
    name = "actorflow",
    version,
    about = "Run dependency-driven workflows on an actor engine",
    long_about = r#"
actorflow - run a workflow file where every vertex is an actor.

A vertex starts once all of its dependencies completed. The first failing
vertex stops the whole run.

ENVIRONMENT:
  ACTORFLOW_MAILBOX_CAPACITY  bound every mailbox (0 or unset = unbounded)
  ACTORFLOW_INPUT_MERGE       last_message | by_dependency
  ACTORFLOW_LOG_LEVEL         log filter, e.g. info or actorflow=debug

EXAMPLES:
  # Check a workflow and print its execution levels
  actorflow validate pipeline.yaml

  # Run it, seeding the root vertex "fetch"
  actorflow run pipeline.yaml --input '{"fetch": {"day": "2024-05-01"}}'
"#
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", global = true, help = "Enable debug logging")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build and execute a workflow file
    Run {
        /// Workflow file (.yaml, .yml or .json)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// JSON object mapping root vertex ids to their input
        #[arg(short = 'i', long = "input", value_name = "JSON")]
        input: Option<String>,

        /// Also print a Mermaid diagram coloured by vertex state
        #[arg(long = "mermaid")]
        mermaid: bool,
    },

    /// Validate a workflow file without running it
    Validate {
        /// Workflow file (.yaml, .yml or .json)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = Config::from_env()?;
    config.validate()?;
    init_logging(&config, args.verbose)?;

    match args.command {
        Command::Run {
            file,
            input,
            mermaid,
        } => run(&config, file, input.as_deref(), mermaid).await,
        Command::Validate { file } => validate(&config, file),
    }
}

fn load_workflow(config: &Config, file: &Path) -> Result<BuiltWorkflow> {
    let workflow = WorkflowFile::load(file)?
        .into_builder(config.engine_config())
        .build()
        .with_context(|| format!("workflow in {} is invalid", file.display()))?;

    info!(
        workflow = %workflow.id(),
        vertices = workflow.vertex_count(),
        edges = workflow.edge_count(),
        "Workflow loaded"
    );
    Ok(workflow)
}

async fn run(config: &Config, file: PathBuf, input: Option<&str>, mermaid: bool) -> Result<ExitCode> {
    let workflow = load_workflow(config, &file)?;
    let input = parse_input(input)?;

    let context = WorkflowExecutionContext::new(workflow.id());
    let (report, diagram) = workflow.execute_with_results(context, input).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if mermaid {
        println!("\n{}", diagram);
    }

    if report.is_completed() {
        info!(elapsed_ms = report.duration.as_millis() as u64, "Workflow completed");
        Ok(ExitCode::SUCCESS)
    } else {
        for (vertex, err) in &report.errors {
            error!(vertex = %vertex, error = %err, "Vertex failed");
        }
        Ok(ExitCode::FAILURE)
    }
}

fn validate(config: &Config, file: PathBuf) -> Result<ExitCode> {
    let workflow = load_workflow(config, &file)?;
    let stats = workflow.stats();

    println!("workflow '{}' is valid", workflow.id());
    println!(
        "{} vertices, {} edges, depth {}, max parallelism {}",
        stats.vertex_count, stats.edge_count, stats.depth, stats.max_parallelism
    );
    for (level, vertices) in workflow.execution_order().iter().enumerate() {
        let names: Vec<&str> = vertices.iter().map(VertexId::as_str).collect();
        println!("  level {}: {}", level, names.join(", "));
    }
    Ok(ExitCode::SUCCESS)
}

/// `--input` must be a JSON object keyed by vertex id
fn parse_input(input: Option<&str>) -> Result<HashMap<VertexId, Value>> {
    match input {
        Some(raw) => serde_json::from_str(raw).context("--input must be a JSON object keyed by vertex id"),
        None => Ok(HashMap::new()),
    }
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Initialize the tracing subscriber for structured logging.
///
/// Logs go to stderr so that stdout only carries the report.
fn init_logging(config: &Config, verbose: bool) -> Result<()> {
    let directive = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_new(directive)
        .with_context(|| format!("invalid log filter '{}'", directive))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
