//! matscout: materials-selection agent runner.
//!
//! Runs the agent against a scripted model so the full pipeline (prompt,
//! parsing, sandbox, tools, store, trace) can be exercised offline.
//!
//! Usage:
//!   matscout run --design "safety helmet" --criterion lightweight
//!   matscout run --task "Say hello" --script replies.txt
//!   matscout sweep --config matscout.toml
//!   matscout extract-answer "final_answer('Wood')"

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use matscout_bench::{build_harness, recorded_answer, ResultRecorder, RunDriver, ScriptedBackend};
use matscout_config::HarnessConfig;
use matscout_contracts::error::{HarnessError, HarnessResult};
use matscout_core::{compile_question, extract_final_answer};
use matscout_trace::JsonlTraceLogger;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Materials-selection agent harness.
#[derive(Parser)]
#[command(
    name = "matscout",
    about = "Run the matscout materials-selection agent",
    long_about = "Runs the matscout agent over a materials database, logging every\n\
                  model exchange and tool call to a JSONL trace."
)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the trace file path.
    #[arg(long, global = true)]
    trace: Option<PathBuf>,

    /// Override the materials CSV path.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent once, on a design question or a free-form task.
    Run {
        #[arg(long, requires = "criterion", conflicts_with = "task")]
        design: Option<String>,
        #[arg(long, requires = "design")]
        criterion: Option<String>,
        #[arg(long)]
        task: Option<String>,
        /// Model replies to replay, separated by `---` lines.
        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Run every design against every criterion and append to the results CSV.
    Sweep {
        #[arg(long)]
        script: Option<PathBuf>,
        /// Override the results CSV path.
        #[arg(long)]
        results: Option<PathBuf>,
    },
    /// Print the literal answer of the last `final_answer(...)` call in TEXT.
    ExtractAnswer { text: String },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    if let Err(e) = dispatch(cli) {
        eprintln!("matscout error: {}", e);
        std::process::exit(1);
    }
}

fn dispatch(cli: Cli) -> HarnessResult<()> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(trace) = cli.trace {
        config.trace.path = trace;
    }
    if let Some(store) = cli.store {
        config.store.path = Some(store);
    }
    debug!(?config, "effective configuration");

    match cli.command {
        Command::Run { design, criterion, task, script } => {
            let task = match (design, criterion, task) {
                (Some(design), Some(criterion), _) => compile_question(&design, &criterion),
                (_, _, Some(task)) => task,
                _ => {
                    return Err(HarnessError::Config {
                        reason: "run needs either --design and --criterion, or --task".to_string(),
                    })
                }
            };
            run_once(&config, &task, script.as_deref())
        }
        Command::Sweep { script, results } => {
            if let Some(results) = results {
                config.results.path = results;
            }
            sweep(&config, script.as_deref())
        }
        Command::ExtractAnswer { text } => {
            match extract_final_answer(&text) {
                Some(answer) => println!("{}", answer),
                None => println!("(no final answer found)"),
            }
            Ok(())
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn backend(script: Option<&Path>) -> HarnessResult<ScriptedBackend> {
    match script {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| HarnessError::Config {
                reason: format!("failed to read script file '{}': {}", path.display(), e),
            })?;
            Ok(ScriptedBackend::from_script(&text))
        }
        None => Ok(ScriptedBackend::smoke()),
    }
}

fn run_once(config: &HarnessConfig, task: &str, script: Option<&Path>) -> HarnessResult<()> {
    let sink = Arc::new(JsonlTraceLogger::open_global(&config.trace.path)?);
    let mut harness = build_harness(config, Arc::new(backend(script)?), sink)?;

    let outcome = harness.agent.run(task);

    println!("Task:   {}", task.lines().last().unwrap_or(task));
    println!("Status: {}", outcome.status.label());
    println!("Steps:  {}", outcome.steps());
    println!("Tokens: {}", outcome.usage.total());
    println!("Answer: {}", recorded_answer(&outcome));
    println!("Trace:  {}", config.trace.path.display());
    Ok(())
}

fn sweep(config: &HarnessConfig, script: Option<&Path>) -> HarnessResult<()> {
    let sink = Arc::new(JsonlTraceLogger::open_global(&config.trace.path)?);
    let harness = build_harness(config, Arc::new(backend(script)?), sink)?;
    let recorder = ResultRecorder::open(&config.results.path)?;

    let mut driver = RunDriver::new(harness.agent).with_recorder(recorder);
    let rows = driver.run_standard_grid()?;

    for row in &rows {
        println!(
            "{:<22} {:<20} {:<20} {:>2}  {}",
            row.design, row.criterion, row.status, row.steps, row.answer
        );
    }
    let done = rows.iter().filter(|r| r.status == "done").count();
    println!();
    println!("{}/{} cases answered; results appended to {}", done, rows.len(), config.results.path.display());
    Ok(())
}
