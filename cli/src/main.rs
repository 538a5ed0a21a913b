// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # memex CLI
//!
//! Front end for the cognitive memory layer. Each invocation hydrates the
//! in-memory graph and vector stores from a JSON state file, runs one
//! command against the memory service and writes the state back.
//!
//! ## Commands
//!
//! - `memex ingest|ingest-batch` - Arbitrate and store candidate memories
//! - `memex search` - Hybrid retrieval
//! - `memex get` - Fetch one memory
//! - `memex evolve|schedule` - Evolution, once or on an interval
//! - `memex health` - Component probes
//! - `memex config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use memex_cli::commands::{self, ConfigCommand, EvolveArgs, IngestArgs, IngestBatchArgs, ScheduleArgs, SearchArgs};
use memex_cli::wiring::{load_config, Runtime, DEFAULT_STATE_PATH};
use memex_cortex::domain::MemoryId;

/// memex - cognitive memory for coding agents
#[derive(Parser)]
#[command(name = "memex")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (default: built-in defaults)
    #[arg(short, long, global = true, env = "MEMEX_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the JSON state file
    #[arg(
        long,
        global = true,
        env = "MEMEX_STATE_PATH",
        value_name = "FILE",
        default_value = DEFAULT_STATE_PATH
    )]
    state: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "MEMEX_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Service(ServiceCommand),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Commands that run against the memory service
#[derive(Subcommand)]
enum ServiceCommand {
    /// Arbitrate and store one candidate memory
    Ingest(IngestArgs),

    /// Ingest a JSON array of candidates
    #[command(name = "ingest-batch")]
    IngestBatch(IngestBatchArgs),

    /// Search memories
    Search(SearchArgs),

    /// Print one memory as JSON
    Get {
        #[arg(value_name = "ID")]
        id: MemoryId,
    },

    /// Run evolution once
    Evolve(EvolveArgs),

    /// Run evolution sweeps on an interval until Ctrl-C
    Schedule(ScheduleArgs),

    /// Probe the stores, embedder and oracle
    Health {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config, &cli.state),
        Some(Commands::Service(command)) => {
            let config = load_config(cli.config.as_deref())?;
            let runtime = Runtime::new(config, cli.state).await?;
            run(&runtime, command).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

async fn run(runtime: &Runtime, command: ServiceCommand) -> Result<()> {
    match command {
        ServiceCommand::Ingest(args) => commands::ingest::ingest(runtime, args).await,
        ServiceCommand::IngestBatch(args) => commands::ingest::ingest_batch(runtime, args).await,
        ServiceCommand::Search(args) => commands::search::search(runtime, args).await,
        ServiceCommand::Get { id } => {
            let memory = runtime
                .service
                .get(id)
                .await
                .with_context(|| format!("Failed to load memory {}", id))?;
            println!("{}", serde_json::to_string_pretty(&memory)?);
            Ok(())
        }
        ServiceCommand::Evolve(args) => commands::evolve::evolve(runtime, args).await,
        ServiceCommand::Schedule(args) => commands::schedule::schedule(runtime, args).await,
        ServiceCommand::Health { json } => commands::health::health(runtime, json).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
