// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Evolution command: one memory, one workspace or everything

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use memex_cortex::domain::{EvolutionStats, MemoryId};

use super::print_json;
use crate::wiring::Runtime;

#[derive(Debug, Args)]
pub struct EvolveArgs {
    /// Evolve a single memory
    #[arg(long, conflicts_with = "workspace")]
    pub id: Option<MemoryId>,

    /// Sweep one workspace (default: all)
    #[arg(short, long)]
    pub workspace: Option<String>,

    #[arg(long)]
    pub json: bool,
}

pub async fn evolve(runtime: &Runtime, args: EvolveArgs) -> Result<()> {
    let stats = match args.id {
        Some(id) => runtime
            .service
            .evolve(id)
            .await
            .with_context(|| format!("Failed to evolve memory {}", id))?,
        None => runtime
            .service
            .evolve_workspace(args.workspace.as_deref())
            .await
            .context("Evolution sweep failed")?,
    };
    runtime.persist().await?;

    if args.json {
        return print_json(&stats);
    }
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &EvolutionStats) {
    println!("{}", "Evolution completed".green().bold());
    println!("  analyzed:                {}", stats.analyzed);
    println!("  strength updates:        {}", stats.strength_updates);
    println!("  contradictions resolved: {}", stats.contradictions_resolved);
    println!("  merges executed:         {}", stats.merges_executed);
    println!("  deprecations:            {}", stats.deprecations);
}
