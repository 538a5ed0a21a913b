// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hybrid search command

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::time::Duration;

use memex_cortex::domain::SearchQuery;

use super::{print_json, StrategyArg, TypeArg};
use crate::wiring::Runtime;

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Free-text query
    #[arg(value_name = "TEXT")]
    pub text: Option<String>,

    #[arg(short, long)]
    pub workspace: Option<String>,

    /// Restrict to memory types (repeatable)
    #[arg(short = 't', long = "type", value_enum)]
    pub types: Vec<TypeArg>,

    /// Match any of these tags (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    #[arg(long)]
    pub min_confidence: Option<f64>,

    /// Only memories created within this window, e.g. `7d` or `12h`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub max_age: Option<Duration>,

    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Override the strategy inferred from the query
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    #[arg(long)]
    pub include_deprecated: bool,

    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn to_query(&self) -> SearchQuery {
        SearchQuery {
            text: self.text.clone(),
            embedding: None,
            workspace: self.workspace.clone(),
            types: self.types.iter().map(|t| (*t).into()).collect(),
            tags: self.tags.clone(),
            min_confidence: self.min_confidence,
            max_age: self.max_age,
            limit: self.limit,
            include_deprecated: self.include_deprecated,
            strategy: self.strategy.map(Into::into),
        }
    }
}

pub async fn search(runtime: &Runtime, args: SearchArgs) -> Result<()> {
    let results = runtime
        .service
        .search(args.to_query())
        .await
        .context("Search failed")?;
    // Access counts changed
    runtime.persist().await?;

    if args.json {
        return print_json(&results);
    }
    if results.is_empty() {
        println!("{}", "No matching memories".dimmed());
        return Ok(());
    }
    for (rank, result) in results.iter().enumerate() {
        let memory = &result.memory;
        println!(
            "{:>2}. {} {} {}",
            rank + 1,
            format!("{:.3}", result.combined_score).bold(),
            format!("[{}]", memory.memory_type().as_str()).cyan(),
            memory.summary()
        );
        println!(
            "    {}  workspace: {}  v{}",
            memory.id.to_string().dimmed(),
            memory.workspace.as_deref().unwrap_or("-"),
            memory.version()
        );
    }
    Ok(())
}
