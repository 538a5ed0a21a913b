// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the memex CLI

pub mod config;
pub mod evolve;
pub mod health;
pub mod ingest;
pub mod schedule;
pub mod search;

pub use self::config::ConfigCommand;
pub use self::evolve::EvolveArgs;
pub use self::ingest::{IngestArgs, IngestBatchArgs};
pub use self::schedule::ScheduleArgs;
pub use self::search::SearchArgs;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

use memex_cortex::domain::{MemoryType, SearchStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TypeArg {
    Pattern,
    Reasoning,
    Workspace,
}

impl From<TypeArg> for MemoryType {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Pattern => MemoryType::Pattern,
            TypeArg::Reasoning => MemoryType::Reasoning,
            TypeArg::Workspace => MemoryType::Workspace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Vector,
    Graph,
    Hybrid,
}

impl From<StrategyArg> for SearchStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Vector => SearchStrategy::Vector,
            StrategyArg::Graph => SearchStrategy::Graph,
            StrategyArg::Hybrid => SearchStrategy::Hybrid,
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
