// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Foreground evolution scheduler, stopped with Ctrl-C

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use memex_cortex::application::EvolutionScheduler;
use memex_cortex::domain::EvolutionConfig;

use crate::wiring::Runtime;

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    /// Workspace to sweep (repeatable, default: all)
    #[arg(short, long = "workspace", value_name = "WORKSPACE")]
    pub workspaces: Vec<String>,

    /// Override evolution.interval_seconds
    #[arg(long)]
    pub interval: Option<u64>,
}

pub async fn schedule(runtime: &Runtime, args: ScheduleArgs) -> Result<()> {
    let mut config: EvolutionConfig = runtime.service.config().evolution.clone();
    if let Some(interval) = args.interval {
        config.interval_seconds = interval;
    }
    config.enabled = true;

    let mut scheduler = EvolutionScheduler::new(runtime.service.clone(), config);
    if !args.workspaces.is_empty() {
        scheduler = scheduler.with_workspaces(args.workspaces);
    }
    let scheduler = Arc::new(scheduler);
    let shutdown = scheduler.shutdown_token();
    let handle = scheduler.start();

    println!("{}", "Evolution scheduler running, press Ctrl-C to stop".green());
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Stopping evolution scheduler");
    shutdown.cancel();
    handle.await.context("Evolution scheduler task failed")?;

    runtime.persist().await
}
