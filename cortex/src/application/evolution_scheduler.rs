// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Evolution Scheduler - Background task running periodic evolution sweeps
//!
//! Sweeps every configured workspace on a fixed interval until shutdown.
//! A sweep in progress observes the same cancellation token and stops
//! between memories.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Drives `EvolutionEngine::evolve_workspace` without a caller

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{CortexError, EvolutionConfig, EvolutionStats};

/// Anything that can sweep a workspace
#[async_trait]
pub trait EvolutionRunner: Send + Sync {
    async fn evolve_workspace_until(
        &self,
        workspace: Option<&str>,
        shutdown: &CancellationToken,
    ) -> Result<EvolutionStats, CortexError>;
}

pub struct EvolutionScheduler {
    runner: Arc<dyn EvolutionRunner>,
    config: EvolutionConfig,
    /// `None` sweeps every workspace in one pass
    workspaces: Vec<Option<String>>,
    shutdown_token: CancellationToken,
}

impl EvolutionScheduler {
    pub fn new(runner: Arc<dyn EvolutionRunner>, config: EvolutionConfig) -> Self {
        Self {
            runner,
            config,
            workspaces: vec![None],
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Restrict sweeps to these workspaces
    pub fn with_workspaces<I, S>(mut self, workspaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.workspaces = workspaces.into_iter().map(|w| Some(w.into())).collect();
        self
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Evolution scheduler is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            workspaces = self.workspaces.len(),
            "Starting evolution scheduler"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_seconds.max(1)));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running evolution cycle");
                    let stats = self.run_cycle().await;
                    info!(
                        analyzed = stats.analyzed,
                        merges = stats.merges_executed,
                        deprecations = stats.deprecations,
                        "Evolution cycle completed"
                    );
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping evolution scheduler");
                    break;
                }
            }
        }

        info!("Evolution scheduler stopped");
    }

    /// One sweep over every configured workspace. A failing workspace is
    /// logged and skipped.
    pub async fn run_cycle(&self) -> EvolutionStats {
        let mut total = EvolutionStats::default();
        for workspace in &self.workspaces {
            if self.shutdown_token.is_cancelled() {
                break;
            }
            match self
                .runner
                .evolve_workspace_until(workspace.as_deref(), &self.shutdown_token)
                .await
            {
                Ok(stats) => total += stats,
                Err(e) => warn!(workspace = ?workspace, error = %e, "Evolution sweep failed"),
            }
        }
        total
    }
}
