// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Builds the memory service for one CLI invocation
//!
//! Stores are in-memory and hydrated from the state file; mutating commands
//! call [`Runtime::persist`] before exiting.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use memex_cortex::application::MemoryService;
use memex_cortex::domain::CortexConfig;
use memex_cortex::infrastructure::{
    CachedEmbeddingProvider, HashingEmbeddingProvider, InMemoryGraphStore, InMemoryVectorStore, TracingAuditSink,
};

use crate::state::StateSnapshot;

pub const DEFAULT_STATE_PATH: &str = "./memex-state.json";

/// `--config` when given, else defaults
pub fn load_config(path: Option<&Path>) -> Result<CortexConfig> {
    match path {
        Some(path) => CortexConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(CortexConfig::default()),
    }
}

pub struct Runtime {
    pub service: Arc<MemoryService>,
    graph: Arc<InMemoryGraphStore>,
    vectors: Arc<InMemoryVectorStore>,
    state_path: PathBuf,
}

impl Runtime {
    pub async fn new(config: CortexConfig, state_path: PathBuf) -> Result<Self> {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        StateSnapshot::load(&state_path)?
            .restore_into(&graph, &vectors)
            .await;

        let embedder = Arc::new(CachedEmbeddingProvider::from_config(
            Arc::new(HashingEmbeddingProvider::new(config.embedding.dimensions)),
            &config.embedding,
        ));

        let service = MemoryService::new(
            config,
            graph.clone(),
            vectors.clone(),
            embedder,
            Some(Arc::new(TracingAuditSink::new())),
        )
        .context("Failed to initialize memory service")?;

        info!(
            state = %state_path.display(),
            memories = graph.len().await,
            "Memory service ready"
        );

        Ok(Self {
            service: Arc::new(service),
            graph,
            vectors,
            state_path,
        })
    }

    pub async fn persist(&self) -> Result<()> {
        StateSnapshot::capture(&self.graph, &self.vectors)
            .await
            .save(&self.state_path)
    }
}
