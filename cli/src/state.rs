// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! JSON state file holding both stores between invocations

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use memex_cortex::domain::VectorEntry;
use memex_cortex::infrastructure::{GraphSnapshot, InMemoryGraphStore, InMemoryVectorStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub graph: GraphSnapshot,
    #[serde(default)]
    pub vectors: Vec<VectorEntry>,
}

impl StateSnapshot {
    pub async fn capture(graph: &InMemoryGraphStore, vectors: &InMemoryVectorStore) -> Self {
        Self {
            graph: graph.snapshot().await,
            vectors: vectors.snapshot().await,
        }
    }

    pub async fn restore_into(self, graph: &InMemoryGraphStore, vectors: &InMemoryVectorStore) {
        graph.restore(self.graph).await;
        vectors.restore(self.vectors).await;
    }

    /// A missing file is an empty state
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No state file, starting empty");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Corrupt state file {}", path.display()))
    }

    /// Write through a sibling temp file so a crash never truncates the state
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
        debug!(
            path = %path.display(),
            memories = self.graph.memories.len(),
            "State saved"
        );
        Ok(())
    }
}
