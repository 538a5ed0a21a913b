// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Interfaces
//!
//! Contracts for the external collaborators the pipeline consumes. The
//! graph and vector engines, the embedding model, the reasoning oracle and
//! the audit log are never implemented here; concrete adapters live in
//! `crate::infrastructure` and are wired once at startup.
//!
//! | Trait | Implementations |
//! |-------|----------------|
//! | `EmbeddingProvider` | `HashingEmbeddingProvider`, `CachedEmbeddingProvider` |
//! | `GraphStore` | `InMemoryGraphStore` |
//! | `VectorStore` | `InMemoryVectorStore`, `QdrantVectorStore` (feature `qdrant`) |
//! | `ReasoningOracle` | none shipped; optional |
//! | `AuditSink` | `TracingAuditSink`, `BroadcastAuditSink` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::arbitration::{OracleContext, OracleProposal};
use super::error::{OracleError, StoreError};
use super::events::AuditEvent;
use super::memory::{Memory, MemoryId, MemoryType};
use super::relationship::MemoryRelationship;

/// Text to fixed-dimension vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Fails with `StoreError::EmbeddingUnavailable`
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError>;

    fn dimensions(&self) -> usize;
}

/// Property filter for graph lookups
#[derive(Debug, Clone, Default)]
pub struct GraphQuery {
    pub workspace: Option<String>,
    /// Match memories carrying at least one of these tags
    pub tags: Vec<String>,
    pub types: Vec<MemoryType>,
    pub include_deprecated: bool,
    pub limit: Option<usize>,
}

impl GraphQuery {
    pub fn matches(&self, memory: &Memory) -> bool {
        if !self.include_deprecated && memory.is_deprecated() {
            return false;
        }
        if let Some(ws) = &self.workspace {
            if memory.workspace.as_deref() != Some(ws.as_str()) {
                return false;
            }
        }
        if !self.types.is_empty() && !self.types.contains(&memory.memory_type()) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| memory.metadata.tags.contains(t)) {
            return false;
        }
        true
    }
}

/// Memory nodes and typed relationships
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn get(&self, id: MemoryId) -> Result<Option<Memory>, StoreError>;

    /// Missing ids are skipped; order follows `ids`
    async fn get_many(&self, ids: &[MemoryId]) -> Result<Vec<Memory>, StoreError>;

    async fn query(&self, query: &GraphQuery) -> Result<Vec<Memory>, StoreError>;

    /// Edges touching `id` in either direction
    async fn relationships(&self, id: MemoryId) -> Result<Vec<MemoryRelationship>, StoreError>;

    /// Bump access counters; not a content mutation
    async fn record_access(&self, ids: &[MemoryId], at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Open a write scope limited to one memory
    async fn begin(&self, memory_id: MemoryId) -> Result<Box<dyn GraphTransaction>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Staged writes for a single memory. Nothing is visible to readers until
/// `commit` returns. A commit never lowers the stored access counters.
#[async_trait]
pub trait GraphTransaction: Send {
    fn memory_id(&self) -> MemoryId;

    fn put_memory(&mut self, memory: Memory);

    /// The edge must involve the transaction's memory
    fn put_relationship(&mut self, relationship: MemoryRelationship);

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Filterable payload stored next to each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
    pub workspace: Option<String>,
    pub memory_type: MemoryType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
}

impl VectorPayload {
    pub fn for_memory(memory: &Memory) -> Self {
        Self {
            workspace: memory.workspace.clone(),
            memory_type: memory.memory_type(),
            tags: memory.metadata.tags.iter().cloned().collect(),
            deprecated: memory.is_deprecated(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub workspace: Option<String>,
    pub types: Vec<MemoryType>,
    pub include_deprecated: bool,
    pub exclude: Vec<MemoryId>,
}

impl VectorFilter {
    pub fn matches(&self, id: MemoryId, payload: &VectorPayload) -> bool {
        if self.exclude.contains(&id) {
            return false;
        }
        if !self.include_deprecated && payload.deprecated {
            return false;
        }
        if let Some(ws) = &self.workspace {
            if payload.workspace.as_deref() != Some(ws.as_str()) {
                return false;
            }
        }
        self.types.is_empty() || self.types.contains(&payload.memory_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    pub id: MemoryId,
    /// Cosine similarity; implementations clamp it to `[0.0, 1.0]`
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: MemoryId,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// Embeddings with similarity search
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, id: MemoryId, vector: Vec<f32>, payload: VectorPayload) -> Result<(), StoreError>;

    /// Ranked by score, highest first
    async fn search(&self, vector: &[f32], filter: &VectorFilter, limit: usize) -> Result<Vec<VectorHit>, StoreError>;

    async fn get(&self, id: MemoryId) -> Result<Option<VectorEntry>, StoreError>;

    async fn delete(&self, id: MemoryId) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Optional decision support consulted by arbitration
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn propose(&self, context: &OracleContext) -> Result<OracleProposal, OracleError>;

    /// Liveness probe for the health report
    async fn ping(&self) -> Result<(), OracleError> {
        Ok(())
    }
}

/// Fire-and-forget audit trail
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()>;
}
