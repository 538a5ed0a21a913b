// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory vector store with brute-force cosine search

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::embedding_client::cosine_similarity;
use crate::domain::{MemoryId, StoreError, VectorEntry, VectorFilter, VectorHit, VectorPayload, VectorStore};

/// In-memory implementation of `VectorStore`
pub struct InMemoryVectorStore {
    entries: Arc<RwLock<HashMap<MemoryId, VectorEntry>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<VectorEntry> {
        let entries = self.entries.read().await;
        let mut all: Vec<VectorEntry> = entries.values().cloned().collect();
        all.sort_by_key(|e| e.id);
        all
    }

    pub async fn restore(&self, snapshot: Vec<VectorEntry>) {
        let mut entries = self.entries.write().await;
        *entries = snapshot.into_iter().map(|e| (e.id, e)).collect();
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, id: MemoryId, vector: Vec<f32>, payload: VectorPayload) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(id, VectorEntry { id, vector, payload });
        Ok(())
    }

    async fn search(&self, vector: &[f32], filter: &VectorFilter, limit: usize) -> Result<Vec<VectorHit>, StoreError> {
        let entries = self.entries.read().await;

        let mut results: Vec<VectorHit> = entries
            .values()
            .filter(|entry| filter.matches(entry.id, &entry.payload))
            .map(|entry| VectorHit {
                id: entry.id,
                score: cosine_similarity(vector, &entry.vector),
            })
            .collect();

        // Sort by similarity descending
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        Ok(results)
    }

    async fn get(&self, id: MemoryId) -> Result<Option<VectorEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&id).cloned())
    }

    async fn delete(&self, id: MemoryId) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(&id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
