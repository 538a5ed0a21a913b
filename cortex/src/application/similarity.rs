// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Similarity Finder
//!
//! Finds existing memories related to a candidate through three sources
//! queried concurrently:
//!
//! - **semantic**: vector search on the candidate embedding
//! - **structural**: graph query on tag overlap, scored `0.6 * jaccard + 0.4 * type match`
//! - **contextual**: memories whose tags co-occur with the candidate's tags
//!   elsewhere in the workspace
//!
//! A failed or timed-out source is logged and contributes nothing.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Feeds the quality gate, risk assessor and arbitration engine

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{
    CandidateMemory, GraphQuery, GraphStore, Memory, SimilarMemory, SimilarityConfig, SimilaritySource, StoreError,
    VectorFilter, VectorStore,
};

/// Jaccard index of two tag sets; two empty sets score 0
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub struct SimilarityFinder {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    config: SimilarityConfig,
}

impl SimilarityFinder {
    pub fn new(graph: Arc<dyn GraphStore>, vectors: Arc<dyn VectorStore>, config: SimilarityConfig) -> Self {
        Self { graph, vectors, config }
    }

    pub async fn find_similar(&self, candidate: &CandidateMemory) -> Vec<SimilarMemory> {
        let (semantic, structural, contextual) = tokio::join!(
            self.guarded(SimilaritySource::Semantic, self.semantic(candidate)),
            self.guarded(SimilaritySource::Structural, self.structural(candidate)),
            self.guarded(SimilaritySource::Contextual, self.contextual(candidate)),
        );

        let mut seen = HashSet::new();
        let mut merged: Vec<SimilarMemory> = semantic
            .into_iter()
            .chain(structural)
            .chain(contextual)
            .filter(|s| seen.insert(s.id()))
            .collect();

        merged.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(self.config.max_results);

        debug!(
            count = merged.len(),
            duplicates = merged.iter().filter(|s| s.duplicate).count(),
            "Similar memories found"
        );
        merged
    }

    /// Apply the per-source timeout and turn failures into empty results
    async fn guarded<F>(&self, source: SimilaritySource, query: F) -> Vec<SimilarMemory>
    where
        F: Future<Output = Result<Vec<SimilarMemory>, StoreError>>,
    {
        let timeout = Duration::from_millis(self.config.source_timeout_ms);
        match tokio::time::timeout(timeout, query).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(source = ?source, error = %e, "Similarity source failed, continuing without it");
                Vec::new()
            }
            Err(_) => {
                warn!(source = ?source, timeout_ms = self.config.source_timeout_ms, "Similarity source timed out");
                Vec::new()
            }
        }
    }

    async fn semantic(&self, candidate: &CandidateMemory) -> Result<Vec<SimilarMemory>, StoreError> {
        if candidate.embedding.is_empty() {
            return Ok(Vec::new());
        }

        let filter = VectorFilter {
            workspace: candidate.workspace.clone(),
            ..VectorFilter::default()
        };
        let hits = self
            .vectors
            .search(&candidate.embedding, &filter, self.config.max_results)
            .await?;

        // Hydrate from the graph; a vector without a committed node is skipped
        let ids: Vec<_> = hits.iter().map(|h| h.id).collect();
        let memories = self.graph.get_many(&ids).await?;

        Ok(hits
            .iter()
            .filter_map(|hit| {
                let memory = memories.iter().find(|m| m.id == hit.id)?;
                Some(SimilarMemory {
                    memory: memory.clone(),
                    similarity: hit.score,
                    source: SimilaritySource::Semantic,
                    duplicate: hit.score > self.config.duplicate_threshold,
                })
            })
            .collect())
    }

    async fn structural(&self, candidate: &CandidateMemory) -> Result<Vec<SimilarMemory>, StoreError> {
        if candidate.tags.is_empty() {
            return Ok(Vec::new());
        }

        let query = GraphQuery {
            workspace: candidate.workspace.clone(),
            tags: candidate.tags.iter().cloned().collect(),
            limit: Some(self.config.max_results * 3),
            ..GraphQuery::default()
        };
        let memories = self.graph.query(&query).await?;

        Ok(memories
            .into_iter()
            .filter_map(|memory| {
                let type_match = if memory.memory_type() == candidate.memory_type { 1.0 } else { 0.0 };
                let score = 0.6 * jaccard(&candidate.tags, &memory.metadata.tags) + 0.4 * type_match;
                self.scored(memory, score, SimilaritySource::Structural)
            })
            .collect())
    }

    async fn contextual(&self, candidate: &CandidateMemory) -> Result<Vec<SimilarMemory>, StoreError> {
        let Some(workspace) = candidate.workspace.clone() else {
            return Ok(Vec::new());
        };
        if candidate.tags.is_empty() {
            return Ok(Vec::new());
        }

        let query = GraphQuery {
            workspace: Some(workspace),
            ..GraphQuery::default()
        };
        let memories = self.graph.query(&query).await?;

        // Tags that co-occur with the candidate's tags somewhere in the workspace
        let mut neighborhood = candidate.tags.clone();
        for memory in &memories {
            if !memory.metadata.tags.is_disjoint(&candidate.tags) {
                neighborhood.extend(memory.metadata.tags.iter().cloned());
            }
        }

        Ok(memories
            .into_iter()
            .filter(|memory| !memory.metadata.tags.is_empty() && memory.metadata.tags.is_disjoint(&candidate.tags))
            .filter_map(|memory| {
                let shared = memory.metadata.tags.intersection(&neighborhood).count() as f64;
                let score = 0.5 * shared / memory.metadata.tags.len() as f64;
                self.scored(memory, score, SimilaritySource::Contextual)
            })
            .collect())
    }

    fn scored(&self, memory: Memory, score: f64, source: SimilaritySource) -> Option<SimilarMemory> {
        if score < self.config.min_structural_score {
            return None;
        }
        Some(SimilarMemory {
            memory,
            similarity: score.clamp(0.0, 1.0),
            source,
            duplicate: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GraphTransaction, MemoryId, MemoryKind, MemoryType, VectorPayload};
    use crate::infrastructure::{InMemoryGraphStore, InMemoryVectorStore};
    use async_trait::async_trait;

    struct DownVectorStore;

    #[async_trait]
    impl VectorStore for DownVectorStore {
        async fn upsert(&self, _id: MemoryId, _vector: Vec<f32>, _payload: VectorPayload) -> Result<(), StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }

        async fn search(&self, _vector: &[f32], _filter: &VectorFilter, _limit: usize) -> Result<Vec<crate::domain::VectorHit>, StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }

        async fn get(&self, _id: MemoryId) -> Result<Option<crate::domain::VectorEntry>, StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }

        async fn delete(&self, _id: MemoryId) -> Result<(), StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }
    }

    fn tags(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|t| t.to_string()).collect()
    }

    fn memory(content: &str, tag_values: &[&str], embedding: Vec<f32>) -> Memory {
        let kind = MemoryKind::from_content(MemoryType::Pattern, content, &tags(tag_values), Some("svc")).unwrap();
        Memory::new(content, kind, Some("svc".to_string()))
            .with_tags(tag_values.iter().copied())
            .with_embedding(embedding)
    }

    fn candidate(content: &str, tag_values: &[&str], embedding: Vec<f32>) -> CandidateMemory {
        CandidateMemory {
            content: content.to_string(),
            memory_type: MemoryType::Pattern,
            workspace: Some("svc".to_string()),
            tags: tags(tag_values),
            source: None,
            kind: MemoryKind::from_content(MemoryType::Pattern, content, &tags(tag_values), Some("svc")).unwrap(),
            embedding,
            confidence: None,
            relationships: vec![],
        }
    }

    async fn store(graph: &InMemoryGraphStore, vectors: &InMemoryVectorStore, memory: &Memory) {
        let mut tx = graph.begin(memory.id).await.unwrap();
        tx.put_memory(memory.clone());
        tx.commit().await.unwrap();
        vectors
            .upsert(memory.id, memory.embedding.clone(), VectorPayload::for_memory(memory))
            .await
            .unwrap();
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&tags(&[]), &tags(&[])), 0.0);
        assert_eq!(jaccard(&tags(&["a", "b"]), &tags(&["b", "c"])), 1.0 / 3.0);
    }

    #[tokio::test]
    async fn test_semantic_duplicate_flagged() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let existing = memory("Use async/await for error handling", &[], vec![1.0, 0.0]);
        store(&graph, &vectors, &existing).await;

        let finder = SimilarityFinder::new(graph, vectors, SimilarityConfig::default());
        let found = finder.find_similar(&candidate("same", &[], vec![1.0, 0.0])).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, SimilaritySource::Semantic);
        assert!(found[0].duplicate);
    }

    #[tokio::test]
    async fn test_dedup_keeps_semantic_entry() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let existing = memory("jwt validation", &["auth"], vec![0.6, 0.8]);
        store(&graph, &vectors, &existing).await;

        let finder = SimilarityFinder::new(graph, vectors, SimilarityConfig::default());
        let found = finder.find_similar(&candidate("auth tokens", &["auth"], vec![1.0, 0.0])).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, SimilaritySource::Semantic);
        assert!((found[0].similarity - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_failed_vector_source_degrades_gracefully() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let existing = memory("jwt validation", &["auth", "jwt"], vec![1.0, 0.0]);
        let mut tx = graph.begin(existing.id).await.unwrap();
        tx.put_memory(existing.clone());
        tx.commit().await.unwrap();

        let finder = SimilarityFinder::new(graph, Arc::new(DownVectorStore), SimilarityConfig::default());
        let found = finder.find_similar(&candidate("auth tokens", &["auth", "jwt"], vec![1.0, 0.0])).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, SimilaritySource::Structural);
        assert!((found[0].similarity - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_contextual_matches_cooccurring_tags() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let bridge = memory("sessions use jwt", &["auth", "session"], vec![0.0, 1.0]);
        let neighbor = memory("session ttl is 15m", &["session"], vec![0.0, 1.0]);
        let unrelated = memory("yaml uses two spaces", &["style"], vec![0.0, 1.0]);
        for m in [&bridge, &neighbor, &unrelated] {
            store(&graph, &vectors, m).await;
        }

        let finder = SimilarityFinder::new(graph, vectors, SimilarityConfig::default());
        let found = finder.find_similar(&candidate("rotate auth keys", &["auth"], vec![])).await;

        let contextual: Vec<_> = found.iter().filter(|s| s.source == SimilaritySource::Contextual).collect();
        assert_eq!(contextual.len(), 1);
        assert_eq!(contextual[0].id(), neighbor.id);
        assert!(found.iter().all(|s| s.id() != unrelated.id));

        let sorted = found.windows(2).all(|w| w[0].similarity >= w[1].similarity);
        assert!(sorted);
    }
}
