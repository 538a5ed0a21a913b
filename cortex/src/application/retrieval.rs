// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Hybrid Retriever
//!
//! Ranks memories for a query by running a semantic leg (vector search) and
//! a structural leg (graph property query) concurrently, then merging:
//!
//! ```text
//! combined = semantic_weight * semantic + structural_weight * structural   (found by both)
//! combined = own score                                                     (found by one)
//! ```
//!
//! Which legs run follows `SearchQuery::resolve_strategy`. In hybrid mode a
//! single failed leg is logged and skipped; the error only surfaces when no
//! leg succeeded.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{
    GraphQuery, GraphStore, Memory, MemoryId, MemorySearchResult, RetrievalConfig, SearchQuery, SearchStrategy,
    StoreError, VectorFilter, VectorStore,
};

#[derive(Default)]
struct Scored {
    semantic: Option<f64>,
    structural: Option<f64>,
    memory: Option<Memory>,
}

pub struct HybridRetriever {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(graph: Arc<dyn GraphStore>, vectors: Arc<dyn VectorStore>, config: RetrievalConfig) -> Self {
        Self { graph, vectors, config }
    }

    /// `embedding` is the query embedding, already computed by the caller
    pub async fn search(
        &self,
        query: &SearchQuery,
        embedding: Option<Vec<f32>>,
    ) -> Result<Vec<MemorySearchResult>, StoreError> {
        let strategy = query.resolve_strategy();
        let limit = query.limit.unwrap_or(self.config.default_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let pool = limit.saturating_mul(self.config.candidate_multiplier.max(1));

        let run_vector = matches!(strategy, SearchStrategy::Vector | SearchStrategy::Hybrid);
        let run_graph = matches!(strategy, SearchStrategy::Graph | SearchStrategy::Hybrid);

        let (semantic, structural) = tokio::join!(
            async {
                match (&embedding, run_vector) {
                    (Some(vector), true) if !vector.is_empty() => Some(self.vector_leg(query, vector, pool).await),
                    _ => None,
                }
            },
            async {
                if run_graph {
                    Some(self.graph_leg(query, pool).await)
                } else {
                    None
                }
            },
        );

        let (semantic, structural) = settle(strategy, semantic, structural)?;

        let mut scored: HashMap<MemoryId, Scored> = HashMap::new();
        for (id, score) in semantic {
            scored.entry(id).or_default().semantic = Some(score);
        }
        for (memory, score) in structural {
            let entry = scored.entry(memory.id).or_default();
            entry.structural = Some(score);
            entry.memory = Some(memory);
        }

        // Vector-only hits still need their node
        let missing: Vec<MemoryId> = scored
            .iter()
            .filter(|(_, s)| s.memory.is_none())
            .map(|(id, _)| *id)
            .collect();
        if !missing.is_empty() {
            for memory in self.graph.get_many(&missing).await? {
                if let Some(entry) = scored.get_mut(&memory.id) {
                    entry.memory = Some(memory);
                }
            }
        }

        let now = Utc::now();
        let mut results: Vec<MemorySearchResult> = scored
            .into_values()
            .filter_map(|s| {
                let memory = s.memory?;
                if !passes_filters(query, &memory, now) {
                    return None;
                }
                let combined = self.combine(s.semantic, s.structural);
                Some(MemorySearchResult {
                    memory,
                    combined_score: combined,
                    semantic_score: s.semantic,
                    structural_score: s.structural,
                    strategy,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.memory.id.cmp(&b.memory.id))
        });
        results.truncate(limit);

        let ids: Vec<MemoryId> = results.iter().map(|r| r.memory.id).collect();
        if !ids.is_empty() {
            match self.graph.record_access(&ids, now).await {
                Ok(()) => results.iter_mut().for_each(|r| r.memory.record_access(now)),
                Err(e) => warn!(error = %e, "Failed to record access for search results"),
            }
        }

        debug!(strategy = ?strategy, results = results.len(), "Search completed");
        Ok(results)
    }

    /// Merge law for one memory's leg scores
    pub fn combine(&self, semantic: Option<f64>, structural: Option<f64>) -> f64 {
        match (semantic, structural) {
            (Some(s), Some(g)) => self.config.semantic_weight * s + self.config.structural_weight * g,
            (Some(s), None) => s,
            (None, Some(g)) => g,
            (None, None) => 0.0,
        }
    }

    async fn vector_leg(
        &self,
        query: &SearchQuery,
        vector: &[f32],
        pool: usize,
    ) -> Result<Vec<(MemoryId, f64)>, StoreError> {
        let filter = VectorFilter {
            workspace: query.workspace.clone(),
            types: query.types.clone(),
            include_deprecated: query.include_deprecated,
            exclude: Vec::new(),
        };
        let hits = self.vectors.search(vector, &filter, pool).await?;
        Ok(hits.into_iter().map(|hit| (hit.id, hit.score)).collect())
    }

    async fn graph_leg(&self, query: &SearchQuery, pool: usize) -> Result<Vec<(Memory, f64)>, StoreError> {
        let graph_query = GraphQuery {
            workspace: query.workspace.clone(),
            tags: query.tags.clone(),
            types: query.types.clone(),
            include_deprecated: query.include_deprecated,
            limit: None,
        };
        let terms = query_terms(query);

        let mut scored: Vec<(Memory, f64)> = self
            .graph
            .query(&graph_query)
            .await?
            .into_iter()
            .map(|memory| {
                let score = structural_score(query, &terms, &memory);
                (memory, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.id.cmp(&b.0.id))
        });
        scored.truncate(pool);
        Ok(scored)
    }
}

type Legs = (Vec<(MemoryId, f64)>, Vec<(Memory, f64)>);

fn settle(
    strategy: SearchStrategy,
    semantic: Option<Result<Vec<(MemoryId, f64)>, StoreError>>,
    structural: Option<Result<Vec<(Memory, f64)>, StoreError>>,
) -> Result<Legs, StoreError> {
    match (semantic, structural) {
        (Some(Err(vector_err)), Some(Err(_))) => Err(vector_err),
        (Some(Err(e)), structural) if strategy != SearchStrategy::Hybrid || structural.is_none() => Err(e),
        (semantic, Some(Err(e))) if strategy != SearchStrategy::Hybrid || semantic.is_none() => Err(e),
        (semantic, structural) => {
            let semantic = match semantic {
                Some(Ok(hits)) => hits,
                Some(Err(e)) => {
                    warn!(error = %e, "Vector leg failed, serving structural results only");
                    Vec::new()
                }
                None => Vec::new(),
            };
            let structural = match structural {
                Some(Ok(hits)) => hits,
                Some(Err(e)) => {
                    warn!(error = %e, "Graph leg failed, serving semantic results only");
                    Vec::new()
                }
                None => Vec::new(),
            };
            Ok((semantic, structural))
        }
    }
}

fn query_terms(query: &SearchQuery) -> Vec<String> {
    query
        .text
        .as_deref()
        .unwrap_or_default()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Mean of the applicable components: keyword hit fraction, tag overlap
/// fraction and type match. Falls back to confidence when none apply.
fn structural_score(query: &SearchQuery, terms: &[String], memory: &Memory) -> f64 {
    let mut components = Vec::with_capacity(3);

    if !terms.is_empty() {
        let content = memory.content.to_lowercase();
        let hits = terms
            .iter()
            .filter(|t| content.contains(t.as_str()) || memory.metadata.tags.iter().any(|tag| tag.to_lowercase() == **t))
            .count();
        components.push(hits as f64 / terms.len() as f64);
    }
    if !query.tags.is_empty() {
        let overlap = query.tags.iter().filter(|t| memory.metadata.tags.contains(*t)).count();
        components.push(overlap as f64 / query.tags.len() as f64);
    }
    if !query.types.is_empty() {
        components.push(if query.types.contains(&memory.memory_type()) { 1.0 } else { 0.0 });
    }

    if components.is_empty() {
        memory.confidence
    } else {
        components.iter().sum::<f64>() / components.len() as f64
    }
}

fn passes_filters(query: &SearchQuery, memory: &Memory, now: chrono::DateTime<Utc>) -> bool {
    if !query.include_deprecated && memory.is_deprecated() {
        return false;
    }
    if let Some(ws) = &query.workspace {
        if memory.workspace.as_deref() != Some(ws.as_str()) {
            return false;
        }
    }
    if !query.types.is_empty() && !query.types.contains(&memory.memory_type()) {
        return false;
    }
    if !query.tags.is_empty() && !query.tags.iter().any(|t| memory.metadata.tags.contains(t)) {
        return false;
    }
    if let Some(min) = query.min_confidence {
        if memory.confidence < min {
            return false;
        }
    }
    if let Some(max_age) = query.max_age {
        let age = now.signed_duration_since(memory.created_at);
        match chrono::Duration::from_std(max_age) {
            Ok(limit) if age > limit => return false,
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GraphTransaction, MemoryKind, MemoryType, VectorEntry, VectorHit, VectorPayload};
    use crate::infrastructure::{InMemoryGraphStore, InMemoryVectorStore};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::time::Duration;

    struct DownVectorStore;

    #[async_trait]
    impl VectorStore for DownVectorStore {
        async fn upsert(&self, _id: MemoryId, _vector: Vec<f32>, _payload: VectorPayload) -> Result<(), StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }

        async fn search(&self, _vector: &[f32], _filter: &VectorFilter, _limit: usize) -> Result<Vec<VectorHit>, StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }

        async fn get(&self, _id: MemoryId) -> Result<Option<VectorEntry>, StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }

        async fn delete(&self, _id: MemoryId) -> Result<(), StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::VectorUnavailable("down".to_string()))
        }
    }

    fn memory(content: &str, tags: &[&str], workspace: &str, embedding: Vec<f32>) -> Memory {
        let kind = MemoryKind::from_content(MemoryType::Pattern, content, &BTreeSet::new(), None).unwrap();
        Memory::new(content, kind, Some(workspace.to_string()))
            .with_embedding(embedding)
            .with_confidence(0.8)
            .with_tags(tags.iter().copied())
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

    fn retriever(graph: Arc<InMemoryGraphStore>, vectors: Arc<dyn VectorStore>) -> HybridRetriever {
        HybridRetriever::new(graph, vectors, RetrievalConfig::default())
    }

    #[test]
    fn test_merge_law() {
        let r = retriever(Arc::new(InMemoryGraphStore::new()), Arc::new(InMemoryVectorStore::new()));
        assert!((r.combine(Some(0.9), Some(0.5)) - 0.78).abs() < 1e-9);
        assert_eq!(r.combine(Some(0.9), None), 0.9);
        assert_eq!(r.combine(None, Some(0.5)), 0.5);
    }

    #[tokio::test]
    async fn test_hybrid_ranks_and_scopes_to_workspace() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let close = memory("retry with backoff", &["http"], "svc", vec![1.0, 0.0]);
        let far = memory("format dates as ISO 8601", &[], "svc", vec![0.0, 1.0]);
        let other_ws = memory("retry with backoff", &["http"], "web", vec![1.0, 0.0]);
        for m in [&close, &far, &other_ws] {
            store(&graph, &vectors, m).await;
        }

        let query = SearchQuery::text("retry backoff").in_workspace("svc");
        let results = retriever(graph.clone(), vectors).search(&query, Some(vec![1.0, 0.0])).await.unwrap();

        assert_eq!(results[0].memory.id, close.id);
        assert_eq!(results[0].strategy, SearchStrategy::Hybrid);
        assert!((results[0].combined_score - 1.0).abs() < 1e-6);
        assert!(results.iter().all(|r| r.memory.workspace.as_deref() == Some("svc")));
        assert_eq!(results[0].memory.access_count, 1);
        assert_eq!(graph.get(close.id).await.unwrap().unwrap().access_count, 1);
    }

    #[tokio::test]
    async fn test_deprecated_hidden_unless_requested() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let mut old = memory("use futures 0.1", &["async"], "svc", vec![1.0, 0.0]);
        old.deprecate("superseded");
        store(&graph, &vectors, &old).await;

        let query = SearchQuery::default().with_tags(["async"]);
        let r = retriever(graph, vectors);
        assert!(r.search(&query, None).await.unwrap().is_empty());

        let mut with_deprecated = query.clone();
        with_deprecated.include_deprecated = true;
        assert_eq!(r.search(&with_deprecated, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_min_confidence_and_max_age_filters() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let mut stale = memory("stale advice", &["t"], "svc", vec![1.0, 0.0]);
        stale.created_at = Utc::now() - chrono::Duration::days(30);
        let weak = memory("weak advice", &["t"], "svc", vec![1.0, 0.0]).with_confidence(0.2);
        let good = memory("good advice", &["t"], "svc", vec![1.0, 0.0]);
        for m in [&stale, &weak, &good] {
            store(&graph, &vectors, m).await;
        }

        let mut query = SearchQuery::default().with_tags(["t"]);
        query.min_confidence = Some(0.5);
        query.max_age = Some(Duration::from_secs(7 * 24 * 3600));

        let results = retriever(graph, vectors).search(&query, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.id, good.id);
        assert_eq!(results[0].strategy, SearchStrategy::Graph);
    }

    #[tokio::test]
    async fn test_hybrid_survives_vector_outage() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let m = memory("retry with backoff", &[], "svc", vec![1.0, 0.0]);
        let mut tx = graph.begin(m.id).await.unwrap();
        tx.put_memory(m.clone());
        tx.commit().await.unwrap();

        let r = retriever(graph, Arc::new(DownVectorStore));
        let hybrid = SearchQuery::text("retry").in_workspace("svc");
        let results = r.search(&hybrid, Some(vec![1.0, 0.0])).await.unwrap();
        assert_eq!(results.len(), 1);

        let vector_only = SearchQuery::text("retry");
        let err = r.search(&vector_only, Some(vec![1.0, 0.0])).await.unwrap_err();
        assert!(matches!(err, StoreError::VectorUnavailable(_)));
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        for i in 0..6 {
            store(&graph, &vectors, &memory(&format!("note {}", i), &["n"], "svc", vec![1.0, i as f32])).await;
        }
        let query = SearchQuery::default().with_tags(["n"]).with_limit(4);
        assert_eq!(retriever(graph, vectors).search(&query, None).await.unwrap().len(), 4);
    }
}
