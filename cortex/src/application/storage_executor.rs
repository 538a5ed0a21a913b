// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Storage Executor
//!
//! Applies an arbitration decision to the graph and vector stores.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Only component that writes memory content
//!
//! Every write is a dual write: the graph node and its edges are staged in a
//! `GraphTransaction`, the vector is upserted, then the transaction commits.
//! A failed vector upsert rolls the transaction back; a failed commit restores
//! the previous vector. Writes to one memory are serialised by a per-memory
//! async mutex so concurrent UPDATE/MERGE calls never lose a version; the
//! mutex is dropped from the table once nobody holds or waits on it.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::domain::{
    ArbitrationResult, CandidateMemory, Decision, EmbeddingProvider, GraphStore, Memory, MemoryId,
    MemoryRelationship, MergeStrategy, QualityScore, RelationshipType, Revision, SimilarMemory, StoreError,
    VectorPayload, VectorStore,
};

/// What a decision did to the stores
#[derive(Debug, Clone, PartialEq)]
pub enum StorageOutcome {
    NoWrite,
    Added {
        memory_id: MemoryId,
    },
    Updated {
        memory_id: MemoryId,
        old_version: u32,
        new_version: u32,
    },
    Merged {
        memory_id: MemoryId,
        strategy: MergeStrategy,
        new_version: u32,
        /// The write landed but left the stores needing a human look
        review_required: bool,
    },
    Deprecated {
        memory_id: MemoryId,
        reason: String,
    },
}

impl StorageOutcome {
    pub fn memory_id(&self) -> Option<MemoryId> {
        match self {
            StorageOutcome::NoWrite => None,
            StorageOutcome::Added { memory_id }
            | StorageOutcome::Updated { memory_id, .. }
            | StorageOutcome::Merged { memory_id, .. }
            | StorageOutcome::Deprecated { memory_id, .. } => Some(*memory_id),
        }
    }

    pub fn review_required(&self) -> bool {
        matches!(self, StorageOutcome::Merged { review_required: true, .. })
    }
}

/// Held per-memory lock; releasing it prunes the idle entry
struct MemoryLock<'a> {
    locks: &'a DashMap<MemoryId, Arc<Mutex<()>>>,
    id: MemoryId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MemoryLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

pub struct StorageExecutor {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    locks: DashMap<MemoryId, Arc<Mutex<()>>>,
    /// Similar memories above this similarity get a SIMILAR_TO edge on ADD
    relate_threshold: f64,
}

impl StorageExecutor {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        relate_threshold: f64,
    ) -> Self {
        Self {
            graph,
            vectors,
            embedder,
            locks: DashMap::new(),
            relate_threshold,
        }
    }

    pub async fn execute(
        &self,
        result: &ArbitrationResult,
        candidate: &CandidateMemory,
        similar: &[SimilarMemory],
    ) -> Result<StorageOutcome, StoreError> {
        let quality = result.audit.quality;
        let target = || {
            result
                .target_memory_id
                .ok_or_else(|| StoreError::Transaction(format!("{} decision without target", result.decision)))
        };

        match result.decision {
            Decision::Reject => Ok(StorageOutcome::NoWrite),
            Decision::Add => self.add(candidate, similar, quality).await,
            Decision::Update => self.update(target()?, candidate, quality).await,
            Decision::Merge => {
                let strategy = result.merge_strategy.unwrap_or(MergeStrategy::Append);
                self.merge(target()?, strategy, candidate, quality).await
            }
            Decision::Deprecate => {
                let id = target()?;
                let reason = result.reasoning.clone();
                self.deprecate(id, &reason).await?;
                Ok(StorageOutcome::Deprecated { memory_id: id, reason })
            }
        }
    }

    async fn add(
        &self,
        candidate: &CandidateMemory,
        similar: &[SimilarMemory],
        quality: QualityScore,
    ) -> Result<StorageOutcome, StoreError> {
        let mut memory = Memory::new(candidate.content.clone(), candidate.kind.clone(), candidate.workspace.clone())
            .with_embedding(candidate.embedding.clone())
            .with_quality(quality)
            .with_confidence(candidate.confidence.unwrap_or_else(|| quality.overall()))
            .with_tags(candidate.tags.iter().cloned());
        memory.metadata.source = candidate.source.clone();

        let mut edges: Vec<MemoryRelationship> = similar
            .iter()
            .filter(|s| s.similarity > self.relate_threshold)
            .map(|s| {
                MemoryRelationship::new(
                    memory.id,
                    s.id(),
                    RelationshipType::SimilarTo,
                    s.similarity,
                    format!("{:?} similarity at admission", s.source).to_lowercase(),
                )
            })
            .collect();
        edges.extend(self.requested_edges(memory.id, candidate).await?);

        self.commit_dual(&mut memory, edges).await?;
        info!(memory_id = %memory.id, memory_type = %memory.memory_type().as_str(), "Memory added");
        Ok(StorageOutcome::Added { memory_id: memory.id })
    }

    async fn update(
        &self,
        target: MemoryId,
        candidate: &CandidateMemory,
        quality: QualityScore,
    ) -> Result<StorageOutcome, StoreError> {
        let _lock = self.lock(target).await;

        let mut memory = self.load(target).await?;
        let old_version = memory.version();
        memory.revise(candidate.content.clone(), candidate.embedding.clone(), quality);
        memory.metadata.tags.extend(candidate.tags.iter().cloned());

        let edges = self.requested_edges(target, candidate).await?;
        self.commit_dual(&mut memory, edges).await?;

        info!(memory_id = %target, old_version, new_version = memory.version(), "Memory updated");
        Ok(StorageOutcome::Updated {
            memory_id: target,
            old_version,
            new_version: memory.version(),
        })
    }

    async fn merge(
        &self,
        target: MemoryId,
        strategy: MergeStrategy,
        candidate: &CandidateMemory,
        quality: QualityScore,
    ) -> Result<StorageOutcome, StoreError> {
        let _lock = self.lock(target).await;

        let mut memory = self.load(target).await?;
        let edges = self.requested_edges(target, candidate).await?;

        match strategy {
            MergeStrategy::Append => {
                let content = format!("{}\n\n{}", memory.content, candidate.content);
                let embedding = self.embedder.embed(&content).await?;
                let best = better_quality(memory.quality, quality);
                memory.revise(content, embedding, best);
            }
            MergeStrategy::Replace => {
                memory.metadata.history.push(Revision {
                    version: memory.version(),
                    content: memory.content.clone(),
                    replaced_at: Utc::now(),
                });
                memory.revise(candidate.content.clone(), candidate.embedding.clone(), quality);
            }
            MergeStrategy::Synthesize => {
                memory.metadata.pending_synthesis.push(candidate.content.clone());
                memory.metadata.synthesis_review_required = true;
                memory.bump_version();
            }
            MergeStrategy::Version => {
                return self.supersede(memory, candidate, quality, edges).await;
            }
        }
        memory.metadata.tags.extend(candidate.tags.iter().cloned());

        self.commit_dual(&mut memory, edges).await?;
        info!(memory_id = %target, %strategy, new_version = memory.version(), "Memory merged");
        Ok(StorageOutcome::Merged {
            memory_id: target,
            strategy,
            new_version: memory.version(),
            review_required: false,
        })
    }

    /// New memory at `target.version + 1` linked EVOLVED_FROM the target,
    /// which is then deprecated. Caller holds the target lock.
    ///
    /// Once the successor is committed it is the result: if deprecating the
    /// target then fails, both stay live and the outcome is flagged for review.
    async fn supersede(
        &self,
        mut target: Memory,
        candidate: &CandidateMemory,
        quality: QualityScore,
        requested: Vec<MemoryRelationship>,
    ) -> Result<StorageOutcome, StoreError> {
        let mut successor = Memory::new(candidate.content.clone(), candidate.kind.clone(), candidate.workspace.clone())
            .with_embedding(candidate.embedding.clone())
            .with_quality(quality)
            .with_confidence(candidate.confidence.unwrap_or(target.confidence))
            .with_tags(target.metadata.tags.union(&candidate.tags).cloned());
        successor.metadata.source = candidate.source.clone();
        successor.metadata.version = target.version().saturating_add(1);

        // Requested edges were built for the target; re-home them
        let mut edges: Vec<MemoryRelationship> = requested
            .into_iter()
            .map(|mut edge| {
                edge.source_id = successor.id;
                edge
            })
            .collect();
        edges.push(MemoryRelationship::new(
            successor.id,
            target.id,
            RelationshipType::EvolvedFrom,
            1.0,
            "versioned merge",
        ));
        self.commit_dual(&mut successor, edges).await?;

        target.deprecate(format!("superseded by {}", successor.id));
        let review_required = match self.commit_dual(&mut target, Vec::new()).await {
            Ok(()) => false,
            Err(e) => {
                error!(
                    memory_id = %target.id,
                    successor = %successor.id,
                    error = %e,
                    "Superseded memory could not be deprecated, both versions live"
                );
                true
            }
        };

        info!(memory_id = %successor.id, supersedes = %target.id, version = successor.version(), "Memory versioned");
        Ok(StorageOutcome::Merged {
            memory_id: successor.id,
            strategy: MergeStrategy::Version,
            new_version: successor.version(),
            review_required,
        })
    }

    /// Soft-remove a memory; it stays readable with `include_deprecated`
    pub async fn deprecate(&self, id: MemoryId, reason: &str) -> Result<Memory, StoreError> {
        let reason = reason.to_string();
        let memory = self
            .modify(id, move |memory| {
                memory.deprecate(reason);
                Vec::new()
            })
            .await?;
        info!(memory_id = %id, "Memory deprecated");
        Ok(memory)
    }

    /// Locked read-modify-write of one memory. The closure returns edges to
    /// stage alongside the node.
    pub async fn modify<F>(&self, id: MemoryId, change: F) -> Result<Memory, StoreError>
    where
        F: FnOnce(&mut Memory) -> Vec<MemoryRelationship> + Send,
    {
        let _lock = self.lock(id).await;

        let mut memory = self.load(id).await?;
        let edges = change(&mut memory);
        self.commit_dual(&mut memory, edges).await?;
        Ok(memory)
    }

    /// Fold `absorb` into `keep` and deprecate `absorb`.
    ///
    /// `Append` concatenates the content and re-embeds it; `Replace` keeps
    /// the survivor's content and records a REPLACES edge. Other strategies
    /// are treated as `Replace`. Returns the survivor's new version.
    ///
    /// If `absorb` cannot be deprecated the survivor is written back as it
    /// was before the merge and the error is returned.
    pub async fn absorb(&self, keep: MemoryId, absorb: MemoryId, strategy: MergeStrategy) -> Result<u32, StoreError> {
        if keep == absorb {
            return Err(StoreError::Transaction(format!("cannot merge {} into itself", keep)));
        }

        // Fixed lock order across both memories
        let (first, second) = if keep < absorb { (keep, absorb) } else { (absorb, keep) };
        let _first = self.lock(first).await;
        let _second = self.lock(second).await;

        let mut survivor = self.load(keep).await?;
        let mut absorbed = self.load(absorb).await?;
        let original = survivor.clone();

        let mut edges = Vec::new();
        match strategy {
            MergeStrategy::Append => {
                let content = format!("{}\n\n{}", survivor.content, absorbed.content);
                let embedding = self.embedder.embed(&content).await?;
                let best = better_quality(survivor.quality, absorbed.quality);
                survivor.revise(content, embedding, best);
            }
            _ => {
                edges.push(MemoryRelationship::new(
                    keep,
                    absorb,
                    RelationshipType::Replaces,
                    1.0,
                    "evolution merge",
                ));
                survivor.bump_version();
            }
        }
        survivor.metadata.tags.extend(absorbed.metadata.tags.iter().cloned());
        survivor.access_count = survivor.access_count.saturating_add(absorbed.access_count);

        self.commit_dual(&mut survivor, edges).await?;

        absorbed.deprecate(format!("merged into {}", keep));
        if let Err(e) = self.commit_dual(&mut absorbed, Vec::new()).await {
            warn!(keep = %keep, absorb = %absorb, error = %e, "Absorbed memory could not be deprecated, restoring survivor");
            let mut restored = original;
            if let Err(rb) = self.commit_dual(&mut restored, Vec::new()).await {
                error!(memory_id = %keep, error = %rb, "Survivor restore failed, stores hold merged content");
            }
            return Err(e);
        }

        debug!(keep = %keep, absorb = %absorb, %strategy, version = survivor.version(), "Memories merged");
        Ok(survivor.version())
    }

    async fn lock(&self, id: MemoryId) -> MemoryLock<'_> {
        let mutex = self.locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let guard = mutex.lock_owned().await;
        MemoryLock {
            locks: &self.locks,
            id,
            guard: Some(guard),
        }
    }

    async fn load(&self, id: MemoryId) -> Result<Memory, StoreError> {
        self.graph
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Caller-requested edges whose target exists; others are dropped with a warning
    async fn requested_edges(
        &self,
        source: MemoryId,
        candidate: &CandidateMemory,
    ) -> Result<Vec<MemoryRelationship>, StoreError> {
        if candidate.relationships.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<MemoryId> = candidate.relationships.iter().map(|r| r.target_id).collect();
        let existing: Vec<MemoryId> = self.graph.get_many(&ids).await?.into_iter().map(|m| m.id).collect();

        Ok(candidate
            .relationships
            .iter()
            .filter(|r| {
                let found = existing.contains(&r.target_id) && r.target_id != source;
                if !found {
                    warn!(target = %r.target_id, "Requested relationship target does not exist, skipping");
                }
                found
            })
            .map(|r| MemoryRelationship::new(source, r.target_id, r.relationship_type, r.strength, r.context.clone()))
            .collect())
    }

    /// Graph transaction plus vector upsert, both or neither
    async fn commit_dual(&self, memory: &mut Memory, edges: Vec<MemoryRelationship>) -> Result<(), StoreError> {
        for edge in &edges {
            if edge.source_id == memory.id {
                memory.relate(edge.clone());
            }
        }
        memory.clamp_scores();

        let write_vector = !memory.embedding.is_empty();
        let previous = if write_vector { self.vectors.get(memory.id).await? } else { None };

        let mut tx = self.graph.begin(memory.id).await?;
        tx.put_memory(memory.clone());
        for edge in edges {
            tx.put_relationship(edge);
        }

        if write_vector {
            let payload = VectorPayload::for_memory(memory);
            if let Err(e) = self.vectors.upsert(memory.id, memory.embedding.clone(), payload).await {
                warn!(memory_id = %memory.id, error = %e, "Vector upsert failed, rolling back graph write");
                if let Err(rb) = tx.rollback().await {
                    error!(memory_id = %memory.id, error = %rb, "Graph rollback failed");
                }
                return Err(e);
            }
        }

        if let Err(e) = tx.commit().await {
            warn!(memory_id = %memory.id, error = %e, "Graph commit failed, compensating vector write");
            if write_vector {
                self.compensate(memory.id, previous).await;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn compensate(&self, id: MemoryId, previous: Option<crate::domain::VectorEntry>) {
        let restored = match previous {
            Some(entry) => self.vectors.upsert(id, entry.vector, entry.payload).await,
            None => self.vectors.delete(id).await,
        };
        if let Err(e) = restored {
            error!(memory_id = %id, error = %e, "Vector compensation failed, stores may diverge");
        }
    }
}

fn better_quality(a: QualityScore, b: QualityScore) -> QualityScore {
    if b.overall() > a.overall() {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        content_hash, GraphQuery, GraphTransaction, MemoryKind, MemoryType, RequestedRelationship, RiskAssessment,
        SimilaritySource, VectorEntry, VectorFilter, VectorHit,
    };
    use crate::infrastructure::{HashingEmbeddingProvider, InMemoryGraphStore, InMemoryVectorStore};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct DownVectorStore;

    #[async_trait]
    impl VectorStore for DownVectorStore {
        async fn upsert(&self, _id: MemoryId, _vector: Vec<f32>, _payload: VectorPayload) -> Result<(), StoreError> {
            Err(StoreError::VectorUnavailable("connection refused".to_string()))
        }

        async fn search(&self, _vector: &[f32], _filter: &VectorFilter, _limit: usize) -> Result<Vec<VectorHit>, StoreError> {
            Ok(vec![])
        }

        async fn get(&self, _id: MemoryId) -> Result<Option<VectorEntry>, StoreError> {
            Ok(None)
        }

        async fn delete(&self, _id: MemoryId) -> Result<(), StoreError> {
            Ok(())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::VectorUnavailable("connection refused".to_string()))
        }
    }

    /// Transaction whose commit always times out
    struct FailingTransaction(MemoryId);

    #[async_trait]
    impl GraphTransaction for FailingTransaction {
        fn memory_id(&self) -> MemoryId {
            self.0
        }

        fn put_memory(&mut self, _memory: Memory) {}

        fn put_relationship(&mut self, _relationship: MemoryRelationship) {}

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            Err(StoreError::GraphUnavailable("commit timed out".to_string()))
        }

        async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// In-memory graph with a pause before every `begin`; the `fail_begin`-th
    /// transaction (1-based) cannot commit
    struct ScriptedGraph {
        inner: Arc<InMemoryGraphStore>,
        begin_delay: Duration,
        fail_begin: Option<usize>,
        begins: AtomicUsize,
    }

    impl ScriptedGraph {
        fn new(inner: Arc<InMemoryGraphStore>) -> Self {
            Self {
                inner,
                begin_delay: Duration::ZERO,
                fail_begin: None,
                begins: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GraphStore for ScriptedGraph {
        async fn get(&self, id: MemoryId) -> Result<Option<Memory>, StoreError> {
            self.inner.get(id).await
        }

        async fn get_many(&self, ids: &[MemoryId]) -> Result<Vec<Memory>, StoreError> {
            self.inner.get_many(ids).await
        }

        async fn query(&self, query: &GraphQuery) -> Result<Vec<Memory>, StoreError> {
            self.inner.query(query).await
        }

        async fn relationships(&self, id: MemoryId) -> Result<Vec<MemoryRelationship>, StoreError> {
            self.inner.relationships(id).await
        }

        async fn record_access(&self, ids: &[MemoryId], at: DateTime<Utc>) -> Result<(), StoreError> {
            self.inner.record_access(ids, at).await
        }

        async fn begin(&self, memory_id: MemoryId) -> Result<Box<dyn GraphTransaction>, StoreError> {
            let n = self.begins.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.begin_delay.is_zero() {
                tokio::time::sleep(self.begin_delay).await;
            }
            if self.fail_begin == Some(n) {
                return Ok(Box::new(FailingTransaction(memory_id)));
            }
            self.inner.begin(memory_id).await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn scripted_fixture(graph: ScriptedGraph) -> (Arc<InMemoryGraphStore>, Arc<InMemoryVectorStore>, StorageExecutor) {
        let inner = graph.inner.clone();
        let vectors = Arc::new(InMemoryVectorStore::new());
        let executor = StorageExecutor::new(
            Arc::new(graph),
            vectors.clone(),
            Arc::new(HashingEmbeddingProvider::new(4)),
            0.6,
        );
        (inner, vectors, executor)
    }

    async fn add(executor: &StorageExecutor, content: &str) -> MemoryId {
        executor
            .execute(&decision(Decision::Add, None), &candidate(content, vec![1.0, 0.0, 0.0, 0.0]), &[])
            .await
            .unwrap()
            .memory_id()
            .unwrap()
    }

    fn candidate(content: &str, embedding: Vec<f32>) -> CandidateMemory {
        let tags: BTreeSet<String> = ["rust".to_string()].into_iter().collect();
        CandidateMemory {
            content: content.to_string(),
            memory_type: MemoryType::Pattern,
            workspace: Some("svc".to_string()),
            kind: MemoryKind::from_content(MemoryType::Pattern, content, &tags, None).unwrap(),
            tags,
            source: Some("session-1".to_string()),
            embedding,
            confidence: None,
            relationships: vec![],
        }
    }

    fn decision(decision: Decision, target: Option<MemoryId>) -> ArbitrationResult {
        let mut result = ArbitrationResult::new(
            decision,
            0.9,
            "test decision",
            content_hash("x"),
            &[],
            QualityScore::uniform(0.8),
            RiskAssessment::default(),
        );
        result.target_memory_id = target;
        result
    }

    struct Fixture {
        graph: Arc<InMemoryGraphStore>,
        vectors: Arc<InMemoryVectorStore>,
        executor: StorageExecutor,
    }

    fn fixture() -> Fixture {
        let graph = Arc::new(InMemoryGraphStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let executor = StorageExecutor::new(
            graph.clone(),
            vectors.clone(),
            Arc::new(HashingEmbeddingProvider::new(4)),
            0.6,
        );
        Fixture { graph, vectors, executor }
    }

    async fn seed(fx: &Fixture, content: &str) -> MemoryId {
        let outcome = fx
            .executor
            .execute(&decision(Decision::Add, None), &candidate(content, vec![1.0, 0.0, 0.0, 0.0]), &[])
            .await
            .unwrap();
        outcome.memory_id().unwrap()
    }

    #[tokio::test]
    async fn test_add_writes_both_stores() {
        let fx = fixture();
        let id = seed(&fx, "Use async/await for error handling").await;

        let memory = fx.graph.get(id).await.unwrap().unwrap();
        assert_eq!(memory.version(), 1);
        assert_eq!(memory.metadata.source.as_deref(), Some("session-1"));
        assert!((memory.confidence - QualityScore::uniform(0.8).overall()).abs() < 1e-9);
        assert!(fx.vectors.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_add_links_similar_memories() {
        let fx = fixture();
        let existing = seed(&fx, "Prefer ? over unwrap").await;
        let similar = vec![SimilarMemory {
            memory: fx.graph.get(existing).await.unwrap().unwrap(),
            similarity: 0.8,
            source: SimilaritySource::Semantic,
            duplicate: false,
        }];

        let mut cand = candidate("Propagate errors with ?", vec![0.9, 0.1, 0.0, 0.0]);
        cand.relationships.push(RequestedRelationship {
            target_id: MemoryId::new(),
            relationship_type: RelationshipType::DependsOn,
            strength: 1.0,
            context: String::new(),
        });

        let outcome = fx.executor.execute(&decision(Decision::Add, None), &cand, &similar).await.unwrap();
        let id = outcome.memory_id().unwrap();

        let edges = fx.graph.relationships(id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship_type, RelationshipType::SimilarTo);
        assert_eq!(edges[0].target_id, existing);
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let fx = fixture();
        let id = seed(&fx, "Use tokio::spawn for background work").await;

        let outcome = fx
            .executor
            .execute(
                &decision(Decision::Update, Some(id)),
                &candidate("Use tokio::spawn for background work, keep the JoinHandle", vec![0.0, 1.0, 0.0, 0.0]),
                &[],
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            StorageOutcome::Updated {
                memory_id: id,
                old_version: 1,
                new_version: 2
            }
        );
        let vector = fx.vectors.get(id).await.unwrap().unwrap();
        assert_eq!(vector.vector, vec![0.0, 1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_concurrent_updates_never_lose_a_version() {
        let fx = fixture();
        let id = seed(&fx, "base").await;
        let update = decision(Decision::Update, Some(id));
        let a = candidate("first revision", vec![0.0, 1.0, 0.0, 0.0]);
        let b = candidate("second revision", vec![0.0, 0.0, 1.0, 0.0]);

        let (ra, rb) = tokio::join!(
            fx.executor.execute(&update, &a, &[]),
            fx.executor.execute(&update, &b, &[]),
        );
        ra.unwrap();
        rb.unwrap();

        assert_eq!(fx.graph.get(id).await.unwrap().unwrap().version(), 3);
    }

    #[tokio::test]
    async fn test_merge_strategies() {
        let fx = fixture();

        let append_id = seed(&fx, "Log with tracing").await;
        let mut merge = decision(Decision::Merge, Some(append_id)).with_merge_strategy(MergeStrategy::Append);
        fx.executor
            .execute(&merge, &candidate("Attach span fields", vec![0.0, 1.0, 0.0, 0.0]), &[])
            .await
            .unwrap();
        let appended = fx.graph.get(append_id).await.unwrap().unwrap();
        assert_eq!(appended.content, "Log with tracing\n\nAttach span fields");
        assert_eq!(appended.version(), 2);

        let replace_id = seed(&fx, "Old advice").await;
        merge = decision(Decision::Merge, Some(replace_id)).with_merge_strategy(MergeStrategy::Replace);
        fx.executor
            .execute(&merge, &candidate("New advice", vec![0.0, 1.0, 0.0, 0.0]), &[])
            .await
            .unwrap();
        let replaced = fx.graph.get(replace_id).await.unwrap().unwrap();
        assert_eq!(replaced.content, "New advice");
        assert_eq!(replaced.metadata.history[0].content, "Old advice");

        let synth_id = seed(&fx, "Draft").await;
        merge = decision(Decision::Merge, Some(synth_id)).with_merge_strategy(MergeStrategy::Synthesize);
        fx.executor
            .execute(&merge, &candidate("Another angle", vec![0.0, 1.0, 0.0, 0.0]), &[])
            .await
            .unwrap();
        let synth = fx.graph.get(synth_id).await.unwrap().unwrap();
        assert_eq!(synth.content, "Draft");
        assert!(synth.metadata.synthesis_review_required);
        assert_eq!(synth.metadata.pending_synthesis, vec!["Another angle".to_string()]);
        assert_eq!(synth.version(), 2);
    }

    #[tokio::test]
    async fn test_version_merge_supersedes_target() {
        let fx = fixture();
        let old = seed(&fx, "Use futures 0.1").await;
        let merge = decision(Decision::Merge, Some(old)).with_merge_strategy(MergeStrategy::Version);

        let outcome = fx
            .executor
            .execute(&merge, &candidate("Use futures 0.3", vec![0.0, 1.0, 0.0, 0.0]), &[])
            .await
            .unwrap();

        let new_id = outcome.memory_id().unwrap();
        assert_ne!(new_id, old);
        let successor = fx.graph.get(new_id).await.unwrap().unwrap();
        assert_eq!(successor.version(), 2);
        assert_eq!(successor.relationships_of_type(RelationshipType::EvolvedFrom).count(), 1);
        assert!(fx.graph.get(old).await.unwrap().unwrap().is_deprecated());
    }

    #[tokio::test]
    async fn test_version_merge_flags_review_when_target_stays_live() {
        let mut graph = ScriptedGraph::new(Arc::new(InMemoryGraphStore::new()));
        // 1: seed, 2: successor, 3: deprecate the target
        graph.fail_begin = Some(3);
        let (graph, vectors, executor) = scripted_fixture(graph);
        let old = add(&executor, "Use futures 0.1").await;

        let merge = decision(Decision::Merge, Some(old)).with_merge_strategy(MergeStrategy::Version);
        let outcome = executor
            .execute(&merge, &candidate("Use futures 0.3", vec![0.0, 1.0, 0.0, 0.0]), &[])
            .await
            .unwrap();

        assert!(outcome.review_required());
        let new_id = outcome.memory_id().unwrap();
        assert_eq!(graph.get(new_id).await.unwrap().unwrap().version(), 2);
        assert!(!graph.get(old).await.unwrap().unwrap().is_deprecated());
        assert!(!vectors.get(old).await.unwrap().unwrap().payload.deprecated);
    }

    #[tokio::test]
    async fn test_absorb_restores_survivor_when_loser_cannot_be_deprecated() {
        let mut graph = ScriptedGraph::new(Arc::new(InMemoryGraphStore::new()));
        // 1, 2: seeds, 3: survivor, 4: deprecate the loser, 5: restore
        graph.fail_begin = Some(4);
        let (graph, vectors, executor) = scripted_fixture(graph);
        let keep = add(&executor, "Prefer borrowing").await;
        let absorb = add(&executor, "Avoid needless clones").await;

        let err = executor.absorb(keep, absorb, MergeStrategy::Append).await.unwrap_err();

        assert!(matches!(err, StoreError::GraphUnavailable(_)));
        let survivor = graph.get(keep).await.unwrap().unwrap();
        assert_eq!(survivor.content, "Prefer borrowing");
        assert_eq!(survivor.version(), 1);
        assert_eq!(vectors.get(keep).await.unwrap().unwrap().vector, vec![1.0, 0.0, 0.0, 0.0]);
        assert!(!graph.get(absorb).await.unwrap().unwrap().is_deprecated());
    }

    #[tokio::test]
    async fn test_write_keeps_access_recorded_during_it() {
        let mut graph = ScriptedGraph::new(Arc::new(InMemoryGraphStore::new()));
        graph.begin_delay = Duration::from_millis(100);
        let (graph, _vectors, executor) = scripted_fixture(graph);
        let id = add(&executor, "Index foreign keys").await;

        let (deprecated, _) = tokio::join!(executor.deprecate(id, "outdated"), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            graph.record_access(&[id], Utc::now()).await.unwrap();
        });
        deprecated.unwrap();

        let stored = graph.get(id).await.unwrap().unwrap();
        assert!(stored.is_deprecated());
        assert_eq!(stored.access_count, 1);
    }

    #[tokio::test]
    async fn test_idle_locks_are_released() {
        let fx = fixture();
        let id = seed(&fx, "base").await;
        let update = decision(Decision::Update, Some(id));

        let first = candidate("first", vec![0.0, 1.0, 0.0, 0.0]);
        let (ra, rb) = tokio::join!(
            fx.executor.execute(&update, &first, &[]),
            fx.executor.deprecate(id, "superseded"),
        );
        ra.unwrap();
        rb.unwrap();

        assert!(fx.executor.locks.is_empty());
    }

    #[tokio::test]
    async fn test_missing_target_is_not_found() {
        let fx = fixture();
        let err = fx
            .executor
            .execute(&decision(Decision::Update, Some(MemoryId::new())), &candidate("x", vec![1.0]), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_vector_failure_leaves_graph_untouched() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let executor = StorageExecutor::new(
            graph.clone(),
            Arc::new(DownVectorStore),
            Arc::new(HashingEmbeddingProvider::new(4)),
            0.6,
        );

        let err = executor
            .execute(&decision(Decision::Add, None), &candidate("x", vec![1.0, 0.0, 0.0, 0.0]), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::VectorUnavailable(_)));
        assert!(graph.is_empty().await);
    }

    #[tokio::test]
    async fn test_graph_commit_failure_removes_new_vector() {
        let mut graph = ScriptedGraph::new(Arc::new(InMemoryGraphStore::new()));
        graph.fail_begin = Some(1);
        let (_graph, vectors, executor) = scripted_fixture(graph);

        let err = executor
            .execute(&decision(Decision::Add, None), &candidate("x", vec![1.0, 0.0, 0.0, 0.0]), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::GraphUnavailable(_)));
        assert!(vectors.is_empty().await);
    }

    #[tokio::test]
    async fn test_absorb_deprecates_loser() {
        let fx = fixture();
        let keep = seed(&fx, "Prefer borrowing").await;
        let absorb = seed(&fx, "Avoid needless clones").await;

        let version = fx.executor.absorb(keep, absorb, MergeStrategy::Replace).await.unwrap();

        assert_eq!(version, 2);
        let survivor = fx.graph.get(keep).await.unwrap().unwrap();
        assert_eq!(survivor.relationships_of_type(RelationshipType::Replaces).count(), 1);
        let loser = fx.graph.get(absorb).await.unwrap().unwrap();
        assert!(loser.is_deprecated());
        assert!(fx.vectors.get(absorb).await.unwrap().unwrap().payload.deprecated);
    }

    #[tokio::test]
    async fn test_reject_writes_nothing() {
        let fx = fixture();
        let outcome = fx
            .executor
            .execute(&decision(Decision::Reject, None), &candidate("x", vec![1.0, 0.0, 0.0, 0.0]), &[])
            .await
            .unwrap();
        assert_eq!(outcome, StorageOutcome::NoWrite);
        assert!(fx.graph.is_empty().await);
    }
}
