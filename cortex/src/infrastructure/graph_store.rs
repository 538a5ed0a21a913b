// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory graph store implementation
//!
//! Memory nodes and typed edges behind a single `RwLock`. Writes go through
//! `InMemoryGraphTransaction`, which stages one memory and its edges and
//! applies them under one write lock on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{GraphQuery, GraphStore, GraphTransaction, Memory, MemoryId, MemoryRelationship, StoreError};

#[derive(Debug, Default)]
struct GraphState {
    nodes: HashMap<MemoryId, Memory>,
    edges: Vec<MemoryRelationship>,
}

/// Serializable copy of the whole graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub memories: Vec<Memory>,
    pub relationships: Vec<MemoryRelationship>,
}

/// In-memory implementation of `GraphStore`
pub struct InMemoryGraphStore {
    state: Arc<RwLock<GraphState>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(GraphState::default())),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.nodes.is_empty()
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.read().await;
        let mut memories: Vec<Memory> = state.nodes.values().cloned().collect();
        memories.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        GraphSnapshot {
            memories,
            relationships: state.edges.clone(),
        }
    }

    pub async fn restore(&self, snapshot: GraphSnapshot) {
        let mut state = self.state.write().await;
        state.nodes = snapshot.memories.into_iter().map(|m| (m.id, m)).collect();
        state.edges = snapshot.relationships;
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get(&self, id: MemoryId) -> Result<Option<Memory>, StoreError> {
        let state = self.state.read().await;
        Ok(state.nodes.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[MemoryId]) -> Result<Vec<Memory>, StoreError> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.nodes.get(id).cloned()).collect())
    }

    async fn query(&self, query: &GraphQuery) -> Result<Vec<Memory>, StoreError> {
        let state = self.state.read().await;
        let mut results: Vec<Memory> = state
            .nodes
            .values()
            .filter(|memory| query.matches(memory))
            .cloned()
            .collect();

        // Newest first, id as a stable tiebreak
        results.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        if let Some(limit) = query.limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn relationships(&self, id: MemoryId) -> Result<Vec<MemoryRelationship>, StoreError> {
        let state = self.state.read().await;
        Ok(state.edges.iter().filter(|edge| edge.involves(id)).cloned().collect())
    }

    async fn record_access(&self, ids: &[MemoryId], at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for id in ids {
            if let Some(memory) = state.nodes.get_mut(id) {
                memory.record_access(at);
            }
        }
        Ok(())
    }

    async fn begin(&self, memory_id: MemoryId) -> Result<Box<dyn GraphTransaction>, StoreError> {
        Ok(Box::new(InMemoryGraphTransaction {
            state: self.state.clone(),
            memory_id,
            memory: None,
            relationships: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let _state = self.state.read().await;
        Ok(())
    }
}

/// Staged writes for one memory
pub struct InMemoryGraphTransaction {
    state: Arc<RwLock<GraphState>>,
    memory_id: MemoryId,
    memory: Option<Memory>,
    relationships: Vec<MemoryRelationship>,
}

#[async_trait]
impl GraphTransaction for InMemoryGraphTransaction {
    fn memory_id(&self) -> MemoryId {
        self.memory_id
    }

    fn put_memory(&mut self, memory: Memory) {
        self.memory = Some(memory);
    }

    fn put_relationship(&mut self, relationship: MemoryRelationship) {
        self.relationships.push(relationship);
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;

        if let Some(memory) = &this.memory {
            if memory.id != this.memory_id {
                return Err(StoreError::Transaction(format!(
                    "transaction for {} cannot write memory {}",
                    this.memory_id, memory.id
                )));
            }
        }

        let mut state = this.state.write().await;

        // Validate everything before applying anything
        for edge in &this.relationships {
            if !edge.involves(this.memory_id) {
                return Err(StoreError::Transaction(format!(
                    "edge {} -> {} does not involve {}",
                    edge.source_id, edge.target_id, this.memory_id
                )));
            }
            let other = if edge.source_id == this.memory_id { edge.target_id } else { edge.source_id };
            if other != this.memory_id && !state.nodes.contains_key(&other) {
                return Err(StoreError::NotFound(other.to_string()));
            }
        }
        if this.memory.is_none() && !state.nodes.contains_key(&this.memory_id) {
            return Err(StoreError::NotFound(this.memory_id.to_string()));
        }

        if let Some(mut memory) = this.memory {
            // Accesses are recorded outside transactions; a staged copy may be stale
            if let Some(stored) = state.nodes.get(&memory.id) {
                memory.access_count = memory.access_count.max(stored.access_count);
                memory.last_accessed_at = memory.last_accessed_at.max(stored.last_accessed_at);
            }
            state.nodes.insert(memory.id, memory);
        }
        for edge in this.relationships {
            if let Some(existing) = state.edges.iter_mut().find(|e| e.same_edge(&edge)) {
                *existing = edge;
            } else {
                state.edges.push(edge);
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MemoryKind, MemoryType, RelationshipType};
    use std::collections::BTreeSet;

    fn memory(content: &str, workspace: &str, tags: &[&str]) -> Memory {
        let tag_set: BTreeSet<String> = tags.iter().map(|t| t.to_string()).collect();
        let kind = MemoryKind::from_content(MemoryType::Pattern, content, &tag_set, Some(workspace)).unwrap();
        Memory::new(content, kind, Some(workspace.to_string())).with_tags(tags.iter().copied())
    }

    async fn insert(store: &InMemoryGraphStore, memory: &Memory) {
        let mut tx = store.begin(memory.id).await.unwrap();
        tx.put_memory(memory.clone());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_makes_memory_visible() {
        let store = InMemoryGraphStore::new();
        let m = memory("Use thiserror for library errors", "svc", &["rust"]);

        let mut tx = store.begin(m.id).await.unwrap();
        tx.put_memory(m.clone());
        assert!(store.get(m.id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert_eq!(store.get(m.id).await.unwrap().unwrap().content, m.content);
    }

    #[tokio::test]
    async fn test_commit_keeps_accesses_recorded_while_staged() {
        let store = InMemoryGraphStore::new();
        let m = memory("Prefer &str parameters", "svc", &[]);
        insert(&store, &m).await;

        let mut stale = store.get(m.id).await.unwrap().unwrap();
        let mut tx = store.begin(m.id).await.unwrap();
        let seen_at = Utc::now();
        store.record_access(&[m.id], seen_at).await.unwrap();

        stale.deprecate("replaced");
        tx.put_memory(stale);
        tx.commit().await.unwrap();

        let stored = store.get(m.id).await.unwrap().unwrap();
        assert!(stored.is_deprecated());
        assert_eq!(stored.access_count, 1);
        assert_eq!(stored.last_accessed_at, Some(seen_at));
    }

    #[tokio::test]
    async fn test_rollback_discards_staged_writes() {
        let store = InMemoryGraphStore::new();
        let m = memory("staged", "svc", &[]);

        let mut tx = store.begin(m.id).await.unwrap();
        tx.put_memory(m.clone());
        tx.rollback().await.unwrap();

        assert!(store.get(m.id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_edge_must_involve_transaction_memory() {
        let store = InMemoryGraphStore::new();
        let a = memory("a", "svc", &[]);
        let b = memory("b", "svc", &[]);
        let c = memory("c", "svc", &[]);
        insert(&store, &b).await;
        insert(&store, &c).await;

        let mut tx = store.begin(a.id).await.unwrap();
        tx.put_memory(a.clone());
        tx.put_relationship(MemoryRelationship::new(b.id, c.id, RelationshipType::SimilarTo, 0.7, ""));
        let err = tx.commit().await.unwrap_err();

        assert!(matches!(err, StoreError::Transaction(_)));
        assert!(store.get(a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relationships_in_both_directions() {
        let store = InMemoryGraphStore::new();
        let a = memory("a", "svc", &[]);
        let b = memory("b", "svc", &[]);
        insert(&store, &b).await;

        let mut tx = store.begin(a.id).await.unwrap();
        tx.put_memory(a.clone());
        tx.put_relationship(MemoryRelationship::new(a.id, b.id, RelationshipType::DependsOn, 0.8, "ctx"));
        tx.commit().await.unwrap();

        assert_eq!(store.relationships(a.id).await.unwrap().len(), 1);
        assert_eq!(store.relationships(b.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edge_to_missing_node_fails() {
        let store = InMemoryGraphStore::new();
        let a = memory("a", "svc", &[]);

        let mut tx = store.begin(a.id).await.unwrap();
        tx.put_memory(a.clone());
        tx.put_relationship(MemoryRelationship::new(a.id, MemoryId::new(), RelationshipType::Suggests, 0.5, ""));

        assert!(matches!(tx.commit().await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_query_filters_workspace_tags_and_deprecation() {
        let store = InMemoryGraphStore::new();
        let auth = memory("auth tokens", "svc", &["auth"]);
        let other = memory("yaml style", "web", &["style"]);
        let mut old = memory("legacy auth", "svc", &["auth"]);
        old.deprecate("superseded");
        for m in [&auth, &other, &old] {
            insert(&store, m).await;
        }

        let query = GraphQuery {
            workspace: Some("svc".to_string()),
            tags: vec!["auth".to_string()],
            ..GraphQuery::default()
        };
        let found = store.query(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, auth.id);

        let query = GraphQuery { include_deprecated: true, ..query };
        assert_eq!(store.query(&query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_access_and_get_many() {
        let store = InMemoryGraphStore::new();
        let a = memory("a", "svc", &[]);
        let b = memory("b", "svc", &[]);
        insert(&store, &a).await;
        insert(&store, &b).await;

        store.record_access(&[a.id, MemoryId::new()], Utc::now()).await.unwrap();

        let fetched = store.get_many(&[b.id, MemoryId::new(), a.id]).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].id, b.id);
        assert_eq!(fetched[1].access_count, 1);
        assert_eq!(fetched[1].version(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let store = InMemoryGraphStore::new();
        let a = memory("a", "svc", &[]);
        insert(&store, &a).await;

        let snapshot = store.snapshot().await;
        let json = serde_json::to_string(&snapshot).unwrap();

        let restored = InMemoryGraphStore::new();
        restored.restore(serde_json::from_str(&json).unwrap()).await;
        assert_eq!(restored.get(a.id).await.unwrap().unwrap().content, "a");
    }
}
