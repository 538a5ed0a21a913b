// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Qdrant production implementation of the vector store
//!
//! Stores one point per memory, keyed by the memory UUID, with a filterable
//! payload (`workspace`, `memory_type`, `tags`, `deprecated`).
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements `VectorStore` over Qdrant (feature `qdrant`)

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, vectors::VectorsOptions, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance,
        Filter, GetPointsBuilder, PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value,
        VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::{MemoryId, MemoryType, StoreError, VectorEntry, VectorFilter, VectorHit, VectorPayload, VectorStore};

const DEFAULT_COLLECTION: &str = "memex_memories";

pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimensions: u64,
}

fn unavailable(err: impl std::fmt::Display) -> StoreError {
    StoreError::VectorUnavailable(err.to_string())
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store
    pub async fn new(url: &str, dimensions: usize) -> Result<Self> {
        let client = Qdrant::from_url(url).build().context("Failed to create Qdrant client")?;

        Ok(Self {
            client,
            collection: DEFAULT_COLLECTION.to_string(),
            dimensions: dimensions as u64,
        })
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Create the collection with cosine distance if it does not exist
    pub async fn initialize(&self) -> Result<()> {
        let collection_exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .context("Failed to check collection existence")?;

        if !collection_exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(self.dimensions, Distance::Cosine)),
                )
                .await
                .context("Failed to create Qdrant collection")?;
        }

        Ok(())
    }

    fn payload_to_qdrant(id: MemoryId, payload: &VectorPayload) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert("memory_id".to_string(), id.to_string().into());
        map.insert("memory_type".to_string(), payload.memory_type.as_str().to_string().into());
        map.insert("deprecated".to_string(), payload.deprecated.into());
        if let Some(workspace) = &payload.workspace {
            map.insert("workspace".to_string(), workspace.clone().into());
        }

        // Tags as a JSON string
        let tags_json = serde_json::to_string(&payload.tags).unwrap_or_else(|_| "[]".to_string());
        map.insert("tags".to_string(), tags_json.into());
        map
    }

    fn get_string_value(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
        match payload.get(key).and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn memory_id_of(payload: &HashMap<String, Value>) -> Result<MemoryId, StoreError> {
        let raw = Self::get_string_value(payload, "memory_id")
            .ok_or_else(|| StoreError::Serialization("missing memory_id field".to_string()))?;
        Uuid::parse_str(&raw)
            .map(MemoryId)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn qdrant_to_payload(payload: &HashMap<String, Value>) -> Result<VectorPayload, StoreError> {
        let memory_type: MemoryType = Self::get_string_value(payload, "memory_type")
            .ok_or_else(|| StoreError::Serialization("missing memory_type field".to_string()))?
            .parse()
            .map_err(|e: crate::domain::CortexError| StoreError::Serialization(e.to_string()))?;
        let deprecated = matches!(
            payload.get("deprecated").and_then(|v| v.kind.as_ref()),
            Some(Kind::BoolValue(true))
        );
        let tags_json = Self::get_string_value(payload, "tags").unwrap_or_else(|| "[]".to_string());

        Ok(VectorPayload {
            workspace: Self::get_string_value(payload, "workspace"),
            memory_type,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            deprecated,
        })
    }

    fn build_filter(filter: &VectorFilter) -> Option<Filter> {
        let mut must = Vec::new();
        if let Some(workspace) = &filter.workspace {
            must.push(Condition::matches("workspace", workspace.clone()));
        }
        if !filter.include_deprecated {
            must.push(Condition::matches("deprecated", false));
        }
        if !filter.types.is_empty() {
            let types: Vec<String> = filter.types.iter().map(|t| t.as_str().to_string()).collect();
            must.push(Condition::matches("memory_type", types));
        }

        let must_not: Vec<Condition> = if filter.exclude.is_empty() {
            Vec::new()
        } else {
            vec![Condition::has_id(filter.exclude.iter().map(|id| PointId::from(id.to_string())))]
        };

        if must.is_empty() && must_not.is_empty() {
            return None;
        }
        let mut qdrant_filter = Filter::must(must);
        qdrant_filter.must_not = must_not;
        Some(qdrant_filter)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, id: MemoryId, vector: Vec<f32>, payload: VectorPayload) -> Result<(), StoreError> {
        if vector.len() as u64 != self.dimensions {
            return Err(StoreError::VectorUnavailable(format!(
                "Invalid embedding dimension: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }

        let point = PointStruct::new(id.to_string(), vector, Self::payload_to_qdrant(id, &payload));
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], filter: &VectorFilter, limit: usize) -> Result<Vec<VectorHit>, StoreError> {
        let mut builder = SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit as u64).with_payload(true);
        if let Some(qdrant_filter) = Self::build_filter(filter) {
            builder = builder.filter(qdrant_filter);
        }

        let search_result = self.client.search_points(builder).await.map_err(unavailable)?;

        let mut hits = Vec::new();
        for scored_point in search_result.result {
            hits.push(VectorHit {
                id: Self::memory_id_of(&scored_point.payload)?,
                score: (scored_point.score as f64).clamp(0.0, 1.0),
            });
        }
        Ok(hits)
    }

    async fn get(&self, id: MemoryId) -> Result<Option<VectorEntry>, StoreError> {
        let points = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, vec![PointId::from(id.to_string())])
                    .with_payload(true)
                    .with_vectors(true),
            )
            .await
            .map_err(unavailable)?;

        let Some(point) = points.result.into_iter().next() else {
            return Ok(None);
        };
        let vector = match point.vectors.and_then(|v| v.vectors_options) {
            Some(VectorsOptions::Vector(v)) => v.data,
            _ => Vec::new(),
        };
        Ok(Some(VectorEntry {
            id,
            vector,
            payload: Self::qdrant_to_payload(&point.payload)?,
        }))
    }

    async fn delete(&self, id: MemoryId) -> Result<(), StoreError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(vec![PointId::from(id.to_string())])
                    .wait(true),
            )
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.client.health_check().await.map_err(unavailable)?;
        Ok(())
    }
}
