// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for Cortex bounded context

pub mod audit;
pub mod embedding_client;
pub mod graph_store;
#[cfg(feature = "qdrant")]
pub mod qdrant_store;
pub mod vector_store;

pub use audit::{AuditBusError, AuditReceiver, BroadcastAuditSink, TracingAuditSink};
pub use embedding_client::{cosine_similarity, CachedEmbeddingProvider, HashingEmbeddingProvider};
pub use graph_store::{GraphSnapshot, InMemoryGraphStore};
#[cfg(feature = "qdrant")]
pub use qdrant_store::QdrantVectorStore;
pub use vector_store::InMemoryVectorStore;
