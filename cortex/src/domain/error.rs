// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error types for the Cortex bounded context.
//!
//! Only malformed input and operations on entities that do not exist are
//! surfaced to callers of the ingestion path. Quality, risk and arbitration
//! outcomes are data (`ArbitrationResult`), never errors.

use super::memory::MemoryId;

/// Errors raised by the capability adapters (graph, vector, embedding).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Graph store unavailable: {0}")]
    GraphUnavailable(String),

    #[error("Vector store unavailable: {0}")]
    VectorUnavailable(String),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Reasons a reasoning-oracle proposal could not be used. Always recovered
/// through the deterministic fallback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle timed out after {0} ms")]
    Timeout(u64),

    #[error("Malformed oracle proposal: {0}")]
    Malformed(String),
}

/// Raised by the quality gate when a `required` validator cannot score a
/// candidate. Admission is blocked; the orchestrator maps it to a REJECT.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QualityGateError {
    #[error("Required validator '{validator}' failed on {dimension}: {reason}")]
    RequiredValidatorFailed {
        validator: String,
        dimension: String,
        reason: String,
    },
}

/// Errors surfaced by the public `MemoryService` operations.
#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Memory not found: {0}")]
    NotFound(MemoryId),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CortexError {
    pub fn validation(message: impl Into<String>) -> Self {
        CortexError::Validation(message.into())
    }
}
