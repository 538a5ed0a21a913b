// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application layer: the ingestion pipeline, hybrid retrieval and evolution

pub mod arbitration;
pub mod audit_publisher;
pub mod evolution;
pub mod evolution_scheduler;
pub mod memory_service;
pub mod quality_gate;
pub mod retrieval;
pub mod risk;
pub mod similarity;
pub mod storage_executor;

pub use arbitration::ArbitrationEngine;
pub use audit_publisher::AuditPublisher;
pub use evolution::EvolutionEngine;
pub use evolution_scheduler::{EvolutionRunner, EvolutionScheduler};
pub use memory_service::{IngestContext, IngestRequest, MemoryService, MAX_CONTENT_CHARS};
pub use quality_gate::{
    rule_based_validators, suggest_improvements, AssessmentContext, QualityGate, QualityValidator, ThresholdResult,
};
pub use retrieval::HybridRetriever;
pub use risk::RiskAssessor;
pub use similarity::SimilarityFinder;
pub use storage_executor::{StorageExecutor, StorageOutcome};
