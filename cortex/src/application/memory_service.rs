// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # MemoryService: Ingestion, Retrieval & Evolution Facade
//!
//! Wires the pipeline components once and exposes the public operations:
//!
//! ```text
//! ingest:  validate → embed → find_similar → assess → risk → threshold
//!          → arbitrate → execute → audit
//! search:  validate → embed (if text) → hybrid retrieval → audit
//! evolve:  evolution engine (single memory or workspace sweep)
//! ```
//!
//! ## Errors
//!
//! `ingest` only raises for malformed requests. Every other failure on the
//! ingestion path (embedding outage, store outage, quality-gate block,
//! arbitration fault) becomes a REJECT result, with `review_required` set
//! when the cause was an outage. `search` and `evolve` return store
//! failures to the caller.

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::arbitration::ArbitrationEngine;
use super::audit_publisher::AuditPublisher;
use super::evolution::EvolutionEngine;
use super::evolution_scheduler::EvolutionRunner;
use super::quality_gate::{AssessmentContext, QualityGate, QualityValidator};
use super::retrieval::HybridRetriever;
use super::risk::RiskAssessor;
use super::similarity::SimilarityFinder;
use super::storage_executor::{StorageExecutor, StorageOutcome};
use crate::domain::{
    content_hash, ArbitrationResult, AuditEvent, AuditSink, CandidateMemory, Component, ComponentHealth,
    CortexConfig, CortexError, Decision, EmbeddingProvider, EvolutionStats, GraphStore, HealthReport, Memory,
    MemoryId, MemoryKind, MemorySearchResult, MemoryType, QualityScore, ReasoningOracle, RequestedRelationship,
    RiskAssessment, SearchQuery, SearchStrategy, SimilarMemory, VectorStore,
};

/// Longest accepted memory content, in characters
pub const MAX_CONTENT_CHARS: usize = 32_768;

/// Optional extras supplied with a candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestContext {
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Full variant payload; derived from the content when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MemoryKind>,
    /// Precomputed embedding; must match the provider's dimensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub relationships: Vec<RequestedRelationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub content: String,
    pub memory_type: MemoryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default)]
    pub context: IngestContext,
}

impl IngestRequest {
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        Self {
            content: content.into(),
            memory_type,
            workspace: None,
            context: IngestContext::default(),
        }
    }

    pub fn in_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.context.embedding = Some(embedding);
        self
    }
}

pub struct MemoryService {
    config: CortexConfig,
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    oracle: Option<Arc<dyn ReasoningOracle>>,
    similarity: SimilarityFinder,
    quality_gate: QualityGate,
    risk: RiskAssessor,
    arbitration: ArbitrationEngine,
    executor: Arc<StorageExecutor>,
    retriever: HybridRetriever,
    evolution: EvolutionEngine,
    audit: AuditPublisher,
}

impl MemoryService {
    pub fn new(
        config: CortexConfig,
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        audit_sink: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, CortexError> {
        config.validate()?;

        let audit = AuditPublisher::new(audit_sink);
        let executor = Arc::new(StorageExecutor::new(
            graph.clone(),
            vectors.clone(),
            embedder.clone(),
            config.arbitration.relate_threshold,
        ));

        Ok(Self {
            similarity: SimilarityFinder::new(graph.clone(), vectors.clone(), config.similarity.clone()),
            quality_gate: QualityGate::new(config.quality.clone()),
            risk: RiskAssessor::new(),
            arbitration: ArbitrationEngine::new(config.arbitration.clone()),
            retriever: HybridRetriever::new(graph.clone(), vectors.clone(), config.retrieval.clone()),
            evolution: EvolutionEngine::new(
                graph.clone(),
                vectors.clone(),
                executor.clone(),
                audit.clone(),
                config.evolution.clone(),
            ),
            executor,
            audit,
            oracle: None,
            graph,
            vectors,
            embedder,
            config,
        })
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ReasoningOracle>) -> Self {
        self.arbitration = ArbitrationEngine::new(self.config.arbitration.clone()).with_oracle(oracle.clone());
        self.oracle = Some(oracle);
        self
    }

    /// Add an external assessor alongside the rule-based validators
    pub fn with_quality_validator(mut self, validator: Arc<dyn QualityValidator>) -> Self {
        self.quality_gate.add_validator(validator);
        self
    }

    pub fn config(&self) -> &CortexConfig {
        &self.config
    }

    /// Score, arbitrate and store one candidate
    pub async fn ingest(&self, request: IngestRequest) -> Result<ArbitrationResult, CortexError> {
        let kind = self.validate_request(&request)?;
        let IngestRequest {
            content,
            memory_type,
            workspace,
            context,
        } = request;

        let mut candidate = CandidateMemory {
            content,
            memory_type,
            workspace,
            tags: context.tags,
            source: context.source,
            kind,
            embedding: Vec::new(),
            confidence: context.confidence,
            relationships: context.relationships,
        };

        candidate.embedding = match context.embedding.filter(|e| !e.is_empty()) {
            Some(embedding) => embedding,
            None => match self.embedder.embed(&candidate.content).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!(error = %e, "Embedding failed, rejecting candidate");
                    let result = outage_reject(&candidate, &[], &format!("embedding unavailable: {}", e));
                    self.publish_outcome(&candidate, &result, None);
                    return Ok(result);
                }
            },
        };

        let similar = self.similarity.find_similar(&candidate).await;
        debug!(similar = similar.len(), "Similar memories found");

        let context = AssessmentContext {
            content: &candidate.content,
            memory_type: candidate.memory_type,
            tags: &candidate.tags,
            source: candidate.source.as_deref(),
            kind: Some(&candidate.kind),
            similar: &similar,
        };
        let quality = match self.quality_gate.assess(&context).await {
            Ok(score) => score,
            Err(e) => {
                info!(error = %e, "Quality gate blocked candidate");
                let result = ArbitrationResult::new(
                    Decision::Reject,
                    1.0,
                    e.to_string(),
                    candidate.content_hash(),
                    &similar,
                    QualityScore::default(),
                    RiskAssessment::default(),
                );
                self.publish_outcome(&candidate, &result, None);
                return Ok(result);
            }
        };
        let risk = self.risk.assess(&candidate.content, &similar, &quality);

        let threshold = self.quality_gate.validate_threshold(&quality);
        if !threshold.passed {
            let mut reasoning = threshold.reasons.join("; ");
            if let Some(duplicate) = similar.iter().find(|s| s.duplicate) {
                reasoning = format!(
                    "duplicate of existing memory {} (similarity {:.2}); {}",
                    duplicate.id(),
                    duplicate.similarity,
                    reasoning
                );
            }
            let mut result = ArbitrationResult::new(
                Decision::Reject,
                1.0 - quality.overall(),
                reasoning,
                candidate.content_hash(),
                &similar,
                quality,
                risk,
            );
            result.audit.review_required = risk.overall() > self.config.arbitration.review_threshold;
            info!(failed_gates = ?threshold.failed_gates, "Candidate below quality threshold");
            self.publish_outcome(&candidate, &result, None);
            return Ok(result);
        }

        let mut result = self.arbitration.arbitrate(&candidate, &similar, quality, risk).await;

        let outcome = match self.executor.execute(&result, &candidate, &similar).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(decision = %result.decision, error = %e, "Storage failed, rejecting fail-safe");
                result.force_reject(&format!("storage unavailable: {}", e));
                result.audit.review_required = true;
                None
            }
        };
        result.memory_id = outcome.as_ref().and_then(StorageOutcome::memory_id);
        if outcome.as_ref().is_some_and(StorageOutcome::review_required) {
            result.audit.review_required = true;
        }

        self.publish_outcome(&candidate, &result, outcome.as_ref());
        Ok(result)
    }

    /// Ingest many candidates, `batch.window` at a time. A failing item
    /// becomes a REJECT and never aborts the batch; results keep input order.
    pub async fn ingest_batch(&self, requests: Vec<IngestRequest>) -> Vec<ArbitrationResult> {
        let window = self.config.batch.window.max(1);
        let pause = Duration::from_millis(self.config.batch.pause_ms);
        let total = requests.len();
        let mut results = Vec::with_capacity(total);

        for (n, chunk) in requests.chunks(window).enumerate() {
            let outcomes = join_all(chunk.iter().cloned().map(|request| self.ingest(request))).await;

            for (request, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        warn!(error = %e, "Batch item failed, recording REJECT");
                        results.push(failed_item(request, &e));
                    }
                }
            }

            let processed = (n + 1) * window;
            if processed < total && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        info!(
            total,
            rejected = results.iter().filter(|r| r.is_reject()).count(),
            "Batch ingestion completed"
        );
        results
    }

    pub async fn search(&self, query: SearchQuery) -> Result<Vec<MemorySearchResult>, CortexError> {
        if query.limit == Some(0) {
            return Err(CortexError::validation("limit must be greater than zero"));
        }
        if let Some(min) = query.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err(CortexError::validation(format!("min_confidence {} outside [0, 1]", min)));
            }
        }

        let strategy = query.resolve_strategy();
        let embedding = match (&query.embedding, &query.text) {
            (Some(embedding), _) if !embedding.is_empty() => {
                if embedding.len() != self.embedder.dimensions() {
                    return Err(CortexError::validation(format!(
                        "query embedding has {} dimensions, expected {}",
                        embedding.len(),
                        self.embedder.dimensions()
                    )));
                }
                Some(embedding.clone())
            }
            (_, Some(text)) if !text.trim().is_empty() && strategy != SearchStrategy::Graph => Some(
                self.embedder
                    .embed(text)
                    .await
                    .map_err(|e| CortexError::EmbeddingUnavailable(e.to_string()))?,
            ),
            _ => None,
        };

        let results = self.retriever.search(&query, embedding).await?;

        self.audit.publish(AuditEvent::SearchPerformed {
            strategy,
            workspace: query.workspace.clone(),
            result_count: results.len(),
            timestamp: chrono::Utc::now(),
        });
        Ok(results)
    }

    pub async fn get(&self, id: MemoryId) -> Result<Memory, CortexError> {
        self.graph.get(id).await?.ok_or(CortexError::NotFound(id))
    }

    pub async fn evolve(&self, id: MemoryId) -> Result<EvolutionStats, CortexError> {
        self.evolution.evolve(id).await
    }

    /// Sweep one workspace, or everything when `None`
    pub async fn evolve_workspace(&self, workspace: Option<&str>) -> Result<EvolutionStats, CortexError> {
        self.evolution.evolve_workspace(workspace, &CancellationToken::new()).await
    }

    pub async fn health(&self) -> HealthReport {
        let timeout = Duration::from_millis(self.config.similarity.source_timeout_ms);

        let (graph, vectors, embedder, oracle) = tokio::join!(
            probe(Component::GraphStore, timeout, self.graph.ping()),
            probe(Component::VectorStore, timeout, self.vectors.ping()),
            probe(Component::EmbeddingProvider, timeout, async {
                self.embedder.embed("health check").await.map(|_| ())
            }),
            async {
                match &self.oracle {
                    Some(oracle) => Some(probe(Component::ReasoningOracle, timeout, oracle.ping()).await),
                    None => None,
                }
            },
        );

        let mut components = vec![graph, vectors, embedder];
        components.extend(oracle);
        let report = HealthReport::from_components(components);
        debug!(status = ?report.status, "Health checked");
        report
    }

    fn validate_request(&self, request: &IngestRequest) -> Result<MemoryKind, CortexError> {
        if request.content.trim().is_empty() {
            return Err(CortexError::validation("content must not be empty"));
        }
        let chars = request.content.chars().count();
        if chars > MAX_CONTENT_CHARS {
            return Err(CortexError::validation(format!(
                "content has {} characters, limit is {}",
                chars, MAX_CONTENT_CHARS
            )));
        }
        if let Some(ws) = &request.workspace {
            if ws.trim().is_empty() {
                return Err(CortexError::validation("workspace must not be blank"));
            }
        }

        let context = &request.context;
        if let Some(confidence) = context.confidence {
            if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
                return Err(CortexError::validation(format!("confidence {} outside [0, 1]", confidence)));
            }
        }
        if let Some(embedding) = context.embedding.as_ref().filter(|e| !e.is_empty()) {
            if embedding.len() != self.embedder.dimensions() {
                return Err(CortexError::validation(format!(
                    "embedding has {} dimensions, expected {}",
                    embedding.len(),
                    self.embedder.dimensions()
                )));
            }
        }

        match &context.kind {
            Some(kind) => {
                if kind.memory_type() != request.memory_type {
                    return Err(CortexError::validation(format!(
                        "payload is a {} memory but memory_type is {}",
                        kind.memory_type().as_str(),
                        request.memory_type.as_str()
                    )));
                }
                kind.validate()?;
                Ok(kind.clone())
            }
            None => MemoryKind::from_content(
                request.memory_type,
                &request.content,
                &context.tags,
                request.workspace.as_deref(),
            ),
        }
    }

    fn publish_outcome(&self, candidate: &CandidateMemory, result: &ArbitrationResult, outcome: Option<&StorageOutcome>) {
        let now = chrono::Utc::now();
        info!(
            decision = %result.decision,
            confidence = result.confidence,
            memory_id = ?result.memory_id,
            review_required = result.review_required(),
            "Ingestion completed"
        );

        self.audit.publish(AuditEvent::ArbitrationCompleted {
            audit_id: result.audit.id,
            decision: result.decision,
            confidence: result.confidence,
            content_hash: result.audit.content_hash.clone(),
            workspace: candidate.workspace.clone(),
            memory_id: result.memory_id,
            review_required: result.review_required(),
            timestamp: now,
        });

        let event = match outcome {
            Some(StorageOutcome::Added { memory_id }) => AuditEvent::MemoryAdded {
                memory_id: *memory_id,
                workspace: candidate.workspace.clone(),
                timestamp: now,
            },
            Some(StorageOutcome::Updated {
                memory_id,
                old_version,
                new_version,
            }) => AuditEvent::MemoryUpdated {
                memory_id: *memory_id,
                old_version: *old_version,
                new_version: *new_version,
                timestamp: now,
            },
            Some(StorageOutcome::Merged {
                memory_id,
                strategy,
                new_version,
                ..
            }) => AuditEvent::MemoryMerged {
                memory_id: *memory_id,
                strategy: *strategy,
                new_version: *new_version,
                timestamp: now,
            },
            Some(StorageOutcome::Deprecated { memory_id, reason }) => AuditEvent::MemoryDeprecated {
                memory_id: *memory_id,
                reason: reason.clone(),
                timestamp: now,
            },
            Some(StorageOutcome::NoWrite) | None => return,
        };
        self.audit.publish(event);
    }
}

#[async_trait]
impl EvolutionRunner for MemoryService {
    async fn evolve_workspace_until(
        &self,
        workspace: Option<&str>,
        shutdown: &CancellationToken,
    ) -> Result<EvolutionStats, CortexError> {
        self.evolution.evolve_workspace(workspace, shutdown).await
    }
}

/// REJECT for a candidate that could not be processed because a backend was down
fn outage_reject(candidate: &CandidateMemory, similar: &[SimilarMemory], why: &str) -> ArbitrationResult {
    let mut result = ArbitrationResult::new(
        Decision::Reject,
        1.0,
        why,
        candidate.content_hash(),
        similar,
        QualityScore::default(),
        RiskAssessment::default(),
    );
    result.audit.review_required = true;
    result
}

fn failed_item(request: &IngestRequest, error: &CortexError) -> ArbitrationResult {
    let mut result = ArbitrationResult::new(
        Decision::Reject,
        1.0,
        format!("batch item failed: {}", error),
        content_hash(&request.content),
        &[],
        QualityScore::default(),
        RiskAssessment::default(),
    );
    result.audit.review_required = true;
    result
}

async fn probe<F, E>(component: Component, timeout: Duration, check: F) -> ComponentHealth
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, check).await;
    let latency_ms = Some(started.elapsed().as_millis() as u64);
    match outcome {
        Ok(Ok(())) => ComponentHealth {
            component,
            healthy: true,
            latency_ms,
            error: None,
        },
        Ok(Err(e)) => ComponentHealth {
            component,
            healthy: false,
            latency_ms,
            error: Some(e.to_string()),
        },
        Err(_) => ComponentHealth {
            component,
            healthy: false,
            latency_ms,
            error: Some(format!("timed out after {} ms", timeout.as_millis())),
        },
    }
}
