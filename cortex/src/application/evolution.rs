// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Evolution Engine
//!
//! Periodic maintenance of stored memories: usage analysis, pattern strength
//! decay, contradiction detection and resolution, and merging of
//! near-duplicates that slipped past admission.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Keeps the memory set coherent as it grows
//!
//! ## Strength
//!
//! ```text
//! elapsed     = days_since_update
//! trend_delta = step * min(1, elapsed / activity_window)
//! strength'   = clamp(strength + trend_delta) * 0.5 ^ (elapsed / half_life)
//! ```
//!
//! with `step` of +0.1 / 0 / -0.1 for increasing / stable / decreasing usage.
//! Both terms scale with elapsed time, so back-to-back passes leave strength
//! where it is. Patterns that fall below `min_strength` are deprecated.
//!
//! ## Merge scoring
//!
//! ```text
//! benefit = 0.7 * similarity + 0.15 * usage + 0.15 * quality_gap
//! risk    = 0.4 * quality_gap + 0.3 * cross_workspace + 0.3 * min(1, min_access / 100)
//! ```

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audit_publisher::AuditPublisher;
use super::risk::{has_negation, mentions_obsolescence};
use super::storage_executor::StorageExecutor;
use crate::domain::{
    AuditEvent, Contradiction, ContradictionResolution, ContradictionType, CortexError, EvolutionConfig,
    EvolutionStats, GraphQuery, GraphStore, Memory, MemoryId, MemoryKind, MemoryRelationship, MergeOpportunity,
    MergeStrategy, RelationshipType, StoreError, UsageAnalysis, UsageTrend, VectorFilter, VectorStore,
};

/// Neighbours below this similarity are never compared
const COMPARE_FLOOR: f64 = 0.5;
const FACTUAL_FLOOR: f64 = 0.7;
const STRENGTH_STEP: f64 = 0.1;

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)*\b").expect("valid regex"));

pub struct EvolutionEngine {
    graph: Arc<dyn GraphStore>,
    vectors: Arc<dyn VectorStore>,
    executor: Arc<StorageExecutor>,
    audit: AuditPublisher,
    config: EvolutionConfig,
}

impl EvolutionEngine {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        vectors: Arc<dyn VectorStore>,
        executor: Arc<StorageExecutor>,
        audit: AuditPublisher,
        config: EvolutionConfig,
    ) -> Self {
        Self {
            graph,
            vectors,
            executor,
            audit,
            config,
        }
    }

    pub fn analyze_usage(&self, memory: &Memory, now: DateTime<Utc>) -> UsageAnalysis {
        let age_days = days_between(memory.created_at, now).max(1.0);
        let access_frequency = memory.access_count as f64 / age_days;

        let idle_days = days_between(memory.last_accessed_at.unwrap_or(memory.created_at), now);
        let recent_activity = (-idle_days / self.config.activity_window_days.max(f64::EPSILON)).exp();

        let success_rate =
            0.4 * memory.quality.overall() + 0.4 * memory.confidence + 0.2 * access_frequency.min(1.0);
        let context_diversity =
            ((memory.metadata.tags.len() + memory.metadata.relationships.len()) as f64 / 10.0).min(1.0);

        let trend = if recent_activity > 0.5 && access_frequency >= 0.1 {
            UsageTrend::Increasing
        } else if recent_activity < 0.1 {
            UsageTrend::Decreasing
        } else {
            UsageTrend::Stable
        };

        UsageAnalysis {
            memory_id: memory.id,
            access_frequency,
            recent_activity,
            success_rate,
            context_diversity,
            trend,
        }
    }

    /// Next strength of a pattern memory; `None` for other kinds
    pub fn next_strength(&self, memory: &Memory, trend: UsageTrend, now: DateTime<Utc>) -> Option<f64> {
        let MemoryKind::Pattern(pattern) = &memory.kind else {
            return None;
        };
        let step = match trend {
            UsageTrend::Increasing => STRENGTH_STEP,
            UsageTrend::Stable => 0.0,
            UsageTrend::Decreasing => -STRENGTH_STEP,
        };
        let elapsed = days_between(pattern.strength_updated_at, now);
        let delta = step * (elapsed / self.config.activity_window_days.max(f64::EPSILON)).min(1.0);
        let decay = 0.5_f64.powf(elapsed / self.config.strength_half_life_days.max(f64::EPSILON));
        Some(((pattern.strength + delta).clamp(0.0, 1.0) * decay).clamp(0.0, 1.0))
    }

    /// Apply strength decay; returns true when the memory was deprecated
    async fn update_strength(&self, memory: &Memory, trend: UsageTrend, stats: &mut EvolutionStats) -> Result<bool, StoreError> {
        let now = Utc::now();
        let Some(strength) = self.next_strength(memory, trend, now) else {
            return Ok(false);
        };

        let weak = strength < self.config.min_strength;
        let reason = format!("strength {:.3} below {:.2}", strength, self.config.min_strength);
        let reason_for_change = reason.clone();
        self.executor
            .modify(memory.id, move |m| {
                if let MemoryKind::Pattern(p) = &mut m.kind {
                    p.strength = strength;
                    p.strength_updated_at = now;
                }
                if weak {
                    m.deprecate(reason_for_change);
                }
                Vec::new()
            })
            .await?;
        stats.strength_updates += 1;

        debug!(memory_id = %memory.id, strength, ?trend, "Pattern strength updated");
        if weak {
            stats.deprecations += 1;
            self.audit
                .publish(AuditEvent::MemoryDeprecated {
                    memory_id: memory.id,
                    reason,
                    timestamp: now,
                });
        }
        Ok(weak)
    }

    /// Live memories in the same workspace with cosine similarity at or above `floor`
    async fn neighbours(&self, memory: &Memory, floor: f64) -> Result<Vec<(Memory, f64)>, StoreError> {
        if memory.embedding.is_empty() {
            return Ok(Vec::new());
        }
        let filter = VectorFilter {
            workspace: memory.workspace.clone(),
            types: Vec::new(),
            include_deprecated: false,
            exclude: vec![memory.id],
        };
        let hits: Vec<_> = self
            .vectors
            .search(&memory.embedding, &filter, self.config.max_candidates)
            .await?
            .into_iter()
            .filter(|hit| hit.score >= floor)
            .collect();
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<MemoryId> = hits.iter().map(|h| h.id).collect();
        let memories = self.graph.get_many(&ids).await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                memories
                    .iter()
                    .find(|m| m.id == hit.id && !m.is_deprecated())
                    .map(|m| (m.clone(), hit.score))
            })
            .collect())
    }

    pub async fn detect_contradictions(&self, memory: &Memory) -> Result<Vec<Contradiction>, StoreError> {
        let neighbours = self.neighbours(memory, COMPARE_FLOOR).await?;

        Ok(neighbours
            .into_iter()
            .filter_map(|(other, similarity)| {
                let (contradiction_type, severity, explanation) = classify(memory, &other, similarity)?;
                if severity <= self.config.contradiction_report_threshold {
                    return None;
                }
                let resolution = if severity > self.config.manual_review_threshold {
                    ContradictionResolution::ManualReview
                } else {
                    let (keep, deprecate) = if standing(memory) >= standing(&other) {
                        (memory.id, other.id)
                    } else {
                        (other.id, memory.id)
                    };
                    ContradictionResolution::DeprecateWeaker { keep, deprecate }
                };
                Some(Contradiction {
                    memory_id: memory.id,
                    conflicting_id: other.id,
                    contradiction_type,
                    severity,
                    explanation,
                    resolution,
                })
            })
            .collect())
    }

    pub async fn find_merge_opportunities(&self, memory: &Memory) -> Result<Vec<MergeOpportunity>, StoreError> {
        let neighbours = self.neighbours(memory, self.config.merge_similarity).await?;

        let mut opportunities: Vec<MergeOpportunity> = neighbours
            .into_iter()
            .filter(|(other, _)| other.memory_type() == memory.memory_type())
            .filter(|(other, _)| has_negation(&memory.content) == has_negation(&other.content))
            .filter_map(|(other, similarity)| {
                let gap = (memory.quality.overall() - other.quality.overall()).abs();
                let usage = ((memory.access_count + other.access_count) as f64 / 20.0).min(1.0);
                let benefit = 0.7 * similarity + 0.15 * usage + 0.15 * gap;

                let cross_workspace = if memory.workspace == other.workspace { 0.0 } else { 1.0 };
                let entrenched = (memory.access_count.min(other.access_count) as f64 / 100.0).min(1.0);
                let risk = 0.4 * gap + 0.3 * cross_workspace + 0.3 * entrenched;

                if benefit <= self.config.merge_min_benefit || risk >= self.config.merge_max_risk {
                    return None;
                }

                let (keep, absorb) = if prefer(memory, &other) { (memory, &other) } else { (&other, memory) };
                Some(MergeOpportunity {
                    keep_id: keep.id,
                    absorb_id: absorb.id,
                    similarity,
                    benefit,
                    risk,
                    strategy: if gap > 0.2 { MergeStrategy::Replace } else { MergeStrategy::Append },
                })
            })
            .collect();

        opportunities.sort_by(|a, b| b.benefit.partial_cmp(&a.benefit).unwrap_or(std::cmp::Ordering::Equal));
        Ok(opportunities)
    }

    /// One evolution pass over a single memory
    pub async fn evolve(&self, id: MemoryId) -> Result<EvolutionStats, CortexError> {
        let memory = self.graph.get(id).await?.ok_or(CortexError::NotFound(id))?;
        let mut stats = EvolutionStats::default();
        if memory.is_deprecated() {
            return Ok(stats);
        }

        let analysis = self.analyze_usage(&memory, Utc::now());
        stats.analyzed += 1;

        if self.update_strength(&memory, analysis.trend, &mut stats).await? {
            return Ok(stats);
        }

        for contradiction in self.detect_contradictions(&memory).await? {
            if self.resolve(&contradiction, &mut stats).await? == Some(memory.id) {
                return Ok(stats);
            }
        }

        if self.config.auto_merge {
            // Opportunities are recomputed against the post-contradiction state
            let Some(memory) = self.graph.get(id).await? else {
                return Ok(stats);
            };
            if let Some(best) = self.find_merge_opportunities(&memory).await?.into_iter().next() {
                let version = self.executor.absorb(best.keep_id, best.absorb_id, best.strategy).await?;
                stats.merges_executed += 1;
                stats.deprecations += 1;
                info!(keep = %best.keep_id, absorb = %best.absorb_id, benefit = best.benefit, "Evolution merge executed");
                self.audit
                    .publish(AuditEvent::MemoryMerged {
                        memory_id: best.keep_id,
                        strategy: best.strategy,
                        new_version: version,
                        timestamp: Utc::now(),
                    });
                self.audit
                    .publish(AuditEvent::MemoryDeprecated {
                        memory_id: best.absorb_id,
                        reason: format!("merged into {}", best.keep_id),
                        timestamp: Utc::now(),
                    });
            }
        }

        Ok(stats)
    }

    /// Returns the id that was deprecated, if any
    async fn resolve(&self, contradiction: &Contradiction, stats: &mut EvolutionStats) -> Result<Option<MemoryId>, StoreError> {
        let manual = contradiction.resolution == ContradictionResolution::ManualReview;
        self.audit
            .publish(AuditEvent::ContradictionDetected {
                memory_id: contradiction.memory_id,
                conflicting_id: contradiction.conflicting_id,
                contradiction_type: contradiction.contradiction_type,
                severity: contradiction.severity,
                manual_review: manual,
                timestamp: Utc::now(),
            });

        let ContradictionResolution::DeprecateWeaker { keep, deprecate } = contradiction.resolution else {
            warn!(
                memory_id = %contradiction.memory_id,
                conflicting_id = %contradiction.conflicting_id,
                severity = contradiction.severity,
                "Contradiction needs manual review"
            );
            return Ok(None);
        };

        let reason = format!("contradicted by {}: {}", keep, contradiction.explanation);
        let edge_context = contradiction.explanation.clone();
        let reason_for_change = reason.clone();
        self.executor
            .modify(deprecate, move |m| {
                m.deprecate(reason_for_change);
                vec![MemoryRelationship::new(
                    deprecate,
                    keep,
                    RelationshipType::Contradicts,
                    1.0,
                    edge_context,
                )]
            })
            .await?;

        stats.contradictions_resolved += 1;
        stats.deprecations += 1;
        self.audit
            .publish(AuditEvent::MemoryDeprecated {
                memory_id: deprecate,
                reason,
                timestamp: Utc::now(),
            });
        Ok(Some(deprecate))
    }

    /// Sequential sweep over a workspace (`None` sweeps everything).
    ///
    /// Per-memory failures are logged and counted; the sweep keeps going.
    /// Stops early when `shutdown` is cancelled.
    pub async fn evolve_workspace(
        &self,
        workspace: Option<&str>,
        shutdown: &CancellationToken,
    ) -> Result<EvolutionStats, CortexError> {
        let started = Instant::now();
        let query = GraphQuery {
            workspace: workspace.map(str::to_string),
            ..GraphQuery::default()
        };
        let ids: Vec<MemoryId> = self.graph.query(&query).await?.into_iter().map(|m| m.id).collect();

        let mut stats = EvolutionStats::default();
        let mut failures = 0usize;
        let throttle = Duration::from_millis(self.config.sweep_throttle_ms);

        for (i, id) in ids.iter().enumerate() {
            if shutdown.is_cancelled() {
                info!(processed = i, total = ids.len(), "Evolution sweep cancelled");
                break;
            }

            match self.evolve(*id).await {
                Ok(s) => stats += s,
                Err(e) => {
                    failures += 1;
                    warn!(memory_id = %id, error = %e, "Evolution failed for memory, continuing sweep");
                }
            }

            if !throttle.is_zero() && i + 1 < ids.len() {
                tokio::select! {
                    _ = tokio::time::sleep(throttle) => {}
                    _ = shutdown.cancelled() => {}
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            workspace = workspace.unwrap_or("*"),
            analyzed = stats.analyzed,
            merges = stats.merges_executed,
            deprecations = stats.deprecations,
            failures,
            duration_ms,
            "Evolution sweep completed"
        );
        self.audit
            .publish(AuditEvent::EvolutionSweepCompleted {
                workspace: workspace.map(str::to_string),
                stats,
                failures,
                duration_ms,
                timestamp: Utc::now(),
            });
        Ok(stats)
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to.signed_duration_since(from).num_seconds().max(0) as f64) / 86_400.0
}

/// Weight used to pick which side of a contradiction survives
fn standing(memory: &Memory) -> f64 {
    0.5 * memory.quality.overall() + 0.3 * memory.confidence + 0.2 * memory.strength().unwrap_or(0.5)
}

/// Higher quality wins, the older memory on a tie
fn prefer(a: &Memory, b: &Memory) -> bool {
    let (qa, qb) = (a.quality.overall(), b.quality.overall());
    if (qa - qb).abs() > f64::EPSILON {
        qa > qb
    } else {
        a.created_at <= b.created_at
    }
}

fn numbers(text: &str) -> BTreeSet<&str> {
    NUMBER.find_iter(text).map(|m| m.as_str()).collect()
}

/// Strongest conflict between two similar memories, if any
fn classify(a: &Memory, b: &Memory, similarity: f64) -> Option<(ContradictionType, f64, String)> {
    let mut found: Vec<(ContradictionType, f64, String)> = Vec::new();

    if has_negation(&a.content) != has_negation(&b.content) {
        found.push((
            ContradictionType::Semantic,
            similarity * 0.9,
            "opposite recommendations on the same subject".to_string(),
        ));
    }

    let (na, nb) = (numbers(&a.content), numbers(&b.content));
    if similarity >= FACTUAL_FLOOR && !na.is_empty() && !nb.is_empty() && na != nb {
        found.push((
            ContradictionType::Factual,
            similarity * 0.8,
            "conflicting values".to_string(),
        ));
    }

    if mentions_obsolescence(&a.content) != mentions_obsolescence(&b.content) {
        found.push((
            ContradictionType::Temporal,
            similarity * 0.6,
            "one side marks the subject as outdated".to_string(),
        ));
    }

    found
        .into_iter()
        .max_by(|x, y| x.1.partial_cmp(&y.1).unwrap_or(std::cmp::Ordering::Equal))
}
