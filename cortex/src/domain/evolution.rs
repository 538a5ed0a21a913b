// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Value types produced by the evolution engine

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use super::arbitration::MergeStrategy;
use super::memory::MemoryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageTrend {
    Increasing,
    Stable,
    Decreasing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageAnalysis {
    pub memory_id: MemoryId,
    /// Accesses per day since creation
    pub access_frequency: f64,
    /// exp(-days_since_last_access / window)
    pub recent_activity: f64,
    pub success_rate: f64,
    pub context_diversity: f64,
    pub trend: UsageTrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionType {
    /// Opposite recommendations about the same subject
    Semantic,
    /// Conflicting concrete values (numbers, versions)
    Factual,
    /// One claim marks the other as outdated
    Temporal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ContradictionResolution {
    /// Severity too high for automatic resolution
    ManualReview,
    /// Keep the stronger memory, deprecate the other
    DeprecateWeaker { keep: MemoryId, deprecate: MemoryId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub memory_id: MemoryId,
    pub conflicting_id: MemoryId,
    pub contradiction_type: ContradictionType,
    pub severity: f64,
    pub explanation: String,
    pub resolution: ContradictionResolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOpportunity {
    /// Memory that survives the merge
    pub keep_id: MemoryId,
    /// Memory folded into `keep_id` and then deprecated
    pub absorb_id: MemoryId,
    pub similarity: f64,
    pub benefit: f64,
    pub risk: f64,
    pub strategy: MergeStrategy,
}

/// Counters reported by `evolve` / `evolve_workspace`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionStats {
    pub analyzed: usize,
    pub strength_updates: usize,
    pub contradictions_resolved: usize,
    pub merges_executed: usize,
    pub deprecations: usize,
}

impl AddAssign for EvolutionStats {
    fn add_assign(&mut self, other: Self) {
        self.analyzed += other.analyzed;
        self.strength_updates += other.strength_updates;
        self.contradictions_resolved += other.contradictions_resolved;
        self.merges_executed += other.merges_executed;
        self.deprecations += other.deprecations;
    }
}
