// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the Cortex bounded context
//! Published to the audit sink for observability and integration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::arbitration::{Decision, MergeStrategy};
use super::evolution::{ContradictionType, EvolutionStats};
use super::memory::MemoryId;
use super::search::SearchStrategy;

/// Cortex audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Arbitration finished for one candidate (any decision)
    ArbitrationCompleted {
        audit_id: Uuid,
        decision: Decision,
        confidence: f64,
        content_hash: String,
        workspace: Option<String>,
        memory_id: Option<MemoryId>,
        review_required: bool,
        timestamp: DateTime<Utc>,
    },

    /// A new memory was admitted
    MemoryAdded {
        memory_id: MemoryId,
        workspace: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Content of an existing memory was overwritten
    MemoryUpdated {
        memory_id: MemoryId,
        old_version: u32,
        new_version: u32,
        timestamp: DateTime<Utc>,
    },

    /// Candidate content was merged into an existing memory
    MemoryMerged {
        memory_id: MemoryId,
        strategy: MergeStrategy,
        new_version: u32,
        timestamp: DateTime<Utc>,
    },

    /// A memory was soft-removed
    MemoryDeprecated {
        memory_id: MemoryId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Two memories were found to conflict
    ContradictionDetected {
        memory_id: MemoryId,
        conflicting_id: MemoryId,
        contradiction_type: ContradictionType,
        severity: f64,
        manual_review: bool,
        timestamp: DateTime<Utc>,
    },

    /// A sweep over a workspace finished
    EvolutionSweepCompleted {
        workspace: Option<String>,
        stats: EvolutionStats,
        failures: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A search was served
    SearchPerformed {
        strategy: SearchStrategy,
        workspace: Option<String>,
        result_count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl AuditEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::ArbitrationCompleted { timestamp, .. } => *timestamp,
            AuditEvent::MemoryAdded { timestamp, .. } => *timestamp,
            AuditEvent::MemoryUpdated { timestamp, .. } => *timestamp,
            AuditEvent::MemoryMerged { timestamp, .. } => *timestamp,
            AuditEvent::MemoryDeprecated { timestamp, .. } => *timestamp,
            AuditEvent::ContradictionDetected { timestamp, .. } => *timestamp,
            AuditEvent::EvolutionSweepCompleted { timestamp, .. } => *timestamp,
            AuditEvent::SearchPerformed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::ArbitrationCompleted { .. } => "arbitration_completed",
            AuditEvent::MemoryAdded { .. } => "memory_added",
            AuditEvent::MemoryUpdated { .. } => "memory_updated",
            AuditEvent::MemoryMerged { .. } => "memory_merged",
            AuditEvent::MemoryDeprecated { .. } => "memory_deprecated",
            AuditEvent::ContradictionDetected { .. } => "contradiction_detected",
            AuditEvent::EvolutionSweepCompleted { .. } => "evolution_sweep_completed",
            AuditEvent::SearchPerformed { .. } => "search_performed",
        }
    }
}
