// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Typed, directed edges between memories in the knowledge graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::memory::MemoryId;
use super::quality::clamp_unit;

/// Type of edge in the knowledge graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Source is a concrete implementation of target
    Implements,

    /// Source is a newer version of target
    EvolvedFrom,

    /// Source and target make conflicting claims
    Contradicts,

    /// Source only holds when target holds
    DependsOn,

    /// Source recommends consulting target
    Suggests,

    /// Source supersedes target
    Replaces,

    /// Source and target cover the same ground
    SimilarTo,

    /// Source provides evidence for target
    Validates,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::EvolvedFrom => "EVOLVED_FROM",
            RelationshipType::Contradicts => "CONTRADICTS",
            RelationshipType::DependsOn => "DEPENDS_ON",
            RelationshipType::Suggests => "SUGGESTS",
            RelationshipType::Replaces => "REPLACES",
            RelationshipType::SimilarTo => "SIMILAR_TO",
            RelationshipType::Validates => "VALIDATES",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge between two memories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRelationship {
    pub relationship_type: RelationshipType,
    pub source_id: MemoryId,
    pub target_id: MemoryId,
    pub strength: f64,
    pub context: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryRelationship {
    pub fn new(
        source_id: MemoryId,
        target_id: MemoryId,
        relationship_type: RelationshipType,
        strength: f64,
        context: impl Into<String>,
    ) -> Self {
        Self {
            relationship_type,
            source_id,
            target_id,
            strength: clamp_unit(strength),
            context: context.into(),
            created_at: Utc::now(),
        }
    }

    /// Increment strength (reinforcement), capped at 1.0
    pub fn reinforce(&mut self, amount: f64) {
        self.strength = clamp_unit(self.strength + amount);
    }

    /// True when the edge touches `id` on either end
    pub fn involves(&self, id: MemoryId) -> bool {
        self.source_id == id || self.target_id == id
    }

    /// Same endpoints and type, ignoring strength and context
    pub fn same_edge(&self, other: &MemoryRelationship) -> bool {
        self.source_id == other.source_id
            && self.target_id == other.target_id
            && self.relationship_type == other.relationship_type
    }
}
