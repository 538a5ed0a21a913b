// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Arbitration Domain
//!
//! Value types exchanged between the similarity finder, the arbitration
//! engine and the storage executor. An [`ArbitrationResult`] is always data:
//! `REJECT` is an ordinary, frequent outcome and never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use super::memory::{Memory, MemoryId, MemoryKind, MemoryType};
use super::quality::{clamp_unit, QualityScore, RiskAssessment};
use super::relationship::RelationshipType;

/// Disposition chosen for a candidate memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Add,
    Update,
    Merge,
    Reject,
    Deprecate,
}

impl Decision {
    /// UPDATE, MERGE and DEPRECATE act on an existing memory
    pub fn requires_target(&self) -> bool {
        matches!(self, Decision::Update | Decision::Merge | Decision::Deprecate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Add => "ADD",
            Decision::Update => "UPDATE",
            Decision::Merge => "MERGE",
            Decision::Reject => "REJECT",
            Decision::Deprecate => "DEPRECATE",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Concatenate content sections
    Append,
    /// Full overwrite, previous content kept in history
    Replace,
    /// Combine and flag for a human synthesis pass
    Synthesize,
    /// Supersede the target with a new linked version
    Version,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeStrategy::Append => "append",
            MergeStrategy::Replace => "replace",
            MergeStrategy::Synthesize => "synthesize",
            MergeStrategy::Version => "version",
        };
        f.write_str(s)
    }
}

/// Which lookup surfaced a related memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilaritySource {
    Semantic,
    Structural,
    Contextual,
}

/// An existing memory related to a candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarMemory {
    pub memory: Memory,
    pub similarity: f64,
    pub source: SimilaritySource,
    /// Semantic match above the duplicate threshold
    pub duplicate: bool,
}

impl SimilarMemory {
    pub fn id(&self) -> MemoryId {
        self.memory.id
    }
}

/// Reference to a similar memory as recorded in the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultedMemory {
    pub id: MemoryId,
    pub similarity: f64,
    pub source: SimilaritySource,
    pub duplicate: bool,
}

impl From<&SimilarMemory> for ConsultedMemory {
    fn from(similar: &SimilarMemory) -> Self {
        Self {
            id: similar.memory.id,
            similarity: similar.similarity,
            source: similar.source,
            duplicate: similar.duplicate,
        }
    }
}

/// Relationship requested by the ingesting caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedRelationship {
    pub target_id: MemoryId,
    pub relationship_type: RelationshipType,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub context: String,
}

fn default_strength() -> f64 {
    1.0
}

/// Content proposed for admission, after embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateMemory {
    pub content: String,
    pub memory_type: MemoryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub kind: MemoryKind,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub relationships: Vec<RequestedRelationship>,
}

impl CandidateMemory {
    /// SHA-256 of the candidate content, hex encoded
    pub fn content_hash(&self) -> String {
        content_hash(&self.content)
    }
}

pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Audit record attached to every arbitration result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationAudit {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub content_hash: String,
    pub similar_memories: Vec<ConsultedMemory>,
    pub rationale: String,
    pub quality: QualityScore,
    pub risk: RiskAssessment,
    pub review_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationResult {
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_memory_id: Option<MemoryId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_strategy: Option<MergeStrategy>,
    /// Memory created or mutated once the decision was executed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<MemoryId>,
    pub audit: ArbitrationAudit,
}

impl ArbitrationResult {
    pub fn new(
        decision: Decision,
        confidence: f64,
        reasoning: impl Into<String>,
        content_hash: String,
        similar: &[SimilarMemory],
        quality: QualityScore,
        risk: RiskAssessment,
    ) -> Self {
        let reasoning = reasoning.into();
        Self {
            decision,
            confidence: clamp_unit(confidence),
            reasoning: reasoning.clone(),
            target_memory_id: None,
            merge_strategy: None,
            memory_id: None,
            audit: ArbitrationAudit {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                content_hash,
                similar_memories: similar.iter().map(ConsultedMemory::from).collect(),
                rationale: reasoning,
                quality,
                risk,
                review_required: false,
            },
        }
    }

    pub fn with_target(mut self, target: MemoryId) -> Self {
        self.target_memory_id = Some(target);
        self
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = Some(strategy);
        self
    }

    pub fn review_required(&self) -> bool {
        self.audit.review_required
    }

    pub fn is_reject(&self) -> bool {
        self.decision == Decision::Reject
    }

    /// Force a REJECT, keeping the earlier reasoning in the trail
    pub fn force_reject(&mut self, why: &str) {
        self.decision = Decision::Reject;
        self.target_memory_id = None;
        self.merge_strategy = None;
        self.append_reasoning(why);
    }

    pub fn append_reasoning(&mut self, note: &str) {
        if self.reasoning.is_empty() {
            self.reasoning = note.to_string();
        } else {
            self.reasoning = format!("{}; {}", self.reasoning, note);
        }
        self.audit.rationale = self.reasoning.clone();
    }
}

/// Everything the reasoning oracle is shown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleContext {
    pub candidate: CandidateMemory,
    pub similar: Vec<SimilarMemory>,
    pub quality: QualityScore,
    pub risk: RiskAssessment,
}

/// Decision proposed by the reasoning oracle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleProposal {
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<MemoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_strategy: Option<MergeStrategy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_requires_target() {
        assert!(Decision::Update.requires_target());
        assert!(Decision::Merge.requires_target());
        assert!(Decision::Deprecate.requires_target());
        assert!(!Decision::Add.requires_target());
        assert!(!Decision::Reject.requires_target());
    }

    #[test]
    fn test_decision_serialization() {
        assert_eq!(serde_json::to_string(&Decision::Deprecate).unwrap(), "\"DEPRECATE\"");
        let parsed: Decision = serde_json::from_str("\"MERGE\"").unwrap();
        assert_eq!(parsed, Decision::Merge);
        let strategy: MergeStrategy = serde_json::from_str("\"synthesize\"").unwrap();
        assert_eq!(strategy, MergeStrategy::Synthesize);
    }

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = content_hash("Use async/await for error handling");
        let b = content_hash("Use async/await for error handling");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("something else"));
    }

    #[test]
    fn test_force_reject_keeps_trail() {
        let mut result = ArbitrationResult::new(
            Decision::Add,
            0.9,
            "high quality",
            content_hash("x"),
            &[],
            QualityScore::uniform(0.9),
            RiskAssessment::default(),
        )
        .with_target(MemoryId::new());

        result.force_reject("security override");

        assert_eq!(result.decision, Decision::Reject);
        assert!(result.target_memory_id.is_none());
        assert_eq!(result.reasoning, "high quality; security override");
        assert_eq!(result.audit.rationale, result.reasoning);
    }
}
