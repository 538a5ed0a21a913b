// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Memory Aggregate
//!
//! A [`Memory`] is one unit of retained knowledge. The three memory kinds
//! share the base fields and carry their own payload in [`MemoryKind`], an
//! internally tagged union (`"type": "pattern" | "reasoning" | "workspace"`).
//!
//! ## Lifecycle
//!
//! - Created only by a successful `ADD` (or a `version` merge).
//! - Content-affecting mutation (`UPDATE`, `MERGE`) bumps `metadata.version`.
//! - `DEPRECATE` sets `metadata.deprecation_reason`; the memory stays
//!   queryable but is excluded from default search.
//! - Retrieval bumps `access_count` / `last_accessed_at` without touching the
//!   version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::CortexError;
use super::quality::{clamp_unit, QualityScore};
use super::relationship::{MemoryRelationship, RelationshipType};

/// Initial strength of a freshly admitted pattern
pub const INITIAL_PATTERN_STRENGTH: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(MemoryId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Pattern,
    Reasoning,
    Workspace,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Pattern => "pattern",
            MemoryType::Reasoning => "reasoning",
            MemoryType::Workspace => "workspace",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pattern" => Ok(MemoryType::Pattern),
            "reasoning" => Ok(MemoryType::Reasoning),
            "workspace" => Ok(MemoryType::Workspace),
            other => Err(CortexError::validation(format!("unknown memory type '{}'", other))),
        }
    }
}

// ============================================================================
// Variant payloads
// ============================================================================

/// A recurring coding pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMemory {
    pub pattern: String,
    #[serde(default)]
    pub triggers: BTreeSet<String>,
    /// Decaying relevance score (see `EvolutionEngine::update_strength`)
    pub strength: f64,
    #[serde(default)]
    pub related_patterns: Vec<MemoryId>,
    pub strength_updated_at: DateTime<Utc>,
}

/// Goal, assumptions and approach behind a reasoning session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningTrace {
    pub goal: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub approach: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    #[default]
    Medium,
    High,
    Expert,
}

/// A worked problem with its reasoning steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningMemory {
    pub trace: ReasoningTrace,
    pub problem: String,
    pub solution: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub complexity: ComplexityLevel,
    #[serde(default)]
    pub validation_count: u32,
    pub teaching_value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Private,
    #[default]
    Team,
    Organization,
    Public,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceScope {
    pub project: String,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub decision: String,
    pub rationale: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    pub consensus: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConventionChange {
    pub at: DateTime<Utc>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// A team convention scoped to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMemory {
    pub scope: WorkspaceScope,
    pub convention: String,
    #[serde(default)]
    pub agreement: Agreement,
    #[serde(default)]
    pub evolution: Vec<ConventionChange>,
    #[serde(default)]
    pub contributors: BTreeSet<String>,
}

/// Variant payload of a memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryKind {
    Pattern(PatternMemory),
    Reasoning(ReasoningMemory),
    Workspace(WorkspaceMemory),
}

impl MemoryKind {
    pub fn memory_type(&self) -> MemoryType {
        match self {
            MemoryKind::Pattern(_) => MemoryType::Pattern,
            MemoryKind::Reasoning(_) => MemoryType::Reasoning,
            MemoryKind::Workspace(_) => MemoryType::Workspace,
        }
    }

    /// Default payload derived from the raw content when the caller did not
    /// supply one.
    pub fn from_content(
        memory_type: MemoryType,
        content: &str,
        tags: &BTreeSet<String>,
        workspace: Option<&str>,
    ) -> Result<Self, CortexError> {
        let kind = match memory_type {
            MemoryType::Pattern => MemoryKind::Pattern(PatternMemory {
                pattern: content.to_string(),
                triggers: tags.clone(),
                strength: INITIAL_PATTERN_STRENGTH,
                related_patterns: Vec::new(),
                strength_updated_at: Utc::now(),
            }),
            MemoryType::Reasoning => MemoryKind::Reasoning(ReasoningMemory {
                trace: ReasoningTrace::default(),
                problem: content.to_string(),
                solution: String::new(),
                steps: Vec::new(),
                complexity: ComplexityLevel::default(),
                validation_count: 0,
                teaching_value: 0.5,
            }),
            MemoryType::Workspace => {
                let project = workspace
                    .filter(|w| !w.trim().is_empty())
                    .ok_or_else(|| {
                        CortexError::validation("workspace memories require a project scope")
                    })?;
                MemoryKind::Workspace(WorkspaceMemory {
                    scope: WorkspaceScope {
                        project: project.to_string(),
                        ..WorkspaceScope::default()
                    },
                    convention: content.to_string(),
                    agreement: Agreement::default(),
                    evolution: Vec::new(),
                    contributors: BTreeSet::new(),
                })
            }
        };
        Ok(kind)
    }

    /// Check the per-variant invariants
    pub fn validate(&self) -> Result<(), CortexError> {
        if let MemoryKind::Workspace(ws) = self {
            if ws.scope.project.trim().is_empty() {
                return Err(CortexError::validation(
                    "workspace memory requires a non-empty scope.project",
                ));
            }
        }
        Ok(())
    }

    fn clamp_scores(&mut self) {
        match self {
            MemoryKind::Pattern(p) => p.strength = clamp_unit(p.strength),
            MemoryKind::Reasoning(r) => r.teaching_value = clamp_unit(r.teaching_value),
            MemoryKind::Workspace(w) => w.agreement.consensus = clamp_unit(w.agreement.consensus),
        }
    }

    /// Keep the variant's own text in step with the memory content
    fn sync_content(&mut self, content: &str) {
        match self {
            MemoryKind::Pattern(p) => p.pattern = content.to_string(),
            MemoryKind::Reasoning(r) => r.problem = content.to_string(),
            MemoryKind::Workspace(w) => w.convention = content.to_string(),
        }
    }
}

/// A previous content version kept by `replace` merges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub version: u32,
    pub content: String,
    pub replaced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub relationships: Vec<MemoryRelationship>,
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Revision>,
    /// Candidate content waiting for a human synthesis pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_synthesis: Vec<String>,
    #[serde(default)]
    pub synthesis_review_required: bool,
}

impl Default for MemoryMetadata {
    fn default() -> Self {
        Self {
            source: None,
            tags: BTreeSet::new(),
            relationships: Vec::new(),
            version: 1,
            deprecation_reason: None,
            history: Vec::new(),
            pending_synthesis: Vec::new(),
            synthesis_review_required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub content: String,
    /// Empty while the embedding is pending
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub quality: QualityScore,
    pub metadata: MemoryMetadata,
    pub kind: MemoryKind,
}

impl Memory {
    pub fn new(content: impl Into<String>, kind: MemoryKind, workspace: Option<String>) -> Self {
        let now = Utc::now();
        let content = content.into();
        Self {
            id: MemoryId::new(),
            content,
            embedding: Vec::new(),
            confidence: 0.5,
            workspace,
            created_at: now,
            updated_at: now,
            access_count: 0,
            last_accessed_at: None,
            quality: QualityScore::default(),
            metadata: MemoryMetadata::default(),
            kind,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    pub fn with_quality(mut self, quality: QualityScore) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn memory_type(&self) -> MemoryType {
        self.kind.memory_type()
    }

    pub fn version(&self) -> u32 {
        self.metadata.version
    }

    pub fn is_deprecated(&self) -> bool {
        self.metadata.deprecation_reason.is_some()
    }

    /// Strength of a pattern memory; other kinds have none
    pub fn strength(&self) -> Option<f64> {
        match &self.kind {
            MemoryKind::Pattern(p) => Some(p.strength),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), CortexError> {
        if self.content.trim().is_empty() {
            return Err(CortexError::validation("memory content must not be empty"));
        }
        if self.metadata.version == 0 {
            return Err(CortexError::validation("memory version must be at least 1"));
        }
        self.kind.validate()
    }

    /// Bring every bounded field back into `[0.0, 1.0]`
    pub fn clamp_scores(&mut self) {
        self.confidence = clamp_unit(self.confidence);
        self.kind.clamp_scores();
        for rel in &mut self.metadata.relationships {
            rel.strength = clamp_unit(rel.strength);
        }
    }

    /// Replace the content and embedding; bumps the version
    pub fn revise(&mut self, content: impl Into<String>, embedding: Vec<f32>, quality: QualityScore) {
        let content = content.into();
        self.kind.sync_content(&content);
        self.content = content;
        self.embedding = embedding;
        self.quality = quality;
        self.bump_version();
    }

    pub fn bump_version(&mut self) {
        self.metadata.version = self.metadata.version.saturating_add(1);
        self.updated_at = Utc::now();
    }

    pub fn deprecate(&mut self, reason: impl Into<String>) {
        self.metadata.deprecation_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    pub fn record_access(&mut self, at: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = Some(at);
    }

    /// Add an outgoing relationship unless an identical edge exists
    pub fn relate(&mut self, relationship: MemoryRelationship) {
        let exists = self
            .metadata
            .relationships
            .iter()
            .any(|r| r.same_edge(&relationship));
        if !exists {
            self.metadata.relationships.push(relationship);
        }
    }

    pub fn relationships_of_type(&self, relationship_type: RelationshipType) -> impl Iterator<Item = &MemoryRelationship> {
        self.metadata
            .relationships
            .iter()
            .filter(move |r| r.relationship_type == relationship_type)
    }

    /// First characters of the content, for log lines and audit trails
    pub fn summary(&self) -> String {
        const MAX: usize = 80;
        if self.content.chars().count() <= MAX {
            self.content.clone()
        } else {
            let head: String = self.content.chars().take(MAX).collect();
            format!("{}…", head)
        }
    }
}
