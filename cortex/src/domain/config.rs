// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Cortex Configuration
//
// Every threshold the pipeline uses is a configuration default, not a
// protocol constant. All sections are optional in the YAML file:
//
//   quality:
//     min_overall: 0.6
//     required_gates: { accuracy: 0.4 }
//   arbitration:
//     review_threshold: 0.5
//   evolution:
//     interval_seconds: 3600

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::error::CortexError;
use super::quality::QualityDimension;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CortexConfig {
    pub embedding: EmbeddingConfig,
    pub quality: QualityConfig,
    pub similarity: SimilarityConfig,
    pub arbitration: ArbitrationConfig,
    pub retrieval: RetrievalConfig,
    pub evolution: EvolutionConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Vector dimension (384 matches all-MiniLM-L6-v2)
    pub dimensions: usize,
    pub cache_capacity: usize,
    pub cache_ttl_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 384,
            cache_capacity: 10_000,
            cache_ttl_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Minimum `overall` for admission
    pub min_overall: f64,
    /// Per-dimension minimums that must also hold
    pub required_gates: BTreeMap<QualityDimension, f64>,
    /// Score given to a dimension whose (non-required) validator failed
    pub validator_failure_score: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        let mut required_gates = BTreeMap::new();
        required_gates.insert(QualityDimension::Accuracy, 0.4);
        required_gates.insert(QualityDimension::Clarity, 0.3);
        Self {
            min_overall: 0.6,
            required_gates,
            validator_failure_score: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub max_results: usize,
    /// Semantic similarity above which a candidate is a duplicate
    pub duplicate_threshold: f64,
    /// Structural / contextual matches below this are dropped
    pub min_structural_score: f64,
    pub source_timeout_ms: u64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            duplicate_threshold: 0.95,
            min_structural_score: 0.3,
            source_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    pub duplicate_similarity: f64,
    pub risk_reject_threshold: f64,
    pub add_min_quality: f64,
    pub add_min_novelty: f64,
    pub update_min_similarity: f64,
    pub update_min_quality: f64,
    /// risk.security above this always rejects
    pub security_override: f64,
    /// risk.overall above this sets review_required
    pub review_threshold: f64,
    /// Related memories above this similarity get a SIMILAR_TO edge on ADD
    pub relate_threshold: f64,
    pub oracle_timeout_ms: u64,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            duplicate_similarity: 0.95,
            risk_reject_threshold: 0.7,
            add_min_quality: 0.8,
            add_min_novelty: 0.6,
            update_min_similarity: 0.6,
            update_min_quality: 0.6,
            security_override: 0.8,
            review_threshold: 0.5,
            relate_threshold: 0.6,
            oracle_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub semantic_weight: f64,
    pub structural_weight: f64,
    pub default_limit: usize,
    /// Each leg fetches `limit * candidate_multiplier` before merging
    pub candidate_multiplier: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            structural_weight: 0.3,
            default_limit: 10,
            candidate_multiplier: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// Window of the recent-activity exponential, in days
    pub activity_window_days: f64,
    pub strength_half_life_days: f64,
    /// Patterns decayed below this are deprecated
    pub min_strength: f64,
    pub contradiction_report_threshold: f64,
    pub manual_review_threshold: f64,
    pub merge_similarity: f64,
    pub merge_min_benefit: f64,
    pub merge_max_risk: f64,
    pub auto_merge: bool,
    /// Pause between items in a sweep
    pub sweep_throttle_ms: u64,
    pub max_candidates: usize,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            activity_window_days: 7.0,
            strength_half_life_days: 30.0,
            min_strength: 0.1,
            contradiction_report_threshold: 0.3,
            manual_review_threshold: 0.8,
            merge_similarity: 0.85,
            merge_min_benefit: 0.6,
            merge_max_risk: 0.3,
            auto_merge: true,
            sweep_throttle_ms: 50,
            max_candidates: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items ingested concurrently per window
    pub window: usize,
    pub pause_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window: 8,
            pause_ms: 100,
        }
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), CortexError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(CortexError::Config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

impl CortexConfig {
    /// Load and validate a YAML configuration file
    pub fn from_yaml_file(path: &Path) -> Result<Self, CortexError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CortexError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, CortexError> {
        let config: CortexConfig = serde_yaml::from_str(content)
            .map_err(|e| CortexError::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, CortexError> {
        serde_yaml::to_string(self).map_err(|e| CortexError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), CortexError> {
        if self.embedding.dimensions == 0 {
            return Err(CortexError::Config("embedding.dimensions must be positive".to_string()));
        }
        if self.embedding.cache_capacity == 0 {
            return Err(CortexError::Config("embedding.cache_capacity must be positive".to_string()));
        }

        check_unit("quality.min_overall", self.quality.min_overall)?;
        check_unit("quality.validator_failure_score", self.quality.validator_failure_score)?;
        for (dimension, threshold) in &self.quality.required_gates {
            check_unit(&format!("quality.required_gates.{}", dimension), *threshold)?;
        }

        check_unit("similarity.duplicate_threshold", self.similarity.duplicate_threshold)?;
        check_unit("similarity.min_structural_score", self.similarity.min_structural_score)?;

        let a = &self.arbitration;
        for (name, value) in [
            ("arbitration.duplicate_similarity", a.duplicate_similarity),
            ("arbitration.risk_reject_threshold", a.risk_reject_threshold),
            ("arbitration.add_min_quality", a.add_min_quality),
            ("arbitration.add_min_novelty", a.add_min_novelty),
            ("arbitration.update_min_similarity", a.update_min_similarity),
            ("arbitration.update_min_quality", a.update_min_quality),
            ("arbitration.security_override", a.security_override),
            ("arbitration.review_threshold", a.review_threshold),
            ("arbitration.relate_threshold", a.relate_threshold),
        ] {
            check_unit(name, value)?;
        }

        let r = &self.retrieval;
        check_unit("retrieval.semantic_weight", r.semantic_weight)?;
        check_unit("retrieval.structural_weight", r.structural_weight)?;
        if r.default_limit == 0 || r.candidate_multiplier == 0 {
            return Err(CortexError::Config(
                "retrieval.default_limit and retrieval.candidate_multiplier must be positive".to_string(),
            ));
        }

        let e = &self.evolution;
        if e.activity_window_days <= 0.0 || e.strength_half_life_days <= 0.0 {
            return Err(CortexError::Config(
                "evolution windows must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("evolution.min_strength", e.min_strength),
            ("evolution.contradiction_report_threshold", e.contradiction_report_threshold),
            ("evolution.manual_review_threshold", e.manual_review_threshold),
            ("evolution.merge_similarity", e.merge_similarity),
            ("evolution.merge_min_benefit", e.merge_min_benefit),
            ("evolution.merge_max_risk", e.merge_max_risk),
        ] {
            check_unit(name, value)?;
        }

        if self.batch.window == 0 {
            return Err(CortexError::Config("batch.window must be positive".to_string()));
        }
        Ok(())
    }
}
