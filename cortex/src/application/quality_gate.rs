// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Quality Gate
//!
//! Scores candidate content on five dimensions and decides whether it clears
//! the admission threshold. Every dimension is produced by one or more
//! [`QualityValidator`]s; the crate ships rule-based heuristics and external
//! assessors can be plugged in through the same trait.
//!
//! ## Failure semantics
//!
//! - Several validators on one dimension are averaged.
//! - A non-required validator that errors contributes
//!   `quality.validator_failure_score` (default 0.3) instead of its score.
//! - A `required` validator that errors blocks admission with
//!   [`QualityGateError`].

use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{
    MemoryKind, MemoryType, QualityConfig, QualityDimension, QualityGateError, QualityScore, SimilarMemory,
    SimilaritySource,
};

/// Everything a validator may look at
pub struct AssessmentContext<'a> {
    pub content: &'a str,
    pub memory_type: MemoryType,
    pub tags: &'a BTreeSet<String>,
    pub source: Option<&'a str>,
    pub kind: Option<&'a MemoryKind>,
    pub similar: &'a [SimilarMemory],
}

/// One scorer for one dimension
#[async_trait]
pub trait QualityValidator: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> QualityDimension;

    /// A required validator's failure blocks admission
    fn required(&self) -> bool {
        false
    }

    async fn score(&self, context: &AssessmentContext<'_>) -> anyhow::Result<f64>;
}

/// Outcome of comparing a score against the configured gates
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub passed: bool,
    /// `"overall"` or a dimension name
    pub failed_gates: Vec<String>,
    pub reasons: Vec<String>,
}

pub struct QualityGate {
    validators: Vec<Arc<dyn QualityValidator>>,
    config: QualityConfig,
}

impl QualityGate {
    /// Gate with the rule-based validator for every dimension
    pub fn new(config: QualityConfig) -> Self {
        Self {
            validators: rule_based_validators(),
            config,
        }
    }

    /// Gate with no validators; every dimension scores the failure score
    /// until validators are added
    pub fn empty(config: QualityConfig) -> Self {
        Self {
            validators: Vec::new(),
            config,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn QualityValidator>) -> Self {
        self.add_validator(validator);
        self
    }

    pub fn add_validator(&mut self, validator: Arc<dyn QualityValidator>) {
        self.validators.push(validator);
    }

    pub async fn assess(&self, context: &AssessmentContext<'_>) -> Result<QualityScore, QualityGateError> {
        let runs = join_all(self.validators.iter().map(|v| async move { (v, v.score(context).await) })).await;

        let mut totals = [(0.0f64, 0usize); 5];
        for (validator, outcome) in runs {
            let value = match outcome {
                Ok(value) => value,
                Err(e) if validator.required() => {
                    return Err(QualityGateError::RequiredValidatorFailed {
                        validator: validator.name().to_string(),
                        dimension: validator.dimension().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    warn!(
                        validator = validator.name(),
                        dimension = %validator.dimension(),
                        error = %e,
                        "Quality validator failed, using conservative score"
                    );
                    self.config.validator_failure_score
                }
            };
            let slot = &mut totals[dimension_index(validator.dimension())];
            slot.0 += value.clamp(0.0, 1.0);
            slot.1 += 1;
        }

        let mut score = QualityScore::default();
        for dimension in QualityDimension::ALL {
            let (sum, count) = totals[dimension_index(dimension)];
            let value = if count == 0 {
                self.config.validator_failure_score
            } else {
                sum / count as f64
            };
            score.set(dimension, value);
        }

        debug!(overall = score.overall(), "Quality assessed");
        Ok(score)
    }

    pub fn validate_threshold(&self, score: &QualityScore) -> ThresholdResult {
        let mut failed_gates = Vec::new();
        let mut reasons = Vec::new();

        if score.overall() < self.config.min_overall {
            failed_gates.push("overall".to_string());
            reasons.push(format!(
                "overall quality {:.2} below minimum {:.2}",
                score.overall(),
                self.config.min_overall
            ));
        }
        for (dimension, threshold) in &self.config.required_gates {
            let value = score.get(*dimension);
            if value < *threshold {
                failed_gates.push(dimension.to_string());
                reasons.push(format!("{} {:.2} below required {:.2}", dimension, value, threshold));
            }
        }

        ThresholdResult {
            passed: failed_gates.is_empty(),
            failed_gates,
            reasons,
        }
    }
}

fn dimension_index(dimension: QualityDimension) -> usize {
    match dimension {
        QualityDimension::Novelty => 0,
        QualityDimension::Accuracy => 1,
        QualityDimension::Utility => 2,
        QualityDimension::Clarity => 3,
        QualityDimension::Validation => 4,
    }
}

/// Per-dimension hints for a weak score
pub fn suggest_improvements(score: &QualityScore) -> Vec<String> {
    const WEAK: f64 = 0.6;
    let mut hints = Vec::new();
    for dimension in QualityDimension::ALL {
        if score.get(dimension) >= WEAK {
            continue;
        }
        let hint = match dimension {
            QualityDimension::Novelty => "Overlaps existing knowledge; extend or update the existing memory instead",
            QualityDimension::Accuracy => "Remove hedging and placeholders; state only what is known to hold",
            QualityDimension::Utility => "Phrase it as actionable guidance with the concrete API or tool involved",
            QualityDimension::Clarity => "Use complete sentences of moderate length",
            QualityDimension::Validation => "Cite a source, test or benchmark that backs the claim",
        };
        hints.push(format!("{}: {}", dimension, hint));
    }
    hints
}

pub fn rule_based_validators() -> Vec<Arc<dyn QualityValidator>> {
    vec![
        Arc::new(NoveltyHeuristic),
        Arc::new(AccuracyHeuristic),
        Arc::new(UtilityHeuristic),
        Arc::new(ClarityHeuristic),
        Arc::new(ValidationHeuristic),
    ]
}

// ============================================================================
// Rule-based heuristics
// ============================================================================

static HEDGING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(maybe|might|probably|perhaps|possibly|i think|i guess|not sure|seems? to|could be)\b")
        .expect("valid regex")
});

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\bTODO\b|\bFIXME\b|\bXXX\b|\bTBD\b|lorem ipsum|\?\?\?|<placeholder>)").expect("valid regex"));

static ACTIONABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(use|prefer|avoid|always|never|should|must|call|return|wrap|run|add|remove|handle|check|validate|replace|configure|set|pass|keep|split)\b",
    )
    .expect("valid regex")
});

static TECHNICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(`[^`]+`|::|\(\)|\w+/\w+|\b[a-z]+_[a-z_]+\b|\b[a-z]+[A-Z]\w*\b|\b(async|await|error|errors|function|api|query|cache|thread|lock|mutex|trait|struct|type|test|tests|index|schema|endpoint|token|handler|module|config|database|sql|http|json|yaml)\b)",
    )
    .expect("valid regex")
});

static EVIDENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(tested|verified|benchmark(ed)?|measured|because|according to|docs|documentation|rfc|e\.g\.|for example|https?://\S+)")
        .expect("valid regex")
});

fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

pub struct NoveltyHeuristic;

#[async_trait]
impl QualityValidator for NoveltyHeuristic {
    fn name(&self) -> &str {
        "novelty-heuristic"
    }

    fn dimension(&self) -> QualityDimension {
        QualityDimension::Novelty
    }

    async fn score(&self, context: &AssessmentContext<'_>) -> anyhow::Result<f64> {
        let highest = context
            .similar
            .iter()
            .filter(|s| s.source == SimilaritySource::Semantic)
            .map(|s| s.similarity)
            .fold(0.0f64, f64::max);
        Ok(1.0 - highest)
    }
}

pub struct AccuracyHeuristic;

#[async_trait]
impl QualityValidator for AccuracyHeuristic {
    fn name(&self) -> &str {
        "accuracy-heuristic"
    }

    fn dimension(&self) -> QualityDimension {
        QualityDimension::Accuracy
    }

    async fn score(&self, context: &AssessmentContext<'_>) -> anyhow::Result<f64> {
        let hedges = HEDGING.find_iter(context.content).count() as f64;
        let placeholders = PLACEHOLDER.find_iter(context.content).count() as f64;
        Ok(0.85 - 0.15 * hedges - 0.25 * placeholders)
    }
}

pub struct UtilityHeuristic;

#[async_trait]
impl QualityValidator for UtilityHeuristic {
    fn name(&self) -> &str {
        "utility-heuristic"
    }

    fn dimension(&self) -> QualityDimension {
        QualityDimension::Utility
    }

    async fn score(&self, context: &AssessmentContext<'_>) -> anyhow::Result<f64> {
        let mut score = match context.memory_type {
            MemoryType::Pattern | MemoryType::Reasoning => 0.7,
            MemoryType::Workspace => 0.65,
        };
        if ACTIONABLE.is_match(context.content) {
            score += 0.1;
        }
        if TECHNICAL.is_match(context.content) {
            score += 0.1;
        }
        if word_count(context.content) < 3 {
            score -= 0.3;
        }
        Ok(score)
    }
}

pub struct ClarityHeuristic;

#[async_trait]
impl QualityValidator for ClarityHeuristic {
    fn name(&self) -> &str {
        "clarity-heuristic"
    }

    fn dimension(&self) -> QualityDimension {
        QualityDimension::Clarity
    }

    async fn score(&self, context: &AssessmentContext<'_>) -> anyhow::Result<f64> {
        let content = context.content.trim();
        let words = word_count(content);
        let mut score = match words {
            0..=2 => 0.3,
            3..=60 => 0.9,
            61..=150 => 0.8,
            _ => 0.6,
        };

        let sentences = content
            .split(['.', '!', '?', '\n'])
            .filter(|s| !s.trim().is_empty())
            .count()
            .max(1);
        if words / sentences > 40 {
            score -= 0.2;
        }

        let letters: Vec<char> = content.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.len() > 10 && letters.iter().all(|c| c.is_uppercase()) {
            score -= 0.2;
        }
        if content.contains("!!") || content.contains("??") {
            score -= 0.1;
        }
        Ok(score)
    }
}

pub struct ValidationHeuristic;

#[async_trait]
impl QualityValidator for ValidationHeuristic {
    fn name(&self) -> &str {
        "validation-heuristic"
    }

    fn dimension(&self) -> QualityDimension {
        QualityDimension::Validation
    }

    async fn score(&self, context: &AssessmentContext<'_>) -> anyhow::Result<f64> {
        let mut score = 0.5;
        if context.source.map(|s| !s.trim().is_empty()).unwrap_or(false) {
            score += 0.2;
        }
        score += (0.1 * EVIDENCE.find_iter(context.content).count() as f64).min(0.3);
        if let Some(MemoryKind::Reasoning(reasoning)) = context.kind {
            score += (0.05 * reasoning.validation_count as f64).min(0.2);
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Memory, MemoryKind};

    struct FailingValidator {
        dimension: QualityDimension,
        required: bool,
    }

    #[async_trait]
    impl QualityValidator for FailingValidator {
        fn name(&self) -> &str {
            "failing"
        }

        fn dimension(&self) -> QualityDimension {
            self.dimension
        }

        fn required(&self) -> bool {
            self.required
        }

        async fn score(&self, _context: &AssessmentContext<'_>) -> anyhow::Result<f64> {
            anyhow::bail!("assessor offline")
        }
    }

    struct FixedValidator(QualityDimension, f64);

    #[async_trait]
    impl QualityValidator for FixedValidator {
        fn name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> QualityDimension {
            self.0
        }

        async fn score(&self, _context: &AssessmentContext<'_>) -> anyhow::Result<f64> {
            Ok(self.1)
        }
    }

    fn context<'a>(content: &'a str, tags: &'a BTreeSet<String>, similar: &'a [SimilarMemory]) -> AssessmentContext<'a> {
        AssessmentContext {
            content,
            memory_type: MemoryType::Pattern,
            tags,
            source: None,
            kind: None,
            similar,
        }
    }

    fn similar(similarity: f64) -> SimilarMemory {
        let kind = MemoryKind::from_content(MemoryType::Pattern, "x", &BTreeSet::new(), None).unwrap();
        SimilarMemory {
            memory: Memory::new("x", kind, None),
            similarity,
            source: SimilaritySource::Semantic,
            duplicate: similarity > 0.95,
        }
    }

    #[tokio::test]
    async fn test_actionable_pattern_scores_high() {
        let gate = QualityGate::new(QualityConfig::default());
        let tags = BTreeSet::new();
        let score = gate
            .assess(&context("Use async/await for error handling", &tags, &[]))
            .await
            .unwrap();

        assert_eq!(score.novelty(), 1.0);
        assert!(score.overall() >= 0.8, "overall was {}", score.overall());
        assert!(gate.validate_threshold(&score).passed);
    }

    #[tokio::test]
    async fn test_novelty_tracks_highest_semantic_similarity() {
        let gate = QualityGate::new(QualityConfig::default());
        let tags = BTreeSet::new();
        let similar = vec![similar(0.4), similar(0.97)];
        let score = gate.assess(&context("Use async/await for error handling", &tags, &similar)).await.unwrap();

        assert!((score.novelty() - 0.03).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_hedged_placeholder_content_scores_low() {
        let gate = QualityGate::new(QualityConfig::default());
        let tags = BTreeSet::new();
        let score = gate.assess(&context("maybe TODO ???", &tags, &[])).await.unwrap();

        assert!(score.accuracy() < 0.4);
        let threshold = gate.validate_threshold(&score);
        assert!(!threshold.passed);
        assert!(threshold.failed_gates.contains(&"accuracy".to_string()));
        assert!(!suggest_improvements(&score).is_empty());
    }

    #[tokio::test]
    async fn test_failed_optional_validator_uses_failure_score() {
        let gate = QualityGate::empty(QualityConfig::default())
            .with_validator(Arc::new(FixedValidator(QualityDimension::Clarity, 0.9)))
            .with_validator(Arc::new(FailingValidator {
                dimension: QualityDimension::Clarity,
                required: false,
            }));
        let tags = BTreeSet::new();
        let score = gate.assess(&context("anything", &tags, &[])).await.unwrap();

        assert!((score.clarity() - (0.9 + 0.3) / 2.0).abs() < 1e-9);
        assert!((score.accuracy() - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_required_validator_blocks() {
        let gate = QualityGate::new(QualityConfig::default()).with_validator(Arc::new(FailingValidator {
            dimension: QualityDimension::Accuracy,
            required: true,
        }));
        let tags = BTreeSet::new();
        let err = gate.assess(&context("Use tokio::spawn for background work", &tags, &[])).await.unwrap_err();

        assert!(matches!(err, QualityGateError::RequiredValidatorFailed { .. }));
    }

    #[test]
    fn test_threshold_reports_overall() {
        let gate = QualityGate::new(QualityConfig::default());
        let result = gate.validate_threshold(&QualityScore::uniform(0.5));

        assert!(!result.passed);
        assert_eq!(result.failed_gates, vec!["overall".to_string()]);
        assert!(result.reasons[0].contains("below minimum"));
    }

    #[test]
    fn test_no_suggestions_for_strong_score() {
        assert!(suggest_improvements(&QualityScore::uniform(0.9)).is_empty());
    }
}
