// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Arbitration Engine
//!
//! Chooses one of ADD, UPDATE, MERGE, REJECT or DEPRECATE for a candidate.
//!
//! ## Ladder
//!
//! 1. A duplicate among the similar memories rejects immediately.
//! 2. The reasoning oracle, when configured, is asked under a timeout. Its
//!    proposal is only used if it is well formed and any target it names was
//!    among the consulted memories.
//! 3. Otherwise the deterministic fallback applies:
//!
//! | Condition | Decision |
//! |-----------|----------|
//! | highest semantic similarity > 0.95 | REJECT |
//! | risk.overall > 0.7 | REJECT |
//! | quality.overall > 0.8 and novelty > 0.6 | ADD |
//! | highest semantic similarity > 0.6 and quality.overall > 0.6 | UPDATE best match |
//! | otherwise | REJECT |
//!
//! After either path `risk.security > 0.8` forces REJECT and
//! `risk.overall > review_threshold` sets `review_required`.
//!
//! The engine is total: any internal fault, including a panic inside the
//! oracle, becomes a REJECT with `review_required` set.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{
    ArbitrationConfig, ArbitrationResult, CandidateMemory, Decision, MergeStrategy, OracleContext, OracleError,
    OracleProposal, QualityScore, ReasoningOracle, RiskAssessment, SimilarMemory, SimilaritySource,
};

pub struct ArbitrationEngine {
    oracle: Option<Arc<dyn ReasoningOracle>>,
    config: ArbitrationConfig,
}

impl ArbitrationEngine {
    pub fn new(config: ArbitrationConfig) -> Self {
        Self { oracle: None, config }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ReasoningOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    pub async fn arbitrate(
        &self,
        candidate: &CandidateMemory,
        similar: &[SimilarMemory],
        quality: QualityScore,
        risk: RiskAssessment,
    ) -> ArbitrationResult {
        let decided = AssertUnwindSafe(self.decide(candidate, similar, quality, risk))
            .catch_unwind()
            .await;

        let mut result = match decided {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(error = %message, "Arbitration failed, rejecting fail-safe");
                return Self::failsafe(candidate, similar, quality, risk, &message);
            }
        };

        self.apply_overrides(&mut result, &risk);

        info!(
            decision = %result.decision,
            confidence = result.confidence,
            review_required = result.review_required(),
            target = ?result.target_memory_id,
            "Arbitration decided"
        );
        result
    }

    /// REJECT with `review_required`, maximal security and quality risk
    pub fn failsafe(
        candidate: &CandidateMemory,
        similar: &[SimilarMemory],
        quality: QualityScore,
        risk: RiskAssessment,
        failure: &str,
    ) -> ArbitrationResult {
        let risk = risk.with_security(1.0).with_quality(1.0);
        let mut result = ArbitrationResult::new(
            Decision::Reject,
            1.0,
            format!("arbitration failed: {}", failure),
            candidate.content_hash(),
            similar,
            quality,
            risk,
        );
        result.audit.review_required = true;
        result
    }

    async fn decide(
        &self,
        candidate: &CandidateMemory,
        similar: &[SimilarMemory],
        quality: QualityScore,
        risk: RiskAssessment,
    ) -> ArbitrationResult {
        let hash = candidate.content_hash();

        if let Some(duplicate) = similar.iter().filter(|s| s.duplicate).max_by(|a, b| {
            a.similarity.partial_cmp(&b.similarity).unwrap_or(std::cmp::Ordering::Equal)
        }) {
            return ArbitrationResult::new(
                Decision::Reject,
                duplicate.similarity,
                format!(
                    "duplicate of existing memory {} (similarity {:.2})",
                    duplicate.id(),
                    duplicate.similarity
                ),
                hash,
                similar,
                quality,
                risk,
            );
        }

        if let Some(oracle) = &self.oracle {
            match self.consult(oracle.as_ref(), candidate, similar, quality, risk).await {
                Ok(proposal) => return Self::from_proposal(proposal, hash, similar, quality, risk),
                Err(e) => warn!(error = %e, "Oracle proposal unusable, using deterministic fallback"),
            }
        }

        self.fallback(hash, similar, quality, risk)
    }

    async fn consult(
        &self,
        oracle: &dyn ReasoningOracle,
        candidate: &CandidateMemory,
        similar: &[SimilarMemory],
        quality: QualityScore,
        risk: RiskAssessment,
    ) -> Result<OracleProposal, OracleError> {
        let context = OracleContext {
            candidate: candidate.clone(),
            similar: similar.to_vec(),
            quality,
            risk,
        };

        let timeout_ms = self.config.oracle_timeout_ms;
        let proposal = tokio::time::timeout(Duration::from_millis(timeout_ms), oracle.propose(&context))
            .await
            .map_err(|_| OracleError::Timeout(timeout_ms))??;

        debug!(decision = %proposal.decision, confidence = proposal.confidence, "Oracle proposal received");
        validate_proposal(proposal, similar)
    }

    fn from_proposal(
        proposal: OracleProposal,
        hash: String,
        similar: &[SimilarMemory],
        quality: QualityScore,
        risk: RiskAssessment,
    ) -> ArbitrationResult {
        let mut result = ArbitrationResult::new(
            proposal.decision,
            proposal.confidence,
            format!("oracle: {}", proposal.reasoning),
            hash,
            similar,
            quality,
            risk,
        );
        if proposal.decision.requires_target() {
            if let Some(target) = proposal.target_id {
                result = result.with_target(target);
            }
        }
        if let Some(strategy) = proposal.merge_strategy {
            result = result.with_merge_strategy(strategy);
        }
        result
    }

    fn fallback(
        &self,
        hash: String,
        similar: &[SimilarMemory],
        quality: QualityScore,
        risk: RiskAssessment,
    ) -> ArbitrationResult {
        let c = &self.config;
        let best_semantic = similar
            .iter()
            .filter(|s| s.source == SimilaritySource::Semantic)
            .max_by(|a, b| a.similarity.partial_cmp(&b.similarity).unwrap_or(std::cmp::Ordering::Equal));
        let highest = best_semantic.map(|s| s.similarity).unwrap_or(0.0);
        let overall = quality.overall();

        if highest > c.duplicate_similarity {
            return ArbitrationResult::new(
                Decision::Reject,
                highest,
                format!("duplicate: semantic similarity {:.2} above {:.2}", highest, c.duplicate_similarity),
                hash,
                similar,
                quality,
                risk,
            );
        }

        if risk.overall() > c.risk_reject_threshold {
            return ArbitrationResult::new(
                Decision::Reject,
                risk.overall(),
                format!("risk {:.2} above {:.2}", risk.overall(), c.risk_reject_threshold),
                hash,
                similar,
                quality,
                risk,
            );
        }

        if overall > c.add_min_quality && quality.novelty() > c.add_min_novelty {
            return ArbitrationResult::new(
                Decision::Add,
                overall,
                format!("novel high-quality knowledge (quality {:.2}, novelty {:.2})", overall, quality.novelty()),
                hash,
                similar,
                quality,
                risk,
            );
        }

        if let Some(best) = best_semantic {
            if highest > c.update_min_similarity && overall > c.update_min_quality {
                return ArbitrationResult::new(
                    Decision::Update,
                    (highest + overall) / 2.0,
                    format!(
                        "refines existing memory {} (similarity {:.2}, quality {:.2})",
                        best.id(),
                        highest,
                        overall
                    ),
                    hash,
                    similar,
                    quality,
                    risk,
                )
                .with_target(best.id());
            }
        }

        ArbitrationResult::new(
            Decision::Reject,
            1.0 - overall,
            format!("insufficient value (quality {:.2}, novelty {:.2})", overall, quality.novelty()),
            hash,
            similar,
            quality,
            risk,
        )
    }

    fn apply_overrides(&self, result: &mut ArbitrationResult, risk: &RiskAssessment) {
        if risk.security() > self.config.security_override && result.decision != Decision::Reject {
            result.force_reject(&format!(
                "security risk {:.2} above override {:.2}",
                risk.security(),
                self.config.security_override
            ));
        }
        if risk.overall() > self.config.review_threshold {
            result.audit.review_required = true;
        }
    }
}

fn validate_proposal(mut proposal: OracleProposal, similar: &[SimilarMemory]) -> Result<OracleProposal, OracleError> {
    if !proposal.confidence.is_finite() || !(0.0..=1.0).contains(&proposal.confidence) {
        return Err(OracleError::Malformed(format!("confidence {} outside [0, 1]", proposal.confidence)));
    }
    if proposal.reasoning.trim().is_empty() {
        return Err(OracleError::Malformed("empty reasoning".to_string()));
    }

    if proposal.decision.requires_target() {
        let target = proposal
            .target_id
            .ok_or_else(|| OracleError::Malformed(format!("{} without target", proposal.decision)))?;
        if !similar.iter().any(|s| s.id() == target) {
            return Err(OracleError::Malformed(format!("target {} was not consulted", target)));
        }
    } else {
        proposal.target_id = None;
    }

    match proposal.decision {
        Decision::Merge => {
            proposal.merge_strategy.get_or_insert(MergeStrategy::Append);
        }
        _ => proposal.merge_strategy = None,
    }
    Ok(proposal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Memory, MemoryId, MemoryKind, MemoryType};
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    enum Behaviour {
        Propose(OracleProposal),
        Fail,
        Hang,
        Panic,
    }

    struct MockOracle(Behaviour);

    #[async_trait]
    impl ReasoningOracle for MockOracle {
        async fn propose(&self, _context: &OracleContext) -> Result<OracleProposal, OracleError> {
            match &self.0 {
                Behaviour::Propose(p) => Ok(p.clone()),
                Behaviour::Fail => Err(OracleError::Unavailable("offline".to_string())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(OracleError::Unavailable("unreachable".to_string()))
                }
                Behaviour::Panic => panic!("oracle exploded"),
            }
        }
    }

    fn candidate(content: &str) -> CandidateMemory {
        CandidateMemory {
            content: content.to_string(),
            memory_type: MemoryType::Pattern,
            workspace: Some("svc".to_string()),
            tags: BTreeSet::new(),
            source: None,
            kind: MemoryKind::from_content(MemoryType::Pattern, content, &BTreeSet::new(), None).unwrap(),
            embedding: vec![1.0, 0.0],
            confidence: None,
            relationships: vec![],
        }
    }

    fn similar(similarity: f64, duplicate: bool) -> SimilarMemory {
        let kind = MemoryKind::from_content(MemoryType::Pattern, "existing", &BTreeSet::new(), None).unwrap();
        SimilarMemory {
            memory: Memory::new("existing", kind, Some("svc".to_string())),
            similarity,
            source: SimilaritySource::Semantic,
            duplicate,
        }
    }

    fn engine() -> ArbitrationEngine {
        ArbitrationEngine::new(ArbitrationConfig::default())
    }

    fn proposal(decision: Decision, target: Option<MemoryId>) -> OracleProposal {
        OracleProposal {
            decision,
            confidence: 0.9,
            reasoning: "looks right".to_string(),
            target_id: target,
            merge_strategy: None,
        }
    }

    fn high_quality() -> QualityScore {
        QualityScore::new(1.0, 0.85, 0.9, 0.9, 0.5)
    }

    #[tokio::test]
    async fn test_novel_high_quality_is_added() {
        let result = engine()
            .arbitrate(&candidate("Use async/await"), &[], high_quality(), RiskAssessment::default())
            .await;

        assert_eq!(result.decision, Decision::Add);
        assert!(result.confidence >= 0.5);
        assert!(!result.review_required());
    }

    #[tokio::test]
    async fn test_duplicate_rejects_regardless_of_quality() {
        let found = vec![similar(0.97, true)];
        let result = engine()
            .arbitrate(&candidate("Use async/await"), &found, QualityScore::uniform(1.0), RiskAssessment::default())
            .await;

        assert_eq!(result.decision, Decision::Reject);
        assert!(result.reasoning.contains("duplicate"));
        assert_eq!(result.audit.similar_memories.len(), 1);
    }

    #[tokio::test]
    async fn test_similar_good_candidate_updates_best_match() {
        let found = vec![similar(0.75, false), similar(0.65, false)];
        let quality = QualityScore::new(0.25, 0.85, 0.8, 0.9, 0.5);
        let result = engine()
            .arbitrate(&candidate("Use async/await"), &found, quality, RiskAssessment::default())
            .await;

        assert_eq!(result.decision, Decision::Update);
        assert_eq!(result.target_memory_id, Some(found[0].id()));
    }

    #[tokio::test]
    async fn test_low_value_is_rejected() {
        let result = engine()
            .arbitrate(&candidate("meh"), &[], QualityScore::uniform(0.4), RiskAssessment::default())
            .await;
        assert_eq!(result.decision, Decision::Reject);
    }

    #[tokio::test]
    async fn test_high_risk_is_rejected() {
        let risk = RiskAssessment::new(0.9, 0.9, 0.5, 0.7);
        let result = engine()
            .arbitrate(&candidate("legacy"), &[], high_quality(), risk)
            .await;

        assert_eq!(result.decision, Decision::Reject);
        assert!(result.review_required());
    }

    #[tokio::test]
    async fn test_security_override_beats_oracle_add() {
        let engine = engine().with_oracle(Arc::new(MockOracle(Behaviour::Propose(proposal(Decision::Add, None)))));
        let risk = RiskAssessment::default().with_security(0.95);
        let result = engine.arbitrate(&candidate("API_KEY=..."), &[], high_quality(), risk).await;

        assert_eq!(result.decision, Decision::Reject);
        assert!(result.reasoning.contains("security"));
    }

    #[tokio::test]
    async fn test_oracle_proposal_used_when_valid() {
        let found = vec![similar(0.7, false)];
        let mut merge = proposal(Decision::Merge, Some(found[0].id()));
        merge.merge_strategy = None;
        let engine = engine().with_oracle(Arc::new(MockOracle(Behaviour::Propose(merge))));

        let result = engine
            .arbitrate(&candidate("extra detail"), &found, QualityScore::uniform(0.7), RiskAssessment::default())
            .await;

        assert_eq!(result.decision, Decision::Merge);
        assert_eq!(result.merge_strategy, Some(MergeStrategy::Append));
        assert!(result.reasoning.starts_with("oracle:"));
    }

    #[tokio::test]
    async fn test_oracle_target_outside_similar_set_falls_back() {
        let engine = engine().with_oracle(Arc::new(MockOracle(Behaviour::Propose(proposal(
            Decision::Update,
            Some(MemoryId::new()),
        )))));

        let result = engine
            .arbitrate(&candidate("Use async/await"), &[], high_quality(), RiskAssessment::default())
            .await;

        assert_eq!(result.decision, Decision::Add);
        assert!(!result.reasoning.starts_with("oracle:"));
    }

    #[tokio::test]
    async fn test_oracle_failure_and_timeout_fall_back() {
        let engine_fail = engine().with_oracle(Arc::new(MockOracle(Behaviour::Fail)));
        let result = engine_fail
            .arbitrate(&candidate("Use async/await"), &[], high_quality(), RiskAssessment::default())
            .await;
        assert_eq!(result.decision, Decision::Add);

        let config = ArbitrationConfig {
            oracle_timeout_ms: 10,
            ..ArbitrationConfig::default()
        };
        let engine_hang = ArbitrationEngine::new(config).with_oracle(Arc::new(MockOracle(Behaviour::Hang)));
        let result = engine_hang
            .arbitrate(&candidate("Use async/await"), &[], high_quality(), RiskAssessment::default())
            .await;
        assert_eq!(result.decision, Decision::Add);
    }

    #[tokio::test]
    async fn test_oracle_panic_is_failsafe_reject() {
        let engine = engine().with_oracle(Arc::new(MockOracle(Behaviour::Panic)));
        let result = engine
            .arbitrate(&candidate("Use async/await"), &[], high_quality(), RiskAssessment::default())
            .await;

        assert_eq!(result.decision, Decision::Reject);
        assert!(result.review_required());
        assert_eq!(result.audit.risk.security(), 1.0);
        assert_eq!(result.audit.risk.quality(), 1.0);
        assert!(result.reasoning.contains("oracle exploded"));
    }

    #[test]
    fn test_malformed_confidence_rejected() {
        let mut bad = proposal(Decision::Add, None);
        bad.confidence = 1.5;
        assert!(matches!(validate_proposal(bad, &[]), Err(OracleError::Malformed(_))));
    }
}
