// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Quality and Risk Scores
//!
//! Both score types keep their dimensions private so every value stays in
//! `[0.0, 1.0]`. `overall` is derived on every read and is only emitted on
//! serialization; a serialized `overall` is ignored when deserializing.
//!
//! | Dimension | Weight |
//! |-----------|--------|
//! | accuracy | 0.30 |
//! | novelty | 0.25 |
//! | utility | 0.25 |
//! | clarity | 0.10 |
//! | validation | 0.10 |

use serde::{Deserialize, Serialize};
use std::fmt;

pub const ACCURACY_WEIGHT: f64 = 0.30;
pub const NOVELTY_WEIGHT: f64 = 0.25;
pub const UTILITY_WEIGHT: f64 = 0.25;
pub const CLARITY_WEIGHT: f64 = 0.10;
pub const VALIDATION_WEIGHT: f64 = 0.10;

/// Clamp a score into `[0.0, 1.0]`. NaN collapses to 0.0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// The five quality dimensions scored by the quality gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Novelty,
    Accuracy,
    Utility,
    Clarity,
    Validation,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 5] = [
        QualityDimension::Novelty,
        QualityDimension::Accuracy,
        QualityDimension::Utility,
        QualityDimension::Clarity,
        QualityDimension::Validation,
    ];

    pub fn weight(&self) -> f64 {
        match self {
            QualityDimension::Novelty => NOVELTY_WEIGHT,
            QualityDimension::Accuracy => ACCURACY_WEIGHT,
            QualityDimension::Utility => UTILITY_WEIGHT,
            QualityDimension::Clarity => CLARITY_WEIGHT,
            QualityDimension::Validation => VALIDATION_WEIGHT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityDimension::Novelty => "novelty",
            QualityDimension::Accuracy => "accuracy",
            QualityDimension::Utility => "utility",
            QualityDimension::Clarity => "clarity",
            QualityDimension::Validation => "validation",
        }
    }
}

impl fmt::Display for QualityDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct QualityScoreWire {
    novelty: f64,
    accuracy: f64,
    utility: f64,
    clarity: f64,
    validation: f64,
    #[serde(default, skip_deserializing)]
    overall: f64,
}

/// Five-dimension quality score of a memory
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "QualityScoreWire", into = "QualityScoreWire")]
pub struct QualityScore {
    novelty: f64,
    accuracy: f64,
    utility: f64,
    clarity: f64,
    validation: f64,
}

impl QualityScore {
    pub fn new(novelty: f64, accuracy: f64, utility: f64, clarity: f64, validation: f64) -> Self {
        Self {
            novelty: clamp_unit(novelty),
            accuracy: clamp_unit(accuracy),
            utility: clamp_unit(utility),
            clarity: clamp_unit(clarity),
            validation: clamp_unit(validation),
        }
    }

    /// Every dimension at the same value
    pub fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value, value)
    }

    pub fn novelty(&self) -> f64 {
        self.novelty
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn utility(&self) -> f64 {
        self.utility
    }

    pub fn clarity(&self) -> f64 {
        self.clarity
    }

    pub fn validation(&self) -> f64 {
        self.validation
    }

    pub fn get(&self, dimension: QualityDimension) -> f64 {
        match dimension {
            QualityDimension::Novelty => self.novelty,
            QualityDimension::Accuracy => self.accuracy,
            QualityDimension::Utility => self.utility,
            QualityDimension::Clarity => self.clarity,
            QualityDimension::Validation => self.validation,
        }
    }

    pub fn set(&mut self, dimension: QualityDimension, value: f64) {
        let value = clamp_unit(value);
        match dimension {
            QualityDimension::Novelty => self.novelty = value,
            QualityDimension::Accuracy => self.accuracy = value,
            QualityDimension::Utility => self.utility = value,
            QualityDimension::Clarity => self.clarity = value,
            QualityDimension::Validation => self.validation = value,
        }
    }

    /// Weighted sum of the five dimensions
    pub fn overall(&self) -> f64 {
        let sum = QualityDimension::ALL
            .iter()
            .map(|d| d.weight() * self.get(*d))
            .sum::<f64>();
        clamp_unit(sum)
    }
}

impl From<QualityScoreWire> for QualityScore {
    fn from(wire: QualityScoreWire) -> Self {
        QualityScore::new(wire.novelty, wire.accuracy, wire.utility, wire.clarity, wire.validation)
    }
}

impl From<QualityScore> for QualityScoreWire {
    fn from(score: QualityScore) -> Self {
        QualityScoreWire {
            novelty: score.novelty,
            accuracy: score.accuracy,
            utility: score.utility,
            clarity: score.clarity,
            validation: score.validation,
            overall: score.overall(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RiskAssessmentWire {
    contradiction: f64,
    obsolescence: f64,
    security: f64,
    quality: f64,
    #[serde(default, skip_deserializing)]
    overall: f64,
}

/// Four-dimension risk of admitting a candidate memory
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RiskAssessmentWire", into = "RiskAssessmentWire")]
pub struct RiskAssessment {
    contradiction: f64,
    obsolescence: f64,
    security: f64,
    quality: f64,
}

impl RiskAssessment {
    pub fn new(contradiction: f64, obsolescence: f64, security: f64, quality: f64) -> Self {
        Self {
            contradiction: clamp_unit(contradiction),
            obsolescence: clamp_unit(obsolescence),
            security: clamp_unit(security),
            quality: clamp_unit(quality),
        }
    }

    pub fn contradiction(&self) -> f64 {
        self.contradiction
    }

    pub fn obsolescence(&self) -> f64 {
        self.obsolescence
    }

    pub fn security(&self) -> f64 {
        self.security
    }

    pub fn quality(&self) -> f64 {
        self.quality
    }

    pub fn with_security(mut self, security: f64) -> Self {
        self.security = clamp_unit(security);
        self
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = clamp_unit(quality);
        self
    }

    /// Arithmetic mean of the four dimensions
    pub fn overall(&self) -> f64 {
        clamp_unit((self.contradiction + self.obsolescence + self.security + self.quality) / 4.0)
    }
}

impl From<RiskAssessmentWire> for RiskAssessment {
    fn from(wire: RiskAssessmentWire) -> Self {
        RiskAssessment::new(wire.contradiction, wire.obsolescence, wire.security, wire.quality)
    }
}

impl From<RiskAssessment> for RiskAssessmentWire {
    fn from(risk: RiskAssessment) -> Self {
        RiskAssessmentWire {
            contradiction: risk.contradiction,
            obsolescence: risk.obsolescence,
            security: risk.security,
            quality: risk.quality,
            overall: risk.overall(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_overall_is_weighted_sum() {
        let score = QualityScore::new(0.2, 0.4, 0.6, 0.8, 1.0);
        let expected = 0.25 * 0.2 + 0.30 * 0.4 + 0.25 * 0.6 + 0.10 * 0.8 + 0.10 * 1.0;
        assert!(approx(score.overall(), expected));
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = QualityDimension::ALL.iter().map(|d| d.weight()).sum();
        assert!(approx(total, 1.0));
        assert!(approx(QualityScore::uniform(1.0).overall(), 1.0));
    }

    #[test]
    fn test_scores_are_clamped() {
        let score = QualityScore::new(-0.5, 1.7, f64::NAN, 0.5, 2.0);
        for dimension in QualityDimension::ALL {
            let value = score.get(dimension);
            assert!((0.0..=1.0).contains(&value), "{dimension} out of bounds: {value}");
        }
        assert_eq!(score.accuracy(), 1.0);
        assert_eq!(score.utility(), 0.0);

        let mut score = QualityScore::default();
        score.set(QualityDimension::Clarity, 3.0);
        assert_eq!(score.clarity(), 1.0);
    }

    #[test]
    fn test_serialized_overall_is_recomputed() {
        let json = r#"{"novelty":1.0,"accuracy":1.0,"utility":1.0,"clarity":1.0,"validation":1.0,"overall":0.1}"#;
        let score: QualityScore = serde_json::from_str(json).unwrap();
        assert!(approx(score.overall(), 1.0));

        let value = serde_json::to_value(score).unwrap();
        assert!(approx(value["overall"].as_f64().unwrap(), 1.0));
    }

    #[test]
    fn test_risk_overall_is_mean() {
        let risk = RiskAssessment::new(0.2, 0.4, 0.6, 0.8);
        assert!(approx(risk.overall(), 0.5));

        let risk = risk.with_security(1.5).with_quality(-1.0);
        assert_eq!(risk.security(), 1.0);
        assert_eq!(risk.quality(), 0.0);
        assert!(approx(risk.overall(), (0.2 + 0.4 + 1.0 + 0.0) / 4.0));
    }
}
