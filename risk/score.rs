//! # Risk Scoring
//!
//! Validates a feature vector, hands the canonical row to the classifier and
//! applies the fixed decision threshold. The classifier is owned by the scorer
//! and never mutated, so one scorer serves every request in the process.

use crate::derive::derive;
use crate::model::{Classifier, ModelError};
use crate::types::{FeatureName, FeatureVector, RISK_THRESHOLD, RawObservation};
use std::fmt;
use thiserror::Error;

/// Binary risk category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RiskLabel {
    High,
    Low,
}

impl RiskLabel {
    /// `High` when `probability >= RISK_THRESHOLD`. Equality counts as high risk.
    pub fn from_probability(probability: f64) -> Self {
        if probability >= RISK_THRESHOLD {
            RiskLabel::High
        } else {
            RiskLabel::Low
        }
    }

    /// Title-case form for reports.
    pub fn title(self) -> &'static str {
        match self {
            RiskLabel::High => "High Risk",
            RiskLabel::Low => "Low Risk",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLabel::High => f.write_str("high-risk"),
            RiskLabel::Low => f.write_str("low-risk"),
        }
    }
}

/// Outcome of one scoring request. `probability` is returned at full precision.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub probability: f64,
    pub label: RiskLabel,
    pub threshold: f64,
    /// The inputs that were scored, for display.
    pub features: FeatureVector,
    /// False when the classifier had no probability output and the hard label was used.
    pub calibrated: bool,
}

#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("Missing or invalid features: {}", format_names(missing))]
    MissingFeatures { missing: Vec<FeatureName> },
    #[error("Error during prediction: {source}")]
    Scoring {
        #[source]
        source: ModelError,
    },
}

fn format_names(names: &[FeatureName]) -> String {
    names
        .iter()
        .map(|n| n.column())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<ModelError> for ScoreError {
    fn from(source: ModelError) -> Self {
        ScoreError::Scoring { source }
    }
}

pub struct RiskScorer<C: Classifier> {
    classifier: C,
}

impl<C: Classifier> RiskScorer<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Names of the required features that are absent or NaN, in canonical order.
    pub fn validate(&self, features: &FeatureVector) -> Vec<FeatureName> {
        features.missing()
    }

    /// Scores a complete feature vector.
    ///
    /// The classifier is not consulted when any feature is missing.
    pub fn score(&self, features: &FeatureVector) -> Result<PredictionResult, ScoreError> {
        let missing = self.validate(features);
        if !missing.is_empty() {
            log::warn!("Refusing to score: missing {}", format_names(&missing));
            return Err(ScoreError::MissingFeatures { missing });
        }

        let row = features
            .to_array()
            .ok_or_else(|| ScoreError::MissingFeatures {
                missing: features.missing(),
            })?;

        let (probability, calibrated) = if self.classifier.supports_probability() {
            (self.classifier.predict_proba(row.view())?, true)
        } else {
            log::debug!("Classifier has no probability output; using hard label");
            (f64::from(self.classifier.predict_label(row.view())?), false)
        };

        if !(0.0..=1.0).contains(&probability) {
            return Err(ModelError::InvalidProbability(probability).into());
        }

        let label = RiskLabel::from_probability(probability);
        log::info!("Predicted probability {probability:.4} ({label})");

        Ok(PredictionResult {
            probability,
            label,
            threshold: RISK_THRESHOLD,
            features: *features,
            calibrated,
        })
    }

    /// Derives the ratios, assembles the vector and scores it.
    pub fn predict(&self, raw: &RawObservation) -> Result<PredictionResult, ScoreError> {
        let derived = derive(raw);
        let features = FeatureVector::assemble(raw, &derived);
        self.score(&features)
    }
}
