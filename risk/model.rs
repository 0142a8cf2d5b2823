// These structs define the public, human-readable format of a fitted classifier
// when serialized to a TOML file, and the `Classifier` seam the scorer calls through.
use crate::types::{FeatureName, NUM_FEATURES, RISK_THRESHOLD, UnknownFeature};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Child index marking a leaf in `DecisionTree`.
pub const TREE_LEAF: i64 = -1;

/// Custom error type for model loading, saving, and prediction.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Input row has {found} columns, but the model was fitted on {expected}.")]
    ShapeMismatch { found: usize, expected: usize },
    #[error("This model does not provide class probabilities.")]
    ProbabilityUnavailable,
    #[error("Model produced an invalid probability: {0}")]
    InvalidProbability(f64),
    #[error("Model artifact names an unknown feature: {0}")]
    UnknownFeature(#[from] UnknownFeature),
    #[error(
        "Model feature columns {found:?} do not match the required order {expected:?}. The classifier is order-sensitive."
    )]
    FeatureOrderMismatch {
        found: Vec<String>,
        expected: Vec<String>,
    },
    #[error("Boosted ensemble contains no trees.")]
    EmptyEnsemble,
    #[error("Ensemble has {trees} trees but {weights} estimator weights.")]
    WeightCountMismatch { trees: usize, weights: usize },
    #[error("Estimator weights must sum to a positive, finite value (got {0}).")]
    InvalidWeightSum(f64),
    #[error("Tree {tree} is malformed: {reason}")]
    InvalidTree { tree: usize, reason: String },
    #[error("Linear model has {found} coefficients, but {expected} features are required.")]
    CoefficientCount { found: usize, expected: usize },
}

/// The seam between the scorer and whatever produces predictions.
///
/// Implementations receive a row in `FeatureName::CANONICAL_ORDER`. A classifier
/// that cannot produce probabilities keeps the default `predict_proba`, and the
/// scorer falls back to `predict_label`.
pub trait Classifier: Send + Sync {
    /// Hard class decision, 0 or 1.
    fn predict_label(&self, row: ArrayView1<f64>) -> Result<u8, ModelError>;

    fn supports_probability(&self) -> bool {
        false
    }

    /// Probability of the positive class.
    fn predict_proba(&self, row: ArrayView1<f64>) -> Result<f64, ModelError> {
        log::debug!(
            "Probability requested for a {}-column row from a label-only classifier",
            row.len()
        );
        Err(ModelError::ProbabilityUnavailable)
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn predict_label(&self, row: ArrayView1<f64>) -> Result<u8, ModelError> {
        (**self).predict_label(row)
    }

    fn supports_probability(&self) -> bool {
        (**self).supports_probability()
    }

    fn predict_proba(&self, row: ArrayView1<f64>) -> Result<f64, ModelError> {
        (**self).predict_proba(row)
    }
}

// --- Public Data Structures ---

/// Provenance and validation figures recorded alongside the fitted model.
/// Informational only; scoring never reads them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auc: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specificity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Threshold reported at model selection time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// A fitted binary decision tree stored as parallel node arrays.
///
/// Node 0 is the root. For an internal node `i`, rows with
/// `row[feature[i]] <= threshold[i]` go to `children_left[i]`, others to
/// `children_right[i]`. Leaves have both children set to `TREE_LEAF` and carry
/// their predicted class in `value[i]`. Children always have a larger index than
/// their parent, which is how fitted trees are laid out and what guarantees
/// traversal terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<u8>,
}

impl DecisionTree {
    /// A depth-one tree splitting on a single feature.
    pub fn stump(feature: FeatureName, threshold: f64, left: u8, right: u8) -> Self {
        Self {
            children_left: vec![1, TREE_LEAF, TREE_LEAF],
            children_right: vec![2, TREE_LEAF, TREE_LEAF],
            feature: vec![feature.index() as i64, -2, -2],
            threshold: vec![threshold, -2.0, -2.0],
            value: vec![0, left, right],
        }
    }

    fn validate(&self, tree: usize) -> Result<(), ModelError> {
        let invalid = |reason: String| ModelError::InvalidTree { tree, reason };
        let n = self.children_left.len();
        if n == 0 {
            return Err(invalid("tree has no nodes".to_string()));
        }
        if self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
            || self.value.len() != n
        {
            return Err(invalid("node arrays have different lengths".to_string()));
        }

        for node in 0..n {
            let left = self.children_left[node];
            let right = self.children_right[node];
            if left == TREE_LEAF && right == TREE_LEAF {
                if self.value[node] > 1 {
                    return Err(invalid(format!(
                        "leaf {node} predicts class {}, expected 0 or 1",
                        self.value[node]
                    )));
                }
                continue;
            }
            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return Err(invalid(format!(
                        "node {node} points to child {child} outside ({node}, {n})"
                    )));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature >= NUM_FEATURES as i64 {
                return Err(invalid(format!(
                    "node {node} splits on feature {feature}, expected 0..{NUM_FEATURES}"
                )));
            }
            if self.threshold[node].is_nan() {
                return Err(invalid(format!("node {node} has a NaN threshold")));
            }
        }
        Ok(())
    }

    /// Walks from the root to a leaf. Assumes `validate` has passed.
    fn predict(&self, row: ArrayView1<f64>) -> u8 {
        let mut node = 0usize;
        loop {
            let left = self.children_left[node];
            if left == TREE_LEAF {
                return self.value[node];
            }
            let feature = self.feature[node] as usize;
            node = if row[feature] <= self.threshold[node] {
                left as usize
            } else {
                self.children_right[node] as usize
            };
        }
    }
}

/// The fitted estimator itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    /// Discrete (SAMME) boosting over binary trees.
    AdaBoost {
        estimators: Vec<DecisionTree>,
        estimator_weights: Vec<f64>,
    },
    /// Logistic regression on the raw, unscaled features.
    Logistic {
        intercept: f64,
        coefficients: Vec<f64>,
    },
    /// A linear decision rule with no probability output.
    LinearMargin {
        intercept: f64,
        coefficients: Vec<f64>,
    },
}

impl Estimator {
    fn validate(&self) -> Result<(), ModelError> {
        match self {
            Estimator::AdaBoost {
                estimators,
                estimator_weights,
            } => {
                if estimators.is_empty() {
                    return Err(ModelError::EmptyEnsemble);
                }
                if estimators.len() != estimator_weights.len() {
                    return Err(ModelError::WeightCountMismatch {
                        trees: estimators.len(),
                        weights: estimator_weights.len(),
                    });
                }
                let total: f64 = estimator_weights.iter().sum();
                if !(total.is_finite() && total > 0.0) {
                    return Err(ModelError::InvalidWeightSum(total));
                }
                for (index, tree) in estimators.iter().enumerate() {
                    tree.validate(index)?;
                }
                Ok(())
            }
            Estimator::Logistic { coefficients, .. }
            | Estimator::LinearMargin { coefficients, .. } => {
                if coefficients.len() != NUM_FEATURES {
                    return Err(ModelError::CoefficientCount {
                        found: coefficients.len(),
                        expected: NUM_FEATURES,
                    });
                }
                Ok(())
            }
        }
    }

    /// Signed ensemble vote in [-1, 1] for SAMME, linear predictor otherwise.
    fn decision_function(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            Estimator::AdaBoost {
                estimators,
                estimator_weights,
            } => {
                let total: f64 = estimator_weights.iter().sum();
                let vote: f64 = estimators
                    .iter()
                    .zip(estimator_weights)
                    .map(|(tree, &weight)| {
                        if tree.predict(row) == 1 {
                            weight
                        } else {
                            -weight
                        }
                    })
                    .sum();
                vote / total
            }
            Estimator::Logistic {
                intercept,
                coefficients,
            }
            | Estimator::LinearMargin {
                intercept,
                coefficients,
            } => {
                intercept
                    + coefficients
                        .iter()
                        .zip(row.iter())
                        .map(|(w, x)| w * x)
                        .sum::<f64>()
            }
        }
    }
}

/// The top-level, self-contained, fitted model artifact.
/// This is the structure that gets saved to and loaded from a file.
///
/// Fields are private: the only ways to obtain one are `new` and `load`, and both
/// run `validate`, so prediction never walks an unchecked estimator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainedClassifier {
    /// Column order the estimator was fitted on. Must equal the canonical order.
    feature_names: Vec<String>,
    metadata: ModelMetadata,
    estimator: Estimator,
}

/// On-disk shape of `TrainedClassifier`, before validation.
#[derive(Deserialize)]
struct ClassifierArtifact {
    feature_names: Vec<String>,
    metadata: ModelMetadata,
    estimator: Estimator,
}

impl TrainedClassifier {
    /// Wraps a fitted estimator, rejecting it if it could not be scored safely.
    pub fn new(metadata: ModelMetadata, estimator: Estimator) -> Result<Self, ModelError> {
        let model = Self {
            feature_names: FeatureName::CANONICAL_ORDER
                .iter()
                .map(|n| n.column().to_string())
                .collect(),
            metadata,
            estimator,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Structural checks that make prediction infallible apart from input shape.
    fn validate(&self) -> Result<(), ModelError> {
        let parsed = self
            .feature_names
            .iter()
            .map(|name| name.parse::<FeatureName>())
            .collect::<Result<Vec<_>, _>>()?;
        if parsed != FeatureName::CANONICAL_ORDER {
            return Err(ModelError::FeatureOrderMismatch {
                found: self.feature_names.clone(),
                expected: FeatureName::CANONICAL_ORDER
                    .iter()
                    .map(|n| n.column().to_string())
                    .collect(),
            });
        }
        self.estimator.validate()
    }

    /// Saves the model to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads and validates a model from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let artifact: ClassifierArtifact = toml::from_str(&toml_string)?;
        let model = Self {
            feature_names: artifact.feature_names,
            metadata: artifact.metadata,
            estimator: artifact.estimator,
        };
        model.validate()?;

        if let Some(recorded) = model.metadata.threshold {
            if (recorded - RISK_THRESHOLD).abs() > f64::EPSILON {
                log::warn!(
                    "Model artifact records threshold {recorded}, but scoring uses the fixed threshold {RISK_THRESHOLD}"
                );
            }
        }
        Ok(model)
    }

    fn check_shape(row: ArrayView1<f64>) -> Result<(), ModelError> {
        if row.len() != NUM_FEATURES {
            return Err(ModelError::ShapeMismatch {
                found: row.len(),
                expected: NUM_FEATURES,
            });
        }
        Ok(())
    }
}

impl Classifier for TrainedClassifier {
    fn predict_label(&self, row: ArrayView1<f64>) -> Result<u8, ModelError> {
        Self::check_shape(row)?;
        Ok(u8::from(self.estimator.decision_function(row) > 0.0))
    }

    fn supports_probability(&self) -> bool {
        !matches!(self.estimator, Estimator::LinearMargin { .. })
    }

    fn predict_proba(&self, row: ArrayView1<f64>) -> Result<f64, ModelError> {
        Self::check_shape(row)?;
        match self.estimator {
            Estimator::AdaBoost { .. } => Ok(sigmoid(self.estimator.decision_function(row))),
            Estimator::Logistic { .. } => {
                // Clamp eta to prevent numerical overflow in exp()
                let eta = self.estimator.decision_function(row).clamp(-700.0, 700.0);
                Ok(sigmoid(eta))
            }
            Estimator::LinearMargin { .. } => Err(ModelError::ProbabilityUnavailable),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + f64::exp(-x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use tempfile::tempdir;

    fn reference_row() -> ndarray::Array1<f64> {
        array![50.0, 0.25, 3.5, 10.0, 70.0, 250.0, 2.8]
    }

    fn boosted() -> TrainedClassifier {
        TrainedClassifier::new(
            ModelMetadata {
                algorithm: "AdaBoost".to_string(),
                auc: Some(0.828),
                threshold: Some(RISK_THRESHOLD),
                ..ModelMetadata::default()
            },
            Estimator::AdaBoost {
                estimators: vec![
                    DecisionTree::stump(FeatureName::PreopCrp, 30.0, 0, 1),
                    DecisionTree::stump(FeatureName::Diameter, 12.0, 0, 1),
                    DecisionTree::stump(FeatureName::Nlr, 5.0, 0, 1),
                ],
                estimator_weights: vec![2.0, 1.0, 1.0],
            },
        )
        .unwrap()
    }

    #[test]
    fn samme_probability_is_sigmoid_of_normalised_vote() {
        let model = boosted();
        model.validate().unwrap();
        // CRP 50 > 30 votes positive (+2), diameter 10 <= 12 negative (-1),
        // NLR 3.5 <= 5 negative (-1). Vote = 0 / 4.
        let p = model.predict_proba(reference_row().view()).unwrap();
        assert_abs_diff_eq!(p, 0.5, epsilon = 1e-12);
        assert_eq!(model.predict_label(reference_row().view()).unwrap(), 0);

        let mut row = reference_row();
        row[3] = 14.0;
        let p = model.predict_proba(row.view()).unwrap();
        assert_abs_diff_eq!(p, sigmoid(0.5), epsilon = 1e-12);
        assert_eq!(model.predict_label(row.view()).unwrap(), 1);
    }

    #[test]
    fn split_sends_equal_values_left() {
        let tree = DecisionTree::stump(FeatureName::Weight, 70.0, 0, 1);
        tree.validate(0).unwrap();
        assert_eq!(tree.predict(reference_row().view()), 0);
        let mut row = reference_row();
        row[4] = 70.5;
        assert_eq!(tree.predict(row.view()), 1);
    }

    #[test]
    fn deeper_trees_are_traversed() {
        // root: CRP <= 30 ? (leaf 0) : (PLT <= 300 ? leaf 1 : leaf 0)
        let tree = DecisionTree {
            children_left: vec![1, TREE_LEAF, 3, TREE_LEAF, TREE_LEAF],
            children_right: vec![2, TREE_LEAF, 4, TREE_LEAF, TREE_LEAF],
            feature: vec![0, -2, 5, -2, -2],
            threshold: vec![30.0, -2.0, 300.0, -2.0, -2.0],
            value: vec![0, 0, 0, 1, 0],
        };
        tree.validate(0).unwrap();
        assert_eq!(tree.predict(reference_row().view()), 1);
        let mut row = reference_row();
        row[5] = 400.0;
        assert_eq!(tree.predict(row.view()), 0);
        row[0] = 10.0;
        assert_eq!(tree.predict(row.view()), 0);
    }

    #[test]
    fn malformed_trees_are_rejected() {
        let mut tree = DecisionTree::stump(FeatureName::Weight, 70.0, 0, 1);
        tree.children_left[0] = 0;
        assert!(matches!(
            tree.validate(3),
            Err(ModelError::InvalidTree { tree: 3, .. })
        ));

        let mut tree = DecisionTree::stump(FeatureName::Weight, 70.0, 0, 1);
        tree.feature[0] = 7;
        assert!(tree.validate(0).is_err());

        let mut tree = DecisionTree::stump(FeatureName::Weight, 70.0, 0, 1);
        tree.value[1] = 2;
        assert!(tree.validate(0).is_err());

        let mut tree = DecisionTree::stump(FeatureName::Weight, 70.0, 0, 1);
        tree.threshold.pop();
        assert!(tree.validate(0).is_err());
    }

    #[test]
    fn ensemble_structure_is_checked() {
        let mut model = boosted();
        if let Estimator::AdaBoost {
            estimator_weights, ..
        } = &mut model.estimator
        {
            estimator_weights.pop();
        }
        assert!(matches!(
            model.validate(),
            Err(ModelError::WeightCountMismatch {
                trees: 3,
                weights: 2
            })
        ));

        let empty = TrainedClassifier::new(
            ModelMetadata::default(),
            Estimator::AdaBoost {
                estimators: vec![],
                estimator_weights: vec![],
            },
        );
        assert!(matches!(empty, Err(ModelError::EmptyEnsemble)));
    }

    #[test]
    fn feature_order_must_be_canonical() {
        let mut model = boosted();
        model.feature_names.swap(1, 2);
        assert!(matches!(
            model.validate(),
            Err(ModelError::FeatureOrderMismatch { .. })
        ));
    }

    #[test]
    fn wrong_row_width_is_a_shape_error() {
        let model = boosted();
        let short = array![1.0, 2.0, 3.0];
        assert!(matches!(
            model.predict_proba(short.view()),
            Err(ModelError::ShapeMismatch {
                found: 3,
                expected: 7
            })
        ));
    }

    #[test]
    fn logistic_probability_and_overflow_clamp() {
        let model = TrainedClassifier::new(
            ModelMetadata {
                algorithm: "LogisticRegression".to_string(),
                ..ModelMetadata::default()
            },
            Estimator::Logistic {
                intercept: -1.0,
                coefficients: vec![0.02, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            },
        )
        .unwrap();
        assert!(model.supports_probability());
        // eta = -1 + 0.02 * 50 = 0
        assert_abs_diff_eq!(
            model.predict_proba(reference_row().view()).unwrap(),
            0.5,
            epsilon = 1e-12
        );

        let mut row = reference_row();
        row[0] = 1e6;
        let p = model.predict_proba(row.view()).unwrap();
        assert!(p.is_finite() && p <= 1.0);
    }

    #[test]
    fn linear_margin_has_no_probability() {
        let model = TrainedClassifier::new(
            ModelMetadata::default(),
            Estimator::LinearMargin {
                intercept: -40.0,
                coefficients: vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            },
        )
        .unwrap();
        assert!(!model.supports_probability());
        assert!(matches!(
            model.predict_proba(reference_row().view()),
            Err(ModelError::ProbabilityUnavailable)
        ));
        assert_eq!(model.predict_label(reference_row().view()).unwrap(), 1);
    }

    #[test]
    fn coefficient_count_is_checked() {
        let model = TrainedClassifier::new(
            ModelMetadata::default(),
            Estimator::Logistic {
                intercept: 0.0,
                coefficients: vec![1.0; 6],
            },
        );
        assert!(matches!(
            model,
            Err(ModelError::CoefficientCount {
                found: 6,
                expected: 7
            })
        ));
    }

    #[test]
    fn short_logistic_coefficients_never_reach_scoring() {
        // Zipping three weights against a seven-column row would silently drop columns.
        let model = TrainedClassifier::new(
            ModelMetadata::default(),
            Estimator::Logistic {
                intercept: -1.0,
                coefficients: vec![0.02, 0.0, 0.0],
            },
        );
        assert!(matches!(
            model,
            Err(ModelError::CoefficientCount {
                found: 3,
                expected: 7
            })
        ));
    }

    #[test]
    fn constructor_rejects_trees_that_would_index_out_of_range() {
        let mut stump = DecisionTree::stump(FeatureName::PreopCrp, 30.0, 0, 1);
        stump.feature[0] = 9;
        let model = TrainedClassifier::new(
            ModelMetadata::default(),
            Estimator::AdaBoost {
                estimators: vec![stump],
                estimator_weights: vec![1.0],
            },
        );
        assert!(matches!(model, Err(ModelError::InvalidTree { tree: 0, .. })));

        let mut cyclic = DecisionTree::stump(FeatureName::PreopCrp, 30.0, 0, 1);
        cyclic.children_right[0] = 0;
        let model = TrainedClassifier::new(
            ModelMetadata::default(),
            Estimator::AdaBoost {
                estimators: vec![DecisionTree::stump(FeatureName::Weight, 70.0, 0, 1), cyclic],
                estimator_weights: vec![1.0, 1.0],
            },
        );
        assert!(matches!(model, Err(ModelError::InvalidTree { tree: 1, .. })));
    }

    #[test]
    fn unknown_feature_column_is_rejected() {
        let mut model = boosted();
        model.feature_names[6] = "nmlr".to_string();
        assert!(matches!(
            model.validate(),
            Err(ModelError::UnknownFeature(UnknownFeature(name))) if name == "nmlr"
        ));
    }

    #[test]
    fn save_then_load_preserves_the_model() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.toml");
        let model = boosted();
        model.save(&path).unwrap();
        let loaded = TrainedClassifier::load(&path).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn load_rejects_invalid_artifacts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.toml");
        fs::write(&path, "this is not toml = [").unwrap();
        assert!(matches!(
            TrainedClassifier::load(&path),
            Err(ModelError::TomlParseError(_))
        ));

        let mut model = boosted();
        model.feature_names.reverse();
        model.save(&path).unwrap();
        assert!(matches!(
            TrainedClassifier::load(&path),
            Err(ModelError::FeatureOrderMismatch { .. })
        ));

        let mut model = boosted();
        if let Estimator::AdaBoost { estimators, .. } = &mut model.estimator {
            estimators[0].feature[0] = 9;
        }
        model.save(&path).unwrap();
        assert!(matches!(
            TrainedClassifier::load(&path),
            Err(ModelError::InvalidTree { tree: 0, .. })
        ));
    }
}
