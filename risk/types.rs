//! # Feature Schema
//!
//! The classifier was fitted on a fixed set of seven columns in a fixed order.
//! Everything that touches a feature row goes through `FeatureName` so that the
//! order is written down exactly once, in `FeatureName::CANONICAL_ORDER`.

use ndarray::Array1;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Probability at or above which a patient is reported as high risk.
/// Chosen during offline model selection; not configurable at runtime.
pub const RISK_THRESHOLD: f64 = 0.4963;

/// Additive guard in every ratio denominator.
pub const RATIO_EPSILON: f64 = 1e-10;

/// Width of the classifier input row.
pub const NUM_FEATURES: usize = 7;

/// One column of the classifier input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureName {
    PreopCrp,
    Mlr,
    Nlr,
    Diameter,
    Weight,
    PreopPlt,
    Nmlr,
}

impl FeatureName {
    /// The column order the classifier was fitted on. Do not reorder.
    pub const CANONICAL_ORDER: [FeatureName; NUM_FEATURES] = [
        FeatureName::PreopCrp,
        FeatureName::Mlr,
        FeatureName::Nlr,
        FeatureName::Diameter,
        FeatureName::Weight,
        FeatureName::PreopPlt,
        FeatureName::Nmlr,
    ];

    /// Position of this feature in the classifier row.
    pub fn index(self) -> usize {
        match self {
            FeatureName::PreopCrp => 0,
            FeatureName::Mlr => 1,
            FeatureName::Nlr => 2,
            FeatureName::Diameter => 3,
            FeatureName::Weight => 4,
            FeatureName::PreopPlt => 5,
            FeatureName::Nmlr => 6,
        }
    }

    /// Column name used in model artifacts and batch files.
    pub fn column(self) -> &'static str {
        match self {
            FeatureName::PreopCrp => "preop_crp",
            FeatureName::Mlr => "MLR",
            FeatureName::Nlr => "NLR",
            FeatureName::Diameter => "diameter",
            FeatureName::Weight => "weight",
            FeatureName::PreopPlt => "preop_plt",
            FeatureName::Nmlr => "NMLR",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FeatureName::PreopCrp => "Preoperative CRP",
            FeatureName::Mlr => "MLR (Monocyte-to-Lymphocyte Ratio)",
            FeatureName::Nlr => "NLR (Neutrophil-to-Lymphocyte Ratio)",
            FeatureName::Diameter => "Appendiceal Diameter",
            FeatureName::Weight => "Body Weight",
            FeatureName::PreopPlt => "Preoperative Platelet Count",
            FeatureName::Nmlr => "NMLR (Neutrophil/(Monocyte+Lymphocyte) Ratio)",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            FeatureName::PreopCrp => "mg/L",
            FeatureName::Diameter => "mm",
            FeatureName::Weight => "kg",
            FeatureName::PreopPlt => "×10⁹/L",
            FeatureName::Mlr | FeatureName::Nlr | FeatureName::Nmlr => "Ratio (auto-calculated)",
        }
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown feature column '{0}'")]
pub struct UnknownFeature(pub String);

impl FromStr for FeatureName {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureName::CANONICAL_ORDER
            .into_iter()
            .find(|name| name.column() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

/// The values collected for one patient. `None` means the value was not supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawObservation {
    /// Preoperative neutrophil count (×10⁹/L).
    pub neutrophils: Option<f64>,
    /// Preoperative lymphocyte count (×10⁹/L).
    pub lymphocytes: Option<f64>,
    /// Preoperative monocyte count (×10⁹/L).
    pub monocytes: Option<f64>,
    /// White blood cell count (×10⁹/L). Collected with the panel, unused by the classifier.
    pub wbc: Option<f64>,
    /// Preoperative C-reactive protein (mg/L).
    pub preop_crp: Option<f64>,
    /// Appendiceal diameter (mm).
    pub diameter: Option<f64>,
    /// Body weight (kg).
    pub weight: Option<f64>,
    /// Preoperative platelet count (×10⁹/L).
    pub preop_plt: Option<f64>,
}

/// Hematologic ratios. A ratio is `None` when one of its operands was not supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedFeatures {
    pub nlr: Option<f64>,
    pub mlr: Option<f64>,
    pub nmlr: Option<f64>,
}

/// The seven classifier inputs, stored in canonical order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureVector {
    slots: [Option<f64>; NUM_FEATURES],
}

impl FeatureVector {
    /// Merges directly-entered measurements with the derived ratios.
    pub fn assemble(raw: &RawObservation, derived: &DerivedFeatures) -> Self {
        let mut vector = FeatureVector::default();
        vector.set(FeatureName::PreopCrp, raw.preop_crp);
        vector.set(FeatureName::Mlr, derived.mlr);
        vector.set(FeatureName::Nlr, derived.nlr);
        vector.set(FeatureName::Diameter, raw.diameter);
        vector.set(FeatureName::Weight, raw.weight);
        vector.set(FeatureName::PreopPlt, raw.preop_plt);
        vector.set(FeatureName::Nmlr, derived.nmlr);
        vector
    }

    pub fn set(&mut self, name: FeatureName, value: Option<f64>) {
        self.slots[name.index()] = value;
    }

    pub fn get(&self, name: FeatureName) -> Option<f64> {
        self.slots[name.index()]
    }

    /// Names of every slot that is absent or NaN, in canonical order.
    pub fn missing(&self) -> Vec<FeatureName> {
        FeatureName::CANONICAL_ORDER
            .into_iter()
            .filter(|&name| self.get(name).is_none_or(f64::is_nan))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Iterates `(name, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureName, Option<f64>)> + '_ {
        FeatureName::CANONICAL_ORDER
            .into_iter()
            .map(|name| (name, self.get(name)))
    }

    /// The classifier row, or `None` while any slot is missing.
    pub fn to_array(&self) -> Option<Array1<f64>> {
        if !self.is_complete() {
            return None;
        }
        let values: Vec<f64> = self.slots.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        Some(Array1::from_vec(values))
    }
}
