//! # Feature Derivation
//!
//! Converts raw differential counts into the three hematologic ratios the
//! classifier consumes. Denominators carry `RATIO_EPSILON` so a zero count
//! yields a very large ratio instead of a division error. A ratio whose
//! operands were not all supplied is left as `None`; scoring rejects it later.

use crate::types::{DerivedFeatures, RATIO_EPSILON, RawObservation};

/// Computes NLR, MLR and NMLR for one observation.
pub fn derive(raw: &RawObservation) -> DerivedFeatures {
    let nlr = match (raw.neutrophils, raw.lymphocytes) {
        (Some(neut), Some(lymph)) => Some(neut / (lymph + RATIO_EPSILON)),
        _ => None,
    };

    let mlr = match (raw.monocytes, raw.lymphocytes) {
        (Some(mono), Some(lymph)) => Some(mono / (lymph + RATIO_EPSILON)),
        _ => None,
    };

    let nmlr = match (raw.neutrophils, raw.monocytes, raw.lymphocytes) {
        (Some(neut), Some(mono), Some(lymph)) => Some(neut / (mono + lymph + RATIO_EPSILON)),
        _ => None,
    };

    log::debug!("Derived ratios: NLR={nlr:?}, MLR={mlr:?}, NMLR={nmlr:?}");

    DerivedFeatures { nlr, mlr, nmlr }
}
