#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod batch;
pub mod derive;
pub mod locate;
pub mod model;
pub mod report;
pub mod score;
pub mod types;

pub use derive::derive;
pub use score::{PredictionResult, RiskLabel, RiskScorer, ScoreError};
pub use types::{DerivedFeatures, FeatureName, FeatureVector, RawObservation};
