//! # Model Location and Loading
//!
//! Resolves where the classifier artifact lives and loads it once. The scorer
//! never sees paths; it is handed a ready `TrainedClassifier`.

use crate::model::{ModelError, TrainedClassifier};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable consulted by the CLI when `--model` is not given.
pub const MODEL_ENV_VAR: &str = "APPRISK_MODEL";

/// Relative locations tried, in order, when no explicit path is configured.
pub const DEFAULT_MODEL_CANDIDATES: [&str; 4] = [
    "final_model.toml",
    "results/final_model.toml",
    "../results/final_model.toml",
    "model_adaboost.toml",
];

/// Where to look for the classifier artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A single configured path. No fallback.
    Explicit(PathBuf),
    /// Candidates tried in order; the first that loads wins.
    Search(Vec<PathBuf>),
}

impl ModelSource {
    /// `explicit` wins, then the environment variable, then the default candidates
    /// resolved against `base_dir`.
    pub fn resolve(explicit: Option<PathBuf>, env_value: Option<String>, base_dir: &Path) -> Self {
        if let Some(path) = explicit {
            return ModelSource::Explicit(path);
        }
        if let Some(value) = env_value.filter(|v| !v.trim().is_empty()) {
            return ModelSource::Explicit(PathBuf::from(value));
        }
        ModelSource::Search(
            DEFAULT_MODEL_CANDIDATES
                .iter()
                .map(|candidate| base_dir.join(candidate))
                .collect(),
        )
    }

    fn candidates(&self) -> &[PathBuf] {
        match self {
            ModelSource::Explicit(path) => std::slice::from_ref(path),
            ModelSource::Search(paths) => paths,
        }
    }
}

/// Display helper listing the paths that were tried.
#[derive(Debug)]
pub struct TriedPaths(pub Vec<PathBuf>);

impl fmt::Display for TriedPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Model file not found. Looked in: {tried}")]
    ModelNotFound { tried: TriedPaths },
    #[error("Failed to load model from '{}': {source}", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
}

/// A classifier together with the file it came from.
#[derive(Debug)]
pub struct LoadedClassifier {
    pub path: PathBuf,
    pub classifier: TrainedClassifier,
}

/// Loads the first candidate that exists and parses.
///
/// Candidates that exist but fail to load are skipped with a warning; if none
/// succeeds, the last load failure is returned. If none exists at all, the
/// error lists every path tried.
pub fn load_classifier(source: &ModelSource) -> Result<LoadedClassifier, LoaderError> {
    let mut last_failure: Option<LoaderError> = None;

    for path in source.candidates() {
        if !path.is_file() {
            log::debug!("No model at {}", path.display());
            continue;
        }
        match TrainedClassifier::load(path) {
            Ok(classifier) => {
                log::info!(
                    "Loaded {} classifier from {}",
                    classifier.metadata().algorithm,
                    path.display()
                );
                return Ok(LoadedClassifier {
                    path: path.clone(),
                    classifier,
                });
            }
            Err(source) => {
                log::warn!("Skipping model candidate {}: {source}", path.display());
                last_failure = Some(LoaderError::ModelLoad {
                    path: path.clone(),
                    source,
                });
            }
        }
    }

    Err(last_failure.unwrap_or_else(|| LoaderError::ModelNotFound {
        tried: TriedPaths(source.candidates().to_vec()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DecisionTree, Estimator, ModelMetadata};
    use crate::types::FeatureName;
    use std::fs;
    use tempfile::tempdir;

    fn write_model(path: &Path) {
        let model = TrainedClassifier::new(
            ModelMetadata {
                algorithm: "AdaBoost".to_string(),
                ..ModelMetadata::default()
            },
            Estimator::AdaBoost {
                estimators: vec![DecisionTree::stump(FeatureName::PreopCrp, 30.0, 0, 1)],
                estimator_weights: vec![1.0],
            },
        )
        .unwrap();
        model.save(path).unwrap();
    }

    #[test]
    fn explicit_path_wins_over_environment() {
        let base = Path::new("/srv/app");
        let source = ModelSource::resolve(
            Some(PathBuf::from("custom.toml")),
            Some("env.toml".to_string()),
            base,
        );
        assert_eq!(source, ModelSource::Explicit(PathBuf::from("custom.toml")));

        let source = ModelSource::resolve(None, Some("env.toml".to_string()), base);
        assert_eq!(source, ModelSource::Explicit(PathBuf::from("env.toml")));

        let source = ModelSource::resolve(None, Some("  ".to_string()), base);
        match source {
            ModelSource::Search(paths) => {
                assert_eq!(paths.len(), DEFAULT_MODEL_CANDIDATES.len());
                assert_eq!(paths[0], base.join("final_model.toml"));
            }
            other => panic!("Expected search list, got {other:?}"),
        }
    }

    #[test]
    fn search_falls_through_to_later_candidates() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("results")).unwrap();
        write_model(&dir.path().join("results/final_model.toml"));

        let source = ModelSource::resolve(None, None, dir.path());
        let loaded = load_classifier(&source).unwrap();
        assert_eq!(loaded.path, dir.path().join("results/final_model.toml"));
        assert_eq!(loaded.classifier.metadata().algorithm, "AdaBoost");
    }

    #[test]
    fn unreadable_candidate_is_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("final_model.toml"), "garbage = [").unwrap();
        write_model(&dir.path().join("model_adaboost.toml"));

        let source = ModelSource::resolve(None, None, dir.path());
        let loaded = load_classifier(&source).unwrap();
        assert_eq!(loaded.path, dir.path().join("model_adaboost.toml"));
    }

    #[test]
    fn nothing_found_lists_every_candidate() {
        let dir = tempdir().unwrap();
        let source = ModelSource::resolve(None, None, dir.path());
        match load_classifier(&source) {
            Err(LoaderError::ModelNotFound { tried }) => {
                assert_eq!(tried.0.len(), DEFAULT_MODEL_CANDIDATES.len());
                assert!(tried.to_string().contains("final_model.toml"));
            }
            other => panic!("Expected ModelNotFound, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_explicit_model_is_a_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "metadata = 3").unwrap();
        match load_classifier(&ModelSource::Explicit(path.clone())) {
            Err(LoaderError::ModelLoad { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("Expected ModelLoad, got {other:?}"),
        }
    }
}
