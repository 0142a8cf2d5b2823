//! Plain-text rendering of predictions and model information for the terminal.

use crate::model::ModelMetadata;
use crate::score::{PredictionResult, RiskLabel};
use crate::types::{DerivedFeatures, RISK_THRESHOLD};

/// Shown when no classifier could be loaded.
pub const MODEL_UNAVAILABLE: &str = "Prediction unavailable: no classifier model could be loaded. \
Pass --model <PATH> or set APPRISK_MODEL to a model file.";

const DISCLAIMER: &str = "Prediction results are for reference only; clinical judgment is required.";

fn fmt_ratio(value: Option<f64>) -> String {
    value.map_or_else(|| "missing".to_string(), |v| format!("{v:.3}"))
}

fn fmt_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

pub fn render_derived(derived: &DerivedFeatures) -> String {
    let mut out = String::new();
    out.push_str("Derived indicators\n");
    out.push_str(&format!("  NLR:  {}\n", fmt_ratio(derived.nlr)));
    out.push_str(&format!("  MLR:  {}\n", fmt_ratio(derived.mlr)));
    out.push_str(&format!("  NMLR: {}\n", fmt_ratio(derived.nmlr)));
    out
}

pub fn render_prediction(result: &PredictionResult) -> String {
    let mut out = String::new();
    out.push_str("Prediction results\n");
    out.push_str(&format!("  Predicted probability:    {}\n", fmt_percent(result.probability)));
    out.push_str(&format!("  Risk level:               {}\n", result.label.title()));
    out.push_str(&format!("  Classification threshold: {}\n", fmt_percent(result.threshold)));
    if !result.calibrated {
        out.push_str("  Note: model has no probability output; shown value is the class decision.\n");
    }
    out.push('\n');
    out.push_str(&format!("  {}\n", interpretation(result.label)));
    out.push('\n');
    out.push_str("Features used by the model\n");
    for (name, value) in result.features.iter() {
        let shown = value.map_or_else(|| "missing".to_string(), |v| format!("{v}"));
        out.push_str(&format!("  {:<46} {shown:>10}  {}\n", name.label(), name.unit()));
    }
    out.push('\n');
    out.push_str(&format!("{DISCLAIMER}\n"));
    out
}

fn interpretation(label: RiskLabel) -> &'static str {
    match label {
        RiskLabel::High => {
            "Elevated risk of complicated appendicitis. Close monitoring and timely surgical evaluation are recommended."
        }
        RiskLabel::Low => {
            "Low risk of complicated appendicitis. Standard management with continued observation is recommended."
        }
    }
}

pub fn render_model_info(metadata: &ModelMetadata, source: &str) -> String {
    let mut out = String::new();
    out.push_str("Model information\n");
    out.push_str(&format!("  Source:            {source}\n"));
    out.push_str(&format!("  Algorithm:         {}\n", metadata.algorithm));
    out.push_str("  Features:          7 (canonical order)\n");
    if let Some(auc) = metadata.auc {
        out.push_str(&format!("  Test AUC:          {auc:.3}\n"));
    }
    if let Some(sensitivity) = metadata.sensitivity {
        out.push_str(&format!("  Sensitivity:       {}\n", fmt_percent(sensitivity)));
    }
    if let Some(specificity) = metadata.specificity {
        out.push_str(&format!("  Specificity:       {}\n", fmt_percent(specificity)));
    }
    if let Some(accuracy) = metadata.accuracy {
        out.push_str(&format!("  Accuracy:          {}\n", fmt_percent(accuracy)));
    }
    out.push_str(&format!("  Optimal threshold: {RISK_THRESHOLD}\n"));
    out
}
