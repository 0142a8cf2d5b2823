//! # Cohort Scoring
//!
//! Reads a tab-separated file of patients, scores each row independently and
//! writes one output row per input row. A row that cannot be scored carries its
//! error message in the `error` column; it never aborts the batch.
//!
//! Input columns are fixed: `preop_neut`, `preop_lymph`, `preop_mono`,
//! `preop_crp`, `diameter`, `weight` and `preop_plt` are required headers.
//! `preop_wbc` and `sample_id` are optional. Empty cells and `NA` mean "not
//! supplied".

use crate::derive::derive;
use crate::model::Classifier;
use crate::score::{PredictionResult, RiskScorer};
use crate::types::{DerivedFeatures, RawObservation};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

const REQUIRED_COLUMNS: [&str; 7] = [
    "preop_neut",
    "preop_lymph",
    "preop_mono",
    "preop_crp",
    "diameter",
    "weight",
    "preop_plt",
];

const OUTPUT_HEADER: [&str; 7] = ["sample_id", "NLR", "MLR", "NMLR", "probability", "risk", "error"];

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Malformed TSV input: {0}")]
    CsvError(#[from] csv::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("Input file contains no data rows.")]
    Empty,
}

/// One parsed input row. `raw` is an error message when a cell was not numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub sample_id: String,
    pub raw: Result<RawObservation, String>,
}

/// The scored form of a `BatchRow`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub sample_id: String,
    pub derived: DerivedFeatures,
    pub result: Result<PredictionResult, String>,
}

pub fn read_observations_from_path(path: &Path) -> Result<Vec<BatchRow>, BatchError> {
    log::info!("Loading patients from '{}'", path.display());
    read_observations(File::open(path)?)
}

pub fn read_observations<R: Read>(reader: R) -> Result<Vec<BatchRow>, BatchError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let positions: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name, i))
        .collect();

    for column in REQUIRED_COLUMNS {
        if !positions.contains_key(column) {
            return Err(BatchError::ColumnNotFound(column.to_string()));
        }
    }
    let sample_id_col = positions.get("sample_id").copied();
    let wbc_col = positions.get("preop_wbc").copied();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let sample_id = sample_id_col
            .and_then(|col| record.get(col))
            .filter(|id| !id.is_empty())
            .map_or_else(|| (index + 1).to_string(), str::to_string);

        let raw = parse_row(&record, &positions, wbc_col);
        rows.push(BatchRow { sample_id, raw });
    }

    if rows.is_empty() {
        return Err(BatchError::Empty);
    }
    log::info!("Loaded {} patients for prediction", rows.len());
    Ok(rows)
}

fn parse_row(
    record: &csv::StringRecord,
    positions: &HashMap<&str, usize>,
    wbc_col: Option<usize>,
) -> Result<RawObservation, String> {
    let cell = |column: &str| parse_cell(record.get(positions[column]).unwrap_or(""), column);
    Ok(RawObservation {
        neutrophils: cell("preop_neut")?,
        lymphocytes: cell("preop_lymph")?,
        monocytes: cell("preop_mono")?,
        wbc: match wbc_col {
            Some(col) => parse_cell(record.get(col).unwrap_or(""), "preop_wbc")?,
            None => None,
        },
        preop_crp: cell("preop_crp")?,
        diameter: cell("diameter")?,
        weight: cell("weight")?,
        preop_plt: cell("preop_plt")?,
    })
}

fn parse_cell(text: &str, column: &str) -> Result<Option<f64>, String> {
    if text.is_empty() || text.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    text.parse::<f64>()
        .map(Some)
        .map_err(|_| format!("column '{column}' has non-numeric value '{text}'"))
}

/// Scores every row with the shared scorer.
pub fn score_rows<C: Classifier>(scorer: &RiskScorer<C>, rows: &[BatchRow]) -> Vec<BatchOutcome> {
    rows.iter()
        .map(|row| match &row.raw {
            Ok(raw) => BatchOutcome {
                sample_id: row.sample_id.clone(),
                derived: derive(raw),
                result: scorer.predict(raw).map_err(|e| e.to_string()),
            },
            Err(message) => BatchOutcome {
                sample_id: row.sample_id.clone(),
                derived: DerivedFeatures::default(),
                result: Err(message.clone()),
            },
        })
        .collect()
}

pub fn write_predictions_to_path(path: &Path, outcomes: &[BatchOutcome]) -> Result<(), BatchError> {
    write_predictions(File::create(path)?, outcomes)
}

pub fn write_predictions<W: Write>(writer: W, outcomes: &[BatchOutcome]) -> Result<(), BatchError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    writer.write_record(OUTPUT_HEADER)?;

    let optional = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    for outcome in outcomes {
        let (probability, risk, error) = match &outcome.result {
            Ok(result) => (
                result.probability.to_string(),
                result.label.to_string(),
                String::new(),
            ),
            Err(message) => (String::new(), String::new(), message.clone()),
        };
        writer.write_record([
            outcome.sample_id.clone(),
            optional(outcome.derived.nlr),
            optional(outcome.derived.mlr),
            optional(outcome.derived.nmlr),
            probability,
            risk,
            error,
        ])?;
    }
    writer.flush()?;
    Ok(())
}
