#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use std::process;

use apprisk::batch::{read_observations_from_path, score_rows, write_predictions_to_path};
use apprisk::derive;
use apprisk::locate::{LoadedClassifier, MODEL_ENV_VAR, ModelSource, load_classifier};
use apprisk::model::TrainedClassifier;
use apprisk::report::{MODEL_UNAVAILABLE, render_derived, render_model_info, render_prediction};
use apprisk::{RawObservation, RiskScorer};

#[derive(Args)]
pub struct ModelArgs {
    /// Path to the classifier model file (.toml). Falls back to APPRISK_MODEL,
    /// then to final_model.toml, results/final_model.toml and model_adaboost.toml
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,
}

#[derive(Args)]
pub struct CountArgs {
    /// Preoperative neutrophil count (×10⁹/L)
    #[arg(long)]
    pub neut: Option<f64>,

    /// Preoperative lymphocyte count (×10⁹/L)
    #[arg(long)]
    pub lymph: Option<f64>,

    /// Preoperative monocyte count (×10⁹/L)
    #[arg(long)]
    pub mono: Option<f64>,

    /// Preoperative white blood cell count (×10⁹/L)
    #[arg(long)]
    pub wbc: Option<f64>,
}

#[derive(Args)]
pub struct PredictArgs {
    #[command(flatten)]
    pub counts: CountArgs,

    /// Preoperative CRP (mg/L)
    #[arg(long)]
    pub crp: Option<f64>,

    /// Appendiceal diameter (mm)
    #[arg(long)]
    pub diameter: Option<f64>,

    /// Body weight (kg)
    #[arg(long)]
    pub weight: Option<f64>,

    /// Preoperative platelet count (×10⁹/L)
    #[arg(long)]
    pub plt: Option<f64>,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Args)]
pub struct InferArgs {
    /// Path to patient TSV file with preop_neut, preop_lymph, preop_mono, preop_crp,
    /// diameter, weight, preop_plt columns (preop_wbc and sample_id optional)
    pub patients: PathBuf,

    /// Output path for the predictions table
    #[arg(long, default_value = "predictions.tsv")]
    pub out: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Parser)]
#[command(
    name = "apprisk",
    about = "Preoperative risk prediction for complicated appendicitis",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single patient
    #[command(about = "Predict complicated appendicitis risk for one patient")]
    Predict(PredictArgs),

    /// Compute NLR, MLR and NMLR from cell counts
    #[command(about = "Show the derived hematologic ratios")]
    Derive(CountArgs),

    /// Score every patient in a TSV file
    #[command(about = "Score a patient table (outputs: predictions.tsv)")]
    Infer(InferArgs),

    /// Display information about the loaded model
    #[command(about = "Display model information")]
    Info(ModelArgs),

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Predict(args)) => run_predict(args),
        Some(Commands::Derive(args)) => run_derive(args),
        Some(Commands::Infer(args)) => run_infer(args),
        Some(Commands::Info(args)) => run_info(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Resolves and loads the classifier once. A missing model is reported with the
/// explicit "unavailable" message before the underlying error.
fn load_model(args: &ModelArgs) -> Result<LoadedClassifier, Box<dyn std::error::Error>> {
    let base_dir = env::current_dir()?;
    let source = ModelSource::resolve(args.model.clone(), env::var(MODEL_ENV_VAR).ok(), &base_dir);
    load_classifier(&source).map_err(|err| {
        eprintln!("{MODEL_UNAVAILABLE}");
        Box::new(err) as Box<dyn std::error::Error>
    })
}

fn observation(args: &PredictArgs) -> RawObservation {
    RawObservation {
        neutrophils: args.counts.neut,
        lymphocytes: args.counts.lymph,
        monocytes: args.counts.mono,
        wbc: args.counts.wbc,
        preop_crp: args.crp,
        diameter: args.diameter,
        weight: args.weight,
        preop_plt: args.plt,
    }
}

fn run_predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_model(&args.model)?;
    println!("Model loaded: {}", loaded.path.display());
    let scorer: RiskScorer<TrainedClassifier> = RiskScorer::new(loaded.classifier);

    let raw = observation(&args);
    print!("{}", render_derived(&derive(&raw)));
    println!();

    let result = scorer.predict(&raw)?;
    print!("{}", render_prediction(&result));
    Ok(())
}

fn run_derive(args: CountArgs) -> Result<(), Box<dyn std::error::Error>> {
    let raw = RawObservation {
        neutrophils: args.neut,
        lymphocytes: args.lymph,
        monocytes: args.mono,
        wbc: args.wbc,
        ..RawObservation::default()
    };
    print!("{}", render_derived(&derive(&raw)));
    Ok(())
}

fn run_infer(args: InferArgs) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_model(&args.model)?;
    println!("Loading model from: {}", loaded.path.display());
    let scorer = RiskScorer::new(loaded.classifier);

    println!("Loading patients from: {}", args.patients.display());
    let rows = read_observations_from_path(&args.patients)?;
    println!("Loaded {} patients for prediction", rows.len());

    let outcomes = score_rows(&scorer, &rows);
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    write_predictions_to_path(&args.out, &outcomes)?;

    if failed > 0 {
        println!("{failed} of {} patients could not be scored; see the error column.", outcomes.len());
    }
    println!("Predictions saved to: {}", args.out.display());
    Ok(())
}

fn run_info(args: ModelArgs) -> Result<(), Box<dyn std::error::Error>> {
    let loaded = load_model(&args)?;
    let source = loaded.path.display().to_string();
    print!("{}", render_model_info(loaded.classifier.metadata(), &source));
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("APPRISK_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("apprisk {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
