//! Kolosal Anomaly CLI Module
//!
//! Command-line interface for training, evaluating and applying the detectors.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::error::AnomalyError;
use crate::export::FileModelStore;
use crate::metrics::{self, METRIC_NAMES};
use crate::pipeline::{self, PipelineRun};
use crate::preprocessing;
use crate::synthetic::{self, SampleDatasetConfig};
use crate::training::TrainEngine;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-anomaly")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Isolation Forest vs One-Class SVM anomaly detection on tabular data")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train and evaluate both detectors
    Run {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input CSV (overrides the configuration)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Directory to save fitted models into
        #[arg(short, long)]
        save: Option<PathBuf>,

        /// File name prefix for saved models
        #[arg(long, default_value = "anomaly")]
        prefix: String,
    },

    /// Flag anomalies in a CSV with saved models
    Predict {
        /// Directory holding saved models
        #[arg(short, long)]
        models: PathBuf,

        /// File name prefix of saved models
        #[arg(long, default_value = "anomaly")]
        prefix: String,

        /// Input CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Detector to use (defaults to the best saved one)
        #[arg(long)]
        model: Option<String>,

        /// Label column, used for evaluation when present
        #[arg(long, default_value = "Class")]
        label: String,

        /// Output CSV with `anomaly` and `anomaly_score` columns
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show dataset information
    Info {
        /// Input CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Label column
        #[arg(long, default_value = "Class")]
        label: String,
    },

    /// Write a synthetic labeled dataset
    Generate {
        /// Output CSV
        #[arg(short, long, default_value = "data/creditcard.csv")]
        output: PathBuf,

        /// Number of rows
        #[arg(long, default_value = "10000")]
        samples: usize,

        /// Number of feature columns
        #[arg(long, default_value = "28")]
        features: usize,

        /// Fraction of anomalous rows
        #[arg(long, default_value = "0.01")]
        anomaly_ratio: f64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(
    config_path: Option<&Path>,
    data: Option<&Path>,
    save_dir: Option<&Path>,
    prefix: &str,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(data) = data {
        config.data_path = data.to_path_buf();
    }

    section("Anomaly Detection");
    println!("  {}", kv("Dataset", &config.data_path.display().to_string()));
    println!("  {}", kv("Label", &config.label_column));
    println!();

    step_run("Loading, training and evaluating");
    let start = Instant::now();
    let run = match pipeline::run_pipeline(&config) {
        Ok(run) => run,
        Err(AnomalyError::DatasetNotFound(path)) => {
            println!("{}", "failed".red());
            println!();
            println!("  {} {}", "Dataset not found:".yellow(), path);
            println!("  {}", muted("Download the credit card fraud dataset and place it there, or create a sample with:"));
            println!("  {}", accent("kolosal-anomaly generate --output data/creditcard.csv"));
            println!();
            anyhow::bail!("dataset not found: {}", path);
        }
        Err(e) => return Err(e.into()),
    };
    step_done(&format!("{:.2?}", start.elapsed()));

    print_dataset(&run);
    print_summary(&run.engine)?;
    print_confusion(&run)?;
    print_best(&run.engine)?;

    if let Some(dir) = save_dir {
        let mut store = FileModelStore::new(dir, prefix);
        run.save(&mut store)
            .with_context(|| format!("saving models to {}", dir.display()))?;
        println!("  {} {}", ok("✓"), kv("Models saved to", &dir.display().to_string()));
        println!();
    }

    Ok(())
}

pub fn cmd_predict(
    models_dir: &Path,
    prefix: &str,
    data_path: &Path,
    model: Option<&str>,
    label: &str,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Predict");

    let store = FileModelStore::new(models_dir, prefix);
    let mut engine = TrainEngine::default();
    engine
        .load_models(&store)
        .with_context(|| format!("loading models from {}", models_dir.display()))?;
    let scaler = pipeline::load_scaler(&store)?;

    let mut df = preprocessing::load(data_path)?;
    let x = preprocessing::columns_to_array2(&df, engine.feature_names())?;
    let x = pipeline::prepare_for_inference(&x, scaler.as_ref())?;

    step_run("Scoring rows");
    let start = Instant::now();
    let detection = engine.predict_anomalies(&x, model)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    println!();
    println!("  {:<12} {}", muted("Rows"), x.nrows());
    println!("  {:<12} {}", muted("Flagged"), detection.n_anomalies.to_string().white().bold());

    if df.column(label).is_ok() {
        let y = preprocessing::extract_labels(&df, label)?;
        let m = metrics::evaluate(&y, &detection.predictions, &detection.anomaly_scores)?;
        for (name, value) in METRIC_NAMES.iter().zip(m.to_array()) {
            println!("  {:<12} {:.4}", muted(name), value);
        }
    }

    if let Some(output) = output {
        let flags: Vec<i32> = detection.predictions.iter().map(|&p| p as i32).collect();
        let scores: Vec<f64> = detection.anomaly_scores.to_vec();
        df.with_column(Column::new("anomaly".into(), flags))?;
        df.with_column(Column::new("anomaly_score".into(), scores))?;
        synthetic::write_csv(&mut df, output)?;
        println!("  {:<12} {}", muted("Output"), output.display());
    }

    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path, label: &str) -> anyhow::Result<()> {
    section("Data Info");

    let df = preprocessing::load(data_path)?;

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());
    println!("  {:<12} {:.2} MB", muted("Memory"), df.estimated_size() as f64 / 1024.0 / 1024.0);

    match preprocessing::summarize(&df, label) {
        Ok(summary) => {
            println!("  {:<12} {}", muted("Anomalies"), summary.n_anomalies);
            println!("  {:<12} {:.4}", muted("Ratio"), summary.anomaly_ratio);
        }
        Err(e) => println!("  {:<12} {}", muted("Label"), e.to_string().yellow()),
    }
    println!();

    println!("  {:<20} {:<12} {:>6}", muted("Column"), muted("Type"), muted("Nulls"));
    println!("  {}", dim(&"─".repeat(42)));

    for col in df.get_columns() {
        println!(
            "  {:<20} {:<12} {:>6}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
        );
    }

    println!();
    Ok(())
}

pub fn cmd_generate(
    output: &Path,
    samples: usize,
    features: usize,
    anomaly_ratio: f64,
    seed: u64,
) -> anyhow::Result<()> {
    section("Generate");

    let config = SampleDatasetConfig::default()
        .with_samples(samples)
        .with_features(features)
        .with_anomaly_ratio(anomaly_ratio)
        .with_seed(seed);

    step_run("Generating sample dataset");
    let mut df = synthetic::sample_dataset(&config)?;
    synthetic::write_csv(&mut df, output)?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    println!("  {:<12} {}", muted("Output"), output.display());
    println!("  {:<12} {}", muted("Anomalies"), config.n_anomalies());
    println!();
    Ok(())
}

// ─── Reporting ─────────────────────────────────────────────────────────────────

fn print_dataset(run: &PipelineRun) {
    section("Dataset");
    println!("  {:<12} {}", muted("Rows"), run.summary.n_rows);
    println!("  {:<12} {}", muted("Features"), run.summary.n_columns);
    println!("  {:<12} {} ({:.4})", muted("Anomalies"), run.summary.n_anomalies, run.summary.anomaly_ratio);
    println!("  {:<12} {} / {}", muted("Train/Test"), run.split.x_train.nrows(), run.split.x_test.nrows());
}

fn print_summary(engine: &TrainEngine) -> anyhow::Result<()> {
    section("Model Performance");

    print!("  {:<18}", muted("Model"));
    for name in METRIC_NAMES {
        print!(" {:>10}", muted(name));
    }
    println!();
    println!("  {}", dim(&"─".repeat(18 + 11 * METRIC_NAMES.len())));

    let (best, _) = engine.get_best_model()?;
    for (name, result) in engine.results()? {
        let label = if name == best { name.cyan().bold() } else { name.normal() };
        print!("  {:<18}", label);
        for value in result.metrics.to_array() {
            print!(" {:>10}", format!("{:.4}", value));
        }
        println!();
    }
    Ok(())
}

fn print_confusion(run: &PipelineRun) -> anyhow::Result<()> {
    for (name, result) in run.engine.results()? {
        let cm = metrics::confusion_matrix_metrics(&run.split.y_test, &result.predictions)?;
        section(&format!("Confusion · {}", name));
        println!("  {:<16} {:>8} {:>8}", "", muted("pred 0"), muted("pred 1"));
        println!("  {:<16} {:>8} {:>8}", muted("actual 0"), cm.true_negatives, cm.false_positives);
        println!("  {:<16} {:>8} {:>8}", muted("actual 1"), cm.false_negatives, cm.true_positives);
        println!("  {:<16} {:.4}", muted("Specificity"), cm.specificity);
        println!("  {:<16} {:.4}", muted("Sensitivity"), cm.sensitivity);
        println!("  {:<16} {:.3}s", muted("Fit time"), result.training_time_secs);
    }
    Ok(())
}

fn print_best(engine: &TrainEngine) -> anyhow::Result<()> {
    let (name, result) = engine.get_best_model()?;
    println!();
    line_box_top();
    line_box(&kv("Best model", &name.cyan().bold().to_string()));
    line_box(&kv("F1 score  ", &format!("{:.4}", result.metrics.f1_score)));
    line_box(&kv("ROC-AUC   ", &format!("{:.4}", result.metrics.roc_auc)));
    line_box_bottom();
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["kolosal-anomaly", "run", "--data", "x.csv", "--save", "models"]).unwrap();
        match cli.command {
            Some(Commands::Run { data, save, prefix, config }) => {
                assert_eq!(data, Some(PathBuf::from("x.csv")));
                assert_eq!(save, Some(PathBuf::from("models")));
                assert_eq!(prefix, "anomaly");
                assert!(config.is_none());
            }
            _ => panic!("expected run"),
        }

        let cli = Cli::try_parse_from(["kolosal-anomaly", "generate", "--samples", "100"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Generate { samples: 100, features: 28, .. })));

        assert!(Cli::try_parse_from(["kolosal-anomaly", "predict", "--data", "x.csv"]).is_err());
    }

    #[test]
    fn test_strip_ansi() {
        let colored = "abc".red().to_string();
        assert_eq!(strip_ansi(&colored), "abc");
    }

    #[test]
    fn test_generate_then_run_and_predict() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("sample.csv");
        let models = dir.path().join("models");
        let output = dir.path().join("scored.csv");

        cmd_generate(&data, 300, 4, 0.05, 1).unwrap();
        cmd_run(None, Some(&data), Some(&models), "test").unwrap();
        cmd_predict(&models, "test", &data, None, "Class", Some(&output)).unwrap();

        let scored = preprocessing::load(&output).unwrap();
        assert_eq!(scored.height(), 300);
        assert!(scored.column("anomaly").is_ok());
        assert!(scored.column("anomaly_score").is_ok());
    }

    #[test]
    fn test_run_reports_missing_dataset() {
        let err = cmd_run(None, Some(Path::new("nowhere/creditcard.csv")), None, "x").unwrap_err();
        assert!(err.to_string().contains("dataset not found"));
    }
}
