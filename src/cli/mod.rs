//! ML Workbench CLI Module
//!
//! `serve` runs the web API. `train`, `evaluate` and `predict` drive the same
//! loader and fitting backend synchronously, without the record store.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::automl::{Backend, FitRequest, Leaderboard, Preset, TabularBackend};
use crate::data::loader::write_csv;
use crate::data::{column_from_json, DatasetLoader};
use crate::jobs::{effective_time_limit, prediction_column};
use crate::records::Dataset;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

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

fn print_leaderboard(leaderboard: &Leaderboard) {
    let name_idx = leaderboard.name_index().unwrap_or(0);
    let score_idx = leaderboard.score_index().unwrap_or(1);
    let score_name = leaderboard.columns.get(score_idx).map(String::as_str).unwrap_or("score");

    println!();
    println!("  {:<28} {:>12}", muted("Model"), muted(score_name));
    println!("  {}", dim(&"─".repeat(42)));
    let names = leaderboard.column(name_idx);
    let scores = leaderboard.column(score_idx);
    for (i, (name, score)) in names.iter().zip(&scores).enumerate() {
        let name = name.as_str().unwrap_or("?");
        let score = score.as_f64().map(|s| format!("{:.4}", s)).unwrap_or_else(|| "-".to_string());
        if i == 0 {
            println!("  {:<28} {:>12}", name.white().bold(), score.white().bold());
        } else {
            println!("  {:<28} {:>12}", name, score);
        }
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "mlworkbench")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tabular model training, evaluation and prediction service")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web API (default)
    Serve {
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Server host
        #[arg(long)]
        host: Option<String>,

        /// Directory for datasets, model artifacts and prediction files
        #[arg(long)]
        media_root: Option<PathBuf>,
    },

    /// Fit a model on a CSV file
    Train {
        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Feature columns (comma separated); all other columns when omitted
        #[arg(short, long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        /// Quality preset (medium_quality, good_quality, high_quality, best_quality)
        #[arg(long, default_value = "medium_quality")]
        preset: String,

        /// Time budget in seconds, 0 for unbounded
        #[arg(long, default_value = "0")]
        time_limit: u64,

        /// Field separator
        #[arg(long, default_value = ",")]
        separator: String,

        /// Artifact output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Score a fitted model against a labeled CSV file
    Evaluate {
        /// Model artifact directory
        #[arg(short, long)]
        model: PathBuf,

        /// Labeled CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Field separator
        #[arg(long, default_value = ",")]
        separator: String,
    },

    /// Append predictions to a CSV file
    Predict {
        /// Model artifact directory
        #[arg(short, long)]
        model: PathBuf,

        /// Input CSV file
        #[arg(short, long)]
        data: PathBuf,

        /// Output CSV file (default: `<input>_predicted.csv`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Field separator
        #[arg(long, default_value = ",")]
        separator: String,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn file_dataset(path: &Path, separator: &str) -> Dataset {
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("data");
    let mut dataset = Dataset::new(name);
    dataset.file = Some(path.to_path_buf());
    dataset.separator = separator.to_string();
    dataset
}

pub fn cmd_train(
    data_path: &Path,
    target: &str,
    features: Option<&[String]>,
    preset: &str,
    time_limit: u64,
    separator: &str,
    output: &Path,
) -> anyhow::Result<()> {
    section("Train");
    let preset: Preset = preset.parse()?;

    step_run("Loading data");
    let start = Instant::now();
    let dataset = file_dataset(data_path, separator);
    let df = DatasetLoader::load_for_training(&dataset, features, target)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    step_run(&format!("Fitting {} ({})", target.cyan(), preset));
    let start = Instant::now();
    let fitted = TabularBackend::new().fit(FitRequest {
        data: &df,
        label: target,
        time_limit: effective_time_limit(Some(time_limit)),
        preset,
        path: output,
    })?;
    step_done(&format!("{:?}", start.elapsed()));

    print_leaderboard(&fitted.leaderboard());
    println!();
    println!("  {:<16} {}", muted("Problem"), format!("{:?}", fitted.problem_type()).white());
    println!("  {:<16} {}", muted("Features"), fitted.features().join(", ").white());
    println!("  {:<16} {}", muted("Artifact"), output.display().to_string().white());
    println!();
    Ok(())
}

pub fn cmd_evaluate(model_path: &Path, data_path: &Path, separator: &str) -> anyhow::Result<()> {
    section("Evaluate");

    step_run("Loading model");
    let fitted = TabularBackend::new().load(model_path)?;
    step_done(fitted.label());

    step_run("Loading data");
    let df = DatasetLoader::read(data_path, separator, "utf-8")?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    let scorecard = fitted.evaluate(&df)?;
    println!();
    for (metric, score) in &scorecard {
        println!("  {:<28} {}", muted(metric), format!("{:.4}", score).white());
    }
    print_leaderboard(&fitted.leaderboard_on(&df)?);
    println!();
    Ok(())
}

pub fn cmd_predict(
    model_path: &Path,
    data_path: &Path,
    output: Option<&Path>,
    separator: &str,
) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading model");
    let fitted = TabularBackend::new().load(model_path)?;
    step_done(fitted.label());

    step_run("Loading data");
    let mut df = DatasetLoader::read(data_path, separator, "utf-8")?;
    step_done(&format!("{} rows × {} cols", df.height(), df.width()));

    step_run("Predicting");
    let start = Instant::now();
    let label = fitted.label().to_string();
    let inputs = if df.get_column_names().iter().any(|c| c.as_str() == label) {
        df.drop(&label)?
    } else {
        df.clone()
    };
    let predictions = fitted.predict(&inputs)?;
    df.with_column(column_from_json(&prediction_column(&label), &predictions))?;
    step_done(&format!("{} rows in {:?}", predictions.len(), start.elapsed()));

    let output = match output {
        Some(p) => p.to_path_buf(),
        None => {
            let stem = data_path.file_stem().and_then(|s| s.to_str()).unwrap_or("data");
            data_path.with_file_name(format!("{}_predicted.csv", stem))
        }
    };
    step_run(&format!("Saving → {}", output.display()));
    write_csv(&mut df, &output)?;
    step_done("");
    println!();
    Ok(())
}

pub async fn cmd_serve(host: Option<String>, port: Option<u16>, media_root: Option<PathBuf>) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(root) = media_root {
        config = config.with_media_root(root);
    }

    section(&format!("ML Workbench v{}", env!("CARGO_PKG_VERSION")));
    println!("  {:<10} {}", muted("API"), format!("http://{}:{}/api", config.host, config.port).white());
    println!("  {:<10} {}", muted("Media"), config.media_root.display().to_string().white());
    let timeout = match config.job_timeout_secs {
        0 => "none".to_string(),
        s => format!("{:?}", Duration::from_secs(s)),
    };
    println!("  {:<10} {} concurrent, timeout {}", muted("Jobs"), config.max_concurrent_jobs, timeout);
    println!("  {}", dim("ctrl+c to stop"));
    println!();

    run_server(config).await
}
