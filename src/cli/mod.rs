//! Tripcast CLI Module
//!
//! Command-line interface over the pipeline graph: run the whole chain or a
//! prefix of it, run single steps, and score single requests.

use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand};
use colored::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::evaluation::{EvaluationReport, Evaluator};
use crate::pipeline::{NodeName, PipelineConfig, PipelineGraph, PipelineRun, PreparedData};
use crate::source::TripDataType;
use crate::training::{MetricsReport, ModelBundle, RegressionMetrics};
use crate::utils::DataFormat;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    println!("  {} {}...", accent("›"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── Logging ───────────────────────────────────────────────────────────────────

/// Install the global tracing subscriber. Call once, from the entry point.
///
/// `RUST_LOG` takes precedence; otherwise verbosity picks info/debug/trace.
pub fn init_logging(verbosity: u8) -> anyhow::Result<()> {
    let default = match verbosity {
        0 => "tripcast=info",
        1 => "tripcast=debug",
        _ => "tripcast=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tripcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trip-duration model pipeline: raw trips → features → model → evaluation")]
#[command(long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Pipeline configuration file (JSON); flags and env vars override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub paths: PathArgs,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub features: FeatureArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Directory layout
#[derive(Args, Debug, Clone, Default)]
pub struct PathArgs {
    /// Raw trip data directory
    #[arg(long, env = "RAW_DATA_DIR", global = true)]
    pub raw_dir: Option<PathBuf>,

    /// Processed data directory
    #[arg(long, env = "PROCESSED_DATA_DIR", global = true)]
    pub processed_dir: Option<PathBuf>,

    /// Model bundle path
    #[arg(long, env = "MODEL_PATH", global = true)]
    pub model_path: Option<PathBuf>,

    /// Reports directory
    #[arg(long, env = "REPORTS_DIR", global = true)]
    pub reports_dir: Option<PathBuf>,
}

/// Raw data source
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Trip data type (yellow_tripdata, green_tripdata, fhv_tripdata)
    #[arg(long, env = "DATA_TYPE", global = true)]
    pub data_type: Option<TripDataType>,

    /// Year of the monthly files
    #[arg(long, env = "DATA_YEAR", global = true)]
    pub year: Option<i32>,

    /// Months to fetch, comma separated
    #[arg(long, env = "DATA_MONTHS", value_delimiter = ',', global = true)]
    pub months: Option<Vec<u32>>,

    /// Allow downloading when no cached files exist
    #[arg(long, env = "ALLOW_DOWNLOAD", value_parser = FalseyValueParser::new(), global = true)]
    pub allow_download: bool,

    /// Fetch the requested months again even if already downloaded
    #[arg(long, env = "DATA_FORCE", value_parser = FalseyValueParser::new(), global = true)]
    pub force: bool,

    /// Fetch only the first month
    #[arg(long, env = "DATA_SAMPLE", value_parser = FalseyValueParser::new(), global = true)]
    pub sample: bool,

    /// Synthesize data when a download fails
    #[arg(long, global = true)]
    pub synthetic_fallback: bool,

    /// Only use cached files of this format (csv, parquet)
    #[arg(long, global = true)]
    pub input_format: Option<DataFormat>,
}

/// Feature building
#[derive(Args, Debug, Clone, Default)]
pub struct FeatureArgs {
    /// Cap on raw rows, sampled with a fixed seed
    #[arg(long, env = "SAMPLE_SIZE", global = true)]
    pub sample_size: Option<usize>,

    /// Processed data format (csv, parquet)
    #[arg(long, env = "OUTPUT_FORMAT", global = true)]
    pub output_format: Option<DataFormat>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline graph up to a node
    Run {
        /// Last node to materialize (raw, prepared, trained, evaluated)
        #[arg(long, default_value = "evaluated")]
        until: NodeName,
    },

    /// Resolve raw data (cached, downloaded or synthetic)
    Download,

    /// Resolve raw data and build the processed feature table
    Process,

    /// Select a model on processed data
    Train {
        /// Processed data file (defaults to the processed directory)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Evaluate a saved model on a dataset
    Evaluate {
        /// Dataset to score (defaults to the processed data)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Output report (defaults to the reports directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Predict one trip from named features
    Predict {
        /// Feature value as name=value; repeat for every model feature
        #[arg(short, long = "feature", value_parser = parse_feature)]
        features: Vec<(String, f64)>,
    },
}

fn parse_feature(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid number for '{}': '{}'", name.trim(), value.trim()))?;
    Ok((name.trim().to_string(), value))
}

impl Cli {
    /// Build the pipeline configuration: file (or defaults), then flags/env.
    pub fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(dir) = &self.paths.raw_dir {
            config.raw_dir = dir.clone();
        }
        if let Some(dir) = &self.paths.processed_dir {
            config.processed_dir = dir.clone();
        }
        if let Some(path) = &self.paths.model_path {
            config.model_path = path.clone();
        }
        if let Some(dir) = &self.paths.reports_dir {
            config.reports_dir = dir.clone();
        }

        let source = &mut config.source;
        if let Some(data_type) = self.source.data_type {
            source.data_type = data_type;
        }
        if let Some(year) = self.source.year {
            source.year = year;
        }
        if let Some(months) = &self.source.months {
            source.months = months.clone();
        }
        source.allow_download |= self.source.allow_download;
        source.force |= self.source.force;
        source.sample |= self.source.sample;
        source.synthetic_fallback |= self.source.synthetic_fallback;
        if self.source.input_format.is_some() {
            source.input_format = self.source.input_format;
        }

        if self.features.sample_size.is_some() {
            config.features.sample_size = self.features.sample_size;
        }
        if let Some(format) = self.features.output_format {
            config.features.output_format = format;
        }

        Ok(config)
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Dispatch a parsed command line
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.pipeline_config()?;
    match cli.command {
        Commands::Run { until } => cmd_run(config, until),
        Commands::Download => cmd_run(config, NodeName::Raw),
        Commands::Process => cmd_run(config, NodeName::Prepared),
        Commands::Train { data } => cmd_train(config, data),
        Commands::Evaluate { data, output } => cmd_evaluate(config, data, output),
        Commands::Predict { features } => cmd_predict(config, features),
    }
}

pub fn cmd_run(config: PipelineConfig, until: NodeName) -> anyhow::Result<()> {
    section(&format!("Pipeline → {}", until));

    let start = Instant::now();
    let graph = PipelineGraph::new(config)?;
    let chain: Vec<&str> = NodeName::ALL
        .iter()
        .filter(|n| **n <= until)
        .map(|n| n.as_str())
        .collect();
    step_run(&format!("Materializing {}", chain.join(" → ")));
    let run = graph.run_until(until)?;
    print_run(&run);

    println!();
    kv("Elapsed", &format!("{:.2?}", start.elapsed()));
    println!();
    Ok(())
}

pub fn cmd_train(config: PipelineConfig, data: Option<PathBuf>) -> anyhow::Result<()> {
    section("Train");

    let data_path = data.unwrap_or_else(|| config.processed_data_path());
    let prepared = PreparedData::load(&data_path, crate::features::TARGET_COLUMN)?;
    step_ok(&format!(
        "Loaded {} rows × {} features from {}",
        prepared.frame.height(),
        prepared.frame.features().len(),
        data_path.display()
    ));

    let start = Instant::now();
    let graph = PipelineGraph::new(config)?;
    step_run("Tuning candidates");
    let trained = graph.trained(&prepared)?;
    print_metrics_report(&trained.metrics);
    kv("Model", &trained.model_path.display().to_string());
    kv("Elapsed", &format!("{:.2?}", start.elapsed()));
    println!();
    Ok(())
}

pub fn cmd_evaluate(
    config: PipelineConfig,
    data: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    section("Evaluate");

    let data_path = data.unwrap_or_else(|| config.processed_data_path());
    let report = Evaluator::new().evaluate_files(&data_path, &config.model_path)?;
    let output = output.unwrap_or_else(|| config.evaluation_path());
    report.save(&output)?;

    print_evaluation(&report);
    kv("Report", &output.display().to_string());
    println!();
    Ok(())
}

pub fn cmd_predict(config: PipelineConfig, features: Vec<(String, f64)>) -> anyhow::Result<()> {
    section("Predict");

    let bundle = ModelBundle::load(&config.model_path)?;
    let request: HashMap<String, f64> = features.into_iter().collect();
    let prediction = bundle.predict_one(&request)?;

    kv("Model", bundle.model_type().as_str());
    kv("Duration", &format!("{:.1}s ({:.1} min)", prediction, prediction / 60.0));
    println!();
    Ok(())
}

// ─── Output ────────────────────────────────────────────────────────────────────

fn print_run(run: &PipelineRun) {
    if let Some(raw) = &run.raw {
        step_ok(&format!(
            "{} {} file(s), {} ({})",
            NodeName::Raw.as_str().white().bold(),
            raw.files().len(),
            raw.format(),
            raw.provenance()
        ));
    }
    if let Some(prepared) = &run.prepared {
        step_ok(&format!(
            "{} {} rows × {} features → {}",
            NodeName::Prepared.as_str().white().bold(),
            prepared.frame.height(),
            prepared.frame.features().len(),
            prepared.data_path.display()
        ));
    }
    if let Some(trained) = &run.trained {
        step_ok(&format!(
            "{} {} → {}",
            NodeName::Trained.as_str().white().bold(),
            trained.bundle.model_type(),
            trained.model_path.display()
        ));
        print_metrics_report(&trained.metrics);
    }
    if let Some(report) = &run.evaluated {
        step_ok(&format!("{}", NodeName::Evaluated.as_str().white().bold()));
        print_evaluation(report);
    }
}

fn metrics_row(label: &str, m: &RegressionMetrics) {
    println!(
        "  {:<10} {:>10.2} {:>10.2} {:>8.4} {:>8}",
        muted(label),
        m.mae,
        m.rmse,
        m.r2,
        m.samples
    );
}

fn print_metrics_report(report: &MetricsReport) {
    println!();
    println!(
        "  {:<10} {:>10} {:>10} {:>8} {:>8}",
        muted("Split"),
        muted("MAE"),
        muted("RMSE"),
        muted("R²"),
        muted("Rows")
    );
    println!("  {}", dim(&"─".repeat(50)));
    metrics_row("train", &report.metrics.train);
    metrics_row("test", &report.metrics.test);
    println!();

    for candidate in &report.candidates {
        match (&candidate.error, candidate.test_mae) {
            (None, Some(mae)) => println!(
                "  {:<16} test MAE {:.2}",
                candidate.model_type.as_str().white(),
                mae
            ),
            (Some(err), _) => println!(
                "  {:<16} {}",
                candidate.model_type.as_str().white(),
                format!("excluded: {}", err).red()
            ),
            _ => {}
        }
    }
    println!();
    println!(
        "  {} {} {}",
        ok("best"),
        report.model_type.as_str().white().bold(),
        dim(&report.params.to_string())
    );
}

fn print_evaluation(report: &EvaluationReport) {
    kv("Model", report.model_type.as_str());
    kv("Params", &report.params.to_string());
    kv("MAE", &format!("{:.2}", report.metrics.mae));
    kv("RMSE", &format!("{:.2}", report.metrics.rmse));
    kv("R²", &format!("{:.4}", report.metrics.r2));
    kv("Rows", &report.metrics.samples.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature() {
        assert_eq!(parse_feature("trip_distance=2.5").unwrap(), ("trip_distance".to_string(), 2.5));
        assert!(parse_feature("trip_distance").is_err());
        assert!(parse_feature("trip_distance=abc").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "tripcast",
            "--raw-dir",
            "/tmp/raw",
            "--months",
            "4,5",
            "--output-format",
            "parquet",
            "run",
            "--until",
            "prepared",
        ])
        .unwrap();
        let config = cli.pipeline_config().unwrap();

        assert_eq!(config.raw_dir, PathBuf::from("/tmp/raw"));
        assert_eq!(config.source.months, vec![4, 5]);
        assert_eq!(config.features.output_format, DataFormat::Parquet);
        assert!(matches!(cli.command, Commands::Run { until: NodeName::Prepared }));
    }

    #[test]
    fn test_force_flag_on_download() {
        let cli =
            Cli::try_parse_from(["tripcast", "download", "--allow-download", "--force"]).unwrap();
        let config = cli.pipeline_config().unwrap();

        assert!(config.source.allow_download);
        assert!(config.source.force);
        assert!(matches!(cli.command, Commands::Download));
    }

    #[test]
    fn test_predict_features() {
        let args = ["tripcast", "predict", "-f", "a=1", "--feature", "b=2.5"];
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Predict { features } => {
                assert_eq!(features, vec![("a".to_string(), 1.0), ("b".to_string(), 2.5)]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
