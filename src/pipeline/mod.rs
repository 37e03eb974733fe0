//! Pipeline graph: raw → prepared → trained → evaluated
//!
//! Each node is exposed as its own method taking the upstream node's output,
//! so callers can materialize the whole chain or any prefix of it. Failures are
//! wrapped in [`TripcastError::Stage`] carrying the node name.

pub mod config;

pub use config::PipelineConfig;

use crate::error::{Result, TripcastError};
use crate::evaluation::{EvaluationReport, Evaluator};
use crate::features::{FeatureBuilder, FeatureFrame};
use crate::source::{Fetcher, RawDataset, SourceResolver};
use crate::training::{MetricsReport, ModelBundle, ModelSelector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tracing::info;

/// Node of the pipeline graph, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeName {
    Raw,
    Prepared,
    Trained,
    Evaluated,
}

impl NodeName {
    pub const ALL: [NodeName; 4] = [
        NodeName::Raw,
        NodeName::Prepared,
        NodeName::Trained,
        NodeName::Evaluated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeName::Raw => "raw",
            NodeName::Prepared => "prepared",
            NodeName::Trained => "trained",
            NodeName::Evaluated => "evaluated",
        }
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeName {
    type Err = TripcastError;

    fn from_str(s: &str) -> Result<Self> {
        NodeName::ALL
            .into_iter()
            .find(|n| n.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| {
                TripcastError::ConfigurationError(format!("Unknown pipeline node: {}", s))
            })
    }
}

/// Output of the `prepared` node
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub frame: FeatureFrame,
    /// Persisted processed data
    pub data_path: PathBuf,
}

impl PreparedData {
    /// Reload processed data written by an earlier run
    pub fn load(path: &Path, target: &str) -> Result<Self> {
        if !path.exists() {
            return Err(TripcastError::ConfigurationError(format!(
                "Data file not found: {}",
                path.display()
            )));
        }
        Ok(Self {
            frame: FeatureFrame::load(path, target)?,
            data_path: path.to_path_buf(),
        })
    }
}

/// Output of the `trained` node
#[derive(Debug, Clone)]
pub struct TrainingArtifacts {
    pub bundle: ModelBundle,
    pub metrics: MetricsReport,
    pub model_path: PathBuf,
    pub metrics_path: PathBuf,
    /// Processed data the model was selected on
    pub data_path: PathBuf,
}

/// Node outputs materialized by [`PipelineGraph::run_until`]
#[derive(Debug, Default)]
pub struct PipelineRun {
    pub raw: Option<RawDataset>,
    pub prepared: Option<PreparedData>,
    pub trained: Option<TrainingArtifacts>,
    pub evaluated: Option<EvaluationReport>,
}

/// The four-node trip-duration pipeline
pub struct PipelineGraph {
    config: PipelineConfig,
    resolver: SourceResolver,
}

impl PipelineGraph {
    /// Create a graph that downloads over HTTP when allowed
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let resolver = SourceResolver::new(config.source.clone())?;
        Ok(Self { config, resolver })
    }

    /// Create a graph with a custom transfer implementation
    pub fn with_fetcher(config: PipelineConfig, fetcher: Box<dyn Fetcher>) -> Self {
        let resolver = SourceResolver::with_fetcher(config.source.clone(), fetcher);
        Self { config, resolver }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve raw data in the raw directory.
    pub fn raw(&self) -> Result<RawDataset> {
        stage(NodeName::Raw, || self.resolver.resolve(&self.config.raw_dir))
    }

    /// Build features from raw data and persist the processed outputs.
    pub fn prepared(&self, raw: &RawDataset) -> Result<PreparedData> {
        stage(NodeName::Prepared, || {
            let frame = FeatureBuilder::new(self.config.features.clone()).build(raw)?;
            let data_path =
                frame.write(&self.config.processed_dir, self.config.features.output_format)?;
            Ok(PreparedData { frame, data_path })
        })
    }

    /// Select a model and persist the bundle and `metrics.json`.
    pub fn trained(&self, prepared: &PreparedData) -> Result<TrainingArtifacts> {
        stage(NodeName::Trained, || {
            let selector = ModelSelector::new(self.config.selector.clone());
            let (bundle, metrics) = selector.select(&prepared.frame)?;
            let metrics_path = self.config.metrics_path();
            bundle.save(&self.config.model_path)?;
            metrics.save(&metrics_path)?;
            Ok(TrainingArtifacts {
                bundle,
                metrics,
                model_path: self.config.model_path.clone(),
                metrics_path,
                data_path: prepared.data_path.clone(),
            })
        })
    }

    /// Re-score the persisted bundle on the persisted processed data and write
    /// `evaluation.json`.
    pub fn evaluated(&self, trained: &TrainingArtifacts) -> Result<EvaluationReport> {
        stage(NodeName::Evaluated, || {
            let report = Evaluator::new().evaluate_files(&trained.data_path, &trained.model_path)?;
            report.save(&self.config.evaluation_path())?;
            Ok(report)
        })
    }

    /// Materialize every node up to and including `until`.
    pub fn run_until(&self, until: NodeName) -> Result<PipelineRun> {
        let mut run = PipelineRun::default();

        let raw = self.raw()?;
        if until > NodeName::Raw {
            let prepared = self.prepared(&raw)?;
            if until > NodeName::Prepared {
                let trained = self.trained(&prepared)?;
                if until > NodeName::Trained {
                    run.evaluated = Some(self.evaluated(&trained)?);
                }
                run.trained = Some(trained);
            }
            run.prepared = Some(prepared);
        }
        run.raw = Some(raw);

        Ok(run)
    }

    /// Materialize the whole chain
    pub fn run(&self) -> Result<PipelineRun> {
        self.run_until(NodeName::Evaluated)
    }
}

/// Run one node, logging its duration and tagging failures with its name.
fn stage<T>(node: NodeName, f: impl FnOnce() -> Result<T>) -> Result<T> {
    info!(node = %node, "Materializing node");
    let start = Instant::now();
    let result = f().map_err(|e| e.in_stage(node));
    if result.is_ok() {
        info!(node = %node, elapsed_ms = start.elapsed().as_millis() as u64, "Node materialized");
    }
    result
}
