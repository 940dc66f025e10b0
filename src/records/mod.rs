//! Job record entities
//!
//! Datasets and models are shared, read-only inputs to jobs. Each
//! `TestResult` and `PredictionResult` is owned by exactly one dispatched
//! job, which is the only writer of its status and payload.

mod store;

pub use store::{ModelRemoval, RecordStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::automl::{Leaderboard, Preset};

/// Identifier assigned by the record store, sequential per table.
pub type RecordId = u64;

/// Name of the placeholder dataset attached to manual predictions.
pub const MANUAL_DATASET_NAME: &str = "--manual-data--";

/// Job status shared by models, test results and prediction results.
///
/// Models move `Running -> Completed | Failed`; test and prediction results
/// start at `Pending`. Older snapshots spelled the training state
/// `TRAINING`, which is still accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    #[serde(alias = "TRAINING")]
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column of a dataset as inspected at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: String,
}

/// Cached visualization artifacts for a dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisualizationCache {
    pub valid: bool,
    pub stats: Option<serde_json::Value>,
    pub preview: Option<serde_json::Value>,
    pub plots: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: RecordId,
    pub name: String,
    pub file: Option<PathBuf>,
    pub separator: String,
    pub encoding: String,
    pub description: String,
    pub columns: Vec<ColumnSpec>,
    pub n_rows: usize,
    pub n_columns: usize,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub visualization: VisualizationCache,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            file: None,
            separator: ",".to_string(),
            encoding: "utf-8".to_string(),
            description: String::new(),
            columns: Vec::new(),
            n_rows: 0,
            n_columns: 0,
            owner: None,
            created_at: Utc::now(),
            visualization: VisualizationCache::default(),
        }
    }

    pub fn is_manual_placeholder(&self) -> bool {
        self.name == MANUAL_DATASET_NAME
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Drop every cached artifact. Never called implicitly.
    pub fn invalidate_visualizations(&mut self) {
        self.visualization = VisualizationCache::default();
    }
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: String,
    pub message: String,
    pub trace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlModel {
    pub id: RecordId,
    pub name: String,
    pub description: String,
    pub target: String,
    pub features: Option<Vec<String>>,
    pub artifact: Option<PathBuf>,
    pub related_dataset: Option<RecordId>,
    pub model_type: String,
    pub preset: Preset,
    pub time_limit_secs: Option<u64>,
    pub status: JobStatus,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub training_duration_secs: Option<f64>,
    /// Validation leaderboard captured when training completes.
    pub evaluation_metrics: Option<Leaderboard>,
    pub failure: Option<JobFailure>,
    pub is_evaluated: bool,
    pub evaluation_date: Option<DateTime<Utc>>,
    pub evaluation_plots: Option<String>,
}

impl MlModel {
    /// A model waiting for its training job.
    pub fn training(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: String::new(),
            target: target.into(),
            features: None,
            artifact: None,
            related_dataset: None,
            model_type: "tabular".to_string(),
            preset: Preset::default(),
            time_limit_secs: None,
            status: JobStatus::Running,
            owner: None,
            created_at: Utc::now(),
            training_duration_secs: None,
            evaluation_metrics: None,
            failure: None,
            is_evaluated: false,
            evaluation_date: None,
            evaluation_plots: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == JobStatus::Completed && self.artifact.is_some()
    }

    pub fn reset_evaluation(&mut self) {
        self.is_evaluated = false;
        self.evaluation_date = None;
        self.evaluation_plots = None;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: RecordId,
    pub model_id: RecordId,
    pub dataset_id: RecordId,
    pub status: JobStatus,
    /// Scorecard on success, error descriptor on failure.
    pub evaluation_metrics: Option<serde_json::Value>,
    pub predictions: Option<Vec<serde_json::Value>>,
    pub leaderboard: Option<Leaderboard>,
    pub plot: Option<String>,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TestResult {
    pub fn pending(model_id: RecordId, dataset_id: RecordId) -> Self {
        Self {
            id: 0,
            model_id,
            dataset_id,
            status: JobStatus::Pending,
            evaluation_metrics: None,
            predictions: None,
            leaderboard: None,
            plot: None,
            owner: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub id: RecordId,
    pub model_id: RecordId,
    pub dataset_id: RecordId,
    pub output_file: Option<PathBuf>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PredictionResult {
    pub fn pending(model_id: RecordId, dataset_id: RecordId) -> Self {
        Self {
            id: 0,
            model_id,
            dataset_id,
            output_file: None,
            status: JobStatus::Pending,
            error_message: None,
            owner: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}
