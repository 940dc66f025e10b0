//! Read-only status projections
//!
//! Pure functions from stored records to the JSON shapes served to pollers.
//! Nothing here waits on a job; a record is reported as it currently stands.

use serde::Serialize;
use serde_json::{json, Value};

use crate::automl::Leaderboard;
use crate::records::{Dataset, MlModel, PredictionResult, TestResult};

/// Leaderboard reshaped for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub scores: Vec<Value>,
    pub model_names: Vec<Value>,
}

impl LeaderboardView {
    /// Name and score columns come from the leaderboard's role metadata.
    /// Tables stored without it fall back to positions 0 and 1.
    pub fn from_leaderboard(leaderboard: &Leaderboard) -> Self {
        let name_idx = leaderboard.name_index().unwrap_or(0);
        let score_idx = leaderboard.score_index().unwrap_or(1);
        Self {
            headers: leaderboard.columns.clone(),
            rows: leaderboard.data.clone(),
            scores: leaderboard.column(score_idx),
            model_names: leaderboard.column(name_idx),
        }
    }
}

fn leaderboard_json(leaderboard: Option<&Leaderboard>) -> Value {
    match leaderboard {
        Some(lb) => json!(LeaderboardView::from_leaderboard(lb)),
        None => Value::Null,
    }
}

pub fn dataset_summary(dataset: &Dataset) -> Value {
    json!({
        "id": dataset.id,
        "name": dataset.name,
        "description": dataset.description,
        "separator": dataset.separator,
        "encoding": dataset.encoding,
        "columns": dataset.columns,
        "n_rows": dataset.n_rows,
        "n_columns": dataset.n_columns,
        "created_at": dataset.created_at,
    })
}

pub fn model_status(model: &MlModel) -> Value {
    json!({
        "id": model.id,
        "name": model.name,
        "description": model.description,
        "status": model.status,
        "target": model.target,
        "features": model.features,
        "model_type": model.model_type,
        "preset": model.preset,
        "time_limit_secs": model.time_limit_secs,
        "related_dataset": model.related_dataset,
        "training_duration_secs": model.training_duration_secs,
        "leaderboard": leaderboard_json(model.evaluation_metrics.as_ref()),
        "error": model.failure,
        "is_evaluated": model.is_evaluated,
        "evaluation_date": model.evaluation_date,
        "created_at": model.created_at,
    })
}

pub fn test_status(test: &TestResult) -> Value {
    json!({
        "id": test.id,
        "model_id": test.model_id,
        "dataset_id": test.dataset_id,
        "status": test.status,
        "metrics": test.evaluation_metrics,
        "created_at": test.created_at,
        "finished_at": test.finished_at,
    })
}

/// Full evaluation payload. Fields stay `null` until the test finishes.
pub fn test_details(test: &TestResult, model_name: &str, dataset_name: &str) -> Value {
    json!({
        "id": test.id,
        "status": test.status,
        "metrics": test.evaluation_metrics,
        "predictions": test.predictions,
        "leaderboard": leaderboard_json(test.leaderboard.as_ref()),
        "plot": test.plot,
        "model_name": model_name,
        "dataset_name": dataset_name,
    })
}

pub fn prediction_status(result: &PredictionResult) -> Value {
    let output_name = result
        .output_file
        .as_deref()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str());
    json!({
        "id": result.id,
        "model_id": result.model_id,
        "dataset_id": result.dataset_id,
        "status": result.status,
        "output_file": output_name,
        "error": result.error_message,
        "created_at": result.created_at,
        "finished_at": result.finished_at,
    })
}
