//! Prediction job runner

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn};

use super::{failure_of, JobContext};
use crate::data::loader::write_csv;
use crate::data::{column_from_json, column_from_text, DatasetLoader};
use crate::error::{Result, WorkbenchError};
use crate::records::{Dataset, JobStatus, MlModel, PredictionResult, RecordId};

/// One manually entered row, feature name to raw form value.
pub type ManualRow = BTreeMap<String, String>;

/// Where a prediction job reads its input rows from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PredictionInput {
    /// The dataset referenced by the result record.
    Dataset,
    Manual(Vec<ManualRow>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionJob {
    pub result_id: RecordId,
    pub input: PredictionInput,
}

/// Rows from indexed form keys `<feature>[<i>]`.
///
/// The row count is the number of contiguous indices, starting at 0, present
/// for the first feature. Other features missing at an index read as empty.
pub fn parse_manual_rows(features: &[String], form: &HashMap<String, String>) -> Result<Vec<ManualRow>> {
    let mut rows = Vec::new();
    if let Some(first) = features.first() {
        while form.contains_key(&format!("{}[{}]", first, rows.len())) {
            let i = rows.len();
            let row: ManualRow = features
                .iter()
                .map(|f| (f.clone(), form.get(&format!("{}[{}]", f, i)).cloned().unwrap_or_default()))
                .collect();
            rows.push(row);
        }
    }
    if rows.is_empty() {
        return Err(WorkbenchError::Validation("No data submitted for manual prediction.".to_string()));
    }
    Ok(rows)
}

/// Name of the appended prediction column.
pub fn prediction_column(target: &str) -> String {
    format!("predicted_{}", target)
}

/// A model can serve predictions only once training has completed.
pub fn ensure_ready(model: &MlModel) -> Result<()> {
    if model.is_ready() {
        Ok(())
    } else {
        Err(WorkbenchError::Validation(format!(
            "model {} is not ready for predictions (status {})",
            model.id, model.status
        )))
    }
}

fn manual_frame(features: &[String], rows: &[ManualRow]) -> Result<DataFrame> {
    if rows.is_empty() {
        return Err(WorkbenchError::Validation("No data submitted for manual prediction.".to_string()));
    }
    let columns: Vec<String> = if features.is_empty() {
        rows[0].keys().cloned().collect()
    } else {
        features.to_vec()
    };
    let cols: Vec<Column> = columns
        .iter()
        .map(|name| {
            let values: Vec<String> = rows.iter().map(|r| r.get(name).cloned().unwrap_or_default()).collect();
            column_from_text(name, &values)
        })
        .collect();
    Ok(DataFrame::new(cols)?)
}

/// Copy of `input` with the prediction column appended. The target column,
/// when present, is dropped from what the model sees but kept in the output.
fn predict_frame(ctx: &JobContext, model: &MlModel, input: &DataFrame) -> Result<DataFrame> {
    let artifact = model
        .artifact
        .as_deref()
        .ok_or_else(|| WorkbenchError::ArtifactLoad(format!("model {} has no artifact", model.id)))?;
    let fitted = ctx.backend.load(artifact)?;

    let has_target = input.get_column_names().iter().any(|c| c.as_str() == model.target);
    let features = if has_target { input.drop(&model.target)? } else { input.clone() };
    let predictions = fitted.predict(&features)?;

    let mut output = input.clone();
    output.with_column(column_from_json(&prediction_column(&model.target), &predictions))?;
    Ok(output)
}

fn file_stem(dataset: &Dataset) -> String {
    dataset
        .file
        .as_deref()
        .and_then(Path::file_stem)
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("dataset_{}", dataset.id))
}

fn predict_to_file(ctx: &JobContext, result: &PredictionResult, input: &PredictionInput) -> Result<PathBuf> {
    let model = ctx.store.model(result.model_id)?;
    ensure_ready(&model)?;

    let (frame, file_name) = match input {
        PredictionInput::Dataset => {
            let dataset = ctx.store.dataset(result.dataset_id)?;
            let frame = DatasetLoader::load(&dataset)?;
            (frame, format!("{}_predicted_{}.csv", file_stem(&dataset), result.id))
        }
        PredictionInput::Manual(rows) => {
            let features = model.features.clone().unwrap_or_default();
            let frame = manual_frame(&features, rows)?;
            (frame, format!("manual_prediction_{}_{}.csv", model.id, result.id))
        }
    };

    let mut output = predict_frame(ctx, &model, &frame)?;
    let path = ctx.media.predictions.join(file_name);
    write_csv(&mut output, &path)?;
    Ok(path)
}

/// Apply a model to the job's input and record the output file.
pub fn run_prediction(ctx: &JobContext, job: &PredictionJob) {
    run_prediction_notify(ctx, job, || {})
}

/// [`run_prediction`], calling `started` once the record is `RUNNING`.
pub(crate) fn run_prediction_notify(ctx: &JobContext, job: &PredictionJob, started: impl FnOnce()) {
    let _span = info_span!("job", kind = "prediction", result_id = job.result_id).entered();

    let result = match ctx.store.start_prediction(job.result_id) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Prediction result missing, skipping prediction");
            return;
        }
    };
    started();
    info!(
        model_id = result.model_id,
        dataset_id = result.dataset_id,
        manual = matches!(job.input, PredictionInput::Manual(_)),
        "Prediction started"
    );

    let applied = match predict_to_file(ctx, &result, &job.input) {
        Ok(path) => {
            let recorded = path.clone();
            let applied = ctx.store.finish_prediction(job.result_id, |r| {
                r.output_file = Some(recorded);
                r.error_message = None;
                r.status = JobStatus::Completed;
            });
            match applied {
                Ok(true) => info!(output = %path.display(), "Prediction completed"),
                _ => {
                    let _ = std::fs::remove_file(&path);
                }
            }
            applied
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Prediction failed");
            let failure = failure_of("Prediction failed", &e);
            let message = match failure.trace {
                Some(trace) => format!("{}\n\n{}", failure.message, trace),
                None => failure.message,
            };
            ctx.store.finish_prediction(job.result_id, |r| {
                r.error_message = Some(message);
                r.status = JobStatus::Failed;
            })
        }
    };
    match applied {
        Ok(true) => {}
        Ok(false) => warn!("Prediction result no longer running, outcome discarded"),
        Err(e) => warn!(error = %e, "Could not record prediction outcome"),
    }
}

/// Synchronous dataset prediction.
///
/// Errors go straight back to the caller and no record is created; on
/// success a `COMPLETED` result pointing at the output file is stored.
pub fn predict_inline(ctx: &JobContext, model_id: RecordId, dataset_id: RecordId) -> Result<PredictionResult> {
    let model = ctx.store.model(model_id)?;
    ensure_ready(&model)?;
    let dataset = ctx.store.dataset(dataset_id)?;

    let frame = DatasetLoader::load(&dataset)?;
    let mut output = predict_frame(ctx, &model, &frame)?;
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let path = ctx
        .media
        .predictions
        .join(format!("{}_predicted_{}.csv", file_stem(&dataset), suffix));
    write_csv(&mut output, &path)?;

    let mut result = PredictionResult::pending(model.id, dataset.id);
    result.status = JobStatus::Completed;
    result.output_file = Some(path.clone());
    result.finished_at = Some(chrono::Utc::now());
    match ctx.store.insert_prediction(result) {
        Ok(stored) => {
            info!(result_id = stored.id, output = %path.display(), "Inline prediction completed");
            Ok(stored)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&path);
            Err(e)
        }
    }
}
