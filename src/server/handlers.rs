//! HTTP request handlers

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::automl::Preset;
use crate::data::{
    column_from_json, json_values, loader::csv_bytes, register_dataset, summarize, DatasetLoader,
    NewDataset,
};
use crate::error::WorkbenchError;
use crate::jobs::{
    ensure_ready, import_model, parse_manual_rows, predict_inline, prediction_column, Job,
    ModelImport, PredictionInput, PredictionJob, TrainingJob,
};
use crate::plots;
use crate::records::{
    JobStatus, MlModel, PredictionResult, RecordId, RecordStore, TestResult, VisualizationCache,
};
use crate::status;

use super::error::{Result, ServerError};
use super::state::AppState;

/// Run filesystem or model work off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServerError::Internal(format!("worker task failed: {}", e)))?
        .map_err(ServerError::from)
}

/// Run a record store write off the async runtime; every write flushes the
/// snapshot to disk.
async fn write_records<T, F>(state: &AppState, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&RecordStore) -> crate::error::Result<T> + Send + 'static,
{
    let store = Arc::clone(&state.ctx().store);
    blocking(move || work(&store)).await
}

fn attachment(file_name: &str, content_type: &'static str, bytes: Vec<u8>) -> Result<Response> {
    let disposition = format!("attachment; filename=\"{}\"", file_name);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_str(&disposition)
                    .map_err(|e| ServerError::Internal(format!("Invalid header: {}", e)))?,
            ),
        ],
        bytes,
    )
        .into_response())
}

fn file_stem(path: &FsPath) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("data").to_string()
}

#[derive(Deserialize)]
pub struct ModelFilter {
    model: Option<RecordId>,
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Dataset Handlers
// ============================================================================

/// Register an uploaded CSV file.
///
/// Multipart fields: `file` (required), `name`, `separator`, `encoding`,
/// `description`.
pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut fields: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| ServerError::BadRequest(e.to_string()))? {
        let name = field.name().unwrap_or("file").to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("data.csv").to_string();
            let data = field.bytes().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
            info!(file_name = %file_name, bytes = data.len(), "Received dataset upload");
            upload = Some((file_name, data.to_vec()));
        } else {
            let text = field.text().await.map_err(|e| ServerError::BadRequest(e.to_string()))?;
            fields.insert(name, text);
        }
    }

    let (file_name, bytes) = upload.ok_or_else(|| ServerError::BadRequest("No file uploaded".to_string()))?;
    let mut take = |key: &str| fields.remove(key).filter(|v| !v.trim().is_empty());

    let name = take("name").unwrap_or_else(|| file_stem(FsPath::new(&file_name)));
    let mut new_dataset = NewDataset::new(name, file_name);
    if let Some(separator) = take("separator") {
        new_dataset.separator = separator;
    }
    if let Some(encoding) = take("encoding") {
        new_dataset.encoding = encoding;
    }
    if let Some(description) = take("description") {
        new_dataset.description = description;
    }

    let ctx = state.ctx().clone();
    let dataset = blocking(move || register_dataset(&ctx.store, &ctx.media.datasets, new_dataset, &bytes)).await?;

    Ok(Json(json!({
        "success": true,
        "dataset": status::dataset_summary(&dataset),
    })))
}

pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<Value> {
    let datasets: Vec<Value> = state.store().list_datasets().iter().map(status::dataset_summary).collect();
    Json(json!({ "datasets": datasets }))
}

pub async fn get_dataset(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let dataset = state.store().dataset(id)?;
    Ok(Json(status::dataset_summary(&dataset)))
}

/// Column names in file order, for target and feature pickers.
pub async fn get_dataset_columns(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let dataset = state.store().dataset(id)?;
    Ok(Json(json!({
        "dataset_id": dataset.id,
        "columns": dataset.column_names(),
        "schema": dataset.columns,
    })))
}

fn visualization_json(id: RecordId, cache: &VisualizationCache, cached: bool) -> Value {
    json!({
        "dataset_id": id,
        "cached": cached,
        "stats": cache.stats,
        "preview": cache.preview,
        "plots": cache.plots,
    })
}

/// Statistics, first rows and histograms, served from the dataset's cache
/// when it is still valid.
pub async fn get_dataset_preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let dataset = state.store().dataset(id)?;
    if dataset.visualization.valid {
        return Ok(Json(visualization_json(id, &dataset.visualization, true)));
    }

    let cache = blocking(move || summarize(&DatasetLoader::load(&dataset)?)).await?;
    let stored = cache.clone();
    write_records(&state, move |store| store.update_dataset(id, |d| d.visualization = stored)).await?;
    info!(dataset_id = id, "Dataset visualizations rebuilt");

    Ok(Json(visualization_json(id, &cache, false)))
}

pub async fn invalidate_dataset_cache(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    write_records(&state, move |store| store.update_dataset(id, |d| d.invalidate_visualizations())).await?;
    Ok(Json(json!({
        "success": true,
        "dataset_id": id,
        "message": "Visualization cache invalidated",
    })))
}

// ============================================================================
// Model Handlers
// ============================================================================

#[derive(Deserialize)]
pub struct TrainRequest {
    name: String,
    #[serde(default)]
    description: String,
    dataset: RecordId,
    target: String,
    features: Option<Vec<String>>,
    preset: Option<String>,
    time_limit: Option<u64>,
}

/// Create the model record and dispatch its training job.
pub async fn train_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<Value>> {
    if request.name.trim().is_empty() {
        return Err(ServerError::BadRequest("Model name is required".to_string()));
    }
    let preset: Preset = match request.preset.as_deref() {
        Some(p) if !p.is_empty() => p.parse()?,
        _ => Preset::default(),
    };

    let dataset = state.store().dataset(request.dataset)?;
    if dataset.is_manual_placeholder() {
        return Err(ServerError::BadRequest("Cannot train on the manual prediction placeholder".to_string()));
    }
    if !dataset.columns.is_empty() {
        let missing: Vec<&String> = std::iter::once(&request.target)
            .chain(request.features.iter().flatten())
            .filter(|c| !dataset.has_column(c))
            .collect();
        if !missing.is_empty() {
            return Err(WorkbenchError::Schema(format!(
                "dataset '{}' has no column(s) {:?}",
                dataset.name, missing
            ))
            .into());
        }
    }

    let mut model = MlModel::training(request.name, request.target);
    model.description = request.description;
    model.related_dataset = Some(dataset.id);
    model.preset = preset;
    model.time_limit_secs = request.time_limit;
    let model = write_records(&state, move |store| store.insert_model(model)).await?;

    state.dispatch(Job::Training(TrainingJob {
        model_id: model.id,
        dataset_id: dataset.id,
        features: request.features,
        time_limit_secs: request.time_limit,
        preset,
    }));

    Ok(Json(json!({
        "success": true,
        "model": status::model_status(&model),
        "message": "Training started",
    })))
}

pub async fn import_model_artifact(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModelImport>,
) -> Result<Json<Value>> {
    let ctx = state.ctx().clone();
    let model = blocking(move || import_model(&ctx, request)).await?;
    Ok(Json(json!({
        "success": true,
        "model": status::model_status(&model),
    })))
}

pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let models: Vec<Value> = state.store().list_models().iter().map(status::model_status).collect();
    Json(json!({ "models": models }))
}

/// Status poll for a model.
pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let model = state.store().model(id)?;
    Ok(Json(status::model_status(&model)))
}

/// Feature names for building the manual prediction form.
pub async fn get_model_features(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let model = state.store().model(id)?;
    Ok(Json(json!({
        "model_id": model.id,
        "status": model.status,
        "target": model.target,
        "features": model.features.unwrap_or_default(),
    })))
}

/// Remove a model, its artifact directory, and every test and prediction
/// result that references it.
pub async fn delete_model(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let removal = write_records(&state, move |store| {
        let removal = store.delete_model(id)?;
        if let Some(dir) = removal.model.artifact.as_deref().filter(|d| d.exists()) {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                warn!(model_id = id, error = %e, "Could not remove model artifact");
            }
        }
        for result in &removal.predictions {
            remove_output(result);
        }
        Ok(removal)
    })
    .await?;

    info!(
        model_id = id,
        tests = removal.tests.len(),
        predictions = removal.predictions.len(),
        "Model deleted"
    );
    Ok(Json(json!({
        "success": true,
        "message": format!("Model '{}' deleted", removal.model.name),
        "deleted_tests": removal.tests.len(),
        "deleted_predictions": removal.predictions.len(),
    })))
}

// ============================================================================
// Evaluation Handlers
// ============================================================================

#[derive(Deserialize)]
pub struct TestRequest {
    model: RecordId,
    dataset: RecordId,
}

/// Create a `PENDING` test result and dispatch its evaluation.
pub async fn create_test(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TestRequest>,
) -> Result<Json<Value>> {
    let model = state.store().model(request.model)?;
    if model.status != JobStatus::Completed {
        return Err(ServerError::BadRequest(format!(
            "Only completed models can be evaluated (model {} is {})",
            model.id, model.status
        )));
    }
    let dataset = state.store().dataset(request.dataset)?;
    if !dataset.columns.is_empty() && !dataset.has_column(&model.target) {
        return Err(WorkbenchError::Schema(format!(
            "dataset '{}' has no target column '{}'",
            dataset.name, model.target
        ))
        .into());
    }

    let pending = TestResult::pending(model.id, dataset.id);
    let test = write_records(&state, move |store| store.insert_test(pending)).await?;
    state.dispatch(Job::Evaluation { test_id: test.id });

    Ok(Json(json!({
        "success": true,
        "test": status::test_status(&test),
    })))
}

pub async fn list_tests(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ModelFilter>,
) -> Json<Value> {
    let tests: Vec<Value> = state.store().list_tests(filter.model).iter().map(status::test_status).collect();
    Json(json!({ "tests": tests }))
}

pub async fn get_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let test = state.store().test(id)?;
    Ok(Json(status::test_status(&test)))
}

pub async fn get_test_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let test = state.store().test(id)?;
    let model = state.store().model(test.model_id)?;
    let dataset = state.store().dataset(test.dataset_id)?;
    Ok(Json(status::test_details(&test, &model.name, &dataset.name)))
}

/// The test dataset with the stored predictions appended under the same
/// column name prediction outputs use.
pub async fn download_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Response> {
    let test = state.store().test(id)?;
    let predictions = match (test.status, test.predictions) {
        (JobStatus::Completed, Some(p)) => p,
        _ => return Err(ServerError::BadRequest(format!("Test {} has no predictions to download", id))),
    };
    let model = state.store().model(test.model_id)?;
    let dataset = state.store().dataset(test.dataset_id)?;
    let stem = dataset.file.as_deref().map(file_stem).unwrap_or_else(|| "test".to_string());

    let bytes = blocking(move || {
        let mut df = DatasetLoader::load(&dataset)?;
        if df.height() != predictions.len() {
            return Err(WorkbenchError::Schema(format!(
                "dataset has {} rows but the test stored {} predictions",
                df.height(),
                predictions.len()
            )));
        }
        df.with_column(column_from_json(&prediction_column(&model.target), &predictions))?;
        csv_bytes(&mut df)
    })
    .await?;

    attachment(&format!("{}_test_{}.csv", stem, id), "text/csv", bytes)
}

pub async fn delete_test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let test = write_records(&state, move |store| store.delete_test(id)).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Test {} deleted", test.id),
    })))
}

// ============================================================================
// Prediction Handlers
// ============================================================================

#[derive(Deserialize)]
pub struct PredictRequest {
    model: RecordId,
    dataset: RecordId,
    /// Run inline and return errors directly instead of queueing a job.
    #[serde(default)]
    sync: bool,
}

pub async fn create_prediction(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<Value>> {
    let model = state.store().model(request.model)?;
    ensure_ready(&model)?;
    let dataset = state.store().dataset(request.dataset)?;

    let result = if request.sync {
        let ctx = state.ctx().clone();
        blocking(move || predict_inline(&ctx, model.id, dataset.id)).await?
    } else {
        let pending = PredictionResult::pending(model.id, dataset.id);
        let result = write_records(&state, move |store| store.insert_prediction(pending)).await?;
        state.dispatch(Job::Prediction(PredictionJob {
            result_id: result.id,
            input: PredictionInput::Dataset,
        }));
        result
    };

    Ok(Json(json!({
        "success": true,
        "prediction": status::prediction_status(&result),
    })))
}

/// Form-encoded manual rows: `model` plus `<feature>[<i>]` for each row.
pub async fn create_manual_prediction(
    State(state): State<Arc<AppState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let model_id: RecordId = form
        .get("model")
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ServerError::BadRequest("A model id is required".to_string()))?;
    let model = state.store().model(model_id)?;
    ensure_ready(&model)?;

    let features = model.features.clone().unwrap_or_default();
    let rows = parse_manual_rows(&features, &form)?;
    let model_id = model.id;
    let result = write_records(&state, move |store| {
        let placeholder = store.manual_dataset()?;
        store.insert_prediction(PredictionResult::pending(model_id, placeholder.id))
    })
    .await?;
    info!(result_id = result.id, model_id = model.id, rows = rows.len(), "Manual prediction queued");
    state.dispatch(Job::Prediction(PredictionJob {
        result_id: result.id,
        input: PredictionInput::Manual(rows),
    }));

    Ok(Json(json!({
        "success": true,
        "prediction": status::prediction_status(&result),
    })))
}

pub async fn list_predictions(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ModelFilter>,
) -> Json<Value> {
    let predictions: Vec<Value> = state
        .store()
        .list_predictions(filter.model)
        .iter()
        .map(status::prediction_status)
        .collect();
    Json(json!({ "predictions": predictions }))
}

pub async fn get_prediction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    let result = state.store().prediction(id)?;
    Ok(Json(status::prediction_status(&result)))
}

fn completed_output(result: &PredictionResult) -> Result<&FsPath> {
    match (result.status, result.output_file.as_deref()) {
        (JobStatus::Completed, Some(path)) => Ok(path),
        _ => Err(ServerError::BadRequest(format!(
            "Prediction {} has no output (status {})",
            result.id, result.status
        ))),
    }
}

pub async fn download_prediction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Response> {
    let result = state.store().prediction(id)?;
    let path = completed_output(&result)?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|_| ServerError::NotFound(format!("Output file for prediction {} is missing", id)))?;
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("predictions.csv");
    attachment(file_name, "text/csv", bytes)
}

#[derive(Deserialize)]
pub struct PlotQuery {
    feature: String,
}

/// One input feature plotted against the predicted column.
pub async fn get_prediction_plot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
    Query(query): Query<PlotQuery>,
) -> Result<Json<Value>> {
    let result = state.store().prediction(id)?;
    let path = completed_output(&result)?.to_path_buf();
    let model = state.store().model(result.model_id)?;

    let feature = query.feature.clone();
    let target = model.target.clone();
    let plot = blocking(move || {
        let df = DatasetLoader::read(&path, ",", "utf-8")?;
        let values = json_values(df.column(&feature)?.as_materialized_series())?;
        let predicted = json_values(df.column(&prediction_column(&target))?.as_materialized_series())?;
        Ok(plots::feature_vs_prediction(&feature, &values, &target, &predicted))
    })
    .await?;

    Ok(Json(json!({
        "prediction_id": id,
        "feature": query.feature,
        "plot": plot,
    })))
}

fn remove_output(result: &PredictionResult) {
    if let Some(path) = result.output_file.as_deref().filter(|p| p.exists()) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(result_id = result.id, error = %e, "Could not remove prediction output");
        }
    }
}

pub async fn delete_prediction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RecordId>,
) -> Result<Json<Value>> {
    write_records(&state, move |store| {
        let result = store.delete_prediction(id)?;
        remove_output(&result);
        Ok(())
    })
    .await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Prediction {} deleted", id),
    })))
}
