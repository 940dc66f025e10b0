//! Integration test: job runners, queue and records

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mlworkbench::automl::{Backend, FitRequest, FittedModel, Preset, TabularBackend};
use mlworkbench::data::{register_dataset, DatasetLoader, NewDataset};
use mlworkbench::error::Result;
use mlworkbench::jobs::{
    import_model, parse_manual_rows, predict_inline, run_evaluation, run_prediction, run_training, Job,
    JobContext, JobQueue, MediaPaths, ModelImport, PredictionInput, PredictionJob, QueueConfig,
    TrainingJob,
};
use mlworkbench::records::{Dataset, JobStatus, MlModel, PredictionResult, RecordStore, TestResult};
use tempfile::TempDir;

const REGIONS: [&str; 4] = ["north", "south", "east", "west"];

/// Revenue is roughly linear in units with a per-region offset.
fn sales_csv(rows: usize, offset: usize) -> String {
    let mut csv = String::from("region,units,revenue\n");
    for i in offset..offset + rows {
        let region = REGIONS[i % REGIONS.len()];
        let units = (i * 7) % 20 + 1;
        let revenue = units as f64 * 10.0 + (i % REGIONS.len()) as f64 * 5.0 + (i % 3) as f64 * 0.5;
        csv.push_str(&format!("{},{},{}\n", region, units, revenue));
    }
    csv
}

struct Workbench {
    _dir: TempDir,
    ctx: JobContext,
}

fn workbench() -> Workbench {
    let dir = TempDir::new().unwrap();
    let media = MediaPaths::new(dir.path());
    media.ensure().unwrap();
    let ctx = JobContext::new(Arc::new(RecordStore::in_memory()), media);
    Workbench { _dir: dir, ctx }
}

fn add_dataset(ctx: &JobContext, name: &str, csv: &str) -> Dataset {
    register_dataset(
        &ctx.store,
        &ctx.media.datasets,
        NewDataset::new(name, format!("{}.csv", name)),
        csv.as_bytes(),
    )
    .unwrap()
}

fn new_model(ctx: &JobContext, dataset: &Dataset) -> MlModel {
    let mut model = MlModel::training("Sales model", "revenue");
    model.related_dataset = Some(dataset.id);
    ctx.store.insert_model(model).unwrap()
}

fn training_job(model: &MlModel, dataset: &Dataset, time_limit_secs: Option<u64>) -> TrainingJob {
    TrainingJob {
        model_id: model.id,
        dataset_id: dataset.id,
        features: Some(vec!["region".to_string(), "units".to_string()]),
        time_limit_secs,
        preset: Preset::MediumQuality,
    }
}

fn trained_model(ctx: &JobContext) -> MlModel {
    let dataset = add_dataset(ctx, "sales", &sales_csv(40, 0));
    let model = new_model(ctx, &dataset);
    run_training(ctx, &training_job(&model, &dataset, Some(0)));
    ctx.store.model(model.id).unwrap()
}

// ============================================================================
// Training
// ============================================================================

#[test]
fn test_training_completes_with_features_and_leaderboard() {
    let wb = workbench();
    let model = trained_model(&wb.ctx);

    assert_eq!(model.status, JobStatus::Completed);
    let mut features = model.features.clone().unwrap();
    features.sort();
    assert_eq!(features, vec!["region", "units"]);

    let leaderboard = model.evaluation_metrics.as_ref().unwrap();
    assert!(!leaderboard.is_empty());
    assert!(model.artifact.as_ref().unwrap().is_dir());
    assert!(model.training_duration_secs.is_some());
    assert!(model.failure.is_none());
}

#[test]
fn test_zero_budget_matches_unbounded() {
    let wb = workbench();
    let dataset = add_dataset(&wb.ctx, "sales", &sales_csv(40, 0));

    let zero = new_model(&wb.ctx, &dataset);
    run_training(&wb.ctx, &training_job(&zero, &dataset, Some(0)));
    let unset = new_model(&wb.ctx, &dataset);
    run_training(&wb.ctx, &training_job(&unset, &dataset, None));

    let zero = wb.ctx.store.model(zero.id).unwrap();
    let unset = wb.ctx.store.model(unset.id).unwrap();
    assert_eq!(zero.status, JobStatus::Completed);
    assert_eq!(unset.status, JobStatus::Completed);

    let names = |m: &MlModel| {
        let lb = m.evaluation_metrics.as_ref().unwrap();
        lb.column(lb.name_index().unwrap())
    };
    assert_eq!(names(&zero), names(&unset));
}

#[test]
fn test_unreadable_dataset_fails_training() {
    let wb = workbench();
    let mut ghost = Dataset::new("ghost");
    ghost.file = Some(wb.ctx.media.datasets.join("missing.csv"));
    let ghost = wb.ctx.store.insert_dataset(ghost).unwrap();
    let model = new_model(&wb.ctx, &ghost);

    run_training(&wb.ctx, &training_job(&model, &ghost, None));

    let model = wb.ctx.store.model(model.id).unwrap();
    assert_eq!(model.status, JobStatus::Failed);
    assert!(model.artifact.is_none());
    let failure = model.failure.unwrap();
    assert_eq!(failure.kind, "data_access_error");
    assert!(!failure.message.is_empty());
}

#[test]
fn test_missing_target_fails_training() {
    let wb = workbench();
    let dataset = add_dataset(&wb.ctx, "sales", &sales_csv(20, 0));
    let mut model = MlModel::training("Wrong target", "profit");
    model.related_dataset = Some(dataset.id);
    let model = wb.ctx.store.insert_model(model).unwrap();

    run_training(
        &wb.ctx,
        &TrainingJob { model_id: model.id, dataset_id: dataset.id, features: None, time_limit_secs: None, preset: Preset::default() },
    );

    let model = wb.ctx.store.model(model.id).unwrap();
    assert_eq!(model.status, JobStatus::Failed);
    assert_eq!(model.failure.unwrap().kind, "schema_error");
}

#[test]
fn test_training_without_model_record_is_a_no_op() {
    let wb = workbench();
    let dataset = add_dataset(&wb.ctx, "sales", &sales_csv(20, 0));
    let job = TrainingJob { model_id: 999, dataset_id: dataset.id, features: None, time_limit_secs: None, preset: Preset::default() };

    run_training(&wb.ctx, &job);

    assert!(wb.ctx.store.list_models().is_empty());
    assert_eq!(std::fs::read_dir(&wb.ctx.media.models).unwrap().count(), 0);
}

// ============================================================================
// Import
// ============================================================================

/// Train a model and move its artifact into the import directory as `sales`.
fn staged_artifact(ctx: &JobContext) {
    let trained = trained_model(ctx);
    std::fs::rename(trained.artifact.unwrap(), ctx.media.imports.join("sales")).unwrap();
}

fn import_request(artifact_path: &str) -> ModelImport {
    ModelImport {
        name: "Imported model".to_string(),
        description: String::new(),
        target: "revenue".to_string(),
        features: None,
        artifact_path: artifact_path.into(),
        related_dataset: None,
    }
}

#[test]
fn test_import_creates_completed_model() {
    let wb = workbench();
    staged_artifact(&wb.ctx);

    let model = import_model(&wb.ctx, import_request("sales")).unwrap();

    assert_eq!(model.status, JobStatus::Completed);
    let stored = wb.ctx.store.model(model.id).unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    let artifact = stored.artifact.unwrap();
    assert!(artifact.starts_with(&wb.ctx.media.models));
    assert!(artifact.is_dir());
    let mut features = stored.features.unwrap();
    features.sort();
    assert_eq!(features, vec!["region", "units"]);
    assert!(stored.evaluation_metrics.is_some());
}

#[test]
fn test_failed_import_copy_stores_no_record() {
    let wb = workbench();
    staged_artifact(&wb.ctx);
    let before = wb.ctx.store.list_models().len();
    // the next model id is 2; a file at its artifact path makes the copy fail
    std::fs::write(wb.ctx.media.models.join("imported-model_2"), b"occupied").unwrap();

    assert!(import_model(&wb.ctx, import_request("sales")).is_err());

    let models = wb.ctx.store.list_models();
    assert_eq!(models.len(), before);
    assert!(models.iter().all(|m| m.status != JobStatus::Running));
}

#[test]
fn test_import_rejects_paths_outside_import_dir() {
    let wb = workbench();
    staged_artifact(&wb.ctx);

    let escape = import_model(&wb.ctx, import_request("../MLmodels")).unwrap_err();
    assert_eq!(escape.kind(), "validation_error");
    let absolute = wb.ctx.media.datasets.display().to_string();
    let err = import_model(&wb.ctx, import_request(&absolute)).unwrap_err();
    assert_eq!(err.kind(), "validation_error");
    assert_eq!(wb.ctx.store.list_models().len(), 1);
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_evaluation_on_holdout_completes() {
    let wb = workbench();
    let model = trained_model(&wb.ctx);
    let holdout = add_dataset(&wb.ctx, "holdout", &sales_csv(12, 100));

    let test = wb.ctx.store.insert_test(TestResult::pending(model.id, holdout.id)).unwrap();
    assert_eq!(test.status, JobStatus::Pending);

    run_evaluation(&wb.ctx, test.id);

    let test = wb.ctx.store.test(test.id).unwrap();
    assert_eq!(test.status, JobStatus::Completed);
    assert_eq!(test.predictions.as_ref().unwrap().len(), 12);
    assert!(test.plot.is_some());
    assert!(test.evaluation_metrics.as_ref().unwrap().get("root_mean_squared_error").is_some());
    assert!(!test.leaderboard.as_ref().unwrap().is_empty());
    assert!(test.finished_at.is_some());
}

#[test]
fn test_evaluation_without_target_column_fails() {
    let wb = workbench();
    let model = trained_model(&wb.ctx);
    let unlabeled = add_dataset(&wb.ctx, "unlabeled", "region,units\nnorth,5\nsouth,12\n");

    let test = wb.ctx.store.insert_test(TestResult::pending(model.id, unlabeled.id)).unwrap();
    run_evaluation(&wb.ctx, test.id);

    let test = wb.ctx.store.test(test.id).unwrap();
    assert_eq!(test.status, JobStatus::Failed);
    let metrics = test.evaluation_metrics.unwrap();
    assert!(metrics.get("error").is_some());
    assert_eq!(metrics["kind"], "schema_error");
    assert!(test.predictions.is_none());
}

// ============================================================================
// Prediction
// ============================================================================

#[test]
fn test_manual_prediction_appends_column() {
    let wb = workbench();
    let model = trained_model(&wb.ctx);

    let form: HashMap<String, String> = [
        ("model", "1"),
        ("region[0]", "north"),
        ("units[0]", "5"),
        ("region[1]", "south"),
        ("units[1]", "12"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let rows = parse_manual_rows(model.features.as_deref().unwrap(), &form).unwrap();
    assert_eq!(rows.len(), 2);

    let placeholder = wb.ctx.store.manual_dataset().unwrap();
    let result = wb.ctx.store.insert_prediction(PredictionResult::pending(model.id, placeholder.id)).unwrap();
    run_prediction(&wb.ctx, &PredictionJob { result_id: result.id, input: PredictionInput::Manual(rows) });

    let result = wb.ctx.store.prediction(result.id).unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    let output = result.output_file.unwrap();
    assert_eq!(
        output.file_name().unwrap().to_str().unwrap(),
        format!("manual_prediction_{}_{}.csv", model.id, result.id)
    );

    let df = DatasetLoader::read(&output, ",", "utf-8").unwrap();
    assert_eq!(df.height(), 2);
    assert_eq!(df.width(), 3);
    assert!(df.column("predicted_revenue").is_ok());

    // the placeholder never shows up as a dataset
    assert!(wb.ctx.store.list_datasets().iter().all(|d| d.id != placeholder.id));
}

#[test]
fn test_dataset_prediction_keeps_input_columns() {
    let wb = workbench();
    let model = trained_model(&wb.ctx);
    let fresh = add_dataset(&wb.ctx, "fresh", &sales_csv(6, 200));

    let result = wb.ctx.store.insert_prediction(PredictionResult::pending(model.id, fresh.id)).unwrap();
    run_prediction(&wb.ctx, &PredictionJob { result_id: result.id, input: PredictionInput::Dataset });

    let result = wb.ctx.store.prediction(result.id).unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    let df = DatasetLoader::read(result.output_file.as_ref().unwrap(), ",", "utf-8").unwrap();
    assert_eq!(df.height(), 6);
    let names: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
    assert_eq!(names, vec!["region", "units", "revenue", "predicted_revenue"]);
}

#[test]
fn test_manual_prediction_on_untrained_model_fails() {
    let wb = workbench();
    let dataset = add_dataset(&wb.ctx, "sales", &sales_csv(20, 0));
    let model = new_model(&wb.ctx, &dataset);
    let placeholder = wb.ctx.store.manual_dataset().unwrap();
    let result = wb.ctx.store.insert_prediction(PredictionResult::pending(model.id, placeholder.id)).unwrap();

    run_prediction(&wb.ctx, &PredictionJob { result_id: result.id, input: PredictionInput::Manual(vec![]) });

    let result = wb.ctx.store.prediction(result.id).unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert!(result.output_file.is_none());
    assert!(result.error_message.unwrap().contains("not ready"));
}

#[test]
fn test_inline_prediction_errors_create_no_record() {
    let wb = workbench();
    let dataset = add_dataset(&wb.ctx, "sales", &sales_csv(20, 0));
    let model = new_model(&wb.ctx, &dataset);

    assert!(predict_inline(&wb.ctx, model.id, dataset.id).is_err());
    assert!(wb.ctx.store.list_predictions(None).is_empty());
}

#[test]
fn test_inline_prediction_records_completed_result() {
    let wb = workbench();
    let model = trained_model(&wb.ctx);
    let fresh = add_dataset(&wb.ctx, "fresh", &sales_csv(5, 300));

    let result = predict_inline(&wb.ctx, model.id, fresh.id).unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert!(result.output_file.unwrap().exists());
    assert_eq!(wb.ctx.store.list_predictions(Some(model.id)).len(), 1);
}

// ============================================================================
// Queue
// ============================================================================

/// Fails loudly instead of returning an error.
struct Exploding;

impl Backend for Exploding {
    fn fit(&self, _request: FitRequest<'_>) -> Result<Box<dyn FittedModel>> {
        panic!("solver diverged")
    }

    fn load(&self, _path: &Path) -> Result<Box<dyn FittedModel>> {
        panic!("artifact reader crashed")
    }
}

/// Delegates to the default backend after a delay on load.
struct SlowLoad(Duration);

impl Backend for SlowLoad {
    fn fit(&self, request: FitRequest<'_>) -> Result<Box<dyn FittedModel>> {
        TabularBackend::new().fit(request)
    }

    fn load(&self, path: &Path) -> Result<Box<dyn FittedModel>> {
        std::thread::sleep(self.0);
        TabularBackend::new().load(path)
    }
}

#[tokio::test]
async fn test_queue_runs_training_in_background() {
    let wb = workbench();
    let dataset = add_dataset(&wb.ctx, "sales", &sales_csv(30, 0));
    let model = new_model(&wb.ctx, &dataset);
    let queue = JobQueue::new(wb.ctx.clone(), QueueConfig::default());

    queue.dispatch(Job::Training(training_job(&model, &dataset, None))).await.unwrap();

    assert_eq!(wb.ctx.store.model(model.id).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_queue_marks_panicking_job_failed() {
    let wb = workbench();
    let dataset = add_dataset(&wb.ctx, "sales", &sales_csv(30, 0));
    let model = new_model(&wb.ctx, &dataset);
    let ctx = wb.ctx.clone().with_backend(Arc::new(Exploding));
    let queue = JobQueue::new(ctx, QueueConfig::default());

    queue.dispatch(Job::Training(training_job(&model, &dataset, None))).await.unwrap();

    let model = wb.ctx.store.model(model.id).unwrap();
    assert_eq!(model.status, JobStatus::Failed);
    let failure = model.failure.unwrap();
    assert_eq!(failure.kind, "panic");
    assert!(failure.message.contains("solver diverged"));
}

#[tokio::test]
async fn test_queue_timeout_fails_evaluation_and_discards_late_result() {
    let wb = workbench();
    let model = trained_model(&wb.ctx);
    let holdout = add_dataset(&wb.ctx, "holdout", &sales_csv(12, 100));
    let test = wb.ctx.store.insert_test(TestResult::pending(model.id, holdout.id)).unwrap();

    let ctx = wb.ctx.clone().with_backend(Arc::new(SlowLoad(Duration::from_millis(400))));
    let queue = JobQueue::new(
        ctx,
        QueueConfig { max_concurrent: 1, job_timeout: Some(Duration::from_millis(50)) },
    );
    queue.dispatch(Job::Evaluation { test_id: test.id }).await.unwrap();

    let failed = wb.ctx.store.test(test.id).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.evaluation_metrics.as_ref().unwrap()["kind"], "timeout");

    // the worker finishes later; its result must not overwrite the failure
    tokio::time::sleep(Duration::from_millis(800)).await;
    let after = wb.ctx.store.test(test.id).unwrap();
    assert_eq!(after.status, JobStatus::Failed);
    assert!(after.predictions.is_none());
}

#[test]
fn test_queue_timeout_clock_starts_when_record_is_running() {
    // a single blocking thread, so the evaluation waits behind `busy`
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .max_blocking_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let wb = workbench();
    let model = trained_model(&wb.ctx);
    let holdout = add_dataset(&wb.ctx, "holdout", &sales_csv(12, 100));
    let test = wb.ctx.store.insert_test(TestResult::pending(model.id, holdout.id)).unwrap();
    let queue = JobQueue::new(
        wb.ctx.clone(),
        QueueConfig { max_concurrent: 2, job_timeout: Some(Duration::from_secs(2)) },
    );

    runtime.block_on(async {
        let busy = tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_millis(2500)));
        queue.dispatch(Job::Evaluation { test_id: test.id }).await.unwrap();
        busy.await.unwrap();
    });

    // waiting for a thread longer than the limit is not a timeout
    let done = wb.ctx.store.test(test.id).unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.predictions.unwrap().len(), 12);
}
