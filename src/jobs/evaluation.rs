//! Evaluation job runner

use serde_json::{json, Value};
use tracing::{error, info, info_span, warn};

use super::{failure_of, JobContext};
use crate::automl::Leaderboard;
use crate::data::{json_values, DatasetLoader};
use crate::error::{Result, WorkbenchError};
use crate::plots;
use crate::records::{JobStatus, TestResult};

struct Evaluated {
    metrics: Value,
    predictions: Vec<Value>,
    leaderboard: Leaderboard,
    plot: Option<String>,
}

/// Score a completed model against a labeled dataset.
///
/// The record is marked `RUNNING` before anything slow happens. On failure
/// the metrics payload becomes `{"error", "kind", "trace"}` and the other
/// payload fields are left untouched.
pub fn run_evaluation(ctx: &JobContext, test_id: u64) {
    run_evaluation_notify(ctx, test_id, || {})
}

/// [`run_evaluation`], calling `started` once the record is `RUNNING`.
pub(crate) fn run_evaluation_notify(ctx: &JobContext, test_id: u64, started: impl FnOnce()) {
    let _span = info_span!("job", kind = "evaluation", test_id).entered();

    let test = match ctx.store.start_test(test_id) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "Test result missing, skipping evaluation");
            return;
        }
    };
    started();
    info!(model_id = test.model_id, dataset_id = test.dataset_id, "Evaluation started");

    let outcome = evaluate(ctx, &test);
    let applied = match outcome {
        Ok(done) => {
            let n = done.predictions.len();
            let applied = ctx.store.finish_test(test_id, |t| {
                t.evaluation_metrics = Some(done.metrics);
                t.predictions = Some(done.predictions);
                t.leaderboard = Some(done.leaderboard);
                t.plot = done.plot;
                t.status = JobStatus::Completed;
            });
            if matches!(applied, Ok(true)) {
                info!(predictions = n, "Evaluation completed");
            }
            applied
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Evaluation failed");
            let failure = failure_of("Evaluation failed", &e);
            ctx.store.finish_test(test_id, |t| {
                t.evaluation_metrics = Some(json!({
                    "error": failure.message,
                    "kind": failure.kind,
                    "trace": failure.trace,
                }));
                t.status = JobStatus::Failed;
            })
        }
    };
    match applied {
        Ok(true) => {}
        Ok(false) => warn!("Test result no longer running, evaluation result discarded"),
        Err(e) => warn!(error = %e, "Could not record evaluation outcome"),
    }
}

fn evaluate(ctx: &JobContext, test: &TestResult) -> Result<Evaluated> {
    let model = ctx.store.model(test.model_id)?;
    let dataset = ctx.store.dataset(test.dataset_id)?;
    let data = DatasetLoader::load(&dataset)?;

    let artifact = model
        .artifact
        .as_deref()
        .ok_or_else(|| WorkbenchError::ArtifactLoad(format!("model {} has no artifact", model.id)))?;
    let fitted = ctx.backend.load(artifact)?;
    let label = fitted.label().to_string();

    let scorecard = fitted.evaluate(&data)?;
    let leaderboard = fitted.leaderboard_on(&data)?;
    let inputs = data.drop(&label)?;
    let predictions = fitted.predict(&inputs)?;

    let real = json_values(data.column(&label)?.as_materialized_series())?;
    let plot = plots::predicted_vs_real(&real, &predictions);

    Ok(Evaluated { metrics: serde_json::to_value(scorecard)?, predictions, leaderboard, plot })
}
