//! Training job runner

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn};

use super::{failure_of, slugify, JobContext};
use crate::automl::{FitRequest, FittedModel, Preset};
use crate::data::DatasetLoader;
use crate::error::Result;
use crate::records::{JobStatus, MlModel, RecordId};

/// Inputs of a training job. The model record is created by the caller
/// before the job is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJob {
    pub model_id: RecordId,
    pub dataset_id: RecordId,
    pub features: Option<Vec<String>>,
    pub time_limit_secs: Option<u64>,
    pub preset: Preset,
}

/// Zero and unset both mean unbounded.
pub fn effective_time_limit(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0).map(Duration::from_secs)
}

/// Fit a model and record the outcome on its `MlModel`.
///
/// A missing model record is logged and ignored. Any other failure marks the
/// model `FAILED` and removes the partial artifact directory.
pub fn run_training(ctx: &JobContext, job: &TrainingJob) {
    let _span = info_span!("job", kind = "training", model_id = job.model_id).entered();

    let Some(model) = ctx.store.find_model(job.model_id) else {
        warn!(model_id = job.model_id, "Model record no longer exists, skipping training");
        return;
    };

    let artifact_dir = ctx.media.models.join(format!("{}_{}", slugify(&model.name), model.id));
    let started = Instant::now();
    info!(
        dataset_id = job.dataset_id,
        target = %model.target,
        preset = %job.preset,
        time_limit_secs = job.time_limit_secs.unwrap_or(0),
        "Training started"
    );

    match fit(ctx, job, &model, &artifact_dir) {
        Ok(fitted) => {
            let duration = started.elapsed().as_secs_f64();
            let features = fitted.features();
            let leaderboard = fitted.leaderboard();
            let updated = ctx.store.update_model(model.id, |m| {
                m.status = JobStatus::Completed;
                m.artifact = Some(artifact_dir.clone());
                m.features = Some(features);
                m.training_duration_secs = Some(duration);
                m.evaluation_metrics = Some(leaderboard);
                m.evaluation_date = Some(Utc::now());
                m.failure = None;
            });
            match updated {
                Ok(_) => info!(duration_secs = duration, artifact = %artifact_dir.display(), "Training completed"),
                Err(e) => {
                    warn!(error = %e, "Model deleted during training, discarding artifact");
                    let _ = std::fs::remove_dir_all(&artifact_dir);
                }
            }
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Training failed");
            if artifact_dir.exists() {
                let _ = std::fs::remove_dir_all(&artifact_dir);
            }
            let failure = failure_of("Training failed", &e);
            if let Err(e) = ctx.store.update_model(model.id, |m| {
                m.status = JobStatus::Failed;
                m.artifact = None;
                m.failure = Some(failure);
            }) {
                warn!(error = %e, "Could not record training failure");
            }
        }
    }
}

fn fit(ctx: &JobContext, job: &TrainingJob, model: &MlModel, artifact_dir: &Path) -> Result<Box<dyn FittedModel>> {
    let dataset = ctx.store.dataset(job.dataset_id)?;
    let data = DatasetLoader::load_for_training(&dataset, job.features.as_deref(), &model.target)?;
    ctx.backend.fit(FitRequest {
        data: &data,
        label: &model.target,
        time_limit: effective_time_limit(job.time_limit_secs),
        preset: job.preset,
        path: artifact_dir,
    })
}
