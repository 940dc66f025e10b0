//! Background dispatch
//!
//! Jobs run on tokio's blocking pool, bounded by a semaphore. The caller must
//! have committed the job's record before calling [`JobQueue::dispatch`].

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{
    failure_of, failure_of_panic, run_evaluation_notify, run_prediction_notify, run_training,
    JobContext, PredictionJob, TrainingJob,
};
use crate::error::WorkbenchError;
use crate::records::{JobFailure, JobStatus, RecordId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Job {
    Training(TrainingJob),
    Evaluation { test_id: RecordId },
    Prediction(PredictionJob),
}

impl Job {
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Training(_) => "training",
            Job::Evaluation { .. } => "evaluation",
            Job::Prediction(_) => "prediction",
        }
    }

    pub fn record_id(&self) -> RecordId {
        match self {
            Job::Training(j) => j.model_id,
            Job::Evaluation { test_id } => *test_id,
            Job::Prediction(j) => j.result_id,
        }
    }

    /// Run to completion on the current thread.
    pub fn run(&self, ctx: &JobContext) {
        self.run_notify(ctx, || {})
    }

    /// Like [`Job::run`]; `started` fires once the owned record is `RUNNING`.
    fn run_notify(&self, ctx: &JobContext, started: impl FnOnce()) {
        match self {
            Job::Training(job) => {
                started();
                run_training(ctx, job)
            }
            Job::Evaluation { test_id } => run_evaluation_notify(ctx, *test_id, started),
            Job::Prediction(job) => run_prediction_notify(ctx, job, started),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_concurrent: usize,
    /// Wall-clock limit for evaluation and prediction jobs. Training is
    /// bounded by its own time budget instead.
    pub job_timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_concurrent: 2, job_timeout: None }
    }
}

#[derive(Clone)]
pub struct JobQueue {
    ctx: JobContext,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl JobQueue {
    pub fn new(ctx: JobContext, config: QueueConfig) -> Self {
        Self {
            ctx,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            timeout: config.job_timeout,
        }
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }

    /// Start `job` in the background. The returned handle resolves once the
    /// job's record has reached a terminal state.
    pub fn dispatch(&self, job: Job) -> JoinHandle<()> {
        let queue = self.clone();
        info!(kind = job.kind(), record_id = job.record_id(), "Job dispatched");
        tokio::spawn(async move { queue.execute(job).await })
    }

    async fn execute(self, job: Job) {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                error!(kind = job.kind(), "Job queue closed, dropping job");
                return;
            }
        };

        let ctx = self.ctx.clone();
        let worker_job = job.clone();
        let (started_tx, started_rx) = oneshot::channel();
        // the permit is held for as long as the worker thread runs, timed out or not
        let mut handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            worker_job.run_notify(&ctx, move || {
                let _ = started_tx.send(());
            });
        });

        let limit = match job {
            Job::Training(_) => None,
            _ => self.timeout,
        };
        // the clock starts once the record is RUNNING, not while the job
        // waits for a blocking thread
        let limit = match limit {
            Some(limit) => started_rx.await.ok().map(|_| limit),
            None => None,
        };
        let joined = match limit {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    let secs = limit.as_secs();
                    warn!(kind = job.kind(), record_id = job.record_id(), limit_secs = secs, "Job timed out");
                    self.record_failure(&job, failure_of("Job aborted", &WorkbenchError::Timeout(secs)));
                    return;
                }
            },
            None => handle.await,
        };

        if let Err(join_err) = joined {
            if join_err.is_panic() {
                let failure = failure_of_panic("Job panicked", join_err.into_panic().as_ref());
                error!(kind = job.kind(), record_id = job.record_id(), message = %failure.message, "Job panicked");
                self.record_failure(&job, failure);
            } else {
                warn!(kind = job.kind(), record_id = job.record_id(), "Job cancelled");
            }
        }
    }

    /// Fail the job's record if it has not already reached a terminal state.
    fn record_failure(&self, job: &Job, failure: JobFailure) {
        let store = &self.ctx.store;
        let outcome = match job {
            Job::Training(j) => store
                .update_model(j.model_id, |m| {
                    if m.status == JobStatus::Running {
                        m.status = JobStatus::Failed;
                        m.artifact = None;
                        m.failure = Some(failure);
                    }
                })
                .map(|_| true),
            Job::Evaluation { test_id } => store.finish_test(*test_id, |t| {
                t.evaluation_metrics = Some(json!({
                    "error": failure.message,
                    "kind": failure.kind,
                    "trace": failure.trace,
                }));
                t.status = JobStatus::Failed;
            }),
            Job::Prediction(j) => store.finish_prediction(j.result_id, |r| {
                r.error_message = Some(failure.message);
                r.status = JobStatus::Failed;
            }),
        };
        if let Err(e) = outcome {
            warn!(kind = job.kind(), error = %e, "Could not record job failure");
        }
    }
}
