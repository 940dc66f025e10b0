//! Background job runners
//!
//! Each runner is a plain blocking function of its owning record's id plus
//! stored inputs. Runners catch every failure at their boundary and record it
//! on the record they own; nothing propagates to the caller. [`JobQueue`]
//! dispatches them off the request path.

mod evaluation;
mod import;
mod prediction;
mod queue;
mod training;

pub use evaluation::run_evaluation;
use evaluation::run_evaluation_notify;
pub use import::{import_model, ModelImport};
pub use prediction::{
    ensure_ready, parse_manual_rows, predict_inline, prediction_column, run_prediction, ManualRow,
    PredictionInput, PredictionJob,
};
use prediction::run_prediction_notify;
pub use queue::{Job, JobQueue, QueueConfig};
pub use training::{effective_time_limit, run_training, TrainingJob};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::automl::{Backend, TabularBackend};
use crate::error::WorkbenchError;
use crate::records::{JobFailure, RecordStore};

/// Media directory layout.
#[derive(Debug, Clone)]
pub struct MediaPaths {
    pub root: PathBuf,
    pub datasets: PathBuf,
    pub models: PathBuf,
    pub predictions: PathBuf,
    /// Drop-off directory for artifacts registered through model import.
    pub imports: PathBuf,
}

impl MediaPaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            datasets: root.join("datasets"),
            models: root.join("MLmodels"),
            predictions: root.join("predictions"),
            imports: root.join("imports"),
            root,
        }
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.root, &self.datasets, &self.models, &self.predictions, &self.imports] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Everything a runner needs.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<RecordStore>,
    pub backend: Arc<dyn Backend>,
    pub media: MediaPaths,
}

impl JobContext {
    pub fn new(store: Arc<RecordStore>, media: MediaPaths) -> Self {
        Self { store, backend: Arc::new(TabularBackend::new()), media }
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }
}

/// URL-style slug: lowercase alphanumerics, `-` and `_`; whitespace runs
/// become a single `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() {
            pending_dash = true;
        }
    }
    slug
}

/// Failure descriptor with the error's source chain as the trace.
pub fn failure_of(context: &str, err: &WorkbenchError) -> JobFailure {
    let mut trace = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        trace.push(cause.to_string());
        source = cause.source();
    }
    JobFailure {
        kind: err.kind().to_string(),
        message: format!("{}: {}", context, err),
        trace: (!trace.is_empty()).then(|| trace.join("\ncaused by: ")),
    }
}

/// Failure descriptor for a runner that panicked.
pub fn failure_of_panic(context: &str, payload: &(dyn std::any::Any + Send)) -> JobFailure {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    JobFailure { kind: "panic".to_string(), message: format!("{}: {}", context, detail), trace: None }
}
