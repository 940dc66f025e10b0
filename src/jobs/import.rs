//! Registering an externally trained artifact as a model

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{slugify, JobContext};
use crate::error::{Result, WorkbenchError};
use crate::records::{JobStatus, MlModel, RecordId};

#[derive(Debug, Clone, Deserialize)]
pub struct ModelImport {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub target: String,
    pub features: Option<Vec<String>>,
    pub artifact_path: PathBuf,
    pub related_dataset: Option<RecordId>,
}

fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Resolve `path` against the import directory and refuse anything that
/// ends up outside it.
fn resolve_source(ctx: &JobContext, path: &Path) -> Result<PathBuf> {
    let root = ctx.media.imports.canonicalize()?;
    let candidate = if path.is_relative() { ctx.media.imports.join(path) } else { path.to_path_buf() };
    let resolved = candidate.canonicalize().map_err(|e| {
        WorkbenchError::ArtifactLoad(format!("{}: {}", path.display(), e))
    })?;
    if !resolved.starts_with(&root) || resolved == root {
        return Err(WorkbenchError::Validation(format!(
            "artifact must be a directory inside {}",
            ctx.media.imports.display()
        )));
    }
    Ok(resolved)
}

/// Copy a fitted artifact into the model store and create a `COMPLETED`
/// model for it.
///
/// `artifact_path` is taken relative to the media import directory. The
/// artifact must load and its label must equal `target`. Features default
/// to the artifact's own feature list. The record is written once, already
/// complete, after the copy has succeeded.
pub fn import_model(ctx: &JobContext, request: ModelImport) -> Result<MlModel> {
    if request.name.trim().is_empty() {
        return Err(WorkbenchError::Validation("model name is required".to_string()));
    }
    let source = resolve_source(ctx, &request.artifact_path)?;
    let fitted = ctx.backend.load(&source)?;
    if fitted.label() != request.target {
        return Err(WorkbenchError::Validation(format!(
            "artifact predicts '{}', not '{}'",
            fitted.label(),
            request.target
        )));
    }
    if let Some(dataset_id) = request.related_dataset {
        ctx.store.dataset(dataset_id)?;
    }

    let id = ctx.store.reserve_model_id()?;
    let artifact_dir = ctx.media.models.join(format!("{}_{}", slugify(&request.name), id));
    if let Err(e) = copy_dir(&source, &artifact_dir) {
        let _ = fs::remove_dir_all(&artifact_dir);
        return Err(e.into());
    }

    let mut model = MlModel::training(request.name, request.target);
    model.description = request.description;
    model.related_dataset = request.related_dataset;
    model.status = JobStatus::Completed;
    model.artifact = Some(artifact_dir.clone());
    model.features = Some(request.features.unwrap_or_else(|| fitted.features()));
    model.evaluation_metrics = Some(fitted.leaderboard());
    let model = match ctx.store.insert_model_reserved(id, model) {
        Ok(model) => model,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&artifact_dir) {
                warn!(artifact = %artifact_dir.display(), error = %cleanup, "Could not remove copied artifact");
            }
            return Err(e);
        }
    };
    info!(
        model_id = model.id,
        source = %source.display(),
        artifact = %artifact_dir.display(),
        "Model imported"
    );
    Ok(model)
}
