//! Record store
//!
//! Four tables behind one `parking_lot::RwLock`. When opened on a path the
//! whole store is written as a JSON snapshot after every mutation (temp file
//! then rename). Mutations are staged on a copy of the tables and only become
//! visible once the snapshot is on disk, so a failed write leaves no trace.

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{
    Dataset, JobStatus, MlModel, PredictionResult, RecordId, TestResult, MANUAL_DATASET_NAME,
};
use crate::error::{Result, WorkbenchError};

trait Record: Clone + Serialize + DeserializeOwned {
    const TABLE: &'static str;
    fn set_id(&mut self, id: RecordId);
}

impl Record for Dataset {
    const TABLE: &'static str = "dataset";
    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

impl Record for MlModel {
    const TABLE: &'static str = "model";
    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

impl Record for TestResult {
    const TABLE: &'static str = "test_result";
    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

impl Record for PredictionResult {
    const TABLE: &'static str = "prediction_result";
    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound = "T: Record")]
struct Table<T: Record> {
    next_id: RecordId,
    rows: BTreeMap<RecordId, T>,
}

impl<T: Record> Default for Table<T> {
    fn default() -> Self {
        Self { next_id: 1, rows: BTreeMap::new() }
    }
}

impl<T: Record> Table<T> {
    fn insert(&mut self, mut row: T) -> T {
        let id = self.next_id;
        self.next_id += 1;
        row.set_id(id);
        self.rows.insert(id, row.clone());
        row
    }

    fn get(&self, id: RecordId) -> Result<&T> {
        self.rows.get(&id).ok_or_else(|| WorkbenchError::not_found(T::TABLE, id))
    }

    fn get_mut(&mut self, id: RecordId) -> Result<&mut T> {
        self.rows.get_mut(&id).ok_or_else(|| WorkbenchError::not_found(T::TABLE, id))
    }

    /// Take an id without inserting a row; [`Table::insert_reserved`] fills it.
    fn reserve(&mut self) -> RecordId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert_reserved(&mut self, id: RecordId, mut row: T) -> Result<T> {
        if id >= self.next_id || self.rows.contains_key(&id) {
            return Err(WorkbenchError::Validation(format!(
                "{} id {} was not reserved",
                T::TABLE,
                id
            )));
        }
        row.set_id(id);
        self.rows.insert(id, row.clone());
        Ok(row)
    }

    fn remove(&mut self, id: RecordId) -> Result<T> {
        self.rows.remove(&id).ok_or_else(|| WorkbenchError::not_found(T::TABLE, id))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    datasets: Table<Dataset>,
    #[serde(default)]
    models: Table<MlModel>,
    #[serde(default)]
    tests: Table<TestResult>,
    #[serde(default)]
    predictions: Table<PredictionResult>,
}

/// Everything removed by a model deletion.
#[derive(Debug, Clone)]
pub struct ModelRemoval {
    pub model: MlModel,
    pub tests: Vec<TestResult>,
    pub predictions: Vec<PredictionResult>,
}

pub struct RecordStore {
    tables: RwLock<Tables>,
    snapshot: Option<PathBuf>,
}

impl RecordStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self { tables: RwLock::new(Tables::default()), snapshot: None }
    }

    /// Open (or create) a store persisted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            Tables::default()
        };
        Ok(Self { tables: RwLock::new(tables), snapshot: Some(path) })
    }

    fn persist(&self, tables: &Tables) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(tables)?)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Record snapshot written");
        Ok(())
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Tables) -> Result<R>) -> Result<R> {
        let mut tables = self.tables.write();
        if self.snapshot.is_none() {
            return f(&mut tables);
        }
        let mut staged = tables.clone();
        let out = f(&mut staged)?;
        self.persist(&staged)?;
        *tables = staged;
        Ok(out)
    }

    // ========================================================================
    // Datasets
    // ========================================================================

    pub fn insert_dataset(&self, dataset: Dataset) -> Result<Dataset> {
        self.mutate(|t| Ok(t.datasets.insert(dataset)))
    }

    pub fn dataset(&self, id: RecordId) -> Result<Dataset> {
        self.tables.read().datasets.get(id).cloned()
    }

    /// Every dataset except the manual-prediction placeholder, oldest first.
    pub fn list_datasets(&self) -> Vec<Dataset> {
        self.tables
            .read()
            .datasets
            .rows
            .values()
            .filter(|d| !d.is_manual_placeholder())
            .cloned()
            .collect()
    }

    pub fn update_dataset(&self, id: RecordId, f: impl FnOnce(&mut Dataset)) -> Result<Dataset> {
        self.mutate(|t| {
            let row = t.datasets.get_mut(id)?;
            f(row);
            Ok(row.clone())
        })
    }

    /// Get or create the shared placeholder dataset for manual predictions.
    pub fn manual_dataset(&self) -> Result<Dataset> {
        if let Some(existing) = self
            .tables
            .read()
            .datasets
            .rows
            .values()
            .find(|d| d.is_manual_placeholder())
        {
            return Ok(existing.clone());
        }
        self.mutate(|t| {
            // re-check under the write lock
            if let Some(existing) = t.datasets.rows.values().find(|d| d.is_manual_placeholder()) {
                return Ok(existing.clone());
            }
            let mut placeholder = Dataset::new(MANUAL_DATASET_NAME);
            placeholder.description =
                "A placeholder for results from manual predictions.".to_string();
            Ok(t.datasets.insert(placeholder))
        })
    }

    // ========================================================================
    // Models
    // ========================================================================

    pub fn insert_model(&self, model: MlModel) -> Result<MlModel> {
        self.mutate(|t| Ok(t.models.insert(model)))
    }

    /// Reserve a model id ahead of insertion, for records whose files are
    /// named after their id and must exist before the record does.
    pub fn reserve_model_id(&self) -> Result<RecordId> {
        self.mutate(|t| Ok(t.models.reserve()))
    }

    /// Insert a model under an id from [`RecordStore::reserve_model_id`].
    pub fn insert_model_reserved(&self, id: RecordId, model: MlModel) -> Result<MlModel> {
        self.mutate(|t| t.models.insert_reserved(id, model))
    }

    pub fn model(&self, id: RecordId) -> Result<MlModel> {
        self.tables.read().models.get(id).cloned()
    }

    pub fn find_model(&self, id: RecordId) -> Option<MlModel> {
        self.tables.read().models.rows.get(&id).cloned()
    }

    pub fn list_models(&self) -> Vec<MlModel> {
        self.tables.read().models.rows.values().cloned().collect()
    }

    pub fn update_model(&self, id: RecordId, f: impl FnOnce(&mut MlModel)) -> Result<MlModel> {
        self.mutate(|t| {
            let row = t.models.get_mut(id)?;
            f(row);
            Ok(row.clone())
        })
    }

    /// Remove a model with its test and prediction results.
    pub fn delete_model(&self, id: RecordId) -> Result<ModelRemoval> {
        self.mutate(|t| {
            let model = t.models.remove(id)?;
            let test_ids: Vec<RecordId> = t
                .tests
                .rows
                .values()
                .filter(|r| r.model_id == id)
                .map(|r| r.id)
                .collect();
            let prediction_ids: Vec<RecordId> = t
                .predictions
                .rows
                .values()
                .filter(|r| r.model_id == id)
                .map(|r| r.id)
                .collect();
            let tests = test_ids
                .into_iter()
                .filter_map(|tid| t.tests.rows.remove(&tid))
                .collect();
            let predictions = prediction_ids
                .into_iter()
                .filter_map(|pid| t.predictions.rows.remove(&pid))
                .collect();
            Ok(ModelRemoval { model, tests, predictions })
        })
    }

    // ========================================================================
    // Test results
    // ========================================================================

    pub fn insert_test(&self, test: TestResult) -> Result<TestResult> {
        self.mutate(|t| {
            t.models.get(test.model_id)?;
            t.datasets.get(test.dataset_id)?;
            Ok(t.tests.insert(test))
        })
    }

    pub fn test(&self, id: RecordId) -> Result<TestResult> {
        self.tables.read().tests.get(id).cloned()
    }

    /// Newest first.
    pub fn list_tests(&self, model_id: Option<RecordId>) -> Vec<TestResult> {
        self.tables
            .read()
            .tests
            .rows
            .values()
            .rev()
            .filter(|r| model_id.map_or(true, |m| r.model_id == m))
            .cloned()
            .collect()
    }

    /// Mark a test result `Running`. Re-dispatch of a finished record is
    /// allowed and simply restarts it.
    pub fn start_test(&self, id: RecordId) -> Result<TestResult> {
        self.mutate(|t| {
            let row = t.tests.get_mut(id)?;
            if row.status.is_terminal() {
                warn!(test_id = id, status = %row.status, "Re-running finished evaluation");
            }
            row.status = JobStatus::Running;
            row.finished_at = None;
            Ok(row.clone())
        })
    }

    /// Apply a terminal write if the record is still `Running`.
    ///
    /// Returns `Ok(false)` when the write was discarded, e.g. because a
    /// timeout already failed the record.
    pub fn finish_test(&self, id: RecordId, f: impl FnOnce(&mut TestResult)) -> Result<bool> {
        self.mutate(|t| {
            let row = t.tests.get_mut(id)?;
            if row.status != JobStatus::Running {
                return Ok(false);
            }
            f(row);
            row.finished_at = Some(chrono::Utc::now());
            Ok(true)
        })
    }

    /// Delete a test result and reset its model's evaluation cache.
    pub fn delete_test(&self, id: RecordId) -> Result<TestResult> {
        self.mutate(|t| {
            let removed = t.tests.remove(id)?;
            if let Ok(model) = t.models.get_mut(removed.model_id) {
                model.reset_evaluation();
            }
            Ok(removed)
        })
    }

    // ========================================================================
    // Prediction results
    // ========================================================================

    pub fn insert_prediction(&self, result: PredictionResult) -> Result<PredictionResult> {
        self.mutate(|t| {
            t.models.get(result.model_id)?;
            t.datasets.get(result.dataset_id)?;
            Ok(t.predictions.insert(result))
        })
    }

    pub fn prediction(&self, id: RecordId) -> Result<PredictionResult> {
        self.tables.read().predictions.get(id).cloned()
    }

    /// Newest first.
    pub fn list_predictions(&self, model_id: Option<RecordId>) -> Vec<PredictionResult> {
        self.tables
            .read()
            .predictions
            .rows
            .values()
            .rev()
            .filter(|r| model_id.map_or(true, |m| r.model_id == m))
            .cloned()
            .collect()
    }

    pub fn start_prediction(&self, id: RecordId) -> Result<PredictionResult> {
        self.mutate(|t| {
            let row = t.predictions.get_mut(id)?;
            if row.status.is_terminal() {
                warn!(prediction_id = id, status = %row.status, "Re-running finished prediction");
            }
            row.status = JobStatus::Running;
            row.finished_at = None;
            Ok(row.clone())
        })
    }

    /// Same contract as [`RecordStore::finish_test`].
    pub fn finish_prediction(
        &self,
        id: RecordId,
        f: impl FnOnce(&mut PredictionResult),
    ) -> Result<bool> {
        self.mutate(|t| {
            let row = t.predictions.get_mut(id)?;
            if row.status != JobStatus::Running {
                return Ok(false);
            }
            f(row);
            row.finished_at = Some(chrono::Utc::now());
            Ok(true)
        })
    }

    pub fn delete_prediction(&self, id: RecordId) -> Result<PredictionResult> {
        self.mutate(|t| t.predictions.remove(id))
    }
}
