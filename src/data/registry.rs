//! Dataset registration

use std::fs;
use std::path::Path;
use tracing::info;

use super::loader::{inspect, DatasetLoader};
use crate::error::{Result, WorkbenchError};
use crate::records::{Dataset, RecordStore, MANUAL_DATASET_NAME};

/// An uploaded file waiting to become a `Dataset`.
#[derive(Debug, Clone)]
pub struct NewDataset {
    pub name: String,
    pub file_name: String,
    pub separator: String,
    pub encoding: String,
    pub description: String,
    pub owner: Option<String>,
}

impl NewDataset {
    pub fn new(name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            separator: ",".to_string(),
            encoding: "utf-8".to_string(),
            description: String::new(),
            owner: None,
        }
    }
}

/// Store the file under `datasets_dir`, inspect it and insert the record.
///
/// The column schema is taken from the stored copy, so it always matches the
/// file the record points to. A file that cannot be parsed is removed again
/// and no record is created.
pub fn register_dataset(
    store: &RecordStore,
    datasets_dir: &Path,
    upload: NewDataset,
    bytes: &[u8],
) -> Result<Dataset> {
    if upload.name.trim().is_empty() {
        return Err(WorkbenchError::Validation("dataset name is required".to_string()));
    }
    if upload.name == MANUAL_DATASET_NAME {
        return Err(WorkbenchError::Validation(format!("{} is a reserved name", MANUAL_DATASET_NAME)));
    }

    fs::create_dir_all(datasets_dir)?;
    let stem = Path::new(&upload.file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(crate::jobs::slugify)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "dataset".to_string());
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let path = datasets_dir.join(format!("{}_{}.csv", stem, suffix));
    fs::write(&path, bytes)?;

    let df = match DatasetLoader::read(&path, &upload.separator, &upload.encoding) {
        Ok(df) => df,
        Err(e) => {
            let _ = fs::remove_file(&path);
            return Err(e);
        }
    };

    let mut dataset = Dataset::new(upload.name);
    dataset.columns = inspect(&df);
    dataset.n_rows = df.height();
    dataset.n_columns = df.width();
    dataset.file = Some(path);
    dataset.separator = upload.separator;
    dataset.encoding = upload.encoding;
    dataset.description = upload.description;
    dataset.owner = upload.owner;

    let dataset = store.insert_dataset(dataset)?;
    info!(
        dataset_id = dataset.id,
        name = %dataset.name,
        rows = dataset.n_rows,
        columns = dataset.n_columns,
        "Dataset registered"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_records_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::in_memory();
        let ds = register_dataset(
            &store,
            dir.path(),
            NewDataset::new("sales", "Sales Q1.csv"),
            b"region,units,revenue\nnorth,5,10.5\nsouth,12,30.0\n",
        )
        .unwrap();
        assert_eq!(ds.n_rows, 2);
        assert_eq!(ds.column_names(), vec!["region", "units", "revenue"]);
        assert_eq!(ds.columns[1].dtype, "int64");
        assert_eq!(ds.columns[2].dtype, "float64");
        let file = ds.file.unwrap();
        assert!(file.file_name().unwrap().to_str().unwrap().starts_with("sales-q1_"));
    }

    #[test]
    fn test_unparsable_upload_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::in_memory();
        let mut upload = NewDataset::new("bad", "bad.csv");
        upload.encoding = "utf-16".to_string();
        assert!(register_dataset(&store, dir.path(), upload, b"a\n1\n").is_err());
        assert!(store.list_datasets().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
