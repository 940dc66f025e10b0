//! Error types shared by the record store, loader, fitting backend and job runners

use thiserror::Error;

/// Result type alias for workbench operations
pub type Result<T> = std::result::Result<T, WorkbenchError>;

/// Main error type for the workbench
#[derive(Error, Debug)]
pub enum WorkbenchError {
    #[error("{table} record {id} not found")]
    RecordNotFound { table: &'static str, id: u64 },

    #[error("Data access error: {0}")]
    DataAccess(String),

    #[error("Artifact load error: {0}")]
    ArtifactLoad(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Fit error: {0}")]
    Fit(String),

    #[error("Job exceeded its {0}s time limit")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WorkbenchError {
    /// Stable tag persisted alongside failure messages.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkbenchError::RecordNotFound { .. } => "record_not_found",
            WorkbenchError::DataAccess(_) => "data_access_error",
            WorkbenchError::ArtifactLoad(_) => "artifact_load_error",
            WorkbenchError::Schema(_) => "schema_error",
            WorkbenchError::Validation(_) => "validation_error",
            WorkbenchError::Fit(_) => "fit_error",
            WorkbenchError::Timeout(_) => "timeout",
            WorkbenchError::Io(_) => "io_error",
            WorkbenchError::Serialization(_) => "serialization_error",
        }
    }

    pub fn not_found(table: &'static str, id: u64) -> Self {
        WorkbenchError::RecordNotFound { table, id }
    }
}

impl From<polars::error::PolarsError> for WorkbenchError {
    fn from(err: polars::error::PolarsError) -> Self {
        match err {
            polars::error::PolarsError::ColumnNotFound(msg) => {
                WorkbenchError::Schema(format!("column not found: {}", msg))
            }
            other => WorkbenchError::DataAccess(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for WorkbenchError {
    fn from(err: serde_json::Error) -> Self {
        WorkbenchError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for WorkbenchError {
    fn from(err: ndarray::ShapeError) -> Self {
        WorkbenchError::Fit(format!("invalid shape: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(WorkbenchError::Schema("x".into()).kind(), "schema_error");
        assert_eq!(WorkbenchError::not_found("model", 3).kind(), "record_not_found");
        assert_eq!(WorkbenchError::not_found("model", 3).to_string(), "model record 3 not found");
    }

    #[test]
    fn test_missing_column_maps_to_schema() {
        let err: WorkbenchError =
            polars::error::PolarsError::ColumnNotFound("revenue".into()).into();
        assert!(matches!(err, WorkbenchError::Schema(_)));
    }
}
