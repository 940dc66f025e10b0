//! ML Workbench - tabular model training service
//!
//! Users register CSV datasets, train models on them in the background,
//! evaluate trained models against labeled data and apply them to new rows.
//! Every long-running action is a job that owns exactly one record; clients
//! poll that record for its status and results.
//!
//! # Modules
//!
//! ## Records and data
//! - [`records`] - Dataset, model, test and prediction records and their store
//! - [`data`] - CSV loading, dataset registration and summaries
//!
//! ## Modelling
//! - [`automl`] - Fitting/scoring backend, leaderboards, metrics
//! - [`plots`] - Plot figures as JSON
//!
//! ## Jobs
//! - [`jobs`] - Training, evaluation and prediction runners and the job queue
//! - [`status`] - Read-only JSON projections of records
//!
//! ## Services
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Records and data
pub mod records;
pub mod data;

// Modelling
pub mod automl;
pub mod plots;

// Jobs
pub mod jobs;
pub mod status;

// Services
pub mod server;
pub mod cli;

pub use error::{Result, WorkbenchError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, WorkbenchError};

    // Records
    pub use crate::records::{
        Dataset, JobStatus, MlModel, PredictionResult, RecordId, RecordStore, TestResult,
    };

    // Data
    pub use crate::data::{register_dataset, DatasetLoader, NewDataset};

    // Modelling
    pub use crate::automl::{Backend, FittedModel, Leaderboard, Preset, TabularBackend};

    // Jobs
    pub use crate::jobs::{Job, JobContext, JobQueue, MediaPaths, QueueConfig};

    // Status
    pub use crate::status::LeaderboardView;
}
