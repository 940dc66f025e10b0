//! Application state management

use std::sync::Arc;

use crate::error::Result;
use crate::jobs::{Job, JobContext, JobQueue};
use crate::records::RecordStore;

use super::ServerConfig;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub queue: JobQueue,
}

impl AppState {
    /// State backed by the snapshot at `config.records_path`.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store = RecordStore::open(&config.records_path)?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: ServerConfig, store: RecordStore) -> Result<Self> {
        let media = config.media();
        media.ensure()?;
        let ctx = JobContext::new(Arc::new(store), media);
        Ok(Self::with_context(config, ctx))
    }

    pub fn with_context(config: ServerConfig, ctx: JobContext) -> Self {
        let queue = JobQueue::new(ctx, config.queue_config());
        Self { config, queue }
    }

    pub fn store(&self) -> &RecordStore {
        &self.queue.context().store
    }

    pub fn ctx(&self) -> &JobContext {
        self.queue.context()
    }

    /// Hand a job to the background queue. The job's record must already be
    /// stored.
    pub fn dispatch(&self, job: Job) {
        let _ = self.queue.dispatch(job);
    }
}
