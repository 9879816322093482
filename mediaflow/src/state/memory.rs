//! In-memory checkpoint store.

use super::{RunState, StateStore};
use crate::context::{PipelineContext, RunId};
use crate::errors::CheckpointError;
use async_trait::async_trait;
use dashmap::DashMap;

/// Process-local store, one entry per run.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: DashMap<RunId, RunState>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if a record exists for `run_id`.
    #[must_use]
    pub fn contains(&self, run_id: &RunId) -> bool {
        self.records.contains_key(run_id)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(
        &self,
        run_id: &RunId,
        stage: &str,
        context: &PipelineContext,
    ) -> Result<(), CheckpointError> {
        self.records
            .insert(*run_id, RunState::new(stage, context.clone()));
        Ok(())
    }

    async fn load(&self, run_id: &RunId) -> Result<RunState, CheckpointError> {
        Ok(self
            .records
            .get(run_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(RunState::empty))
    }

    async fn clear(&self, run_id: &RunId) -> Result<(), CheckpointError> {
        self.records.remove(run_id);
        Ok(())
    }
}
