//! A state store that records every call.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::context::{PipelineContext, RunId};
use crate::errors::CheckpointError;
use crate::state::{InMemoryStateStore, RunState, StateStore};

/// Wraps an [`InMemoryStateStore`], counting saves, loads and clears.
#[derive(Debug, Default)]
pub struct RecordingStateStore {
    inner: InMemoryStateStore,
    saves: Mutex<Vec<String>>,
    loads: AtomicUsize,
    clears: AtomicUsize,
    fail_saves: bool,
}

impl RecordingStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every save fail with an I/O error.
    #[must_use]
    pub fn fail_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    /// Returns the stage name of every save attempt, in order.
    #[must_use]
    pub fn saved_stages(&self) -> Vec<String> {
        self.saves.lock().clone()
    }

    /// Returns the number of save attempts.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.lock().len()
    }

    /// Returns the number of loads.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Returns the number of clears.
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Returns the number of runs with a live checkpoint.
    #[must_use]
    pub fn live_records(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl StateStore for RecordingStateStore {
    async fn save(
        &self,
        run_id: &RunId,
        stage: &str,
        context: &PipelineContext,
    ) -> Result<(), CheckpointError> {
        self.saves.lock().push(stage.to_string());
        if self.fail_saves {
            return Err(CheckpointError::io(
                run_id,
                io::Error::new(io::ErrorKind::Other, "disk full"),
            ));
        }
        self.inner.save(run_id, stage, context).await
    }

    async fn load(&self, run_id: &RunId) -> Result<RunState, CheckpointError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(run_id).await
    }

    async fn clear(&self, run_id: &RunId) -> Result<(), CheckpointError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear(run_id).await
    }
}
