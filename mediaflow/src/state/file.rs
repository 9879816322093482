//! JSON-file checkpoint store: one `state_<run>.json` per run.

use super::{RunState, StateStore};
use crate::context::{PipelineContext, RunId};
use crate::errors::CheckpointError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores each run's checkpoint as a JSON document in a directory.
///
/// Records are written to a temporary sibling and renamed into place, so a
/// reader never observes a half-written file.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the record path for `run_id`.
    #[must_use]
    pub fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.dir.join(format!("state_{}.json", run_id.simple()))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save(
        &self,
        run_id: &RunId,
        stage: &str,
        context: &PipelineContext,
    ) -> Result<(), CheckpointError> {
        let record = RunState::new(stage, context.clone());
        let payload = serde_json::to_vec_pretty(&record)
            .map_err(|e| CheckpointError::serialization(run_id, e))?;

        let path = self.path_for(run_id);
        let tmp = path.with_extension("json.tmp");

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointError::io(run_id, e))?;
        tokio::fs::write(&tmp, payload)
            .await
            .map_err(|e| CheckpointError::io(run_id, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CheckpointError::io(run_id, e))?;

        debug!(run_id = %run_id, stage = %stage, path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn load(&self, run_id: &RunId) -> Result<RunState, CheckpointError> {
        let path = self.path_for(run_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(RunState::empty()),
            Err(err) => return Err(CheckpointError::io(run_id, err)),
        };
        serde_json::from_slice(&data).map_err(|e| CheckpointError::serialization(run_id, e))
    }

    async fn clear(&self, run_id: &RunId) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(self.path_for(run_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CheckpointError::io(run_id, err)),
        }
    }
}
