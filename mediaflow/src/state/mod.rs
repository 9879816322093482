//! Checkpoint persistence for resumable runs.
//!
//! A store keeps at most one [`RunState`] per [`RunId`]: the name of the
//! last stage that completed and the context it produced. Every save
//! overwrites the previous record; a successful run clears it.

mod file;
mod memory;

pub use file::FileStateStore;
pub use memory::InMemoryStateStore;

use crate::context::{PipelineContext, RunId};
use crate::errors::CheckpointError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The unit of resumability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunState {
    /// Name of the last completed stage; empty if none completed.
    #[serde(default)]
    pub stage: String,
    /// Context as of that stage's completion.
    #[serde(default)]
    pub context: PipelineContext,
    /// When the record was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(stage: impl Into<String>, context: PipelineContext) -> Self {
        Self {
            stage: stage.into(),
            context,
            saved_at: Some(Utc::now()),
        }
    }

    /// The record returned for runs with no checkpoint.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if no stage has completed.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.stage.is_empty()
    }

    /// Splits the record into `(stage, context)`.
    #[must_use]
    pub fn into_parts(self) -> (String, PipelineContext) {
        (self.stage, self.context)
    }
}

/// Storage backend for run checkpoints.
///
/// Each run owns its record, so implementations only need to be atomic
/// with respect to a single writer per run id; operations on different
/// run ids must not interfere.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Overwrites the record for `run_id`.
    async fn save(
        &self,
        run_id: &RunId,
        stage: &str,
        context: &PipelineContext,
    ) -> Result<(), CheckpointError>;

    /// Returns the record for `run_id`, or [`RunState::empty`] if none exists.
    async fn load(&self, run_id: &RunId) -> Result<RunState, CheckpointError>;

    /// Removes the record for `run_id`; a no-op if absent.
    async fn clear(&self, run_id: &RunId) -> Result<(), CheckpointError>;
}
