//! Error types for the mediaflow execution core.
//!
//! Stages report [`StageError`]; schedulers report [`PipelineError`], which
//! wraps stage failures, graph validation failures and checkpoint I/O.

use crate::context::{ContextField, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type returned by the schedulers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage failed in the sequential scheduler; propagated unchanged.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// A stage failed in the parallel scheduler; carries the stage name.
    #[error("{0}")]
    StageExecution(#[from] StageExecutionError),

    /// The dependency graph contains a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// The stage set failed graph validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// Saving, loading or clearing a checkpoint failed.
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),

    /// A checkpoint names a stage that is not part of the stage list.
    #[error("Checkpoint refers to unknown stage '{stage}'")]
    UnknownCheckpoint {
        /// The stage name recorded in the checkpoint.
        stage: String,
    },

    /// A generic internal error (e.g. a panicked stage task).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns true if the root cause is an unmet stage precondition.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::Stage(err) => err.is_precondition(),
            Self::StageExecution(err) => err.source.is_precondition(),
            _ => false,
        }
    }

    /// Returns the name of the failing stage, if the error came from one.
    #[must_use]
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::Stage(err) => Some(err.stage_name()),
            Self::StageExecution(err) => Some(&err.stage),
            Self::UnknownCheckpoint { stage } => Some(stage),
            _ => None,
        }
    }
}

/// Errors returned from [`crate::stages::Stage::execute`].
#[derive(Debug, Error)]
pub enum StageError {
    /// Required upstream fields were missing. Never retried.
    #[error("{0}")]
    Precondition(#[from] PreconditionError),

    /// The backing generation service failed.
    #[error("Stage '{stage}' service call failed: {source}")]
    Service {
        /// The stage name.
        stage: String,
        /// The underlying service error.
        #[source]
        source: anyhow::Error,
    },

    /// The media compositor failed.
    #[error("Stage '{stage}' composition failed: {source}")]
    Compositor {
        /// The stage name.
        stage: String,
        /// The underlying compositor error.
        #[source]
        source: CompositorError,
    },
}

impl StageError {
    /// Creates a service failure for a stage.
    pub fn service(stage: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Service {
            stage: stage.into(),
            source,
        }
    }

    /// Creates a compositor failure for a stage.
    pub fn compositor(stage: impl Into<String>, source: CompositorError) -> Self {
        Self::Compositor {
            stage: stage.into(),
            source,
        }
    }

    /// Returns true for precondition failures.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// Returns the stage that produced the error.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        match self {
            Self::Precondition(err) => &err.stage,
            Self::Service { stage, .. } | Self::Compositor { stage, .. } => stage,
        }
    }
}

/// Error raised when a stage runs before the fields it reads are set.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' precondition failed: missing {}", format_fields(missing))]
pub struct PreconditionError {
    /// The stage whose inputs were incomplete.
    pub stage: String,
    /// The context fields that were unset.
    pub missing: Vec<ContextField>,
}

impl PreconditionError {
    /// Creates a new precondition error.
    #[must_use]
    pub fn new(stage: impl Into<String>, missing: Vec<ContextField>) -> Self {
        Self {
            stage: stage.into(),
            missing,
        }
    }
}

fn format_fields(fields: &[ContextField]) -> String {
    fields
        .iter()
        .map(ContextField::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A stage failure observed by the parallel scheduler.
#[derive(Debug, Error)]
#[error("Stage '{stage}' execution failed: {source}")]
pub struct StageExecutionError {
    /// The failing stage.
    pub stage: String,
    /// The original stage error.
    #[source]
    pub source: StageError,
}

impl StageExecutionError {
    /// Wraps a stage error with the stage name.
    #[must_use]
    pub fn new(stage: impl Into<String>, source: StageError) -> Self {
        Self {
            stage: stage.into(),
            source,
        }
    }
}

/// Errors surfaced by a [`crate::services::MediaCompositor`].
#[derive(Debug, Error)]
pub enum CompositorError {
    /// The muxing tool could not be launched.
    #[error("Failed to launch compositor: {0}")]
    Launch(#[from] std::io::Error),

    /// The muxing tool exited unsuccessfully.
    #[error("Compositor exited with status {status}: {stderr}")]
    Failed {
        /// The exit status, or -1 if killed by a signal.
        status: i32,
        /// Captured standard error.
        stderr: String,
    },
}

/// Errors from the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Reading, writing or removing the record failed.
    #[error("Checkpoint I/O failed for run {run_id}: {source}")]
    Io {
        /// The run whose record was being accessed.
        run_id: RunId,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The record could not be encoded or decoded.
    #[error("Checkpoint serialization failed for run {run_id}: {source}")]
    Serialization {
        /// The run whose record was being accessed.
        run_id: RunId,
        /// The serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl CheckpointError {
    /// Creates an I/O error for a run.
    #[must_use]
    pub fn io(run_id: &RunId, source: std::io::Error) -> Self {
        Self::Io {
            run_id: *run_id,
            source,
        }
    }

    /// Creates a serialization error for a run.
    #[must_use]
    pub fn serialization(run_id: &RunId, source: serde_json::Error) -> Self {
        Self::Serialization {
            run_id: *run_id,
            source,
        }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a stage set fails graph validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the stage graph.
#[derive(Debug, Clone, Error)]
#[error("Cyclic dependency detected: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-CYCLE",
            format!("Stage dependencies contain a cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "my_stage");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"my_stage".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, "GRAPH-CYCLE");
    }

    #[test]
    fn test_precondition_error_message() {
        let err = PreconditionError::new(
            "video_generation",
            vec![ContextField::Prompt, ContextField::ImagePath],
        );
        assert_eq!(
            err.to_string(),
            "Stage 'video_generation' precondition failed: missing prompt, image_path"
        );
    }

    #[test]
    fn test_pipeline_error_classification() {
        let stage_err: StageError = PreconditionError::new("image_generation", vec![ContextField::Prompt]).into();
        let wrapped: PipelineError = StageExecutionError::new("image_generation", stage_err).into();

        assert!(wrapped.is_precondition());
        assert_eq!(wrapped.stage_name(), Some("image_generation"));

        let service: PipelineError =
            StageError::service("music_generation", anyhow::anyhow!("quota exceeded")).into();
        assert!(!service.is_precondition());
        assert_eq!(service.stage_name(), Some("music_generation"));
        assert!(service.to_string().contains("quota exceeded"));
    }
}
