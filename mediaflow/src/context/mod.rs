//! Context management for pipeline execution.
//!
//! This module provides:
//! - The pipeline-wide context value passed between stages
//! - Run identifiers used to namespace checkpoints
//! - The copy-then-merge step used between parallel waves

#[cfg(test)]
mod context_tests;
mod identity;
mod merge;
mod pipeline_context;

pub use identity::RunId;
pub use merge::{merge_wave, MergeOutcome, WriteConflict};
pub use pipeline_context::{ContextField, PipelineContext, VoiceTrack};
