//! # Mediaflow
//!
//! The execution core of a multi-stage media-generation pipeline
//! (idea, image, video, music, voice, composite).
//!
//! Mediaflow provides:
//!
//! - **Stages**: units of work that read and write a shared [`PipelineContext`]
//! - **Sequential scheduling**: ordered runs that checkpoint after every stage
//!   and resume from the last completed one
//! - **Parallel scheduling**: dependency waves run concurrently under a cap,
//!   each stage on its own copy of the context, merged between waves
//! - **Checkpoint stores**: JSON files or memory, one record per run
//! - **Progress notification**: stage-granularity observers off the hot path
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mediaflow::prelude::*;
//!
//! let pipeline = ContentPipeline::new(config, services, Arc::new(FfmpegCompositor::new()));
//! let outcome = pipeline.run_single_video().await?;
//! println!("{} -> {}", outcome.idea, outcome.video);
//! ```
//!
//! [`PipelineContext`]: context::PipelineContext

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod progress;
pub mod services;
pub mod stages;
pub mod state;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{load_config, PipelineConfig, ResumePolicy};
    pub use crate::context::{ContextField, PipelineContext, RunId, VoiceTrack};
    pub use crate::errors::{
        CheckpointError, CompositorError, CycleDetectedError, PipelineError,
        PipelineValidationError, PreconditionError, StageError, StageExecutionError,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        BatchSize, ContentPipeline, ExecutionPlan, MusicOutcome, ParallelScheduler,
        PipelineScheduler, VideoOutcome,
    };
    pub use crate::progress::ProgressNotifier;
    pub use crate::services::{
        FfmpegCompositor, GenerationServices, IdeaDraft, IdeaGenerator, ImageGenerator,
        MediaCompositor, MusicGenerator, VideoGenerator, VoiceGenerator,
    };
    pub use crate::stages::{build_stages, FnStage, Stage};
    pub use crate::state::{FileStateStore, InMemoryStateStore, RunState, StateStore};
}

pub use errors::PipelineError;

/// Result type alias for mediaflow operations
pub type Result<T> = std::result::Result<T, PipelineError>;
