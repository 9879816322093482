//! Stage trait and implementations.
//!
//! Stages are the units of work a scheduler drives. Each consumes a
//! [`PipelineContext`] and returns the authoritative post-state.

mod media;

pub use media::{
    build_stages, Composition, IdeaGeneration, ImageGeneration, MusicGeneration,
    VideoGeneration, VoiceGeneration, COMPOSITION, IDEA_GENERATION, IMAGE_GENERATION,
    MUSIC_GENERATION, VIDEO_GENERATION, VOICE_GENERATION,
};

use crate::context::{ContextField, PipelineContext};
use crate::errors::{PreconditionError, StageError};
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// Stages are constructed once when the pipeline is built and hold no
/// mutable state between invocations beyond their injected services.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the unique stage name (log key and graph node id).
    fn name(&self) -> &str;

    /// Names of stages that must complete before this one runs.
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Context fields this stage reads and requires to be set.
    fn required_inputs(&self) -> &[ContextField] {
        &[]
    }

    /// Context fields this stage writes.
    fn produces(&self) -> &[ContextField] {
        &[]
    }

    /// Returns true if every required input is set.
    fn validate_inputs(&self, ctx: &PipelineContext) -> bool {
        ctx.missing(self.required_inputs()).is_empty()
    }

    /// Executes the stage.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Precondition`] when required inputs are
    /// missing, or a service/compositor error from the backing call.
    async fn execute(&self, ctx: PipelineContext) -> Result<PipelineContext, StageError>;
}

/// Fails with a precondition error if `stage`'s required inputs are unset.
///
/// # Errors
///
/// Returns a [`PreconditionError`] naming the missing fields.
pub fn ensure_inputs(stage: &dyn Stage, ctx: &PipelineContext) -> Result<(), PreconditionError> {
    let missing = ctx.missing(stage.required_inputs());
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PreconditionError::new(stage.name(), missing))
    }
}

/// A stage backed by a closure.
pub struct FnStage<F>
where
    F: Fn(PipelineContext) -> Result<PipelineContext, StageError> + Send + Sync,
{
    name: String,
    dependencies: Vec<String>,
    produces: Vec<ContextField>,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(PipelineContext) -> Result<PipelineContext, StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            produces: Vec::new(),
            func,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Declares the fields the closure writes.
    #[must_use]
    pub fn with_produces(mut self, fields: impl IntoIterator<Item = ContextField>) -> Self {
        self.produces = fields.into_iter().collect();
        self
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(PipelineContext) -> Result<PipelineContext, StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(PipelineContext) -> Result<PipelineContext, StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn produces(&self) -> &[ContextField] {
        &self.produces
    }

    async fn execute(&self, ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        (self.func)(ctx)
    }
}
