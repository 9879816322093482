//! Test stages.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::{ContextField, PipelineContext, VoiceTrack};
use crate::errors::StageError;
use crate::stages::Stage;

fn names(deps: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    deps.into_iter().map(Into::into).collect()
}

/// A stage that records every input context and tags `meta[name] = true`.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    dependencies: Vec<String>,
    delay: Option<Duration>,
    inputs: Mutex<Vec<PipelineContext>>,
}

impl RecordingStage {
    /// Creates a new recording stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            delay: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = names(deps);
        self
    }

    /// Sleeps for `delay` before returning.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Returns the context the most recent execution received.
    #[must_use]
    pub fn last_input(&self) -> Option<PipelineContext> {
        self.inputs.lock().last().cloned()
    }

    /// Returns every received context.
    #[must_use]
    pub fn inputs(&self) -> Vec<PipelineContext> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    async fn execute(&self, ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        self.inputs.lock().push(ctx.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(ctx.with_meta(self.name.clone(), serde_json::json!(true)))
    }
}

/// A stage that sets one context field to a fixed value.
#[derive(Debug)]
pub struct FieldStage {
    name: String,
    dependencies: Vec<String>,
    produces: [ContextField; 1],
    value: String,
}

impl FieldStage {
    /// Creates a stage writing `value` into `field`.
    ///
    /// For [`ContextField::Voice`] the value becomes the track filename.
    #[must_use]
    pub fn new(name: impl Into<String>, field: ContextField, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            produces: [field],
            value: value.into(),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = names(deps);
        self
    }
}

#[async_trait]
impl Stage for FieldStage {
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
        let value = self.value.clone();
        Ok(match self.produces[0] {
            ContextField::Idea => ctx.with_idea(value),
            ContextField::Prompt => ctx.with_prompt(value),
            ContextField::ImagePath => ctx.with_image_path(value),
            ContextField::VideoPath => ctx.with_video_path(value),
            ContextField::MusicPath => ctx.with_music_path(value),
            ContextField::Voice => ctx.with_voice(VoiceTrack::new(value)),
            ContextField::Output => ctx.with_output(value),
        })
    }
}

/// A stage whose service call always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    dependencies: Vec<String>,
    error: String,
    calls: AtomicUsize,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            error: error.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = names(deps);
        self
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    async fn execute(&self, _ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StageError::service(
            self.name.clone(),
            anyhow::anyhow!(self.error.clone()),
        ))
    }
}

/// A stage that tracks how many executions overlap.
///
/// On entry it bumps a shared in-flight counter and records the peak, holds
/// for a fixed duration, then decrements on exit.
#[derive(Debug)]
pub struct OverlapStage {
    name: String,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    hold: Duration,
}

impl OverlapStage {
    /// Creates a stage sharing `in_flight` and `peak` with its siblings.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        hold: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            in_flight,
            peak,
            hold,
        }
    }
}

#[async_trait]
impl Stage for OverlapStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ctx)
    }
}
