//! High-level entry points for producing videos and music.

use super::parallel::ParallelScheduler;
use super::sequential::PipelineScheduler;
use crate::config::PipelineConfig;
use crate::context::{PipelineContext, RunId};
use crate::errors::PipelineError;
use crate::progress::ProgressNotifier;
use crate::services::{GenerationServices, MediaCompositor};
use crate::stages::{build_stages, MusicGeneration, Stage};
use crate::state::{FileStateStore, StateStore};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Result of one video run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoOutcome {
    /// The run's id; pass it to [`ContentPipeline::resume`] after a failure.
    pub run_id: RunId,
    /// The generated idea, empty if none.
    pub idea: String,
    /// Path of the composite video, empty if none.
    pub video: String,
}

impl VideoOutcome {
    fn from_context(run_id: RunId, ctx: PipelineContext) -> Self {
        Self {
            run_id,
            idea: ctx.idea.unwrap_or_default(),
            video: ctx.output.unwrap_or_default(),
        }
    }
}

/// Result of a music-only run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicOutcome {
    /// Path of the generated music, empty if none.
    pub music: String,
}

/// Configured batch sizes for [`ContentPipeline::run_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSize {
    /// `video_batch_small` runs.
    Small,
    /// `video_batch_large` runs.
    Large,
}

/// Drives the media stages through the schedulers.
///
/// Video runs checkpoint into the configured state store and share one
/// [`PipelineScheduler`], so at most `video_batch_large` full pipelines run
/// at once. Every run composites to its own file derived from
/// `output_file`.
pub struct ContentPipeline {
    config: PipelineConfig,
    services: GenerationServices,
    compositor: Arc<dyn MediaCompositor>,
    stages: Vec<Arc<dyn Stage>>,
    store: Arc<dyn StateStore>,
    progress: Arc<ProgressNotifier>,
    scheduler: PipelineScheduler,
    parallel: ParallelScheduler,
}

impl ContentPipeline {
    /// Creates a pipeline checkpointing to files under `config.state_dir`.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        services: GenerationServices,
        compositor: Arc<dyn MediaCompositor>,
    ) -> Self {
        let stages = build_stages(&services, compositor.clone(), &config);
        let progress = Arc::new(ProgressNotifier::with_logging());
        Self {
            store: Arc::new(FileStateStore::new(config.state_dir.clone())),
            scheduler: PipelineScheduler::new(config.video_batch_large)
                .with_resume_policy(config.resume_policy),
            parallel: ParallelScheduler::new(config.parallel_concurrency)
                .with_progress(progress.clone()),
            progress,
            stages,
            compositor,
            services,
            config,
        }
    }

    /// Replaces the checkpoint store.
    #[must_use]
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    /// Replaces the progress notifier.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<ProgressNotifier>) -> Self {
        self.parallel = self.parallel.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the stage list in execution order, composing to `output_file`.
    #[must_use]
    pub fn stages(&self) -> &[Arc<dyn Stage>] {
        &self.stages
    }

    /// Returns the progress notifier.
    #[must_use]
    pub fn progress(&self) -> &Arc<ProgressNotifier> {
        &self.progress
    }

    /// Runs the full pipeline under a fresh run id.
    ///
    /// # Errors
    ///
    /// Returns the first stage or checkpoint failure. The run's checkpoint
    /// is left in place; see [`ContentPipeline::resume`].
    pub async fn run_single_video(&self) -> Result<VideoOutcome, PipelineError> {
        self.run_video(RunId::new()).await
    }

    /// Continues `run_id` after its last completed stage.
    ///
    /// An id with no checkpoint starts a fresh run under that id.
    ///
    /// # Errors
    ///
    /// Same as [`ContentPipeline::run_single_video`].
    pub async fn resume(&self, run_id: RunId) -> Result<VideoOutcome, PipelineError> {
        info!(run_id = %run_id, "Resuming run");
        self.run_video(run_id).await
    }

    /// Runs `count` independent pipelines concurrently.
    ///
    /// Every run gets its own id and checkpoint record.
    ///
    /// # Errors
    ///
    /// Returns the first failure; the other runs are dropped and keep
    /// their checkpoints.
    pub async fn run_multiple_videos(
        &self,
        count: usize,
    ) -> Result<Vec<VideoOutcome>, PipelineError> {
        info!(count, cap = self.scheduler.capacity(), "Starting video batch");
        try_join_all((0..count).map(|_| self.run_single_video())).await
    }

    /// Runs a batch of the configured `size`.
    ///
    /// # Errors
    ///
    /// Same as [`ContentPipeline::run_multiple_videos`].
    pub async fn run_batch(&self, size: BatchSize) -> Result<Vec<VideoOutcome>, PipelineError> {
        let count = match size {
            BatchSize::Small => self.config.video_batch_small,
            BatchSize::Large => self.config.video_batch_large,
        };
        self.run_multiple_videos(count).await
    }

    /// Runs only the music stage, seeded with `prompt` as the idea.
    ///
    /// A blank prompt falls back to the configured `music_only_prompt`.
    ///
    /// # Errors
    ///
    /// Returns the music stage's failure.
    pub async fn run_music_only(&self, prompt: &str) -> Result<MusicOutcome, PipelineError> {
        let prompt = if prompt.trim().is_empty() {
            self.config.music_only_prompt.as_str()
        } else {
            prompt
        };
        let stages: Vec<Arc<dyn Stage>> =
            vec![Arc::new(MusicGeneration::standalone(self.services.music.clone()))];

        let ctx = self
            .scheduler
            .run_pipeline(
                &stages,
                self.store.as_ref(),
                &RunId::new(),
                &self.progress,
                Some(PipelineContext::new().with_idea(prompt)),
            )
            .await?;
        Ok(MusicOutcome {
            music: ctx.music_path.unwrap_or_default(),
        })
    }

    /// Runs the stage list through the parallel scheduler.
    ///
    /// Parallel runs are not checkpointed.
    ///
    /// # Errors
    ///
    /// Returns graph validation errors or the first stage failure.
    pub async fn run_parallel(&self) -> Result<VideoOutcome, PipelineError> {
        let run_id = RunId::new();
        info!(run_id = %run_id, "Starting parallel run");
        let stages = self.stages_for(&run_id);
        let ctx = self.parallel.execute_pipeline(&stages, None).await?;
        Ok(VideoOutcome::from_context(run_id, ctx))
    }

    async fn run_video(&self, run_id: RunId) -> Result<VideoOutcome, PipelineError> {
        let stages = self.stages_for(&run_id);
        let ctx = self
            .scheduler
            .run_pipeline(
                &stages,
                self.store.as_ref(),
                &run_id,
                &self.progress,
                None,
            )
            .await?;
        Ok(VideoOutcome::from_context(run_id, ctx))
    }

    /// Stage list whose composition step writes to `run_id`'s own file.
    fn stages_for(&self, run_id: &RunId) -> Vec<Arc<dyn Stage>> {
        let config = PipelineConfig {
            output_file: run_output_path(&self.config.output_file, run_id),
            ..self.config.clone()
        };
        build_stages(&self.services, self.compositor.clone(), &config)
    }
}

/// `dir/stem.ext` becomes `dir/stem_<run id>.ext`.
fn run_output_path(template: &str, run_id: &RunId) -> String {
    let path = Path::new(template);
    let stem = path
        .file_stem()
        .map_or_else(|| "output".to_string(), |stem| stem.to_string_lossy().into_owned());
    let file = match path.extension() {
        Some(ext) => format!("{stem}_{}.{}", run_id.simple(), ext.to_string_lossy()),
        None => format!("{stem}_{}", run_id.simple()),
    };
    path.with_file_name(file).to_string_lossy().into_owned()
}

impl fmt::Debug for ContentPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentPipeline")
            .field("stages", &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("scheduler", &self.scheduler)
            .field("parallel", &self.parallel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_output_path_keeps_directory_and_extension() {
        let id = RunId::new();

        assert_eq!(
            run_output_path("renders/final.mp4", &id),
            format!("renders/final_{}.mp4", id.simple())
        );
        assert_eq!(
            run_output_path("final_output.mp4", &id),
            format!("final_output_{}.mp4", id.simple())
        );
        assert_eq!(run_output_path("video", &id), format!("video_{}", id.simple()));
    }

    #[test]
    fn test_run_output_path_differs_per_run() {
        let (a, b) = (RunId::new(), RunId::new());
        assert_ne!(run_output_path("final.mp4", &a), run_output_path("final.mp4", &b));
        assert_eq!(run_output_path("final.mp4", &a), run_output_path("final.mp4", &a));
    }
}
