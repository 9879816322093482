//! Ordered, checkpointed pipeline execution.

use crate::config::ResumePolicy;
use crate::context::{PipelineContext, RunId};
use crate::errors::PipelineError;
use crate::progress::ProgressNotifier;
use crate::stages::Stage;
use crate::state::StateStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

/// Runs a stage list one stage at a time, checkpointing after each stage.
///
/// The scheduler holds a semaphore bounding how many `run_pipeline` calls
/// may be in flight at once when the scheduler is shared.
#[derive(Debug, Clone)]
pub struct PipelineScheduler {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    resume_policy: ResumePolicy,
}

impl Default for PipelineScheduler {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PipelineScheduler {
    /// Creates a scheduler allowing `concurrency` pipelines at once (min 1).
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        let capacity = concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            resume_policy: ResumePolicy::default(),
        }
    }

    /// Sets how an unrecognised checkpoint is handled.
    #[must_use]
    pub fn with_resume_policy(mut self, policy: ResumePolicy) -> Self {
        self.resume_policy = policy;
        self
    }

    /// Returns the configured pipeline concurrency.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of pipelines that could start right now.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Drives `stages` to completion for `run_id`.
    ///
    /// Stages named up to and including the run's last checkpoint are
    /// skipped. `initial`, when given, replaces the saved context. The
    /// checkpoint is cleared once every stage has completed.
    ///
    /// # Errors
    ///
    /// Stage failures propagate unchanged as [`PipelineError::Stage`];
    /// the last successful checkpoint stays in the store. Checkpoint I/O
    /// failures abort the run.
    #[instrument(
        name = "run_pipeline",
        skip_all,
        fields(run_id = %run_id, stages = stages.len())
    )]
    pub async fn run_pipeline(
        &self,
        stages: &[Arc<dyn Stage>],
        store: &dyn StateStore,
        run_id: &RunId,
        progress: &ProgressNotifier,
        initial: Option<PipelineContext>,
    ) -> Result<PipelineContext, PipelineError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| PipelineError::Internal("scheduler semaphore closed".to_string()))?;

        let (last_completed, saved) = store.load(run_id).await?.into_parts();
        let mut ctx = initial.unwrap_or(saved);
        let start = self.resume_index(stages, &last_completed)?;

        if start > 0 {
            info!(
                last_completed = %last_completed,
                skipped = start,
                "Resuming from checkpoint"
            );
        }

        let pipeline_start = Instant::now();
        for stage in &stages[start..] {
            let name = stage.name();
            progress.update(name, 0.0);
            info!(stage = %name, "Stage started");

            let stage_start = Instant::now();
            ctx = match stage.execute(ctx).await {
                Ok(next) => next,
                Err(err) => {
                    error!(stage = %name, error = %err, "Stage failed");
                    return Err(err.into());
                }
            };

            store.save(run_id, name, &ctx).await?;
            progress.update(name, 1.0);
            info!(
                stage = %name,
                duration_ms = stage_start.elapsed().as_secs_f64() * 1000.0,
                "Stage completed"
            );
        }

        store.clear(run_id).await?;
        info!(
            duration_ms = pipeline_start.elapsed().as_secs_f64() * 1000.0,
            "Pipeline completed"
        );
        Ok(ctx)
    }

    /// Index of the first stage to run given the last completed stage name.
    fn resume_index(
        &self,
        stages: &[Arc<dyn Stage>],
        last_completed: &str,
    ) -> Result<usize, PipelineError> {
        if last_completed.is_empty() {
            return Ok(0);
        }
        if let Some(pos) = stages.iter().position(|s| s.name() == last_completed) {
            return Ok(pos + 1);
        }
        match self.resume_policy {
            ResumePolicy::Lenient => {
                warn!(
                    last_completed = %last_completed,
                    "Checkpoint matches no stage; running from the start"
                );
                Ok(0)
            }
            ResumePolicy::Strict => Err(PipelineError::UnknownCheckpoint {
                stage: last_completed.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStateStore;
    use crate::testing::{FailingStage, FieldStage, RecordingStage, RecordingStateStore};
    use crate::context::ContextField;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn recording(names: &[&str]) -> (Vec<Arc<RecordingStage>>, Vec<Arc<dyn Stage>>) {
        let concrete: Vec<Arc<RecordingStage>> =
            names.iter().map(|n| Arc::new(RecordingStage::new(*n))).collect();
        let dynamic = concrete.iter().map(|s| s.clone() as Arc<dyn Stage>).collect();
        (concrete, dynamic)
    }

    #[tokio::test]
    async fn test_runs_all_stages_in_order_and_clears() {
        let (spies, stages) = recording(&["s1", "s2", "s3"]);
        let store = RecordingStateStore::new();
        let run = RunId::new();
        let progress = ProgressNotifier::new();

        let ctx = PipelineScheduler::default()
            .run_pipeline(&stages, &store, &run, &progress, None)
            .await
            .unwrap();

        assert!(spies.iter().all(|s| s.call_count() == 1));
        assert_eq!(ctx.meta.len(), 3);
        assert_eq!(store.saved_stages(), vec!["s1", "s2", "s3"]);
        assert_eq!(store.clear_count(), 1);
        assert!(store.load(&run).await.unwrap().is_fresh());
        assert_eq!(progress.progress().get("s3"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_resume_skips_completed_stages() {
        let (spies, stages) = recording(&["s1", "s2", "s3"]);
        let store = InMemoryStateStore::new();
        let run = RunId::new();
        let saved = PipelineContext::new()
            .with_meta("s1", serde_json::json!(true))
            .with_meta("s2", serde_json::json!(true));
        store.save(&run, "s2", &saved).await.unwrap();

        let ctx = PipelineScheduler::default()
            .run_pipeline(&stages, &store, &run, &ProgressNotifier::new(), None)
            .await
            .unwrap();

        assert_eq!(spies[0].call_count(), 0);
        assert_eq!(spies[1].call_count(), 0);
        assert_eq!(spies[2].call_count(), 1);
        for key in ["s1", "s2", "s3"] {
            assert_eq!(ctx.meta[key], serde_json::json!(true));
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_initial_context_overrides_saved() {
        let (_, stages) = recording(&["s1", "s2"]);
        let store = InMemoryStateStore::new();
        let run = RunId::new();
        store
            .save(&run, "s1", &PipelineContext::new().with_idea("saved"))
            .await
            .unwrap();

        let ctx = PipelineScheduler::default()
            .run_pipeline(
                &stages,
                &store,
                &run,
                &ProgressNotifier::new(),
                Some(PipelineContext::new().with_idea("caller")),
            )
            .await
            .unwrap();

        assert_eq!(ctx.idea.as_deref(), Some("caller"));
        assert!(!ctx.meta.contains_key("s1"));
        assert!(ctx.meta.contains_key("s2"));
    }

    #[tokio::test]
    async fn test_unknown_checkpoint_lenient_runs_everything() {
        let (spies, stages) = recording(&["s1", "s2"]);
        let store = InMemoryStateStore::new();
        let run = RunId::new();
        store.save(&run, "renamed", &PipelineContext::new()).await.unwrap();

        PipelineScheduler::default()
            .run_pipeline(&stages, &store, &run, &ProgressNotifier::new(), None)
            .await
            .unwrap();

        assert!(spies.iter().all(|s| s.call_count() == 1));
    }

    #[tokio::test]
    async fn test_unknown_checkpoint_strict_fails_before_running() {
        let (spies, stages) = recording(&["s1", "s2"]);
        let store = InMemoryStateStore::new();
        let run = RunId::new();
        store.save(&run, "renamed", &PipelineContext::new()).await.unwrap();

        let err = PipelineScheduler::default()
            .with_resume_policy(ResumePolicy::Strict)
            .run_pipeline(&stages, &store, &run, &ProgressNotifier::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::UnknownCheckpoint { ref stage } if stage == "renamed"));
        assert!(spies.iter().all(|s| s.call_count() == 0));
        assert!(store.contains(&run));
    }

    #[tokio::test]
    async fn test_failure_keeps_last_checkpoint_and_resume_finishes() {
        let store = InMemoryStateStore::new();
        let run = RunId::new();
        let first: Arc<dyn Stage> = Arc::new(FieldStage::new("idea", ContextField::Idea, "x"));
        let broken: Arc<dyn Stage> = Arc::new(FailingStage::new("music", "provider down"));

        let err = PipelineScheduler::default()
            .run_pipeline(
                &[first.clone(), broken],
                &store,
                &run,
                &ProgressNotifier::new(),
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Stage(_)));
        assert_eq!(err.stage_name(), Some("music"));
        let state = store.load(&run).await.unwrap();
        assert_eq!(state.stage, "idea");
        assert_eq!(state.context.idea.as_deref(), Some("x"));

        let fixed = Arc::new(RecordingStage::new("music"));
        let ctx = PipelineScheduler::default()
            .run_pipeline(
                &[first, fixed.clone() as Arc<dyn Stage>],
                &store,
                &run,
                &ProgressNotifier::new(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(fixed.call_count(), 1);
        assert_eq!(ctx.idea.as_deref(), Some("x"));
        assert!(!store.contains(&run));
    }

    #[tokio::test]
    async fn test_checkpoint_failure_aborts_run() {
        let (spies, stages) = recording(&["s1", "s2"]);
        let store = RecordingStateStore::new().fail_saves();
        let run = RunId::new();

        let err = PipelineScheduler::default()
            .run_pipeline(&stages, &store, &run, &ProgressNotifier::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Checkpoint(_)));
        assert_eq!(spies[0].call_count(), 1);
        assert_eq!(spies[1].call_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scheduler_bounds_concurrent_pipelines() {
        use crate::testing::OverlapStage;

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let stage: Arc<dyn Stage> = Arc::new(OverlapStage::new(
            "overlap",
            in_flight.clone(),
            peak.clone(),
            Duration::from_millis(30),
        ));
        let scheduler = PipelineScheduler::new(2);
        let store = Arc::new(InMemoryStateStore::new());

        let runs = (0..6).map(|_| {
            let scheduler = scheduler.clone();
            let store = store.clone();
            let stages = vec![stage.clone()];
            tokio::spawn(async move {
                scheduler
                    .run_pipeline(&stages, store.as_ref(), &RunId::new(), &ProgressNotifier::new(), None)
                    .await
            })
        });
        for run in futures::future::join_all(runs).await {
            run.unwrap().unwrap();
        }

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak {peak} exceeded cap");
        assert!(peak >= 2, "pipelines never overlapped");
        assert_eq!(scheduler.available_slots(), 2);
    }
}
