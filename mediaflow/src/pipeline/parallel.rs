//! Wave-based concurrent execution of a stage DAG.
//!
//! Each wave's members run as separate Tokio tasks on their own copy of the
//! merged context. A shared semaphore caps how many stages are in flight;
//! once every member of a wave has finished the copies are merged back
//! (see [`merge_wave`]) before the next wave starts.

use super::dag::ExecutionPlan;
use crate::context::{merge_wave, PipelineContext};
use crate::errors::{PipelineError, StageExecutionError};
use crate::progress::ProgressNotifier;
use crate::stages::Stage;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, instrument};

/// Default number of stages allowed to run at once.
pub const DEFAULT_PARALLEL_CONCURRENCY: usize = 4;

/// Runs a stage DAG wave by wave with bounded concurrency.
#[derive(Debug, Clone)]
pub struct ParallelScheduler {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    progress: Option<Arc<ProgressNotifier>>,
}

impl Default for ParallelScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_PARALLEL_CONCURRENCY)
    }
}

impl ParallelScheduler {
    /// Creates a scheduler running at most `concurrency` stages at once (min 1).
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        let capacity = concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            progress: None,
        }
    }

    /// Reports stage start/completion to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<ProgressNotifier>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns the stage concurrency cap.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Validates `stages` and groups them into waves without running anything.
    ///
    /// # Errors
    ///
    /// See [`ExecutionPlan::build`].
    pub fn plan(&self, stages: &[Arc<dyn Stage>]) -> Result<ExecutionPlan, PipelineError> {
        ExecutionPlan::build(stages)
    }

    /// Executes every stage in dependency order and returns the merged context.
    ///
    /// The graph is validated before any stage runs. On the first stage
    /// failure the remaining tasks of that wave are aborted and no further
    /// waves start.
    ///
    /// # Errors
    ///
    /// - Graph errors from [`ExecutionPlan::build`].
    /// - [`PipelineError::StageExecution`] naming the failing stage.
    /// - [`PipelineError::Internal`] if a stage task panicked or the
    ///   concurrency semaphore was closed.
    #[instrument(name = "execute_pipeline", skip_all, fields(stages = stages.len()))]
    pub async fn execute_pipeline(
        &self,
        stages: &[Arc<dyn Stage>],
        initial: Option<PipelineContext>,
    ) -> Result<PipelineContext, PipelineError> {
        let plan = self.plan(stages)?;
        let mut ctx = initial.unwrap_or_default();
        let start = Instant::now();

        for (wave_no, wave) in plan.waves().iter().enumerate() {
            info!(
                wave = wave_no,
                stages = ?wave.iter().map(|s| s.name()).collect::<Vec<_>>(),
                "Wave started"
            );
            ctx = self.run_wave(wave, ctx).await?;
        }

        info!(
            waves = plan.waves().len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Pipeline completed"
        );
        Ok(ctx)
    }

    async fn run_wave(
        &self,
        wave: &[Arc<dyn Stage>],
        base: PipelineContext,
    ) -> Result<PipelineContext, PipelineError> {
        let mut tasks = FuturesUnordered::new();
        let mut guard = AbortOnDrop::default();

        for (index, stage) in wave.iter().enumerate() {
            let handle = tokio::spawn(run_stage(
                stage.clone(),
                base.clone(),
                self.semaphore.clone(),
                self.progress.clone(),
            ));
            guard.0.push(handle.abort_handle());
            tasks.push(async move { (index, handle.await) });
        }

        let mut results: Vec<(usize, PipelineContext)> = Vec::with_capacity(wave.len());
        while let Some((index, joined)) = tasks.next().await {
            match joined {
                Ok(Ok(ctx)) => results.push((index, ctx)),
                Ok(Err(err)) => return Err(err),
                Err(err) => {
                    return Err(PipelineError::Internal(format!(
                        "Stage '{}' task failed: {err}",
                        wave[index].name()
                    )));
                }
            }
        }

        results.sort_unstable_by_key(|(index, _)| *index);
        let outcome = merge_wave(
            &base,
            results
                .into_iter()
                .map(|(index, ctx)| (wave[index].name(), ctx)),
        );
        debug!(
            merged = wave.len(),
            conflicts = outcome.conflicts.len(),
            "Wave merged"
        );
        Ok(outcome.context)
    }
}

async fn run_stage(
    stage: Arc<dyn Stage>,
    ctx: PipelineContext,
    semaphore: Arc<Semaphore>,
    progress: Option<Arc<ProgressNotifier>>,
) -> Result<PipelineContext, PipelineError> {
    let name = stage.name();
    let _permit = semaphore.acquire_owned().await.map_err(|err| {
        PipelineError::Internal(format!("Stage '{name}' could not acquire a slot: {err}"))
    })?;

    if let Some(progress) = &progress {
        progress.update(name, 0.0);
    }
    let started = Instant::now();

    match stage.execute(ctx).await {
        Ok(next) => {
            if let Some(progress) = &progress {
                progress.update(name, 1.0);
            }
            info!(
                stage = %name,
                duration_ms = started.elapsed().as_secs_f64() * 1000.0,
                "Stage completed"
            );
            Ok(next)
        }
        Err(err) => {
            error!(stage = %name, error = %err, "Stage failed");
            Err(StageExecutionError::new(name, err).into())
        }
    }
}

/// Aborts every tracked task when dropped.
#[derive(Default)]
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}
