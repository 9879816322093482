//! Pipeline planning and execution.
//!
//! This module provides:
//! - Dependency graph validation and wave grouping
//! - The checkpointed sequential scheduler
//! - The wave-based parallel scheduler
//! - The content pipeline façade

mod content;
mod dag;
mod parallel;
mod sequential;


pub use content::{BatchSize, ContentPipeline, MusicOutcome, VideoOutcome};
pub use dag::ExecutionPlan;
pub use parallel::{ParallelScheduler, DEFAULT_PARALLEL_CONCURRENCY};
pub use sequential::PipelineScheduler;
