//! Testing utilities for mediaflow pipelines.
//!
//! This module provides:
//! - Recording, failing and concurrency-probing stages
//! - Stub generation services and a recording compositor
//! - A state store that counts its calls

mod mocks;
mod services;
mod stores;

pub use mocks::{FailingStage, FieldStage, OverlapStage, RecordingStage};
pub use services::{
    RecordingCompositor, StubIdeaGenerator, StubImageGenerator, StubMusicGenerator,
    StubServices, StubVideoGenerator, StubVoiceGenerator,
};
pub use stores::RecordingStateStore;
