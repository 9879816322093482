//! Capability interfaces for the generation services the stages drive.
//!
//! The execution core does not care how a service produces its output
//! (network call, local model, stub). Each generator kind gets its own
//! trait and is injected into its stage at build time through
//! [`GenerationServices`].

mod compositor;

pub use compositor::{CompositionRequest, FfmpegCompositor, MediaCompositor};

#[cfg(test)]
pub use compositor::MockMediaCompositor;

use crate::context::VoiceTrack;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An idea plus the prompt derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaDraft {
    /// The idea text.
    pub idea: String,
    /// The prompt to feed image and video generation.
    pub prompt: String,
}

impl IdeaDraft {
    /// Creates a new draft.
    #[must_use]
    pub fn new(idea: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            idea: idea.into(),
            prompt: prompt.into(),
        }
    }
}

/// Produces ideas and prompts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdeaGenerator: Send + Sync {
    /// Generates a fresh idea.
    async fn generate(&self) -> anyhow::Result<IdeaDraft>;

    /// Returns previously generated ideas.
    async fn history(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Forgets previously generated ideas.
    async fn clear_history(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Renders a still image from a prompt.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the path of the generated image.
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Animates an image into a video clip.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Returns the path of the generated video.
    async fn generate(&self, prompt: &str, image_path: &str) -> anyhow::Result<String>;
}

/// Composes a soundtrack.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicGenerator: Send + Sync {
    /// Returns the path of the generated music.
    async fn generate(&self, idea: &str) -> anyhow::Result<String>;
}

/// Records a voice-over.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceGenerator: Send + Sync {
    /// Returns the rendered voice track.
    async fn generate(&self, idea: &str) -> anyhow::Result<VoiceTrack>;
}

/// Typed registry of the services a content pipeline needs.
///
/// Voice is optional; when absent the voice stage is left out.
#[derive(Clone)]
pub struct GenerationServices {
    /// Idea service.
    pub idea: Arc<dyn IdeaGenerator>,
    /// Image service.
    pub image: Arc<dyn ImageGenerator>,
    /// Video service.
    pub video: Arc<dyn VideoGenerator>,
    /// Music service.
    pub music: Arc<dyn MusicGenerator>,
    /// Optional voice service.
    pub voice: Option<Arc<dyn VoiceGenerator>>,
}

impl GenerationServices {
    /// Creates a registry without a voice service.
    #[must_use]
    pub fn new(
        idea: Arc<dyn IdeaGenerator>,
        image: Arc<dyn ImageGenerator>,
        video: Arc<dyn VideoGenerator>,
        music: Arc<dyn MusicGenerator>,
    ) -> Self {
        Self {
            idea,
            image,
            video,
            music,
            voice: None,
        }
    }

    /// Adds a voice service.
    #[must_use]
    pub fn with_voice(mut self, voice: Arc<dyn VoiceGenerator>) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Returns true if a voice service is configured.
    #[must_use]
    pub fn has_voice(&self) -> bool {
        self.voice.is_some()
    }
}

impl fmt::Debug for GenerationServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationServices")
            .field("voice", &self.has_voice())
            .finish_non_exhaustive()
    }
}
