//! Stub generation services and compositor.
//!
//! Each stub returns a deterministic path numbered by call, counts calls,
//! remembers its inputs, and can be told to fail its first `n` calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::VoiceTrack;
use crate::errors::CompositorError;
use crate::services::{
    CompositionRequest, GenerationServices, IdeaDraft, IdeaGenerator, ImageGenerator,
    MediaCompositor, MusicGenerator, VideoGenerator, VoiceGenerator,
};

/// Call bookkeeping shared by the stubs.
#[derive(Debug, Default)]
struct Calls {
    count: AtomicUsize,
    failures_left: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl Calls {
    fn failing(n: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Records a call and returns its 1-based number, or the injected failure.
    fn record(&self, service: &str, input: &str) -> anyhow::Result<usize> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        self.inputs.lock().push(input.to_string());
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("{service} unavailable (call {n})");
        }
        Ok(n)
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }
}

macro_rules! stub_accessors {
    ($ty:ident) => {
        impl $ty {
            /// Fails the first `n` calls.
            #[must_use]
            pub fn failing(n: usize) -> Self {
                Self {
                    calls: Calls::failing(n),
                    ..Self::default()
                }
            }

            /// Returns the number of calls, failed ones included.
            #[must_use]
            pub fn call_count(&self) -> usize {
                self.calls.count()
            }

            /// Returns the input of every call.
            #[must_use]
            pub fn inputs(&self) -> Vec<String> {
                self.calls.inputs()
            }
        }
    };
}

/// Returns `idea {n}` / `prompt {n}`.
#[derive(Debug, Default)]
pub struct StubIdeaGenerator {
    calls: Calls,
    history: Mutex<Vec<String>>,
}

stub_accessors!(StubIdeaGenerator);

#[async_trait]
impl IdeaGenerator for StubIdeaGenerator {
    async fn generate(&self) -> anyhow::Result<IdeaDraft> {
        let n = self.calls.record("idea service", "")?;
        let draft = IdeaDraft::new(format!("idea {n}"), format!("prompt {n}"));
        self.history.lock().push(draft.idea.clone());
        Ok(draft)
    }

    async fn history(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.history.lock().clone())
    }

    async fn clear_history(&self) -> anyhow::Result<()> {
        self.history.lock().clear();
        Ok(())
    }
}

/// Returns `image_{n}.png`.
#[derive(Debug, Default)]
pub struct StubImageGenerator {
    calls: Calls,
}

stub_accessors!(StubImageGenerator);

#[async_trait]
impl ImageGenerator for StubImageGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        let n = self.calls.record("image service", prompt)?;
        Ok(format!("image_{n}.png"))
    }
}

/// Returns `video_{n}.mp4`.
#[derive(Debug, Default)]
pub struct StubVideoGenerator {
    calls: Calls,
}

stub_accessors!(StubVideoGenerator);

#[async_trait]
impl VideoGenerator for StubVideoGenerator {
    async fn generate(&self, prompt: &str, image_path: &str) -> anyhow::Result<String> {
        let n = self
            .calls
            .record("video service", &format!("{prompt}|{image_path}"))?;
        Ok(format!("video_{n}.mp4"))
    }
}

/// Returns `music_{n}.mp3`.
#[derive(Debug, Default)]
pub struct StubMusicGenerator {
    calls: Calls,
}

stub_accessors!(StubMusicGenerator);

#[async_trait]
impl MusicGenerator for StubMusicGenerator {
    async fn generate(&self, idea: &str) -> anyhow::Result<String> {
        let n = self.calls.record("music service", idea)?;
        Ok(format!("music_{n}.mp3"))
    }
}

/// Returns a `voice_{n}.mp3` track whose dialog is the idea.
#[derive(Debug, Default)]
pub struct StubVoiceGenerator {
    calls: Calls,
}

stub_accessors!(StubVoiceGenerator);

#[async_trait]
impl VoiceGenerator for StubVoiceGenerator {
    async fn generate(&self, idea: &str) -> anyhow::Result<VoiceTrack> {
        let n = self.calls.record("voice service", idea)?;
        Ok(VoiceTrack::new(format!("voice_{n}.mp3"))
            .with_dialog(idea)
            .with_voice("alloy"))
    }
}

/// One stub per service, kept so tests can inspect them after a run.
#[derive(Debug, Clone, Default)]
pub struct StubServices {
    /// Idea stub.
    pub idea: Arc<StubIdeaGenerator>,
    /// Image stub.
    pub image: Arc<StubImageGenerator>,
    /// Video stub.
    pub video: Arc<StubVideoGenerator>,
    /// Music stub.
    pub music: Arc<StubMusicGenerator>,
    /// Voice stub; unused unless [`StubServices::services_with_voice`] is called.
    pub voice: Arc<StubVoiceGenerator>,
}

impl StubServices {
    /// Creates fresh stubs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the music stub.
    #[must_use]
    pub fn with_music(mut self, music: StubMusicGenerator) -> Self {
        self.music = Arc::new(music);
        self
    }

    /// Returns a registry without voice.
    #[must_use]
    pub fn services(&self) -> GenerationServices {
        GenerationServices::new(
            self.idea.clone(),
            self.image.clone(),
            self.video.clone(),
            self.music.clone(),
        )
    }

    /// Returns a registry including the voice stub.
    #[must_use]
    pub fn services_with_voice(&self) -> GenerationServices {
        self.services().with_voice(self.voice.clone())
    }
}

/// A compositor that records requests and echoes the output path.
#[derive(Debug, Default)]
pub struct RecordingCompositor {
    requests: Mutex<Vec<CompositionRequest>>,
    fail_with: Option<String>,
}

impl RecordingCompositor {
    /// Creates a compositor that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a compositor that fails every merge with `stderr`.
    #[must_use]
    pub fn failing(stderr: impl Into<String>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_with: Some(stderr.into()),
        }
    }

    /// Returns every request received.
    #[must_use]
    pub fn requests(&self) -> Vec<CompositionRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl MediaCompositor for RecordingCompositor {
    async fn merge(&self, request: &CompositionRequest) -> Result<String, CompositorError> {
        self.requests.lock().push(request.clone());
        match &self.fail_with {
            Some(stderr) => Err(CompositorError::Failed {
                status: 1,
                stderr: stderr.clone(),
            }),
            None => Ok(request.output_path.clone()),
        }
    }
}
