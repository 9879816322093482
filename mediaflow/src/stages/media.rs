//! The concrete media-generation stages.

use super::{ensure_inputs, Stage};
use crate::config::PipelineConfig;
use crate::context::{ContextField, PipelineContext};
use crate::errors::StageError;
use crate::services::{
    CompositionRequest, GenerationServices, IdeaGenerator, ImageGenerator, MediaCompositor,
    MusicGenerator, VideoGenerator, VoiceGenerator,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Name of the idea stage.
pub const IDEA_GENERATION: &str = "idea_generation";
/// Name of the image stage.
pub const IMAGE_GENERATION: &str = "image_generation";
/// Name of the video stage.
pub const VIDEO_GENERATION: &str = "video_generation";
/// Name of the music stage.
pub const MUSIC_GENERATION: &str = "music_generation";
/// Name of the voice stage.
pub const VOICE_GENERATION: &str = "voice_generation";
/// Name of the composition stage.
pub const COMPOSITION: &str = "composition";

fn deps(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// Sets `idea` and `prompt` from the idea service.
pub struct IdeaGeneration {
    service: Arc<dyn IdeaGenerator>,
}

impl IdeaGeneration {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn IdeaGenerator>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Stage for IdeaGeneration {
    fn name(&self) -> &str {
        IDEA_GENERATION
    }

    fn produces(&self) -> &[ContextField] {
        &[ContextField::Idea, ContextField::Prompt]
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        let draft = self
            .service
            .generate()
            .await
            .map_err(|e| StageError::service(IDEA_GENERATION, e))?;
        debug!(idea = %draft.idea, "Idea generated");
        ctx.idea = Some(draft.idea);
        ctx.prompt = Some(draft.prompt);
        Ok(ctx)
    }
}

/// Sets `image_path` from the prompt.
pub struct ImageGeneration {
    service: Arc<dyn ImageGenerator>,
    dependencies: Vec<String>,
}

impl ImageGeneration {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn ImageGenerator>) -> Self {
        Self {
            service,
            dependencies: deps(&[IDEA_GENERATION]),
        }
    }
}

#[async_trait]
impl Stage for ImageGeneration {
    fn name(&self) -> &str {
        IMAGE_GENERATION
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn required_inputs(&self) -> &[ContextField] {
        &[ContextField::Prompt]
    }

    fn produces(&self) -> &[ContextField] {
        &[ContextField::ImagePath]
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        ensure_inputs(self, &ctx)?;
        let prompt = ctx.prompt.as_deref().unwrap_or_default();
        let path = self
            .service
            .generate(prompt)
            .await
            .map_err(|e| StageError::service(IMAGE_GENERATION, e))?;
        ctx.image_path = Some(path);
        Ok(ctx)
    }
}

/// Sets `video_path` from the prompt and image.
pub struct VideoGeneration {
    service: Arc<dyn VideoGenerator>,
    dependencies: Vec<String>,
}

impl VideoGeneration {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn VideoGenerator>) -> Self {
        Self {
            service,
            dependencies: deps(&[IDEA_GENERATION, IMAGE_GENERATION]),
        }
    }
}

#[async_trait]
impl Stage for VideoGeneration {
    fn name(&self) -> &str {
        VIDEO_GENERATION
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn required_inputs(&self) -> &[ContextField] {
        &[ContextField::Prompt, ContextField::ImagePath]
    }

    fn produces(&self) -> &[ContextField] {
        &[ContextField::VideoPath]
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        ensure_inputs(self, &ctx)?;
        let prompt = ctx.prompt.as_deref().unwrap_or_default();
        let image = ctx.image_path.as_deref().unwrap_or_default();
        let path = self
            .service
            .generate(prompt, image)
            .await
            .map_err(|e| StageError::service(VIDEO_GENERATION, e))?;
        ctx.video_path = Some(path);
        Ok(ctx)
    }
}

/// Sets `music_path` from the idea.
pub struct MusicGeneration {
    service: Arc<dyn MusicGenerator>,
    dependencies: Vec<String>,
}

impl MusicGeneration {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn MusicGenerator>) -> Self {
        Self {
            service,
            dependencies: deps(&[IDEA_GENERATION]),
        }
    }

    /// Creates the stage with no upstream stage, for runs seeded with an idea.
    #[must_use]
    pub fn standalone(service: Arc<dyn MusicGenerator>) -> Self {
        Self {
            service,
            dependencies: Vec::new(),
        }
    }
}

#[async_trait]
impl Stage for MusicGeneration {
    fn name(&self) -> &str {
        MUSIC_GENERATION
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn required_inputs(&self) -> &[ContextField] {
        &[ContextField::Idea]
    }

    fn produces(&self) -> &[ContextField] {
        &[ContextField::MusicPath]
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        ensure_inputs(self, &ctx)?;
        let idea = ctx.idea.as_deref().unwrap_or_default();
        let path = self
            .service
            .generate(idea)
            .await
            .map_err(|e| StageError::service(MUSIC_GENERATION, e))?;
        ctx.music_path = Some(path);
        Ok(ctx)
    }
}

/// Sets `voice` from the idea.
pub struct VoiceGeneration {
    service: Arc<dyn VoiceGenerator>,
    dependencies: Vec<String>,
}

impl VoiceGeneration {
    /// Creates the stage.
    #[must_use]
    pub fn new(service: Arc<dyn VoiceGenerator>) -> Self {
        Self {
            service,
            dependencies: deps(&[IDEA_GENERATION]),
        }
    }
}

#[async_trait]
impl Stage for VoiceGeneration {
    fn name(&self) -> &str {
        VOICE_GENERATION
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn required_inputs(&self) -> &[ContextField] {
        &[ContextField::Idea]
    }

    fn produces(&self) -> &[ContextField] {
        &[ContextField::Voice]
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        ensure_inputs(self, &ctx)?;
        let idea = ctx.idea.as_deref().unwrap_or_default();
        let track = self
            .service
            .generate(idea)
            .await
            .map_err(|e| StageError::service(VOICE_GENERATION, e))?;
        ctx.voice = Some(track);
        Ok(ctx)
    }
}

/// Terminal stage: muxes video, music and the optional voice into `output`.
pub struct Composition {
    compositor: Arc<dyn MediaCompositor>,
    output_path: String,
    duration_secs: u32,
    dependencies: Vec<String>,
}

impl Composition {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        compositor: Arc<dyn MediaCompositor>,
        output_path: impl Into<String>,
        duration_secs: u32,
    ) -> Self {
        Self {
            compositor,
            output_path: output_path.into(),
            duration_secs,
            dependencies: deps(&[VIDEO_GENERATION, MUSIC_GENERATION]),
        }
    }

    /// Also waits for the voice stage.
    #[must_use]
    pub fn with_voice_dependency(mut self) -> Self {
        self.dependencies.push(VOICE_GENERATION.to_string());
        self
    }
}

#[async_trait]
impl Stage for Composition {
    fn name(&self) -> &str {
        COMPOSITION
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn required_inputs(&self) -> &[ContextField] {
        &[ContextField::VideoPath, ContextField::MusicPath]
    }

    fn produces(&self) -> &[ContextField] {
        &[ContextField::Output]
    }

    async fn execute(&self, mut ctx: PipelineContext) -> Result<PipelineContext, StageError> {
        ensure_inputs(self, &ctx)?;
        let request = CompositionRequest {
            video_path: ctx.video_path.clone().unwrap_or_default(),
            music_path: ctx.music_path.clone().unwrap_or_default(),
            voice_path: ctx.voice.as_ref().map(|v| v.filename.clone()),
            output_path: self.output_path.clone(),
            duration_secs: self.duration_secs,
        };
        let output = self
            .compositor
            .merge(&request)
            .await
            .map_err(|e| StageError::compositor(COMPOSITION, e))?;
        ctx.output = Some(output);
        Ok(ctx)
    }
}

macro_rules! stage_debug {
    ($($ty:ident),*) => {
        $(
            impl fmt::Debug for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_struct(stringify!($ty))
                        .field("name", &self.name())
                        .field("dependencies", &self.dependencies())
                        .finish_non_exhaustive()
                }
            }
        )*
    };
}

stage_debug!(
    IdeaGeneration,
    ImageGeneration,
    VideoGeneration,
    MusicGeneration,
    VoiceGeneration,
    Composition
);

/// Builds the fixed-order stage list: idea, image, video, music, [voice],
/// composition.
#[must_use]
pub fn build_stages(
    services: &GenerationServices,
    compositor: Arc<dyn MediaCompositor>,
    config: &PipelineConfig,
) -> Vec<Arc<dyn Stage>> {
    let mut stages: Vec<Arc<dyn Stage>> = vec![
        Arc::new(IdeaGeneration::new(services.idea.clone())),
        Arc::new(ImageGeneration::new(services.image.clone())),
        Arc::new(VideoGeneration::new(services.video.clone())),
        Arc::new(MusicGeneration::new(services.music.clone())),
    ];

    let mut composition = Composition::new(
        compositor,
        config.output_file.clone(),
        config.default_video_duration,
    );
    if let Some(voice) = &services.voice {
        stages.push(Arc::new(VoiceGeneration::new(voice.clone())));
        composition = composition.with_voice_dependency();
    }
    stages.push(Arc::new(composition));
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::VoiceTrack;
    use crate::errors::CompositorError;
    use crate::services::{
        IdeaDraft, MockIdeaGenerator, MockImageGenerator, MockMediaCompositor, MockMusicGenerator,
        MockVideoGenerator, MockVoiceGenerator,
    };

    #[tokio::test]
    async fn test_image_stage_rejects_missing_prompt_without_calling_service() {
        let mut service = MockImageGenerator::new();
        service.expect_generate().times(0);
        let stage = ImageGeneration::new(Arc::new(service));

        let ctx = PipelineContext::new().with_idea("only an idea");
        assert!(!stage.validate_inputs(&ctx));

        let err = stage.execute(ctx).await.unwrap_err();
        assert!(err.is_precondition());
        match err {
            StageError::Precondition(pre) => assert_eq!(pre.missing, vec![ContextField::Prompt]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_idea_stage_sets_idea_and_prompt() {
        let mut service = MockIdeaGenerator::new();
        service
            .expect_generate()
            .times(1)
            .returning(|| Ok(IdeaDraft::new("a fox", "a fox in snow")));
        let stage = IdeaGeneration::new(Arc::new(service));

        let out = stage.execute(PipelineContext::new()).await.unwrap();
        assert_eq!(out.idea.as_deref(), Some("a fox"));
        assert_eq!(out.prompt.as_deref(), Some("a fox in snow"));
    }

    #[tokio::test]
    async fn test_video_stage_passes_prompt_and_image() {
        let mut service = MockVideoGenerator::new();
        service
            .expect_generate()
            .withf(|prompt, image| prompt == "p" && image == "i.png")
            .times(1)
            .returning(|_, _| Ok("v.mp4".to_string()));
        let stage = VideoGeneration::new(Arc::new(service));

        let ctx = PipelineContext::new().with_prompt("p").with_image_path("i.png");
        let out = stage.execute(ctx).await.unwrap();
        assert_eq!(out.video_path.as_deref(), Some("v.mp4"));
    }

    #[tokio::test]
    async fn test_video_stage_requires_image() {
        let mut service = MockVideoGenerator::new();
        service.expect_generate().times(0);
        let stage = VideoGeneration::new(Arc::new(service));

        let err = stage
            .execute(PipelineContext::new().with_prompt("p"))
            .await
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn test_service_failure_is_not_precondition() {
        let mut service = MockMusicGenerator::new();
        service
            .expect_generate()
            .returning(|_| Err(anyhow::anyhow!("rate limited")));
        let stage = MusicGeneration::new(Arc::new(service));

        let err = stage
            .execute(PipelineContext::new().with_idea("x"))
            .await
            .unwrap_err();
        assert!(!err.is_precondition());
        assert_eq!(err.stage_name(), MUSIC_GENERATION);
    }

    #[tokio::test]
    async fn test_voice_stage_sets_track() {
        let mut service = MockVoiceGenerator::new();
        service
            .expect_generate()
            .returning(|idea| Ok(VoiceTrack::new("voice.mp3").with_dialog(idea)));
        let stage = VoiceGeneration::new(Arc::new(service));

        let out = stage
            .execute(PipelineContext::new().with_idea("hello"))
            .await
            .unwrap();
        assert_eq!(out.voice.unwrap().dialog, "hello");
    }

    #[tokio::test]
    async fn test_composition_passes_voice_filename() {
        let mut compositor = MockMediaCompositor::new();
        compositor
            .expect_merge()
            .withf(|req| {
                req.voice_path.as_deref() == Some("voice.mp3")
                    && req.duration_secs == 12
                    && req.output_path == "out.mp4"
            })
            .times(1)
            .returning(|req| Ok(req.output_path.clone()));
        let stage = Composition::new(Arc::new(compositor), "out.mp4", 12);

        let ctx = PipelineContext::new()
            .with_video_path("v.mp4")
            .with_music_path("m.mp3")
            .with_voice(VoiceTrack::new("voice.mp3"));
        let out = stage.execute(ctx).await.unwrap();
        assert_eq!(out.output.as_deref(), Some("out.mp4"));
    }

    #[tokio::test]
    async fn test_composition_failure_is_fatal_stage_error() {
        let mut compositor = MockMediaCompositor::new();
        compositor.expect_merge().returning(|_| {
            Err(CompositorError::Failed {
                status: 1,
                stderr: "bad codec".to_string(),
            })
        });
        let stage = Composition::new(Arc::new(compositor), "out.mp4", 10);

        let ctx = PipelineContext::new()
            .with_video_path("v.mp4")
            .with_music_path("m.mp3");
        let err = stage.execute(ctx).await.unwrap_err();
        assert!(matches!(err, StageError::Compositor { .. }));
        assert!(err.to_string().contains("bad codec"));
    }

    #[test]
    fn test_build_stages_order_and_voice_wiring() {
        let services = GenerationServices::new(
            Arc::new(MockIdeaGenerator::new()),
            Arc::new(MockImageGenerator::new()),
            Arc::new(MockVideoGenerator::new()),
            Arc::new(MockMusicGenerator::new()),
        );
        let config = PipelineConfig::default();

        let names: Vec<String> = build_stages(&services, Arc::new(MockMediaCompositor::new()), &config)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(
            names,
            [IDEA_GENERATION, IMAGE_GENERATION, VIDEO_GENERATION, MUSIC_GENERATION, COMPOSITION]
        );

        let with_voice = services.with_voice(Arc::new(MockVoiceGenerator::new()));
        let stages = build_stages(&with_voice, Arc::new(MockMediaCompositor::new()), &config);
        assert_eq!(stages.len(), 6);
        assert_eq!(stages[4].name(), VOICE_GENERATION);
        assert!(stages[5]
            .dependencies()
            .iter()
            .any(|d| d == VOICE_GENERATION));
    }
}
