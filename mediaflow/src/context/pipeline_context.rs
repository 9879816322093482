//! The pipeline-wide context record threaded through every stage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Voice-over produced by the voice stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VoiceTrack {
    /// Path of the rendered audio file.
    pub filename: String,
    /// The spoken dialog text.
    #[serde(default)]
    pub dialog: String,
    /// Provider voice identifier.
    #[serde(default)]
    pub voice: String,
    /// Delivery instructions passed to the provider.
    #[serde(default)]
    pub instructions: String,
}

impl VoiceTrack {
    /// Creates a voice track with only the audio file set.
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// Sets the dialog text.
    #[must_use]
    pub fn with_dialog(mut self, dialog: impl Into<String>) -> Self {
        self.dialog = dialog.into();
        self
    }

    /// Sets the voice identifier.
    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Sets the delivery instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }
}

/// A typed handle on one of the context's named fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextField {
    /// The idea text.
    Idea,
    /// The generation prompt.
    Prompt,
    /// The generated still image.
    ImagePath,
    /// The generated video clip.
    VideoPath,
    /// The generated soundtrack.
    MusicPath,
    /// The generated voice-over.
    Voice,
    /// The final composite.
    Output,
}

impl ContextField {
    /// Every named field, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Idea,
        Self::Prompt,
        Self::ImagePath,
        Self::VideoPath,
        Self::MusicPath,
        Self::Voice,
        Self::Output,
    ];

    /// Returns the serialized field name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Prompt => "prompt",
            Self::ImagePath => "image_path",
            Self::VideoPath => "video_path",
            Self::MusicPath => "music_path",
            Self::Voice => "voice",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for ContextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline-wide state: the idea, prompt, produced artifacts and free-form
/// metadata.
///
/// The context is a plain value. Concurrent stages each receive their own
/// clone and the parallel scheduler merges the results between waves.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineContext {
    /// The idea text.
    pub idea: Option<String>,
    /// The generation prompt.
    pub prompt: Option<String>,
    /// Path of the generated image.
    pub image_path: Option<String>,
    /// Path of the generated video.
    pub video_path: Option<String>,
    /// Path of the generated music.
    pub music_path: Option<String>,
    /// The generated voice-over.
    pub voice: Option<VoiceTrack>,
    /// Path of the final composite.
    pub output: Option<String>,
    /// Open metadata.
    pub meta: HashMap<String, serde_json::Value>,
}

impl PipelineContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the idea.
    #[must_use]
    pub fn with_idea(mut self, idea: impl Into<String>) -> Self {
        self.idea = Some(idea.into());
        self
    }

    /// Sets the prompt.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Sets the image path.
    #[must_use]
    pub fn with_image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    /// Sets the video path.
    #[must_use]
    pub fn with_video_path(mut self, path: impl Into<String>) -> Self {
        self.video_path = Some(path.into());
        self
    }

    /// Sets the music path.
    #[must_use]
    pub fn with_music_path(mut self, path: impl Into<String>) -> Self {
        self.music_path = Some(path.into());
        self
    }

    /// Sets the voice track.
    #[must_use]
    pub fn with_voice(mut self, voice: VoiceTrack) -> Self {
        self.voice = Some(voice);
        self
    }

    /// Sets the final output path.
    #[must_use]
    pub fn with_output(mut self, path: impl Into<String>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Sets a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Returns true if the field is set to a usable value.
    ///
    /// Empty strings count as unset.
    #[must_use]
    pub fn has(&self, field: ContextField) -> bool {
        match field {
            ContextField::Voice => self.voice.is_some(),
            _ => self
                .text(field)
                .is_some_and(|value| !value.is_empty()),
        }
    }

    /// Returns the fields from `required` that are not set.
    #[must_use]
    pub fn missing(&self, required: &[ContextField]) -> Vec<ContextField> {
        required
            .iter()
            .copied()
            .filter(|field| !self.has(*field))
            .collect()
    }

    /// Returns true if the field is non-null, regardless of content.
    #[must_use]
    pub fn is_present(&self, field: ContextField) -> bool {
        match field {
            ContextField::Voice => self.voice.is_some(),
            _ => self.text(field).is_some(),
        }
    }

    /// Returns the fields that are non-null.
    #[must_use]
    pub fn present_fields(&self) -> Vec<ContextField> {
        ContextField::ALL
            .into_iter()
            .filter(|field| self.is_present(*field))
            .collect()
    }

    pub(crate) fn differs(&self, other: &Self, field: ContextField) -> bool {
        match field {
            ContextField::Voice => self.voice != other.voice,
            _ => self.text(field) != other.text(field),
        }
    }

    pub(crate) fn copy_field_from(&mut self, other: &Self, field: ContextField) {
        match field {
            ContextField::Voice => self.voice.clone_from(&other.voice),
            ContextField::Idea => self.idea.clone_from(&other.idea),
            ContextField::Prompt => self.prompt.clone_from(&other.prompt),
            ContextField::ImagePath => self.image_path.clone_from(&other.image_path),
            ContextField::VideoPath => self.video_path.clone_from(&other.video_path),
            ContextField::MusicPath => self.music_path.clone_from(&other.music_path),
            ContextField::Output => self.output.clone_from(&other.output),
        }
    }

    fn text(&self, field: ContextField) -> Option<&String> {
        match field {
            ContextField::Idea => self.idea.as_ref(),
            ContextField::Prompt => self.prompt.as_ref(),
            ContextField::ImagePath => self.image_path.as_ref(),
            ContextField::VideoPath => self.video_path.as_ref(),
            ContextField::MusicPath => self.music_path.as_ref(),
            ContextField::Output => self.output.as_ref(),
            ContextField::Voice => None,
        }
    }
}
