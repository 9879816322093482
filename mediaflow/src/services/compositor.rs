//! The media-muxing collaborator used by the composition stage.

use crate::errors::CompositorError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// Inputs to a single mux.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionRequest {
    /// The video track.
    pub video_path: String,
    /// The music track.
    pub music_path: String,
    /// Optional voice-over mixed over the music.
    pub voice_path: Option<String>,
    /// Where to write the composite.
    pub output_path: String,
    /// Target duration in seconds.
    pub duration_secs: u32,
}

/// Muxes video, music and an optional voice-over into one file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaCompositor: Send + Sync {
    /// Writes the composite and returns its path.
    async fn merge(&self, request: &CompositionRequest) -> Result<String, CompositorError>;
}

/// Compositor backed by the `ffmpeg` command-line tool.
#[derive(Debug, Clone)]
pub struct FfmpegCompositor {
    binary: PathBuf,
}

impl Default for FfmpegCompositor {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl FfmpegCompositor {
    /// Creates a compositor that runs `ffmpeg` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific `ffmpeg` binary.
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Builds the argument list for a request.
    ///
    /// With a voice-over, the music is ducked to 40% and the voice is
    /// delayed by one second and boosted before the two are mixed.
    #[must_use]
    pub fn args(request: &CompositionRequest) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-i".into(),
            request.video_path.clone(),
            "-i".into(),
            request.music_path.clone(),
        ];

        if let Some(voice) = &request.voice_path {
            args.extend([
                "-i".into(),
                voice.clone(),
                "-filter_complex".into(),
                "[1:a]volume=0.4[m];[2:a]adelay=1000|1000,volume=1.5[v];[m][v]amix=inputs=2:duration=longest[a]".into(),
                "-map".into(),
                "0:v".into(),
                "-map".into(),
                "[a]".into(),
            ]);
        } else {
            args.extend(["-map".into(), "0:v".into(), "-map".into(), "1:a".into()]);
        }

        args.extend([
            "-shortest".into(),
            "-t".into(),
            request.duration_secs.to_string(),
            "-c:v".into(),
            "libx264".into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            request.output_path.clone(),
        ]);
        args
    }
}

#[async_trait]
impl MediaCompositor for FfmpegCompositor {
    async fn merge(&self, request: &CompositionRequest) -> Result<String, CompositorError> {
        let args = Self::args(request);
        debug!(binary = %self.binary.display(), ?args, "Launching compositor");

        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(CompositorError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        info!(output = %request.output_path, "Composite written");
        Ok(request.output_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(voice: Option<&str>) -> CompositionRequest {
        CompositionRequest {
            video_path: "v.mp4".into(),
            music_path: "m.mp3".into(),
            voice_path: voice.map(Into::into),
            output_path: "final_output.mp4".into(),
            duration_secs: 10,
        }
    }

    #[test]
    fn test_args_without_voice() {
        let args = FfmpegCompositor::args(&request(None));
        assert_eq!(&args[..5], ["-y", "-i", "v.mp4", "-i", "m.mp3"]);
        assert!(args.windows(2).any(|w| w == ["-map", "1:a"]));
        assert!(!args.iter().any(|a| a == "-filter_complex"));
        assert!(args.windows(2).any(|w| w == ["-t", "10"]));
        assert_eq!(args.last().map(String::as_str), Some("final_output.mp4"));
    }

    #[test]
    fn test_args_with_voice_mixes_tracks() {
        let args = FfmpegCompositor::args(&request(Some("voice.mp3")));
        assert!(args.windows(2).any(|w| w == ["-i", "voice.mp3"]));
        assert!(args.windows(2).any(|w| w == ["-map", "[a]"]));
        let filter_pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert!(args[filter_pos + 1].contains("amix=inputs=2"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let compositor = FfmpegCompositor::with_binary("/nonexistent/mediaflow-ffmpeg");
        let err = compositor.merge(&request(None)).await.unwrap_err();
        assert!(matches!(err, CompositorError::Launch(_)));
    }
}
