//! Pipeline configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The file was not valid JSON for [`PipelineConfig`].
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value was out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// What to do when a checkpoint names a stage that is not in the stage list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// Log a warning and run every stage from the start.
    #[default]
    Lenient,
    /// Fail before running anything.
    Strict,
}

/// Settings for building and scheduling content pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Composite duration in seconds (1..=60).
    pub default_video_duration: u32,
    /// Run count of a small batch (1..=10).
    pub video_batch_small: usize,
    /// Run count of a large batch; also caps concurrently running pipelines (1..=10).
    pub video_batch_large: usize,
    /// Stage concurrency of the parallel scheduler.
    pub parallel_concurrency: usize,
    /// Directory holding checkpoint files.
    pub state_dir: PathBuf,
    /// Template for the composite path. Each run writes to
    /// `<stem>_<run id>.<ext>` next to it.
    pub output_file: String,
    /// Prompt used by music-only runs when none is given.
    pub music_only_prompt: String,
    /// Handling of checkpoints that match no stage.
    pub resume_policy: ResumePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_video_duration: 10,
            video_batch_small: 3,
            video_batch_large: 5,
            parallel_concurrency: 4,
            state_dir: PathBuf::from("."),
            output_file: "final_output.mp4".to_string(),
            music_only_prompt: "ambient soundtrack".to_string(),
            resume_policy: ResumePolicy::Lenient,
        }
    }
}

impl PipelineConfig {
    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=60).contains(&self.default_video_duration) {
            return Err(ConfigError::Invalid(
                "default_video_duration must be between 1 and 60".to_string(),
            ));
        }
        if !(1..=10).contains(&self.video_batch_small) {
            return Err(ConfigError::Invalid(
                "video_batch_small must be between 1 and 10".to_string(),
            ));
        }
        if !(1..=10).contains(&self.video_batch_large) {
            return Err(ConfigError::Invalid(
                "video_batch_large must be between 1 and 10".to_string(),
            ));
        }
        if self.video_batch_large < self.video_batch_small {
            return Err(ConfigError::Invalid(
                "video_batch_large must be >= video_batch_small".to_string(),
            ));
        }
        if self.parallel_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "parallel_concurrency must be > 0".to_string(),
            ));
        }
        if self.output_file.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "output_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads and validates a JSON configuration file.
///
/// Keys missing from the file keep their defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: PipelineConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_video_duration, 10);
        assert_eq!(config.video_batch_large, 5);
        assert_eq!(config.parallel_concurrency, 4);
        assert_eq!(config.output_file, "final_output.mp4");
        assert_eq!(config.resume_policy, ResumePolicy::Lenient);
    }

    #[test]
    fn test_duration_out_of_range() {
        let config = PipelineConfig {
            default_video_duration: 61,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_video_duration"));
    }

    #[test]
    fn test_batch_ordering() {
        let config = PipelineConfig {
            video_batch_small: 6,
            video_batch_large: 4,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_parallel_concurrency() {
        let config = PipelineConfig {
            parallel_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"default_video_duration": 30, "resume_policy": "strict"}}"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.default_video_duration, 30);
        assert_eq!(config.resume_policy, ResumePolicy::Strict);
        assert_eq!(config.video_batch_small, 3);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"video_batch_large": 11}}"#).unwrap();
        assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("/nonexistent/mediaflow.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
