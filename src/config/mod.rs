//! Application Configuration
//!
//! Normalizer, session and pipeline settings stored in TOML format.

use anyhow::{Context, Result};
use image::Rgba;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::session::{DebouncePolicy, ReadingRange, SessionConfig, DEFAULT_ERROR_CEILING};
use crate::vision::{NormalizerConfig, DEFAULT_TARGET_SIDE};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Frame normalization settings
    #[serde(default)]
    pub normalizer: NormalizerSettings,
    /// Reading session settings
    #[serde(default)]
    pub session: SessionSettings,
    /// Plausible readings for the meter type being read
    #[serde(default)]
    pub reading_range: ReadingRange,
    /// Processing thread settings
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// Normalizer configuration derived from these settings
    pub fn normalizer_config(&self) -> NormalizerConfig {
        let gray = self.normalizer.fill_gray;
        NormalizerConfig {
            target_side: self.normalizer.target_side,
            fill: Rgba([gray, gray, gray, 0xFF]),
            grayscale: self.normalizer.grayscale,
        }
    }

    /// Session configuration derived from these settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            error_ceiling: self.session.error_ceiling,
            debounce: DebouncePolicy {
                required_frames: self.session.debounce_frames,
            },
            reading_range: Some(self.reading_range),
        }
    }
}

/// Frame normalization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerSettings {
    /// Side of the square model input
    pub target_side: u32,
    /// Desaturate frames before detection
    pub grayscale: bool,
    /// Gray level of the letterbox bands
    pub fill_gray: u8,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            target_side: DEFAULT_TARGET_SIDE,
            grayscale: false,
            fill_gray: 0x88,
        }
    }
}

/// Reading session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Bad frames tolerated before asking for manual entry
    pub error_ceiling: u32,
    /// Identical consecutive frames needed to confirm a reading
    pub debounce_frames: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            error_ceiling: DEFAULT_ERROR_CEILING,
            debounce_frames: 1,
        }
    }
}

/// Processing thread settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// How long the processing thread waits for a frame before polling commands
    pub frame_wait_ms: u64,
    /// Undelivered session events kept for the UI before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_wait_ms: 50,
            event_capacity: default_event_capacity(),
        }
    }
}

impl PipelineSettings {
    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms.max(1))
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        // Normalizer defaults
        assert_eq!(config.normalizer.target_side, 640);
        assert!(!config.normalizer.grayscale);
        assert_eq!(config.normalizer.fill_gray, 0x88);

        // Session defaults
        assert_eq!(config.session.error_ceiling, 150);
        assert_eq!(config.session.debounce_frames, 1);

        // Range and pipeline defaults
        assert_eq!(config.reading_range, ReadingRange::new(0, 99_999_999));
        assert_eq!(config.pipeline.frame_wait(), Duration::from_millis(50));
        assert_eq!(config.pipeline.event_capacity, 1024);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.normalizer.grayscale = true;
        config.session.debounce_frames = 3;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert!(parsed.normalizer.grayscale);
        assert_eq!(parsed.session.debounce_frames, 3);
        assert_eq!(parsed.reading_range, config.reading_range);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [session]
            error_ceiling = 40
            debounce_frames = 2

            [reading_range]
            min = 1000
            max = 5000
            "#,
        )
        .unwrap();

        assert_eq!(parsed.session.error_ceiling, 40);
        assert_eq!(parsed.normalizer.target_side, 640);
        assert_eq!(parsed.pipeline.frame_wait_ms, 50);
        assert_eq!(parsed.pipeline.event_capacity, 1024);

        let session = parsed.session_config();
        assert_eq!(session.error_ceiling, 40);
        assert_eq!(session.debounce.required_frames, 2);
        assert_eq!(session.reading_range, Some(ReadingRange::new(1000, 5000)));
    }

    #[test]
    fn test_normalizer_config_fill() {
        let mut config = AppConfig::default();
        config.normalizer.fill_gray = 100;
        config.normalizer.target_side = 320;

        let normalizer = config.normalizer_config();
        assert_eq!(normalizer.fill, Rgba([100, 100, 100, 255]));
        assert_eq!(normalizer.target_side, 320);
    }

    #[test]
    fn test_save_and_load_config() {
        let mut config = AppConfig::default();
        config.session.error_ceiling = 75;

        let temp_file = NamedTempFile::new().unwrap();
        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(loaded.session.error_ceiling, 75);
        assert_eq!(loaded.normalizer.target_side, config.normalizer.target_side);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
