//! Engine configuration: sample rate, channel count, buffer sizing, and
//! device selection, with eager validation and an optional TOML bootstrap
//! loader for host applications that want file-based config.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Engine configuration. Validated once at construction; an `AudioConfig`
/// that exists is guaranteed internally consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u8,
    pub buffer_size_frames: u32,
    pub enable_output: bool,
    pub enable_input: bool,
    pub output_device: Option<String>,
    pub input_device: Option<String>,
}

/// Bounds the construction-time validation accepts.
const MIN_SAMPLE_RATE: u32 = 8_000;
const MAX_SAMPLE_RATE: u32 = 192_000;
const MAX_CHANNELS: u8 = 8;
const MIN_BUFFER_FRAMES: u32 = 128;
const MAX_BUFFER_FRAMES: u32 = 4_096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample rate {0} Hz out of range ({MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE})")]
    SampleRateOutOfRange(u32),

    #[error("channel count {0} out of range (1..={MAX_CHANNELS})")]
    ChannelsOutOfRange(u8),

    #[error("buffer size {0} frames out of range ({MIN_BUFFER_FRAMES}..={MAX_BUFFER_FRAMES})")]
    BufferSizeOutOfRange(u32),

    #[error("neither output nor input is enabled")]
    NoIoEnabled,

    #[error("failed to read config file: {0}")]
    Io(String),

    #[error("failed to parse TOML config: {0}")]
    Parse(String),
}

impl AudioConfig {
    /// Construct and validate a config. Returns `Err` rather than panicking
    /// on an invalid value; there is no code path that produces an invalid
    /// `AudioConfig` once this returns `Ok`.
    pub fn new(
        sample_rate: u32,
        channels: u8,
        buffer_size_frames: u32,
        enable_output: bool,
        enable_input: bool,
    ) -> Result<Self, ConfigError> {
        let config = AudioConfig {
            sample_rate,
            channels,
            buffer_size_frames,
            enable_output,
            enable_input,
            output_device: None,
            input_device: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRateOutOfRange(self.sample_rate));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(ConfigError::ChannelsOutOfRange(self.channels));
        }
        if !(MIN_BUFFER_FRAMES..=MAX_BUFFER_FRAMES).contains(&self.buffer_size_frames) {
            return Err(ConfigError::BufferSizeOutOfRange(self.buffer_size_frames));
        }
        if !self.enable_output && !self.enable_input {
            return Err(ConfigError::NoIoEnabled);
        }
        Ok(())
    }

    /// A sensible default: 48 kHz stereo, 1024-frame periods, output only.
    pub fn default_stereo_output() -> Self {
        AudioConfig {
            sample_rate: 48_000,
            channels: 2,
            buffer_size_frames: 1024,
            enable_output: true,
            enable_input: false,
            output_device: None,
            input_device: None,
        }
    }
}

/// TOML-deserializable bootstrap form of [`AudioConfig`]. Host applications
/// may load engine-level settings from disk; this is the one place this
/// crate reads from disk, and it never holds playback state.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlAudioConfig {
    pub sample_rate: u32,
    pub channels: u8,
    #[serde(default = "default_buffer_size_frames")]
    pub buffer_size_frames: u32,
    #[serde(default = "default_true")]
    pub enable_output: bool,
    #[serde(default)]
    pub enable_input: bool,
    #[serde(default)]
    pub output_device: Option<String>,
    #[serde(default)]
    pub input_device: Option<String>,
}

fn default_buffer_size_frames() -> u32 {
    1024
}

fn default_true() -> bool {
    true
}

impl TomlAudioConfig {
    pub fn into_config(self) -> Result<AudioConfig, ConfigError> {
        let config = AudioConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            buffer_size_frames: self.buffer_size_frames,
            enable_output: self.enable_output,
            enable_input: self.enable_input,
            output_device: self.output_device,
            input_device: self.input_device,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Load an [`AudioConfig`] from a TOML file on disk.
pub fn load_config(path: &Path) -> Result<AudioConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    let toml_config: TomlAudioConfig =
        toml::from_str(&toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    toml_config.into_config()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_config_constructs() {
        let config = AudioConfig::new(48_000, 2, 1024, true, false).unwrap();
        assert_eq!(config.sample_rate, 48_000);
    }

    #[test]
    fn rejects_sample_rate_out_of_range() {
        assert_eq!(
            AudioConfig::new(1_000, 2, 1024, true, false),
            Err(ConfigError::SampleRateOutOfRange(1_000))
        );
    }

    #[test]
    fn rejects_zero_channels() {
        assert_eq!(
            AudioConfig::new(48_000, 0, 1024, true, false),
            Err(ConfigError::ChannelsOutOfRange(0))
        );
    }

    #[test]
    fn rejects_no_io_enabled() {
        assert_eq!(
            AudioConfig::new(48_000, 2, 1024, false, false),
            Err(ConfigError::NoIoEnabled)
        );
    }

    #[test]
    fn malformed_toml_is_parse_error_not_panic() {
        let dir = std::env::temp_dir().join("audiocore_test_bad_config.toml");
        std::fs::write(&dir, "not valid toml {{{").unwrap();
        let result = load_config(&dir);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn default_stereo_output_is_valid() {
        AudioConfig::default_stereo_output().validate().unwrap();
    }
}
