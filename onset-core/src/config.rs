//! # Configuration Module
//!
//! Holds the constants the analyzer and the pipeline controller depend on,
//! plus JSON helpers for saving and loading them.
//!
//! ## Defaults
//! - Sample Rate: 44.1 kHz
//! - Window Size: 1024 samples (~23ms at 44.1kHz)
//! - Ring Buffer: `sample_rate / window_size` flux values (~1 second)
//! - Thresholding: mean of the last 10 flux values, times 1.5
//! - Instrument Range: 80 Hz to 1200 Hz (guitar)

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::ConfigError;

/// Parameters of the spectral analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Sample rate of the incoming frames in Hz.
    pub sample_rate: u32,
    /// Number of samples per frame.
    pub window_size: usize,
    /// Capacity of the flux history. `None` keeps roughly one second of history.
    pub ring_buffer_size: Option<usize>,
    /// Number of most recent flux values averaged into the adaptive threshold.
    pub threshold_window_size: usize,
    /// Multiplier applied to the flux mean. Must be greater than 1.
    pub threshold_multiplier: f32,
    /// Lowest fundamental frequency reported, in Hz.
    pub min_frequency: f32,
    /// Highest fundamental frequency reported, in Hz.
    pub max_frequency: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            window_size: 1024,
            ring_buffer_size: None,
            threshold_window_size: 10,
            threshold_multiplier: 1.5,
            min_frequency: 80.0,
            max_frequency: 1200.0,
        }
    }
}

impl AnalyzerConfig {
    /// Flux history capacity, resolving the default when none was given.
    pub fn segments_buf(&self) -> usize {
        match self.ring_buffer_size {
            Some(size) => size,
            None if self.window_size == 0 => 0,
            None => self.sample_rate as usize / self.window_size,
        }
    }

    /// Duration of one frame in seconds. This is the real-time budget per frame.
    pub fn frame_duration_secs(&self) -> f32 {
        self.window_size as f32 / self.sample_rate as f32
    }

    /// Rejects configurations the analyzer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be positive".into()));
        }
        let segments_buf = self.segments_buf();
        if segments_buf == 0 {
            return Err(ConfigError::Invalid(
                "ring_buffer_size must be positive".into(),
            ));
        }
        if self.threshold_window_size == 0 {
            return Err(ConfigError::Invalid(
                "threshold_window_size must be positive".into(),
            ));
        }
        if self.threshold_window_size > segments_buf {
            return Err(ConfigError::Invalid(format!(
                "threshold_window_size ({}) exceeds ring_buffer_size ({})",
                self.threshold_window_size, segments_buf
            )));
        }
        if !self.threshold_multiplier.is_finite() || self.threshold_multiplier <= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold_multiplier must be greater than 1, got {}",
                self.threshold_multiplier
            )));
        }
        let range_ok = self.min_frequency.is_finite()
            && self.max_frequency.is_finite()
            && self.min_frequency > 0.0
            && self.min_frequency < self.max_frequency;
        if !range_ok {
            return Err(ConfigError::Invalid(format!(
                "invalid frequency range ({}, {})",
                self.min_frequency, self.max_frequency
            )));
        }
        Ok(())
    }

    /// Switches to the sample rate the audio device actually runs at and
    /// checks the result again.
    ///
    /// With `ring_buffer_size` unset the flux history is sized from the
    /// sample rate, so a lower device rate can leave it shorter than the
    /// threshold window.
    ///
    /// # Arguments
    /// * `sample_rate` - Rate reported by the capture device, in Hz
    ///
    /// # Returns
    /// * `Ok(())` - The configuration is usable at the new rate
    /// * `Err(ConfigError::Invalid)` - It is not; the new rate is kept so the
    ///   caller can report it
    pub fn adopt_sample_rate(&mut self, sample_rate: u32) -> Result<(), ConfigError> {
        self.sample_rate = sample_rate;
        self.validate().map_err(|e| match e {
            ConfigError::Invalid(reason) => {
                ConfigError::Invalid(format!("at device sample rate {sample_rate} Hz: {reason}"))
            }
            other => other,
        })
    }
}

/// Velocity and duration attached to every note the controller emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteDefaults {
    pub velocity: u8,
    pub duration_secs: f32,
}

impl Default for NoteDefaults {
    fn default() -> Self {
        Self {
            velocity: 100,
            duration_secs: 0.5,
        }
    }
}

/// Live playback of detected notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Play every detected note on the default output device.
    pub enabled: bool,
    /// Output level, 0.0 to 1.0.
    pub gain: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gain: 0.3,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.gain) {
            return Err(ConfigError::Invalid(format!(
                "playback gain must be between 0 and 1, got {}",
                self.gain
            )));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub analyzer: AnalyzerConfig,
    pub notes: NoteDefaults,
    pub playback: PlaybackConfig,
}

/// Saves a configuration to a JSON file.
pub fn save_config(config: &AppConfig, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let json_string = serde_json::to_string_pretty(config)?;
    let mut file = File::create(path)?;
    file.write_all(json_string.as_bytes())?;
    Ok(())
}

/// Loads a configuration from a JSON file. Missing fields take their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let mut file = File::open(path)?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    let config: AppConfig = serde_json::from_str(&data)?;
    config.analyzer.validate()?;
    config.playback.validate()?;
    Ok(config)
}
