//! Error types shared by the analysis, configuration and MIDI modules.
//!
//! "No onset" and "no pitch" are not errors; they are reported as `None`
//! by the analyzer. The variants here cover contract violations only.

use thiserror::Error;

/// Problems with a configuration file or a configuration value.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the spectral analyzer.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The frame source delivered a frame of the wrong length.
    #[error("frame has {actual} samples, expected {expected}")]
    FrameLength { expected: usize, actual: usize },
}

/// Errors raised while serializing notes to a MIDI file.
#[derive(Error, Debug)]
pub enum MidiError {
    #[error("MIDI I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid MIDI data: {0}")]
    Invalid(String),
}
