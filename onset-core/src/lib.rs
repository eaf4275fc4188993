// onset-core/src/lib.rs

//! The core logic of the instrument-to-MIDI converter.
//! This crate is responsible for onset detection, pitch estimation and
//! turning detected pitches into MIDI notes. The analysis path is
//! headless and never touches the audio device; `audio` is a thin
//! adapter that feeds it frames from CPAL, and `synth` plays the
//! resulting notes back.

pub mod analyzer;
pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod flux;
pub mod midi;
pub mod pipeline;
pub mod pitch;
pub mod synth;

pub use analyzer::SpectralAnalyzer;
pub use config::{AnalyzerConfig, AppConfig, NoteDefaults, PlaybackConfig};
pub use error::{AnalysisError, ConfigError, MidiError};
pub use midi::{Note, RealtimeNote, hz_to_midi};
pub use pipeline::{ChannelSink, NoteSink, PipelineController};
pub use synth::{SynthEngine, SynthOutput};
