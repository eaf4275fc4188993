//! # Onset/Pitch Pipeline
//!
//! Glue between a frame source, the spectral analyzer and a note sink.
//! The controller owns exactly one analyzer per stream and is driven
//! synchronously, one call per frame, from the frame source's context.

use crossbeam_channel::{Sender, TrySendError};

use crate::{
    analyzer::SpectralAnalyzer,
    config::{AnalyzerConfig, NoteDefaults},
    error::AnalysisError,
    midi::{self, RealtimeNote},
};

/// Receiver of detected notes.
///
/// Called from the real-time context, so implementations must not block.
/// Slow consumers should hand the note off to another thread, as
/// [`ChannelSink`] does.
pub trait NoteSink {
    fn play(&mut self, note: RealtimeNote);
}

/// Records every note, mostly useful as a test double.
impl NoteSink for Vec<RealtimeNote> {
    fn play(&mut self, note: RealtimeNote) {
        self.push(note);
    }
}

/// Forwards notes to a crossbeam channel without blocking.
///
/// A full or disconnected channel drops the note.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<RealtimeNote>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(sender: Sender<RealtimeNote>) -> Self {
        Self { sender, dropped: 0 }
    }

    /// Number of notes lost to a full or disconnected channel.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl NoteSink for ChannelSink {
    fn play(&mut self, note: RealtimeNote) {
        match self.sender.try_send(note) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                log::warn!("note queue full, dropping note {}", note.pitch);
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                log::warn!("note queue disconnected, dropping note {}", note.pitch);
            }
        }
    }
}

/// Feeds frames to a [`SpectralAnalyzer`] and turns detected fundamental
/// frequencies into notes for a [`NoteSink`].
pub struct PipelineController<S: NoteSink> {
    analyzer: SpectralAnalyzer,
    sink: S,
    defaults: NoteDefaults,
}

impl<S: NoteSink> PipelineController<S> {
    pub fn new(config: AnalyzerConfig, defaults: NoteDefaults, sink: S) -> Result<Self, AnalysisError> {
        Ok(Self {
            analyzer: SpectralAnalyzer::new(config)?,
            sink,
            defaults,
        })
    }

    /// Processes one frame. When a note starts in this frame it is sent to
    /// the sink and also returned.
    ///
    /// # Arguments
    /// * `frame` - Exactly `window_size` mono samples, in delivery order
    ///
    /// # Returns
    /// * `Ok(Some(note))` - A note started; it carries the configured velocity and duration
    /// * `Ok(None)` - No onset, or a pitch outside the MIDI note range
    /// * `Err(_)` - The frame was rejected; nothing was sent to the sink
    pub fn process(&mut self, frame: &[i16]) -> Result<Option<RealtimeNote>, AnalysisError> {
        let Some(frequency) = self.analyzer.process_frame(frame)? else {
            return Ok(None);
        };
        let Some(pitch) = midi::midi_pitch(frequency) else {
            return Ok(None);
        };

        let note = RealtimeNote {
            pitch,
            velocity: self.defaults.velocity.min(127),
            duration_secs: self.defaults.duration_secs.max(0.0),
        };
        log::debug!("note {} ({frequency:.1} Hz)", note.pitch);
        self.sink.play(note);
        Ok(Some(note))
    }

    pub fn analyzer(&self) -> &SpectralAnalyzer {
        &self.analyzer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Gives the sink back, dropping the analyzer state.
    pub fn into_sink(self) -> S {
        self.sink
    }
}
