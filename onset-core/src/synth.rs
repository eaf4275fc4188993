//! # Synth Module
//!
//! Plays detected notes on the default output device.
//!
//! [`SynthEngine`] is a small additive synthesizer with a fixed voice pool.
//! Each note gets a short attack, is held for its `duration_secs` and then
//! released, so note-off timing lives entirely on the output thread.
//! [`SynthOutput`] owns the CPAL output stream and forwards notes to the
//! engine through a bounded channel, so callers never block.

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use crossbeam_channel::Receiver;

use crate::{
    config::PlaybackConfig,
    midi::{RealtimeNote, midi_to_hz},
    pipeline::{ChannelSink, NoteSink},
};

/// Notes sounding at the same time. The oldest voice is reused beyond this.
pub const MAX_VOICES: usize = 8;
/// Notes queued between the caller and the output callback.
const NOTE_QUEUE_SIZE: usize = 32;
const ATTACK_SECS: f32 = 0.005;
const RELEASE_SECS: f32 = 0.05;
/// Relative levels of the first three partials.
const PARTIALS: [f32; 3] = [1.0, 0.5, 0.25];

#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    active: bool,
    phase: f32,
    phase_step: f32,
    level: f32,
    age: u32,
    hold: u32,
    release_level: f32,
}

impl Voice {
    fn next(&mut self, attack: u32, release: u32) -> f32 {
        let envelope = if self.age < self.hold {
            (self.age as f32 / attack as f32).min(1.0)
        } else {
            let released = self.age - self.hold;
            if released >= release {
                self.active = false;
                return 0.0;
            }
            self.release_level * (1.0 - released as f32 / release as f32)
        };

        let wave: f32 = PARTIALS
            .iter()
            .enumerate()
            .map(|(k, gain)| gain * (std::f32::consts::TAU * self.phase * (k + 1) as f32).sin())
            .sum();

        self.phase += self.phase_step;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.age = self.age.saturating_add(1);

        self.level * envelope * wave / PARTIALS.iter().sum::<f32>()
    }
}

/// Fixed-polyphony note renderer. Never allocates after construction.
#[derive(Debug, Clone)]
pub struct SynthEngine {
    sample_rate: f32,
    gain: f32,
    attack: u32,
    release: u32,
    voices: [Voice; MAX_VOICES],
}

impl SynthEngine {
    pub fn new(sample_rate: u32, gain: f32) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        Self {
            sample_rate,
            gain: gain.clamp(0.0, 1.0),
            attack: ((ATTACK_SECS * sample_rate) as u32).max(1),
            release: ((RELEASE_SECS * sample_rate) as u32).max(1),
            voices: [Voice::default(); MAX_VOICES],
        }
    }

    /// Starts a note.
    ///
    /// # Arguments
    /// * `note` - Pitch, velocity and how long the note is held
    ///
    /// A velocity of zero, or a pitch at or above the Nyquist frequency, is
    /// ignored. When all voices are busy the oldest one is cut off.
    pub fn note_on(&mut self, note: RealtimeNote) {
        let frequency = midi_to_hz(note.pitch);
        if note.velocity == 0 || frequency >= self.sample_rate / 2.0 {
            return;
        }
        let hold = (note.duration_secs.max(0.0) * self.sample_rate).round() as u32;
        let slot = match self.voices.iter().position(|v| !v.active) {
            Some(slot) => slot,
            None => self
                .voices
                .iter()
                .enumerate()
                .max_by_key(|(_, v)| v.age)
                .map_or(0, |(slot, _)| slot),
        };
        self.voices[slot] = Voice {
            active: true,
            phase: 0.0,
            phase_step: frequency / self.sample_rate,
            level: note.velocity.min(127) as f32 / 127.0,
            age: 0,
            hold,
            release_level: (hold as f32 / self.attack as f32).min(1.0),
        };
    }

    /// Number of notes currently sounding, releases included.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Mixes one sample of all active voices, in `-1.0..=1.0`.
    pub fn next_sample(&mut self) -> f32 {
        let (attack, release) = (self.attack, self.release);
        let mix: f32 = self
            .voices
            .iter_mut()
            .filter(|v| v.active)
            .map(|v| v.next(attack, release))
            .sum();
        (mix * self.gain).clamp(-1.0, 1.0)
    }

    /// Fills an interleaved buffer, writing the same sample to every channel.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            frame.fill(self.next_sample());
        }
    }
}

impl NoteSink for SynthEngine {
    fn play(&mut self, note: RealtimeNote) {
        self.note_on(note);
    }
}

/// A [`SynthEngine`] running on the default output device.
///
/// Notes handed to [`NoteSink::play`] are queued without blocking and picked
/// up by the output callback at the start of its next buffer.
pub struct SynthOutput {
    stream: cpal::Stream,
    notes: ChannelSink,
    sample_rate: u32,
}

impl SynthOutput {
    /// Opens the default output device with its default configuration and
    /// starts playing silence.
    pub fn open_default(config: &PlaybackConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No output device available"))?;

        log::info!("Using audio output device: {}", device.name()?);

        let supported = device
            .default_output_config()
            .context("querying default output config")?;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported.into();
        let sample_rate = stream_config.sample_rate.0;

        let (note_tx, note_rx) = crossbeam_channel::bounded(NOTE_QUEUE_SIZE);
        let engine = SynthEngine::new(sample_rate, config.gain);
        let stream = match sample_format {
            SampleFormat::F32 => build_output_stream::<f32>(&device, &stream_config, engine, note_rx)?,
            SampleFormat::I16 => build_output_stream::<i16>(&device, &stream_config, engine, note_rx)?,
            SampleFormat::U16 => build_output_stream::<u16>(&device, &stream_config, engine, note_rx)?,
            other => bail!("Unsupported output sample format {other:?}"),
        };
        stream.play()?;

        log::info!(
            "Playback at {} Hz, {} channel(s), {:?}",
            sample_rate,
            stream_config.channels,
            sample_format
        );

        Ok(Self {
            stream,
            notes: ChannelSink::new(note_tx),
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn pause(&self) -> Result<()> {
        self.stream.pause()?;
        Ok(())
    }
}

impl NoteSink for SynthOutput {
    fn play(&mut self, note: RealtimeNote) {
        self.notes.play(note);
    }
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut engine: SynthEngine,
    notes: Receiver<RealtimeNote>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    let err_fn = |err| log::error!("An error occurred on the output stream: {}", err);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for note in notes.try_iter() {
                engine.note_on(note);
            }
            for frame in data.chunks_mut(channels) {
                let sample = engine.next_sample().to_sample::<T>();
                frame.fill(sample);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
