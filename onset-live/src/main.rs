//! # onset-live - Instrument to MIDI
//!
//! Listens to the default input device, detects the start of every note
//! played and prints it as a MIDI note.
//!
//! ## Architecture
//! - **Audio Thread**: CPAL callback running the onset/pitch pipeline per frame
//! - **Main Thread**: receives detected notes, reports them and hands them
//!   to the synth
//! - **Output Thread**: CPAL callback rendering the synth voices
//! - **Communication**: Crossbeam channels; the audio thread never blocks on them
//! - **Shutdown**: pressing Enter stops the stream

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::StreamTrait;
use crossbeam_channel::Receiver;
use onset_core::{
    AppConfig, ChannelSink, NoteSink, PipelineController, RealtimeNote, SynthOutput,
    audio::FrameCapture,
    config::{load_config, save_config},
    midi::{midi_to_hz, note_name},
};
use std::thread;

use cli::Cli;

/// Notes buffered between the audio thread and the reporting loop.
const NOTE_QUEUE_SIZE: usize = 64;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => {
            let config = load_config(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            config
        }
        None => AppConfig::default(),
    };
    apply_overrides(&cli, &mut config);
    config.analyzer.validate()?;
    config.playback.validate()?;

    if let Some(path) = &cli.write_config {
        save_config(&config, path)
            .with_context(|| format!("writing config to {}", path.display()))?;
        log::info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let capture = FrameCapture::open_default(config.analyzer.sample_rate)?;
    if capture.sample_rate() != config.analyzer.sample_rate {
        log::warn!(
            "{} does not support {} Hz, analyzing at {} Hz",
            capture.device_name(),
            config.analyzer.sample_rate,
            capture.sample_rate()
        );
        config
            .analyzer
            .adopt_sample_rate(capture.sample_rate())
            .with_context(|| format!("adapting analysis to {}", capture.device_name()))?;
    }
    log::info!(
        "Window of {} samples ({:.1} ms), flux history of {} frames",
        config.analyzer.window_size,
        config.analyzer.frame_duration_secs() * 1000.0,
        config.analyzer.segments_buf()
    );

    let (note_tx, note_rx) = crossbeam_channel::bounded::<RealtimeNote>(NOTE_QUEUE_SIZE);
    let mut controller =
        PipelineController::new(config.analyzer.clone(), config.notes.clone(), ChannelSink::new(note_tx))?;

    let stream = capture.start(config.analyzer.window_size, move |frame: &[i16]| {
        if let Err(e) = controller.process(frame) {
            log::warn!("Frame rejected: {}", e);
        }
    })?;

    let mut playback = if config.playback.enabled {
        match SynthOutput::open_default(&config.playback) {
            Ok(output) => Some(output),
            Err(e) => {
                log::warn!("Playback disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let shutdown_rx = spawn_enter_listener();
    println!("Listening... press Enter to stop.");
    report_notes(&note_rx, &shutdown_rx, playback.as_mut());

    log::info!("Stopping streams and exiting...");
    if let Err(e) = stream.pause() {
        log::warn!("Error pausing stream: {}", e);
    }
    drop(stream);
    if let Some(output) = playback {
        if let Err(e) = output.pause() {
            log::warn!("Error pausing playback: {}", e);
        }
    }
    Ok(())
}

/// Command line values take precedence over the configuration file.
fn apply_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(sample_rate) = cli.sample_rate {
        config.analyzer.sample_rate = sample_rate;
    }
    if let Some(window_size) = cli.window_size {
        config.analyzer.window_size = window_size;
    }
    if let Some(velocity) = cli.velocity {
        config.notes.velocity = velocity.min(127);
    }
    if cli.mute {
        config.playback.enabled = false;
    }
}

/// Signals once the user presses Enter, or stdin is closed.
fn spawn_enter_listener() -> Receiver<()> {
    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = shutdown_tx.send(());
    });
    shutdown_rx
}

/// Prints every detected note, and plays it when `playback` is set, until
/// shutdown is requested or the audio side hangs up.
fn report_notes(
    note_rx: &Receiver<RealtimeNote>,
    shutdown_rx: &Receiver<()>,
    mut playback: Option<&mut SynthOutput>,
) {
    loop {
        crossbeam_channel::select! {
            recv(note_rx) -> msg => match msg {
                Ok(note) => {
                    println!(
                        "Note detected: {} (MIDI {}, {:.1} Hz)",
                        note_name(note.pitch),
                        note.pitch,
                        midi_to_hz(note.pitch)
                    );
                    log::debug!("velocity {}, duration {:.2}s", note.velocity, note.duration_secs);
                    if let Some(output) = playback.as_deref_mut() {
                        output.play(note);
                    }
                }
                Err(_) => {
                    log::info!("Note channel closed");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => {
                log::info!("Received shutdown signal");
                break;
            },
        }
    }
}
