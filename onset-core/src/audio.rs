//! # Audio Capture Module
//!
//! Frame source for the pipeline, built on CPAL (Cross-Platform Audio Library).
//! It opens the default input device and delivers fixed-size frames of mono
//! `i16` samples to a callback running on the audio thread.
//!
//! ## Features
//! - Automatic audio device selection
//! - `i16`, `u16` and `f32` devices, converted to `i16`
//! - Multi-channel devices reduced to their first channel
//! - Exact `window_size` frames from a preallocated buffer

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfigRange};

/// Input device together with the stream configuration chosen for it.
pub struct FrameCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
}

impl FrameCapture {
    /// Selects the default input device and the supported configuration
    /// closest to `target_rate`.
    ///
    /// The device may not support `target_rate`; check [`FrameCapture::sample_rate`]
    /// before configuring the analyzer.
    pub fn open_default(target_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No input device available"))?;

        log::info!("Using audio input device: {}", device.name()?);

        let configs = device
            .supported_input_configs()
            .context("querying input configs")?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, target_rate)
            .ok_or_else(|| anyhow!("No suitable i16/u16/f32 input format found"))?;

        let rate = target_rate.clamp(supported.min_sample_rate().0, supported.max_sample_rate().0);
        let supported = supported.with_sample_rate(cpal::SampleRate(rate));
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "Selected sample rate: {} Hz, {} channel(s), {:?}",
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "<unknown>".into())
    }

    /// Starts the stream. `on_frame` is called on the audio thread with
    /// exactly `window_size` samples per call, in capture order.
    pub fn start<F>(&self, window_size: usize, on_frame: F) -> Result<cpal::Stream>
    where
        F: FnMut(&[i16]) + Send + 'static,
    {
        if window_size == 0 {
            bail!("window_size must be positive");
        }
        let stream = match self.sample_format {
            SampleFormat::I16 => self.build_stream::<i16, F>(window_size, on_frame)?,
            SampleFormat::U16 => self.build_stream::<u16, F>(window_size, on_frame)?,
            SampleFormat::F32 => self.build_stream::<f32, F>(window_size, on_frame)?,
            other => bail!("Unsupported sample format {other:?}"),
        };
        stream.play()?;
        Ok(stream)
    }

    fn build_stream<T, F>(&self, window_size: usize, mut on_frame: F) -> Result<cpal::Stream>
    where
        T: SizedSample,
        i16: FromSample<T>,
        F: FnMut(&[i16]) + Send + 'static,
    {
        let channels = (self.config.channels as usize).max(1);
        let err_fn = |err| log::error!("An error occurred on the audio stream: {}", err);

        // Filled in place and handed out whole, so the callback never allocates.
        let mut frame: Vec<i16> = Vec::with_capacity(window_size);

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for &sample in data.iter().step_by(channels) {
                    frame.push(sample.to_sample::<i16>());
                    if frame.len() == window_size {
                        on_frame(&frame);
                        frame.clear();
                    }
                }
            },
            err_fn,
            None,
        )?;
        Ok(stream)
    }
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::I16 => Some(0),
        SampleFormat::F32 => Some(1),
        SampleFormat::U16 => Some(2),
        _ => None,
    }
}

/// Finds the best supported configuration for the target sample rate.
///
/// Prefers, in order: the closest sample rate, fewer channels, and native
/// `i16` samples over `f32` and `u16`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter_map(|c| format_rank(c.sample_format()).map(|rank| (rank, c)))
        .min_by_key(|(rank, c)| {
            let (min, max) = (c.min_sample_rate().0, c.max_sample_rate().0);
            let rate_diff = if target_rate < min {
                min - target_rate
            } else {
                target_rate.saturating_sub(max)
            };
            (rate_diff, c.channels(), *rank)
        })
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn prefers_mono_i16_covering_the_rate() {
        let configs = vec![
            range(2, 8000, 96000, SampleFormat::I16),
            range(1, 8000, 96000, SampleFormat::F32),
            range(1, 8000, 96000, SampleFormat::I16),
            range(1, 48000, 48000, SampleFormat::I16),
        ];
        let chosen = find_supported_config(configs, 44100).unwrap();
        assert_eq!(chosen.channels(), 1);
        assert_eq!(chosen.sample_format(), SampleFormat::I16);
        assert_eq!(chosen.min_sample_rate().0, 8000);
    }

    #[test]
    fn skips_unsupported_formats() {
        let configs = vec![range(1, 44100, 44100, SampleFormat::U8)];
        assert!(find_supported_config(configs, 44100).is_none());
    }
}
