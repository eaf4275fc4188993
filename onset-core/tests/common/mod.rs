//! Synthetic test signals.
#![allow(dead_code)]

use std::f32::consts::PI;

pub const SAMPLE_RATE: u32 = 44100;
pub const WINDOW_SIZE: usize = 1024;

pub fn silence() -> Vec<i16> {
    vec![0; WINDOW_SIZE]
}

pub fn sine(freq: f32, amplitude: f32) -> Vec<i16> {
    (0..WINDOW_SIZE)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (amplitude * (2.0 * PI * freq * t).sin()) as i16
        })
        .collect()
}

/// Equal-amplitude harmonics of `f0` up to 10 kHz, peak level close to `amplitude`.
pub fn harmonic_tone(f0: f32, amplitude: f32) -> Vec<i16> {
    let harmonics = ((10_000.0 / f0) as usize).max(1);
    let gain = amplitude / harmonics as f32;
    (0..WINDOW_SIZE)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let value: f32 = (1..=harmonics)
                .map(|k| (2.0 * PI * f0 * k as f32 * t).sin())
                .sum();
            (value * gain) as i16
        })
        .collect()
}

/// Deterministic white noise from a linear congruential generator.
pub fn noise(seed: u32, amplitude: f32) -> Vec<i16> {
    let mut state = seed;
    (0..WINDOW_SIZE)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let unit = (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
            (unit * amplitude) as i16
        })
        .collect()
}

/// Half-wave rectified spectral difference, summed over all bins.
pub fn flux(current: &[f32], last: &[f32]) -> f32 {
    current
        .iter()
        .zip(last.iter())
        .map(|(c, l)| (c - l).max(0.0))
        .sum()
}
