//! # Fast Fourier Transform (FFT) Module
//!
//! Frequency domain transforms used by the spectral analyzer. Both transforms
//! plan their FFTs and allocate their buffers once, at construction, so that
//! per-frame processing does not allocate.
//!
//! ## Features
//! - Hann windowing for reduced spectral leakage
//! - Zero-padded autopower spectrum for onset detection
//! - Real cepstrum for fundamental frequency estimation

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Smallest magnitude fed to the logarithm of the cepstrum.
/// Keeps silent bins from turning into `-inf`.
const LOG_MAGNITUDE_FLOOR: f32 = 1e-12;

/// Builds a symmetric Hann window of `len` coefficients.
///
/// The window tapers the signal to zero at both edges, which reduces the
/// leakage caused by the discontinuity at the frame boundaries.
pub fn hann_window(len: usize) -> Vec<f32> {
    if len == 1 {
        return vec![1.0];
    }
    let n_minus_1 = len.saturating_sub(1) as f32;
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}

/// Autopower spectrum of a Hann-windowed, zero-padded frame.
pub struct PowerSpectrum {
    window: Box<[f32]>,
    padded: Box<[Complex<f32>]>,
    scratch: Box<[Complex<f32>]>,
    fft: Arc<dyn Fft<f32>>,
}

impl PowerSpectrum {
    pub fn new(window_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size * 2);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            window: hann_window(window_size).into_boxed_slice(),
            padded: vec![Complex::new(0.0, 0.0); window_size * 2].into_boxed_slice(),
            scratch: vec![Complex::new(0.0, 0.0); scratch_len].into_boxed_slice(),
            fft,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    /// Writes the power spectrum of `frame` into `out`.
    ///
    /// 1. Multiplies the frame by the Hann window
    /// 2. Appends `window_size` zeros
    /// 3. Runs the FFT and scales every bin by `1 / window_size`
    /// 4. Keeps the squared magnitude of the first `window_size` bins
    ///
    /// Both `frame` and `out` must hold exactly `window_size` values.
    pub fn compute(&mut self, frame: &[i16], out: &mut [f32]) {
        let n = self.window.len();
        debug_assert_eq!(frame.len(), n);
        debug_assert_eq!(out.len(), n);

        let (signal, pad) = self.padded.split_at_mut(n);
        for ((slot, &sample), &coefficient) in signal.iter_mut().zip(frame).zip(self.window.iter()) {
            *slot = Complex::new(sample as f32 * coefficient, 0.0);
        }
        pad.fill(Complex::new(0.0, 0.0));

        self.fft.process_with_scratch(&mut self.padded, &mut self.scratch);

        let scale = 1.0 / n as f32;
        for (power, bin) in out.iter_mut().zip(self.padded.iter()) {
            // |z|^2 == z * conj(z)
            *power = (*bin * scale).norm_sqr();
        }
    }
}

/// Real cepstrum of an unwindowed frame: `re(ifft(ln |fft(x)|))`.
pub struct Cepstrum {
    buffer: Box<[Complex<f32>]>,
    scratch: Box<[Complex<f32>]>,
    output: Box<[f32]>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Cepstrum {
    pub fn new(window_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(window_size);
        let inverse = planner.plan_fft_inverse(window_size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            buffer: vec![Complex::new(0.0, 0.0); window_size].into_boxed_slice(),
            scratch: vec![Complex::new(0.0, 0.0); scratch_len].into_boxed_slice(),
            output: vec![0.0; window_size].into_boxed_slice(),
            forward,
            inverse,
        }
    }

    /// Computes the cepstrum of `frame`, which must hold `window_size` samples.
    /// The returned slice is indexed by quefrency in samples.
    pub fn compute(&mut self, frame: &[i16]) -> &[f32] {
        debug_assert_eq!(frame.len(), self.buffer.len());

        for (slot, &sample) in self.buffer.iter_mut().zip(frame) {
            *slot = Complex::new(sample as f32, 0.0);
        }
        self.forward.process_with_scratch(&mut self.buffer, &mut self.scratch);

        for bin in self.buffer.iter_mut() {
            let magnitude = bin.norm().max(LOG_MAGNITUDE_FLOOR);
            *bin = Complex::new(magnitude.ln(), 0.0);
        }
        self.inverse.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // rustfft leaves the inverse transform unnormalized
        let scale = 1.0 / self.buffer.len() as f32;
        for (value, bin) in self.output.iter_mut().zip(self.buffer.iter()) {
            *value = bin.re * scale;
        }
        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hann_window_is_symmetric_and_zero_at_edges() {
        let window = hann_window(9);
        assert!(window[0].abs() < 1e-6);
        assert!(window[8].abs() < 1e-6);
        assert!((window[4] - 1.0).abs() < 1e-6);
        for i in 0..9 {
            assert!((window[i] - window[8 - i]).abs() < 1e-6);
        }
    }

    #[test]
    fn power_spectrum_of_dc_frame_peaks_at_bin_zero() {
        let mut transform = PowerSpectrum::new(64);
        let frame = [1000i16; 64];
        let mut out = [0.0f32; 64];
        transform.compute(&frame, &mut out);

        // Sum of a 64-point Hann window is 31.5, so bin 0 is (1000 * 31.5 / 64)^2.
        let expected = (1000.0f32 * 31.5 / 64.0).powi(2);
        assert!((out[0] - expected).abs() / expected < 1e-3);
        assert!(out.iter().all(|&p| p >= 0.0));
        assert!(out[10] < out[0] * 1e-3);
    }

    #[test]
    fn power_spectrum_locates_sine_bin() {
        let n = 256;
        let mut transform = PowerSpectrum::new(n);
        // 16 periods per frame -> bin 32 of the zero-padded transform
        let frame: Vec<i16> = (0..n)
            .map(|i| (8000.0 * (2.0 * std::f32::consts::PI * 16.0 * i as f32 / n as f32).sin()) as i16)
            .collect();
        let mut out = vec![0.0f32; n];
        transform.compute(&frame, &mut out);

        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 32);
    }

    #[test]
    fn cepstrum_of_silence_is_finite() {
        let mut cepstrum = Cepstrum::new(128);
        let values = cepstrum.compute(&[0i16; 128]);
        assert_eq!(values.len(), 128);
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
