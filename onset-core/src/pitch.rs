//! # Pitch Detection Module
//!
//! Picks the fundamental frequency out of a cepstrum. A periodic signal with
//! period `T` samples shows a cepstral peak at quefrency `T`, so the search is
//! restricted to the quefrencies of the instrument's playable range.

/// Quefrency bins `[start, end)` that correspond to `[max_freq, min_freq]`.
///
/// `start = sample_rate / max_freq` and `end = sample_rate / min_freq`,
/// both truncated, with `end` clamped to the cepstrum length.
pub fn quefrency_range(
    sample_rate: u32,
    (min_freq, max_freq): (f32, f32),
    cepstrum_len: usize,
) -> (usize, usize) {
    let start = (sample_rate as f32 / max_freq) as usize;
    let end = ((sample_rate as f32 / min_freq) as usize).min(cepstrum_len);
    (start, end)
}

/// Finds the dominant pitch period in `cepstrum` and converts it to Hz.
///
/// # Returns
/// * `Some(frequency)` - Fundamental frequency within `[min_freq, max_freq]`
/// * `None` - Empty search range, flat or non-finite cepstrum, or a
///   frequency outside the instrument range
pub fn find_fundamental_in_cepstrum(
    cepstrum: &[f32],
    sample_rate: u32,
    frequency_range: (f32, f32),
) -> Option<f32> {
    let (min_freq, max_freq) = frequency_range;
    let (start, end) = quefrency_range(sample_rate, frequency_range, cepstrum.len());
    if start == 0 || start >= end {
        return None;
    }

    let narrowed = &cepstrum[start..end];
    let (peak_index, peak_value) = narrowed
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });

    if !peak_value.is_finite() {
        return None;
    }
    // A flat cepstrum carries no periodicity, e.g. silence or a DC frame.
    let floor = narrowed.iter().copied().fold(f32::INFINITY, f32::min);
    if peak_value - floor <= f32::EPSILON * peak_value.abs().max(1.0) {
        return None;
    }

    let frequency = sample_rate as f32 / (start + peak_index) as f32;
    if frequency < min_freq || frequency > max_freq {
        // Ignore notes out of the instrument's range
        return None;
    }
    Some(frequency)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUITAR: (f32, f32) = (80.0, 1200.0);

    #[test]
    fn range_matches_instrument_periods() {
        assert_eq!(quefrency_range(44100, GUITAR, 1024), (36, 551));
        assert_eq!(quefrency_range(44100, GUITAR, 256), (36, 256));
    }

    #[test]
    fn picks_the_strongest_period() {
        let mut cepstrum = vec![0.01f32; 1024];
        cepstrum[200] = 0.5;
        cepstrum[400] = 0.3;
        let frequency = find_fundamental_in_cepstrum(&cepstrum, 44100, GUITAR).unwrap();
        assert!((frequency - 220.5).abs() < 1e-3);
    }

    #[test]
    fn ignores_peaks_outside_the_search_window() {
        let mut cepstrum = vec![0.0f32; 1024];
        // quefrency 10 would be 4410 Hz
        cepstrum[10] = 5.0;
        cepstrum[100] = 0.2;
        let frequency = find_fundamental_in_cepstrum(&cepstrum, 44100, GUITAR).unwrap();
        assert!((frequency - 441.0).abs() < 1e-3);
    }

    #[test]
    fn flat_cepstrum_yields_nothing() {
        let cepstrum = vec![-3.0f32; 1024];
        assert_eq!(find_fundamental_in_cepstrum(&cepstrum, 44100, GUITAR), None);
    }

    #[test]
    fn non_finite_cepstrum_yields_nothing() {
        let cepstrum = vec![f32::NEG_INFINITY; 1024];
        assert_eq!(find_fundamental_in_cepstrum(&cepstrum, 44100, GUITAR), None);
    }

    #[test]
    fn short_cepstrum_has_empty_range() {
        let cepstrum = vec![1.0f32; 20];
        assert_eq!(find_fundamental_in_cepstrum(&cepstrum, 44100, GUITAR), None);
    }
}
