//! Energy, loudness, and dynamics descriptors

use super::{DspError, DspResult};

/// Frames quieter than this are ignored by dynamic complexity
const SILENCE_FLOOR_DB: f64 = -90.0;

/// Sum of squared samples
pub fn energy(signal: &[f64]) -> f64 {
    signal.iter().map(|s| s * s).sum()
}

/// Stevens' power law loudness: energy^0.67
pub fn loudness(signal: &[f64]) -> f64 {
    energy(signal).powf(0.67)
}

pub fn rms(signal: &[f64]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    (energy(signal) / signal.len() as f64).sqrt()
}

/// Fraction of adjacent sample pairs that change sign
pub fn zero_crossing_rate(signal: &[f64]) -> f64 {
    if signal.len() < 2 {
        return 0.0;
    }
    let crossings = signal
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 / (signal.len() - 1) as f64
}

/// Mean absolute deviation of short-term loudness in dB
///
/// Loudness is measured over 200 ms blocks; silent blocks are skipped.
pub fn dynamic_complexity(signal: &[f64], sample_rate: u32) -> DspResult<f64> {
    let block = (sample_rate as usize / 5).max(1);
    let levels: Vec<f64> = signal
        .chunks(block)
        .filter(|chunk| chunk.len() == block)
        .map(|chunk| {
            let mean_square = energy(chunk) / chunk.len() as f64;
            10.0 * (mean_square + 1e-20).log10()
        })
        .filter(|db| *db > SILENCE_FLOOR_DB)
        .collect();

    if levels.is_empty() {
        return Err(DspError::extractor("dynamic_complexity", "no non-silent blocks"));
    }

    let mean = levels.iter().sum::<f64>() / levels.len() as f64;
    Ok(levels.iter().map(|l| (l - mean).abs()).sum::<f64>() / levels.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_loudness_rms() {
        let signal = vec![0.5; 400];
        assert!((energy(&signal) - 100.0).abs() < 1e-9);
        assert!((loudness(&signal) - 100f64.powf(0.67)).abs() < 1e-9);
        assert!((rms(&signal) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_crossing_rate() {
        let alternating: Vec<f64> = (0..101).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((zero_crossing_rate(&alternating) - 1.0).abs() < 1e-12);
        assert_eq!(zero_crossing_rate(&[1.0; 50]), 0.0);
    }

    #[test]
    fn test_dynamic_complexity_steady_vs_varying() {
        let steady = vec![0.3; 44100];
        let steady_dc = dynamic_complexity(&steady, 44100).unwrap();
        assert!(steady_dc < 1e-9);

        let mut varying = vec![0.3; 44100];
        for s in varying.iter_mut().skip(22050) {
            *s = 0.03;
        }
        let varying_dc = dynamic_complexity(&varying, 44100).unwrap();
        assert!(varying_dc > 5.0, "got {}", varying_dc);
    }

    #[test]
    fn test_dynamic_complexity_silence() {
        assert!(dynamic_complexity(&vec![0.0; 44100], 44100).is_err());
    }
}
