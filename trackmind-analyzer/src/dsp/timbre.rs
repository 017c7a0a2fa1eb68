//! Mel filterbank and cepstral coefficients

use super::spectral::bin_width;

/// Mel bands reported in the feature set
pub const MEL_BANDS: usize = 24;
/// Filterbank size used for MFCC
pub const MFCC_FILTERS: usize = 40;
pub const MFCC_COEFFICIENTS: usize = 13;

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10f64.powf(mel / 2595.0) - 1.0)
}

/// Triangular filters on the mel scale, one weight vector per band
#[derive(Debug, Clone)]
pub struct MelFilterbank {
    filters: Vec<Vec<(usize, f64)>>,
}

impl MelFilterbank {
    /// Build `bands` filters between `low_hz` and `high_hz` for spectra of `bins` magnitudes
    pub fn new(bands: usize, bins: usize, sample_rate: u32, low_hz: f64, high_hz: f64) -> Self {
        let bin_hz = bin_width(bins, sample_rate);
        let high_hz = high_hz.min(sample_rate as f64 / 2.0);
        let low_mel = hz_to_mel(low_hz);
        let high_mel = hz_to_mel(high_hz);

        let edges: Vec<f64> = (0..bands + 2)
            .map(|i| mel_to_hz(low_mel + (high_mel - low_mel) * i as f64 / (bands + 1) as f64))
            .collect();

        let filters = edges
            .windows(3)
            .map(|tri| {
                let (left, center, right) = (tri[0], tri[1], tri[2]);
                (0..bins)
                    .filter_map(|k| {
                        let f = k as f64 * bin_hz;
                        let weight = if f > left && f <= center {
                            (f - left) / (center - left)
                        } else if f > center && f < right {
                            (right - f) / (right - center)
                        } else {
                            0.0
                        };
                        (weight > 0.0).then_some((k, weight))
                    })
                    .collect()
            })
            .collect();

        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Band energies of one magnitude spectrum
    pub fn apply(&self, spectrum: &[f64]) -> Vec<f64> {
        self.filters
            .iter()
            .map(|filter| {
                filter
                    .iter()
                    .filter_map(|&(k, w)| spectrum.get(k).map(|m| m * m * w))
                    .sum()
            })
            .collect()
    }
}

/// Orthonormal DCT-II of log band energies, truncated to `coefficients`
pub fn mfcc_from_bands(bands: &[f64], coefficients: usize) -> Vec<f64> {
    let n = bands.len();
    if n == 0 {
        return Vec::new();
    }
    let log_bands: Vec<f64> = bands.iter().map(|e| (e + 1e-10).log10()).collect();

    (0..coefficients.min(n))
        .map(|c| {
            let scale = if c == 0 { (1.0 / n as f64).sqrt() } else { (2.0 / n as f64).sqrt() };
            let sum: f64 = log_bands
                .iter()
                .enumerate()
                .map(|(i, v)| v * (std::f64::consts::PI * c as f64 * (i as f64 + 0.5) / n as f64).cos())
                .sum();
            scale * sum
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_roundtrip_values() {
        assert!((hz_to_mel(1000.0) - 1000.0).abs() < 1.0);
        assert!((mel_to_hz(hz_to_mel(440.0)) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_filterbank_shape() {
        let bank = MelFilterbank::new(MEL_BANDS, 1025, 44100, 0.0, 22050.0);
        assert_eq!(bank.len(), MEL_BANDS);

        let energies = bank.apply(&vec![1.0; 1025]);
        assert_eq!(energies.len(), MEL_BANDS);
        assert!(energies.iter().all(|e| *e > 0.0));
        // Higher filters are wider on a linear spectrum
        assert!(energies[MEL_BANDS - 1] > energies[0]);
    }

    #[test]
    fn test_mfcc_of_flat_bands() {
        let coeffs = mfcc_from_bands(&vec![1.0; MFCC_FILTERS], MFCC_COEFFICIENTS);
        assert_eq!(coeffs.len(), MFCC_COEFFICIENTS);
        // A flat log spectrum only has a DC term
        assert!(coeffs[1..].iter().all(|c| c.abs() < 1e-9));
    }
}
