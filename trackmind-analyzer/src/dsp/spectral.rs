//! Spectral primitives
//!
//! Pure functions over frames and magnitude spectra. FFT plans are owned by
//! the engine and passed in.

use super::{DspError, DspResult, PeakConstraints, PeakOrder, SpectralPeaks, WindowType};
use rustfft::num_complex::Complex;
use rustfft::Fft;

/// Build an analysis window of `size` samples
///
/// Windows are normalised so their samples sum to 2, which keeps a full-scale
/// sinusoid's peak magnitude near 1 regardless of frame size.
pub fn window(size: usize, kind: WindowType) -> Vec<f64> {
    if size == 0 {
        return Vec::new();
    }
    if size == 1 {
        return vec![2.0];
    }

    let denom = (size - 1) as f64;
    let mut w: Vec<f64> = (0..size)
        .map(|n| {
            let x = 2.0 * std::f64::consts::PI * n as f64 / denom;
            match kind {
                WindowType::BlackmanHarris62 => 0.44959 - 0.49364 * x.cos() + 0.05677 * (2.0 * x).cos(),
                WindowType::Hann => 0.5 - 0.5 * x.cos(),
            }
        })
        .collect();

    let sum: f64 = w.iter().sum();
    if sum > 0.0 {
        let scale = 2.0 / sum;
        w.iter_mut().for_each(|v| *v *= scale);
    }
    w
}

/// Multiply a frame by a precomputed window
pub fn apply_window(frame: &[f64], window: &[f64]) -> DspResult<Vec<f64>> {
    if frame.len() != window.len() {
        return Err(DspError::InvalidInput(format!(
            "frame length {} does not match window length {}",
            frame.len(),
            window.len()
        )));
    }
    Ok(frame.iter().zip(window).map(|(s, w)| s * w).collect())
}

/// Magnitude spectrum via a forward FFT plan sized to the frame
pub fn magnitude_spectrum(fft: &dyn Fft<f64>, frame: &[f64]) -> DspResult<Vec<f64>> {
    if frame.len() != fft.len() {
        return Err(DspError::InvalidInput(format!(
            "frame length {} does not match FFT size {}",
            frame.len(),
            fft.len()
        )));
    }

    let mut buffer: Vec<Complex<f64>> = frame.iter().map(|&s| Complex::new(s, 0.0)).collect();
    fft.process(&mut buffer);

    Ok(buffer[..frame.len() / 2 + 1].iter().map(|c| c.norm()).collect())
}

/// Hz per bin for a spectrum of `bins` magnitudes (`fft_size / 2 + 1`)
pub fn bin_width(bins: usize, sample_rate: u32) -> f64 {
    if bins < 2 {
        return 0.0;
    }
    sample_rate as f64 / (2.0 * (bins - 1) as f64)
}

/// Local maxima of a magnitude spectrum, refined by parabolic interpolation
pub fn find_peaks(spectrum: &[f64], constraints: &PeakConstraints) -> SpectralPeaks {
    let bin_hz = bin_width(spectrum.len(), constraints.sample_rate);
    if bin_hz <= 0.0 || spectrum.len() < 3 || constraints.max_peaks == 0 {
        return SpectralPeaks::default();
    }

    let first = ((constraints.min_frequency / bin_hz).floor() as usize).max(1);
    let last = ((constraints.max_frequency / bin_hz).ceil() as usize).min(spectrum.len() - 2);

    let mut found: Vec<(f64, f64)> = Vec::new();
    for k in first..=last {
        let (alpha, beta, gamma) = (spectrum[k - 1], spectrum[k], spectrum[k + 1]);
        if beta <= constraints.threshold || beta <= alpha || beta < gamma {
            continue;
        }

        let denom = alpha - 2.0 * beta + gamma;
        let offset = if denom.abs() > f64::EPSILON {
            (0.5 * (alpha - gamma) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };
        let frequency = (k as f64 + offset) * bin_hz;
        let magnitude = beta - 0.25 * (alpha - gamma) * offset;

        if frequency >= constraints.min_frequency && frequency <= constraints.max_frequency {
            found.push((frequency, magnitude));
        }
    }

    // Keep the strongest peaks, then order as requested
    found.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.total_cmp(&b.0)));
    found.truncate(constraints.max_peaks);
    if constraints.order_by == PeakOrder::Frequency {
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    let (frequencies, magnitudes) = found.into_iter().unzip();
    SpectralPeaks {
        frequencies,
        magnitudes,
    }
}

/// Flatten peak magnitudes against the local spectral envelope
///
/// The envelope at a peak is the mean spectrum magnitude over the octave on
/// either side, floored at the mean magnitude of the whole analysed range so
/// near-silent regions are not amplified. Peaks above `max_frequency` are zeroed.
pub fn whiten(spectrum: &[f64], peaks: &SpectralPeaks, sample_rate: u32, max_frequency: f64) -> DspResult<SpectralPeaks> {
    if peaks.frequencies.len() != peaks.magnitudes.len() {
        return Err(DspError::InvalidInput("peak vectors differ in length".to_string()));
    }
    let bin_hz = bin_width(spectrum.len(), sample_rate);
    if bin_hz <= 0.0 {
        return Err(DspError::InvalidInput("spectrum too short to whiten".to_string()));
    }

    let top = ((max_frequency / bin_hz).ceil() as usize).clamp(1, spectrum.len());
    let floor = spectrum[..top].iter().sum::<f64>() / top as f64;

    let magnitudes = peaks
        .frequencies
        .iter()
        .zip(&peaks.magnitudes)
        .map(|(&freq, &mag)| {
            if freq > max_frequency {
                return 0.0;
            }
            let center = (freq / bin_hz).round() as usize;
            let lo = ((freq / 2.0 / bin_hz).floor() as usize).min(center.saturating_sub(4));
            let hi = ((freq * 2.0 / bin_hz).ceil() as usize)
                .max(center + 4)
                .min(spectrum.len() - 1);
            if lo > hi {
                return 0.0;
            }
            let band = &spectrum[lo..=hi];
            let envelope = (band.iter().sum::<f64>() / band.len() as f64).max(floor);
            if envelope > f64::EPSILON {
                mag / envelope
            } else {
                0.0
            }
        })
        .collect();

    Ok(SpectralPeaks {
        frequencies: peaks.frequencies.clone(),
        magnitudes,
    })
}

/// Magnitude-weighted mean frequency, or `None` for a silent spectrum
pub fn centroid(spectrum: &[f64], sample_rate: u32) -> Option<f64> {
    let bin_hz = bin_width(spectrum.len(), sample_rate);
    let total: f64 = spectrum.iter().sum();
    if total <= f64::EPSILON {
        return None;
    }
    let weighted: f64 = spectrum.iter().enumerate().map(|(k, m)| k as f64 * bin_hz * m).sum();
    Some(weighted / total)
}

/// Frequency below which `cutoff` of the spectral energy lies
pub fn rolloff(spectrum: &[f64], sample_rate: u32, cutoff: f64) -> Option<f64> {
    let bin_hz = bin_width(spectrum.len(), sample_rate);
    let total: f64 = spectrum.iter().map(|m| m * m).sum();
    if total <= f64::EPSILON {
        return None;
    }
    let target = total * cutoff;
    let mut acc = 0.0;
    for (k, m) in spectrum.iter().enumerate() {
        acc += m * m;
        if acc >= target {
            return Some(k as f64 * bin_hz);
        }
    }
    Some((spectrum.len() - 1) as f64 * bin_hz)
}

/// Geometric over arithmetic mean of the power spectrum, in [0, 1]
pub fn flatness(spectrum: &[f64]) -> Option<f64> {
    if spectrum.is_empty() {
        return None;
    }
    let power: Vec<f64> = spectrum.iter().map(|m| m * m).collect();
    let arithmetic = power.iter().sum::<f64>() / power.len() as f64;
    if arithmetic <= f64::EPSILON {
        return None;
    }
    if power.iter().any(|&p| p <= 0.0) {
        return Some(0.0);
    }
    let log_mean = power.iter().map(|p| p.ln()).sum::<f64>() / power.len() as f64;
    Some((log_mean.exp() / arithmetic).clamp(0.0, 1.0))
}

/// Octave-band boundaries for spectral contrast
pub const CONTRAST_BAND_EDGES: [f64; 7] = [0.0, 200.0, 400.0, 800.0, 1600.0, 3200.0, f64::INFINITY];

/// Per-band peak/valley contrast in log10 units
///
/// Peak and valley are the means of the top and bottom fifth of magnitudes in
/// each band.
pub fn contrast(spectrum: &[f64], sample_rate: u32) -> Vec<f64> {
    let bin_hz = bin_width(spectrum.len(), sample_rate);
    CONTRAST_BAND_EDGES
        .windows(2)
        .map(|edges| {
            let mut band: Vec<f64> = spectrum
                .iter()
                .enumerate()
                .filter(|(k, _)| {
                    let f = *k as f64 * bin_hz;
                    f >= edges[0] && f < edges[1]
                })
                .map(|(_, m)| *m)
                .collect();
            if band.is_empty() {
                return 0.0;
            }
            band.sort_by(|a, b| a.total_cmp(b));
            let take = (band.len() / 5).max(1);
            let valley = band[..take].iter().sum::<f64>() / take as f64;
            let peak = band[band.len() - take..].iter().sum::<f64>() / take as f64;
            (peak + 1e-10).log10() - (valley + 1e-10).log10()
        })
        .collect()
}
