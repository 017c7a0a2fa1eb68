//! Pitch class profiles, chord templates, and key profiles
//!
//! HPCP bin 0 is the pitch class of the reference frequency (A at 440 Hz), so
//! the label tables below start at A.

use super::{ChordEstimate, DspError, DspResult, HpcpNormalization, HpcpParams, KeyEstimate, Scale, SpectralPeaks};

/// Pitch class names for a 12-bin profile starting at A
pub const PITCH_CLASSES: [&str; 12] = ["A", "Bb", "B", "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab"];

/// Weight applied per additional harmonic contribution
const HARMONIC_DECAY: f64 = 0.6;

/// Chords weaker than this are reported as no-chord
const MIN_CHORD_STRENGTH: f64 = 0.1;

/// Krumhansl-Kessler probe-tone profiles, tonic first
const MAJOR_PROFILE: [f64; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];
const MINOR_PROFILE: [f64; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Harmonic pitch class profile of a set of spectral peaks
pub fn hpcp(peaks: &SpectralPeaks, params: &HpcpParams) -> DspResult<Vec<f64>> {
    if params.size == 0 || params.size % 12 != 0 {
        return Err(DspError::InvalidInput(format!(
            "HPCP size must be a positive multiple of 12, got {}",
            params.size
        )));
    }
    if params.reference_frequency <= 0.0 || params.window_size <= 0.0 {
        return Err(DspError::InvalidInput("HPCP reference and window must be positive".to_string()));
    }
    if peaks.frequencies.len() != peaks.magnitudes.len() {
        return Err(DspError::InvalidInput("peak vectors differ in length".to_string()));
    }

    let profile = if params.band_preset {
        let mut low = vec![0.0; params.size];
        let mut high = vec![0.0; params.size];
        for (&freq, &mag) in peaks.frequencies.iter().zip(&peaks.magnitudes) {
            let target = if freq < params.split_frequency { &mut low } else { &mut high };
            accumulate_peak(target, freq, mag, params);
        }
        normalize(&mut low, HpcpNormalization::UnitMax);
        normalize(&mut high, HpcpNormalization::UnitMax);
        low.iter().zip(&high).map(|(l, h)| l + h).collect()
    } else {
        let mut profile = vec![0.0; params.size];
        for (&freq, &mag) in peaks.frequencies.iter().zip(&peaks.magnitudes) {
            accumulate_peak(&mut profile, freq, mag, params);
        }
        profile
    };

    let mut profile = profile;
    normalize(&mut profile, params.normalization);
    Ok(profile)
}

fn accumulate_peak(profile: &mut [f64], freq: f64, mag: f64, params: &HpcpParams) {
    if freq < params.min_frequency || freq > params.max_frequency || mag <= 0.0 {
        return;
    }

    let size = profile.len() as f64;
    let semitones_per_bin = 12.0 / size;
    let half_window = params.window_size / 2.0;
    let energy = mag * mag;

    for harmonic in 1..=params.harmonics.max(1) {
        let fundamental = freq / harmonic as f64;
        let weight = HARMONIC_DECAY.powi(harmonic as i32 - 1);
        let position = (size * (fundamental / params.reference_frequency).log2()).rem_euclid(size);

        for (bin, value) in profile.iter_mut().enumerate() {
            let mut distance = (position - bin as f64).abs();
            if distance > size / 2.0 {
                distance = size - distance;
            }
            let semitones = distance * semitones_per_bin;
            if semitones <= half_window {
                let c = (std::f64::consts::PI * semitones / params.window_size).cos();
                *value += c * c * energy * weight;
            }
        }
    }
}

fn normalize(profile: &mut [f64], normalization: HpcpNormalization) {
    let divisor = match normalization {
        HpcpNormalization::None => return,
        HpcpNormalization::UnitSum => profile.iter().sum::<f64>(),
        HpcpNormalization::UnitMax => profile.iter().cloned().fold(0.0, f64::max),
    };
    if divisor > f64::EPSILON {
        profile.iter_mut().for_each(|v| *v /= divisor);
    }
}

/// Fold a profile of any multiple-of-12 size down to 12 bins
fn fold_to_semitones(profile: &[f64]) -> DspResult<Vec<f64>> {
    if profile.is_empty() || profile.len() % 12 != 0 {
        return Err(DspError::InvalidInput(format!(
            "profile size must be a positive multiple of 12, got {}",
            profile.len()
        )));
    }
    let per = profile.len() / 12;
    Ok(profile.chunks(per).map(|c| c.iter().sum()).collect())
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return 0.0;
    }
    cov / (var_a * var_b).sqrt()
}

fn triad_template(root: usize, scale: Scale) -> [f64; 12] {
    let third = match scale {
        Scale::Major => 4,
        Scale::Minor => 3,
    };
    let mut template = [0.0; 12];
    for interval in [0, third, 7] {
        template[(root + interval) % 12] = 1.0;
    }
    template
}

fn rotated_profile(tonic: usize, scale: Scale) -> [f64; 12] {
    let base = match scale {
        Scale::Major => &MAJOR_PROFILE,
        Scale::Minor => &MINOR_PROFILE,
    };
    let mut profile = [0.0; 12];
    for (bin, value) in profile.iter_mut().enumerate() {
        *value = base[(bin + 12 - tonic) % 12];
    }
    profile
}

/// Best-matching major or minor triad for one pitch class profile
pub fn classify_chord(profile: &[f64]) -> DspResult<ChordEstimate> {
    let semis = fold_to_semitones(profile)?;
    if semis.iter().any(|v| !v.is_finite()) {
        return Err(DspError::InvalidInput("non-finite HPCP value".to_string()));
    }
    if semis.iter().sum::<f64>() <= f64::EPSILON {
        return Ok(ChordEstimate::no_chord());
    }

    let mut best: Option<(usize, Scale, f64)> = None;
    for root in 0..12 {
        for scale in [Scale::Major, Scale::Minor] {
            let corr = pearson(&semis, &triad_template(root, scale));
            if best.map_or(true, |(_, _, b)| corr > b) {
                best = Some((root, scale, corr));
            }
        }
    }

    match best {
        Some((root, scale, corr)) if corr >= MIN_CHORD_STRENGTH => {
            let suffix = if scale == Scale::Minor { "m" } else { "" };
            Ok(ChordEstimate {
                label: format!("{}{}", PITCH_CLASSES[root], suffix),
                strength: corr.min(1.0),
            })
        }
        _ => Ok(ChordEstimate::no_chord()),
    }
}

/// Global key from an averaged pitch class profile
pub fn estimate_key(profile: &[f64]) -> DspResult<KeyEstimate> {
    let semis = fold_to_semitones(profile)?;
    if semis.iter().sum::<f64>() <= f64::EPSILON {
        return Err(DspError::extractor("key", "no tonal content"));
    }

    let mut best: Option<(usize, Scale, f64)> = None;
    for tonic in 0..12 {
        for scale in [Scale::Major, Scale::Minor] {
            let corr = pearson(&semis, &rotated_profile(tonic, scale));
            if best.map_or(true, |(_, _, b)| corr > b) {
                best = Some((tonic, scale, corr));
            }
        }
    }

    best.map(|(tonic, scale, corr)| KeyEstimate {
        key: PITCH_CLASSES[tonic].to_string(),
        scale,
        strength: corr,
    })
    .ok_or_else(|| DspError::extractor("key", "no key candidates"))
}
