//! Extracted audio features
//!
//! Every extractor-backed field is an independent `Option`: a failed
//! extractor leaves its field `None` without affecting the others.
//! `duration_seconds` and `sample_rate` are always present.

use crate::dsp::Scale;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One chord in a progression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordEvent {
    pub label: String,
    /// Detection strength in [0, 1]
    pub confidence: f64,
    pub timestamp_seconds: f64,
}

impl ChordEvent {
    pub fn new(label: impl Into<String>, confidence: f64, timestamp_seconds: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
            timestamp_seconds,
        }
    }
}

/// Tempo descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoFeel {
    Slow,
    Moderate,
    Upbeat,
    Fast,
}

impl TempoFeel {
    pub fn from_bpm(bpm: f64) -> Self {
        if bpm < 90.0 {
            Self::Slow
        } else if bpm < 120.0 {
            Self::Moderate
        } else if bpm < 140.0 {
            Self::Upbeat
        } else {
            Self::Fast
        }
    }
}

impl fmt::Display for TempoFeel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Slow => "slow",
            Self::Moderate => "moderate",
            Self::Upbeat => "upbeat",
            Self::Fast => "fast",
        })
    }
}

/// Energy descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl EnergyLevel {
    pub fn from_energy(energy: f64) -> Self {
        if energy > 100_000.0 {
            Self::High
        } else if energy > 50_000.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for EnergyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        })
    }
}

/// Aggregate of all features extracted from one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    pub duration_seconds: f64,
    pub sample_rate: u32,

    // Rhythm
    pub bpm: Option<f64>,
    /// Beat count, set when the full rhythm extractor ran
    pub beats: Option<usize>,
    pub bpm_confidence: Option<f64>,
    pub onset_rate: Option<f64>,
    pub danceability: Option<f64>,

    // Tonal
    pub key: Option<String>,
    pub scale: Option<Scale>,
    pub key_strength: Option<f64>,

    // Energy
    pub energy: Option<f64>,
    pub loudness: Option<f64>,
    pub rms: Option<f64>,
    pub dynamic_complexity: Option<f64>,

    // Spectral
    pub spectral_centroid: Option<f64>,
    pub spectral_rolloff: Option<f64>,
    pub spectral_flatness: Option<f64>,
    pub zero_crossing_rate: Option<f64>,

    // Vectors
    pub mfcc: Option<Vec<f64>>,
    pub mel_bands: Option<Vec<f64>>,
    pub spectral_contrast: Option<Vec<f64>>,
    pub hpcp: Option<Vec<f64>>,

    /// Smoothed chord progression
    pub chords: Vec<ChordEvent>,
}

/// `N/A` for absent values, fixed precision otherwise
pub(crate) fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{:.*}", precision, v))
}

impl FeatureSet {
    /// Empty set for a decoded signal; every extractor field starts absent
    pub fn new(duration_seconds: f64, sample_rate: u32) -> Self {
        Self {
            duration_seconds,
            sample_rate,
            bpm: None,
            beats: None,
            bpm_confidence: None,
            onset_rate: None,
            danceability: None,
            key: None,
            scale: None,
            key_strength: None,
            energy: None,
            loudness: None,
            rms: None,
            dynamic_complexity: None,
            spectral_centroid: None,
            spectral_rolloff: None,
            spectral_flatness: None,
            zero_crossing_rate: None,
            mfcc: None,
            mel_bands: None,
            spectral_contrast: None,
            hpcp: None,
            chords: Vec::new(),
        }
    }

    pub fn tempo_feel(&self) -> Option<TempoFeel> {
        self.bpm.map(TempoFeel::from_bpm)
    }

    pub fn energy_level(&self) -> Option<EnergyLevel> {
        self.energy.map(EnergyLevel::from_energy)
    }

    /// Key and scale as "C major", or `N/A`
    pub fn key_label(&self) -> String {
        match (&self.key, self.scale) {
            (Some(key), Some(scale)) => format!("{} {}", key, scale),
            (Some(key), None) => key.clone(),
            _ => "N/A".to_string(),
        }
    }

    /// Danceability as a whole percentage
    pub fn danceability_percent(&self) -> String {
        self.danceability
            .map_or_else(|| "N/A".to_string(), |d| format!("{:.0}%", d * 100.0))
    }

    /// Short multi-line summary used as the technical stage's result message
    pub fn summary(&self) -> String {
        format!(
            "Technical Analysis Complete:\n\
             • BPM: {}\n\
             • Key: {}\n\
             • Energy: {}\n\
             • Danceability: {}",
            fmt_opt(self.bpm, 1),
            self.key_label(),
            self.energy_level().map_or_else(|| "N/A".to_string(), |e| e.to_string()),
            self.danceability_percent(),
        )
    }

    /// Full sectioned display of every feature
    pub fn report(&self) -> String {
        let mut lines = vec![
            "RHYTHM".to_string(),
            format!(
                "  Tempo:              {} BPM{}",
                fmt_opt(self.bpm, 1),
                self.tempo_feel().map(|t| format!(" ({})", t)).unwrap_or_default()
            ),
            format!(
                "  Beats:              {}",
                self.beats.map_or_else(|| "N/A".to_string(), |b| b.to_string())
            ),
            format!("  BPM confidence:     {}", fmt_opt(self.bpm_confidence, 2)),
            format!("  Onset rate:         {} events/sec", fmt_opt(self.onset_rate, 2)),
            format!("  Danceability:       {}", self.danceability_percent()),
            "\nTONAL".to_string(),
            format!("  Key:                {}", self.key_label()),
            format!("  Key strength:       {}", fmt_opt(self.key_strength, 2)),
            "\nENERGY".to_string(),
            format!(
                "  Energy:             {}{}",
                fmt_opt(self.energy, 0),
                self.energy_level().map(|e| format!(" ({})", e)).unwrap_or_default()
            ),
            format!("  Loudness:           {}", fmt_opt(self.loudness, 1)),
            format!("  RMS:                {}", fmt_opt(self.rms, 4)),
            format!("  Dynamic complexity: {}", fmt_opt(self.dynamic_complexity, 2)),
            "\nSPECTRAL".to_string(),
            format!("  Centroid:           {} Hz", fmt_opt(self.spectral_centroid, 0)),
            format!("  Rolloff:            {} Hz", fmt_opt(self.spectral_rolloff, 0)),
            format!("  Flatness:           {}", fmt_opt(self.spectral_flatness, 3)),
            format!(
                "  Zero crossing rate: {}",
                fmt_opt(self.zero_crossing_rate.map(|z| z * 1000.0), 1)
            ),
            "\nTIMBRE".to_string(),
            format!("  MFCC:               {}", fmt_vector(self.mfcc.as_deref(), 4)),
            format!("  Mel bands:          {}", fmt_vector(self.mel_bands.as_deref(), 4)),
            format!("  Spectral contrast:  {}", fmt_vector(self.spectral_contrast.as_deref(), 6)),
            "\nHARMONIC".to_string(),
            format!("  HPCP:               {}", fmt_vector(self.hpcp.as_deref(), 12)),
        ];

        if self.chords.is_empty() {
            lines.push("  Chords:             N/A".to_string());
        } else {
            lines.push(format!("  Chords:             {} changes", self.chords.len()));
            lines.extend(self.chords.iter().map(|chord| {
                format!(
                    "    {:>7.2}s  {:<5} ({:.2})",
                    chord.timestamp_seconds, chord.label, chord.confidence
                )
            }));
        }

        lines.push("\nMETADATA".to_string());
        lines.push(format!("  Duration:           {:.1} seconds", self.duration_seconds));
        lines.push(format!("  Sample rate:        {} Hz", self.sample_rate));
        lines.join("\n")
    }
}

/// First `limit` values of a vector, with a count of the rest
fn fmt_vector(values: Option<&[f64]>, limit: usize) -> String {
    match values {
        None => "N/A".to_string(),
        Some(v) => {
            let shown: Vec<String> = v.iter().take(limit).map(|x| format!("{:.3}", x)).collect();
            if v.len() > limit {
                format!("[{}, … +{}]", shown.join(", "), v.len() - limit)
            } else {
                format!("[{}]", shown.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_feel_boundaries() {
        assert_eq!(TempoFeel::from_bpm(89.9), TempoFeel::Slow);
        assert_eq!(TempoFeel::from_bpm(90.0), TempoFeel::Moderate);
        assert_eq!(TempoFeel::from_bpm(120.0), TempoFeel::Upbeat);
        assert_eq!(TempoFeel::from_bpm(140.0), TempoFeel::Fast);
    }

    #[test]
    fn test_energy_level_boundaries() {
        assert_eq!(EnergyLevel::from_energy(100_000.0), EnergyLevel::Medium);
        assert_eq!(EnergyLevel::from_energy(100_000.1), EnergyLevel::High);
        assert_eq!(EnergyLevel::from_energy(50_000.0), EnergyLevel::Low);
    }

    #[test]
    fn test_absent_fields_render_na() {
        let features = FeatureSet::new(8.0, 44100);
        let report = features.report();

        assert!(report.contains("Tempo:              N/A BPM"));
        assert!(report.contains("Key:                N/A"));
        assert!(report.contains("Duration:           8.0 seconds"));
        assert!(report.contains("Sample rate:        44100 Hz"));
        assert!(features.summary().contains("BPM: N/A"));
    }

    #[test]
    fn test_fmt_opt() {
        assert_eq!(fmt_opt(None, 2), "N/A");
        assert_eq!(fmt_opt(Some(1.23456), 2), "1.23");
        assert_eq!(fmt_opt(Some(99.96), 1), "100.0");
    }

    #[test]
    fn test_report_section_layout() {
        let mut features = FeatureSet::new(8.0, 44100);
        features.chords.push(ChordEvent::new("Am", 0.8, 0.0));
        let report = features.report();

        assert!(report.contains("\n\nTONAL"));
        assert!(report.contains("\n\nMETADATA"));
        assert!(report.find("TONAL").unwrap() < report.find("METADATA").unwrap());
        assert!(!report.ends_with('\n'));
    }

    #[test]
    fn test_summary_with_values() {
        let mut features = FeatureSet::new(8.0, 44100);
        features.bpm = Some(128.04);
        features.key = Some("C".to_string());
        features.scale = Some(Scale::Major);
        features.energy = Some(150_000.0);
        features.danceability = Some(0.734);

        let summary = features.summary();
        assert!(summary.contains("BPM: 128.0"));
        assert!(summary.contains("Key: C major"));
        assert!(summary.contains("Energy: High"));
        assert!(summary.contains("Danceability: 73%"));
    }

    #[test]
    fn test_wire_names() {
        let mut features = FeatureSet::new(1.5, 22050);
        features.chords.push(ChordEvent::new("Am", 0.8, 0.0));
        let json = serde_json::to_value(&features).unwrap();

        assert_eq!(json["durationSeconds"], 1.5);
        assert_eq!(json["sampleRate"], 22050);
        assert!(json["bpm"].is_null());
        assert_eq!(json["chords"][0]["timestampSeconds"], 0.0);
        assert_eq!(json["chords"][0]["label"], "Am");
    }
}
