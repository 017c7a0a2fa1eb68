//! Feature extraction backend
//!
//! `FeatureExtractor` is the capability contract the pipeline stages call
//! into: decoding, the per-frame spectral chain used for chord tracking, and
//! the whole-signal scalar and vector extractors. `NativeDsp` is the shipped
//! implementation; tests substitute wrappers that force individual failures.
//!
//! Every extractor is independent. A failure is reported through `DspError`
//! and the caller decides whether it is fatal (decode) or soft (everything else).

pub mod decoder;
pub mod dynamics;
pub mod engine;
pub mod frames;
pub mod rhythm;
pub mod spectral;
pub mod timbre;
pub mod tonal;

pub use engine::{EngineProvider, NativeDsp};
pub use frames::FrameIter;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Feature extraction errors
#[derive(Debug, Error)]
pub enum DspError {
    /// File unreadable, unsupported container/codec, or no audio inside
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// A single extractor could not produce a value
    #[error("{extractor} failed: {reason}")]
    Extractor {
        extractor: &'static str,
        reason: String,
    },

    /// Input violates an extractor precondition (empty, non-finite, wrong size)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DspError {
    pub(crate) fn extractor(extractor: &'static str, reason: impl Into<String>) -> Self {
        Self::Extractor {
            extractor,
            reason: reason.into(),
        }
    }
}

pub type DspResult<T> = Result<T, DspError>;

/// Decoded mono signal
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples, channels averaged, range [-1.0, 1.0]
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    /// Channel count of the source before downmix
    pub channels: usize,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Analysis window shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowType {
    /// 3-term Blackman-Harris, 62 dB sidelobes
    BlackmanHarris62,
    Hann,
}

/// Ordering of returned spectral peaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakOrder {
    /// Strongest first
    Magnitude,
    /// Lowest frequency first
    Frequency,
}

/// Constraints for spectral peak picking
#[derive(Debug, Clone)]
pub struct PeakConstraints {
    pub sample_rate: u32,
    pub max_peaks: usize,
    /// Minimum peak magnitude
    pub threshold: f64,
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub order_by: PeakOrder,
}

/// Spectral peaks as parallel frequency/magnitude vectors
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectralPeaks {
    pub frequencies: Vec<f64>,
    pub magnitudes: Vec<f64>,
}

impl SpectralPeaks {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

/// Parameters for spectral whitening
#[derive(Debug, Clone)]
pub struct WhiteningParams {
    pub sample_rate: u32,
    /// Peaks above this frequency are zeroed
    pub max_frequency: f64,
}

/// HPCP output normalisation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpcpNormalization {
    None,
    UnitSum,
    UnitMax,
}

/// Harmonic pitch class profile parameters
#[derive(Debug, Clone)]
pub struct HpcpParams {
    /// Number of bins (12 = one per semitone)
    pub size: usize,
    /// Frequency of bin 0's pitch class
    pub reference_frequency: f64,
    /// Number of harmonic contributions per peak (fundamental included)
    pub harmonics: usize,
    /// Compute low and high bands separately and merge them
    pub band_preset: bool,
    pub min_frequency: f64,
    pub max_frequency: f64,
    /// Low/high boundary, used only when `band_preset` is set
    pub split_frequency: f64,
    /// Weighting window width in semitones
    pub window_size: f64,
    pub normalization: HpcpNormalization,
}

impl Default for HpcpParams {
    fn default() -> Self {
        Self {
            size: 12,
            reference_frequency: 440.0,
            harmonics: 4,
            band_preset: false,
            min_frequency: 40.0,
            max_frequency: 5000.0,
            split_frequency: 500.0,
            window_size: 1.0,
            normalization: HpcpNormalization::UnitSum,
        }
    }
}

/// Chord classification of one profile
#[derive(Debug, Clone, PartialEq)]
pub struct ChordEstimate {
    /// Chord label, or [`ChordEstimate::NO_CHORD`]
    pub label: String,
    /// Template correlation in [0, 1]
    pub strength: f64,
}

impl ChordEstimate {
    /// Sentinel label for frames without a recognisable chord
    pub const NO_CHORD: &'static str = "N";

    pub fn no_chord() -> Self {
        Self {
            label: Self::NO_CHORD.to_string(),
            strength: 0.0,
        }
    }

    pub fn is_no_chord(&self) -> bool {
        self.label == Self::NO_CHORD
    }
}

/// Musical mode of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Major,
    Minor,
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scale::Major => f.write_str("major"),
            Scale::Minor => f.write_str("minor"),
        }
    }
}

/// Global key estimate
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEstimate {
    pub key: String,
    pub scale: Scale,
    pub strength: f64,
}

/// Output of the full rhythm extractor
#[derive(Debug, Clone, PartialEq)]
pub struct RhythmEstimate {
    pub bpm: f64,
    /// Beat positions in seconds
    pub ticks: Vec<f64>,
    /// Beat grid fit in [0, 1]
    pub confidence: f64,
}

/// DSP backend capability contract
///
/// Implementations must be deterministic: identical input yields
/// bit-identical output.
pub trait FeatureExtractor: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Decode a file to a mono signal
    fn decode(&self, path: &Path) -> DspResult<DecodedAudio>;

    /// Lazy frame sequence; frame `i` starts at sample `i * hop_size`
    fn frames<'a>(&self, signal: &'a [f64], frame_size: usize, hop_size: usize) -> FrameIter<'a> {
        FrameIter::new(signal, frame_size, hop_size)
    }

    fn windowing(&self, frame: &[f64], window: WindowType) -> DspResult<Vec<f64>>;

    /// Magnitude spectrum, `frame.len() / 2 + 1` bins
    fn spectrum(&self, frame: &[f64]) -> DspResult<Vec<f64>>;

    fn spectral_peaks(&self, spectrum: &[f64], constraints: &PeakConstraints) -> DspResult<SpectralPeaks>;

    fn spectral_whitening(
        &self,
        spectrum: &[f64],
        peaks: &SpectralPeaks,
        params: &WhiteningParams,
    ) -> DspResult<SpectralPeaks>;

    fn hpcp(&self, peaks: &SpectralPeaks, params: &HpcpParams) -> DspResult<Vec<f64>>;

    fn chords_detection(&self, hpcp: &[f64]) -> DspResult<ChordEstimate>;

    // Rhythm

    /// Fast single-estimator tempo
    fn percival_bpm(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64>;

    /// Tempo plus beat grid and confidence
    fn rhythm_extractor(&self, signal: &[f64], sample_rate: u32) -> DspResult<RhythmEstimate>;

    /// Onsets per second
    fn onset_rate(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64>;

    /// Danceability in [0, 1]
    fn danceability(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64>;

    // Tonal

    fn key(&self, signal: &[f64], sample_rate: u32) -> DspResult<KeyEstimate>;

    /// Frame-averaged 12-bin HPCP of the whole signal
    fn hpcp_profile(&self, signal: &[f64], sample_rate: u32) -> DspResult<Vec<f64>>;

    // Energy and dynamics

    fn energy(&self, signal: &[f64]) -> DspResult<f64>;

    fn loudness(&self, signal: &[f64]) -> DspResult<f64>;

    fn rms(&self, signal: &[f64]) -> DspResult<f64>;

    fn zero_crossing_rate(&self, signal: &[f64]) -> DspResult<f64>;

    fn dynamic_complexity(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64>;

    // Spectral shape (frame-averaged)

    fn spectral_centroid(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64>;

    fn spectral_rolloff(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64>;

    fn spectral_flatness(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64>;

    // Timbre vectors (frame-averaged)

    fn mfcc(&self, signal: &[f64], sample_rate: u32) -> DspResult<Vec<f64>>;

    fn mel_bands(&self, signal: &[f64], sample_rate: u32) -> DspResult<Vec<f64>>;

    fn spectral_contrast(&self, signal: &[f64], sample_rate: u32) -> DspResult<Vec<f64>>;
}

/// Reject empty or non-finite input before any extractor runs
pub(crate) fn check_signal(signal: &[f64]) -> DspResult<()> {
    if signal.is_empty() {
        return Err(DspError::InvalidInput("empty signal".to_string()));
    }
    if let Some(pos) = signal.iter().position(|s| !s.is_finite()) {
        return Err(DspError::InvalidInput(format!("non-finite sample at index {}", pos)));
    }
    Ok(())
}
