//! Frame-level chord tracking
//!
//! Each frame runs window → spectrum → peaks → whitening → HPCP → chord
//! classification. A frame whose chain fails is logged and skipped; frames
//! classified as no-chord never enter the stream.

use crate::dsp::{
    ChordEstimate, DspResult, FeatureExtractor, HpcpParams, PeakConstraints, PeakOrder, WhiteningParams,
    WindowType,
};
use crate::models::ChordEvent;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trackmind_common::config::AnalysisConfig;
use tracing::{debug, warn};

/// Frame chain parameters
#[derive(Debug, Clone)]
pub struct ChordTrackerConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub window: WindowType,
    pub max_peaks: usize,
    /// Minimum spectral peak magnitude
    pub peak_threshold: f64,
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub hpcp: HpcpParams,
}

impl Default for ChordTrackerConfig {
    fn default() -> Self {
        Self {
            frame_size: 4096,
            hop_size: 2048,
            window: WindowType::BlackmanHarris62,
            max_peaks: 100,
            peak_threshold: 0.00001,
            min_frequency: 40.0,
            max_frequency: 5000.0,
            hpcp: HpcpParams::default(),
        }
    }
}

impl From<&AnalysisConfig> for ChordTrackerConfig {
    fn from(config: &AnalysisConfig) -> Self {
        Self {
            frame_size: config.chord_frame_size,
            hop_size: config.chord_hop_size,
            ..Default::default()
        }
    }
}

/// Raw chord stream producer
pub struct FrameChordTracker {
    engine: Arc<dyn FeatureExtractor>,
    config: ChordTrackerConfig,
}

impl FrameChordTracker {
    pub fn new(engine: Arc<dyn FeatureExtractor>, config: ChordTrackerConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &ChordTrackerConfig {
        &self.config
    }

    /// Lazily track chords over `signal`
    ///
    /// Event `i` is stamped `frame_index * hop / sample_rate`. Each call
    /// starts a fresh scan. The scan stops early once `cancel` fires.
    pub fn track<'a>(
        &'a self,
        signal: &'a [f64],
        sample_rate: u32,
        cancel: &'a CancellationToken,
    ) -> impl Iterator<Item = ChordEvent> + 'a {
        let time_step = self.config.hop_size as f64 / sample_rate.max(1) as f64;

        self.engine
            .frames(signal, self.config.frame_size, self.config.hop_size)
            .enumerate()
            .take_while(move |_| !cancel.is_cancelled())
            .filter_map(move |(index, frame)| match self.analyze_frame(&frame, sample_rate) {
                Ok(estimate) if estimate.is_no_chord() => None,
                Ok(estimate) => Some(ChordEvent {
                    label: estimate.label,
                    confidence: estimate.strength.clamp(0.0, 1.0),
                    timestamp_seconds: index as f64 * time_step,
                }),
                Err(e) => {
                    warn!(frame = index, error = %e, "Chord frame failed, skipping");
                    None
                }
            })
    }

    fn analyze_frame(&self, frame: &[f64], sample_rate: u32) -> DspResult<ChordEstimate> {
        let windowed = self.engine.windowing(frame, self.config.window)?;
        let spectrum = self.engine.spectrum(&windowed)?;

        let constraints = PeakConstraints {
            sample_rate,
            max_peaks: self.config.max_peaks,
            threshold: self.config.peak_threshold,
            min_frequency: self.config.min_frequency,
            max_frequency: self.config.max_frequency,
            order_by: PeakOrder::Magnitude,
        };
        let peaks = self.engine.spectral_peaks(&spectrum, &constraints)?;

        let whitened = self.engine.spectral_whitening(
            &spectrum,
            &peaks,
            &WhiteningParams {
                sample_rate,
                max_frequency: self.config.max_frequency,
            },
        )?;

        let hpcp = self.engine.hpcp(&whitened, &self.config.hpcp)?;
        let estimate = self.engine.chords_detection(&hpcp)?;
        debug!(label = %estimate.label, strength = estimate.strength, peaks = peaks.len(), "Frame classified");
        Ok(estimate)
    }
}
