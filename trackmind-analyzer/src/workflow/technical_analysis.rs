//! Technical analysis stage
//!
//! Decodes the source, runs every extractor independently, and tracks the
//! chord progression. Only decoding (and engine start-up) can fail the
//! stage; any other extractor failure leaves its field absent.
//!
//! The work is CPU-bound and synchronous. Async callers go through
//! [`TechnicalAnalysisStage::spawn`], which moves it onto the blocking pool.

use super::chord_smoother::ChordSmoother;
use super::chord_tracker::{ChordTrackerConfig, FrameChordTracker};
use crate::dsp::{DspResult, EngineProvider, FeatureExtractor};
use crate::error::PipelineError;
use crate::models::{AudioSource, ChordEvent, FeatureSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use trackmind_common::config::AnalysisConfig;
use tracing::{debug, info, warn};

pub struct TechnicalAnalysisStage {
    engines: Arc<EngineProvider>,
    tracker_config: ChordTrackerConfig,
    smoother: ChordSmoother,
}

impl TechnicalAnalysisStage {
    pub fn new(engines: Arc<EngineProvider>, config: &AnalysisConfig) -> Self {
        Self {
            engines,
            tracker_config: ChordTrackerConfig::from(config),
            smoother: ChordSmoother::new(config.min_chord_run),
        }
    }

    /// Run on the blocking thread pool
    pub async fn spawn(
        self: &Arc<Self>,
        source: AudioSource,
        cancel: CancellationToken,
    ) -> Result<FeatureSet, PipelineError> {
        let stage = Arc::clone(self);
        tokio::task::spawn_blocking(move || stage.run(&source, &cancel))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }

    /// Analyse one file
    ///
    /// # Errors
    /// - `PipelineError::Engine` if the feature engine cannot start
    /// - `PipelineError::Decode` if the file cannot be decoded
    /// - `PipelineError::Cancelled` if `cancel` fires mid-way
    pub fn run(&self, source: &AudioSource, cancel: &CancellationToken) -> Result<FeatureSet, PipelineError> {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let engine = self
            .engines
            .get()
            .map_err(|e| PipelineError::Engine(e.to_string()))?;

        let audio = engine
            .decode(source.path())
            .map_err(|e| PipelineError::Decode(e.to_string()))?;

        info!(
            file = %source.path().display(),
            duration = audio.duration_seconds(),
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            "Decoded audio"
        );

        let signal = audio.samples.as_slice();
        let sr = audio.sample_rate;
        let mut features = FeatureSet::new(audio.duration_seconds(), sr);
        let e = engine.as_ref();

        // Rhythm: fast estimator first, full extractor as fallback
        match extract(cancel, "percival_bpm", || e.percival_bpm(signal, sr))? {
            Some(bpm) => features.bpm = Some(bpm),
            None => {
                if let Some(rhythm) = extract(cancel, "rhythm_extractor", || e.rhythm_extractor(signal, sr))? {
                    features.bpm = Some(rhythm.bpm);
                    features.beats = Some(rhythm.ticks.len());
                    features.bpm_confidence = Some(rhythm.confidence);
                }
            }
        }
        features.onset_rate = extract(cancel, "onset_rate", || e.onset_rate(signal, sr))?;
        features.danceability = extract(cancel, "danceability", || e.danceability(signal, sr))?;

        if let Some(key) = extract(cancel, "key", || e.key(signal, sr))? {
            features.key = Some(key.key);
            features.scale = Some(key.scale);
            features.key_strength = Some(key.strength);
        }

        features.energy = extract(cancel, "energy", || e.energy(signal))?;
        features.loudness = extract(cancel, "loudness", || e.loudness(signal))?;
        features.rms = extract(cancel, "rms", || e.rms(signal))?;
        features.dynamic_complexity = extract(cancel, "dynamic_complexity", || e.dynamic_complexity(signal, sr))?;

        features.spectral_centroid = extract(cancel, "spectral_centroid", || e.spectral_centroid(signal, sr))?;
        features.spectral_rolloff = extract(cancel, "spectral_rolloff", || e.spectral_rolloff(signal, sr))?;
        features.spectral_flatness = extract(cancel, "spectral_flatness", || e.spectral_flatness(signal, sr))?;
        features.zero_crossing_rate = extract(cancel, "zero_crossing_rate", || e.zero_crossing_rate(signal))?;

        features.mfcc = extract(cancel, "mfcc", || e.mfcc(signal, sr))?;
        features.mel_bands = extract(cancel, "mel_bands", || e.mel_bands(signal, sr))?;
        features.spectral_contrast = extract(cancel, "spectral_contrast", || e.spectral_contrast(signal, sr))?;
        features.hpcp = extract(cancel, "hpcp", || e.hpcp_profile(signal, sr))?;

        features.chords = self.detect_chords(Arc::clone(&engine), signal, sr, cancel);
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        info!(
            bpm = ?features.bpm,
            key = %features.key_label(),
            chords = features.chords.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Technical analysis complete"
        );
        Ok(features)
    }

    fn detect_chords(
        &self,
        engine: Arc<dyn FeatureExtractor>,
        signal: &[f64],
        sample_rate: u32,
        cancel: &CancellationToken,
    ) -> Vec<ChordEvent> {
        let tracker = FrameChordTracker::new(engine, self.tracker_config.clone());
        let raw: Vec<ChordEvent> = tracker.track(signal, sample_rate, cancel).collect();
        let smoothed = self.smoother.smooth(&raw);

        if raw.is_empty() {
            warn!("No chords detected");
        }
        debug!(raw = raw.len(), smoothed = smoothed.len(), "Chord progression smoothed");
        smoothed
    }
}

/// Run one extractor; a failure is logged and becomes `None`
fn extract<T>(
    cancel: &CancellationToken,
    name: &'static str,
    f: impl FnOnce() -> DspResult<T>,
) -> Result<Option<T>, PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    match f() {
        Ok(value) => {
            debug!(extractor = name, "Extractor succeeded");
            Ok(Some(value))
        }
        Err(e) => {
            warn!(extractor = name, error = %e, "Extractor failed, field left absent");
            Ok(None)
        }
    }
}
