//! Native feature engine and its process-wide handle

use super::spectral::{self, CONTRAST_BAND_EDGES};
use super::timbre::{self, MelFilterbank, MEL_BANDS, MFCC_COEFFICIENTS, MFCC_FILTERS};
use super::{
    check_signal, decoder, dynamics, rhythm, tonal, ChordEstimate, DecodedAudio, DspError, DspResult,
    FeatureExtractor, HpcpNormalization, HpcpParams, KeyEstimate, PeakConstraints, PeakOrder, RhythmEstimate,
    SpectralPeaks, WhiteningParams, WindowType,
};
use once_cell::sync::OnceCell;
use rustfft::{Fft, FftPlanner};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Frame size for whole-signal spectral summaries
const SUMMARY_FRAME_SIZE: usize = 2048;
const SUMMARY_HOP_SIZE: usize = 1024;

/// Frame size for the averaged tonal profile
const TONAL_FRAME_SIZE: usize = 4096;
const TONAL_HOP_SIZE: usize = 2048;

/// Percival estimation needs this much audio
const PERCIVAL_MIN_SECONDS: f64 = 4.0;

const ROLLOFF_CUTOFF: f64 = 0.85;

/// Pure-Rust DSP backend built on rustfft and symphonia
///
/// FFT plans and analysis windows are cached per size; the caches are the
/// only shared state, so one instance serves concurrent runs.
pub struct NativeDsp {
    planner: Mutex<FftPlanner<f64>>,
    plans: RwLock<HashMap<usize, Arc<dyn Fft<f64>>>>,
    windows: RwLock<HashMap<(usize, WindowType), Arc<Vec<f64>>>>,
}

impl std::fmt::Debug for NativeDsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sizes: Vec<usize> = self
            .plans
            .read()
            .map(|plans| plans.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("NativeDsp").field("planned_sizes", &sizes).finish()
    }
}

impl NativeDsp {
    /// Create the engine and pre-plan the FFT sizes the pipeline uses
    pub fn new() -> DspResult<Self> {
        let engine = Self {
            planner: Mutex::new(FftPlanner::new()),
            plans: RwLock::new(HashMap::new()),
            windows: RwLock::new(HashMap::new()),
        };
        for size in [rhythm::ODF_FRAME_SIZE, SUMMARY_FRAME_SIZE, TONAL_FRAME_SIZE] {
            engine.fft(size)?;
        }
        Ok(engine)
    }

    fn fft(&self, size: usize) -> DspResult<Arc<dyn Fft<f64>>> {
        if size == 0 {
            return Err(DspError::InvalidInput("FFT size must be positive".to_string()));
        }
        if let Some(plan) = self
            .plans
            .read()
            .map_err(|_| DspError::extractor("fft", "plan cache poisoned"))?
            .get(&size)
        {
            return Ok(Arc::clone(plan));
        }

        let plan = self
            .planner
            .lock()
            .map_err(|_| DspError::extractor("fft", "planner poisoned"))?
            .plan_fft_forward(size);
        self.plans
            .write()
            .map_err(|_| DspError::extractor("fft", "plan cache poisoned"))?
            .insert(size, Arc::clone(&plan));
        debug!(size, "Planned FFT");
        Ok(plan)
    }

    fn window(&self, size: usize, kind: WindowType) -> DspResult<Arc<Vec<f64>>> {
        if let Some(w) = self
            .windows
            .read()
            .map_err(|_| DspError::extractor("windowing", "window cache poisoned"))?
            .get(&(size, kind))
        {
            return Ok(Arc::clone(w));
        }

        let w = Arc::new(spectral::window(size, kind));
        self.windows
            .write()
            .map_err(|_| DspError::extractor("windowing", "window cache poisoned"))?
            .insert((size, kind), Arc::clone(&w));
        Ok(w)
    }

    /// Windowed magnitude spectra of every frame
    fn frame_spectra(
        &self,
        signal: &[f64],
        frame_size: usize,
        hop_size: usize,
        kind: WindowType,
    ) -> DspResult<Vec<Vec<f64>>> {
        check_signal(signal)?;
        let fft = self.fft(frame_size)?;
        let window = self.window(frame_size, kind)?;
        self.frames(signal, frame_size, hop_size)
            .map(|frame| {
                let windowed = spectral::apply_window(&frame, &window)?;
                spectral::magnitude_spectrum(fft.as_ref(), &windowed)
            })
            .collect()
    }

    fn onset_function(&self, signal: &[f64]) -> DspResult<Vec<f64>> {
        let spectra = self.frame_spectra(signal, rhythm::ODF_FRAME_SIZE, rhythm::ODF_HOP_SIZE, WindowType::Hann)?;
        Ok(rhythm::onset_detection_function(&rhythm::spectral_flux(&spectra)))
    }

    /// Mean of a per-frame scalar over frames where it is defined
    fn mean_over_frames(
        &self,
        extractor: &'static str,
        signal: &[f64],
        per_frame: impl Fn(&[f64]) -> Option<f64>,
    ) -> DspResult<f64> {
        let spectra = self.frame_spectra(signal, SUMMARY_FRAME_SIZE, SUMMARY_HOP_SIZE, WindowType::Hann)?;
        let values: Vec<f64> = spectra.iter().filter_map(|s| per_frame(s)).collect();
        if values.is_empty() {
            return Err(DspError::extractor(extractor, "no non-silent frames"));
        }
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Element-wise mean of a per-frame vector
    fn mean_vector_over_frames(
        &self,
        signal: &[f64],
        per_frame: impl Fn(&[f64]) -> Vec<f64>,
    ) -> DspResult<Vec<f64>> {
        let spectra = self.frame_spectra(signal, SUMMARY_FRAME_SIZE, SUMMARY_HOP_SIZE, WindowType::Hann)?;
        let mut sum: Vec<f64> = Vec::new();
        for spectrum in &spectra {
            let v = per_frame(spectrum);
            if sum.is_empty() {
                sum = vec![0.0; v.len()];
            }
            sum.iter_mut().zip(&v).for_each(|(acc, x)| *acc += x);
        }
        let count = spectra.len().max(1) as f64;
        Ok(sum.into_iter().map(|v| v / count).collect())
    }

    fn tonal_peak_constraints(sample_rate: u32) -> PeakConstraints {
        PeakConstraints {
            sample_rate,
            max_peaks: 100,
            threshold: 0.00001,
            min_frequency: 40.0,
            max_frequency: 5000.0,
            order_by: PeakOrder::Magnitude,
        }
    }
}

impl FeatureExtractor for NativeDsp {
    fn name(&self) -> &str {
        "native"
    }

    fn decode(&self, path: &Path) -> DspResult<DecodedAudio> {
        decoder::decode_file(path)
    }

    fn windowing(&self, frame: &[f64], window: WindowType) -> DspResult<Vec<f64>> {
        check_signal(frame)?;
        let w = self.window(frame.len(), window)?;
        spectral::apply_window(frame, &w)
    }

    fn spectrum(&self, frame: &[f64]) -> DspResult<Vec<f64>> {
        check_signal(frame)?;
        let fft = self.fft(frame.len())?;
        spectral::magnitude_spectrum(fft.as_ref(), frame)
    }

    fn spectral_peaks(&self, spectrum: &[f64], constraints: &PeakConstraints) -> DspResult<SpectralPeaks> {
        if constraints.min_frequency > constraints.max_frequency {
            return Err(DspError::InvalidInput(format!(
                "peak range {}..{} Hz is empty",
                constraints.min_frequency, constraints.max_frequency
            )));
        }
        Ok(spectral::find_peaks(spectrum, constraints))
    }

    fn spectral_whitening(
        &self,
        spectrum: &[f64],
        peaks: &SpectralPeaks,
        params: &WhiteningParams,
    ) -> DspResult<SpectralPeaks> {
        spectral::whiten(spectrum, peaks, params.sample_rate, params.max_frequency)
    }

    fn hpcp(&self, peaks: &SpectralPeaks, params: &HpcpParams) -> DspResult<Vec<f64>> {
        tonal::hpcp(peaks, params)
    }

    fn chords_detection(&self, hpcp: &[f64]) -> DspResult<ChordEstimate> {
        tonal::classify_chord(hpcp)
    }

    fn percival_bpm(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64> {
        let seconds = signal.len() as f64 / sample_rate.max(1) as f64;
        if seconds < PERCIVAL_MIN_SECONDS {
            return Err(DspError::extractor(
                "percival_bpm",
                format!("needs at least {}s of audio, got {:.2}s", PERCIVAL_MIN_SECONDS, seconds),
            ));
        }
        let odf = self.onset_function(signal)?;
        let frame_rate = sample_rate as f64 / rhythm::ODF_HOP_SIZE as f64;
        Ok(rhythm::estimate_tempo(&odf, frame_rate)?.bpm)
    }

    fn rhythm_extractor(&self, signal: &[f64], sample_rate: u32) -> DspResult<RhythmEstimate> {
        let odf = self.onset_function(signal)?;
        let frame_rate = sample_rate as f64 / rhythm::ODF_HOP_SIZE as f64;
        let tempo = rhythm::estimate_tempo(&odf, frame_rate)?;
        let (ticks, grid_fit) = rhythm::track_beats(&odf, frame_rate, tempo.bpm);
        Ok(RhythmEstimate {
            bpm: tempo.bpm,
            ticks,
            confidence: (grid_fit * tempo.strength).sqrt(),
        })
    }

    fn onset_rate(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64> {
        let odf = self.onset_function(signal)?;
        let frame_rate = sample_rate as f64 / rhythm::ODF_HOP_SIZE as f64;
        let onsets = rhythm::pick_onsets(&odf, frame_rate);
        let seconds = signal.len() as f64 / sample_rate.max(1) as f64;
        Ok(onsets.len() as f64 / seconds)
    }

    fn danceability(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64> {
        check_signal(signal)?;
        rhythm::danceability(signal, sample_rate)
    }

    fn key(&self, signal: &[f64], sample_rate: u32) -> DspResult<KeyEstimate> {
        let profile = self.hpcp_profile(signal, sample_rate)?;
        tonal::estimate_key(&profile)
    }

    fn hpcp_profile(&self, signal: &[f64], sample_rate: u32) -> DspResult<Vec<f64>> {
        let spectra = self.frame_spectra(signal, TONAL_FRAME_SIZE, TONAL_HOP_SIZE, WindowType::BlackmanHarris62)?;
        let constraints = Self::tonal_peak_constraints(sample_rate);
        let params = HpcpParams {
            normalization: HpcpNormalization::None,
            ..Default::default()
        };

        let mut profile = vec![0.0; params.size];
        for spectrum in &spectra {
            let peaks = spectral::find_peaks(spectrum, &constraints);
            let frame_profile = tonal::hpcp(&peaks, &params)?;
            profile.iter_mut().zip(&frame_profile).for_each(|(acc, v)| *acc += v);
        }

        let max = profile.iter().cloned().fold(0.0, f64::max);
        if max <= f64::EPSILON {
            return Err(DspError::extractor("hpcp", "no tonal peaks in signal"));
        }
        profile.iter_mut().for_each(|v| *v /= max);
        Ok(profile)
    }

    fn energy(&self, signal: &[f64]) -> DspResult<f64> {
        check_signal(signal)?;
        Ok(dynamics::energy(signal))
    }

    fn loudness(&self, signal: &[f64]) -> DspResult<f64> {
        check_signal(signal)?;
        Ok(dynamics::loudness(signal))
    }

    fn rms(&self, signal: &[f64]) -> DspResult<f64> {
        check_signal(signal)?;
        Ok(dynamics::rms(signal))
    }

    fn zero_crossing_rate(&self, signal: &[f64]) -> DspResult<f64> {
        check_signal(signal)?;
        Ok(dynamics::zero_crossing_rate(signal))
    }

    fn dynamic_complexity(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64> {
        check_signal(signal)?;
        dynamics::dynamic_complexity(signal, sample_rate)
    }

    fn spectral_centroid(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64> {
        self.mean_over_frames("spectral_centroid", signal, |s| spectral::centroid(s, sample_rate))
    }

    fn spectral_rolloff(&self, signal: &[f64], sample_rate: u32) -> DspResult<f64> {
        self.mean_over_frames("spectral_rolloff", signal, |s| {
            spectral::rolloff(s, sample_rate, ROLLOFF_CUTOFF)
        })
    }

    fn spectral_flatness(&self, signal: &[f64], _sample_rate: u32) -> DspResult<f64> {
        self.mean_over_frames("spectral_flatness", signal, spectral::flatness)
    }

    fn mfcc(&self, signal: &[f64], sample_rate: u32) -> DspResult<Vec<f64>> {
        let bank = MelFilterbank::new(
            MFCC_FILTERS,
            SUMMARY_FRAME_SIZE / 2 + 1,
            sample_rate,
            0.0,
            11000.0,
        );
        self.mean_vector_over_frames(signal, |s| timbre::mfcc_from_bands(&bank.apply(s), MFCC_COEFFICIENTS))
    }

    fn mel_bands(&self, signal: &[f64], sample_rate: u32) -> DspResult<Vec<f64>> {
        let bank = MelFilterbank::new(
            MEL_BANDS,
            SUMMARY_FRAME_SIZE / 2 + 1,
            sample_rate,
            0.0,
            sample_rate as f64 / 2.0,
        );
        self.mean_vector_over_frames(signal, |s| bank.apply(s))
    }

    fn spectral_contrast(&self, signal: &[f64], sample_rate: u32) -> DspResult<Vec<f64>> {
        let bands = self.mean_vector_over_frames(signal, |s| spectral::contrast(s, sample_rate))?;
        debug_assert_eq!(bands.len(), CONTRAST_BAND_EDGES.len() - 1);
        Ok(bands)
    }
}

type EngineFactory = Box<dyn Fn() -> DspResult<Arc<dyn FeatureExtractor>> + Send + Sync>;

/// Lazily initialised, shared feature engine
///
/// The first `get` runs the factory; concurrent first callers block until it
/// finishes, and all later callers receive the same instance. A failed
/// initialisation is not cached, so the next call retries.
pub struct EngineProvider {
    cell: OnceCell<Arc<dyn FeatureExtractor>>,
    factory: EngineFactory,
}

impl std::fmt::Debug for EngineProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProvider")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl EngineProvider {
    /// Provider for the native engine
    pub fn native() -> Self {
        Self::with_factory(|| Ok(Arc::new(NativeDsp::new()?) as Arc<dyn FeatureExtractor>))
    }

    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> DspResult<Arc<dyn FeatureExtractor>> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// Provider wrapping an already constructed engine
    pub fn from_engine(engine: Arc<dyn FeatureExtractor>) -> Self {
        let provider = Self::with_factory(|| Err(DspError::extractor("engine", "factory not used")));
        // Fresh cell, cannot already be set
        let _ = provider.cell.set(engine);
        provider
    }

    /// Initialised engine, running the factory on first use
    pub fn get(&self) -> DspResult<Arc<dyn FeatureExtractor>> {
        self.cell
            .get_or_try_init(|| {
                info!("Initializing feature engine");
                let engine = (self.factory)()?;
                info!(engine = engine.name(), "Feature engine ready");
                Ok(engine)
            })
            .map(Arc::clone)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sine(freq: f64, sample_rate: u32, seconds: f64) -> Vec<f64> {
        let n = (sample_rate as f64 * seconds) as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    #[test]
    fn test_provider_initializes_once_under_contention() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = Arc::new(EngineProvider::with_factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(Arc::new(NativeDsp::new()?) as Arc<dyn FeatureExtractor>)
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || provider.get().map(|e| Arc::as_ptr(&e) as *const () as usize))
            })
            .collect();
        let ptrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(ptrs.windows(2).all(|w| w[0] == w[1]));
        assert!(provider.is_initialized());
    }

    #[test]
    fn test_provider_retries_after_failed_init() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = EngineProvider::with_factory(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DspError::extractor("engine", "first attempt fails"))
            } else {
                Ok(Arc::new(NativeDsp::new()?) as Arc<dyn FeatureExtractor>)
            }
        });

        assert!(provider.get().is_err());
        assert!(!provider.is_initialized());
        assert!(provider.get().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_from_engine_is_ready() {
        let provider = EngineProvider::from_engine(Arc::new(NativeDsp::new().unwrap()));
        assert!(provider.is_initialized());
        assert_eq!(provider.get().unwrap().name(), "native");
    }

    #[test]
    fn test_windowing_rejects_non_finite() {
        let engine = NativeDsp::new().unwrap();
        let mut frame = vec![0.1; 4096];
        frame[100] = f64::NAN;
        assert!(engine.windowing(&frame, WindowType::BlackmanHarris62).is_err());
    }

    #[test]
    fn test_chord_chain_on_triad() {
        let engine = NativeDsp::new().unwrap();
        let sr = 44100;
        // C4 E4 G4
        let mut signal = sine(261.63, sr, 0.1);
        for freq in [329.63, 392.0] {
            for (s, t) in signal.iter_mut().zip(sine(freq, sr, 0.1)) {
                *s += t;
            }
        }

        let frame = &signal[..4096];
        let windowed = engine.windowing(frame, WindowType::BlackmanHarris62).unwrap();
        let spectrum = engine.spectrum(&windowed).unwrap();
        let peaks = engine
            .spectral_peaks(&spectrum, &NativeDsp::tonal_peak_constraints(sr))
            .unwrap();
        let white = engine
            .spectral_whitening(
                &spectrum,
                &peaks,
                &WhiteningParams {
                    sample_rate: sr,
                    max_frequency: 5000.0,
                },
            )
            .unwrap();
        let profile = engine.hpcp(&white, &HpcpParams::default()).unwrap();
        let chord = engine.chords_detection(&profile).unwrap();

        assert_eq!(chord.label, "C");
        assert!(chord.strength > 0.5);
    }

    #[test]
    fn test_percival_requires_four_seconds() {
        let engine = NativeDsp::new().unwrap();
        let short = sine(440.0, 44100, 2.0);
        assert!(engine.percival_bpm(&short, 44100).is_err());
    }

    #[test]
    fn test_scalar_extractors_on_tone() {
        let engine = NativeDsp::new().unwrap();
        let sr = 44100;
        let tone = sine(1000.0, sr, 1.0);

        let centroid = engine.spectral_centroid(&tone, sr).unwrap();
        assert!((centroid - 1000.0).abs() < 100.0, "centroid {}", centroid);

        let rolloff = engine.spectral_rolloff(&tone, sr).unwrap();
        assert!(rolloff > 900.0 && rolloff < 1100.0, "rolloff {}", rolloff);

        let zcr = engine.zero_crossing_rate(&tone).unwrap();
        assert!((zcr - 2000.0 / sr as f64).abs() < 1e-3);

        assert_eq!(engine.mfcc(&tone, sr).unwrap().len(), MFCC_COEFFICIENTS);
        assert_eq!(engine.mel_bands(&tone, sr).unwrap().len(), MEL_BANDS);
        assert_eq!(engine.spectral_contrast(&tone, sr).unwrap().len(), 6);
    }

    #[test]
    fn test_silence_fails_shape_extractors() {
        let engine = NativeDsp::new().unwrap();
        let silence = vec![0.0; 44100];
        assert!(engine.spectral_centroid(&silence, 44100).is_err());
        assert!(engine.key(&silence, 44100).is_err());
        assert_eq!(engine.energy(&silence).unwrap(), 0.0);
    }
}
