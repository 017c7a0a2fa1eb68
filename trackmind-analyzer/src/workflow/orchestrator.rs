//! Pipeline orchestrator
//!
//! # Stage Progression
//! PREPARING → (TECHNICAL_ANALYSIS ‖ UPLOADING) → CREATIVE_ANNOTATION → COMPILING → DONE
//!
//! The two middle branches run concurrently and are joined with
//! `tokio::try_join!`: both must finish before annotation starts, and a
//! technical failure ends the run at once, dropping the upload branch.
//! Upload and annotation are soft; their failures only thin out the result.
//!
//! Progress goes to the run's `ProgressEmitter`. Events of one branch keep
//! their order; the two parallel branches interleave freely.

use super::creative_annotation::CreativeAnnotationStage;
use super::result_compiler::ResultCompiler;
use super::technical_analysis::TechnicalAnalysisStage;
use super::upload_stage::UploadStage;
use crate::dsp::EngineProvider;
use crate::error::PipelineError;
use crate::models::{AnalysisResult, AudioSource, PipelineRun, PipelineStage, StageTransition, TempAudioFile};
use crate::services::{CompletionOptions, LanguageModel, LitterboxUploader, OpenRouterClient, UploadService, UploadTtl};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use trackmind_common::config::TomlConfig;
use trackmind_common::{PipelineStep, ProgressEmitter, ProgressEvent};

pub const PREPARE_OK: &str = "Audio file loaded successfully";

/// Runs one analysis per call; holds no run-scoped state
pub struct PipelineOrchestrator {
    technical: Arc<TechnicalAnalysisStage>,
    upload: UploadStage,
    creative: CreativeAnnotationStage,
    compiler: ResultCompiler,
}

impl PipelineOrchestrator {
    pub fn new(technical: TechnicalAnalysisStage, upload: UploadStage, creative: CreativeAnnotationStage) -> Self {
        Self {
            technical: Arc::new(technical),
            upload,
            creative,
            compiler: ResultCompiler,
        }
    }

    /// Wire the default collaborators from configuration
    ///
    /// Collaborators that are disabled or cannot be built are left out;
    /// the pipeline then degrades instead of refusing to start.
    pub fn from_config(config: &TomlConfig, engines: Arc<EngineProvider>, api_key: Option<String>) -> Self {
        let technical = TechnicalAnalysisStage::new(engines, &config.analysis);

        let ttl = config.upload.ttl.parse::<UploadTtl>().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid upload TTL, using 1h");
            UploadTtl::default()
        });
        let uploader: Option<Arc<dyn UploadService>> = if config.upload.enabled {
            match LitterboxUploader::from_config(&config.upload) {
                Ok(u) => Some(Arc::new(u)),
                Err(e) => {
                    warn!(error = %e, "Upload client unavailable, uploads disabled");
                    None
                }
            }
        } else {
            info!("Uploads disabled by configuration");
            None
        };

        let model: Option<Arc<dyn LanguageModel>> = match (config.creative.enabled, api_key) {
            (false, _) => {
                info!("Creative analysis disabled by configuration");
                None
            }
            (true, None) => {
                warn!("No language-model API key configured, creative analysis disabled");
                None
            }
            (true, Some(key)) => match OpenRouterClient::from_config(&config.creative, key) {
                Ok(client) => {
                    info!(model = %config.creative.model, "Creative analysis enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    warn!(error = %e, "Language-model client unavailable, creative analysis disabled");
                    None
                }
            },
        };

        Self::new(
            technical,
            UploadStage::new(uploader, ttl),
            CreativeAnnotationStage::new(
                model,
                CompletionOptions::from(&config.creative),
                config.analysis.prompt_chord_limit,
            ),
        )
    }

    /// Analyse a file on disk
    pub async fn run(
        &self,
        source: AudioSource,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> AnalysisResult {
        let mut run = PipelineRun::new();
        let file_name = source.file_name();
        let span = info_span!("pipeline", run_id = %run.id, file = %file_name);

        async {
            info!(path = %source.path().display(), "Pipeline started");
            match self.execute(&mut run, &source, &file_name, emitter, cancel).await {
                Ok(result) => {
                    info!("Pipeline finished");
                    result
                }
                Err(e) => self.fail(&mut run, &file_name, e, emitter),
            }
        }
        .instrument(span)
        .await
    }

    /// Analyse in-memory audio
    ///
    /// The bytes are staged in a temp file that is removed when this call
    /// returns, whatever the outcome.
    pub async fn run_bytes(
        &self,
        bytes: &[u8],
        display_name: Option<String>,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> AnalysisResult {
        match TempAudioFile::stage(bytes, display_name.clone()) {
            Ok(staged) => self.run(staged.source().clone(), emitter, cancel).await,
            Err(e) => {
                let mut run = PipelineRun::new();
                let name = display_name.unwrap_or_else(|| "Unknown".to_string());
                self.fail(&mut run, &name, PipelineError::Input(e), emitter)
            }
        }
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        source: &AudioSource,
        file_name: &str,
        emitter: &ProgressEmitter,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        // Preparing
        emitter.emit(ProgressEvent::started(PipelineStep::PrepareAudio));
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        tokio::fs::metadata(source.path())
            .await
            .map_err(|e| PipelineError::Decode(format!("{}: {}", source.path().display(), e)))?;
        emitter.emit(ProgressEvent::completed(PipelineStep::PrepareAudio, PREPARE_OK));

        // TechnicalAnalysis ‖ Uploading
        log_transition(&run.fork()?);

        let technical_branch = async {
            emitter.emit(ProgressEvent::started(PipelineStep::TechnicalAnalysis));
            let features = self.technical.spawn(source.clone(), cancel.clone()).await?;
            emitter.emit(ProgressEvent::completed(PipelineStep::TechnicalAnalysis, features.summary()));
            Ok::<_, PipelineError>(features)
        };
        let upload_branch = async {
            emitter.emit(ProgressEvent::started(PipelineStep::UploadAudio));
            let outcome = self.upload.run(source, cancel).await;
            emitter.emit(ProgressEvent::completed(PipelineStep::UploadAudio, outcome.message.clone()));
            Ok::<_, PipelineError>(outcome)
        };
        let (features, upload) = tokio::try_join!(technical_branch, upload_branch)?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // CreativeAnnotation
        log_transition(&run.join()?);
        emitter.emit(ProgressEvent::started(PipelineStep::CreativeAnalysis));
        let annotation = self.creative.annotate(&features, upload.url(), cancel).await;
        emitter.emit(ProgressEvent::completed(PipelineStep::CreativeAnalysis, annotation.message.clone()));

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Compiling
        log_transition(&run.compile()?);
        emitter.emit(ProgressEvent::started(PipelineStep::CompileResults));
        let result = self
            .compiler
            .compile(run.id, file_name, features, annotation.commentary);

        log_transition(&run.finish()?);
        emitter.emit(ProgressEvent::result(PipelineStep::CompileResults, result.final_message.clone()));
        Ok(result)
    }

    fn fail(
        &self,
        run: &mut PipelineRun,
        file_name: &str,
        err: PipelineError,
        emitter: &ProgressEmitter,
    ) -> AnalysisResult {
        let step = failed_step(run.stages());
        match &err {
            PipelineError::Cancelled => warn!(step = %step, "Pipeline cancelled"),
            other => error!(step = %step, error = %other, "Pipeline failed"),
        }

        match run.fail() {
            Ok(t) => log_transition(&t),
            Err(e) => warn!(error = %e, "Run already terminal"),
        }

        let result = self.compiler.compile_failure(run.id, file_name, &err);
        emitter.emit(ProgressEvent::result(step, result.message.clone()));
        result
    }
}

/// Step to blame for a failure raised while `stages` were active
fn failed_step(stages: &[PipelineStage]) -> PipelineStep {
    if stages.contains(&PipelineStage::TechnicalAnalysis) {
        PipelineStep::TechnicalAnalysis
    } else if stages.contains(&PipelineStage::CreativeAnnotation) {
        PipelineStep::CreativeAnalysis
    } else if stages.contains(&PipelineStage::Compiling) {
        PipelineStep::CompileResults
    } else {
        PipelineStep::PrepareAudio
    }
}

fn log_transition(t: &StageTransition) {
    debug!(from = ?t.from, to = ?t.to, "Stage transition");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_step_mapping() {
        assert_eq!(failed_step(&[PipelineStage::Preparing]), PipelineStep::PrepareAudio);
        assert_eq!(
            failed_step(&[PipelineStage::TechnicalAnalysis, PipelineStage::Uploading]),
            PipelineStep::TechnicalAnalysis
        );
        assert_eq!(failed_step(&[PipelineStage::CreativeAnnotation]), PipelineStep::CreativeAnalysis);
        assert_eq!(failed_step(&[PipelineStage::Compiling]), PipelineStep::CompileResults);
    }

    #[tokio::test]
    async fn test_missing_file_fails_in_prepare() {
        let config = TomlConfig::default();
        let orchestrator = PipelineOrchestrator::from_config(&config, Arc::new(EngineProvider::native()), None);
        let emitter = ProgressEmitter::new(16);
        let mut rx = emitter.subscribe();

        let source = AudioSource::new("/no/such/file.wav", None).unwrap();
        let result = orchestrator.run(source, &emitter, &CancellationToken::new()).await;

        assert!(!result.is_success());
        assert!(result.technical.is_none());

        let mut last = None;
        while let Some(event) = rx.try_recv() {
            last = Some(event);
        }
        let last = last.unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.step_name, PipelineStep::PrepareAudio);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let orchestrator =
            PipelineOrchestrator::from_config(&TomlConfig::default(), Arc::new(EngineProvider::native()), None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let source = AudioSource::new("/no/such/file.wav", Some("x".to_string())).unwrap();
        let result = orchestrator.run(source, &ProgressEmitter::new(4), &cancel).await;

        assert!(!result.is_success());
        assert!(result.message.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_empty_bytes_fail_cleanly() {
        let orchestrator =
            PipelineOrchestrator::from_config(&TomlConfig::default(), Arc::new(EngineProvider::native()), None);
        let result = orchestrator
            .run_bytes(&[], Some("empty.wav".to_string()), &ProgressEmitter::new(4), &CancellationToken::new())
            .await;
        assert!(!result.is_success());
        assert_eq!(result.file_name, "empty.wav");
    }
}
