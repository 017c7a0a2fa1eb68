//! Fake collaborators for pipeline tests

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trackmind_analyzer::dsp::EngineProvider;
use trackmind_analyzer::services::{
    CompletionOptions, LanguageModel, LlmError, UploadError, UploadService, UploadTtl, UploadedMedia,
};
use trackmind_analyzer::workflow::{CreativeAnnotationStage, PipelineOrchestrator, TechnicalAnalysisStage, UploadStage};
use trackmind_common::config::AnalysisConfig;

/// Upload behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Succeed,
    Fail,
    Hang,
}

/// Uploader that records what it was handed
pub struct FakeUploader {
    mode: UploadMode,
    pub calls: AtomicUsize,
    /// (path, existed at call time)
    pub seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl FakeUploader {
    pub fn new(mode: UploadMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadService for FakeUploader {
    fn name(&self) -> &str {
        "fake"
    }

    async fn upload(&self, path: &Path, ttl: UploadTtl) -> Result<UploadedMedia, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push((path.to_path_buf(), path.exists()));

        match self.mode {
            UploadMode::Succeed => Ok(UploadedMedia {
                url: "https://media.test/clip.wav".to_string(),
                expires_at: Utc::now() + ChronoDuration::hours(ttl.hours()),
            }),
            UploadMode::Fail => Err(UploadError::Network("connection refused".to_string())),
            UploadMode::Hang => std::future::pending().await,
        }
    }
}

/// Language model that counts invocations
pub struct CountingModel {
    pub calls: AtomicUsize,
    pub last_media: Mutex<Option<String>>,
}

impl CountingModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            last_media: Mutex::new(None),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for CountingModel {
    fn name(&self) -> &str {
        "counting"
    }

    fn model(&self) -> &str {
        "test/counting"
    }

    async fn complete(
        &self,
        _prompt: &str,
        media_ref: Option<&str>,
        _options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_media.lock().unwrap() = media_ref.map(str::to_string);
        Ok("Driving kick under a bright C major pad.".to_string())
    }
}

/// Orchestrator over the native engine with the given collaborators
pub fn orchestrator(
    upload: Option<Arc<dyn UploadService>>,
    model: Option<Arc<dyn LanguageModel>>,
) -> PipelineOrchestrator {
    let analysis = AnalysisConfig::default();
    let options = CompletionOptions {
        timeout: Duration::from_secs(5),
        ..Default::default()
    };

    PipelineOrchestrator::new(
        TechnicalAnalysisStage::new(Arc::new(EngineProvider::native()), &analysis),
        UploadStage::new(upload, UploadTtl::OneHour),
        CreativeAnnotationStage::new(model, options, analysis.prompt_chord_limit),
    )
}
