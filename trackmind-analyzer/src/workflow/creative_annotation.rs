//! Creative annotation stage
//!
//! Asks the language model for free-text commentary. Skips without a call
//! when there is no hosted URL or no model; every error, timeout and
//! cancellation becomes an absent commentary.

use super::prompts::build_analysis_prompt;
use crate::models::FeatureSet;
use crate::services::{CompletionOptions, LanguageModel};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const CREATIVE_OK: &str = "Creative analysis complete!";
pub const CREATIVE_FAILED: &str = "Creative analysis failed";
pub const CREATIVE_NO_URL: &str = "Skipping creative analysis (no audio URL)";
pub const CREATIVE_NO_MODEL: &str = "Skipping creative analysis (no language model configured)";

/// Result of the annotation stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationOutcome {
    pub commentary: Option<String>,
    pub message: String,
}

impl AnnotationOutcome {
    fn without(message: &str) -> Self {
        Self {
            commentary: None,
            message: message.to_string(),
        }
    }
}

pub struct CreativeAnnotationStage {
    model: Option<Arc<dyn LanguageModel>>,
    options: CompletionOptions,
    chord_limit: usize,
}

impl CreativeAnnotationStage {
    /// `model = None` disables annotation
    pub fn new(model: Option<Arc<dyn LanguageModel>>, options: CompletionOptions, chord_limit: usize) -> Self {
        Self {
            model,
            options,
            chord_limit,
        }
    }

    pub async fn annotate(
        &self,
        features: &FeatureSet,
        url: Option<&str>,
        cancel: &CancellationToken,
    ) -> AnnotationOutcome {
        let Some(url) = url else {
            info!("No audio URL, creative analysis skipped");
            return AnnotationOutcome::without(CREATIVE_NO_URL);
        };
        let Some(model) = &self.model else {
            info!("No language model configured, creative analysis skipped");
            return AnnotationOutcome::without(CREATIVE_NO_MODEL);
        };

        let prompt = build_analysis_prompt(features, self.chord_limit);
        let call = tokio::time::timeout(self.options.timeout, model.complete(&prompt, Some(url), &self.options));

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Creative analysis cancelled");
                return AnnotationOutcome::without(CREATIVE_FAILED);
            }
            result = call => result,
        };

        match result {
            Ok(Ok(text)) => {
                info!(model = model.model(), chars = text.len(), "Creative analysis received");
                AnnotationOutcome {
                    commentary: Some(text),
                    message: CREATIVE_OK.to_string(),
                }
            }
            Ok(Err(e)) => {
                warn!(model = model.model(), error = %e, "Creative analysis failed");
                AnnotationOutcome::without(CREATIVE_FAILED)
            }
            Err(_) => {
                warn!(
                    model = model.model(),
                    timeout_secs = self.options.timeout.as_secs(),
                    "Creative analysis timed out"
                );
                AnnotationOutcome::without(CREATIVE_FAILED)
            }
        }
    }
}
