//! Upload stage
//!
//! Never fails the run. Every failure path yields an outcome without media,
//! which only rules out creative annotation.

use crate::models::AudioSource;
use crate::services::{UploadService, UploadTtl, UploadedMedia};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const UPLOAD_OK: &str = "Audio uploaded successfully";
pub const UPLOAD_FAILED: &str = "Upload failed, proceeding without AI analysis";
pub const UPLOAD_DISABLED: &str = "Upload disabled, proceeding without AI analysis";
pub const UPLOAD_CANCELLED: &str = "Upload cancelled";

/// Result of the upload branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub media: Option<UploadedMedia>,
    /// Stage result message
    pub message: String,
}

impl UploadOutcome {
    fn skipped(message: &str) -> Self {
        Self {
            media: None,
            message: message.to_string(),
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.media.as_ref().map(|m| m.url.as_str())
    }
}

pub struct UploadStage {
    service: Option<Arc<dyn UploadService>>,
    ttl: UploadTtl,
}

impl UploadStage {
    /// `service = None` disables uploading
    pub fn new(service: Option<Arc<dyn UploadService>>, ttl: UploadTtl) -> Self {
        Self { service, ttl }
    }

    pub fn is_enabled(&self) -> bool {
        self.service.is_some()
    }

    pub async fn run(&self, source: &AudioSource, cancel: &CancellationToken) -> UploadOutcome {
        let Some(service) = &self.service else {
            info!("Upload disabled");
            return UploadOutcome::skipped(UPLOAD_DISABLED);
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Upload cancelled");
                return UploadOutcome::skipped(UPLOAD_CANCELLED);
            }
            result = service.upload(source.path(), self.ttl) => result,
        };

        match result {
            Ok(media) => {
                info!(
                    service = service.name(),
                    url = %media.url,
                    expires_at = %media.expires_at,
                    "Audio uploaded"
                );
                UploadOutcome {
                    media: Some(media),
                    message: UPLOAD_OK.to_string(),
                }
            }
            Err(e) => {
                warn!(service = service.name(), error = %e, "Upload failed");
                UploadOutcome::skipped(UPLOAD_FAILED)
            }
        }
    }
}
