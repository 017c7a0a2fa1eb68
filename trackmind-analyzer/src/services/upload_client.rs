//! Temporary media hosting client
//!
//! Hands a local audio file to a short-lived public host so the language
//! model can listen to it. Size and existence are checked before any
//! network traffic.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use trackmind_common::config::UploadConfig;

const USER_AGENT: &str = concat!("TrackMind/", env!("CARGO_PKG_VERSION"));

/// Upload client errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload timed out")]
    Timeout,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid TTL: {0}")]
    InvalidTtl(String),
}

/// Link lifetime offered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UploadTtl {
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "72h")]
    ThreeDays,
}

impl UploadTtl {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::TwelveHours => "12h",
            Self::OneDay => "24h",
            Self::ThreeDays => "72h",
        }
    }

    pub fn hours(self) -> i64 {
        match self {
            Self::OneHour => 1,
            Self::TwelveHours => 12,
            Self::OneDay => 24,
            Self::ThreeDays => 72,
        }
    }
}

impl fmt::Display for UploadTtl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadTtl {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1h" => Ok(Self::OneHour),
            "12h" => Ok(Self::TwelveHours),
            "24h" => Ok(Self::OneDay),
            "72h" => Ok(Self::ThreeDays),
            other => Err(UploadError::InvalidTtl(other.to_string())),
        }
    }
}

/// Hosted copy of a local file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedMedia {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Upload collaborator
#[async_trait]
pub trait UploadService: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, path: &Path, ttl: UploadTtl) -> Result<UploadedMedia, UploadError>;
}

/// Reject missing files and files over `limit` bytes
pub async fn check_upload_file(path: &Path, limit: u64) -> Result<u64, UploadError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        Ok(_) => return Err(UploadError::FileNotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(UploadError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(UploadError::Io(e)),
    };

    let size = metadata.len();
    if size > limit {
        return Err(UploadError::FileTooLarge { size, limit });
    }
    Ok(size)
}

/// The host answers with the bare URL as the response body
fn parse_url_body(body: &str) -> Result<String, UploadError> {
    let url = body.trim();
    if url.starts_with("http") {
        Ok(url.to_string())
    } else {
        Err(UploadError::InvalidResponse(format!(
            "expected a URL, got {:?}",
            url.chars().take(120).collect::<String>()
        )))
    }
}

/// Litterbox (catbox.moe temporary storage) client
pub struct LitterboxUploader {
    http_client: reqwest::Client,
    endpoint: String,
    max_file_size: u64,
}

impl LitterboxUploader {
    pub fn new(endpoint: impl Into<String>, max_file_size: u64, timeout: Duration) -> Result<Self, UploadError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            max_file_size,
        })
    }

    pub fn from_config(config: &UploadConfig) -> Result<Self, UploadError> {
        Self::new(
            config.endpoint.clone(),
            config.max_file_size_bytes,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl UploadService for LitterboxUploader {
    fn name(&self) -> &str {
        "litterbox"
    }

    async fn upload(&self, path: &Path, ttl: UploadTtl) -> Result<UploadedMedia, UploadError> {
        let size = check_upload_file(path, self.max_file_size).await?;
        let bytes = tokio::fs::read(path).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .text("reqtype", "fileupload")
            .text("time", ttl.as_str())
            .part("fileToUpload", part);

        tracing::debug!(file = %path.display(), size, ttl = %ttl, "Uploading audio");

        let response = self
            .http_client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::Timeout
                } else {
                    UploadError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(UploadError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let url = parse_url_body(&body)?;
        Ok(UploadedMedia {
            url,
            expires_at: Utc::now() + ChronoDuration::hours(ttl.hours()),
        })
    }
}
