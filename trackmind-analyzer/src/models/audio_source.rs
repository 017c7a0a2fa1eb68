//! Pipeline input: a file on disk, or bytes staged into a scoped temp file

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use trackmind_common::{Error, Result};

/// Audio file to analyse
///
/// Immutable once built; owned by one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    path: PathBuf,
    display_name: Option<String>,
}

impl AudioSource {
    /// Create a source from an absolute path
    ///
    /// # Errors
    /// `Error::InvalidInput` for an empty or relative path.
    pub fn new(path: impl Into<PathBuf>, display_name: Option<String>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidInput("file path is empty".to_string()));
        }
        if !path.is_absolute() {
            return Err(Error::InvalidInput(format!(
                "file path must be absolute: {}",
                path.display()
            )));
        }
        let display_name = display_name.filter(|n| !n.trim().is_empty());
        Ok(Self { path, display_name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Caller-supplied display name, if any
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Display name, falling back to the file name, then "Unknown"
    pub fn file_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| {
                self.path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// In-memory audio staged to disk for the duration of one run
///
/// The file is removed when this value is dropped, on every exit path.
#[derive(Debug)]
pub struct TempAudioFile {
    file: tempfile::NamedTempFile,
    source: AudioSource,
}

impl TempAudioFile {
    /// Write `bytes` to a fresh temp file
    ///
    /// The extension is sniffed from the content so the decoder gets a
    /// format hint; `display_name` is carried into the `AudioSource`.
    pub fn stage(bytes: &[u8], display_name: Option<String>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidInput("audio payload is empty".to_string()));
        }

        let extension = infer::get(bytes)
            .map(|kind| kind.extension())
            .unwrap_or("bin");

        let mut file = tempfile::Builder::new()
            .prefix("trackmind-")
            .suffix(&format!(".{}", extension))
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;

        debug!(
            path = %file.path().display(),
            size = bytes.len(),
            extension,
            "Staged audio bytes"
        );

        let source = AudioSource::new(file.path().to_path_buf(), display_name)?;
        Ok(Self { file, source })
    }

    pub fn source(&self) -> &AudioSource {
        &self.source
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
