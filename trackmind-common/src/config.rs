//! Bootstrap configuration loading and config file resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in defaults (code constants)
//!
//! Every field carries a default, so a missing file or a partial file is
//! always usable. Resolution of individual secrets (API keys) happens in the
//! consuming crate; this module only knows how to find and parse the file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "TRACKMIND_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub upload: UploadConfig,
    pub creative: CreativeConfig,
    pub progress: ProgressConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error).
    /// `RUST_LOG` overrides this when set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// HTTP surface configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5790,
        }
    }
}

/// Chord tracking and digest parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Samples per chord analysis frame
    pub chord_frame_size: usize,
    /// Samples between successive chord frames
    pub chord_hop_size: usize,
    /// Minimum run length (frames) for a chord to survive smoothing
    pub min_chord_run: usize,
    /// Maximum number of chords listed in the language-model digest
    pub prompt_chord_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            chord_frame_size: 4096,
            chord_hop_size: 2048,
            min_chord_run: 3,
            prompt_chord_limit: 20,
        }
    }
}

/// Temporary upload configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    /// Link lifetime: "1h", "12h", "24h" or "72h"
    pub ttl: String,
    pub endpoint: String,
    pub max_file_size_bytes: u64,
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: "1h".to_string(),
            endpoint: "https://litterbox.catbox.moe/resources/internals/api.php".to_string(),
            max_file_size_bytes: 50 * 1024 * 1024,
            timeout_secs: 120,
        }
    }
}

/// Creative commentary (language model) configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CreativeConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// API key; environment variables take precedence
    pub api_key: Option<String>,
}

impl Default for CreativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "google/gemini-2.5-pro".to_string(),
            temperature: 0.7,
            max_tokens: 1500,
            timeout_secs: 90,
            api_key: None,
        }
    }
}

/// Progress channel configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Bounded capacity; slow consumers lose the oldest events first
    pub capacity: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

impl TomlConfig {
    /// Parse a config file. Fails if the file is unreadable or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config: TomlConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded TOML config");
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            Some(p) => {
                info!(path = %p.display(), "Config file not found, using built-in defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if a.chord_frame_size == 0 || a.chord_hop_size == 0 {
            return Err(Error::Config(
                "analysis.chord_frame_size and analysis.chord_hop_size must be non-zero".to_string(),
            ));
        }
        if a.chord_hop_size > a.chord_frame_size {
            return Err(Error::Config(format!(
                "analysis.chord_hop_size ({}) must not exceed chord_frame_size ({})",
                a.chord_hop_size, a.chord_frame_size
            )));
        }
        if self.progress.capacity == 0 {
            return Err(Error::Config("progress.capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Default config file location: `<config_dir>/trackmind/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("trackmind").join("config.toml"))
}

/// Resolve which config file to read
///
/// CLI argument, then `TRACKMIND_CONFIG`, then the platform default.
/// The returned path may not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path()
}

/// Write config to disk, creating parent directories
///
/// Writes to a sibling temp file first and renames it into place so a
/// crash never leaves a truncated config behind.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    info!(path = %path.display(), "Config written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_reference_parameters() {
        let config = TomlConfig::default();
        assert_eq!(config.analysis.chord_frame_size, 4096);
        assert_eq!(config.analysis.chord_hop_size, 2048);
        assert_eq!(config.analysis.min_chord_run, 3);
        assert_eq!(config.analysis.prompt_chord_limit, 20);
        assert_eq!(config.upload.ttl, "1h");
        assert_eq!(config.upload.max_file_size_bytes, 50 * 1024 * 1024);
        assert_eq!(config.creative.max_tokens, 1500);
        assert!(config.creative.api_key.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[analysis]\nmin_chord_run = 4\n\n[creative]\nmodel = \"some/model\"\n",
        )
        .unwrap();

        let config = TomlConfig::load(&path).unwrap();
        assert_eq!(config.analysis.min_chord_run, 4);
        assert_eq!(config.analysis.chord_frame_size, 4096);
        assert_eq!(config.creative.model, "some/model");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[analysis\nmin_chord_run = ").unwrap();

        let err = TomlConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_hop_larger_than_frame_rejected() {
        let mut config = TomlConfig::default();
        config.analysis.chord_hop_size = 8192;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let config = TomlConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = TomlConfig::default();
        config.server.port = 6001;
        write_toml_config(&config, &path).unwrap();

        let loaded = TomlConfig::load(&path).unwrap();
        assert_eq!(loaded.server.port, 6001);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    #[serial]
    fn test_cli_path_beats_env() {
        std::env::set_var(CONFIG_PATH_ENV, "/from/env.toml");
        let cli = PathBuf::from("/from/cli.toml");
        assert_eq!(resolve_config_path(Some(&cli)), Some(cli.clone()));
        assert_eq!(resolve_config_path(None), Some(PathBuf::from("/from/env.toml")));
        std::env::remove_var(CONFIG_PATH_ENV);
    }
}
