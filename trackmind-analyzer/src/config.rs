//! Configuration resolution for trackmind-analyzer
//!
//! Secrets resolve with Environment → TOML priority. A missing key is not an
//! error: it only disables creative annotation.

use tracing::{info, warn};
use trackmind_common::config::TomlConfig;

/// Primary environment variable for the language-model API key
pub const API_KEY_ENV: &str = "TRACKMIND_OPENROUTER_API_KEY";

/// Conventional OpenRouter variable, consulted second
pub const API_KEY_ENV_FALLBACK: &str = "OPENROUTER_API_KEY";

/// Resolve the language-model API key
///
/// **Priority:** `TRACKMIND_OPENROUTER_API_KEY` → `OPENROUTER_API_KEY` → TOML
pub fn resolve_llm_api_key(toml_config: &TomlConfig) -> Option<String> {
    let candidates = [
        (API_KEY_ENV, std::env::var(API_KEY_ENV).ok()),
        (API_KEY_ENV_FALLBACK, std::env::var(API_KEY_ENV_FALLBACK).ok()),
        ("TOML", toml_config.creative.api_key.clone()),
    ];

    let mut valid = candidates
        .into_iter()
        .filter_map(|(source, key)| key.filter(|k| is_valid_key(k)).map(|k| (source, k)));

    let (source, key) = valid.next()?;
    let shadowed: Vec<&str> = valid.map(|(s, _)| s).collect();
    if !shadowed.is_empty() {
        warn!(
            "Language-model API key found in multiple sources ({}, {}). Using {}.",
            source,
            shadowed.join(", "),
            source
        );
    }

    info!("Language-model API key loaded from {}", source);
    Some(key.trim().to_string())
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(API_KEY_ENV);
        std::env::remove_var(API_KEY_ENV_FALLBACK);
    }

    fn toml_with_key(key: Option<&str>) -> TomlConfig {
        let mut config = TomlConfig::default();
        config.creative.api_key = key.map(str::to_string);
        config
    }

    #[test]
    #[serial]
    fn test_no_key_anywhere() {
        clear_env();
        assert_eq!(resolve_llm_api_key(&toml_with_key(None)), None);
    }

    #[test]
    #[serial]
    fn test_toml_key_used_when_env_absent() {
        clear_env();
        assert_eq!(
            resolve_llm_api_key(&toml_with_key(Some("toml-key"))),
            Some("toml-key".to_string())
        );
    }

    #[test]
    #[serial]
    fn test_env_beats_toml() {
        clear_env();
        std::env::set_var(API_KEY_ENV_FALLBACK, "fallback-key");
        assert_eq!(
            resolve_llm_api_key(&toml_with_key(Some("toml-key"))),
            Some("fallback-key".to_string())
        );

        std::env::set_var(API_KEY_ENV, "primary-key");
        assert_eq!(
            resolve_llm_api_key(&toml_with_key(Some("toml-key"))),
            Some("primary-key".to_string())
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_blank_values_skipped() {
        clear_env();
        std::env::set_var(API_KEY_ENV, "   ");
        assert_eq!(
            resolve_llm_api_key(&toml_with_key(Some("toml-key"))),
            Some("toml-key".to_string())
        );
        assert_eq!(resolve_llm_api_key(&toml_with_key(Some(""))), None);
        clear_env();
    }
}
