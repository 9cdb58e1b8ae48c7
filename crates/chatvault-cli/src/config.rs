//! CLI configuration.

use anyhow::{Context, Result};
use chatvault_core::gemini::{DEFAULT_API_KEY_ENV, GEMINI_API_BASE};
use chatvault_core::DEFAULT_TITLE_LENGTH;
use chatvault_types::DEFAULT_MODEL;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Markdown transcripts are only written when this is set.
    #[serde(default)]
    pub transcript_dir: Option<PathBuf>,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub default_system_prompt: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_title_length")]
    pub title_length: usize,
    #[serde(default = "default_true")]
    pub streaming: bool,
    #[serde(default = "default_true")]
    pub google_search: bool,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chatvault")
}

fn default_db_path() -> PathBuf {
    data_dir().join("chat.db")
}

fn default_state_file() -> PathBuf {
    data_dir().join("session.json")
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_api_base_url() -> String {
    GEMINI_API_BASE.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_title_length() -> usize {
    DEFAULT_TITLE_LENGTH
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            state_file: default_state_file(),
            transcript_dir: None,
            default_model: default_model(),
            default_system_prompt: String::new(),
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            title_length: default_title_length(),
            streaming: true,
            google_search: true,
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            db_path = "/tmp/chat.db"
            streaming = false
            transcript_dir = "/tmp/transcripts"
            "#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/chat.db"));
        assert!(!config.streaming);
        assert_eq!(config.transcript_dir, Some(PathBuf::from("/tmp/transcripts")));
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.title_length, 20);
        assert!(config.google_search);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "title_length = \"twenty\"").unwrap();
        assert!(Config::load_from(&path).is_err());
        assert!(Config::load_from(&dir.path().join("missing.toml")).is_err());
    }
}
