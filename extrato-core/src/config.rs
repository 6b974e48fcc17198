//! Configuration management
//!
//! settings.json in the data directory:
//! ```json
//! {
//!   "app": { "userId": "local", "defaultBankFormat": "INTER" },
//!   "classifier": { "endpoint": "https://...", "apiKey": "...", "timeoutSecs": 20 },
//!   "parser": { "balanceMarkerMaxLen": 30, "minDetailLen": 3 }
//! }
//! ```
//! Keys this crate does not know about are kept when saving.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::classifier::{KeywordRule, DEFAULT_TIMEOUT_SECS};
use crate::services::parser::{BankFormat, ParserOptions};

pub const SETTINGS_FILE: &str = "settings.json";

/// Overrides classifier.endpoint
pub const ENV_CLASSIFIER_URL: &str = "EXTRATO_CLASSIFIER_URL";
/// Overrides classifier.apiKey
pub const ENV_CLASSIFIER_KEY: &str = "EXTRATO_CLASSIFIER_KEY";

pub const DEFAULT_USER_ID: &str = "local";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    classifier: ClassifierSettings,
    #[serde(default)]
    parser: ParserOptions,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default)]
    default_bank_format: BankFormat,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Where classification suggestions come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierSettings {
    /// Remote service URL; HTTPS unless loopback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Classify locally with the built-in keyword table when no endpoint is set
    #[serde(default)]
    pub use_local_rules: bool,
    /// Extra local rules, checked before the built-in table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<KeywordRule>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            use_local_rules: false,
            rules: Vec::new(),
        }
    }
}

/// Extrato configuration (resolved view of settings.json plus environment)
#[derive(Debug, Clone)]
pub struct Config {
    pub user_id: String,
    pub default_bank_format: BankFormat,
    pub classifier: ClassifierSettings,
    pub parser: ParserOptions,
    // Keep the raw settings for preservation when saving
    raw: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_raw(SettingsFile::default())
    }
}

impl Config {
    /// Load settings.json from the data directory, then apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with_env(data_dir, |key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup
    pub fn load_with_env<F>(data_dir: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_raw(read_settings(data_dir)?);

        if let Some(url) = env(ENV_CLASSIFIER_URL).filter(|v| !v.trim().is_empty()) {
            config.classifier.endpoint = Some(url);
        }
        if let Some(key) = env(ENV_CLASSIFIER_KEY).filter(|v| !v.trim().is_empty()) {
            config.classifier.api_key = Some(key);
        }

        Ok(config)
    }

    fn from_raw(raw: SettingsFile) -> Self {
        Self {
            user_id: raw
                .app
                .user_id
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            default_bank_format: raw.app.default_bank_format,
            classifier: raw.classifier.clone(),
            parser: raw.parser,
            raw,
        }
    }

    /// Save to the data directory, preserving settings this crate does not manage.
    ///
    /// Environment overrides are not written back.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let mut settings = read_settings(data_dir)?;
        let env_classifier = self.raw.classifier.clone();

        settings.app.user_id = Some(self.user_id.clone());
        settings.app.default_bank_format = self.default_bank_format;
        settings.classifier = ClassifierSettings {
            endpoint: env_classifier.endpoint,
            api_key: env_classifier.api_key,
            ..self.classifier.clone()
        };
        settings.parser = self.parser;

        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("Failed to read {}", settings_path.display()))?;
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::warn!(path = %settings_path.display(), error = %e, "ignoring unreadable settings");
            Ok(SettingsFile::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let config = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(config.user_id, "local");
        assert_eq!(config.default_bank_format, BankFormat::Inter);
        assert_eq!(config.classifier.timeout_secs, 20);
        assert!(config.classifier.endpoint.is_none());
        assert_eq!(config.parser, ParserOptions::default());
    }

    #[test]
    fn test_reads_camel_case_settings() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{
                "app": {"userId": "ana", "defaultBankFormat": "NUBANK"},
                "classifier": {"endpoint": "https://c.example.com", "timeoutSecs": 5},
                "parser": {"balanceMarkerMaxLen": 40}
            }"#,
        )
        .unwrap();

        let config = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(config.user_id, "ana");
        assert_eq!(config.default_bank_format, BankFormat::Nubank);
        assert_eq!(config.classifier.endpoint.as_deref(), Some("https://c.example.com"));
        assert_eq!(config.classifier.timeout_secs, 5);
        assert_eq!(config.parser.balance_marker_max_len, 40);
        assert_eq!(config.parser.min_detail_len, 3);
    }

    #[test]
    fn test_env_overrides_classifier() {
        let dir = tempdir().unwrap();
        let config = Config::load_with_env(dir.path(), |key| match key {
            ENV_CLASSIFIER_URL => Some("http://localhost:9000".to_string()),
            ENV_CLASSIFIER_KEY => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.classifier.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(config.classifier.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_save_preserves_unknown_keys_and_skips_env_values() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"app": {"theme": "dark"}, "desktop": {"window": 3}}"#,
        )
        .unwrap();

        let mut config = Config::load_with_env(dir.path(), |key| {
            (key == ENV_CLASSIFIER_KEY).then(|| "from-env".to_string())
        })
        .unwrap();
        config.user_id = "bruno".to_string();
        config.default_bank_format = BankFormat::BancoDoBrasil;
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(SETTINGS_FILE)).unwrap())
                .unwrap();
        assert_eq!(saved["app"]["theme"], "dark");
        assert_eq!(saved["desktop"]["window"], 3);
        assert_eq!(saved["app"]["userId"], "bruno");
        assert_eq!(saved["app"]["defaultBankFormat"], "BANCO_DO_BRASIL");
        assert!(saved["classifier"].get("apiKey").is_none());
    }

    #[test]
    fn test_corrupt_settings_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "{not json").unwrap();
        let config = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(config.user_id, "local");
    }
}
