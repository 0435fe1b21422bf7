//! Composer configuration
//!
//! Loaded once at startup: YAML file first (every field optional), then
//! environment overrides. Binaries call `dotenvy::dotenv()` before
//! `ComposerConfig::from_env()` so a local `.env` participates.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming the YAML config file.
pub const CONFIG_PATH_ENV: &str = "COMPOSER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Base URL of the admin API hosting the collaborator endpoints.
    pub api_base_url: String,
    /// Minimum characters before autocomplete or entity search is issued.
    pub min_query_len: usize,
    /// Storage folder passed to the presign endpoint.
    pub upload_folder: String,
    pub request_timeout_secs: u64,
    /// Submit uploaded files for analysis.
    pub analysis_enabled: bool,
    /// Suggestions below this confidence are dropped on arrival.
    pub min_suggestion_confidence: f64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/".to_string(),
            min_query_len: 2,
            upload_folder: "composer".to_string(),
            request_timeout_secs: 30,
            analysis_enabled: true,
            min_suggestion_confidence: 0.0,
        }
    }
}

impl ComposerConfig {
    /// Parse a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// File named by `COMPOSER_CONFIG` (if set), then `COMPOSER_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `COMPOSER_*` overrides from an arbitrary lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("COMPOSER_API_URL") {
            self.api_base_url = url;
        }
        if let Some(v) = lookup("COMPOSER_MIN_QUERY_LEN") {
            self.min_query_len = parse_env("COMPOSER_MIN_QUERY_LEN", &v)?;
        }
        if let Some(folder) = lookup("COMPOSER_UPLOAD_FOLDER") {
            self.upload_folder = folder;
        }
        if let Some(v) = lookup("COMPOSER_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("COMPOSER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("COMPOSER_ANALYSIS_ENABLED") {
            self.analysis_enabled = env_bool("COMPOSER_ANALYSIS_ENABLED", &v)?;
        }
        if let Some(v) = lookup("COMPOSER_MIN_CONFIDENCE") {
            self.min_suggestion_confidence = parse_env("COMPOSER_MIN_CONFIDENCE", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_suggestion_confidence) {
            return Err(ConfigError::InvalidValue {
                key: "min_suggestion_confidence",
                value: self.min_suggestion_confidence.to_string(),
            });
        }
        if self.min_query_len == 0 {
            return Err(ConfigError::InvalidValue {
                key: "min_query_len",
                value: "0".into(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn env_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ComposerConfig::from_yaml_str("min_query_len: 3\n").unwrap();
        assert_eq!(config.min_query_len, 3);
        assert_eq!(config.upload_folder, "composer");
        assert!(config.analysis_enabled);
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(
            ComposerConfig::from_yaml_str("").unwrap(),
            ComposerConfig::default()
        );
    }

    #[test]
    fn overrides_win_over_file_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("COMPOSER_API_URL", "https://clinic.example/api/"),
            ("COMPOSER_ANALYSIS_ENABLED", "off"),
            ("COMPOSER_MIN_CONFIDENCE", "0.4"),
        ]);
        let config = ComposerConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_base_url, "https://clinic.example/api/");
        assert!(!config.analysis_enabled);
        assert_eq!(config.min_suggestion_confidence, 0.4);
    }

    #[test]
    fn bad_override_is_rejected() {
        let err = ComposerConfig::default()
            .with_overrides(|k| (k == "COMPOSER_MIN_QUERY_LEN").then(|| "two".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "COMPOSER_MIN_QUERY_LEN",
                ..
            }
        ));
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        assert!(ComposerConfig::from_yaml_str("min_suggestion_confidence: 1.5").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "upload_folder: invoices\nrequest_timeout_secs: 5").unwrap();
        let config = ComposerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.upload_folder, "invoices");
        assert_eq!(config.request_timeout_secs, 5);
    }
}
