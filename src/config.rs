//! Assistant configuration.
//!
//! Loaded from a TOML file. Every section has defaults, so an empty file
//! (or no file at all) yields a working local setup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::narration::unit::Placeholders;
use crate::persistence::types::CustomerDetails;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Assistant configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub script: ScriptConfig,
    pub narration: NarrationConfig,
    pub recording: RecordingConfig,
    pub customer: CustomerDetails,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the script and persistence endpoints
    pub base_url: String,
    pub timeout_secs: u64,
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Local script document; when unset the script is fetched from the server
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Joins the lines of a grouped unit
    pub separator: String,
    /// `[["[Customer Name]", "Customer"], ...]`, applied in order
    pub placeholders: Placeholders,
    /// Speaking rate of the console voice
    pub words_per_minute: u32,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            separator: " ".to_string(),
            placeholders: Placeholders::default(),
            words_per_minute: 160,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub extension: String,
    /// How often the capture device emits a chunk
    pub chunk_interval_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/videos"),
            file_prefix: "kyc_recording".to_string(),
            extension: "webm".to_string(),
            chunk_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub consent_given: bool,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "vkyc_assistant=debug,vkyc_assistant_lib=debug,info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load config from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load config from `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.script.path.is_none() && self.server.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "server.base_url",
                message: "required when script.path is not set".to_string(),
            });
        }
        if self.recording.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid {
                key: "recording.extension",
                message: "must not be empty".to_string(),
            });
        }
        if self.narration.words_per_minute == 0 {
            return Err(ConfigError::Invalid {
                key: "narration.words_per_minute",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.recording.chunk_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "recording.chunk_interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.base_url, "http://localhost:5000");
        assert_eq!(config.server.timeout(), Duration::from_secs(30));
        assert_eq!(config.narration.separator, " ");
        assert_eq!(config.recording.extension, "webm");
        assert_eq!(config.recording.chunk_interval_ms, 1000);
        assert_eq!(config.narration.words_per_minute, 160);
        assert!(!config.session.consent_given);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
base_url = "http://kyc.internal:8080"

[narration]
placeholders = [["[Customer Name]", "Sir or Madam"]]

[customer]
name = "Test Customer"
aadhaar_last_4 = "1234"

[session]
consent_given = true
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.base_url, "http://kyc.internal:8080");
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.narration.placeholders.apply("Hi [Customer Name]"), "Hi Sir or Madam");
        assert_eq!(config.customer.name, "Test Customer");
        assert_eq!(config.customer.aadhaar_last_4, "1234");
        assert!(config.session.consent_given);
        assert_eq!(config.recording.file_prefix, "kyc_recording");
    }

    #[test]
    fn test_multi_word_keys_are_snake_case() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
timeout_secs = 5

[narration]
words_per_minute = 200

[recording]
file_prefix = "vkyc"
chunk_interval_ms = 250
output_dir = "out"

[customer]
pan_number = "ABCDE1234F"
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.server.timeout_secs, 5);
        assert_eq!(config.narration.words_per_minute, 200);
        assert_eq!(config.recording.file_prefix, "vkyc");
        assert_eq!(config.recording.chunk_interval_ms, 250);
        assert_eq!(config.recording.output_dir, PathBuf::from("out"));
        assert_eq!(config.customer.pan_number, "ABCDE1234F");

        // Kebab-case spellings are not recognised.
        fs::write(&path, "[server]\ntimeout-secs = 5\n").unwrap();
        assert_eq!(AppConfig::load(&path).unwrap().server.timeout_secs, 30);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = AppConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\nbase_url = 1").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_rejects_empty_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[recording]\nextension = \".\"\n").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Invalid { key: "recording.extension", .. })
        ));
    }
}
