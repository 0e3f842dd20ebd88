//! Settings module
//!
//! depot reads a small JSON settings file naming the provider, the remote
//! root folder, the local tmp directory for retrievals, and optionally an
//! access credential and a chunk size override.

use crate::error::{Error, Result};
use crate::upload::DEFAULT_CHUNK_SIZE;
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable consulted when the settings file carries no
/// credential.
pub const CREDENTIAL_ENV_VAR: &str = "DEPOT_CREDENTIAL";

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Which backend to talk to, with its provider-specific fields
    #[serde(flatten)]
    pub provider: Provider,
    /// Remote folder all logical paths are rooted under. [`Settings::load`]
    /// strips surrounding whitespace and slashes; construct directly only
    /// with an already-clean value.
    pub root: String,
    /// Local directory retrieved files are written into
    pub tmp: PathBuf,
    /// Access credential for the provider; falls back to the
    /// `DEPOT_CREDENTIAL` environment variable when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Chunk size override in bytes for chunked uploads.
    /// [`Settings::from_json`] rejects a zero override; construct directly
    /// only with a positive value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum Provider {
    /// In-process memory backend, for tests and local experiments
    Memory,
    /// Amazon S3 or any S3-compatible endpoint
    S3 { bucket: String },
    /// Google Cloud Storage
    Gcs { bucket: String },
    /// Azure Blob Storage
    Azure { container: String },
}

impl Settings {
    /// Default settings file location: `<config dir>/depot/settings.json`
    pub fn settings_path() -> Result<PathBuf> {
        let config_dir = config_dir().ok_or_else(|| {
            Error::Settings("Unable to determine config directory".to_string())
        })?;
        Ok(config_dir.join("depot").join("settings.json"))
    }

    /// Example settings content, shown when no settings file exists yet
    pub fn example_content() -> String {
        let example = Settings {
            provider: Provider::S3 {
                bucket: "my-bucket".to_string(),
            },
            root: "storage".to_string(),
            tmp: std::env::temp_dir().join("depot"),
            credential: Some("ACCESS_KEY:SECRET_KEY".to_string()),
            chunk_size: None,
        };
        // Serializing a hand-built example cannot fail
        serde_json::to_string_pretty(&example).unwrap_or_default()
    }

    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Settings(format!("Cannot read settings file {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    /// Parse settings from a JSON string
    pub fn from_json(contents: &str) -> Result<Self> {
        let mut settings: Settings = serde_json::from_str(contents)
            .map_err(|e| Error::Settings(format!("Failed to parse settings: {}", e)))?;
        if settings.chunk_size == Some(0) {
            return Err(Error::Settings(
                "chunk_size must be at least 1 byte".to_string(),
            ));
        }
        settings.root = settings.root.trim().trim_matches('/').to_string();
        Ok(settings)
    }

    /// Resolved access credential: settings file first, then the
    /// `DEPOT_CREDENTIAL` environment variable.
    pub fn credential(&self) -> Option<String> {
        self.credential
            .clone()
            .or_else(|| std::env::var(CREDENTIAL_ENV_VAR).ok())
    }

    /// Chunk size for chunked uploads, defaulting to 8 MiB
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Overrides one environment variable while holding the env lock, and
    /// restores the prior value on drop. Tests touching the environment
    /// must go through this so they cannot interleave.
    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            EnvVarGuard {
                key,
                previous,
                _lock: lock,
            }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.previous.take() {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_parse_s3_settings() {
        let json = r#"{
            "provider": "s3",
            "bucket": "backups",
            "root": "storage",
            "tmp": "/tmp/depot",
            "credential": "AKID:SECRET"
        }"#;

        let settings = Settings::from_json(json).unwrap();
        assert_eq!(
            settings.provider,
            Provider::S3 {
                bucket: "backups".to_string()
            }
        );
        assert_eq!(settings.root, "storage");
        assert_eq!(settings.tmp, PathBuf::from("/tmp/depot"));
        assert_eq!(settings.credential(), Some("AKID:SECRET".to_string()));
    }

    #[test]
    fn test_parse_minimal_memory_settings() {
        let json = r#"{"provider": "memory", "root": "r", "tmp": "/tmp/d"}"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.provider, Provider::Memory);
        assert!(settings.credential.is_none());
        assert_eq!(settings.chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_root_is_canonicalized() {
        let json = r#"{"provider": "memory", "root": " /storage/ ", "tmp": "/tmp/d"}"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.root, "storage");
    }

    #[test]
    fn test_chunk_size_override() {
        let json =
            r#"{"provider": "memory", "root": "r", "tmp": "/tmp/d", "chunk_size": 1024}"#;
        let settings = Settings::from_json(json).unwrap();
        assert_eq!(settings.chunk_size(), 1024);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let json =
            r#"{"provider": "memory", "root": "r", "tmp": "/tmp/d", "chunk_size": 0}"#;
        let err = Settings::from_json(json).unwrap_err();
        assert!(matches!(err, Error::Settings(_)));
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let json = r#"{"provider": "ftp", "root": "r", "tmp": "/tmp/d"}"#;
        assert!(Settings::from_json(json).is_err());
    }

    #[test]
    fn test_credential_env_fallback() {
        let json = r#"{"provider": "memory", "root": "r", "tmp": "/tmp/d"}"#;
        let settings = Settings::from_json(json).unwrap();

        let _env = EnvVarGuard::set(CREDENTIAL_ENV_VAR, "from-env");
        assert_eq!(settings.credential(), Some("from-env".to_string()));
    }

    #[test]
    fn test_settings_round_trip() {
        let json = r#"{
            "provider": "azure",
            "container": "files",
            "root": "storage",
            "tmp": "/tmp/depot"
        }"#;
        let settings = Settings::from_json(json).unwrap();
        let serialized = serde_json::to_string(&settings).unwrap();
        let reparsed = Settings::from_json(&serialized).unwrap();
        assert_eq!(reparsed.provider, settings.provider);
        assert_eq!(reparsed.root, settings.root);
    }
}
