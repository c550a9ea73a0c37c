use docgate_core::replication::DEFAULT_BATCH_SIZE;
use docgate_core::SessionState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Replication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory holding the remote's databases
    pub remote: Option<String>,
    /// State a database enters when opened with a remote
    pub mode: SessionState,
    pub batch_size: usize,
    pub timeout_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: None,
            mode: SessionState::Online,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: None,
        }
    }
}

impl SyncConfig {
    pub fn is_configured(&self) -> bool {
        self.remote.is_some()
    }
}

/// Validation applied to writes made through the CLI
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ValidationConfig {
    pub required_fields: Vec<String>,
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory where database snapshots live
    pub prefix: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sync: SyncConfig,
    pub validation: ValidationConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    prefix: Option<PathBuf>,
    sync: Option<SyncConfig>,
    validation: Option<ValidationConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    fn load_with_env<F>(config_path: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut prefix = None;
        let mut config_file = None;
        let mut sync = SyncConfig::default();
        let mut validation = ValidationConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.prefix {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                prefix = Some(ConfigValue::new(resolved, ConfigSource::File));
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
            }
            if let Some(validation_config) = file_config.validation {
                validation = validation_config;
            }
        }

        if let Some(dir) = env("DOCGATE_PREFIX") {
            prefix = Some(ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment));
        }
        if let Some(remote) = env("DOCGATE_REMOTE") {
            sync.remote = Some(remote);
        }
        if let Some(mode) = env("DOCGATE_SYNC") {
            sync.mode = match mode.to_lowercase().as_str() {
                "online" => SessionState::Online,
                "offline" => SessionState::Offline,
                _ => return Err(ConfigError::InvalidValue("DOCGATE_SYNC", mode)),
            };
        }

        let prefix = prefix.unwrap_or_else(|| {
            let dir = Self::default_data_dir();
            tracing::warn!("No storage prefix configured; using {}", dir.display());
            ConfigValue::new(dir, ConfigSource::Default)
        });

        Ok(Self {
            prefix,
            config_file,
            sync,
            validation,
        })
    }

    /// Default config directory (platform-specific config dir + docgate/)
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docgate")
    }

    /// Default data directory (platform-specific data dir + docgate/)
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docgate")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(key, value) => {
                write!(f, "Invalid value for {}: '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        assert!(config.prefix.value.ends_with("docgate"));
        assert_eq!(config.prefix.source, ConfigSource::Default);
        assert!(config.config_file.is_none());
        assert!(!config.sync.is_configured());
        assert_eq!(config.sync.mode, SessionState::Online);
        assert_eq!(config.sync.batch_size, DEFAULT_BATCH_SIZE);
        assert!(config.validation.required_fields.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "prefix: /var/lib/docgate").unwrap();
        writeln!(file, "sync:").unwrap();
        writeln!(file, "  remote: /srv/remote").unwrap();
        writeln!(file, "  mode: offline").unwrap();
        writeln!(file, "  batch_size: 50").unwrap();
        writeln!(file, "validation:").unwrap();
        writeln!(file, "  required_fields: [type, owner]").unwrap();

        let config = Config::load_with_env(Some(config_path.clone()), no_env).unwrap();
        assert_eq!(config.prefix.value, PathBuf::from("/var/lib/docgate"));
        assert_eq!(config.prefix.source, ConfigSource::File);
        assert_eq!(config.config_file, Some(config_path));
        assert_eq!(config.sync.remote.as_deref(), Some("/srv/remote"));
        assert_eq!(config.sync.mode, SessionState::Offline);
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.sync.timeout_secs, None);
        assert_eq!(config.validation.required_fields, vec!["type", "owner"]);
    }

    #[test]
    fn test_relative_prefix_resolves_against_config_dir() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "prefix: data\n").unwrap();

        let config = Config::load_with_env(Some(config_path), no_env).unwrap();
        assert_eq!(config.prefix.value, temp_dir.path().join("data"));
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "prefix: /from/file\nsync:\n  remote: /file/remote\n",
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("DOCGATE_PREFIX", "/from/env"),
            ("DOCGATE_REMOTE", "/env/remote"),
            ("DOCGATE_SYNC", "Offline"),
        ]
        .into_iter()
        .collect();

        let config =
            Config::load_with_env(Some(config_path), |key| env.get(key).map(|v| v.to_string()))
                .unwrap();
        assert_eq!(config.prefix.value, PathBuf::from("/from/env"));
        assert_eq!(config.prefix.source, ConfigSource::Environment);
        assert_eq!(config.sync.remote.as_deref(), Some("/env/remote"));
        assert_eq!(config.sync.mode, SessionState::Offline);
    }

    #[test]
    fn test_invalid_sync_mode() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let result = Config::load_with_env(Some(config_path), |key| {
            (key == "DOCGATE_SYNC").then(|| "sometimes".to_string())
        });
        let err = result.unwrap_err();
        assert!(err.to_string().contains("DOCGATE_SYNC"));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load_with_env(Some(config_path), no_env);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
