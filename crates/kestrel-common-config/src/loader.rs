//! Configuration file loading and parsing.

use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::env::{apply_env_overrides, EnvError};
use crate::types::ClientConfig;

/// Location of the config file relative to the project directory.
pub const CONFIG_FILE: &str = ".kestrel/config.yaml";

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the config file this loader reads.
    pub fn config_path(&self) -> PathBuf {
        self.base_path.join(CONFIG_FILE)
    }

    /// Load configuration from `.kestrel/config.yaml`, or defaults if absent.
    pub fn load(&self) -> Result<ClientConfig, ConfigError> {
        let config_path = self.config_path();

        if !config_path.exists() {
            return Ok(ClientConfig::default());
        }

        self.load_file(&config_path)
    }

    /// Load configuration from an explicit file, which must exist.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ClientConfig, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        let expanded = self.expand_env_vars(&contents)?;

        let config: ClientConfig =
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        self.validate(&config)?;
        Ok(config)
    }

    /// Load the file (or defaults), then apply `KESTREL_*` overrides and
    /// validate the result.
    pub fn load_with_env(&self, file: Option<&Path>) -> Result<ClientConfig, ConfigError> {
        let mut config = match file {
            Some(path) => self.load_file(path)?,
            None => self.load()?,
        };
        apply_env_overrides(&mut config)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").map_err(|e| {
            ConfigError::ValidationError {
                message: e.to_string(),
            }
        })?;

        let mut result = String::with_capacity(content.len());
        let mut last = 0;
        for cap in re.captures_iter(content) {
            let Some(full_match) = cap.get(0) else {
                continue;
            };
            let var_name = &cap[1];
            let default = cap.get(2).map(|m| m.as_str());

            let value = match (std::env::var(var_name), default) {
                (Ok(v), _) => v,
                (Err(_), Some(d)) => d.to_string(),
                (Err(_), None) => {
                    return Err(ConfigError::EnvVarNotFound {
                        var: var_name.to_string(),
                    })
                }
            };

            result.push_str(&content[last..full_match.start()]);
            result.push_str(&value);
            last = full_match.end();
        }
        result.push_str(&content[last..]);

        Ok(result)
    }

    /// Validate configuration values.
    pub fn validate(&self, config: &ClientConfig) -> Result<(), ConfigError> {
        if config.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "base_url must not be empty".to_string(),
            });
        }

        let factor = config.retry.backoff_factor;
        if factor.is_nan() || factor < 1.0 {
            return Err(ConfigError::ValidationError {
                message: "retry.backoff_factor must be at least 1.0".to_string(),
            });
        }

        if config.retry.timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "retry.timeout_ms must be greater than 0".to_string(),
            });
        }

        if config.stream_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                message: "stream_timeout_ms must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to `.kestrel/config.yaml`.
    pub fn save(&self, config: &ClientConfig) -> Result<(), ConfigError> {
        let config_path = self.config_path();
        if let Some(config_dir) = config_path.parent() {
            std::fs::create_dir_all(config_dir)?;
        }

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(config_path, yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}
