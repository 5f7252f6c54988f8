//! Environment variable handling.

use std::env;
use std::path::Path;

use thiserror::Error;

use crate::types::ClientConfig;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("required environment variable not set: {var}")]
    NotSet { var: String },

    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    // Client overrides
    pub const KESTREL_BASE_URL: &str = "KESTREL_BASE_URL";
    pub const KESTREL_API_TOKEN: &str = "KESTREL_API_TOKEN";
    pub const KESTREL_CLIENT_ID: &str = "KESTREL_CLIENT_ID";
    pub const KESTREL_MAX_RETRIES: &str = "KESTREL_MAX_RETRIES";
    pub const KESTREL_TIMEOUT_MS: &str = "KESTREL_TIMEOUT_MS";

    // Configuration
    pub const KESTREL_CONFIG_PATH: &str = "KESTREL_CONFIG_PATH";
    pub const KESTREL_ENV: &str = "KESTREL_ENV";
}

/// Environment configuration.
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Initialize environment from `.env` files in the current directory.
    pub fn init() -> Result<Self, EnvError> {
        Self::init_from(Path::new("."))
    }

    /// Initialize environment from `.env` files in `dir`.
    ///
    /// Loads `.env`, then `.env.local`, then `.env.<KESTREL_ENV>`. Variables
    /// already set in the process are never overwritten; missing files are
    /// skipped.
    pub fn init_from(dir: &Path) -> Result<Self, EnvError> {
        load_optional(&dir.join(".env"))?;
        load_optional(&dir.join(".env.local"))?;

        if let Ok(name) = env::var(vars::KESTREL_ENV) {
            load_optional(&dir.join(format!(".env.{name}")))?;
        }

        Ok(Self { _guard: () })
    }

    /// Get a required string variable.
    pub fn require(var: &str) -> Result<String, EnvError> {
        env::var(var).map_err(|_| EnvError::NotSet {
            var: var.to_string(),
        })
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }

    /// Get a variable with a default value.
    pub fn get_or(var: &str, default: &str) -> String {
        env::var(var).unwrap_or_else(|_| default.to_string())
    }

    /// Get a boolean variable.
    pub fn get_bool(var: &str) -> Option<bool> {
        env::var(var)
            .ok()
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
    }

    /// Get an integer variable.
    pub fn get_int<T: std::str::FromStr>(var: &str) -> Result<Option<T>, EnvError> {
        match env::var(var) {
            Ok(v) => v.trim().parse().map(Some).map_err(|_| EnvError::InvalidValue {
                var: var.to_string(),
                message: "expected integer".to_string(),
            }),
            Err(_) => Ok(None),
        }
    }
}

fn load_optional(path: &Path) -> Result<(), EnvError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Apply `KESTREL_*` overrides on top of file configuration.
pub fn apply_env_overrides(config: &mut ClientConfig) -> Result<(), EnvError> {
    if let Some(base_url) = Environment::get(vars::KESTREL_BASE_URL) {
        config.base_url = base_url;
    }
    if let Some(token) = Environment::get(vars::KESTREL_API_TOKEN) {
        config.token = Some(token);
    }
    if let Some(client_id) = Environment::get(vars::KESTREL_CLIENT_ID) {
        config.client_id = client_id;
    }
    if let Some(max_retries) = Environment::get_int(vars::KESTREL_MAX_RETRIES)? {
        config.retry.max_retries = max_retries;
    }
    if let Some(timeout_ms) = Environment::get_int(vars::KESTREL_TIMEOUT_MS)? {
        config.retry.timeout_ms = timeout_ms;
    }
    Ok(())
}
