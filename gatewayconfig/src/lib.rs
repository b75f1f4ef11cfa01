//! Loads `.env` and applies it to the process environment, then exposes the
//! gateway's recognized configuration keys as a typed [`AppConfig`].
//!
//! Precedence, high to low: explicit process environment, `.env` file,
//! built-in defaults (spec §6).

mod dotenv;

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read .env: {0}")]
    DotenvRead(std::io::Error),
}

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "./data";

/// The gateway's recognized configuration, resolved from the process
/// environment after `.env` has been applied.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub api_key: Option<String>,
    pub search_tool_enabled: bool,
    pub browser_tool_enabled: bool,
}

impl AppConfig {
    /// Reads recognized keys from the current process environment, falling
    /// back to built-in defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("GATEWAY_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: std::env::var("GATEWAY_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            data_dir: std::env::var("GATEWAY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
            api_key: std::env::var("GATEWAY_API_KEY").ok().filter(|v| !v.is_empty()),
            search_tool_enabled: bool_env("GATEWAY_SEARCH_TOOL_ENABLED", false),
            browser_tool_enabled: bool_env("GATEWAY_BROWSER_TOOL_ENABLED", false),
        }
    }
}

fn bool_env(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Loads `.env` (from `override_dir`, or the current directory, or
/// `GATEWAY_DOTENV_PATH` if set) and applies it to the process environment —
/// existing environment variables are never overwritten. Returns the
/// resulting [`AppConfig`].
pub fn load(override_dir: Option<&Path>) -> Result<AppConfig, LoadError> {
    let dotenv_map = dotenv::load_env_map(override_dir).map_err(LoadError::DotenvRead)?;
    for (key, value) in dotenv_map {
        if std::env::var(&key).is_err() {
            std::env::set_var(key, value);
        }
    }
    Ok(AppConfig::from_env())
}
