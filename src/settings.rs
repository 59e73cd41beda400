//! Environment-driven settings for report upload.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable names.
pub mod vars {
    pub const ALLURE_RESULTS_DIR: &str = "ALLURE_RESULTS_DIR";
    pub const SERVER_URL: &str = "SERVER_URL";
    pub const UPLOAD_TIMEOUT_SECS: &str = "UPLOAD_TIMEOUT_SECS";
}

pub const DEFAULT_RESULTS_DIR: &str = "allure-html";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub results_dir: PathBuf,
    pub server_url: String,
    pub upload_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            server_url: DEFAULT_SERVER_URL.to_string(),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Read `.env` from the working directory if present, then the process
    /// environment. Variables already set win over the file.
    pub fn load() -> Result<Self, SettingsError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), ".env loaded"),
            Err(e) if !worth_warning(&e) => {}
            Err(e) => warn!(error = %e, ".env not loaded"),
        }
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        if let Some(dir) = lookup(vars::ALLURE_RESULTS_DIR).filter(|v| !v.is_empty()) {
            settings.results_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(vars::SERVER_URL).filter(|v| !v.is_empty()) {
            settings.server_url = url;
        }
        if let Some(raw) = lookup(vars::UPLOAD_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| SettingsError::InvalidValue {
                var: vars::UPLOAD_TIMEOUT_SECS.to_string(),
                message: format!("expected whole seconds, got '{}'", raw),
            })?;
            settings.upload_timeout = Duration::from_secs(secs);
        }
        Ok(settings)
    }
}

/// A missing `.env` is normal; anything else is worth a warning.
fn worth_warning(err: &dotenvy::Error) -> bool {
    !err.not_found()
}
