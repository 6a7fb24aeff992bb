//! Configuration loading via `ortho-config`.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Settings for the process-backed transfer engine, derived from environment
/// variables and configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "CURLSHIM")]
pub struct ShimConfig {
    /// Program that performs transfers. Defaults to `curl` on `PATH`.
    #[ortho_config(default = "curl".to_owned())]
    pub curl_bin: String,
    /// File that receives transfer error messages instead of stderr.
    pub error_log: Option<String>,
}

impl ShimConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// The command line belongs to the transfer tool, so it is never handed
    /// to the loader.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("curlshim")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that supply the value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when `curl_bin` is blank or
    /// `error_log` is set but empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.curl_bin.trim().is_empty() {
            return Err(ConfigError::MissingField(String::from(
                "missing transfer program: set CURLSHIM_CURL_BIN or add curl_bin to curlshim.toml",
            )));
        }
        if self.error_log.as_deref().is_some_and(|path| path.trim().is_empty()) {
            return Err(ConfigError::MissingField(String::from(
                "empty error log path: unset CURLSHIM_ERROR_LOG or give error_log a file name",
            )));
        }
        Ok(())
    }

    /// The error log as a path, when configured.
    #[must_use]
    pub fn error_log_path(&self) -> Option<Utf8PathBuf> {
        self.error_log.as_deref().map(Utf8PathBuf::from)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
