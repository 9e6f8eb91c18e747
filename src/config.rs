use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File consulted for configuration, relative to the working directory.
pub const CONFIG_FILE: &str = "Election.toml";

/// Prefix for environment variable overrides, e.g. `ELECTION_API_BASE_URL`.
pub const ENV_PREFIX: &str = "ELECTION_";

/// Client configuration, derived from defaults, `Election.toml` and `ELECTION_*`
/// environment variables, in increasing order of precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    api_base_url: String,
    request_timeout: u64,
    session_file: Option<PathBuf>,
    log_config: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8089".to_string(),
            request_timeout: 30,
            session_file: None,
            log_config: PathBuf::from("log4rs.yaml"),
        }
    }
}

impl Config {
    /// Load the configuration from all sources.
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Extract the configuration from an explicit figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.base_url()?;
        Ok(config)
    }

    /// Root of the backend REST API, as configured.
    /// Configured via `API_BASE_URL`.
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Root of the backend REST API, parsed.
    pub fn base_url(&self) -> Result<Url> {
        match Url::parse(&self.api_base_url) {
            Ok(url) if !url.cannot_be_a_base() => Ok(url),
            _ => Err(Error::BadRequest(format!(
                "`api_base_url` must be an absolute base URL, got {}",
                self.api_base_url
            ))),
        }
    }

    /// Overall timeout applied to each HTTP request.
    /// Configured in seconds via `REQUEST_TIMEOUT`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Where durable session state lives; `None` keeps it in memory only.
    /// Configured via `SESSION_FILE`.
    pub fn session_file(&self) -> Option<&Path> {
        self.session_file.as_deref()
    }

    /// The same configuration, keeping session state in `path`.
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// The log4rs configuration used by binaries.
    /// Configured via `LOG_CONFIG`.
    pub fn log_config(&self) -> &Path {
        &self.log_config
    }
}
