//! Configuration of a remaining-votes run
//!
//! Configuration is YAML, read from the [`CONFIG_ENV`] environment variable or
//! a file. Every field has a default. Problems are reported as [`Error`] so the
//! binary can refuse to start.
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::debug;

use crate::{endpoint, fetcher::Pagination, summary::DAILY_VOTE_BUDGET};

/// Environment variable that, when set, holds the configuration contents and
/// takes precedence over any configuration file.
pub const CONFIG_ENV: &str = "REMAINING_VOTES_CONFIG";

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// Error for an unusable origin or session cookie.
    #[error(transparent)]
    Endpoint(#[from] endpoint::Error),
}

fn default_origin() -> String {
    "https://stackoverflow.com".to_string()
}

fn default_daily_budget() -> u32 {
    DAILY_VOTE_BUDGET
}

/// Main configuration struct for this program
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Origin of the Stack Exchange site, e.g. `https://superuser.com`.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Value of the `Cookie` header identifying the logged-in user.
    #[serde(default)]
    pub session_cookie: Option<String>,
    /// How the votes tab is paged.
    #[serde(default)]
    pub pagination: Pagination,
    /// The daily vote cap.
    #[serde(default = "default_daily_budget")]
    pub daily_budget: u32,
    /// Timeout of each request. Unset leaves requests without a timeout.
    #[serde(default)]
    pub request_timeout_millis: Option<u64>,
    /// Directory holding the throttle counter shared by all instances.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// The shared throttle.
    #[serde(default)]
    pub throttle: remaining_votes_throttle::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            session_cookie: None,
            pagination: Pagination::default(),
            daily_budget: default_daily_budget(),
            request_timeout_millis: None,
            state_dir: None,
            throttle: remaining_votes_throttle::Config::default(),
        }
    }
}

impl Config {
    /// The timeout applied to each request, if any.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_millis.map(Duration::from_millis)
    }

    /// The directory holding the throttle counter.
    ///
    /// Unless configured this is `remaining-votes` in the XDG state directory,
    /// falling back to `~/.local/state` and then the temporary directory.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        let base = env::var_os("XDG_STATE_HOME")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".local/state")))
            .unwrap_or_else(env::temp_dir);
        base.join("remaining-votes")
    }

    /// The endpoints of the configured site.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is not an http(s) URL.
    pub fn endpoint(&self) -> Result<endpoint::Endpoint, Error> {
        Ok(endpoint::Endpoint::new(&self.origin)?)
    }

    /// The HTTP client for the configured session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cookie is not a valid header value.
    pub fn client(&self) -> Result<reqwest::Client, Error> {
        Ok(endpoint::client(
            self.session_cookie.as_deref(),
            self.request_timeout(),
        )?)
    }

    /// Check the parts of the configuration serde cannot.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin or session cookie are unusable.
    pub fn validate(&self) -> Result<(), Error> {
        self.endpoint()?;
        self.client()?;
        Ok(())
    }
}

/// Parse configuration from YAML `contents`. Empty contents yield the default
/// configuration.
///
/// # Errors
///
/// Returns an error if `contents` is not a valid configuration.
pub fn parse(contents: &str) -> Result<Config, Error> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

/// Load configuration
///
/// The contents of [`CONFIG_ENV`] win if set, then the file at `path`. With
/// neither the default configuration is used.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the contents do not parse.
pub fn load(path: Option<&Path>) -> Result<Config, Error> {
    load_from(env::var(CONFIG_ENV).ok(), path)
}

fn load_from(env_contents: Option<String>, path: Option<&Path>) -> Result<Config, Error> {
    if let Some(contents) = env_contents {
        debug!("Using config from env var '{CONFIG_ENV}'");
        return parse(&contents);
    }
    let Some(path) = path else {
        debug!("No configuration given, using defaults");
        return Ok(Config::default());
    };
    debug!("Attempting to open configuration file at: {}", path.display());
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;
    parse(&contents)
}
