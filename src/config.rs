//! Job configuration for quayci
//!
//! Everything the dispatcher needs is collected up front into an explicit
//! [`Config`] value and passed down by reference; no operation mutates the
//! process environment. CI identity comes from the Travis environment
//! variables, with fallbacks so the tool also works on a developer machine.
//! Infrastructure knobs (image names, health endpoint, settle delays) can be
//! overridden through `~/.config/quayci/config.json`:
//!
//! ```json
//! {
//!   "image": "quay-ci",
//!   "mysql_image": "mysql:5.7",
//!   "app_settle_secs": 120
//! }
//! ```

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Name of the image under test; the tag is derived per job.
const DEFAULT_IMAGE: &str = "quay-ci";

/// Auxiliary database images pinned to the versions the suites expect.
const DEFAULT_MYSQL_IMAGE: &str = "mysql:5.7";
const DEFAULT_POSTGRES_IMAGE: &str = "postgres:9.6";

/// Build specification for the derived application-server image.
const DEFAULT_RUN_DOCKERFILE: &str = "Dockerfile.cirun";

/// Health endpoint probed once after the settle delay.
const DEFAULT_HEALTH_ENDPOINT: &str = "http://127.0.0.1:8080/health/instance";

/// External smoke-test executable run against the gunicorn container.
const DEFAULT_SMOKE_TEST: &str = "./test/smoke_test.sh";

// Grace periods before the first readiness check. The application one is the
// only grace period it gets: the HTTP probe does not retry.
const DEFAULT_APP_SETTLE_SECS: u64 = 120;
const DEFAULT_MYSQL_SETTLE_SECS: u64 = 20;
const DEFAULT_POSTGRES_SETTLE_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine home directory. HOME environment variable not set.")]
    NoHomeDir,

    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Optional overrides read from the config file
#[derive(Debug, Clone, Deserialize, Default)]
struct ConfigFile {
    image: Option<String>,
    cache_dir: Option<PathBuf>,
    mysql_image: Option<String>,
    postgres_image: Option<String>,
    run_dockerfile: Option<String>,
    health_endpoint: Option<String>,
    smoke_test: Option<String>,
    app_settle_secs: Option<u64>,
    mysql_settle_secs: Option<u64>,
    postgres_settle_secs: Option<u64>,
}

/// Resolved configuration for one CI job
#[derive(Debug, Clone)]
pub struct Config {
    /// Commit under test (`TRAVIS_COMMIT`, or "local")
    pub commit: String,
    /// CI build number (`TRAVIS_BUILD_NUMBER`, or "0")
    pub build_number: String,
    /// Result of the prior job step (`TRAVIS_TEST_RESULT`, or 0)
    pub test_result: i32,
    /// Name of the image under test
    pub image: String,
    /// Directory holding the compressed image archive
    pub cache_dir: PathBuf,
    pub mysql_image: String,
    pub postgres_image: String,
    pub run_dockerfile: String,
    pub health_endpoint: String,
    pub smoke_test: String,
    pub app_settle_secs: u64,
    pub mysql_settle_secs: u64,
    pub postgres_settle_secs: u64,
}

impl Config {
    /// Assemble the job configuration from the environment and the optional
    /// config file.
    pub fn load() -> Result<Self, ConfigError> {
        let file = load_config_file()?;

        let commit = std::env::var("TRAVIS_COMMIT").unwrap_or_else(|_| "local".to_string());
        let build_number =
            std::env::var("TRAVIS_BUILD_NUMBER").unwrap_or_else(|_| "0".to_string());
        let test_result = std::env::var("TRAVIS_TEST_RESULT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let cache_dir = match file.cache_dir {
            Some(dir) => dir,
            None => default_cache_dir()?,
        };

        Ok(Config {
            commit,
            build_number,
            test_result,
            image: file.image.unwrap_or_else(|| DEFAULT_IMAGE.to_string()),
            cache_dir,
            mysql_image: file
                .mysql_image
                .unwrap_or_else(|| DEFAULT_MYSQL_IMAGE.to_string()),
            postgres_image: file
                .postgres_image
                .unwrap_or_else(|| DEFAULT_POSTGRES_IMAGE.to_string()),
            run_dockerfile: file
                .run_dockerfile
                .unwrap_or_else(|| DEFAULT_RUN_DOCKERFILE.to_string()),
            health_endpoint: file
                .health_endpoint
                .unwrap_or_else(|| DEFAULT_HEALTH_ENDPOINT.to_string()),
            smoke_test: file
                .smoke_test
                .unwrap_or_else(|| DEFAULT_SMOKE_TEST.to_string()),
            app_settle_secs: file.app_settle_secs.unwrap_or(DEFAULT_APP_SETTLE_SECS),
            mysql_settle_secs: file.mysql_settle_secs.unwrap_or(DEFAULT_MYSQL_SETTLE_SECS),
            postgres_settle_secs: file
                .postgres_settle_secs
                .unwrap_or(DEFAULT_POSTGRES_SETTLE_SECS),
        })
    }

    pub fn app_settle(&self) -> Duration {
        Duration::from_secs(self.app_settle_secs)
    }

    pub fn mysql_settle(&self) -> Duration {
        Duration::from_secs(self.mysql_settle_secs)
    }

    pub fn postgres_settle(&self) -> Duration {
        Duration::from_secs(self.postgres_settle_secs)
    }
}

/// Returns the config file path: `~/.config/quayci/config.json`
pub fn config_path() -> Result<PathBuf, ConfigError> {
    // Use XDG_CONFIG_HOME if set, otherwise fall back to ~/.config
    let config_base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".config"))
                .unwrap_or_default()
        });

    if config_base.as_os_str().is_empty() {
        return Err(ConfigError::NoHomeDir);
    }

    Ok(config_base.join("quayci").join("config.json"))
}

fn load_config_file() -> Result<ConfigFile, ConfigError> {
    let path = config_path()?;

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
        path: path.clone(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::ParseError { path, source })
}

/// Default archive location: `$HOME/docker`
fn default_cache_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join("docker"))
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
pub fn test_config(cache_dir: &std::path::Path) -> Config {
    Config {
        commit: "abcdef1234567".to_string(),
        build_number: "42".to_string(),
        test_result: 0,
        image: DEFAULT_IMAGE.to_string(),
        cache_dir: cache_dir.to_path_buf(),
        mysql_image: DEFAULT_MYSQL_IMAGE.to_string(),
        postgres_image: DEFAULT_POSTGRES_IMAGE.to_string(),
        run_dockerfile: DEFAULT_RUN_DOCKERFILE.to_string(),
        health_endpoint: DEFAULT_HEALTH_ENDPOINT.to_string(),
        smoke_test: DEFAULT_SMOKE_TEST.to_string(),
        app_settle_secs: 0,
        mysql_settle_secs: 0,
        postgres_settle_secs: 0,
    }
}
