//! Dependency readiness probes
//!
//! Each probe follows the same contract: sleep once for a fixed settle delay,
//! then check. The database checks lean on the admin tool's own retry flag
//! (`mysqladmin --wait`, `pg_isready --timeout`); the application HTTP check
//! is a single best-effort request, so its settle delay is the only grace
//! period it gets.

use crate::docker::{self, DockerError};
use std::time::Duration;
use thiserror::Error;

/// Retry budget handed to mysqladmin's own polling.
const MYSQL_WAIT_RETRIES: u32 = 60;

/// Connection timeout handed to pg_isready.
const POSTGRES_WAIT_SECS: u32 = 30;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("{target} not ready: {message}")]
    NotReady { target: String, message: String },

    #[error(transparent)]
    Docker(#[from] DockerError),
}

/// Sleep `settle` once, then run `check`.
///
/// There is no retry loop at this layer; `check` either polls internally or
/// is a one-shot probe. Failure is fatal for the job.
pub fn wait_ready<F>(settle: Duration, check: F) -> Result<(), ProbeError>
where
    F: FnOnce() -> Result<(), ProbeError>,
{
    if !settle.is_zero() {
        std::thread::sleep(settle);
    }
    check()
}

/// Single best-effort HTTP check against the application's health endpoint.
pub fn http_ready(endpoint: &str) -> Result<(), ProbeError> {
    ureq::get(endpoint)
        .call()
        .map_err(|e| ProbeError::NotReady {
            target: endpoint.to_string(),
            message: e.to_string(),
        })?;
    Ok(())
}

/// Admin ping inside the MySQL container; mysqladmin retries internally.
pub fn mysql_ready(container: &str, root_password: &str) -> Result<(), ProbeError> {
    docker::run(&[
        "exec",
        container,
        "mysqladmin",
        "--user=root",
        &format!("--password={}", root_password),
        &format!("--wait={}", MYSQL_WAIT_RETRIES),
        "ping",
    ])?;
    Ok(())
}

/// Readiness check inside the PostgreSQL container.
pub fn postgres_ready(container: &str, user: &str) -> Result<(), ProbeError> {
    docker::run(&[
        "exec",
        container,
        "pg_isready",
        &format!("--timeout={}", POSTGRES_WAIT_SECS),
        "--username",
        user,
    ])?;
    Ok(())
}
