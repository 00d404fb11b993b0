//! Test suite execution
//!
//! A suite runs as `make <target> MARK=<marker>` inside a fresh container of
//! the cached image. Database-backed suites first get their service started
//! and the connection descriptor passed through the container environment.
//! The gunicorn smoke test takes its own path: it derives a run image,
//! launches it detached, probes it over HTTP, and always kills the detached
//! container afterwards.

use crate::cache::{self, CacheError};
use crate::config::Config;
use crate::docker::{self, DockerError};
use crate::image::ImageRef;
use crate::probe::{self, ProbeError};
use crate::services::{self, ServiceError, ServiceKind};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("Suite '{target}' exited with status {code}")]
    SuiteFailed { target: &'static str, code: i32 },

    #[error("Run image build exited with status {code}")]
    RunImageBuild { code: i32 },

    #[error("Failed to execute smoke test {script}: {source}")]
    SmokeExec {
        script: String,
        source: std::io::Error,
    },

    #[error("Smoke test {script} exited with status {code}")]
    SmokeFailed { script: String, code: i32 },
}

/// The named test suites. Suite internals are opaque here; each maps to a
/// make target inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    Unit,
    Registry,
    RegistryOld,
    Certs,
    Mysql,
    Postgres,
}

impl Suite {
    pub fn target(self) -> &'static str {
        match self {
            Suite::Unit => "unit-test",
            Suite::Registry => "registry-test",
            Suite::RegistryOld => "registry-test-old",
            Suite::Certs => "certs-test",
            Suite::Mysql | Suite::Postgres => "full-db-test",
        }
    }

    pub fn required_service(self) -> Option<ServiceKind> {
        match self {
            Suite::Mysql => Some(ServiceKind::Mysql),
            Suite::Postgres => Some(ServiceKind::Postgres),
            _ => None,
        }
    }
}

/// Load the cached image and run one suite inside it.
pub fn run_suite(config: &Config, suite: Suite, marker: &str) -> Result<(), RunnerError> {
    let image = ImageRef::from_config(config);
    println!("Loading cached image {}", image.reference());
    cache::load(config, &image)?;

    let service = match suite.required_service() {
        Some(kind) => {
            println!("Starting {} for {}", kind, suite.target());
            Some(services::start(config, kind)?)
        }
        None => None,
    };

    let reference = image.reference();
    let mut args: Vec<String> = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--net=host".to_string(),
    ];
    if let Some(svc) = &service {
        args.push("-e".to_string());
        args.push(format!("TEST_DATABASE_URI={}", svc.database_uri));
    }
    args.push(reference);
    args.push("make".to_string());
    args.push(suite.target().to_string());
    args.push(format!("MARK={}", marker));

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let status = docker::run_streamed(&arg_refs)?;
    if !status.success() {
        return Err(RunnerError::SuiteFailed {
            target: suite.target(),
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

/// Gunicorn smoke test: derive a run image from the cached build image,
/// launch it detached, probe it once over HTTP after the settle delay, and
/// run the external smoke-test script against it.
///
/// The detached container is killed whether or not the probe and the smoke
/// test succeed; only the cache archive has failure-gated cleanup.
pub fn run_gunicorn_test(config: &Config) -> Result<(), RunnerError> {
    let image = ImageRef::from_config(config);
    println!("Loading cached image {}", image.reference());
    cache::load(config, &image)?;

    // The run Dockerfile builds FROM the :latest tag.
    docker::run(&[
        "tag",
        &image.reference(),
        &format!("{}:latest", image.name),
    ])?;

    let run_image = format!("{}-run", image.name);
    println!("Building run image {}", run_image);
    let status =
        docker::run_streamed(&["build", "-t", &run_image, "-f", &config.run_dockerfile, "."])?;
    if !status.success() {
        return Err(RunnerError::RunImageBuild {
            code: status.code().unwrap_or(-1),
        });
    }

    let container = docker::unique_name(&run_image);
    docker::run(&["run", "-d", "--net=host", "--name", &container, &run_image])?;

    let result = match probe::wait_ready(config.app_settle(), || {
        probe::http_ready(&config.health_endpoint)
    }) {
        Ok(()) => run_smoke_test(config),
        Err(e) => {
            dump_container_logs(&container);
            Err(e.into())
        }
    };

    if let Err(kill_err) = docker::run(&["kill", &container]) {
        eprintln!("Warning: failed to kill {}: {}", container, kill_err);
    }

    result
}

fn run_smoke_test(config: &Config) -> Result<(), RunnerError> {
    println!("Running smoke test {}", config.smoke_test);
    let status = Command::new(&config.smoke_test)
        .status()
        .map_err(|source| RunnerError::SmokeExec {
            script: config.smoke_test.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(RunnerError::SmokeFailed {
            script: config.smoke_test.clone(),
            code: status.code().unwrap_or(-1),
        })
    }
}

fn dump_container_logs(name: &str) {
    match docker::container_logs(name) {
        Ok(logs) => eprintln!("--- logs for {} ---\n{}", name, logs),
        Err(e) => eprintln!("Warning: could not fetch logs for {}: {}", name, e),
    }
}
