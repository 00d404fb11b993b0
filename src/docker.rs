//! Container runtime invocations
//!
//! Thin wrappers around the `docker` binary. Every operation returns an
//! explicit result; a non-zero exit from the runtime surfaces as
//! [`DockerError::CommandFailed`] carrying the tool's stderr.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

static NAME_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Failed to execute docker: {source}")]
    Exec { source: std::io::Error },

    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("{command} pipe failed: {source}")]
    Pipe {
        command: String,
        source: std::io::Error,
    },
}

/// Run a docker command with captured output, failing on non-zero exit.
pub fn run(args: &[&str]) -> Result<(), DockerError> {
    let output = Command::new("docker")
        .args(args)
        .output()
        .map_err(|source| DockerError::Exec { source })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(DockerError::CommandFailed {
            command: display_command(args),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Run a docker command with inherited stdio, returning its exit status.
///
/// Used for long-running steps (image builds, test containers) whose output
/// belongs on the job log as it happens.
pub fn run_streamed(args: &[&str]) -> Result<ExitStatus, DockerError> {
    Command::new("docker")
        .args(args)
        .status()
        .map_err(|source| DockerError::Exec { source })
}

/// Stream `docker save <reference>` into `dest`.
pub fn export_image(reference: &str, mut dest: impl Write) -> Result<(), DockerError> {
    let command = format!("docker save {}", reference);
    let mut child = Command::new("docker")
        .args(["save", reference])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| DockerError::Exec { source })?;

    if let Some(mut stdout) = child.stdout.take() {
        if let Err(source) = std::io::copy(&mut stdout, &mut dest) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DockerError::Pipe { command, source });
        }
    }

    finish(child, command)
}

/// Stream `src` into `docker load`.
pub fn import_image(mut src: impl Read) -> Result<(), DockerError> {
    let command = "docker load".to_string();
    let mut child = Command::new("docker")
        .arg("load")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| DockerError::Exec { source })?;

    if let Some(mut stdin) = child.stdin.take() {
        // Dropping stdin closes the pipe so the runtime sees EOF.
        if let Err(source) = std::io::copy(&mut src, &mut stdin) {
            drop(stdin);
            // A broken pipe here usually means the runtime itself failed;
            // prefer its stderr over the copy error when it did.
            let output = child
                .wait_with_output()
                .map_err(|source| DockerError::Exec { source })?;
            if !output.status.success() {
                return Err(DockerError::CommandFailed {
                    command,
                    message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            return Err(DockerError::Pipe { command, source });
        }
    }

    finish(child, command)
}

/// Fetch a container's logs, best-effort.
///
/// Both output streams are returned together; containers log startup failures
/// to either one.
pub fn container_logs(name: &str) -> Result<String, DockerError> {
    let output = Command::new("docker")
        .args(["logs", name])
        .output()
        .map_err(|source| DockerError::Exec { source })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Generate a container name unique to this invocation.
///
/// Fixed names collide when the CI system retries a job on the same host, so
/// every container gets a fresh name and is addressed through it.
pub fn unique_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let counter = NAME_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}-{}", prefix, std::process::id(), nanos, counter)
}

fn finish(child: Child, command: String) -> Result<(), DockerError> {
    let output = child
        .wait_with_output()
        .map_err(|source| DockerError::Exec { source })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(DockerError::CommandFailed {
            command,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn display_command(args: &[&str]) -> String {
    format!("docker {}", args.join(" "))
}
