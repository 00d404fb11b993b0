//! Image cache management
//!
//! One compressed archive exists per CI job, at
//! `<cache_dir>/<image>-<short_sha>-<build_number>.tar.gz`. The builder writes
//! it once; every suite invocation loads from it. Removal is either explicit
//! (`clean`) or gated on a failed job result (`clean_on_failure`) — success
//! paths never clean.

use crate::config::Config;
use crate::docker::{self, DockerError};
use crate::image::ImageRef;
use crate::lock::{ArchiveLock, LockError, lock_path_for};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot read cache archive {path}: {source}")]
    Missing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write cache archive {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove cache archive {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Docker(#[from] DockerError),
}

/// Deterministic archive path for an image reference.
pub fn archive_path(config: &Config, image: &ImageRef) -> PathBuf {
    config.cache_dir.join(image.archive_file_name())
}

/// Serialize the image into its compressed archive, overwriting any existing
/// archive for the same reference.
pub fn save(config: &Config, image: &ImageRef) -> Result<PathBuf, CacheError> {
    std::fs::create_dir_all(&config.cache_dir).map_err(|source| CacheError::CreateDir {
        path: config.cache_dir.clone(),
        source,
    })?;

    let path = archive_path(config, image);
    let _lock = ArchiveLock::acquire(&lock_path_for(&path))?;

    let file = File::create(&path).map_err(|source| CacheError::Write {
        path: path.clone(),
        source,
    })?;
    let mut encoder = GzEncoder::new(file, Compression::default());

    if let Err(e) = docker::export_image(&image.reference(), &mut encoder) {
        // Don't leave a truncated archive behind.
        drop(encoder);
        let _ = std::fs::remove_file(&path);
        return Err(e.into());
    }

    encoder.finish().map_err(|source| CacheError::Write {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}

/// Deserialize the archive back into the local image store.
///
/// A missing or corrupt archive is a hard error; the job cannot proceed
/// without the image.
pub fn load(config: &Config, image: &ImageRef) -> Result<(), CacheError> {
    let path = archive_path(config, image);
    let _lock = ArchiveLock::acquire(&lock_path_for(&path))?;

    let file = File::open(&path).map_err(|source| CacheError::Missing {
        path: path.clone(),
        source,
    })?;

    docker::import_image(GzDecoder::new(file))?;
    Ok(())
}

/// Remove the archive if present. Absence is a silent no-op.
///
/// Returns whether anything was removed.
pub fn clean(config: &Config, image: &ImageRef) -> Result<bool, CacheError> {
    let path = archive_path(config, image);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CacheError::Remove { path, source }),
    }
}

/// Remove the archive only when the prior job step reported failure.
pub fn clean_on_failure(
    config: &Config,
    image: &ImageRef,
    job_result: i32,
) -> Result<bool, CacheError> {
    if job_result == 0 {
        return Ok(false);
    }
    clean(config, image)
}
