//! Image identity and the build step

use crate::cache::{self, CacheError};
use crate::config::Config;
use crate::docker::{self, DockerError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Image build exited with status {code}")]
    BuildFailed { code: i32 },
}

/// Identity of the image built for one CI job.
///
/// The tag combines the short commit SHA with the build number, so reruns of
/// the same commit produce distinct artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    pub fn from_config(config: &Config) -> Self {
        ImageRef {
            name: config.image.clone(),
            tag: format!("{}-{}", short_sha(&config.commit), config.build_number),
        }
    }

    /// Full `name:tag` reference.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// File name of the cache archive for this reference.
    pub fn archive_file_name(&self) -> String {
        format!("{}-{}.tar.gz", self.name, self.tag)
    }
}

/// Build the image from the current build context and persist it to the
/// cache. Any failure aborts the job.
pub fn build(config: &Config) -> Result<PathBuf, BuildError> {
    let image = ImageRef::from_config(config);
    let reference = image.reference();

    let status = docker::run_streamed(&["build", "-t", &reference, "."])?;
    if !status.success() {
        return Err(BuildError::BuildFailed {
            code: status.code().unwrap_or(-1),
        });
    }

    Ok(cache::save(config, &image)?)
}

fn short_sha(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}
