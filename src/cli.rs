use clap::{Parser, Subcommand};

/// Shard marker used when a suite command is invoked without one.
///
/// Sharding is driven externally: the CI system invokes this binary once per
/// shard with a different marker. A plain local run executes the whole suite.
pub const DEFAULT_SHARD_MARKER: &str = "shard_1_of_1";

/// CI test-suite dispatcher for the Quay container image
#[derive(Parser, Debug)]
#[command(name = "quayci")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the container image and cache it as a compressed archive
    Build,
    /// Run the unit test suite against the cached image
    Unit {
        /// Shard marker selecting which portion of the suite to run
        marker: Option<String>,
    },
    /// Run the registry integration test suite
    Registry {
        /// Shard marker selecting which portion of the suite to run
        marker: Option<String>,
    },
    /// Run the legacy registry test suite
    #[command(alias = "registry_old")]
    RegistryOld {
        /// Shard marker selecting which portion of the suite to run
        marker: Option<String>,
    },
    /// Run the certificate handling tests
    #[command(alias = "certs_test")]
    CertsTest {
        /// Shard marker selecting which portion of the suite to run
        marker: Option<String>,
    },
    /// Build the derived run image and smoke-test it under gunicorn
    #[command(alias = "gunicorn_test")]
    GunicornTest,
    /// Run the full database-backed suite against MySQL
    Mysql {
        /// Shard marker selecting which portion of the suite to run
        marker: Option<String>,
    },
    /// Run the full database-backed suite against PostgreSQL
    Postgres {
        /// Shard marker selecting which portion of the suite to run
        marker: Option<String>,
    },
    /// Remove the cache archive, but only if the recorded job result is non-zero
    #[command(alias = "fail_clean")]
    FailClean,
    /// Remove the cache archive unconditionally
    Clean,
}

/// Resolve an optional positional marker to the effective shard marker.
pub fn shard_marker(marker: Option<String>) -> String {
    marker.unwrap_or_else(|| DEFAULT_SHARD_MARKER.to_string())
}
