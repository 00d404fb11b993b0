use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Stub `docker` placed first on PATH for every scenario. It appends each
/// invocation to `$DOCKER_LOG`, emits deterministic image bytes for `save`,
/// and drains `load` stdin into `$DOCKER_SINK` so round trips can be checked.
const STUB_DOCKER: &str = r#"#!/bin/sh
printf 'docker %s\n' "$*" >> "$DOCKER_LOG"
case "$1" in
  save)
    printf 'image-data-for-%s' "$2"
    ;;
  load)
    cat > "$DOCKER_SINK"
    ;;
  logs)
    echo "gunicorn failed to start"
    ;;
esac
exit 0
"#;

#[derive(Clone)]
pub struct TestContext {
    pub bin_path: PathBuf,
    pub tmp_root: PathBuf,
}

pub struct TestEnv {
    pub root: PathBuf,
    pub home: PathBuf,
    pub xdg_config: PathBuf,
    pub stub_bin: PathBuf,
    pub docker_log: PathBuf,
    pub docker_sink: PathBuf,
}

pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl TestContext {
    pub fn new() -> Result<Self, String> {
        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_quayci"));

        let tmp_root = std::env::temp_dir().join("quayci-e2e");
        fs::create_dir_all(&tmp_root).map_err(|e| format!("Failed to create temp root: {}", e))?;

        Ok(Self { bin_path, tmp_root })
    }

    pub fn create_env(&self, name: &str) -> Result<TestEnv, String> {
        let dir = self.unique_temp_dir(name)?;
        let home = dir.join("home");
        let xdg_config = home.join(".config");
        let stub_bin = dir.join("bin");
        fs::create_dir_all(&xdg_config)
            .map_err(|e| format!("Failed to create config dir: {}", e))?;
        fs::create_dir_all(&stub_bin).map_err(|e| format!("Failed to create bin dir: {}", e))?;

        let stub_path = stub_bin.join("docker");
        fs::write(&stub_path, STUB_DOCKER)
            .map_err(|e| format!("Failed to write docker stub: {}", e))?;
        make_executable(&stub_path)?;

        Ok(TestEnv {
            docker_log: dir.join("docker.log"),
            docker_sink: dir.join("docker-load.bin"),
            root: dir,
            home,
            xdg_config,
            stub_bin,
        })
    }

    fn unique_temp_dir(&self, name: &str) -> Result<PathBuf, String> {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?
            .as_nanos();
        let dir = self
            .tmp_root
            .join(format!("{}-{}-{}", name, nanos, counter));
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create temp dir: {}", e))?;
        Ok(dir)
    }

    /// Run the binary with the stub docker first on PATH and the scenario's
    /// isolated HOME, plus any extra environment variables.
    pub fn run_quayci(
        &self,
        env: &TestEnv,
        args: &[&str],
        extra_env: &[(&str, &str)],
    ) -> Result<CommandOutput, String> {
        if std::env::var("QUAYCI_E2E_LOG").is_ok() {
            eprintln!("command: quayci {:?} (root: {})", args, env.root.display());
        }

        let path = format!(
            "{}:{}",
            env.stub_bin.display(),
            std::env::var("PATH").unwrap_or_default()
        );

        let mut command = Command::new(&self.bin_path);
        command
            .args(args)
            .current_dir(&env.root)
            .env("HOME", &env.home)
            .env("XDG_CONFIG_HOME", &env.xdg_config)
            .env("PATH", path)
            .env("DOCKER_LOG", &env.docker_log)
            .env("DOCKER_SINK", &env.docker_sink)
            .env_remove("TRAVIS_COMMIT")
            .env_remove("TRAVIS_BUILD_NUMBER")
            .env_remove("TRAVIS_TEST_RESULT");
        for (key, value) in extra_env {
            command.env(key, value);
        }

        let output = command
            .output()
            .map_err(|e| format!("Failed to run command: {}", e))?;
        Ok(CommandOutput::from_output(output))
    }
}

impl TestEnv {
    /// Everything the stub docker recorded so far, one invocation per line.
    pub fn docker_log(&self) -> String {
        fs::read_to_string(&self.docker_log).unwrap_or_default()
    }

    /// Expected archive path for the fixed CI identity used by scenarios.
    pub fn archive_path(&self) -> PathBuf {
        self.home.join("docker").join("quay-ci-abcdef1-42.tar.gz")
    }

    pub fn write_config(&self, json: &str) -> Result<(), String> {
        write_file(&self.xdg_config.join("quayci").join("config.json"), json)
    }
}

impl CommandOutput {
    pub fn from_output(output: Output) -> Self {
        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Self {
            status,
            stdout,
            stderr,
        }
    }

    pub fn assert_success(&self) -> Result<(), String> {
        if self.status == 0 {
            Ok(())
        } else {
            Err(format!(
                "Expected success, got exit {}: {}",
                self.status, self.stderr
            ))
        }
    }

    pub fn assert_status(&self, expected: i32) -> Result<(), String> {
        if self.status == expected {
            Ok(())
        } else {
            Err(format!(
                "Expected exit {}, got {}: {}",
                expected, self.status, self.stderr
            ))
        }
    }

    pub fn assert_stdout_contains(&self, needle: &str) -> Result<(), String> {
        if self.stdout.contains(needle) {
            Ok(())
        } else {
            Err(format!(
                "Expected stdout to contain '{}'.\nstdout: {}",
                needle, self.stdout
            ))
        }
    }

    pub fn assert_stdout_not_contains(&self, needle: &str) -> Result<(), String> {
        if !self.stdout.contains(needle) {
            Ok(())
        } else {
            Err(format!(
                "Expected stdout to not contain '{}'.\nstdout: {}",
                needle, self.stdout
            ))
        }
    }

    pub fn assert_stderr_contains(&self, needle: &str) -> Result<(), String> {
        if self.stderr.contains(needle) {
            Ok(())
        } else {
            Err(format!(
                "Expected stderr to contain '{}'.\nstderr: {}",
                needle, self.stderr
            ))
        }
    }
}

pub fn write_file(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create parent dirs: {}", e))?;
    }
    fs::write(path, content).map_err(|e| format!("Failed to write file: {}", e))
}

pub fn read_file(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))
}

fn make_executable(path: &Path) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)
        .map_err(|e| format!("Failed to stat {}: {}", path.display(), e))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .map_err(|e| format!("Failed to chmod {}: {}", path.display(), e))
}
