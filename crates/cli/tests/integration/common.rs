//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name))
    .unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment: a temp directory holding the config file.
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join(".docker-make.yml");
    std::fs::write(&config_path, fixture_content(name)).unwrap();
    Self { temp, config_path }
  }

  /// Get a pre-configured Command for the dmake binary, running in the
  /// temp directory with the fixture config selected.
  pub fn dmake_cmd(&self) -> Command {
    let mut cmd = self.raw_cmd();
    cmd.arg("-f").arg(&self.config_path);
    cmd
  }

  /// Like `dmake_cmd`, but without selecting a config file.
  pub fn raw_cmd(&self) -> Command {
    let mut cmd = Command::cargo_bin("dmake").unwrap();
    cmd.current_dir(self.temp.path());
    cmd
  }
}
