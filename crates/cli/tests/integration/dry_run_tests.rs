//! Dry-run behavior.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn dry_run_prints_one_command_per_build() {
  let env = TestEnv::from_fixture("chain.yml");

  env
    .dmake_cmd()
    .arg("--dry-run")
    .assert()
    .success()
    .stdout(predicate::str::contains("docker build -f Dockerfile.base"))
    .stdout(predicate::str::contains("docker build -f Dockerfile.api"))
    .stdout(predicate::str::contains("docker build -f Dockerfile.web"))
    .stdout(predicate::str::contains("dry run complete: 3 build(s)"));
}

#[test]
fn dry_run_orders_dependencies_first() {
  let env = TestEnv::from_fixture("chain.yml");

  let output = env.dmake_cmd().arg("--dry-run").output().unwrap();
  assert!(output.status.success());
  let stdout = String::from_utf8_lossy(&output.stdout);

  let base = stdout.find("Dockerfile.base").unwrap();
  let api = stdout.find("Dockerfile.api").unwrap();
  let web = stdout.find("Dockerfile.web").unwrap();
  assert!(base < api);
  assert!(api < web);
}

#[test]
fn dry_run_narrows_to_requested_builds_and_their_dependencies() {
  let env = TestEnv::from_fixture("chain.yml");

  env
    .dmake_cmd()
    .arg("--dry-run")
    .arg("api")
    .assert()
    .success()
    .stdout(predicate::str::contains("Dockerfile.base"))
    .stdout(predicate::str::contains("Dockerfile.api"))
    .stdout(predicate::str::contains("Dockerfile.web").not())
    .stdout(predicate::str::contains("dry run complete: 2 build(s)"));
}

#[test]
fn dry_run_never_touches_the_daemon() {
  let env = TestEnv::from_fixture("chain.yml");

  // Point the daemon somewhere that cannot exist; a dry run must not care.
  env
    .dmake_cmd()
    .env("DOCKER_HOST", "unix:///nonexistent/docker.sock")
    .arg("--dry-run")
    .assert()
    .success();
}
