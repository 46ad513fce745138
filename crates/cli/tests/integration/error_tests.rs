//! Exit codes and error reporting.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn missing_config_file_exits_nonzero() {
  let env = TestEnv::from_fixture("chain.yml");

  env
    .raw_cmd()
    .arg("-f")
    .arg("does-not-exist.yml")
    .arg("--dry-run")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("cannot read config file"));
}

#[test]
fn malformed_yaml_exits_nonzero() {
  let env = TestEnv::from_fixture("malformed.yml");

  env
    .dmake_cmd()
    .arg("--dry-run")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("cannot parse config file"));
}

#[test]
fn unknown_dependency_fails_validation() {
  let env = TestEnv::from_fixture("unknown_dep.yml");

  env
    .dmake_cmd()
    .arg("--dry-run")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("undefined build 'ghost'"));
}

#[test]
fn dependency_cycle_exits_nonzero() {
  let env = TestEnv::from_fixture("cycle.yml");

  env
    .dmake_cmd()
    .arg("--dry-run")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("dependency cycle among builds"));
}

#[test]
fn self_dependency_is_reported_distinctly() {
  let env = TestEnv::from_fixture("self_dep.yml");

  env
    .dmake_cmd()
    .arg("--dry-run")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("'loner' depends on itself"));
}

#[test]
fn undefined_target_carries_the_offending_name() {
  let env = TestEnv::from_fixture("chain.yml");

  env
    .dmake_cmd()
    .arg("--dry-run")
    .arg("ghost")
    .assert()
    .code(1)
    .stderr(predicate::str::contains("build 'ghost' is not defined"));
}
