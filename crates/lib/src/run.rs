//! Orchestration of a full run.
//!
//! Validates the manifest, resolves the build order, narrows it to the
//! requested want-set, then drives every selected build sequentially:
//! lifecycle build first, then tagging, then (unless suppressed) pushing.
//! The first fatal error aborts the remainder of the run; images already
//! built or pushed stay as they are.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::cleanup::ArtifactRegistry;
use crate::engine::ImageEngine;
use crate::error::RunError;
use crate::graph::{self, UndefinedBuild};
use crate::lifecycle::{BuildJob, BuildRecord};
use crate::manifest::BuildManifest;
use crate::release::ReleaseContext;
use crate::template;

/// Knobs from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
  /// Skip the push stage entirely.
  pub no_push: bool,
}

/// What one run produced, in build order.
#[derive(Debug, Default)]
pub struct RunSummary {
  pub records: Vec<BuildRecord>,
}

impl RunSummary {
  pub fn images_built(&self) -> usize {
    self.records.iter().filter(|r| r.final_image.is_some()).count()
  }

  pub fn tags_applied(&self) -> usize {
    self.records.iter().map(|r| r.tags.len()).sum()
  }

  pub fn images_pushed(&self) -> usize {
    self.records.iter().map(|r| r.pushed.len()).sum()
  }
}

/// Execute every selected build in dependency order.
pub async fn execute<E: ImageEngine>(
  manifest: &BuildManifest,
  ctx: &ReleaseContext,
  engine: &E,
  targets: &[String],
  options: &RunOptions,
  artifacts: &mut ArtifactRegistry,
) -> Result<RunSummary, RunError> {
  manifest.validate()?;
  let order = graph::resolve_order(manifest)?;
  let selected = graph::expand_want_set(manifest, targets)?;
  info!(total = order.len(), selected = selected.len(), "resolved build order");

  let mut images: BTreeMap<String, String> = BTreeMap::new();
  let mut summary = RunSummary::default();

  for name in order.iter().filter(|name| selected.contains(name.as_str())) {
    let def = manifest
      .builds
      .get(name)
      .ok_or_else(|| UndefinedBuild(name.clone()))?;

    let mut job = BuildJob::new(name, def, ctx);
    job
      .build(engine, &images, artifacts)
      .await
      .map_err(|source| RunError::BuildFailed {
        name: name.clone(),
        source,
      })?;
    job.tag(engine).await.map_err(|source| RunError::BuildFailed {
      name: name.clone(),
      source,
    })?;
    if !options.no_push {
      job.push(engine).await.map_err(|source| RunError::PushFailed {
        name: name.clone(),
        source,
      })?;
    }

    let record = job.into_record();
    if let Some(image) = &record.final_image {
      images.insert(name.clone(), image.clone());
    }
    summary.records.push(record);
  }

  Ok(summary)
}

/// Print-equivalent of a run: one `docker build` line per selected build,
/// in order, without contacting the engine.
pub fn dry_run(
  manifest: &BuildManifest,
  ctx: &ReleaseContext,
  targets: &[String],
) -> Result<Vec<String>, RunError> {
  manifest.validate()?;
  let order = graph::resolve_order(manifest)?;
  let selected = graph::expand_want_set(manifest, targets)?;

  let label_args = ctx.label_args();
  let mut lines = Vec::new();
  for name in order.iter().filter(|name| selected.contains(name.as_str())) {
    let def = manifest
      .builds
      .get(name)
      .ok_or_else(|| UndefinedBuild(name.clone()))?;

    let mut command = format!("docker build -f {}", def.dockerfile);
    for (key, template) in def.label_pairs() {
      match template::render(template, &label_args) {
        Ok(value) => {
          command.push_str(&format!(" --label {key}={value}"));
        }
        Err(err) => {
          warn!(build = %name, label = key, %err, "skipping unresolvable label");
        }
      }
    }
    command.push(' ');
    command.push_str(&def.context.display().to_string());
    lines.push(command);
  }

  Ok(lines)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;

  use crate::graph::OrderError;
  use crate::manifest::ValidateError;
  use crate::testutil::{EngineCall, MockEngine, def_with, manifest_of, release_ctx};

  fn two_build_manifest() -> (tempfile::TempDir, tempfile::TempDir, BuildManifest) {
    let base_dir = tempfile::tempdir().unwrap();
    let app_dir = tempfile::tempdir().unwrap();
    fs::write(base_dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
    fs::write(app_dir.path().join("Dockerfile"), "FROM placeholder\nRUN true\n").unwrap();

    let base = def_with(&[], "Dockerfile").in_context(base_dir.path());
    let mut app = def_with(&["base"], "Dockerfile").in_context(app_dir.path());
    app.rewrite_from = Some("base".to_string());

    let manifest = BuildManifest {
      builds: [("base".to_string(), base), ("app".to_string(), app)]
        .into_iter()
        .collect(),
      tag_names: Vec::new(),
    };
    (base_dir, app_dir, manifest)
  }

  #[tokio::test]
  async fn requesting_a_dependent_still_builds_the_dependency_first() {
    let (_base_dir, _app_dir, manifest) = two_build_manifest();
    let ctx = release_ctx(&[]);
    let engine = MockEngine::default();
    let mut artifacts = ArtifactRegistry::new();

    let summary = execute(
      &manifest,
      &ctx,
      &engine,
      &["app".to_string()],
      &RunOptions::default(),
      &mut artifacts,
    )
    .await
    .unwrap();

    assert_eq!(summary.images_built(), 2);
    let names: Vec<&str> = summary.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["base", "app"]);

    // The dependent's build saw the dependency's final image id.
    let base_image = summary.records[0].final_image.clone().unwrap();
    let builds: Vec<_> = engine
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        EngineCall::Build { manifest_content, .. } => Some(manifest_content),
        _ => None,
      })
      .collect();
    assert_eq!(builds.len(), 2);
    assert!(builds[1].starts_with(&format!("FROM {base_image}\n")));
  }

  #[tokio::test]
  async fn validation_failure_aborts_before_any_engine_call() {
    let manifest = manifest_of(&[("app", &["ghost"])]);
    let ctx = release_ctx(&[]);
    let engine = MockEngine::default();
    let mut artifacts = ArtifactRegistry::new();

    let err = execute(&manifest, &ctx, &engine, &[], &RunOptions::default(), &mut artifacts)
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      RunError::Validate(ValidateError::UnknownDependency { .. })
    ));
    assert!(engine.calls().is_empty());
  }

  #[tokio::test]
  async fn undefined_target_aborts_with_its_name() {
    let manifest = manifest_of(&[("base", &[])]);
    let ctx = release_ctx(&[]);
    let engine = MockEngine::default();
    let mut artifacts = ArtifactRegistry::new();

    let err = execute(
      &manifest,
      &ctx,
      &engine,
      &["ghost".to_string()],
      &RunOptions::default(),
      &mut artifacts,
    )
    .await
    .unwrap_err();
    match err {
      RunError::Undefined(UndefinedBuild(name)) => assert_eq!(name, "ghost"),
      other => panic!("expected undefined build, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn cycle_aborts_before_any_engine_call() {
    let manifest = manifest_of(&[("a", &["b"]), ("b", &["a"])]);
    let ctx = release_ctx(&[]);
    let engine = MockEngine::default();
    let mut artifacts = ArtifactRegistry::new();

    let err = execute(&manifest, &ctx, &engine, &[], &RunOptions::default(), &mut artifacts)
      .await
      .unwrap_err();
    assert!(matches!(err, RunError::Dependency(OrderError::Cycle(_))));
    assert!(engine.calls().is_empty());
  }

  #[tokio::test]
  async fn a_build_failure_stops_the_run() {
    let (base_dir, _app_dir, manifest) = two_build_manifest();
    let ctx = release_ctx(&[]);
    let mut engine = MockEngine::default();
    engine.fail_build_in = Some(base_dir.path().to_path_buf());
    let mut artifacts = ArtifactRegistry::new();

    let err = execute(&manifest, &ctx, &engine, &[], &RunOptions::default(), &mut artifacts)
      .await
      .unwrap_err();
    match err {
      RunError::BuildFailed { name, .. } => assert_eq!(name, "base"),
      other => panic!("expected build failure, got {other:?}"),
    }
    // The dependent build was never attempted.
    assert_eq!(
      engine.calls().iter().filter(|c| matches!(c, EngineCall::Build { .. })).count(),
      1
    );
  }

  #[tokio::test]
  async fn no_push_skips_the_push_stage_but_still_tags() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
    let mut def = def_with(&[], "Dockerfile").in_context(dir.path());
    def.pushes = vec!["always=registry/app:{date}".to_string()];
    let manifest = BuildManifest {
      builds: [("app".to_string(), def)].into_iter().collect(),
      tag_names: Vec::new(),
    };
    let ctx = release_ctx(&[("date", "20160721")]);
    let engine = MockEngine::default();
    let mut artifacts = ArtifactRegistry::new();

    let summary = execute(
      &manifest,
      &ctx,
      &engine,
      &[],
      &RunOptions { no_push: true },
      &mut artifacts,
    )
    .await
    .unwrap();

    assert_eq!(summary.tags_applied(), 1);
    assert_eq!(summary.images_pushed(), 0);
    assert!(!engine.calls().iter().any(|c| matches!(c, EngineCall::Push { .. })));
  }

  #[test]
  fn dry_run_prints_build_lines_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let base = def_with(&[], "Dockerfile.base").in_context(dir.path());
    let mut app = def_with(&["base"], "Dockerfile").in_context(dir.path());
    app.labels = vec!["com.example.commit={scommitid}".to_string()];
    let manifest = BuildManifest {
      builds: [("base".to_string(), base), ("app".to_string(), app)]
        .into_iter()
        .collect(),
      tag_names: Vec::new(),
    };
    let ctx = release_ctx(&[("scommitid", "5690336")]);

    let lines = dry_run(&manifest, &ctx, &[]).unwrap();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("docker build -f Dockerfile.base"));
    assert!(lines[1].contains("--label com.example.commit=5690336"));
  }

  #[test]
  fn date_label_is_skipped_in_dry_run() {
    // Labels never see the date field, so this one cannot render and is
    // skipped rather than failing the dry run.
    let dir = tempfile::tempdir().unwrap();
    let mut app = def_with(&[], "Dockerfile").in_context(dir.path());
    app.labels = vec!["com.example.stamp={date}".to_string()];
    let manifest = BuildManifest {
      builds: [("app".to_string(), app)].into_iter().collect(),
      tag_names: Vec::new(),
    };
    let ctx = release_ctx(&[("date", "20160721")]);

    let lines = dry_run(&manifest, &ctx, &[]).unwrap();
    assert_eq!(lines.len(), 1);
    assert!(!lines[0].contains("--label"));
  }
}
