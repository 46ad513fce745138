//! Per-build lifecycle: build, label, extract, tag, push.
//!
//! Each build runs through its stages in order and records progress on its
//! [`BuildRecord`]. Tagging and pushing are separate operations invoked by
//! the runner after a successful build, so a `--no-push` run can stop after
//! tagging without special-casing the stages themselves.

mod rewrite;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cleanup::ArtifactRegistry;
use crate::engine::{EngineError, ImageEngine};
use crate::manifest::{BuildDef, ExtractRule};
use crate::release::ReleaseContext;
use crate::template::{self, TemplateError};

pub use rewrite::{DockerfileRewrite, IgnoreFile};

/// Lifecycle stage of one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
  Pending,
  Building,
  Labeling,
  Labeled,
  Extracting,
  Extracted,
  Tagged,
  Pushed,
}

impl fmt::Display for Progress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Progress::Pending => "pending",
      Progress::Building => "building",
      Progress::Labeling => "labeling",
      Progress::Labeled => "labeled",
      Progress::Extracting => "extracting",
      Progress::Extracted => "extracted",
      Progress::Tagged => "tagged",
      Progress::Pushed => "pushed",
    };
    write!(f, "{name}")
  }
}

/// Mutable per-build state, created when the run starts.
#[derive(Debug, Clone)]
pub struct BuildRecord {
  pub name: String,
  pub progress: Progress,
  /// Image id straight out of the build stage.
  pub unlabeled_image: Option<String>,
  /// Image id after the label stage; equals the unlabeled id without labels.
  pub final_image: Option<String>,
  /// Rendered `key=value` labels applied to the final image.
  pub labels: Vec<String>,
  /// `repo:tag` names applied during the tag stage.
  pub tags: Vec<String>,
  /// `repo:tag` names actually pushed.
  pub pushed: Vec<String>,
}

impl BuildRecord {
  fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      progress: Progress::Pending,
      unlabeled_image: None,
      final_image: None,
      labels: Vec::new(),
      tags: Vec::new(),
      pushed: Vec::new(),
    }
  }
}

/// Errors from one build's lifecycle stages.
#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error("tag template '{template}' cannot render: {source}")]
  TagTemplate {
    template: String,
    #[source]
    source: TemplateError,
  },

  #[error("push rejected by daemon: {0}")]
  PushRejected(String),

  #[error("base image build '{name}' has not produced an image")]
  MissingBaseImage { name: String },

  #[error("build has not produced an image yet")]
  NotBuilt,

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Drives one build definition through its lifecycle.
pub struct BuildJob<'a> {
  def: &'a BuildDef,
  ctx: &'a ReleaseContext,
  record: BuildRecord,
}

impl<'a> BuildJob<'a> {
  pub fn new(name: &str, def: &'a BuildDef, ctx: &'a ReleaseContext) -> Self {
    Self {
      def,
      ctx,
      record: BuildRecord::new(name),
    }
  }

  pub fn record(&self) -> &BuildRecord {
    &self.record
  }

  pub fn into_record(self) -> BuildRecord {
    self.record
  }

  /// Build the image, apply labels, and run extractions.
  ///
  /// `images` maps already-built names to their final image ids; the entry
  /// for `rewrite_from` must be present when a rewrite is configured.
  pub async fn build<E: ImageEngine>(
    &mut self,
    engine: &E,
    images: &BTreeMap<String, String>,
    artifacts: &mut ArtifactRegistry,
  ) -> Result<(), LifecycleError> {
    self.record.progress = Progress::Building;
    info!(build = %self.record.name, stage = %self.record.progress, "building image");

    let unlabeled = {
      let _ignore = IgnoreFile::ensure(&self.def.context, &self.def.dockerignore)?;
      let _rewrite = match &self.def.rewrite_from {
        Some(source) => {
          let image = images.get(source).ok_or_else(|| LifecycleError::MissingBaseImage {
            name: source.clone(),
          })?;
          let dockerfile = self.def.context.join(&self.def.dockerfile);
          Some(DockerfileRewrite::apply(&dockerfile, image)?)
        }
        None => None,
      };
      engine.build(&self.def.context, &self.def.dockerfile).await?
    };
    info!(build = %self.record.name, image = %unlabeled, "image built");
    self.record.unlabeled_image = Some(unlabeled.clone());

    let final_image = self.label(engine, unlabeled).await?;
    self.record.final_image = Some(final_image);
    self.record.progress = Progress::Labeled;

    if !self.def.extract.is_empty() {
      self.record.progress = Progress::Extracting;
      info!(build = %self.record.name, stage = %self.record.progress, "extracting files");
      for rule in &self.def.extract {
        self.extract_one(engine, rule, artifacts).await?;
      }
      self.record.progress = Progress::Extracted;
    }

    Ok(())
  }

  /// Attach rendered labels via an ephemeral single-instruction build.
  async fn label<E: ImageEngine>(&mut self, engine: &E, unlabeled: String) -> Result<String, LifecycleError> {
    if self.def.labels.is_empty() {
      return Ok(unlabeled);
    }
    self.record.progress = Progress::Labeling;

    let args = self.ctx.label_args();
    let mut rendered = Vec::new();
    for (key, template) in self.def.label_pairs() {
      match template::render(template, &args) {
        Ok(value) => rendered.push((key.to_string(), value)),
        Err(err) => {
          warn!(build = %self.record.name, label = key, %err, "skipping unresolvable label");
        }
      }
    }
    if rendered.is_empty() {
      return Ok(unlabeled);
    }

    let assignments = rendered
      .iter()
      .map(|(key, value)| format!("{key}=\"{}\"", escape_label_value(value)))
      .collect::<Vec<_>>()
      .join(" ");
    let manifest = format!("FROM {unlabeled}\nLABEL {assignments}\n");
    let labeled = engine.build_inline(&manifest).await?;

    info!(
      build = %self.record.name,
      image = %labeled,
      labels = rendered.len(),
      "labels attached"
    );
    self.record.labels = rendered.into_iter().map(|(key, value)| format!("{key}={value}")).collect();
    Ok(labeled)
  }

  async fn extract_one<E: ImageEngine>(
    &self,
    engine: &E,
    rule: &ExtractRule,
    artifacts: &mut ArtifactRegistry,
  ) -> Result<(), LifecycleError> {
    let image = self.record.final_image.as_deref().ok_or(LifecycleError::NotBuilt)?;
    let dst = resolve_destination(&self.def.context, &rule.dst);
    info!(
      build = %self.record.name,
      src = %rule.src,
      dst = %dst.display(),
      "extracting archive"
    );

    let container = engine.create_container(image).await?;
    let result = async {
      artifacts.register(&dst);
      if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
      }
      let mut stream = engine.export_path(&container, &rule.src).await?;
      let mut file = fs::File::create(&dst)?;
      while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?)?;
      }
      Ok::<(), LifecycleError>(())
    }
    .await;

    if let Err(err) = engine.remove_container(&container).await {
      warn!(
        build = %self.record.name,
        container = %container,
        %err,
        "failed to remove ephemeral container"
      );
    }
    result
  }

  /// Apply every push rule's rendered tag to the final image.
  ///
  /// A tag template that cannot render is skipped; it is only worth a
  /// warning when the rule's policy would actually push.
  pub async fn tag<E: ImageEngine>(&mut self, engine: &E) -> Result<(), LifecycleError> {
    let rules = self.def.push_rules();
    if rules.is_empty() {
      return Ok(());
    }
    let image = self.record.final_image.clone().ok_or(LifecycleError::NotBuilt)?;
    let args = self.ctx.tag_args();

    for rule in &rules {
      let rendered = match template::render(&rule.tag_template, args) {
        Ok(rendered) => rendered,
        Err(err) => {
          if rule.mode.should_push(self.ctx) {
            warn!(
              build = %self.record.name,
              template = %rule.tag_template,
              %err,
              "tag for a required push cannot render; skipping tag"
            );
          } else {
            debug!(build = %self.record.name, template = %rule.tag_template, %err, "skipping tag");
          }
          continue;
        }
      };
      let tag = if is_valid_tag(&rendered) {
        rendered
      } else {
        let fixed = sanitize_tag(&rendered);
        debug!(build = %self.record.name, from = %rendered, to = %fixed, "sanitized tag name");
        fixed
      };
      engine.tag(&image, &rule.repo, &tag).await?;
      info!(build = %self.record.name, repo = %rule.repo, tag = %tag, "image tagged");
      self.record.tags.push(format!("{}:{}", rule.repo, tag));
    }

    self.record.progress = Progress::Tagged;
    Ok(())
  }

  /// Push every rule whose policy evaluates true for this run.
  ///
  /// Here an unrenderable tag template is fatal: the policy has already
  /// decided a push must happen, so the tag has to be computable.
  pub async fn push<E: ImageEngine>(&mut self, engine: &E) -> Result<(), LifecycleError> {
    let args = self.ctx.tag_args();
    for rule in self.def.push_rules() {
      if !rule.mode.should_push(self.ctx) {
        debug!(build = %self.record.name, mode = %rule.mode, repo = %rule.repo, "push suppressed by policy");
        continue;
      }
      let rendered = template::render(&rule.tag_template, args).map_err(|source| {
        LifecycleError::TagTemplate {
          template: rule.tag_template.clone(),
          source,
        }
      })?;
      let tag = sanitize_tag(&rendered);
      info!(build = %self.record.name, repo = %rule.repo, tag = %tag, "pushing image");

      let mut stream = engine.push(&rule.repo, &tag).await?;
      while let Some(event) = stream.next().await {
        let event = event?;
        if let Some(detail) = event.error_detail {
          return Err(LifecycleError::PushRejected(detail));
        }
        if let Some(message) = event.message {
          let message = message.trim();
          if !message.is_empty() {
            debug!(build = %self.record.name, "{}", message);
          }
        }
      }
      self.record.pushed.push(format!("{}:{}", rule.repo, tag));
    }

    if !self.record.pushed.is_empty() {
      self.record.progress = Progress::Pushed;
    }
    Ok(())
  }
}

fn resolve_destination(context: &Path, dst: &str) -> PathBuf {
  let path = Path::new(dst);
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    context.join(path)
  }
}

fn escape_label_value(value: &str) -> String {
  value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Whether a name is usable as an image tag.
pub fn is_valid_tag(name: &str) -> bool {
  let mut chars = name.chars();
  let Some(first) = chars.next() else {
    return false;
  };
  if !(first.is_ascii_alphanumeric() || first == '_') {
    return false;
  }
  name.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Replace invalid tag characters with `_` and cap the length.
pub fn sanitize_tag(name: &str) -> String {
  name
    .chars()
    .take(128)
    .enumerate()
    .map(|(i, c)| {
      let valid = if i == 0 {
        c.is_ascii_alphanumeric() || c == '_'
      } else {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
      };
      if valid { c } else { '_' }
    })
    .collect()
}
