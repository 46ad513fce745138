//! Typed build definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::policy::PushMode;

/// The full set of build definitions loaded from one configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildManifest {
  /// Build name to definition.
  pub builds: BTreeMap<String, BuildDef>,

  /// Extra template-field generators (`cmd` or `datetime`).
  #[serde(rename = "tag-names", default)]
  pub tag_names: Vec<GeneratorDecl>,
}

/// Declarative description of one image build.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildDef {
  /// Build context directory.
  pub context: PathBuf,

  /// Dockerfile path, relative to the context.
  pub dockerfile: String,

  /// Patterns for a generated context ignore file.
  #[serde(default)]
  pub dockerignore: Vec<String>,

  /// Names of builds whose images must exist before this one runs.
  #[serde(default)]
  pub depends_on: Vec<String>,

  /// Push rules in `mode=repo:tag_template` form.
  #[serde(default)]
  pub pushes: Vec<String>,

  /// Labels in `key=value_template` form.
  #[serde(default)]
  pub labels: Vec<String>,

  /// Paths to extract out of the built image.
  #[serde(default)]
  pub extract: Vec<ExtractRule>,

  /// Build whose final image replaces this dockerfile's first FROM line.
  #[serde(default)]
  pub rewrite_from: Option<String>,
}

impl BuildDef {
  /// Parsed push rules. Malformed entries are skipped here; `validate`
  /// surfaces them as errors before any build starts.
  pub fn push_rules(&self) -> Vec<PushRule> {
    self
      .pushes
      .iter()
      .filter_map(|raw| match PushRule::parse(raw) {
        Ok(rule) => Some(rule),
        Err(reason) => {
          debug!(rule = %raw, reason, "skipping malformed push rule");
          None
        }
      })
      .collect()
  }

  /// Label key/template pairs. Entries without a `=` are skipped here;
  /// `validate` surfaces them as errors before any build starts.
  pub fn label_pairs(&self) -> Vec<(&str, &str)> {
    self
      .labels
      .iter()
      .filter_map(|raw| raw.split_once('=').filter(|(key, _)| !key.is_empty()))
      .collect()
  }
}

/// One push rule: when to publish, where, and how to name the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRule {
  pub mode: PushMode,
  pub repo: String,
  pub tag_template: String,
}

impl PushRule {
  /// Parse `mode=repo:tag_template`.
  pub fn parse(raw: &str) -> Result<Self, &'static str> {
    let (mode, destination) = raw.split_once('=').ok_or("missing '=' between mode and destination")?;
    let (repo, tag_template) = destination
      .rsplit_once(':')
      .ok_or("missing ':' between repository and tag template")?;
    if repo.is_empty() {
      return Err("empty repository");
    }
    if tag_template.is_empty() {
      return Err("empty tag template");
    }
    Ok(Self {
      mode: PushMode::parse(mode),
      repo: repo.to_string(),
      tag_template: tag_template.to_string(),
    })
  }
}

/// One extraction rule: copy an archived path out of the built image.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractRule {
  /// Path inside the built image.
  pub src: String,

  /// Destination on the host; relative paths resolve against the context.
  pub dst: String,
}

/// A `tag-names:` entry declaring an extra template field.
///
/// All fields are optional so that a partially-written entry is skipped
/// instead of failing the whole configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorDecl {
  #[serde(rename = "type")]
  pub kind: Option<String>,
  pub name: Option<String>,
  pub value: Option<String>,
}
