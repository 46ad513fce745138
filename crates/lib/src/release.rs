//! Release context: the per-run template fields.
//!
//! Captured once at startup from the local git checkout and the clock, then
//! treated as immutable. Tag templates may use every field; label templates
//! see everything except `date`, so label values stay stable across days and
//! do not invalidate image layer caches.
//!
//! Extra fields can be declared in the configuration under `tag-names:` as
//! `{type, name, value}` entries, where `cmd` runs a shell command and uses
//! its trimmed stdout and `datetime` formats the current time. A generator
//! that fails or produces blank output simply leaves its field out.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::process::{Command, Stdio};

use chrono::Local;
use tracing::debug;

use crate::manifest::GeneratorDecl;

/// The one field excluded from label rendering.
pub const DATE_FIELD: &str = "date";

/// Immutable snapshot of version-control and clock fields for templating.
#[derive(Debug, Clone, Default)]
pub struct ReleaseContext {
  fields: BTreeMap<String, String>,
}

impl ReleaseContext {
  /// Capture the standard fields plus any configured extra generators.
  pub fn capture(extras: &[GeneratorDecl]) -> Self {
    let mut fields = BTreeMap::new();

    if let Some(commit) = git_output(&["rev-parse", "HEAD"]) {
      fields.insert("scommitid".to_string(), commit.chars().take(7).collect());
      fields.insert("fcommitid".to_string(), commit);
    }
    if let Some(msg) = git_output(&["log", "--oneline", "-1"]) {
      fields.insert("commitmsg".to_string(), msg);
    }
    if let Some(branch) = git_output(&["rev-parse", "--abbrev-ref", "HEAD"]) {
      fields.insert("git_branch".to_string(), branch);
    }
    if let Some(tags) = git_output(&["tag", "--contains", "HEAD"]) {
      if let Some(tag) = tags.lines().next() {
        fields.insert("git_tag".to_string(), tag.trim().to_string());
      }
    }
    if let Some(describe) = git_output(&["describe", "--tags"]) {
      fields.insert("git_describe".to_string(), describe);
    }
    fields.insert(DATE_FIELD.to_string(), Local::now().format("%Y%m%d").to_string());

    for decl in extras {
      let (Some(kind), Some(name), Some(value)) = (&decl.kind, &decl.name, &decl.value) else {
        debug!("skipping incomplete tag-names entry");
        continue;
      };
      let generated = match kind.as_str() {
        "cmd" => shell_output(value),
        "datetime" => format_now(value),
        other => {
          debug!(kind = other, name = %name, "skipping tag-names entry with unknown type");
          None
        }
      };
      if let Some(generated) = generated {
        fields.insert(name.clone(), generated);
      }
    }

    Self { fields }
  }

  /// Build a context from explicit field values.
  pub fn from_fields(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
    Self {
      fields: pairs.into_iter().collect(),
    }
  }

  /// Fields available to tag templates.
  pub fn tag_args(&self) -> &BTreeMap<String, String> {
    &self.fields
  }

  /// Fields available to label templates (everything except the date stamp).
  pub fn label_args(&self) -> BTreeMap<String, String> {
    let mut args = self.fields.clone();
    args.remove(DATE_FIELD);
    args
  }

  pub fn git_tag(&self) -> Option<&str> {
    self.fields.get("git_tag").map(String::as_str)
  }

  pub fn git_branch(&self) -> Option<&str> {
    self.fields.get("git_branch").map(String::as_str)
  }
}

fn git_output(args: &[&str]) -> Option<String> {
  command_output(Command::new("git").args(args))
}

fn shell_output(cmdline: &str) -> Option<String> {
  command_output(Command::new("sh").arg("-c").arg(cmdline))
}

/// Trimmed stdout of a successful command; `None` on failure or blank output.
fn command_output(cmd: &mut Command) -> Option<String> {
  let output = cmd.stderr(Stdio::null()).output().ok()?;
  if !output.status.success() {
    return None;
  }
  let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
  if text.is_empty() { None } else { Some(text) }
}

fn format_now(fmt: &str) -> Option<String> {
  let mut out = String::new();
  write!(out, "{}", Local::now().format(fmt)).ok()?;
  Some(out)
}
