//! Push policy evaluation.
//!
//! Every push rule carries a mode deciding whether the rule publishes for
//! the current run. Evaluation is a pure function of the mode and the
//! release context; no I/O happens here.

use std::fmt;

use crate::release::ReleaseContext;

/// When a push rule publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMode {
  /// Publish on every run.
  Always,
  /// Never publish.
  Never,
  /// Publish only when the checkout is tagged.
  OnTag,
  /// Publish only when the current branch matches.
  OnBranch(String),
  /// Unrecognized mode string; never publishes.
  Other(String),
}

impl PushMode {
  /// Parse the mode part of a push rule.
  pub fn parse(mode: &str) -> Self {
    match mode {
      "always" => PushMode::Always,
      "never" => PushMode::Never,
      "on_tag" => PushMode::OnTag,
      _ => match mode.strip_prefix("on_branch:") {
        Some(branch) => PushMode::OnBranch(branch.to_string()),
        None => PushMode::Other(mode.to_string()),
      },
    }
  }

  /// Whether a push should happen for the given release context.
  pub fn should_push(&self, ctx: &ReleaseContext) -> bool {
    match self {
      PushMode::Always => true,
      PushMode::Never => false,
      PushMode::OnTag => ctx.git_tag().is_some_and(|tag| !tag.is_empty()),
      PushMode::OnBranch(branch) => ctx.git_branch() == Some(branch.as_str()),
      PushMode::Other(_) => false,
    }
  }
}

impl fmt::Display for PushMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PushMode::Always => write!(f, "always"),
      PushMode::Never => write!(f, "never"),
      PushMode::OnTag => write!(f, "on_tag"),
      PushMode::OnBranch(branch) => write!(f, "on_branch:{}", branch),
      PushMode::Other(mode) => write!(f, "{}", mode),
    }
  }
}
