//! Run-level error taxonomy.
//!
//! Every variant is fatal to the run and maps to a non-zero exit; none are
//! retried. Warning-level conditions (an unresolvable label, a tag that
//! only matters for a push that will not happen) are handled inside the
//! lifecycle and never reach this type.

use thiserror::Error;

use crate::graph::{OrderError, UndefinedBuild};
use crate::lifecycle::LifecycleError;
use crate::manifest::{ConfigError, ValidateError};

/// Fatal errors from one orchestration run.
#[derive(Debug, Error)]
pub enum RunError {
  /// The configuration file could not be read or parsed.
  #[error("configuration error: {0}")]
  Config(#[from] ConfigError),

  /// The definition set is structurally invalid.
  #[error("invalid configuration: {0}")]
  Validate(#[from] ValidateError),

  /// The dependency graph has a cycle or self-dependency.
  #[error("dependency error: {0}")]
  Dependency(#[from] OrderError),

  /// A requested or required build name has no definition.
  #[error(transparent)]
  Undefined(#[from] UndefinedBuild),

  /// The engine failed while building, labeling, extracting, or tagging.
  #[error("build failed for '{name}': {source}")]
  BuildFailed {
    name: String,
    #[source]
    source: LifecycleError,
  },

  /// Publishing failed, or a required tag could not be computed.
  #[error("push failed for '{name}': {source}")]
  PushFailed {
    name: String,
    #[source]
    source: LifecycleError,
  },
}
