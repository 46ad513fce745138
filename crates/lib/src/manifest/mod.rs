//! Configuration loading and validation.
//!
//! The configuration file is YAML with a top-level `builds:` mapping. Loading
//! only parses; `BuildManifest::validate` checks the definition set for
//! structural problems and must succeed before any ordering or building
//! happens.

mod types;

use std::fs;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

pub use types::{BuildDef, BuildManifest, ExtractRule, GeneratorDecl, PushRule};

/// Errors reading or parsing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("cannot read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("cannot parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
}

/// Structural problems in an otherwise well-formed configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidateError {
  #[error("build '{build}' depends on undefined build '{dependency}'")]
  UnknownDependency { build: String, dependency: String },

  #[error("build '{build}' rewrites from '{rewrite_source}' which is not in its depends_on")]
  RewriteSourceNotDeclared { build: String, rewrite_source: String },

  #[error("build '{build}' has malformed push rule '{rule}': {reason}")]
  MalformedPushRule {
    build: String,
    rule: String,
    reason: &'static str,
  },

  #[error("build '{build}' has malformed label '{label}' (expected key=value)")]
  MalformedLabel { build: String, label: String },

  #[error("build '{build}' dockerfile '{dockerfile}' escapes the build context")]
  DockerfileOutsideContext { build: String, dockerfile: String },
}

impl BuildManifest {
  /// Read and parse a configuration file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Check the definition set before ordering or building anything.
  pub fn validate(&self) -> Result<(), ValidateError> {
    for (name, def) in &self.builds {
      for dependency in &def.depends_on {
        if !self.builds.contains_key(dependency) {
          return Err(ValidateError::UnknownDependency {
            build: name.clone(),
            dependency: dependency.clone(),
          });
        }
      }

      if let Some(source) = &def.rewrite_from {
        if !def.depends_on.contains(source) {
          return Err(ValidateError::RewriteSourceNotDeclared {
            build: name.clone(),
            rewrite_source: source.clone(),
          });
        }
      }

      let dockerfile = Path::new(&def.dockerfile);
      if dockerfile.is_absolute() || dockerfile.components().any(|c| c == Component::ParentDir) {
        return Err(ValidateError::DockerfileOutsideContext {
          build: name.clone(),
          dockerfile: def.dockerfile.clone(),
        });
      }

      for raw in &def.pushes {
        if let Err(reason) = PushRule::parse(raw) {
          return Err(ValidateError::MalformedPushRule {
            build: name.clone(),
            rule: raw.clone(),
            reason,
          });
        }
      }

      for label in &def.labels {
        let well_formed = label.split_once('=').is_some_and(|(key, _)| !key.is_empty());
        if !well_formed {
          return Err(ValidateError::MalformedLabel {
            build: name.clone(),
            label: label.clone(),
          });
        }
      }
    }
    Ok(())
  }
}
