//! Shared test helpers: definition builders and a scripted engine.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use futures_util::stream;

use crate::engine::{ByteStream, EngineError, ImageEngine, PushEvent, PushStream};
use crate::manifest::{BuildDef, BuildManifest};
use crate::release::ReleaseContext;

/// A definition with the given dependencies and dockerfile, context `.`.
pub fn def_with(depends_on: &[&str], dockerfile: &str) -> BuildDef {
  BuildDef {
    context: PathBuf::from("."),
    dockerfile: dockerfile.to_string(),
    dockerignore: Vec::new(),
    depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
    pushes: Vec::new(),
    labels: Vec::new(),
    extract: Vec::new(),
    rewrite_from: None,
  }
}

impl BuildDef {
  /// Test-only: move a definition into a real context directory.
  pub fn in_context(mut self, context: &Path) -> Self {
    self.context = context.to_path_buf();
    self
  }
}

/// A manifest from `(name, depends_on)` pairs.
pub fn manifest_of(builds: &[(&str, &[&str])]) -> BuildManifest {
  BuildManifest {
    builds: builds
      .iter()
      .map(|(name, deps)| (name.to_string(), def_with(deps, "Dockerfile")))
      .collect(),
    tag_names: Vec::new(),
  }
}

/// A release context from literal field pairs.
pub fn release_ctx(pairs: &[(&str, &str)]) -> ReleaseContext {
  ReleaseContext::from_fields(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
}

/// Every call a [`MockEngine`] has served, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
  Build {
    context: PathBuf,
    dockerfile: String,
    /// Dockerfile content at the time of the call.
    manifest_content: String,
  },
  BuildInline {
    manifest: String,
  },
  Tag {
    image: String,
    repo: String,
    tag: String,
  },
  Push {
    repo: String,
    tag: String,
  },
  CreateContainer {
    image: String,
  },
  ExportPath {
    container: String,
    src: String,
  },
  RemoveContainer {
    container: String,
  },
}

/// Scripted in-memory engine: hands out sequential image ids and records
/// every call.
#[derive(Debug, Default)]
pub struct MockEngine {
  calls: Mutex<Vec<EngineCall>>,
  counter: Mutex<u32>,
  /// Fail any build whose context is this directory.
  pub fail_build_in: Option<PathBuf>,
  /// Fail every export stream.
  pub fail_export: bool,
  /// Events replayed by every push.
  pub push_events: Vec<PushEvent>,
}

impl MockEngine {
  pub fn calls(&self) -> Vec<EngineCall> {
    self.calls.lock().unwrap().clone()
  }

  fn record(&self, call: EngineCall) {
    self.calls.lock().unwrap().push(call);
  }

  fn next_id(&self, prefix: &str) -> String {
    let mut counter = self.counter.lock().unwrap();
    *counter += 1;
    format!("sha256:{prefix}-{counter}")
  }
}

impl ImageEngine for MockEngine {
  async fn build(&self, context: &Path, dockerfile: &str) -> Result<String, EngineError> {
    let manifest_content = std::fs::read_to_string(context.join(dockerfile)).unwrap_or_default();
    self.record(EngineCall::Build {
      context: context.to_path_buf(),
      dockerfile: dockerfile.to_string(),
      manifest_content,
    });
    if self.fail_build_in.as_deref() == Some(context) {
      return Err(EngineError::Build("scripted build failure".to_string()));
    }
    Ok(self.next_id("image"))
  }

  async fn build_inline(&self, dockerfile: &str) -> Result<String, EngineError> {
    self.record(EngineCall::BuildInline {
      manifest: dockerfile.to_string(),
    });
    Ok(self.next_id("image"))
  }

  async fn tag(&self, image: &str, repo: &str, tag: &str) -> Result<(), EngineError> {
    self.record(EngineCall::Tag {
      image: image.to_string(),
      repo: repo.to_string(),
      tag: tag.to_string(),
    });
    Ok(())
  }

  async fn push(&self, repo: &str, tag: &str) -> Result<PushStream<'_>, EngineError> {
    self.record(EngineCall::Push {
      repo: repo.to_string(),
      tag: tag.to_string(),
    });
    let events: Vec<Result<PushEvent, EngineError>> =
      self.push_events.iter().cloned().map(Ok).collect();
    Ok(Box::pin(stream::iter(events)))
  }

  async fn create_container(&self, image: &str) -> Result<String, EngineError> {
    self.record(EngineCall::CreateContainer {
      image: image.to_string(),
    });
    Ok(self.next_id("container"))
  }

  async fn export_path(&self, container: &str, src: &str) -> Result<ByteStream<'_>, EngineError> {
    self.record(EngineCall::ExportPath {
      container: container.to_string(),
      src: src.to_string(),
    });
    if self.fail_export {
      return Err(EngineError::Other("scripted export failure".to_string()));
    }
    let chunks: Vec<Result<Bytes, EngineError>> = vec![Ok(Bytes::from_static(b"archive-bytes"))];
    Ok(Box::pin(stream::iter(chunks)))
  }

  async fn remove_container(&self, container: &str) -> Result<(), EngineError> {
    self.record(EngineCall::RemoveContainer {
      container: container.to_string(),
    });
    Ok(())
  }
}
