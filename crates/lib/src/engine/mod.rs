//! Image Engine abstraction.
//!
//! The build lifecycle talks to the container daemon through this trait so
//! that tests can script engine behavior and the orchestration logic never
//! depends on a live daemon. The production implementation is
//! [`docker::DockerEngine`].

pub mod context;
pub mod docker;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;

/// One line of a push response stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushEvent {
  /// Progress or status message, if any.
  pub message: Option<String>,

  /// Error detail; its presence aborts the push.
  pub error_detail: Option<String>,
}

/// Streamed push responses, consumed line by line.
pub type PushStream<'a> = Pin<Box<dyn Stream<Item = Result<PushEvent, EngineError>> + Send + 'a>>;

/// Streamed archive bytes from a container path.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = Result<Bytes, EngineError>> + Send + 'a>>;

/// Failures reported by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
  /// The daemon reported a build error.
  #[error("image build failed: {0}")]
  Build(String),

  /// Transport or API failure talking to the daemon.
  #[error("engine api error: {0}")]
  Api(#[from] bollard::errors::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("{0}")]
  Other(String),
}

/// Container-daemon operations the build lifecycle depends on.
///
/// All operations are sequential; no two calls overlap within a run.
pub trait ImageEngine {
  /// Build an image from a context directory and return its image id.
  ///
  /// The context is uploaded as a tar archive honoring its ignore file;
  /// build output is logged, not returned.
  fn build(
    &self,
    context: &Path,
    dockerfile: &str,
  ) -> impl Future<Output = Result<String, EngineError>> + Send;

  /// Build an image from literal dockerfile text with an empty context.
  fn build_inline(&self, dockerfile: &str) -> impl Future<Output = Result<String, EngineError>> + Send;

  /// Apply `repo:tag` to an existing image.
  fn tag(
    &self,
    image: &str,
    repo: &str,
    tag: &str,
  ) -> impl Future<Output = Result<(), EngineError>> + Send;

  /// Start pushing `repo:tag` and stream the daemon's responses.
  fn push(
    &self,
    repo: &str,
    tag: &str,
  ) -> impl Future<Output = Result<PushStream<'_>, EngineError>> + Send;

  /// Create a stopped container from an image, returning its id.
  fn create_container(&self, image: &str) -> impl Future<Output = Result<String, EngineError>> + Send;

  /// Stream a path out of a container as a tar archive.
  fn export_path(
    &self,
    container: &str,
    path: &str,
  ) -> impl Future<Output = Result<ByteStream<'_>, EngineError>> + Send;

  /// Remove a container, forcing if necessary.
  fn remove_container(&self, container: &str) -> impl Future<Output = Result<(), EngineError>> + Send;
}
