//! Transient artifact tracking.
//!
//! Files created as side effects of a run (extraction destinations and the
//! like) are registered here and removed when the run ends, whatever the
//! outcome. The list is append-only while the run is in flight and drained
//! exactly once at the end; `Drop` is the backstop for early exits.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Append-only registry of paths to remove at the end of the run.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
  paths: Vec<PathBuf>,
}

impl ArtifactRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Remember a path for end-of-run removal.
  pub fn register(&mut self, path: impl Into<PathBuf>) {
    let path = path.into();
    debug!(path = %path.display(), "registered transient artifact");
    self.paths.push(path);
  }

  /// Remove every registered path that still exists.
  ///
  /// Files and symlinks are unlinked; directories are removed only when
  /// empty. Paths already gone are skipped without error.
  pub fn drain(&mut self) {
    for path in self.paths.drain(..) {
      remove(&path);
    }
  }

  #[cfg(test)]
  pub fn registered(&self) -> &[PathBuf] {
    &self.paths
  }
}

impl Drop for ArtifactRegistry {
  fn drop(&mut self) {
    self.drain();
  }
}

fn remove(path: &Path) {
  let meta = match fs::symlink_metadata(path) {
    Ok(meta) => meta,
    Err(_) => {
      debug!(path = %path.display(), "transient artifact already gone");
      return;
    }
  };

  let result = if meta.is_dir() {
    fs::remove_dir(path)
  } else {
    fs::remove_file(path)
  };

  match result {
    Ok(()) => debug!(path = %path.display(), "removed transient artifact"),
    Err(err) if meta.is_dir() => {
      debug!(path = %path.display(), %err, "leaving non-empty directory in place")
    }
    Err(err) => warn!(path = %path.display(), %err, "failed to remove transient artifact"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn drain_removes_surviving_files() {
    let dir = tempfile::tempdir().unwrap();
    let kept = dir.path().join("kept.tar");
    let gone = dir.path().join("gone.tar");
    fs::write(&kept, b"x").unwrap();
    fs::write(&gone, b"x").unwrap();

    let mut registry = ArtifactRegistry::new();
    registry.register(&kept);
    registry.register(&gone);

    // Simulates other logic removing an artifact before the drain.
    fs::remove_file(&gone).unwrap();

    registry.drain();
    assert!(!kept.exists());
    assert!(!gone.exists());
    assert!(registry.registered().is_empty());
  }

  #[test]
  fn drain_removes_empty_directories_only() {
    let dir = tempfile::tempdir().unwrap();
    let empty = dir.path().join("empty");
    let full = dir.path().join("full");
    fs::create_dir(&empty).unwrap();
    fs::create_dir(&full).unwrap();
    fs::write(full.join("file"), b"x").unwrap();

    let mut registry = ArtifactRegistry::new();
    registry.register(&empty);
    registry.register(&full);
    registry.drain();

    assert!(!empty.exists());
    assert!(full.exists());
  }

  #[test]
  fn drop_drains_whatever_is_left() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("leftover");
    fs::write(&file, b"x").unwrap();
    {
      let mut registry = ArtifactRegistry::new();
      registry.register(&file);
    }
    assert!(!file.exists());
  }
}
