//! Transactional dockerfile and ignore-file guards.
//!
//! Both guards restore the on-disk state when dropped, so a build that fails
//! or panics mid-call never leaves a rewritten dockerfile or a stray
//! generated ignore file behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::engine::context::IGNORE_FILE;

/// Replaces a dockerfile's first FROM directive for the duration of one
/// build call; the original bytes come back on drop.
pub struct DockerfileRewrite {
  path: PathBuf,
  original: Vec<u8>,
}

impl DockerfileRewrite {
  pub fn apply(path: &Path, image: &str) -> io::Result<Self> {
    let original = fs::read(path)?;
    let text = String::from_utf8_lossy(&original);
    fs::write(path, rewrite_base_image(&text, image))?;
    debug!(path = %path.display(), image = image, "rewrote base image");
    Ok(Self {
      path: path.to_path_buf(),
      original,
    })
  }
}

impl Drop for DockerfileRewrite {
  fn drop(&mut self) {
    if let Err(err) = fs::write(&self.path, &self.original) {
      error!(path = %self.path.display(), %err, "failed to restore dockerfile");
    }
  }
}

/// Replace the first FROM line with `FROM <image>`, leaving everything else
/// byte-for-byte intact.
fn rewrite_base_image(text: &str, image: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut replaced = false;
  for line in text.split_inclusive('\n') {
    let is_from = !replaced
      && line
        .trim_start()
        .split_whitespace()
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case("FROM"));
    if is_from {
      out.push_str(&format!("FROM {image}"));
      if line.ends_with('\n') {
        out.push('\n');
      }
      replaced = true;
    } else {
      out.push_str(line);
    }
  }
  out
}

/// Ensures a context ignore file exists for one build call.
///
/// A missing file is generated from the definition's patterns plus the
/// ignore file's own name and removed on drop; a pre-existing file is left
/// untouched in both directions.
pub struct IgnoreFile {
  path: PathBuf,
  generated: bool,
}

impl IgnoreFile {
  pub fn ensure(context: &Path, patterns: &[String]) -> io::Result<Self> {
    let path = context.join(IGNORE_FILE);
    if path.exists() {
      return Ok(Self { path, generated: false });
    }

    let mut content = String::new();
    for pattern in patterns {
      content.push_str(pattern);
      content.push('\n');
    }
    content.push_str(IGNORE_FILE);
    content.push('\n');
    fs::write(&path, content)?;
    debug!(path = %path.display(), "generated ignore file");
    Ok(Self { path, generated: true })
  }
}

impl Drop for IgnoreFile {
  fn drop(&mut self) {
    if !self.generated {
      return;
    }
    if let Err(err) = fs::remove_file(&self.path) {
      warn!(path = %self.path.display(), %err, "failed to remove generated ignore file");
    }
  }
}
