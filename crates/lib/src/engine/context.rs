//! Build-context packaging.
//!
//! The daemon receives the build context as a tar archive. Entries matching
//! the context's ignore file are left out; the dockerfile and the ignore
//! file itself are always included so the daemon can re-apply the patterns
//! server-side.

use std::io;
use std::path::Path;

use glob::Pattern;
use tracing::debug;
use walkdir::WalkDir;

use super::EngineError;

/// Name of the context ignore file.
pub const IGNORE_FILE: &str = ".dockerignore";

/// Tar up a context directory, honoring its ignore file.
pub fn pack_context(context: &Path, dockerfile: &str) -> Result<Vec<u8>, EngineError> {
  let patterns = load_ignore_patterns(context)?;
  let mut builder = tar::Builder::new(Vec::new());
  builder.follow_symlinks(false);

  let mut walker = WalkDir::new(context).min_depth(1).sort_by_file_name().into_iter();
  while let Some(entry) = walker.next() {
    let entry = entry.map_err(io::Error::from)?;
    let rel = entry
      .path()
      .strip_prefix(context)
      .map_err(|e| EngineError::Other(e.to_string()))?
      .to_path_buf();

    let always_kept = rel == Path::new(dockerfile) || rel == Path::new(IGNORE_FILE);
    if !always_kept && is_ignored(&rel, &patterns) {
      if entry.file_type().is_dir() {
        walker.skip_current_dir();
      }
      continue;
    }

    if entry.file_type().is_dir() {
      builder.append_dir(&rel, entry.path())?;
    } else {
      builder.append_path_with_name(entry.path(), &rel)?;
    }
  }

  Ok(builder.into_inner()?)
}

/// Read and compile the context's ignore patterns, if the file exists.
pub fn load_ignore_patterns(context: &Path) -> Result<Vec<Pattern>, EngineError> {
  let path = context.join(IGNORE_FILE);
  let text = match std::fs::read_to_string(&path) {
    Ok(text) => text,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(err) => return Err(err.into()),
  };

  let mut patterns = Vec::new();
  for line in text.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    if let Some(rest) = line.strip_prefix('!') {
      debug!(pattern = rest, "negated ignore patterns are not supported; skipping");
      continue;
    }
    match Pattern::new(line.trim_end_matches('/')) {
      Ok(pattern) => patterns.push(pattern),
      Err(err) => debug!(pattern = line, %err, "skipping unparsable ignore pattern"),
    }
  }
  Ok(patterns)
}

/// Whether a context-relative path, or any of its ancestors, is ignored.
pub fn is_ignored(rel: &Path, patterns: &[Pattern]) -> bool {
  if patterns.is_empty() {
    return false;
  }
  rel
    .ancestors()
    .filter(|ancestor| !ancestor.as_os_str().is_empty())
    .any(|ancestor| patterns.iter().any(|p| p.matches_path(ancestor)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeSet;
  use std::fs;

  fn entry_names(data: &[u8]) -> BTreeSet<String> {
    let mut archive = tar::Archive::new(data);
    archive
      .entries()
      .unwrap()
      .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
      .collect()
  }

  #[test]
  fn packs_files_and_skips_ignored_entries() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
    fs::write(dir.path().join("keep.txt"), "keep").unwrap();
    fs::write(dir.path().join("debug.log"), "noise").unwrap();
    fs::create_dir(dir.path().join("target")).unwrap();
    fs::write(dir.path().join("target/artifact"), "noise").unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
    fs::write(dir.path().join(IGNORE_FILE), "*.log\ntarget/\n").unwrap();

    let data = pack_context(dir.path(), "Dockerfile").unwrap();
    let names = entry_names(&data);

    assert!(names.contains("Dockerfile"));
    assert!(names.contains("keep.txt"));
    assert!(names.contains("src/main.rs"));
    assert!(names.contains(IGNORE_FILE));
    assert!(!names.contains("debug.log"));
    assert!(!names.iter().any(|n| n.starts_with("target")));
  }

  #[test]
  fn dockerfile_is_kept_even_when_a_pattern_matches_it() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
    fs::write(dir.path().join(IGNORE_FILE), "Dockerfile\n").unwrap();

    let data = pack_context(dir.path(), "Dockerfile").unwrap();
    assert!(entry_names(&data).contains("Dockerfile"));
  }

  #[test]
  fn missing_ignore_file_means_no_patterns() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_ignore_patterns(dir.path()).unwrap().is_empty());
  }

  #[test]
  fn ancestor_directories_ignore_their_contents() {
    let patterns = vec![Pattern::new("build").unwrap()];
    assert!(is_ignored(Path::new("build/deep/file.txt"), &patterns));
    assert!(is_ignored(Path::new("build"), &patterns));
    assert!(!is_ignored(Path::new("src/build.rs"), &patterns));
  }
}
