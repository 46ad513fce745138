//! CLI output formatting utilities.
//!
//! Colored status messages degrade to plain text when stdout/stderr is not
//! a terminal.

use owo_colors::{OwoColorize, Stream};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const ARROW: &str = "→";
}

/// Shorten an image id for display: drop the digest prefix, keep 12 chars.
pub fn short_image_id(id: &str) -> &str {
  let bare = id.strip_prefix("sha256:").unwrap_or(id);
  let len = bare.len().min(12);
  &bare[..len]
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    "error:".if_supports_color(Stream::Stderr, |s| s.red()),
    message
  );
}
