//! Named-substitution rendering for tag and label templates.
//!
//! Templates reference release-context fields by name: `registry/app:{git_tag}`.
//! `{{` and `}}` produce literal braces. Rendering is a pure function of the
//! template and the argument map; an unknown field is an error, and the
//! caller decides whether that is fatal or merely skips the item.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors from rendering a template string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
  /// The template references a field the context does not provide.
  #[error("unknown template field '{0}'")]
  UnknownField(String),

  /// A `{` without a matching `}`.
  #[error("unclosed '{{' at position {0}")]
  Unclosed(usize),

  /// A `}` without a matching `{`.
  #[error("unmatched '}}' at position {0}")]
  Unmatched(usize),
}

/// Substitute every `{field}` in `template` with its value from `args`.
pub fn render(template: &str, args: &BTreeMap<String, String>) -> Result<String, TemplateError> {
  let mut out = String::with_capacity(template.len());
  let mut chars = template.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    match ch {
      '{' => {
        if let Some(&(_, '{')) = chars.peek() {
          chars.next();
          out.push('{');
          continue;
        }
        let mut field = String::new();
        loop {
          match chars.next() {
            Some((_, '}')) => break,
            Some((_, c)) => field.push(c),
            None => return Err(TemplateError::Unclosed(pos)),
          }
        }
        match args.get(&field) {
          Some(value) => out.push_str(value),
          None => return Err(TemplateError::UnknownField(field)),
        }
      }
      '}' => {
        if let Some(&(_, '}')) = chars.peek() {
          chars.next();
          out.push('}');
        } else {
          return Err(TemplateError::Unmatched(pos));
        }
      }
      _ => out.push(ch),
    }
  }

  Ok(out)
}
