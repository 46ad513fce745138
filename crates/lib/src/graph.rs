//! Dependency-graph ordering and want-set expansion.
//!
//! `resolve_order` produces a total order in which every build appears after
//! all of its dependencies. `expand_want_set` narrows a run to the requested
//! builds plus everything they transitively depend on.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::manifest::BuildManifest;

/// Graph problems that make ordering impossible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
  #[error("build '{0}' depends on itself")]
  SelfDependency(String),

  #[error("dependency cycle among builds: {}", .0.join(", "))]
  Cycle(Vec<String>),
}

/// A requested or transitively-required build name with no definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("build '{0}' is not defined")]
pub struct UndefinedBuild(pub String);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
  Unvisited,
  InProgress,
  Done,
}

/// Order all builds so that dependencies come before dependents.
///
/// Iterative depth-first traversal over reverse edges: visiting a build
/// explores every build that depends on it before the build itself is
/// emitted, and reversing the emission order yields dependencies-first.
/// The relative order of unrelated builds is unspecified.
pub fn resolve_order(manifest: &BuildManifest) -> Result<Vec<String>, OrderError> {
  // name -> builds that list it in depends_on
  let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
  for (name, def) in &manifest.builds {
    for dependency in &def.depends_on {
      dependents.entry(dependency.as_str()).or_default().push(name.as_str());
    }
  }

  let mut color: BTreeMap<&str, Color> =
    manifest.builds.keys().map(|name| (name.as_str(), Color::Unvisited)).collect();
  let mut order: Vec<String> = Vec::with_capacity(manifest.builds.len());

  for root in manifest.builds.keys() {
    if color.get(root.as_str()) != Some(&Color::Unvisited) {
      continue;
    }
    color.insert(root.as_str(), Color::InProgress);
    let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];

    loop {
      let Some(&mut (name, ref mut next)) = stack.last_mut() else {
        break;
      };
      let children = dependents.get(name).map(Vec::as_slice).unwrap_or(&[]);

      if *next >= children.len() {
        color.insert(name, Color::Done);
        order.push(name.to_string());
        stack.pop();
        continue;
      }

      let child = children[*next];
      *next += 1;

      match color.get(child) {
        Some(Color::Unvisited) => {
          color.insert(child, Color::InProgress);
          stack.push((child, 0));
        }
        Some(Color::InProgress) => {
          let self_dependent = manifest
            .builds
            .get(child)
            .is_some_and(|def| def.depends_on.iter().any(|d| d == child));
          if self_dependent {
            return Err(OrderError::SelfDependency(child.to_string()));
          }
          let in_progress = color
            .iter()
            .filter(|(_, c)| **c == Color::InProgress)
            .map(|(name, _)| name.to_string())
            .collect();
          return Err(OrderError::Cycle(in_progress));
        }
        _ => {}
      }
    }
  }

  order.reverse();
  Ok(order)
}

/// Expand a requested subset to include all transitive dependencies.
///
/// An empty request selects every build.
pub fn expand_want_set(
  manifest: &BuildManifest,
  requested: &[String],
) -> Result<BTreeSet<String>, UndefinedBuild> {
  if requested.is_empty() {
    return Ok(manifest.builds.keys().cloned().collect());
  }

  let mut selected = BTreeSet::new();
  let mut pending: Vec<&str> = requested.iter().map(String::as_str).collect();

  while let Some(name) = pending.pop() {
    let def = manifest
      .builds
      .get(name)
      .ok_or_else(|| UndefinedBuild(name.to_string()))?;
    if selected.insert(name.to_string()) {
      for dependency in &def.depends_on {
        if !selected.contains(dependency) {
          pending.push(dependency);
        }
      }
    }
  }

  Ok(selected)
}
