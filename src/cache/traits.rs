//! Core types shared by the store and the resolution policy.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque identifier of a cacheable image (e.g. a course id).
///
/// Used verbatim as the cache file's base name. No escaping is performed, so
/// callers must only hand in identifiers that are safe on every filesystem
/// they target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ResourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ResourceId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl From<String> for ResourceId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

/// Candidate URLs offered for a single resolution call.
///
/// Empty strings are treated as absent values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Candidates {
  /// URL (or inline payload) from the system of record
  pub authoritative: Option<String>,
  /// Deprecated, possibly stale URL kept for backward compatibility
  pub legacy: Option<String>,
}

impl Candidates {
  pub fn new(authoritative: Option<String>, legacy: Option<String>) -> Self {
    Self {
      authoritative: authoritative.filter(|s| !s.is_empty()),
      legacy: legacy.filter(|s| !s.is_empty()),
    }
  }

  pub fn authoritative(&self) -> Option<&str> {
    self.authoritative.as_deref().filter(|s| !s.is_empty())
  }

  pub fn legacy(&self) -> Option<&str> {
    self.legacy.as_deref().filter(|s| !s.is_empty())
  }

  /// Candidates in precedence order: authoritative first, then legacy.
  pub fn in_order(&self) -> impl Iterator<Item = &str> {
    self.authoritative().into_iter().chain(self.legacy())
  }
}

/// What to write into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteSource {
  /// Raw image bytes
  Bytes(Vec<u8>),
  /// Self-describing `data:<mime>;base64,<payload>` string
  Inline(String),
  /// Remote URL to GET
  Remote(String),
}

impl WriteSource {
  /// Classify a URI string: `data:` prefixed strings are inline payloads,
  /// anything else is fetched.
  pub fn from_uri(uri: &str) -> Self {
    if super::inline::is_inline(uri) {
      Self::Inline(uri.to_string())
    } else {
      Self::Remote(uri.to_string())
    }
  }

  /// Short label for log fields.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Bytes(_) => "bytes",
      Self::Inline(_) => "inline",
      Self::Remote(_) => "remote",
    }
  }
}

/// Display source handed back to a caller.
///
/// Callers treat it as an opaque string; the variant records where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "uri", rename_all = "lowercase")]
pub enum ResolvedUri {
  /// Path of a complete entry in the local cache
  Cached(PathBuf),
  /// A candidate URL or inline payload, as given
  Remote(String),
  /// The built-in default placeholder image
  Default(String),
}

impl ResolvedUri {
  pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
    match self {
      Self::Cached(path) => path.to_string_lossy(),
      Self::Remote(uri) | Self::Default(uri) => std::borrow::Cow::Borrowed(uri),
    }
  }

  pub fn is_cached(&self) -> bool {
    matches!(self, Self::Cached(_))
  }

  pub fn local_path(&self) -> Option<&Path> {
    match self {
      Self::Cached(path) => Some(path),
      _ => None,
    }
  }
}

impl fmt::Display for ResolvedUri {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.as_str())
  }
}
