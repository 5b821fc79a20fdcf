//! Failure kinds for cache operations.
//!
//! None of these escape to callers of the store or the resolver. They
//! degrade to an absent value and are logged.

use tracing::{error, warn};

use super::traits::ResourceId;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  /// Malformed inline payload.
  #[error("decode error: {0}")]
  Decode(String),

  /// Network failure or non-success status while fetching.
  #[error("transfer error: {0}")]
  Transfer(String),

  /// Filesystem failure (permissions, disk full, uncreatable directory).
  #[error("storage error: {context}: {source}")]
  Storage {
    context: String,
    #[source]
    source: std::io::Error,
  },
}

impl CacheError {
  pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
    Self::Storage {
      context: context.into(),
      source,
    }
  }

  pub fn kind(&self) -> &'static str {
    match self {
      Self::Decode(_) => "decode",
      Self::Transfer(_) => "transfer",
      Self::Storage { .. } => "storage",
    }
  }

  /// Emit a diagnostic for this failure against `id`.
  pub fn log(&self, id: &ResourceId) {
    match self {
      Self::Decode(msg) => warn!(id = %id, kind = "decode", error = %msg, "inline payload rejected"),
      Self::Transfer(msg) => warn!(id = %id, kind = "transfer", error = %msg, "image fetch failed"),
      Self::Storage { context, source } => {
        error!(id = %id, kind = "storage", error = %source, "{}", context)
      }
    }
  }
}

pub type Result<T> = std::result::Result<T, CacheError>;
