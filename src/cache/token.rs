//! Request-scoped cancellation tokens.
//!
//! A `RequestScope` belongs to one consumer. Every resolution it starts gets a
//! `RequestToken` stamped with the scope's current generation; issuing a new
//! token or invalidating the scope makes all earlier tokens stale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct RequestScope {
  generation: Arc<AtomicU64>,
}

impl RequestScope {
  pub fn new() -> Self {
    Self::default()
  }

  /// Start a new logical request, superseding any earlier one.
  pub fn issue(&self) -> RequestToken {
    let issued = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
    RequestToken {
      generation: Arc::clone(&self.generation),
      issued,
    }
  }

  /// Withdraw interest in the current request.
  pub fn invalidate(&self) {
    self.generation.fetch_add(1, Ordering::AcqRel);
  }
}

#[derive(Debug, Clone)]
pub struct RequestToken {
  generation: Arc<AtomicU64>,
  issued: u64,
}

impl RequestToken {
  /// A token not tied to any consumer; always current.
  pub fn detached() -> Self {
    RequestScope::new().issue()
  }

  pub fn is_current(&self) -> bool {
    self.generation.load(Ordering::Acquire) == self.issued
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_token_is_current() {
    let scope = RequestScope::new();
    let token = scope.issue();
    assert!(token.is_current());
    assert!(token.clone().is_current());
  }

  #[test]
  fn test_issue_supersedes_previous() {
    let scope = RequestScope::new();
    let first = scope.issue();
    let second = scope.issue();
    assert!(!first.is_current());
    assert!(second.is_current());
  }

  #[test]
  fn test_invalidate() {
    let scope = RequestScope::new();
    let token = scope.issue();
    scope.invalidate();
    assert!(!token.is_current());
  }

  #[test]
  fn test_detached_token() {
    assert!(RequestToken::detached().is_current());
  }
}
