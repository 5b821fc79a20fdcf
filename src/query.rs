//! Consumer-side image query.
//!
//! An `ImageQuery` is what a display element holds on to. It tracks exactly
//! one logical request at a time, hands back the synchronous answer from
//! `load`, and picks up the background upgrade through `poll` (from an event
//! loop tick) or `upgraded` (awaiting it directly).
//!
//! # Example
//!
//! ```ignore
//! let mut query = ImageQuery::new(resolver.clone());
//!
//! // On mount or when the identifiers change
//! let uri = query.load(ResolveRequest::new("course-42", Some(url), None));
//! render(uri);
//!
//! // In event loop tick
//! if query.poll() {
//!     // Upgraded to the cached file, trigger re-render
//! }
//! ```
//!
//! Loading a different request, calling `cancel`, or dropping the query
//! invalidates its token, so a late upgrade never lands on a request that
//! is no longer current.

use crate::cache::{
  ImageStorage, PendingUpgrade, RequestScope, ResolveRequest, ResolvedUri, Resolver, UpgradeStatus,
};

pub struct ImageQuery<S: ImageStorage> {
  resolver: Resolver<S>,
  scope: RequestScope,
  request: Option<ResolveRequest>,
  uri: Option<ResolvedUri>,
  pending: Option<PendingUpgrade>,
}

impl<S: ImageStorage> ImageQuery<S> {
  pub fn new(resolver: Resolver<S>) -> Self {
    Self {
      resolver,
      scope: RequestScope::new(),
      request: None,
      uri: None,
      pending: None,
    }
  }

  /// Resolve `request` and return what to display right now.
  ///
  /// This is a no-op returning the current answer if `request` is the one
  /// already loaded. A different request supersedes the previous one.
  pub fn load(&mut self, request: ResolveRequest) -> ResolvedUri {
    match (&self.request, &self.uri) {
      (Some(current), Some(uri)) if *current == request => uri.clone(),
      _ => self.start(request),
    }
  }

  /// Force a fresh resolution of the current request.
  pub fn reload(&mut self) -> Option<ResolvedUri> {
    let request = self.request.clone()?;
    Some(self.start(request))
  }

  /// Current display URI, if anything has been loaded.
  pub fn uri(&self) -> Option<&ResolvedUri> {
    self.uri.as_ref()
  }

  pub fn request(&self) -> Option<&ResolveRequest> {
    self.request.as_ref()
  }

  /// Check if a background upgrade may still arrive.
  pub fn is_upgrading(&self) -> bool {
    self.pending.is_some()
  }

  /// Poll for the background upgrade.
  ///
  /// Returns `true` if the URI changed to the cached file.
  pub fn poll(&mut self) -> bool {
    let pending = match &mut self.pending {
      Some(pending) => pending,
      None => return false,
    };

    match pending.try_take() {
      UpgradeStatus::Upgraded(path) => {
        self.uri = Some(ResolvedUri::Cached(path));
        self.pending = None;
        true
      }
      UpgradeStatus::Pending => false,
      UpgradeStatus::Abandoned => {
        // Keep showing the remote URI
        self.pending = None;
        false
      }
    }
  }

  /// Wait for the background upgrade, if any.
  ///
  /// Returns `true` if the URI changed to the cached file. Dropping the
  /// future early leaves the upgrade pending for a later `poll`.
  pub async fn upgraded(&mut self) -> bool {
    let Some(pending) = self.pending.as_mut() else {
      return false;
    };

    let result = pending.recv().await;
    self.pending = None;
    match result {
      Some(path) => {
        self.uri = Some(ResolvedUri::Cached(path));
        true
      }
      None => false,
    }
  }

  /// Withdraw interest in the pending upgrade. The last answer stays.
  pub fn cancel(&mut self) {
    self.scope.invalidate();
    self.pending = None;
  }

  fn start(&mut self, request: ResolveRequest) -> ResolvedUri {
    // Issuing a token supersedes the previous request
    let token = self.scope.issue();
    let resolution = self.resolver.resolve(&request, token);

    self.request = Some(request);
    self.pending = resolution.upgrade;
    self.uri = Some(resolution.uri.clone());
    resolution.uri
  }
}

impl<S: ImageStorage> Drop for ImageQuery<S> {
  fn drop(&mut self) {
    self.scope.invalidate();
  }
}

impl<S: ImageStorage> std::fmt::Debug for ImageQuery<S> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ImageQuery")
      .field("request", &self.request)
      .field("uri", &self.uri)
      .field("upgrading", &self.pending.is_some())
      .finish_non_exhaustive()
  }
}
