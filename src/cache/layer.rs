//! Resolution layer that decides what to display now and what to cache in
//! the background.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::classify::PlaceholderPolicy;
use super::storage::ImageStorage;
use super::token::RequestToken;
use super::traits::{Candidates, ResolvedUri, ResourceId, WriteSource};

/// One logical resolution request. Its identity is the id plus both
/// candidate values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveRequest {
  pub id: ResourceId,
  pub candidates: Candidates,
}

impl ResolveRequest {
  pub fn new(id: impl Into<ResourceId>, authoritative: Option<&str>, legacy: Option<&str>) -> Self {
    Self {
      id: id.into(),
      candidates: Candidates::new(authoritative.map(String::from), legacy.map(String::from)),
    }
  }
}

/// Synchronous answer plus, when a real remote source was found, the
/// background write that may later supersede it.
#[derive(Debug)]
pub struct Resolution {
  pub uri: ResolvedUri,
  pub upgrade: Option<PendingUpgrade>,
}

/// State of a background upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeStatus {
  /// Write still in flight
  Pending,
  /// Entry written and the request is still current
  Upgraded(PathBuf),
  /// Write failed, or the request was superseded
  Abandoned,
}

/// Handle to a background fetch-and-cache.
///
/// Delivers the local path only while the issuing request's token is
/// current. Dropping it does not abort the write.
#[derive(Debug)]
pub struct PendingUpgrade {
  rx: oneshot::Receiver<PathBuf>,
  token: RequestToken,
}

impl PendingUpgrade {
  /// Wait for the write to finish.
  pub async fn wait(self) -> Option<PathBuf> {
    let path = self.rx.await.ok()?;
    self.token.is_current().then_some(path)
  }

  /// Wait for the write to finish without giving up the handle.
  ///
  /// Cancel-safe: if this future is dropped early, the handle can still be
  /// polled or awaited again. Must not be called again after it completed.
  pub async fn recv(&mut self) -> Option<PathBuf> {
    let path = (&mut self.rx).await.ok()?;
    self.token.is_current().then_some(path)
  }

  /// Check for a result without blocking.
  pub fn try_take(&mut self) -> UpgradeStatus {
    if !self.token.is_current() {
      return UpgradeStatus::Abandoned;
    }

    match self.rx.try_recv() {
      Ok(path) => UpgradeStatus::Upgraded(path),
      Err(oneshot::error::TryRecvError::Empty) => UpgradeStatus::Pending,
      Err(oneshot::error::TryRecvError::Closed) => UpgradeStatus::Abandoned,
    }
  }
}

/// Resolution policy over an image store.
///
/// Precedence, first match wins:
/// 1. A real authoritative (else legacy) candidate, returned as-is while a
///    background write caches it
/// 2. An existing cache entry
/// 3. Any candidate, even a placeholder
/// 4. The built-in default placeholder
pub struct Resolver<S: ImageStorage> {
  storage: Arc<S>,
  placeholders: PlaceholderPolicy,
}

impl<S: ImageStorage> Resolver<S> {
  pub fn new(storage: S, placeholders: PlaceholderPolicy) -> Self {
    Self::with_shared(Arc::new(storage), placeholders)
  }

  pub fn with_shared(storage: Arc<S>, placeholders: PlaceholderPolicy) -> Self {
    Self {
      storage,
      placeholders,
    }
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  pub fn placeholders(&self) -> &PlaceholderPolicy {
    &self.placeholders
  }

  /// Resolve `request` without waiting on the network.
  ///
  /// The background write is spawned on the current Tokio runtime; outside a
  /// runtime the synchronous answer is still returned, without an upgrade.
  pub fn resolve(&self, request: &ResolveRequest, token: RequestToken) -> Resolution {
    let candidates = &request.candidates;

    // The system of record always wins over a possibly stale cache entry
    if let Some(real) = candidates
      .in_order()
      .find(|url| self.placeholders.is_real_image(url))
    {
      return Resolution {
        uri: ResolvedUri::Remote(real.to_string()),
        upgrade: self.spawn_upgrade(&request.id, real, token),
      };
    }

    let uri = if let Some(path) = self.storage.read(&request.id) {
      ResolvedUri::Cached(path)
    } else if let Some(url) = candidates.in_order().next() {
      ResolvedUri::Remote(url.to_string())
    } else {
      ResolvedUri::Default(self.placeholders.default_uri().to_string())
    };

    debug!(id = %request.id, uri = %uri, "resolved without upgrade");
    Resolution { uri, upgrade: None }
  }

  fn spawn_upgrade(&self, id: &ResourceId, url: &str, token: RequestToken) -> Option<PendingUpgrade> {
    let handle = match tokio::runtime::Handle::try_current() {
      Ok(handle) => handle,
      Err(_) => {
        warn!(id = %id, "no async runtime; skipping background cache write");
        return None;
      }
    };

    let (tx, rx) = oneshot::channel();
    let storage = Arc::clone(&self.storage);
    let id = id.clone();
    let source = WriteSource::from_uri(url);
    let task_token = token.clone();

    handle.spawn(async move {
      let Some(path) = storage.write(&id, source).await else {
        debug!(id = %id, "background write failed; keeping remote uri");
        return;
      };

      if !task_token.is_current() {
        debug!(id = %id, "request superseded; upgrade notification suppressed");
        return;
      }

      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(path);
    });

    Some(PendingUpgrade { rx, token })
  }
}

impl<S: ImageStorage> Clone for Resolver<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      placeholders: self.placeholders.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::DiskStorage;
  use crate::cache::token::RequestScope;
  use std::time::Duration;
  use tempfile::TempDir;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  const PLACEHOLDER_URL: &str = "https://cdn/assets/default-course-image.jpg";

  fn resolver(dir: &TempDir) -> Resolver<DiskStorage> {
    let storage = DiskStorage::new(dir.path().join("images"), "jpg", reqwest::Client::new());
    Resolver::new(storage, PlaceholderPolicy::default())
  }

  async fn image_server(body: &[u8]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/real.jpg"))
      .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
      .mount(&server)
      .await;
    server
  }

  async fn failing_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;
    server
  }

  async fn seed(resolver: &Resolver<DiskStorage>, id: &str, bytes: &[u8]) -> PathBuf {
    resolver
      .storage()
      .write(&ResourceId::from(id), WriteSource::Bytes(bytes.to_vec()))
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn test_course_scenario() {
    let server = image_server(b"course image").await;
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let real = format!("{}/real.jpg", server.uri());

    let first = resolver.resolve(
      &ResolveRequest::new("course-42", Some(real.as_str()), None),
      RequestToken::detached(),
    );
    assert_eq!(first.uri, ResolvedUri::Remote(real.clone()));

    let upgraded = first.upgrade.unwrap().wait().await.unwrap();
    assert_eq!(upgraded, dir.path().join("images").join("course-42.jpg"));
    assert_eq!(std::fs::read(&upgraded).unwrap(), b"course image");

    let second = resolver.resolve(
      &ResolveRequest::new("course-42", None, None),
      RequestToken::detached(),
    );
    assert_eq!(second.uri, ResolvedUri::Cached(upgraded));
    assert!(second.upgrade.is_none());
  }

  #[tokio::test]
  async fn test_failed_upgrade_keeps_remote_uri() {
    let server = failing_server().await;
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let real = format!("{}/real.jpg", server.uri());

    let resolution = resolver.resolve(
      &ResolveRequest::new("course-42", Some(real.as_str()), None),
      RequestToken::detached(),
    );
    assert_eq!(resolution.uri, ResolvedUri::Remote(real));
    assert_eq!(resolution.upgrade.unwrap().wait().await, None);
    assert!(!resolver.storage().exists(&ResourceId::from("course-42")));
  }

  #[tokio::test]
  async fn test_no_candidates_no_cache_gives_default() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    let resolution = resolver.resolve(
      &ResolveRequest::new("course-1", None, None),
      RequestToken::detached(),
    );
    assert_eq!(
      resolution.uri,
      ResolvedUri::Default(resolver.placeholders().default_uri().to_string())
    );
    assert!(resolution.upgrade.is_none());
  }

  #[tokio::test]
  async fn test_cache_beats_placeholder_candidate() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let cached = seed(&resolver, "course-1", b"old").await;

    let resolution = resolver.resolve(
      &ResolveRequest::new("course-1", Some(PLACEHOLDER_URL), Some(PLACEHOLDER_URL)),
      RequestToken::detached(),
    );
    assert_eq!(resolution.uri, ResolvedUri::Cached(cached));
    assert!(resolution.upgrade.is_none());
  }

  #[tokio::test]
  async fn test_placeholder_candidate_returned_as_is() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    let resolution = resolver.resolve(
      &ResolveRequest::new("course-1", None, Some(PLACEHOLDER_URL)),
      RequestToken::detached(),
    );
    assert_eq!(resolution.uri, ResolvedUri::Remote(PLACEHOLDER_URL.to_string()));
    assert!(resolution.upgrade.is_none());
  }

  #[tokio::test]
  async fn test_authoritative_beats_stale_cache() {
    let server = image_server(b"new").await;
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let cached = seed(&resolver, "course-1", b"old").await;
    let real = format!("{}/real.jpg", server.uri());

    let resolution = resolver.resolve(
      &ResolveRequest::new("course-1", Some(real.as_str()), None),
      RequestToken::detached(),
    );
    assert_eq!(resolution.uri, ResolvedUri::Remote(real));

    assert_eq!(resolution.upgrade.unwrap().wait().await, Some(cached.clone()));
    assert_eq!(std::fs::read(cached).unwrap(), b"new");
  }

  #[tokio::test]
  async fn test_candidate_precedence() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let token = RequestToken::detached;

    let both = resolver.resolve(
      &ResolveRequest::new("c", Some("https://img/a.jpg"), Some("https://img/b.jpg")),
      token(),
    );
    assert_eq!(both.uri, ResolvedUri::Remote("https://img/a.jpg".into()));

    let legacy_only = resolver.resolve(
      &ResolveRequest::new("c", None, Some("https://img/b.jpg")),
      token(),
    );
    assert_eq!(legacy_only.uri, ResolvedUri::Remote("https://img/b.jpg".into()));

    let placeholder_authoritative = resolver.resolve(
      &ResolveRequest::new("c", Some(PLACEHOLDER_URL), Some("https://img/b.jpg")),
      token(),
    );
    assert_eq!(
      placeholder_authoritative.uri,
      ResolvedUri::Remote("https://img/b.jpg".into())
    );

    let empty_authoritative = resolver.resolve(&ResolveRequest::new("c", Some(""), None), token());
    assert!(matches!(empty_authoritative.uri, ResolvedUri::Default(_)));
  }

  #[tokio::test]
  async fn test_inline_authoritative_is_cached_decoded() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let inline = "data:image/jpeg;base64,QUJD";

    let resolution = resolver.resolve(
      &ResolveRequest::new("x", Some(inline), None),
      RequestToken::detached(),
    );
    assert_eq!(resolution.uri, ResolvedUri::Remote(inline.to_string()));

    let path = resolution.upgrade.unwrap().wait().await.unwrap();
    assert_eq!(std::fs::read(path).unwrap(), b"ABC");
  }

  #[tokio::test]
  async fn test_superseded_request_is_not_notified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_bytes(b"img".to_vec())
          .set_delay(Duration::from_millis(100)),
      )
      .mount(&server)
      .await;

    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);
    let scope = RequestScope::new();
    let real = format!("{}/real.jpg", server.uri());

    let resolution = resolver.resolve(&ResolveRequest::new("course-7", Some(real.as_str()), None), scope.issue());
    let mut upgrade = resolution.upgrade.unwrap();
    assert_eq!(upgrade.try_take(), UpgradeStatus::Pending);

    scope.invalidate();
    assert_eq!(upgrade.try_take(), UpgradeStatus::Abandoned);
    assert_eq!(upgrade.wait().await, None);

    // The write itself still completes for future callers
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(resolver.storage().exists(&ResourceId::from("course-7")));
  }

  #[test]
  fn test_resolve_outside_runtime_skips_upgrade() {
    let dir = TempDir::new().unwrap();
    let resolver = resolver(&dir);

    let resolution = resolver.resolve(
      &ResolveRequest::new("c", Some("https://img/a.jpg"), None),
      RequestToken::detached(),
    );
    assert_eq!(resolution.uri, ResolvedUri::Remote("https://img/a.jpg".into()));
    assert!(resolution.upgrade.is_none());
  }
}
