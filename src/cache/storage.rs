//! Image storage trait and on-disk implementation.

use color_eyre::Result;
use reqwest::Client;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use super::error::{self, CacheError};
use super::inline;
use super::traits::{ResourceId, WriteSource};
use crate::config::Config;

/// Trait for image storage backends.
///
/// Every operation absorbs its own failures: lookups report absence, writes
/// report `None`, removals are no-ops.
pub trait ImageStorage: Send + Sync + 'static {
  /// Location of the entry for `id`. Pure, no I/O.
  fn path_for(&self, id: &ResourceId) -> PathBuf;

  /// Whether a complete entry exists. Any I/O error reads as `false`.
  fn exists(&self, id: &ResourceId) -> bool;

  /// Path of the entry, only if it exists.
  fn read(&self, id: &ResourceId) -> Option<PathBuf>;

  /// Store `source` as the entry for `id`, all-or-nothing.
  fn write(
    &self,
    id: &ResourceId,
    source: WriteSource,
  ) -> impl Future<Output = Option<PathBuf>> + Send;

  /// Remove the entry for `id`. Idempotent.
  fn delete(&self, id: &ResourceId) -> impl Future<Output = ()> + Send;

  /// Remove every entry and the cache directory itself. Idempotent.
  fn clear(&self) -> impl Future<Output = ()> + Send;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
#[derive(Debug, Clone, Default)]
pub struct NoopStorage;

impl ImageStorage for NoopStorage {
  fn path_for(&self, id: &ResourceId) -> PathBuf {
    PathBuf::from(id.as_str())
  }

  fn exists(&self, _id: &ResourceId) -> bool {
    false // Always miss
  }

  fn read(&self, _id: &ResourceId) -> Option<PathBuf> {
    None
  }

  async fn write(&self, _id: &ResourceId, _source: WriteSource) -> Option<PathBuf> {
    None // Discard
  }

  async fn delete(&self, _id: &ResourceId) {}

  async fn clear(&self) {}
}

/// Filesystem-backed store: one `<root>/<id>.<ext>` file per entry and
/// nothing else. Presence of the file is the entry.
///
/// Writes land in a hidden temp file next to the target and are renamed into
/// place, so readers see either the previous entry or the complete new one.
/// Concurrent writers to the same id are last-writer-wins.
#[derive(Debug, Clone)]
pub struct DiskStorage {
  root: PathBuf,
  extension: String,
  client: Client,
}

impl DiskStorage {
  /// Create a store at the configured location.
  ///
  /// Removes every leftover temp file in the cache directory, including those
  /// of another process writing to the same directory at the same moment.
  pub fn open(config: &Config) -> Result<Self> {
    let root = config.cache_dir()?;
    let client = config.http.client()?;
    let storage = Self::new(root, &config.cache.extension, client);
    storage.sweep_temp_files();

    debug!(root = %storage.root.display(), "opened image cache");
    Ok(storage)
  }

  pub fn new(root: impl Into<PathBuf>, extension: &str, client: Client) -> Self {
    Self {
      root: root.into(),
      extension: extension.trim_start_matches('.').to_string(),
      client,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  async fn try_write(&self, id: &ResourceId, source: WriteSource) -> error::Result<PathBuf> {
    tokio::fs::create_dir_all(&self.root)
      .await
      .map_err(|e| CacheError::storage(format!("creating {}", self.root.display()), e))?;

    let target = self.path_for(id);
    match source {
      WriteSource::Bytes(bytes) => self.persist_bytes(id, &target, &bytes).await?,
      WriteSource::Inline(uri) => {
        let bytes = inline::decode(&uri)?;
        self.persist_bytes(id, &target, &bytes).await?
      }
      WriteSource::Remote(url) => self.fetch_into(id, &target, &url).await?,
    }

    Ok(target)
  }

  async fn persist_bytes(&self, id: &ResourceId, target: &Path, bytes: &[u8]) -> error::Result<()> {
    let (file, temp_path) = self.temp_file(id)?.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    file
      .write_all(bytes)
      .await
      .map_err(|e| CacheError::storage("writing temp file", e))?;
    finish(file, temp_path, target).await
  }

  /// GET `url` and stream the body into the entry. Nothing is written unless
  /// the response status is a success.
  async fn fetch_into(&self, id: &ResourceId, target: &Path, url: &str) -> error::Result<()> {
    let parsed =
      Url::parse(url).map_err(|e| CacheError::Transfer(format!("invalid url {}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
      return Err(CacheError::Transfer(format!(
        "unsupported scheme {:?} in {}",
        parsed.scheme(),
        url
      )));
    }

    let mut response = self
      .client
      .get(parsed)
      .send()
      .await
      .map_err(|e| CacheError::Transfer(format!("GET {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
      return Err(CacheError::Transfer(format!("GET {} returned {}", url, status)));
    }

    let (file, temp_path) = self.temp_file(id)?.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    // Dropping temp_path on any early return removes the partial file
    while let Some(chunk) = response
      .chunk()
      .await
      .map_err(|e| CacheError::Transfer(format!("reading body of {}: {}", url, e)))?
    {
      file
        .write_all(&chunk)
        .await
        .map_err(|e| CacheError::storage("writing temp file", e))?;
    }

    finish(file, temp_path, target).await
  }

  fn temp_file(&self, id: &ResourceId) -> error::Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
      .prefix(&format!(".{}.", id))
      .suffix(TEMP_SUFFIX)
      .tempfile_in(&self.root)
      .map_err(|e| CacheError::storage(format!("creating temp file in {}", self.root.display()), e))
  }

  /// Remove temp files left behind by an interrupted process.
  fn sweep_temp_files(&self) {
    let entries = match std::fs::read_dir(&self.root) {
      Ok(entries) => entries,
      Err(_) => return, // Nothing cached yet
    };

    for entry in entries.flatten() {
      let name = entry.file_name();
      let name = name.to_string_lossy();
      if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
        if let Err(e) = std::fs::remove_file(entry.path()) {
          debug!(path = %entry.path().display(), error = %e, "could not remove stale temp file");
        }
      }
    }
  }
}

const TEMP_SUFFIX: &str = ".tmp";

/// Flush the temp file and rename it over `target`.
async fn finish(
  mut file: tokio::fs::File,
  temp_path: tempfile::TempPath,
  target: &Path,
) -> error::Result<()> {
  file
    .flush()
    .await
    .map_err(|e| CacheError::storage("flushing temp file", e))?;
  file
    .sync_all()
    .await
    .map_err(|e| CacheError::storage("syncing temp file", e))?;
  drop(file);

  temp_path
    .persist(target)
    .map_err(|e| CacheError::storage(format!("renaming into {}", target.display()), e.error))?;
  Ok(())
}

impl ImageStorage for DiskStorage {
  fn path_for(&self, id: &ResourceId) -> PathBuf {
    self.root.join(format!("{}.{}", id, self.extension))
  }

  fn exists(&self, id: &ResourceId) -> bool {
    let path = self.path_for(id);
    match std::fs::metadata(&path) {
      Ok(meta) => meta.is_file(),
      Err(e) if e.kind() == ErrorKind::NotFound => false,
      Err(e) => {
        debug!(id = %id, path = %path.display(), error = %e, "existence check failed");
        false
      }
    }
  }

  fn read(&self, id: &ResourceId) -> Option<PathBuf> {
    self.exists(id).then(|| self.path_for(id))
  }

  async fn write(&self, id: &ResourceId, source: WriteSource) -> Option<PathBuf> {
    let kind = source.kind();
    match self.try_write(id, source).await {
      Ok(path) => {
        info!(id = %id, source = kind, path = %path.display(), "cached image");
        Some(path)
      }
      Err(e) => {
        e.log(id);
        None
      }
    }
  }

  async fn delete(&self, id: &ResourceId) {
    let path = self.path_for(id);
    match tokio::fs::remove_file(&path).await {
      Ok(()) => debug!(id = %id, "removed cached image"),
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => CacheError::storage(format!("removing {}", path.display()), e).log(id),
    }
  }

  async fn clear(&self) {
    match tokio::fs::remove_dir_all(&self.root).await {
      Ok(()) => info!(root = %self.root.display(), "cleared image cache"),
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => warn!(root = %self.root.display(), kind = "storage", error = %e, "failed to clear image cache"),
    }
  }
}
