use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{PlaceholderPolicy, DEFAULT_IMAGE_MARKERS, DEFAULT_PLACEHOLDER_URI};

/// Environment variable overriding `cache.dir`.
pub const CACHE_DIR_ENV: &str = "IMGCACHE_CACHE_DIR";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub placeholder: PlaceholderConfig,
  #[serde(default)]
  pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// When false, nothing is written to disk and every lookup misses
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Cache directory (defaults to $XDG_CACHE_HOME/imgcache/images)
  pub dir: Option<PathBuf>,
  /// File extension of cache entries, without the dot
  #[serde(default = "default_extension")]
  pub extension: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      dir: None,
      extension: default_extension(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceholderConfig {
  /// URI returned when nothing better is available
  #[serde(default = "default_placeholder_uri")]
  pub uri: String,
  /// Substrings identifying the baked-in default image
  #[serde(default = "default_markers")]
  pub markers: Vec<String>,
}

impl Default for PlaceholderConfig {
  fn default() -> Self {
    Self {
      uri: default_placeholder_uri(),
      markers: default_markers(),
    }
  }
}

impl From<&PlaceholderConfig> for PlaceholderPolicy {
  fn from(config: &PlaceholderConfig) -> Self {
    PlaceholderPolicy::new(config.markers.clone(), config.uri.clone())
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
  /// Overall request timeout for image downloads
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  pub user_agent: Option<String>,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      user_agent: None,
    }
  }
}

impl HttpConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  /// Build the HTTP client used for image downloads.
  pub fn client(&self) -> Result<reqwest::Client> {
    let user_agent = self
      .user_agent
      .clone()
      .unwrap_or_else(|| format!("imgcache/{}", env!("CARGO_PKG_VERSION")));

    reqwest::Client::builder()
      .timeout(self.timeout())
      .user_agent(user_agent)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))
  }
}

fn default_true() -> bool {
  true
}

fn default_extension() -> String {
  "jpg".to_string()
}

fn default_placeholder_uri() -> String {
  DEFAULT_PLACEHOLDER_URI.to_string()
}

fn default_markers() -> Vec<String> {
  DEFAULT_IMAGE_MARKERS.iter().map(|m| m.to_string()).collect()
}

fn default_timeout_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./imgcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/imgcache/config.yaml
  ///
  /// Unlike an explicit path, a missing default file is not an error.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("imgcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("imgcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("In config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;

    if config.cache.extension.is_empty() || config.cache.extension.contains(['.', '/', '\\']) {
      return Err(eyre!(
        "cache.extension must be a bare extension such as \"jpg\", got {:?}",
        config.cache.extension
      ));
    }

    Ok(config)
  }

  /// Resolve the cache directory.
  ///
  /// Checks IMGCACHE_CACHE_DIR first, then `cache.dir`, then the platform
  /// cache directory.
  pub fn cache_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
      return Ok(PathBuf::from(dir));
    }

    if let Some(dir) = &self.cache.dir {
      return Ok(dir.clone());
    }

    let cache_dir = dirs::cache_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
      .ok_or_else(|| eyre!("Could not determine cache directory"))?;

    Ok(cache_dir.join("imgcache").join("images"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("{}").unwrap();
    assert!(config.cache.enabled);
    assert_eq!(config.cache.extension, "jpg");
    assert_eq!(config.placeholder.uri, DEFAULT_PLACEHOLDER_URI);
    assert_eq!(config.placeholder.markers.len(), 2);
    assert_eq!(config.http.timeout(), Duration::from_secs(30));
  }

  #[test]
  fn test_partial_config() {
    let config = Config::parse(
      r#"
cache:
  enabled: false
  dir: /var/tmp/images
  extension: png
http:
  timeout_secs: 5
"#,
    )
    .unwrap();
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.dir, Some(PathBuf::from("/var/tmp/images")));
    assert_eq!(config.cache.extension, "png");
    assert_eq!(config.http.timeout_secs, 5);
    assert_eq!(config.placeholder.markers.len(), 2);
  }

  #[test]
  fn test_dotted_extension_rejected() {
    assert!(Config::parse("cache:\n  extension: .jpg\n").is_err());
  }

  #[test]
  fn test_missing_explicit_config_is_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/imgcache.yaml"))).is_err());
  }
}
