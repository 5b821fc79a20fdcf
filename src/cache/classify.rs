//! Real-image versus placeholder classification of candidate URLs.

use super::inline;

/// Substrings that identify the baked-in default image.
pub const DEFAULT_IMAGE_MARKERS: [&str; 2] = ["default-course-image", "course_placeholder"];

/// Placeholder returned when no candidate and no cache entry exist.
pub const DEFAULT_PLACEHOLDER_URI: &str = "https://static.imgcache.local/images/default-course-image.jpg";

/// Decides which candidates point at the default image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderPolicy {
  markers: Vec<String>,
  default_uri: String,
}

impl Default for PlaceholderPolicy {
  fn default() -> Self {
    Self::new(
      DEFAULT_IMAGE_MARKERS.iter().map(|m| m.to_string()).collect(),
      DEFAULT_PLACEHOLDER_URI,
    )
  }
}

impl PlaceholderPolicy {
  pub fn new(markers: Vec<String>, default_uri: impl Into<String>) -> Self {
    Self {
      markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
      default_uri: default_uri.into(),
    }
  }

  /// The built-in default placeholder URI.
  pub fn default_uri(&self) -> &str {
    &self.default_uri
  }

  /// True if `url` contains one of the default-image markers.
  pub fn is_placeholder(&self, url: &str) -> bool {
    self.markers.iter().any(|marker| url.contains(marker.as_str()))
  }

  /// True if `url` is an inline `data:image/...;base64,` payload.
  pub fn is_inline_payload(&self, url: &str) -> bool {
    inline::is_inline_image(url)
  }

  /// An inline base64 image, or any URL that is not the default image.
  pub fn is_real_image(&self, url: &str) -> bool {
    if url.is_empty() {
      return false;
    }
    self.is_inline_payload(url) || !self.is_placeholder(url)
  }
}
