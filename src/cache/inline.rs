//! Inline `data:<mime>;base64,<payload>` payloads.

use base64::prelude::{Engine as _, BASE64_STANDARD};

use super::error::{CacheError, Result};

const DATA_PREFIX: &str = "data:";
const BASE64_SUFFIX: &str = ";base64";

/// True if `uri` is an inline data payload.
pub fn is_inline(uri: &str) -> bool {
  uri.starts_with(DATA_PREFIX)
}

/// True if `uri` is a base64 inline image payload (`data:image/...;base64,`).
pub fn is_inline_image(uri: &str) -> bool {
  match split(uri) {
    Some((mime, _)) => mime.starts_with("image/"),
    None => false,
  }
}

/// Decode the payload segment of an inline URI.
pub fn decode(uri: &str) -> Result<Vec<u8>> {
  if !is_inline(uri) {
    return Err(CacheError::Decode("missing data: prefix".to_string()));
  }
  let (_, payload) = split(uri)
    .ok_or_else(|| CacheError::Decode("expected data:<mime>;base64,<payload>".to_string()))?;

  BASE64_STANDARD
    .decode(payload)
    .map_err(|e| CacheError::Decode(format!("invalid base64 payload: {}", e)))
}

/// Split into (mime, payload). Only base64 encoded payloads are accepted.
fn split(uri: &str) -> Option<(&str, &str)> {
  let rest = uri.strip_prefix(DATA_PREFIX)?;
  let (header, payload) = rest.split_once(',')?;
  let mime = header.strip_suffix(BASE64_SUFFIX)?;
  Some((mime, payload))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_decode_jpeg_payload() {
    assert_eq!(decode("data:image/jpeg;base64,QUJD").unwrap(), b"ABC");
  }

  #[test]
  fn test_decode_rejects_plain_data_uri() {
    let err = decode("data:text/plain,hello").unwrap_err();
    assert_eq!(err.kind(), "decode");
  }

  #[test]
  fn test_decode_rejects_bad_base64() {
    let err = decode("data:image/png;base64,not*base64").unwrap_err();
    assert_eq!(err.kind(), "decode");
  }

  #[test]
  fn test_inline_image_detection() {
    assert!(is_inline_image("data:image/png;base64,QUJD"));
    assert!(!is_inline_image("data:text/plain;base64,QUJD"));
    assert!(!is_inline_image("https://img/real.jpg"));
  }
}
