//! Offline-capable cache for remotely sourced images.
//!
//! This module provides:
//! - A filesystem store keyed by resource id, with all-or-nothing writes
//!   from raw bytes, inline base64 payloads, or remote URLs
//! - A resolution policy that answers synchronously and upgrades to the
//!   cached file in the background
//! - Request tokens so a superseded or torn-down consumer is never notified

mod classify;
mod error;
mod inline;
mod layer;
mod storage;
mod token;
mod traits;

pub use classify::{PlaceholderPolicy, DEFAULT_IMAGE_MARKERS, DEFAULT_PLACEHOLDER_URI};
pub use error::CacheError;
pub use layer::{PendingUpgrade, Resolution, ResolveRequest, Resolver, UpgradeStatus};
pub use storage::{DiskStorage, ImageStorage, NoopStorage};
pub use token::{RequestScope, RequestToken};
pub use traits::{Candidates, ResolvedUri, ResourceId, WriteSource};
