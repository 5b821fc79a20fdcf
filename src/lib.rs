//! Local image cache with a source-of-truth resolution policy.

pub mod cache;
pub mod config;
pub mod logging;
pub mod query;

pub use cache::{
  DiskStorage, ImageStorage, NoopStorage, PlaceholderPolicy, ResolveRequest, ResolvedUri,
  Resolver, ResourceId, WriteSource,
};
pub use config::Config;
pub use query::ImageQuery;

