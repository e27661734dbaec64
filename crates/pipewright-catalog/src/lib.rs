//! Pipewright Catalog
//!
//! The runtime catalog maps a runtime name to an executable artifact plus
//! its metadata. Names form a small index over a content-addressed artifact
//! store: registering is an append or update of that index, and the host
//! only ever loads and invokes what the catalog hands out.

mod catalog;
mod entry;
mod error;
mod fs_catalog;
mod usage;

pub use catalog::{ArtifactHandle, RuntimeCatalog};
pub use entry::{CatalogEntry, NewEntry, RuntimeSource, validate_name};
pub use error::CatalogError;
pub use fs_catalog::FsCatalog;
pub use pipewright_artifact::ArtifactDigest;
pub use usage::{UsageGuard, UsageTracker};
