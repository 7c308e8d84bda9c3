//! Clusterpack Sync - ClusterPackages composition
//!
//! Expands a `ClusterPackages` descriptor into the resources of its packages:
//! each package is fetched, overridden with cluster and package variables,
//! rendered and relabeled under `{baseDir}/{package}`.

pub mod composer;
pub mod error;

pub use composer::Composer;
pub use error::{Result, Stage, StageError, SyncError};
