//! Error types for package composition

use std::fmt;

use clusterpack_core::CoreError;
use clusterpack_engine::EngineError;
use clusterpack_repo::RepoError;
use thiserror::Error;

/// Result type for composition
pub type Result<T> = std::result::Result<T, SyncError>;

/// Pipeline stage a package failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Descriptor,
    Fetch,
    Override,
    Render,
    Relabel,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Descriptor => "descriptor",
            Stage::Fetch => "fetch",
            Stage::Override => "override",
            Stage::Render => "render",
            Stage::Relabel => "relabel",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composition errors
#[derive(Debug, Error)]
pub enum SyncError {
    // ============ Descriptor Errors ============
    #[error(transparent)]
    Descriptor(CoreError),

    #[error("expected at most one ClusterPackages resource but got {count}")]
    DescriptorCount { count: usize },

    // ============ Package Errors ============
    #[error("package {package}: {stage} failed: {source}")]
    Package {
        package: String,
        stage: Stage,
        #[source]
        source: StageError,
    },

    #[error("package task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The underlying failure of a pipeline stage
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl SyncError {
    /// Name of the failing package, if the error belongs to one
    pub fn package(&self) -> Option<&str> {
        match self {
            SyncError::Package { package, .. } => Some(package),
            _ => None,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            SyncError::Package { stage, .. } => Some(*stage),
            SyncError::Descriptor(_) | SyncError::DescriptorCount { .. } => Some(Stage::Descriptor),
            SyncError::Join(_) => None,
        }
    }
}

/// Wrap a stage failure with its package and stage
pub(crate) fn at<E: Into<StageError>>(package: &str, stage: Stage) -> impl FnOnce(E) -> SyncError {
    move |err| SyncError::Package {
        package: package.to_string(),
        stage,
        source: err.into(),
    }
}
