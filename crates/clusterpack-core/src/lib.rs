//! Clusterpack Core - Resource model for cluster package composition
//!
//! This crate provides the foundational types used throughout clusterpack:
//! - `Node` / `Resource`: ordered resource trees with parsed `$kpt-*` markers
//! - `ResourceList`: the kpt function input/output envelope
//! - `ClusterPackages`: the cluster composition descriptor
//! - `Kptfile`: package manifest and setter schema
//! - `LoadedPackage`: a package directory read from disk
//! - `propagate_hashes`, `relabel`, `replace_tokens`: resource stream transforms

pub mod annotations;
pub mod descriptor;
pub mod error;
pub mod hash;
pub mod kptfile;
pub mod node;
pub mod package;
pub mod path;
pub mod resource;
pub mod token;

pub use descriptor::{
    ClusterPackages, GitSource, LocalSource, Package, PackageSource, Variable, VariableValue,
};
pub use error::{CoreError, Result};
pub use hash::{HashTarget, propagate_hashes};
pub use kptfile::{Kptfile, SetBy, SetterDefinition, SetterType, SetterValue, is_kptfile};
pub use node::{Mapping, Markers, Node, Tagged};
pub use package::{LoadedPackage, read_package};
pub use path::relabel;
pub use resource::{Resource, ResourceId, ResourceList};
pub use token::{Replacement, replace_tokens};
