//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    // ============ Resource Errors ============
    #[error("Invalid resource: {message}")]
    InvalidResource { message: String },

    #[error("Invalid ResourceList: {message}")]
    InvalidResourceList { message: String },

    #[error("Resource {resource} has no config.kubernetes.io/path annotation")]
    MissingPathAnnotation { resource: String },

    // ============ Descriptor Errors ============
    #[error("Invalid ClusterPackages descriptor: {message}")]
    InvalidDescriptor { message: String },

    // ============ Setter Errors ============
    #[error("missing x-k8s-cli.setter for {key}")]
    MalformedSetter { key: String },

    #[error("Invalid setter {name}: {message}")]
    InvalidSetter { name: String, message: String },

    #[error("Setter {name} has value '{value}' which is not one of its enumValues")]
    UnknownEnumValue { name: String, value: String },

    #[error("Setter not found: {name}")]
    SetterNotFound { name: String },

    // ============ Package Errors ============
    #[error("Package directory not found: {path}")]
    PackageNotFound { path: String },

    #[error("expected a single Kptfile in package but got {count}")]
    ManifestCount { count: usize },

    #[error("Failed to read {path}: {message}")]
    InvalidPackageFile { path: String, message: String },

    // ============ Hash Errors ============
    #[error("failed to parse hash target. Expected <kind>/<name>, got {value}")]
    MalformedHashReference { value: String },

    #[error(
        "wrong number of matches for hash selector {reference} in namespace '{namespace}'. Expected 1, got 0"
    )]
    MissingHashDependency { reference: String, namespace: String },

    #[error(
        "wrong number of matches for hash selector {reference} in namespace '{namespace}'. Expected 1, got {count}"
    )]
    AmbiguousHashDependency {
        reference: String,
        namespace: String,
        count: usize,
    },

    #[error("hash dependency cycle between {resources}")]
    HashDependencyCycle { resources: String },

    // ============ Serialization Errors ============
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
