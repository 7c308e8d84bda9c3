//! CLI error types with exit code handling

use clusterpack_core::CoreError;
use clusterpack_engine::EngineError;
use clusterpack_repo::RepoError;
use clusterpack_sync::{Stage, SyncError};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI error type that carries its exit code
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// ResourceList, function config or descriptor is malformed
    #[error("Invalid input: {message}")]
    #[diagnostic(code(clusterpack::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Template rendering failed
    #[error("Template error: {message}")]
    #[diagnostic(code(clusterpack::cli::template))]
    Template { message: String },

    /// Manifest, override or relabel failure
    #[error("Package error: {message}")]
    #[diagnostic(code(clusterpack::cli::package))]
    Package { message: String },

    /// Clone, checkout or credential failure
    #[error("Source error: {message}")]
    #[diagnostic(code(clusterpack::cli::source))]
    Source { message: String },

    /// Hash dependency resolution failed
    #[error("Hash dependency error: {message}")]
    #[diagnostic(
        code(clusterpack::cli::hash_dependency),
        help("references take the form <kind>/<name> and must match exactly one resource in the same namespace")
    )]
    Dependency { message: String },

    /// IO error (file not found, permissions, closed pipe)
    #[error("IO error: {message}")]
    #[diagnostic(code(clusterpack::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(clusterpack::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Package { .. } => exit_codes::PACKAGE_ERROR,
            CliError::Source { .. } => exit_codes::SOURCE_ERROR,
            CliError::Dependency { .. } => exit_codes::DEPENDENCY_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn template(err: EngineError) -> Self {
        Self::Template {
            message: err.to_string(),
        }
    }

    pub fn package(err: CoreError) -> Self {
        Self::Package {
            message: err.to_string(),
        }
    }

    pub fn dependency(err: CoreError) -> Self {
        Self::Dependency {
            message: err.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        CliError::Source {
            message: err.to_string(),
        }
    }
}

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        match err.stage() {
            Some(Stage::Descriptor) => CliError::input(message),
            Some(Stage::Fetch) => CliError::Source { message },
            Some(Stage::Render) => CliError::Template { message },
            Some(Stage::Override | Stage::Relabel) => CliError::Package { message },
            None => CliError::internal(message),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
