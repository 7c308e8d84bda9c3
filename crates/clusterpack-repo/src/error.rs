//! Error types for source operations

use clusterpack_core::CoreError;
use thiserror::Error;

/// Source fetch errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("Unsupported auth method '{method}': expected one of none, keyFile, keySecret, sshAgent")]
    UnsupportedAuthMethod { method: String },

    // ============ Authentication Errors ============
    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("SSH agent requested but SSH_AUTH_SOCK is not set")]
    SshAgentUnavailable,

    #[error("Failed to read private key {path}: {message}")]
    KeyFile { path: String, message: String },

    #[error("Failed to retrieve secret {secret_id}: {message}")]
    Secret { secret_id: String, message: String },

    // ============ Git Errors ============
    #[error("git {operation} failed for {repo}: {message}")]
    Git {
        operation: &'static str,
        repo: String,
        message: String,
    },

    #[error("Ref '{git_ref}' not found in {repo}")]
    RefNotFound { repo: String, git_ref: String },

    // ============ Cache Errors ============
    #[error("unexpected non-directory {path} exists")]
    NotADirectory { path: String },

    #[error("Package directory not found: {path}")]
    DirectoryNotFound { path: String },

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for source operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    pub(crate) fn git(operation: &'static str, repo: &str, err: git2::Error) -> Self {
        RepoError::Git {
            operation,
            repo: repo.to_string(),
            message: err.message().to_string(),
        }
    }
}
