//! Clusterpack Repo - Package sources and git authentication
//!
//! This crate provides:
//! - `SourceCache`: clone-once cache of git package sources
//! - `GitClient` / `LibGitClient`: the git transport
//! - `GitAuth` / `AuthMethod`: credential resolution for git remotes
//! - `SecretStore`: private keys held in AWS Secrets Manager

pub mod auth;
pub mod cache;
pub mod error;
pub mod git;
pub mod secrets;

pub use auth::{AuthMethod, DEFAULT_KEY_FILE, GitAuth};
pub use cache::SourceCache;
pub use error::{RepoError, Result};
pub use git::{GitClient, LibGitClient};
pub use secrets::{AwsCliSecretStore, SecretStore, key_from_secret};
