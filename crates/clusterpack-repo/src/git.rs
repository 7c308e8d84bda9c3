//! Git transport
//!
//! [`GitClient`] is the seam between the source cache and git. The
//! production [`LibGitClient`] uses libgit2; methods block and are run on the
//! blocking thread pool by the cache.

use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, CredentialType, FetchOptions, Object, RemoteCallbacks, Repository};

use crate::auth::GitAuth;
use crate::error::{RepoError, Result};

/// Maximum credential callback invocations before giving up
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Ref recording the commit the remote's default branch pointed at when cloned
pub const DEFAULT_BRANCH_REF: &str = "refs/clusterpack/default";

/// Clone and checkout operations used by the source cache
pub trait GitClient: Send + Sync {
    /// Clone `repo` into the (absent) directory `dest`
    fn clone_repo(&self, repo: &str, dest: &Path, auth: &GitAuth) -> Result<()>;

    /// Check out `git_ref` in the clone at `path`, detaching HEAD
    ///
    /// An empty ref checks out the remote's default branch as recorded at
    /// clone time, whatever an earlier checkout left in the working tree.
    fn checkout(&self, repo: &str, path: &Path, git_ref: &str, auth: &GitAuth) -> Result<()>;
}

/// libgit2-backed client
#[derive(Debug, Clone, Copy, Default)]
pub struct LibGitClient;

impl LibGitClient {
    pub fn new() -> Self {
        Self
    }
}

impl GitClient for LibGitClient {
    fn clone_repo(&self, repo: &str, dest: &Path, auth: &GitAuth) -> Result<()> {
        tracing::info!(repo, dest = %dest.display(), "cloning repository");
        let repository = RepoBuilder::new()
            .fetch_options(fetch_options(auth))
            .clone(repo, dest)
            .map_err(|e| RepoError::git("clone", repo, e))?;

        // An empty upstream has no HEAD commit to record
        if let Ok(commit) = repository.head().and_then(|head| head.peel_to_commit()) {
            repository
                .reference(
                    DEFAULT_BRANCH_REF,
                    commit.id(),
                    true,
                    "clusterpack: default branch",
                )
                .map_err(|e| RepoError::git("clone", repo, e))?;
        }
        Ok(())
    }

    fn checkout(&self, repo: &str, path: &Path, git_ref: &str, auth: &GitAuth) -> Result<()> {
        let repository = Repository::open(path).map_err(|e| RepoError::git("open", repo, e))?;

        if git_ref.is_empty() {
            let object = resolve_default(&repository).ok_or_else(|| RepoError::RefNotFound {
                repo: repo.to_string(),
                git_ref: "default branch".to_string(),
            })?;
            return checkout_detached(&repository, repo, &object, "default branch");
        }

        let object = match resolve_ref(&repository, git_ref) {
            Some(object) => object,
            None => {
                tracing::debug!(repo, git_ref, "ref not found locally, fetching origin");
                let mut remote = repository
                    .find_remote("origin")
                    .map_err(|e| RepoError::git("fetch", repo, e))?;
                remote
                    .fetch(
                        &[
                            "+refs/heads/*:refs/remotes/origin/*",
                            "+refs/tags/*:refs/tags/*",
                        ],
                        Some(&mut fetch_options(auth)),
                        None,
                    )
                    .map_err(|e| RepoError::git("fetch", repo, e))?;
                resolve_ref(&repository, git_ref).ok_or_else(|| RepoError::RefNotFound {
                    repo: repo.to_string(),
                    git_ref: git_ref.to_string(),
                })?
            }
        };

        checkout_detached(&repository, repo, &object, git_ref)
    }
}

fn checkout_detached(
    repository: &Repository,
    repo: &str,
    object: &Object<'_>,
    git_ref: &str,
) -> Result<()> {
    let mut builder = CheckoutBuilder::new();
    builder.force();
    repository
        .checkout_tree(object, Some(&mut builder))
        .map_err(|e| RepoError::git("checkout", repo, e))?;
    repository
        .set_head_detached(object.id())
        .map_err(|e| RepoError::git("checkout", repo, e))?;

    tracing::debug!(repo, git_ref, commit = %object.id(), "checked out ref");
    Ok(())
}

/// Resolve a ref as a remote branch, then as a tag, then as given
///
/// A local branch left in a reused clone never shadows a fetched remote branch.
fn resolve_ref<'r>(repository: &'r Repository, git_ref: &str) -> Option<Object<'r>> {
    let candidates = [
        format!("origin/{}", git_ref),
        format!("refs/tags/{}", git_ref),
        git_ref.to_string(),
    ];
    resolve_first(repository, &candidates)
}

/// The recorded default branch, or the remote HEAD for clones made without one
fn resolve_default(repository: &Repository) -> Option<Object<'_>> {
    resolve_first(
        repository,
        &[DEFAULT_BRANCH_REF.to_string(), "refs/remotes/origin/HEAD".to_string()],
    )
}

fn resolve_first<'r>(repository: &'r Repository, candidates: &[String]) -> Option<Object<'r>> {
    candidates.iter().find_map(|candidate| {
        repository
            .revparse_single(candidate)
            .and_then(|object| object.peel_to_commit())
            .map(|commit| commit.into_object())
            .ok()
    })
}

fn fetch_options(auth: &GitAuth) -> FetchOptions<'static> {
    let auth = auth.clone();
    let mut attempts = 0;

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |_url, username, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed"));
        }

        let user = username.unwrap_or("git");
        if allowed.contains(CredentialType::USERNAME) {
            return Cred::username(user);
        }
        match &auth {
            GitAuth::None => Err(git2::Error::from_str(
                "remote requires credentials but auth method is none",
            )),
            GitAuth::PrivateKey { key } => Cred::ssh_key_from_memory(user, None, key, None),
            GitAuth::SshAgent { .. } => Cred::ssh_key_from_agent(user),
        }
    });

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}
