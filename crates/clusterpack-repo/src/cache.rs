//! Source cache
//!
//! Each remote is cloned at most once per cache root, into a directory named
//! after the SHA-256 of its URL. Fetches for the same URL are serialized so
//! concurrent packages sharing a repository never race on the clone or the
//! checkout; fetches of different URLs run in parallel.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use clusterpack_core::{GitSource, PackageSource, Resource, read_package};
use sha2::{Digest, Sha256};

use crate::auth::GitAuth;
use crate::error::{RepoError, Result};
use crate::git::{GitClient, LibGitClient};

/// Shared cache of cloned package sources
pub struct SourceCache {
    root: PathBuf,
    client: Arc<dyn GitClient>,
    auth: GitAuth,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    clones: AtomicUsize,
}

impl std::fmt::Debug for SourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCache")
            .field("root", &self.root)
            .field("auth", &self.auth)
            .field("clones", &self.clone_count())
            .finish_non_exhaustive()
    }
}

impl SourceCache {
    /// Cache rooted at `root` using libgit2
    pub fn new(root: impl Into<PathBuf>, auth: GitAuth) -> Self {
        Self::with_client(root, auth, Arc::new(LibGitClient::new()))
    }

    /// Cache with a custom git client
    pub fn with_client(root: impl Into<PathBuf>, auth: GitAuth, client: Arc<dyn GitClient>) -> Self {
        Self {
            root: root.into(),
            client,
            auth,
            locks: Mutex::new(HashMap::new()),
            clones: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name for a remote URL
    pub fn cache_key(repo: &str) -> String {
        hex::encode(Sha256::digest(repo.as_bytes()))
    }

    /// Number of clones performed by this cache
    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    /// Read the resources of a package source
    pub async fn fetch(&self, source: &PackageSource) -> Result<Vec<Resource>> {
        match source {
            PackageSource::Git(git) => self.fetch_git(git).await,
            PackageSource::Local(local) => {
                let dir = std::env::current_dir()?.join(&local.directory);
                tokio::task::spawn_blocking(move || read_directory(&dir)).await?
            }
        }
    }

    async fn fetch_git(&self, git: &GitSource) -> Result<Vec<Resource>> {
        self.auth.check_url(&git.repo)?;

        let key = Self::cache_key(&git.repo);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let path = self.root.join(&key);
        let client = Arc::clone(&self.client);
        let auth = self.auth.clone();
        let git = git.clone();

        let (cloned, resources) = tokio::task::spawn_blocking(move || -> Result<_> {
            let cloned = ensure_clone(client.as_ref(), &git.repo, &path, &auth)?;
            client.checkout(&git.repo, &path, &git.git_ref, &auth)?;
            let dir = path.join(git.directory.trim_start_matches('/'));
            Ok((cloned, read_directory(&dir)?))
        })
        .await??;

        if cloned {
            self.clones.fetch_add(1, Ordering::SeqCst);
        }
        Ok(resources)
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

/// Clone into `path` unless a clone is already there; returns whether it cloned
fn ensure_clone(client: &dyn GitClient, repo: &str, path: &Path, auth: &GitAuth) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {
            tracing::debug!(repo, path = %path.display(), "using cached clone");
            Ok(false)
        }
        Ok(_) => Err(RepoError::NotADirectory {
            path: path.display().to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Err(err) = client.clone_repo(repo, path, auth) {
                match std::fs::remove_dir_all(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!(
                        repo,
                        path = %path.display(),
                        error = %e,
                        "could not remove partial clone"
                    ),
                }
                return Err(err);
            }
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

fn read_directory(dir: &Path) -> Result<Vec<Resource>> {
    if !dir.is_dir() {
        return Err(RepoError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }
    Ok(read_package(dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterpack_core::{LocalSource, Node};
    use std::fs;
    use std::sync::atomic::AtomicBool;

    const KPTFILE: &str = "apiVersion: kpt.dev/v1alpha1\nkind: Kptfile\nmetadata:\n  name: pkg\n";
    const CONFIGMAP: &str = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n";

    fn write_package(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("Kptfile"), KPTFILE).unwrap();
        fs::write(dir.join("cm.yaml"), CONFIGMAP).unwrap();
    }

    #[derive(Default)]
    struct FakeClient {
        clones: AtomicUsize,
        checkouts: Mutex<Vec<String>>,
        fail: AtomicBool,
    }

    impl GitClient for FakeClient {
        fn clone_repo(&self, _repo: &str, dest: &Path, _auth: &GitAuth) -> Result<()> {
            self.clones.fetch_add(1, Ordering::SeqCst);
            write_package(&dest.join("pkgs/app"));
            if self.fail.load(Ordering::SeqCst) {
                return Err(RepoError::AuthFailed {
                    message: "denied".to_string(),
                });
            }
            Ok(())
        }

        fn checkout(&self, _repo: &str, _path: &Path, git_ref: &str, _auth: &GitAuth) -> Result<()> {
            self.checkouts.lock().unwrap().push(git_ref.to_string());
            Ok(())
        }
    }

    fn git_source(directory: &str, git_ref: &str) -> PackageSource {
        PackageSource::Git(GitSource {
            repo: "https://example.com/org/packages.git".to_string(),
            git_ref: git_ref.to_string(),
            directory: directory.to_string(),
        })
    }

    #[tokio::test]
    async fn test_clones_once_per_repo() {
        let root = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::default());
        let cache = SourceCache::with_client(root.path(), GitAuth::None, client.clone());

        let first = cache.fetch(&git_source("pkgs/app", "v1")).await.unwrap();
        let second = cache.fetch(&git_source("/pkgs/app", "v2")).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(cache.clone_count(), 1);
        assert_eq!(client.clones.load(Ordering::SeqCst), 1);
        assert_eq!(*client.checkouts.lock().unwrap(), vec!["v1", "v2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetches_share_clone() {
        let root = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::default());
        let cache = Arc::new(SourceCache::with_client(
            root.path(),
            GitAuth::None,
            client.clone(),
        ));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.fetch(&git_source("pkgs/app", "main")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(client.clones.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_directory_collision() {
        let root = tempfile::tempdir().unwrap();
        let key = SourceCache::cache_key("https://example.com/org/packages.git");
        fs::write(root.path().join(key), "not a clone").unwrap();

        let cache =
            SourceCache::with_client(root.path(), GitAuth::None, Arc::new(FakeClient::default()));
        let err = cache.fetch(&git_source("pkgs/app", "")).await.unwrap_err();

        assert!(matches!(err, RepoError::NotADirectory { .. }));
        assert!(err.to_string().starts_with("unexpected non-directory"));
    }

    #[tokio::test]
    async fn test_failed_clone_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::default());
        client.fail.store(true, Ordering::SeqCst);
        let cache = SourceCache::with_client(root.path(), GitAuth::None, client.clone());

        assert!(cache.fetch(&git_source("pkgs/app", "")).await.is_err());
        let key = SourceCache::cache_key("https://example.com/org/packages.git");
        assert!(!root.path().join(key).exists());
        assert_eq!(cache.clone_count(), 0);
    }

    /// Fails before writing anything to the destination
    struct RefusingClient;

    impl GitClient for RefusingClient {
        fn clone_repo(&self, _repo: &str, _dest: &Path, _auth: &GitAuth) -> Result<()> {
            Err(RepoError::AuthFailed {
                message: "denied".to_string(),
            })
        }

        fn checkout(&self, _repo: &str, _path: &Path, _git_ref: &str, _auth: &GitAuth) -> Result<()> {
            unreachable!("checkout after failed clone")
        }
    }

    #[tokio::test]
    async fn test_failed_clone_without_directory_keeps_clone_error() {
        let root = tempfile::tempdir().unwrap();
        let cache = SourceCache::with_client(root.path(), GitAuth::None, Arc::new(RefusingClient));

        let err = cache.fetch(&git_source("pkgs/app", "")).await.unwrap_err();
        assert!(matches!(err, RepoError::AuthFailed { .. }));
        assert_eq!(cache.clone_count(), 0);

        // the next fetch retries the clone
        let err = cache.fetch(&git_source("pkgs/app", "")).await.unwrap_err();
        assert!(matches!(err, RepoError::AuthFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let cache =
            SourceCache::with_client(root.path(), GitAuth::None, Arc::new(FakeClient::default()));

        let err = cache.fetch(&git_source("pkgs/missing", "")).await.unwrap_err();
        assert!(matches!(err, RepoError::DirectoryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejects_ssh_without_auth() {
        let root = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeClient::default());
        let cache = SourceCache::with_client(root.path(), GitAuth::None, client.clone());

        let source = PackageSource::Git(GitSource {
            repo: "git@github.com:org/packages.git".to_string(),
            git_ref: String::new(),
            directory: String::new(),
        });
        let err = cache.fetch(&source).await.unwrap_err();

        assert!(matches!(err, RepoError::InvalidRepositoryUrl { .. }));
        assert_eq!(client.clones.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_local_source() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path());
        let cache = SourceCache::new(dir.path().join("cache"), GitAuth::None);

        let source = PackageSource::Local(LocalSource {
            directory: dir.path().display().to_string(),
        });
        let resources = cache.fetch(&source).await.unwrap();

        assert_eq!(resources.len(), 2);
        assert_eq!(resources[1].path().as_deref(), Some("cm.yaml"));
        assert_eq!(cache.clone_count(), 0);
    }

    /// Commit a package whose ConfigMap carries `version`
    fn commit_package(repository: &git2::Repository, version: &str) -> git2::Oid {
        let workdir = repository.workdir().unwrap().to_path_buf();
        write_package(&workdir.join("pkg"));
        fs::write(
            workdir.join("pkg/cm.yaml"),
            format!("{}data:\n  version: {}\n", CONFIGMAP, version),
        )
        .unwrap();

        let mut index = repository.index().unwrap();
        index.add_path(Path::new("pkg/Kptfile")).unwrap();
        index.add_path(Path::new("pkg/cm.yaml")).unwrap();
        index.write().unwrap();
        let tree = repository.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = git2::Signature::now("test", "test@example.com").unwrap();
        let parents: Vec<git2::Commit> = repository
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parents: Vec<&git2::Commit> = parents.iter().collect();
        repository
            .commit(Some("HEAD"), &signature, &signature, version, &tree, &parents)
            .unwrap()
    }

    fn version(resources: &[Resource]) -> String {
        resources
            .iter()
            .find(|r| r.kind() == Some("ConfigMap"))
            .and_then(|r| {
                r.to_node()
                    .lookup(&["data", "version"])
                    .and_then(Node::as_str)
                    .map(str::to_string)
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_shared_repository_checks_out_each_ref() {
        let upstream_dir = tempfile::tempdir().unwrap();
        let upstream = git2::Repository::init(upstream_dir.path()).unwrap();
        let first = commit_package(&upstream, "one");
        upstream
            .tag_lightweight("v1", &upstream.find_object(first, None).unwrap(), false)
            .unwrap();
        commit_package(&upstream, "two");

        let root = tempfile::tempdir().unwrap();
        // file:// remotes are only accepted with credentials configured
        let cache = SourceCache::new(root.path(), GitAuth::private_key("unused"));
        let source = |git_ref: &str| {
            PackageSource::Git(GitSource {
                repo: format!("file://{}", upstream_dir.path().display()),
                git_ref: git_ref.to_string(),
                directory: "pkg".to_string(),
            })
        };

        assert_eq!(version(&cache.fetch(&source("v1")).await.unwrap()), "one");
        assert_eq!(version(&cache.fetch(&source("")).await.unwrap()), "two");
        assert_eq!(version(&cache.fetch(&source("v1")).await.unwrap()), "one");

        let (pinned, default) = (source("v1"), source(""));
        let (pinned, default) = tokio::join!(cache.fetch(&pinned), cache.fetch(&default));
        assert_eq!(version(&pinned.unwrap()), "one");
        assert_eq!(version(&default.unwrap()), "two");
        assert_eq!(cache.clone_count(), 1);
    }

    #[test]
    fn test_cache_key_is_stable() {
        let key = SourceCache::cache_key("https://example.com/a.git");
        assert_eq!(key.len(), 64);
        assert_eq!(key, SourceCache::cache_key("https://example.com/a.git"));
        assert_ne!(key, SourceCache::cache_key("https://example.com/b.git"));
    }
}
