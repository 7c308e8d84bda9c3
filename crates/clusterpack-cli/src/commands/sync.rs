//! Sync command - expand ClusterPackages into package resources

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clusterpack_repo::{AuthMethod, AwsCliSecretStore, GitAuth, SourceCache, key_from_secret};
use clusterpack_sync::Composer;
use tempfile::TempDir;

use crate::config::SyncConfig;
use crate::error::{CliError, Result};
use crate::{io, logging};

pub async fn run(input: Option<&Path>) -> Result<()> {
    let mut list = io::read_resource_list(input)?;
    let config = SyncConfig::from_function_config(list.function_config.as_ref())?;
    logging::init(&config.log_level)?;

    let auth = resolve_auth(&config).await?;
    let cache = CacheDir::create(&config)?;
    tracing::debug!(
        cache = %cache.path().display(),
        auth = %config.auth_method,
        "starting sync"
    );

    let composer = Composer::new(Arc::new(SourceCache::new(cache.path(), auth)))
        .with_span(tracing::info_span!("sync"));
    let result = composer.expand(std::mem::take(&mut list.items)).await;
    cache.finish();

    list.items = result?;
    io::write_resource_list(&list)
}

async fn resolve_auth(config: &SyncConfig) -> Result<GitAuth> {
    let auth = match config.auth_method {
        AuthMethod::None => GitAuth::None,
        AuthMethod::KeyFile => {
            tracing::info!(path = %config.git_key_file, "using git key file");
            GitAuth::key_file(&config.git_key_file)?
        }
        AuthMethod::KeySecret => {
            let secret_id = config.git_key_secret_id.as_deref().ok_or_else(|| {
                CliError::input("auth method was keySecret but no gitKeySecretID argument was passed")
            })?;
            key_from_secret(&AwsCliSecretStore::new(), secret_id).await?
        }
        AuthMethod::SshAgent => GitAuth::ssh_agent_from_env()?,
    };
    Ok(auth)
}

/// Cache root for one run, removed afterwards unless kept
struct CacheDir {
    path: PathBuf,
    keep: bool,
    temp: Option<TempDir>,
}

impl CacheDir {
    fn create(config: &SyncConfig) -> Result<Self> {
        match &config.cache_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| CliError::Io {
                    message: format!("could not create cache directory {}: {}", dir.display(), e),
                })?;
                Ok(Self {
                    path: dir.clone(),
                    keep: config.keep_cache,
                    temp: None,
                })
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("clusterpack-")
                    .tempdir()
                    .map_err(|e| CliError::Io {
                        message: format!("could not create temporary cache directory: {}", e),
                    })?;
                Ok(Self {
                    path: temp.path().to_path_buf(),
                    keep: config.keep_cache,
                    temp: Some(temp),
                })
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn finish(self) {
        if self.keep {
            if let Some(temp) = self.temp {
                let path = temp.keep();
                tracing::info!(cache = %path.display(), "keeping cache directory");
            }
            return;
        }

        let removed = match self.temp {
            Some(temp) => temp.close(),
            None => std::fs::remove_dir_all(&self.path),
        };
        if let Err(e) = removed {
            tracing::warn!(cache = %self.path.display(), error = %e, "could not delete cache directory");
        }
    }
}
