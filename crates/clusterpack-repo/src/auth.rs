//! Git authentication
//!
//! Credential material is resolved before any clone starts and handed to the
//! git transport as a [`GitAuth`] value. Key bytes are never logged.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use url::Url;

use crate::error::{RepoError, Result};

/// Environment variable naming the SSH agent socket
pub const SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";

/// Default private key location for `keyFile`
pub const DEFAULT_KEY_FILE: &str = "~/.ssh/id_rsa";

/// Auth method names accepted in function config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMethod {
    /// Anonymous HTTPS
    #[default]
    None,
    /// Private key read from a file
    KeyFile,
    /// Private key read from a secret store
    KeySecret,
    /// Keys held by a running SSH agent
    SshAgent,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::KeyFile => "keyFile",
            AuthMethod::KeySecret => "keySecret",
            AuthMethod::SshAgent => "sshAgent",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(AuthMethod::None),
            "keyFile" => Ok(AuthMethod::KeyFile),
            "keySecret" => Ok(AuthMethod::KeySecret),
            "sshAgent" => Ok(AuthMethod::SshAgent),
            other => Err(RepoError::UnsupportedAuthMethod {
                method: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved credentials for git transports
#[derive(Clone, Default)]
pub enum GitAuth {
    /// No credentials; only HTTPS remotes are allowed
    #[default]
    None,
    /// PEM-encoded private key
    PrivateKey { key: String },
    /// SSH agent listening on `socket`
    SshAgent { socket: PathBuf },
}

impl fmt::Debug for GitAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitAuth::None => f.write_str("None"),
            GitAuth::PrivateKey { .. } => f
                .debug_struct("PrivateKey")
                .field("key", &"<redacted>")
                .finish(),
            GitAuth::SshAgent { socket } => {
                f.debug_struct("SshAgent").field("socket", socket).finish()
            }
        }
    }
}

impl GitAuth {
    pub fn private_key(key: impl Into<String>) -> Self {
        GitAuth::PrivateKey { key: key.into() }
    }

    /// Read a private key file; `~` is expanded to the home directory
    pub fn key_file(path: &str) -> Result<Self> {
        let expanded = expand_home(path);
        let key = std::fs::read_to_string(&expanded).map_err(|e| RepoError::KeyFile {
            path: expanded.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::private_key(key))
    }

    /// Use the agent named by `SSH_AUTH_SOCK`
    pub fn ssh_agent_from_env() -> Result<Self> {
        match std::env::var_os(SSH_AUTH_SOCK) {
            Some(socket) if !socket.is_empty() => Ok(GitAuth::SshAgent {
                socket: PathBuf::from(socket),
            }),
            _ => Err(RepoError::SshAgentUnavailable),
        }
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            GitAuth::None => AuthMethod::None,
            GitAuth::PrivateKey { .. } => AuthMethod::KeyFile,
            GitAuth::SshAgent { .. } => AuthMethod::SshAgent,
        }
    }

    /// Reject remotes these credentials cannot reach
    ///
    /// Anonymous access is limited to `https://` URLs. SCP-style remotes
    /// (`git@host:org/repo.git`) need key or agent credentials.
    pub fn check_url(&self, repo: &str) -> Result<()> {
        let invalid = |reason: &str| RepoError::InvalidRepositoryUrl {
            url: repo.to_string(),
            reason: reason.to_string(),
        };

        match Url::parse(repo) {
            Ok(url) => match (self, url.scheme()) {
                (GitAuth::None, "https") => Ok(()),
                (GitAuth::None, scheme) => Err(invalid(&format!(
                    "scheme '{}' requires an auth method, only https is allowed without one",
                    scheme
                ))),
                (_, "https" | "ssh" | "git+ssh" | "file") => Ok(()),
                (_, scheme) => Err(invalid(&format!("unsupported scheme '{}'", scheme))),
            },
            Err(_) if is_scp_like(repo) => match self {
                GitAuth::None => Err(invalid(
                    "ssh remotes require an auth method, only https is allowed without one",
                )),
                _ => Ok(()),
            },
            Err(e) => Err(invalid(&e.to_string())),
        }
    }
}

/// `user@host:path` remotes, which are not URLs
fn is_scp_like(repo: &str) -> bool {
    match repo.split_once(':') {
        Some((host, path)) => {
            !host.is_empty() && !path.is_empty() && !host.contains('/') && !path.starts_with("//")
        }
        None => false,
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => Path::new(path).to_path_buf(),
        },
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_method_names() {
        for method in [
            AuthMethod::None,
            AuthMethod::KeyFile,
            AuthMethod::KeySecret,
            AuthMethod::SshAgent,
        ] {
            assert_eq!(method.as_str().parse::<AuthMethod>().unwrap(), method);
        }
        assert!(matches!(
            "password".parse::<AuthMethod>(),
            Err(RepoError::UnsupportedAuthMethod { .. })
        ));
    }

    #[test]
    fn test_anonymous_requires_https() {
        let auth = GitAuth::None;
        assert!(auth.check_url("https://github.com/org/repo.git").is_ok());
        assert!(auth.check_url("ssh://git@github.com/org/repo.git").is_err());
        assert!(auth.check_url("git@github.com:org/repo.git").is_err());
        assert!(auth.check_url("not a url").is_err());
    }

    #[test]
    fn test_key_allows_ssh() {
        let auth = GitAuth::private_key("-----BEGIN KEY-----");
        assert!(auth.check_url("git@github.com:org/repo.git").is_ok());
        assert!(auth.check_url("ssh://git@github.com/org/repo.git").is_ok());
        assert!(auth.check_url("ftp://example.com/repo").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let auth = GitAuth::private_key("secret-material");
        let debug = format!("{:?}", auth);
        assert!(!debug.contains("secret-material"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_key_file_missing() {
        let err = GitAuth::key_file("/nonexistent/clusterpack/id_rsa").unwrap_err();
        assert!(matches!(err, RepoError::KeyFile { .. }));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/key"), PathBuf::from("/abs/key"));
        assert_eq!(expand_home("~user/key"), PathBuf::from("~user/key"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.ssh/id_rsa"), home.join(".ssh/id_rsa"));
        }
    }
}
