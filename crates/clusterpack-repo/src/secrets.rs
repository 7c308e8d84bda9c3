//! Private keys held in a secret store
//!
//! The `keySecret` auth method reads the key through the AWS CLI so that the
//! usual credential chain (profiles, instance roles, SSO) applies.

use async_trait::async_trait;
use tokio::process::Command;

use crate::auth::GitAuth;
use crate::error::{RepoError, Result};

/// A store that resolves a secret id to its string value
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, secret_id: &str) -> Result<String>;
}

/// AWS Secrets Manager through the `aws` command line tool
#[derive(Debug, Clone)]
pub struct AwsCliSecretStore {
    program: String,
}

impl Default for AwsCliSecretStore {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
        }
    }
}

impl AwsCliSecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different executable
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl SecretStore for AwsCliSecretStore {
    async fn get_secret(&self, secret_id: &str) -> Result<String> {
        let failed = |message: String| RepoError::Secret {
            secret_id: secret_id.to_string(),
            message,
        };

        tracing::debug!(secret_id, "retrieving git key from secrets manager");
        let output = Command::new(&self.program)
            .args([
                "secretsmanager",
                "get-secret-value",
                "--secret-id",
                secret_id,
                "--query",
                "SecretString",
                "--output",
                "text",
            ])
            .output()
            .await
            .map_err(|e| failed(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(failed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        let secret = String::from_utf8(output.stdout)
            .map_err(|e| failed(e.to_string()))?
            .trim_end_matches(['\r', '\n'])
            .to_string();
        if secret.is_empty() {
            return Err(failed("secret is empty".to_string()));
        }
        Ok(secret)
    }
}

/// Resolve a private key stored under `secret_id`
pub async fn key_from_secret(store: &dyn SecretStore, secret_id: &str) -> Result<GitAuth> {
    let key = store.get_secret(secret_id).await?;
    Ok(GitAuth::private_key(ensure_trailing_newline(key)))
}

/// PEM keys end with a newline
fn ensure_trailing_newline(mut key: String) -> String {
    if !key.ends_with('\n') {
        key.push('\n');
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticStore(&'static str);

    #[async_trait]
    impl SecretStore for StaticStore {
        async fn get_secret(&self, _secret_id: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_key_from_secret() {
        let auth = key_from_secret(&StaticStore("-----BEGIN KEY-----"), "git-key")
            .await
            .unwrap();
        match auth {
            GitAuth::PrivateKey { key } => assert_eq!(key, "-----BEGIN KEY-----\n"),
            other => panic!("unexpected auth: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let store = AwsCliSecretStore::with_program("/nonexistent/clusterpack-aws");
        let err = store.get_secret("git-key").await.unwrap_err();
        assert!(matches!(err, RepoError::Secret { ref secret_id, .. } if secret_id == "git-key"));
    }
}
