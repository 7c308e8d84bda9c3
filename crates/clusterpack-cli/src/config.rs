//! Function configuration
//!
//! `sync` takes a ConfigMap whose `data` holds string settings;
//! `render-template` and `token-replace` take a resource with a `spec`.

use std::path::PathBuf;

use clusterpack_core::{Node, Replacement};
use clusterpack_repo::{AuthMethod, DEFAULT_KEY_FILE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::error::{CliError, Result};
use crate::logging;

/// Settings of the `sync` function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub log_level: String,
    /// Cache root; a temporary directory is used when absent
    pub cache_dir: Option<PathBuf>,
    pub keep_cache: bool,
    pub auth_method: AuthMethod,
    pub git_key_secret_id: Option<String>,
    pub git_key_file: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncData {
    #[serde(default, deserialize_with = "scalar")]
    log_level: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    cache_dir: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    keep_cache: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    auth_method: Option<String>,
    #[serde(default, rename = "gitKeySecretID", deserialize_with = "scalar")]
    git_key_secret_id: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    git_key_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigMap {
    #[serde(default)]
    data: Option<SyncData>,
}

impl SyncConfig {
    pub fn from_function_config(config: Option<&Node>) -> Result<Self> {
        let data = match config {
            Some(node) => parse::<ConfigMap>(node, "sync")?.data.unwrap_or_default(),
            None => SyncData::default(),
        };

        let log_level = data
            .log_level
            .unwrap_or_else(|| logging::DEFAULT_LEVEL.to_string());
        logging::parse_level(&log_level)?;

        let auth_method = match data.auth_method.as_deref() {
            Some(method) => method
                .parse::<AuthMethod>()
                .map_err(|e| CliError::input(e.to_string()))?,
            None => AuthMethod::None,
        };

        if auth_method == AuthMethod::KeySecret && data.git_key_secret_id.is_none() {
            return Err(CliError::input(format!(
                "auth method was {} but no gitKeySecretID argument was passed",
                auth_method
            )));
        }

        let keep_cache = match data.keep_cache.as_deref() {
            Some(value) => parse_bool(value).ok_or_else(|| {
                CliError::input(format!("could not parse keepCache argument '{}'", value))
            })?,
            None => data.cache_dir.is_some(),
        };

        Ok(Self {
            log_level,
            cache_dir: data.cache_dir.map(PathBuf::from),
            keep_cache,
            auth_method,
            git_key_secret_id: data.git_key_secret_id,
            git_key_file: data
                .git_key_file
                .unwrap_or_else(|| DEFAULT_KEY_FILE.to_string()),
        })
    }
}

/// Settings of the `render-template` function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderTemplateConfig {
    /// Kptfiles whose setters form the template context
    pub kptfiles: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderTemplateResource {
    #[serde(default)]
    spec: RenderTemplateSpec,
}

#[derive(Debug, Default, Deserialize)]
struct RenderTemplateSpec {
    #[serde(default)]
    kptfiles: Vec<PathBuf>,
}

impl RenderTemplateConfig {
    pub fn from_function_config(config: Option<&Node>) -> Result<Self> {
        let resource = match config {
            Some(node) => parse::<RenderTemplateResource>(node, "render-template")?,
            None => RenderTemplateResource::default(),
        };
        Ok(Self {
            kptfiles: resource.spec.kptfiles,
        })
    }
}

/// Settings of the `token-replace` function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenReplaceConfig {
    pub replacements: Vec<Replacement>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenReplaceResource {
    #[serde(default)]
    spec: TokenReplaceSpec,
}

#[derive(Debug, Default, Deserialize)]
struct TokenReplaceSpec {
    #[serde(default)]
    replacements: Vec<Replacement>,
}

impl TokenReplaceConfig {
    pub fn from_function_config(config: Option<&Node>) -> Result<Self> {
        let resource = match config {
            Some(node) => parse::<TokenReplaceResource>(node, "token-replace")?,
            None => TokenReplaceResource::default(),
        };
        Ok(Self {
            replacements: resource.spec.replacements,
        })
    }
}

fn parse<T: DeserializeOwned>(node: &Node, function: &str) -> Result<T> {
    serde_yaml::from_value(node.to_value()).map_err(|e| {
        CliError::input(format!("invalid functionConfig for {}: {}", function, e))
    })
}

/// ConfigMap data values are strings, but unquoted YAML gives bools and numbers
fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    use serde::de::Error;
    use serde_yaml::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected a string, got {:?}", other))),
    }
}

/// Boolean spellings accepted in ConfigMap data
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
