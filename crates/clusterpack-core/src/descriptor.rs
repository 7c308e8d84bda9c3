//! ClusterPackages descriptor
//!
//! The descriptor names the packages making up a cluster together with the
//! cluster-wide and per-package setter overrides:
//!
//! ```yaml
//! apiVersion: kpt.seek.com/v1alpha1
//! kind: ClusterPackages
//! metadata:
//!   name: cluster
//! spec:
//!   baseDir: packages
//!   variables:
//!   - name: region
//!     value: ap-southeast-2
//!   packages:
//!   - name: ingress
//!     git:
//!       repo: https://github.com/example/packages
//!       ref: v1.2.0
//!       directory: ingress
//!     variables:
//!     - name: hosts
//!       listValues: [a.example.com, b.example.com]
//! ```

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};
use crate::resource::Resource;

pub const API_VERSION: &str = "kpt.seek.com/v1alpha1";
pub const KIND: &str = "ClusterPackages";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPackages {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub spec: ClusterPackagesSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPackagesSpec {
    /// Output root for every package
    #[serde(default)]
    pub base_dir: String,

    /// Cluster-level overrides, applied to every package defining the setter
    #[serde(default)]
    pub variables: Vec<Variable>,

    #[serde(default)]
    pub packages: Vec<Package>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Unique name, used as the output subdirectory
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalSource>,

    /// Package-level overrides; each must match a setter in the package
    #[serde(default)]
    pub variables: Vec<Variable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub repo: String,
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default, alias = "subdirectory")]
    pub directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSource {
    pub directory: String,
}

/// Where a package's content comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Git(GitSource),
    Local(LocalSource),
}

impl fmt::Display for PackageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageSource::Git(git) => {
                write!(f, "{}", git.repo)?;
                if !git.directory.is_empty() {
                    write!(f, "/{}", git.directory.trim_start_matches('/'))?;
                }
                if !git.git_ref.is_empty() {
                    write!(f, "@{}", git.git_ref)?;
                }
                Ok(())
            }
            PackageSource::Local(local) => write!(f, "{}", local.directory),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,

    #[serde(
        default,
        deserialize_with = "scalar::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,

    #[serde(
        default,
        deserialize_with = "scalar::list",
        skip_serializing_if = "Option::is_none"
    )]
    pub list_values: Option<Vec<String>>,
}

/// A validated variable value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    Scalar(String),
    List(Vec<String>),
}

impl Variable {
    pub fn scalar(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            list_values: None,
        }
    }

    pub fn list(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            list_values: Some(values),
        }
    }

    /// Exactly one of `value` and `listValues` must be set
    pub fn resolve(&self) -> Result<VariableValue> {
        match (&self.value, &self.list_values) {
            (Some(value), None) => Ok(VariableValue::Scalar(value.clone())),
            (None, Some(values)) => Ok(VariableValue::List(values.clone())),
            (Some(_), Some(_)) => Err(CoreError::InvalidDescriptor {
                message: format!("variable {} sets both value and listValues", self.name),
            }),
            (None, None) => Err(CoreError::InvalidDescriptor {
                message: format!("variable {} sets neither value nor listValues", self.name),
            }),
        }
    }
}

impl Package {
    /// Exactly one of `git` and `local` must be set
    pub fn source(&self) -> Result<PackageSource> {
        match (&self.git, &self.local) {
            (Some(git), None) => Ok(PackageSource::Git(git.clone())),
            (None, Some(local)) => Ok(PackageSource::Local(local.clone())),
            (Some(_), Some(_)) => Err(CoreError::InvalidDescriptor {
                message: format!("package {} sets both git and local sources", self.name),
            }),
            (None, None) => Err(CoreError::InvalidDescriptor {
                message: format!("package {} has no git or local source", self.name),
            }),
        }
    }
}

impl ClusterPackages {
    /// Whether a resource in the input stream is a descriptor
    pub fn is_descriptor(resource: &Resource) -> bool {
        resource.is_type(API_VERSION, KIND)
    }

    pub fn from_resource(resource: &Resource) -> Result<Self> {
        let descriptor: ClusterPackages = serde_yaml::from_value(resource.to_node().to_value())
            .map_err(|e| CoreError::InvalidDescriptor {
                message: format!("{}: {}", resource.id(), e),
            })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for package in &self.spec.packages {
            if package.name.is_empty() {
                return Err(CoreError::InvalidDescriptor {
                    message: "package with empty name".to_string(),
                });
            }
            if package.name == "."
                || package.name == ".."
                || package.name.contains(['/', '\\'])
            {
                return Err(CoreError::InvalidDescriptor {
                    message: format!(
                        "package name '{}' must be a single path segment",
                        package.name
                    ),
                });
            }
            if !names.insert(package.name.as_str()) {
                return Err(CoreError::InvalidDescriptor {
                    message: format!("duplicate package name {}", package.name),
                });
            }
            package.source()?;
            for variable in &package.variables {
                variable.resolve()?;
            }
        }

        for variable in &self.spec.variables {
            variable.resolve()?;
        }

        Ok(())
    }
}

/// Setter values are strings, but YAML authors write `replicas: 3`
mod scalar {
    use super::*;
    use serde::de::Error;
    use serde_yaml::Value;

    fn to_string<E: Error>(value: Value) -> std::result::Result<String, E> {
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(E::custom(format!("expected a scalar, got {:?}", other))),
        }
    }

    pub fn option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<String>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => to_string(value).map(Some),
        }
    }

    pub fn list<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<Vec<String>>, D::Error> {
        match Option::<Vec<Value>>::deserialize(deserializer)? {
            None => Ok(None),
            Some(values) => values.into_iter().map(to_string).collect::<std::result::Result<Vec<_>, _>>().map(Some),
        }
    }
}
