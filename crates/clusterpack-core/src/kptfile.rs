//! Kptfile setter schema
//!
//! Setters are declared as OpenAPI definitions inside the package manifest:
//!
//! ```yaml
//! apiVersion: kpt.dev/v1alpha1
//! kind: Kptfile
//! openAPI:
//!   definitions:
//!     io.k8s.cli.setters.replicas:
//!       type: integer
//!       x-k8s-cli:
//!         setter:
//!           name: replicas
//!           value: "3"
//! ```
//!
//! Values are resolved once when a setter is read into a [`SetterValue`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::descriptor::VariableValue;
use crate::error::{CoreError, Result};
use crate::node::{Mapping, Node};
use crate::resource::Resource;

pub const KPTFILE_NAME: &str = "Kptfile";
pub const KPTFILE_API_VERSION: &str = "kpt.dev/v1alpha1";
pub const KPTFILE_KIND: &str = "Kptfile";

/// Prefix of OpenAPI definition keys declaring setters
pub const SETTER_DEFINITION_PREFIX: &str = "io.k8s.cli.setters.";
/// OpenAPI extension carrying the setter description
pub const K8S_CLI_EXTENSION: &str = "x-k8s-cli";

const DEFINITIONS_PATH: [&str; 2] = ["openAPI", "definitions"];

/// Check whether a resource is a package manifest
pub fn is_kptfile(resource: &Resource) -> bool {
    resource.is_type(KPTFILE_API_VERSION, KPTFILE_KIND)
}

/// Declared OpenAPI type of a setter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetterType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
}

impl FromStr for SetterType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "array" => Ok(Self::Array),
            other => Err(format!("unsupported setter type '{}'", other)),
        }
    }
}

impl fmt::Display for SetterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Resolved value of a setter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetterValue {
    Scalar(String),
    List(Vec<String>),
    /// `key` selects `value` from the setter's enumValues
    Enum { key: String, value: String },
}

impl SetterValue {
    pub fn is_list(&self) -> bool {
        matches!(self, SetterValue::List(_))
    }

    /// Scalar form, `None` for lists
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            SetterValue::Scalar(s) => Some(s),
            SetterValue::Enum { value, .. } => Some(value),
            SetterValue::List(_) => None,
        }
    }
}

/// Who last set a setter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetBy {
    ClusterOverride,
    PackageOverride,
}

impl SetBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetBy::ClusterOverride => "cluster-override",
            SetBy::PackageOverride => "package-override",
        }
    }
}

impl fmt::Display for SetBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A setter read from the manifest schema
#[derive(Debug, Clone, PartialEq)]
pub struct SetterDefinition {
    pub name: String,
    /// Definition key, `io.k8s.cli.setters.<name>`
    pub key: String,
    pub schema_type: Option<SetterType>,
    pub value: SetterValue,
    pub enum_values: IndexMap<String, String>,
    pub set_by: Option<String>,
    pub required: bool,
}

impl SetterDefinition {
    fn read(key: &str, definition: &Node) -> Result<Self> {
        let setter = definition
            .lookup(&[K8S_CLI_EXTENSION, "setter"])
            .and_then(Node::as_mapping)
            .ok_or_else(|| CoreError::MalformedSetter {
                key: key.to_string(),
            })?;

        let name = setter
            .get("name")
            .and_then(Node::scalar_string)
            .unwrap_or_else(|| key.trim_start_matches(SETTER_DEFINITION_PREFIX).to_string());

        let schema_type = definition
            .lookup(&["type"])
            .and_then(Node::as_str)
            .map(|t| {
                t.parse::<SetterType>()
                    .map_err(|message| CoreError::InvalidSetter {
                        name: name.clone(),
                        message,
                    })
            })
            .transpose()?;

        let list_values = match setter.get("listValues") {
            None | Some(Node::Null) => Vec::new(),
            Some(Node::Sequence(items)) => items
                .iter()
                .map(|item| {
                    item.scalar_string().ok_or_else(|| CoreError::InvalidSetter {
                        name: name.clone(),
                        message: "listValues must contain scalars".to_string(),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(CoreError::InvalidSetter {
                    name,
                    message: "listValues must be a sequence".to_string(),
                });
            }
        };

        let enum_values: IndexMap<String, String> = setter
            .get("enumValues")
            .and_then(Node::as_mapping)
            .map(|values| {
                values
                    .entries()
                    .filter_map(|(k, v)| v.scalar_string().map(|v| (k.clone(), v)))
                    .collect()
            })
            .unwrap_or_default();

        let scalar = setter.get("value").and_then(Node::scalar_string);

        let value = if !list_values.is_empty() || schema_type == Some(SetterType::Array) {
            SetterValue::List(list_values)
        } else if !enum_values.is_empty() {
            let key = scalar.unwrap_or_default();
            let value = enum_values
                .get(&key)
                .cloned()
                .ok_or_else(|| CoreError::UnknownEnumValue {
                    name: name.clone(),
                    value: key.clone(),
                })?;
            SetterValue::Enum { key, value }
        } else {
            SetterValue::Scalar(scalar.unwrap_or_default())
        };

        Ok(Self {
            name,
            key: key.to_string(),
            schema_type,
            value,
            enum_values,
            set_by: setter.get("setBy").and_then(Node::scalar_string),
            required: setter
                .get("required")
                .and_then(Node::scalar_string)
                .is_some_and(|v| v == "true"),
        })
    }
}

/// A package manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Kptfile {
    resource: Resource,
}

impl Kptfile {
    pub fn from_resource(resource: Resource) -> Result<Self> {
        if !is_kptfile(&resource) {
            return Err(CoreError::InvalidResource {
                message: format!("{} is not a {}", resource.id(), KPTFILE_KIND),
            });
        }
        Ok(Self { resource })
    }

    /// Read a manifest from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let resource = Resource::from_yaml_str(&content).map_err(|e| CoreError::InvalidPackageFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_resource(resource)
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn into_resource(self) -> Resource {
        self.resource
    }

    fn definitions(&self) -> Option<&Mapping> {
        let (first, rest) = DEFINITIONS_PATH.split_first()?;
        self.resource.body().get(first)?.lookup(rest)?.as_mapping()
    }

    fn setter_key(name: &str) -> String {
        format!("{}{}", SETTER_DEFINITION_PREFIX, name)
    }

    pub fn has_setter(&self, name: &str) -> bool {
        self.definitions()
            .is_some_and(|defs| defs.contains_key(&Self::setter_key(name)))
    }

    pub fn setter(&self, name: &str) -> Result<Option<SetterDefinition>> {
        let key = Self::setter_key(name);
        self.definitions()
            .and_then(|defs| defs.get(&key))
            .map(|definition| SetterDefinition::read(&key, definition))
            .transpose()
    }

    /// Every setter, in declaration order
    pub fn list_setters(&self) -> Result<Vec<SetterDefinition>> {
        let Some(definitions) = self.definitions() else {
            return Ok(Vec::new());
        };

        definitions
            .entries()
            .filter(|(key, _)| key.starts_with(SETTER_DEFINITION_PREFIX))
            .map(|(key, definition)| SetterDefinition::read(key, definition))
            .collect()
    }

    /// Write a new value into a setter definition and stamp its provenance
    pub fn set_setter(&mut self, name: &str, value: &VariableValue, set_by: SetBy) -> Result<()> {
        let key = Self::setter_key(name);
        let setter = self
            .resource
            .body_mut()
            .get_mut("openAPI")
            .and_then(|n| n.lookup_mut(&["definitions", key.as_str(), K8S_CLI_EXTENSION, "setter"]))
            .and_then(Node::as_mapping_mut)
            .ok_or_else(|| CoreError::SetterNotFound {
                name: name.to_string(),
            })?;

        match value {
            VariableValue::Scalar(v) => {
                setter.insert("value", Node::String(v.clone()));
                setter.remove("listValues");
            }
            VariableValue::List(values) => {
                setter.insert(
                    "listValues",
                    Node::Sequence(values.iter().cloned().map(Node::String).collect()),
                );
                setter.remove("value");
            }
        }
        setter.insert("setBy", Node::from(set_by.as_str()));
        setter.insert("isSet", Node::Bool(true));

        Ok(())
    }
}
