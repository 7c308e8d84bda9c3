//! Kubernetes-style resources and the kpt ResourceList envelope

use std::fmt;

use crate::annotations::kio;
use crate::error::{CoreError, Result};
use crate::node::{Mapping, Node};

pub const RESOURCE_LIST_API_VERSION: &str = "config.kubernetes.io/v1alpha1";
pub const RESOURCE_LIST_KIND: &str = "ResourceList";

/// A single resource whose root is a mapping
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    body: Mapping,
}

impl Resource {
    pub fn new(node: Node) -> Result<Self> {
        match node {
            Node::Mapping(body) => Ok(Self { body }),
            other => Err(CoreError::InvalidResource {
                message: format!("expected a mapping at the document root, got {}", kind_of(&other)),
            }),
        }
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        Self::new(Node::from_yaml_str(input)?)
    }

    pub fn body(&self) -> &Mapping {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Mapping {
        &mut self.body
    }

    pub fn into_node(self) -> Node {
        Node::Mapping(self.body)
    }

    pub fn to_node(&self) -> Node {
        Node::Mapping(self.body.clone())
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        self.to_node().to_yaml_string()
    }

    fn lookup(&self, path: &[&str]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        self.body.get(first)?.lookup(rest)
    }

    pub fn api_version(&self) -> Option<&str> {
        self.body.get("apiVersion").and_then(Node::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.body.get("kind").and_then(Node::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.lookup(&["metadata", "name"]).and_then(Node::as_str)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.lookup(&["metadata", "namespace"]).and_then(Node::as_str)
    }

    /// Match on apiVersion and kind
    pub fn is_type(&self, api_version: &str, kind: &str) -> bool {
        self.api_version() == Some(api_version) && self.kind() == Some(kind)
    }

    pub fn annotations(&self) -> Option<&Mapping> {
        self.lookup(&["metadata", "annotations"])
            .and_then(Node::as_mapping)
    }

    /// Annotation value in string form
    pub fn annotation(&self, key: &str) -> Option<String> {
        self.annotations()?.get(key)?.scalar_string()
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let id = self.id().to_string();
        let annotations = self
            .body
            .ensure_mapping(&["metadata", "annotations"])
            .ok_or_else(|| CoreError::InvalidResource {
                message: format!("{} has non-mapping metadata.annotations", id),
            })?;
        annotations.insert(key, Node::String(value.into()));
        Ok(())
    }

    /// Provenance path recorded when the resource was read
    pub fn path(&self) -> Option<String> {
        self.annotation(kio::PATH)
    }

    pub fn id(&self) -> ResourceId<'_> {
        ResourceId {
            kind: self.kind().unwrap_or("<unknown kind>"),
            namespace: self.namespace(),
            name: self.name().unwrap_or("<unnamed>"),
        }
    }
}

/// Display helper identifying a resource in messages
#[derive(Debug, Clone, Copy)]
pub struct ResourceId<'a> {
    pub kind: &'a str,
    pub namespace: Option<&'a str>,
    pub name: &'a str,
}

impl fmt::Display for ResourceId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// The list-in, list-out envelope exchanged by kpt functions
#[derive(Debug, Clone, Default)]
pub struct ResourceList {
    pub items: Vec<Resource>,
    pub function_config: Option<Node>,
}

impl ResourceList {
    pub fn new(items: Vec<Resource>) -> Self {
        Self {
            items,
            function_config: None,
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let node = Node::from_yaml_str(input)?;
        let root = node.as_mapping().ok_or_else(|| CoreError::InvalidResourceList {
            message: "expected a mapping at the document root".to_string(),
        })?;

        let kind = root.get("kind").and_then(Node::as_str);
        if kind != Some(RESOURCE_LIST_KIND) {
            return Err(CoreError::InvalidResourceList {
                message: format!("expected kind {}, got {}", RESOURCE_LIST_KIND, kind.unwrap_or("none")),
            });
        }

        let items = match root.get("items") {
            None | Some(Node::Null) => Vec::new(),
            Some(Node::Sequence(items)) => items
                .iter()
                .cloned()
                .map(Resource::new)
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(CoreError::InvalidResourceList {
                    message: "items must be a sequence".to_string(),
                });
            }
        };

        let function_config = root.get("functionConfig").filter(|n| !n.is_null()).cloned();

        Ok(Self {
            items,
            function_config,
        })
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        let mut root = Mapping::new();
        root.insert("apiVersion", Node::from(RESOURCE_LIST_API_VERSION));
        root.insert("kind", Node::from(RESOURCE_LIST_KIND));
        root.insert(
            "items",
            Node::Sequence(self.items.iter().map(Resource::to_node).collect()),
        );
        if let Some(config) = &self.function_config {
            root.insert("functionConfig", config.clone());
        }
        Node::Mapping(root).to_yaml_string()
    }
}

fn kind_of(node: &Node) -> &'static str {
    match node {
        Node::Null => "null",
        Node::Bool(_) => "boolean",
        Node::Number(_) => "number",
        Node::String(_) => "string",
        Node::Sequence(_) => "sequence",
        Node::Mapping(_) => "mapping",
        Node::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_MAP: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
  namespace: apps
  annotations:
    kpt.seek.com/render-template: true
data:
  key: value
"#;

    #[test]
    fn test_metadata_accessors() {
        let resource = Resource::from_yaml_str(CONFIG_MAP).unwrap();
        assert_eq!(resource.api_version(), Some("v1"));
        assert_eq!(resource.kind(), Some("ConfigMap"));
        assert_eq!(resource.name(), Some("settings"));
        assert_eq!(resource.namespace(), Some("apps"));
        assert!(resource.is_type("v1", "ConfigMap"));
        assert_eq!(resource.id().to_string(), "ConfigMap/apps/settings");
    }

    #[test]
    fn test_bool_annotation_reads_as_string() {
        let resource = Resource::from_yaml_str(CONFIG_MAP).unwrap();
        assert_eq!(
            resource.annotation("kpt.seek.com/render-template").as_deref(),
            Some("true")
        );
    }

    #[test]
    fn test_set_annotation_creates_metadata() {
        let mut resource = Resource::from_yaml_str("kind: Thing\n").unwrap();
        resource.set_annotation("a/b", "c").unwrap();
        assert_eq!(resource.annotation("a/b").as_deref(), Some("c"));
    }

    #[test]
    fn test_non_mapping_resource_rejected() {
        let err = Resource::from_yaml_str("- a\n- b\n").unwrap_err();
        assert!(err.to_string().contains("sequence"));
    }

    #[test]
    fn test_resource_list_round_trip() {
        let input = r#"
apiVersion: config.kubernetes.io/v1alpha1
kind: ResourceList
items:
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: a
functionConfig:
  apiVersion: v1
  kind: ConfigMap
  data:
    logLevel: debug
"#;
        let list = ResourceList::parse(input).unwrap();
        assert_eq!(list.items.len(), 1);
        assert!(list.function_config.is_some());

        let output = list.to_yaml_string().unwrap();
        let reparsed = ResourceList::parse(&output).unwrap();
        assert_eq!(reparsed.items, list.items);
        assert_eq!(reparsed.function_config, list.function_config);
    }

    #[test]
    fn test_resource_list_requires_kind() {
        let err = ResourceList::parse("kind: List\nitems: []\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidResourceList { .. }));
    }

    #[test]
    fn test_resource_list_without_items() {
        let list = ResourceList::parse("kind: ResourceList\n").unwrap();
        assert!(list.items.is_empty());
        assert!(list.function_config.is_none());
    }
}
