//! Ordered YAML resource tree
//!
//! [`Node`] is an owned, insertion-ordered tree converted losslessly to and
//! from `serde_yaml::Value`. Mappings carry a typed [`Markers`] side channel
//! parsed from the reserved `$kpt-*` keys when the tree is built. The marker
//! entries stay in the mapping so that untouched resources serialize exactly
//! as they were read; tree walkers use [`Mapping::fields`] to skip them.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::{Number, Value};

use crate::annotations::markers;
use crate::error::Result;

/// A node in a resource tree
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<Node>),
    Mapping(Mapping),
    Tagged(Box<Tagged>),
}

/// A node carrying an explicit YAML tag (`!tag value`)
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged {
    pub tag: String,
    pub value: Node,
}

/// Typed metadata parsed from reserved mapping keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markers {
    /// `$kpt-template: "true"` was present
    pub template: bool,
    /// Raw `$kpt-template-delimiters` value, validated by the renderer
    pub delimiters: Option<String>,
    /// `$kpt-set` entries: sibling field name to setter reference
    pub setters: IndexMap<String, String>,
}

impl Markers {
    fn from_entries(entries: &IndexMap<String, Node>) -> Self {
        let template = entries
            .get(markers::TEMPLATE)
            .and_then(Node::scalar_string)
            .is_some_and(|v| v == "true");

        let delimiters = entries
            .get(markers::TEMPLATE_DELIMITERS)
            .and_then(Node::scalar_string);

        let setters = entries
            .get(markers::SET)
            .and_then(Node::as_mapping)
            .map(|set| {
                set.entries
                    .iter()
                    .filter_map(|(field, setter)| {
                        setter.scalar_string().map(|s| (field.clone(), s))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            template,
            delimiters,
            setters,
        }
    }

    /// True when no marker key was present
    pub fn is_empty(&self) -> bool {
        !self.template && self.delimiters.is_none() && self.setters.is_empty()
    }
}

/// An ordered mapping with parsed markers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: IndexMap<String, Node>,
    markers: Markers,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace an entry, keeping its position when it already exists
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        let key = key.into();
        let is_marker = markers::is_marker(&key);
        let previous = self.entries.insert(key, value);
        if is_marker {
            self.markers = Markers::from_entries(&self.entries);
        }
        previous
    }

    /// Remove an entry, preserving the order of the remaining ones
    pub fn remove(&mut self, key: &str) -> Option<Node> {
        let removed = self.entries.shift_remove(key);
        if removed.is_some() && markers::is_marker(key) {
            self.markers = Markers::from_entries(&self.entries);
        }
        removed
    }

    /// All entries, markers included
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.entries.iter()
    }

    /// Data fields, markers excluded
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.entries.iter().filter(|(k, _)| !markers::is_marker(k))
    }

    /// Mutable data fields, markers excluded
    pub fn fields_mut(&mut self) -> impl Iterator<Item = (&String, &mut Node)> {
        self.entries
            .iter_mut()
            .filter(|(k, _)| !markers::is_marker(k))
    }

    /// Walk `path`, creating empty mappings for missing or null entries.
    /// Returns `None` if an existing entry on the path is not a mapping.
    pub fn ensure_mapping(&mut self, path: &[&str]) -> Option<&mut Mapping> {
        let mut current = self;
        for key in path {
            let entry = current
                .entries
                .entry((*key).to_string())
                .or_insert_with(|| Node::Mapping(Mapping::new()));
            if entry.is_null() {
                *entry = Node::Mapping(Mapping::new());
            }
            current = entry.as_mapping_mut()?;
        }
        Some(current)
    }
}

impl FromIterator<(String, Node)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (String, Node)>>(iter: I) -> Self {
        let entries: IndexMap<String, Node> = iter.into_iter().collect();
        let markers = Markers::from_entries(&entries);
        Self { entries, markers }
    }
}

impl Node {
    /// Parse a single YAML document
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(input)?;
        Ok(Node::from(value))
    }

    /// Parse every document of a multi-document YAML stream
    pub fn from_yaml_documents(input: &str) -> Result<Vec<Self>> {
        let mut nodes = Vec::new();
        for document in serde_yaml::Deserializer::from_str(input) {
            let value = Value::deserialize(document)?;
            nodes.push(Node::from(value));
        }
        Ok(nodes)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_value())?)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Sequence(items) => Value::Sequence(items.iter().map(Node::to_value).collect()),
            Node::Mapping(mapping) => Value::Mapping(
                mapping
                    .entries
                    .iter()
                    .map(|(k, v)| (Value::String(k.clone()), v.to_value()))
                    .collect(),
            ),
            Node::Tagged(tagged) => Value::Tagged(Box::new(TaggedValue {
                tag: Tag::new(tagged.tag.clone()),
                value: tagged.value.to_value(),
            })),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn is_scalar(&self) -> bool {
        match self {
            Node::Null | Node::Bool(_) | Node::Number(_) | Node::String(_) => true,
            Node::Tagged(tagged) => tagged.value.is_scalar(),
            Node::Sequence(_) | Node::Mapping(_) => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(s),
            Node::Tagged(tagged) => tagged.value.as_str(),
            _ => None,
        }
    }

    /// String form of a non-null scalar (`3` and `true` become `"3"` and `"true"`)
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            Node::String(s) => Some(s.clone()),
            Node::Number(n) => Some(n.to_string()),
            Node::Bool(b) => Some(b.to_string()),
            Node::Tagged(tagged) => tagged.value.scalar_string(),
            Node::Null | Node::Sequence(_) | Node::Mapping(_) => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Follow a path of mapping keys
    pub fn lookup(&self, path: &[&str]) -> Option<&Node> {
        path.iter()
            .try_fold(self, |node, key| node.as_mapping()?.get(key))
    }

    pub fn lookup_mut(&mut self, path: &[&str]) -> Option<&mut Node> {
        let mut node = self;
        for key in path {
            node = node.as_mapping_mut()?.get_mut(key)?;
        }
        Some(node)
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => Node::Number(n),
            Value::String(s) => Node::String(s),
            Value::Sequence(items) => Node::Sequence(items.into_iter().map(Node::from).collect()),
            Value::Mapping(mapping) => Node::Mapping(
                mapping
                    .into_iter()
                    .map(|(k, v)| (key_string(k), Node::from(v)))
                    .collect(),
            ),
            Value::Tagged(tagged) => {
                let TaggedValue { tag, value } = *tagged;
                Node::Tagged(Box::new(Tagged {
                    tag: tag.to_string(),
                    value: Node::from(value),
                }))
            }
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::String(value)
    }
}

impl From<Mapping> for Node {
    fn from(value: Mapping) -> Self {
        Node::Mapping(value)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Node::from)
    }
}

/// Kubernetes keys are strings; other scalar keys keep their YAML spelling
fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
