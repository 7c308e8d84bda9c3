//! Literal token replacement
//!
//! Resources opting in with `kpt.seek.com/token-replace: enabled` have every
//! occurrence of each token replaced in all of their string scalars.

use serde::{Deserialize, Serialize};

use crate::annotations::{TOKEN_REPLACE_ENABLED, seek};
use crate::node::Node;
use crate::resource::Resource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub token: String,
    #[serde(default)]
    pub value: String,
}

impl Replacement {
    pub fn new(token: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            value: value.into(),
        }
    }
}

/// Whether the resource opted in to token replacement
pub fn is_enabled(resource: &Resource) -> bool {
    resource.annotation(seek::TOKEN_REPLACE).as_deref() == Some(TOKEN_REPLACE_ENABLED)
}

/// Apply replacements in order. Returns `false` when the resource did not opt in.
pub fn replace_tokens(resource: &mut Resource, replacements: &[Replacement]) -> bool {
    if !is_enabled(resource) {
        return false;
    }

    for (_, node) in resource.body_mut().fields_mut() {
        replace_in(node, replacements);
    }
    true
}

fn replace_in(node: &mut Node, replacements: &[Replacement]) {
    match node {
        Node::String(text) => {
            for replacement in replacements.iter().filter(|r| !r.token.is_empty()) {
                if text.contains(&replacement.token) {
                    *text = text.replace(&replacement.token, &replacement.value);
                }
            }
        }
        Node::Sequence(items) => items.iter_mut().for_each(|item| replace_in(item, replacements)),
        Node::Mapping(mapping) => {
            for (_, value) in mapping.fields_mut() {
                replace_in(value, replacements);
            }
        }
        Node::Tagged(tagged) => replace_in(&mut tagged.value, replacements),
        Node::Null | Node::Bool(_) | Node::Number(_) => {}
    }
}
