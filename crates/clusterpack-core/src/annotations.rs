//! Reserved annotation and marker keys
//!
//! These strings are read by existing packages and downstream tooling, so they
//! must never change.

/// Annotations understood on resource metadata
pub mod seek {
    /// Enables template rendering for the whole resource when set to `true`
    pub const RENDER_TEMPLATE: &str = "kpt.seek.com/render-template";
    /// Custom delimiter pair for the resource, e.g. `"[[ ]]"`
    pub const RENDER_TEMPLATE_DELIMITERS: &str = "kpt.seek.com/render-template/delimiters";
    /// Prefix of annotations naming a `<kind>/<name>` whose hash should be embedded
    pub const HASH_DEPENDENCY: &str = "kpt.seek.com/hash-dependency";
    /// Enables token replacement when set to `enabled`
    pub const TOKEN_REPLACE: &str = "kpt.seek.com/token-replace";
}

/// kpt / kyaml function annotations
pub mod kio {
    /// File the resource was read from, relative to the package root
    pub const PATH: &str = "config.kubernetes.io/path";
    /// Index of the resource within a multi-document file
    pub const INDEX: &str = "config.kubernetes.io/index";
}

/// Mapping keys parsed into [`crate::node::Markers`]
pub mod markers {
    /// `$kpt-template: "true"` enables templating for the mapping subtree
    pub const TEMPLATE: &str = "$kpt-template";
    /// `$kpt-template-delimiters: "[[ ]]"` overrides delimiters for the subtree
    pub const TEMPLATE_DELIMITERS: &str = "$kpt-template-delimiters";
    /// `$kpt-set: {field: setter}` ties sibling fields to Kptfile setters
    pub const SET: &str = "$kpt-set";

    /// Check whether a mapping key is a marker rather than data
    pub fn is_marker(key: &str) -> bool {
        matches!(key, TEMPLATE | TEMPLATE_DELIMITERS | SET)
    }
}

/// Value of [`seek::RENDER_TEMPLATE`] that enables rendering
pub const RENDER_TEMPLATE_ENABLED: &str = "true";

/// Value of [`seek::TOKEN_REPLACE`] that enables replacement
pub const TOKEN_REPLACE_ENABLED: &str = "enabled";

/// Check whether an annotation key is a hash dependency reference
pub fn is_hash_dependency(key: &str) -> bool {
    key.starts_with(seek::HASH_DEPENDENCY)
}
