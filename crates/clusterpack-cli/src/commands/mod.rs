//! CLI commands

pub mod hash_dependency;
pub mod render_template;
pub mod sync;
pub mod token_replace;
