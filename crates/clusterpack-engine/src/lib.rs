//! Clusterpack Engine - Go templates and setter overrides for packages
//!
//! This crate provides:
//! - A Go `text/template` compatible interpreter with runtime delimiters
//! - The `value`, `render`, `args` and `nargs` package primitives plus a sprig subset
//! - Scope-gated rendering of resource trees
//! - Setter overrides applied to a package manifest and its resources
//! - Suggestions for misspelled setters, keys and functions

pub mod ast;
pub mod context;
pub mod error;
pub mod functions;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod renderer;
pub mod setters;
pub mod suggestions;
pub mod value;

pub use context::TemplateContext;
pub use error::{EngineError, Result};
pub use interpreter::{Interpreter, MAX_RENDER_DEPTH};
pub use lexer::Delimiters;
pub use parser::parse_template;
pub use renderer::Renderer;
pub use setters::{Override, OverrideOutcome, apply, apply_variables};
pub use value::Value;
