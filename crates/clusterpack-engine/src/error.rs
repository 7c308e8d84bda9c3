//! Engine error types

use clusterpack_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

use crate::parser::ParseError;

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    // ============ Template Syntax Errors ============
    #[error("template: bad action \"{action}\": {source}")]
    #[diagnostic(code(clusterpack::template::syntax))]
    Parse {
        action: String,
        #[source]
        source: ParseError,
    },

    #[error("template: unclosed action starting at byte {offset}")]
    #[diagnostic(code(clusterpack::template::syntax))]
    UnclosedAction { offset: usize },

    #[error("template: unexpected {keyword}")]
    #[diagnostic(code(clusterpack::template::syntax))]
    UnexpectedKeyword { keyword: String },

    #[error("template: unexpected EOF, {block} is missing its end")]
    #[diagnostic(code(clusterpack::template::syntax))]
    UnclosedBlock { block: String },

    #[error("invalid template delimiters '{value}': expected exactly two whitespace-separated tokens")]
    #[diagnostic(
        code(clusterpack::template::delimiters),
        help("use a value such as \"[[ ]]\"")
    )]
    InvalidDelimiters { value: String },

    // ============ Execution Errors ============
    #[error("template specifies missing key {key}")]
    #[diagnostic(code(clusterpack::template::missing_key))]
    MissingKey {
        key: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("map has no entry for key \"{key}\"")]
    #[diagnostic(code(clusterpack::template::missing_key))]
    MissingField {
        key: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("referenced template '{name}' is not a string")]
    #[diagnostic(code(clusterpack::template::render))]
    NotAString { name: String },

    #[error("function \"{name}\" not defined")]
    #[diagnostic(code(clusterpack::template::unknown_function))]
    UnknownFunction {
        name: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("error calling {function}: {message}")]
    #[diagnostic(code(clusterpack::template::function))]
    Function { function: String, message: String },

    #[error("args: index {index} out of range, {count} arguments given")]
    #[diagnostic(code(clusterpack::template::args))]
    ArgsOutOfRange { index: i64, count: usize },

    #[error("undefined variable: ${name}")]
    #[diagnostic(code(clusterpack::template::variable))]
    UndefinedVariable { name: String },

    #[error("{message}")]
    #[diagnostic(code(clusterpack::template::exec))]
    Execution { message: String },

    #[error("render: nested templates exceed {limit} levels")]
    #[diagnostic(code(clusterpack::template::recursion))]
    RecursionLimit { limit: usize },

    // ============ Resource Errors ============
    #[error("failed to render {resource} at {field}: {cause}")]
    #[diagnostic(code(clusterpack::render))]
    Render {
        resource: String,
        field: String,
        cause: Box<EngineError>,
    },

    // ============ Override Errors ============
    #[error("variable {name} does not match any setter in the package Kptfile")]
    #[diagnostic(
        code(clusterpack::setter::missing_setter),
        help("package variables must name a setter declared under openAPI.definitions")
    )]
    MissingSetter { name: String },

    #[error("setter {name} expects {expected} but was given {actual}")]
    #[diagnostic(code(clusterpack::setter::type_mismatch))]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("invalid value '{value}' for {schema_type} setter {name}")]
    #[diagnostic(code(clusterpack::setter::invalid_value))]
    InvalidSetterValue {
        name: String,
        value: String,
        schema_type: String,
    },

    #[error("field {field} references unknown setter {setter}")]
    #[diagnostic(code(clusterpack::setter::unknown_setter))]
    UnknownPatternSetter { field: String, setter: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl EngineError {
    pub(crate) fn exec(message: impl Into<String>) -> Self {
        EngineError::Execution {
            message: message.into(),
        }
    }

    pub(crate) fn function(function: &str, message: impl Into<String>) -> Self {
        EngineError::Function {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_includes_cause() {
        let err = EngineError::Render {
            resource: "ConfigMap/cm".to_string(),
            field: "data.key".to_string(),
            cause: Box::new(EngineError::MissingKey {
                key: "region".to_string(),
                suggestion: None,
            }),
        };
        assert_eq!(
            err.to_string(),
            "failed to render ConfigMap/cm at data.key: template specifies missing key region"
        );
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = EngineError::InvalidDelimiters {
            value: "[[".to_string(),
        };
        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("clusterpack::template::delimiters")
        );
    }
}
