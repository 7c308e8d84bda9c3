//! AST (Abstract Syntax Tree) for templates
//!
//! Actions are parsed one at a time into [`ActionBody`] and then assembled
//! into a [`Template`] tree of text, output and control blocks.

use std::fmt;

/// The body of an action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionBody {
    /// Comment: {{/* comment */}}
    Comment(String),
    /// If: {{ if .X }}
    If(Pipeline),
    /// Else if: {{ else if .X }}
    ElseIf(Pipeline),
    /// Else: {{ else }}
    Else,
    /// End: {{ end }}
    End,
    /// Range: {{ range .X }} or {{ range $i, $v := .X }}
    Range {
        vars: Option<RangeVars>,
        pipeline: Pipeline,
    },
    /// With: {{ with .X }}
    With(Pipeline),
    /// A pipeline whose result is printed
    Pipeline(Pipeline),
}

impl ActionBody {
    /// Keyword used in structure errors
    pub fn keyword(&self) -> &'static str {
        match self {
            ActionBody::Comment(_) => "comment",
            ActionBody::If(_) => "if",
            ActionBody::ElseIf(_) => "else if",
            ActionBody::Else => "else",
            ActionBody::End => "end",
            ActionBody::Range { .. } => "range",
            ActionBody::With(_) => "with",
            ActionBody::Pipeline(_) => "pipeline",
        }
    }
}

/// Variables in a range clause: $i, $v := ...
#[derive(Debug, Clone, PartialEq)]
pub struct RangeVars {
    /// Index (or key) variable: $i in `range $i, $v := .X`
    pub index_var: Option<String>,
    /// Element variable: $v in `range $v := .X` or `range $i, $v := .X`
    pub value_var: String,
}

/// A pipeline: commands separated by `|`, each result passed as the final
/// argument of the next command
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub decl: Option<Declaration>,
    pub commands: Vec<Command>,
}

impl Pipeline {
    pub fn simple(command: Command) -> Self {
        Self {
            decl: None,
            commands: vec![command],
        }
    }
}

/// `$x := pipeline` (define) or `$x = pipeline` (assign)
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub variable: String,
    pub define: bool,
}

/// A command: a function name followed by arguments, or a single operand
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `.a.b`; an empty path is the dot itself
    Field(Vec<String>),
    /// `$x.a.b`; the name is empty for `$`
    Variable { name: String, path: Vec<String> },
    /// A function name
    Function(String),
    Literal(Literal),
    Parenthesized(Box<Pipeline>),
}

/// A literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Char(char),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Char(c) => write!(f, "'{}'", c),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(n) => write!(f, "{}", n),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub nodes: Vec<TemplateNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Text(String),
    /// Print the pipeline result (declarations print nothing)
    Output(Pipeline),
    If {
        branches: Vec<(Pipeline, Vec<TemplateNode>)>,
        otherwise: Vec<TemplateNode>,
    },
    Range {
        vars: Option<RangeVars>,
        pipeline: Pipeline,
        body: Vec<TemplateNode>,
        otherwise: Vec<TemplateNode>,
    },
    With {
        pipeline: Pipeline,
        body: Vec<TemplateNode>,
        otherwise: Vec<TemplateNode>,
    },
}
