//! Template execution
//!
//! Executes a parsed [`Template`] against a [`TemplateContext`]. The data
//! passed as `.` and `$` is `{ Values: <setters> }`; missing map keys are
//! errors rather than `<no value>`.
//!
//! Besides the helper library, templates get four primitives:
//! `value NAME` reads a setter, `render NAME ARGS...` executes the setter
//! as a nested template, and inside a nested template `args I` and `nargs`
//! expose the arguments it was rendered with.

use std::collections::BTreeMap;

use crate::ast::*;
use crate::context::TemplateContext;
use crate::error::{EngineError, Result};
use crate::functions;
use crate::lexer::Delimiters;
use crate::parser::parse_template;
use crate::suggestions::{suggest_function, suggest_key, suggest_setter};
use crate::value::Value;

/// Maximum nesting of `render` calls
pub const MAX_RENDER_DEPTH: usize = 10;

/// Renders template strings for a single context and set of delimiters
pub struct Interpreter<'a> {
    context: &'a TemplateContext,
    delimiters: &'a Delimiters,
    root: Value,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a TemplateContext, delimiters: &'a Delimiters) -> Self {
        let root = Value::Map(BTreeMap::from([("Values".to_string(), context.to_value())]));
        Self {
            context,
            delimiters,
            root,
        }
    }

    /// Parse and execute `text`
    pub fn render(&self, text: &str) -> Result<String> {
        self.execute(text, &[], 0)
    }

    fn execute(&self, text: &str, args: &[String], depth: usize) -> Result<String> {
        if depth > MAX_RENDER_DEPTH {
            return Err(EngineError::RecursionLimit {
                limit: MAX_RENDER_DEPTH,
            });
        }

        let template = parse_template(text, self.delimiters)?;
        let mut state = State {
            interpreter: self,
            args,
            depth,
            vars: vec![(String::new(), self.root.clone())],
            out: String::new(),
        };
        state.walk(&template.nodes, &self.root)?;
        Ok(state.out)
    }
}

/// Per-execution state: variable scopes and output buffer
struct State<'s, 'a> {
    interpreter: &'s Interpreter<'a>,
    args: &'s [String],
    depth: usize,
    vars: Vec<(String, Value)>,
    out: String,
}

impl State<'_, '_> {
    fn walk(&mut self, nodes: &[TemplateNode], dot: &Value) -> Result<()> {
        for node in nodes {
            self.node(node, dot)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &TemplateNode, dot: &Value) -> Result<()> {
        match node {
            TemplateNode::Text(text) => self.out.push_str(text),
            TemplateNode::Output(pipeline) => {
                let value = self.pipeline(pipeline, dot)?;
                if pipeline.decl.is_none() {
                    self.out.push_str(&value.to_output());
                }
            }
            TemplateNode::If {
                branches,
                otherwise,
            } => {
                let mark = self.vars.len();
                let mut taken = None;
                for (condition, body) in branches {
                    if self.pipeline(condition, dot)?.is_truthy() {
                        taken = Some(body);
                        break;
                    }
                }
                self.walk(taken.unwrap_or(otherwise), dot)?;
                self.vars.truncate(mark);
            }
            TemplateNode::With {
                pipeline,
                body,
                otherwise,
            } => {
                let mark = self.vars.len();
                let value = self.pipeline(pipeline, dot)?;
                if value.is_truthy() {
                    self.walk(body, &value)?;
                } else {
                    self.walk(otherwise, dot)?;
                }
                self.vars.truncate(mark);
            }
            TemplateNode::Range {
                vars,
                pipeline,
                body,
                otherwise,
            } => {
                let mark = self.vars.len();
                let value = self.pipeline(pipeline, dot)?;
                let entries: Vec<(Value, Value)> = match value {
                    Value::List(items) => items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| (Value::Int(i as i64), item))
                        .collect(),
                    Value::Map(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
                    Value::Nil => Vec::new(),
                    other => {
                        return Err(EngineError::exec(format!(
                            "range can't iterate over {}",
                            other
                        )));
                    }
                };

                if entries.is_empty() {
                    self.walk(otherwise, dot)?;
                }
                for (key, item) in entries {
                    let inner = self.vars.len();
                    if let Some(vars) = vars {
                        if let Some(index_var) = &vars.index_var {
                            self.vars.push((index_var.clone(), key));
                        }
                        self.vars.push((vars.value_var.clone(), item.clone()));
                    }
                    self.walk(body, &item)?;
                    self.vars.truncate(inner);
                }
                self.vars.truncate(mark);
            }
        }
        Ok(())
    }

    fn pipeline(&mut self, pipeline: &Pipeline, dot: &Value) -> Result<Value> {
        let mut result = None;
        for command in &pipeline.commands {
            result = Some(self.command(command, dot, result.take())?);
        }
        let value = result.unwrap_or_default();

        if let Some(decl) = &pipeline.decl {
            if decl.define {
                self.vars.push((decl.variable.clone(), value.clone()));
            } else {
                let slot = self
                    .vars
                    .iter_mut()
                    .rev()
                    .find(|(name, _)| *name == decl.variable)
                    .ok_or_else(|| EngineError::UndefinedVariable {
                        name: decl.variable.clone(),
                    })?;
                slot.1 = value.clone();
            }
        }
        Ok(value)
    }

    fn command(&mut self, command: &Command, dot: &Value, piped: Option<Value>) -> Result<Value> {
        let Some(first) = command.operands.first() else {
            return Err(EngineError::exec("empty command"));
        };

        match first {
            Operand::Function(name) => self.call(name, &command.operands[1..], dot, piped),
            _ if command.operands.len() > 1 || piped.is_some() => Err(EngineError::exec(format!(
                "can't give argument to non-function {}",
                describe(first)
            ))),
            operand => self.operand(operand, dot),
        }
    }

    fn operand(&mut self, operand: &Operand, dot: &Value) -> Result<Value> {
        match operand {
            Operand::Field(path) => field(dot, path),
            Operand::Variable { name, path } => {
                let value = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(var, _)| var == name)
                    .map(|(_, value)| value)
                    .ok_or_else(|| EngineError::UndefinedVariable { name: name.clone() })?;
                field(value, path)
            }
            Operand::Function(name) => self.call(name, &[], dot, None),
            Operand::Literal(literal) => Ok(match literal {
                Literal::String(s) => Value::String(s.clone()),
                Literal::Char(c) => Value::Int(*c as i64),
                Literal::Int(n) => Value::Int(*n),
                Literal::Float(f) => Value::Float(*f),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Nil => Value::Nil,
            }),
            Operand::Parenthesized(pipeline) => self.pipeline(pipeline, dot),
        }
    }

    fn call(
        &mut self,
        name: &str,
        operands: &[Operand],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value> {
        match name {
            "and" | "or" => return self.logical(name == "and", operands, dot, piped),
            _ => {}
        }

        let mut args = Vec::with_capacity(operands.len() + 1);
        for operand in operands {
            args.push(self.operand(operand, dot)?);
        }
        args.extend(piped);

        match name {
            "value" => self.value(&args),
            "render" => self.render(&args),
            "args" => self.arg(&args),
            "nargs" => {
                expect_args(name, &args, 0)?;
                Ok(Value::Int(self.args.len() as i64))
            }
            _ => {
                let helper = functions::lookup(name).ok_or_else(|| EngineError::UnknownFunction {
                    name: name.to_string(),
                    suggestion: suggest_function(name),
                })?;
                helper(&args).map_err(|message| EngineError::function(name, message))
            }
        }
    }

    /// `and` and `or` stop evaluating at the first deciding argument
    fn logical(
        &mut self,
        conjunction: bool,
        operands: &[Operand],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value> {
        let name = if conjunction { "and" } else { "or" };
        if operands.is_empty() && piped.is_none() {
            return Err(EngineError::function(name, "wrong number of args: want at least 1 got 0"));
        }

        let mut last = Value::Nil;
        for operand in operands {
            last = self.operand(operand, dot)?;
            if last.is_truthy() != conjunction {
                return Ok(last);
            }
        }
        if let Some(value) = piped {
            last = value;
        }
        Ok(last)
    }

    fn value(&self, args: &[Value]) -> Result<Value> {
        expect_args("value", args, 1)?;
        let name = string_arg("value", &args[0])?;
        let context = self.interpreter.context;
        context
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::MissingKey {
                key: name.to_string(),
                suggestion: suggest_setter(name, context.names()),
            })
    }

    fn render(&self, args: &[Value]) -> Result<Value> {
        let Some((name, rest)) = args.split_first() else {
            return Err(EngineError::function(
                "render",
                "wrong number of args: want at least 1 got 0",
            ));
        };
        let template = match self.value(std::slice::from_ref(name))? {
            Value::String(text) => text,
            _ => {
                return Err(EngineError::NotAString {
                    name: string_arg("render", name)?.to_string(),
                });
            }
        };
        let nested_args = rest
            .iter()
            .map(|arg| string_arg("render", arg).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;

        self.interpreter
            .execute(&template, &nested_args, self.depth + 1)
            .map(Value::String)
    }

    fn arg(&self, args: &[Value]) -> Result<Value> {
        expect_args("args", args, 1)?;
        let index = args[0].as_int().ok_or_else(|| {
            EngineError::function(
                "args",
                format!("expected an integer index, got {}", args[0].type_name()),
            )
        })?;
        usize::try_from(index)
            .ok()
            .and_then(|i| self.args.get(i))
            .map(|arg| Value::String(arg.clone()))
            .ok_or(EngineError::ArgsOutOfRange {
                index,
                count: self.args.len(),
            })
    }
}

fn field(value: &Value, path: &[String]) -> Result<Value> {
    let mut current = value;
    for key in path {
        current = match current {
            Value::Map(map) => map.get(key).ok_or_else(|| EngineError::MissingField {
                key: key.clone(),
                suggestion: suggest_key(key, map.keys().map(String::as_str)),
            })?,
            Value::Nil => {
                return Err(EngineError::exec(format!(
                    "nil pointer evaluating interface {{}}.{}",
                    key
                )));
            }
            other => {
                return Err(EngineError::exec(format!(
                    "can't evaluate field {} in type {}",
                    key,
                    other.type_name()
                )));
            }
        };
    }
    Ok(current.clone())
}

fn describe(operand: &Operand) -> String {
    match operand {
        Operand::Field(path) => format!(".{}", path.join(".")),
        Operand::Variable { name, path } if path.is_empty() => format!("${}", name),
        Operand::Variable { name, path } => format!("${}.{}", name, path.join(".")),
        Operand::Function(name) => name.clone(),
        Operand::Literal(literal) => literal.to_string(),
        Operand::Parenthesized(_) => "(pipeline)".to_string(),
    }
}

fn expect_args(function: &str, args: &[Value], expected: usize) -> Result<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EngineError::function(
            function,
            format!("wrong number of args: want {} got {}", expected, args.len()),
        ))
    }
}

fn string_arg<'v>(function: &str, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| {
        EngineError::function(
            function,
            format!("expected a string argument, got {}", value.type_name()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TemplateContext {
        let mut context = TemplateContext::new();
        context.insert("region", Value::from("ap-southeast-2"));
        context.insert("replicas", Value::Int(3));
        context.insert(
            "hosts",
            Value::from(vec!["example.com".to_string(), "dead.beef".to_string()]),
        );
        context.insert("greeting", Value::from("hello {{ args 0 }}-{{ args 1 }} ({{ nargs }})"));
        context.insert("loop", Value::from("{{ render \"loop\" }}"));
        context.insert("count", Value::Int(2));
        context
    }

    fn render(text: &str) -> Result<String> {
        let context = context();
        let delimiters = Delimiters::default();
        Interpreter::new(&context, &delimiters).render(text)
    }

    #[test]
    fn test_value_and_fields() {
        assert_eq!(render("{{ value \"region\" }}").unwrap(), "ap-southeast-2");
        assert_eq!(render("{{ .Values.region }}").unwrap(), "ap-southeast-2");
        assert_eq!(render("{{ $.Values.replicas }}").unwrap(), "3");
        assert_eq!(render("{{ value \"hosts\" }}").unwrap(), "[example.com dead.beef]");
    }

    #[test]
    fn test_missing_value_suggests_setter() {
        let err = render("{{ value \"regoin\" }}").unwrap_err();
        assert_eq!(err.to_string(), "template specifies missing key regoin");
        match err {
            EngineError::MissingKey { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("Did you mean `region`?"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_is_error() {
        let err = render("{{ .Values.nope }}").unwrap_err();
        assert!(matches!(err, EngineError::MissingField { ref key, .. } if key == "nope"));
    }

    #[test]
    fn test_render_with_args() {
        assert_eq!(
            render("{{ render \"greeting\" \"a\" \"b\" }}").unwrap(),
            "hello a-b (2)"
        );
    }

    #[test]
    fn test_render_non_string_template() {
        let err = render("{{ render \"replicas\" }}").unwrap_err();
        assert_eq!(err.to_string(), "referenced template 'replicas' is not a string");
    }

    #[test]
    fn test_render_recursion_limit() {
        let err = render("{{ render \"loop\" }}").unwrap_err();
        assert!(matches!(err, EngineError::RecursionLimit { limit: MAX_RENDER_DEPTH }));
    }

    #[test]
    fn test_args_out_of_range() {
        let err = render("{{ args 0 }}").unwrap_err();
        assert!(matches!(err, EngineError::ArgsOutOfRange { index: 0, count: 0 }));
    }

    #[test]
    fn test_pipelines() {
        assert_eq!(
            render("{{ value \"hosts\" | sortAlpha | join \",\" }}").unwrap(),
            "dead.beef,example.com"
        );
        assert_eq!(render("{{ \"x\" | printf \"%s-%s\" \"a\" }}").unwrap(), "a-x");
        assert_eq!(
            render("{{ (value \"count\") | add1 }}").unwrap_err().to_string(),
            "function \"add1\" not defined"
        );
    }

    #[test]
    fn test_control_flow() {
        assert_eq!(
            render("{{ if eq (value \"region\") \"us-east-1\" }}us{{ else if .Values.replicas }}many{{ else }}none{{ end }}")
                .unwrap(),
            "many"
        );
        assert_eq!(
            render("{{ range $i, $h := value \"hosts\" }}{{ $i }}={{ $h }};{{ end }}").unwrap(),
            "0=example.com;1=dead.beef;"
        );
        assert_eq!(
            render("{{ with value \"region\" }}{{ . }}{{ end }}").unwrap(),
            "ap-southeast-2"
        );
        assert_eq!(render("{{ range list }}x{{ else }}empty{{ end }}").unwrap(), "empty");
    }

    #[test]
    fn test_variables() {
        assert_eq!(
            render("{{ $r := value \"region\" }}{{ $r = upper $r }}{{ $r }}").unwrap(),
            "AP-SOUTHEAST-2"
        );
        let err = render("{{ $undefined = 1 }}").unwrap_err();
        assert!(matches!(err, EngineError::UndefinedVariable { .. }));
    }

    #[test]
    fn test_lazy_and_or() {
        assert_eq!(render("{{ or \"\" \"fallback\" }}").unwrap(), "fallback");
        assert_eq!(render("{{ and false (value \"nope\") }}").unwrap(), "false");
        assert_eq!(render("{{ or (value \"region\") (value \"nope\") }}").unwrap(), "ap-southeast-2");
    }

    #[test]
    fn test_custom_delimiters() {
        let context = context();
        let delimiters = Delimiters::new("[[", "]]");
        let out = Interpreter::new(&context, &delimiters)
            .render("{{ kept }} [[ value \"region\" ]]")
            .unwrap();
        assert_eq!(out, "{{ kept }} ap-southeast-2");
    }

    #[test]
    fn test_argument_to_non_function() {
        let err = render("{{ \"a\" | .Values.region }}").unwrap_err();
        assert!(err.to_string().starts_with("can't give argument to non-function"));
    }

    #[test]
    fn test_oversized_repeat_is_an_error() {
        let err = render("{{ repeat 9223372036854775807 \"x\" }}").unwrap_err();
        assert!(matches!(err, EngineError::Function { ref function, .. } if function == "repeat"));
        assert!(err.to_string().starts_with("error calling repeat: result would exceed"));
    }
}
