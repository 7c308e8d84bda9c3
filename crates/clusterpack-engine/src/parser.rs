//! Template parser
//!
//! Action bodies are parsed with pest; the lexer's token stream is then
//! folded into a block tree.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::*;
use crate::error::EngineError;
use crate::lexer::{Delimiters, Token, tokenize};

#[derive(Parser)]
#[grammar = "template.pest"]
struct ActionParser;

/// Parser error
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Parse error: {0}")]
    Pest(Box<pest::error::Error<Rule>>),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Invalid string: {0}")]
    InvalidString(String),

    #[error("Unexpected rule: {0:?}")]
    UnexpectedRule(Rule),
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        ParseError::Pest(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Parse a template using the given delimiters
pub fn parse_template(input: &str, delimiters: &Delimiters) -> std::result::Result<Template, EngineError> {
    let mut items = Vec::new();
    for token in tokenize(input, delimiters)? {
        match token {
            Token::Text(text) => items.push(Item::Text(text.to_string())),
            Token::Action { body, .. } => {
                let action = parse_action(body).map_err(|source| EngineError::Parse {
                    action: body.trim().to_string(),
                    source,
                })?;
                if !matches!(action, ActionBody::Comment(_)) {
                    items.push(Item::Action(action));
                }
            }
        }
    }

    let mut builder = TreeBuilder {
        items: items.into_iter(),
    };
    let (nodes, terminator) = builder.list()?;
    if let Some(terminator) = terminator {
        return Err(EngineError::UnexpectedKeyword {
            keyword: terminator.keyword().to_string(),
        });
    }
    Ok(Template { nodes })
}

/// Parse the body of a single action (the text between the delimiters)
pub fn parse_action(input: &str) -> Result<ActionBody> {
    let action = ActionParser::parse(Rule::action, input)?
        .next()
        .ok_or(ParseError::UnexpectedRule(Rule::action))?;

    let inner = action
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .ok_or(ParseError::UnexpectedRule(Rule::action))?;

    match inner.as_rule() {
        Rule::comment => {
            let text = inner.as_str();
            let content = text
                .strip_prefix("/*")
                .and_then(|s| s.strip_suffix("*/"))
                .unwrap_or(text)
                .to_string();
            Ok(ActionBody::Comment(content))
        }
        Rule::if_action => Ok(ActionBody::If(pipeline_from_inner(inner)?)),
        Rule::else_if_action => Ok(ActionBody::ElseIf(pipeline_from_inner(inner)?)),
        Rule::else_action => Ok(ActionBody::Else),
        Rule::end_action => Ok(ActionBody::End),
        Rule::with_action => Ok(ActionBody::With(pipeline_from_inner(inner)?)),
        Rule::range_action => {
            let mut vars = None;
            let mut pipeline = None;
            for part in inner.into_inner() {
                match part.as_rule() {
                    Rule::range_clause => vars = Some(parse_range_clause(part)),
                    Rule::pipeline => pipeline = Some(parse_pipeline(part)?),
                    _ => {}
                }
            }
            let pipeline = pipeline.ok_or(ParseError::UnexpectedRule(Rule::range_action))?;
            Ok(ActionBody::Range { vars, pipeline })
        }
        Rule::pipeline => Ok(ActionBody::Pipeline(parse_pipeline(inner)?)),
        other => Err(ParseError::UnexpectedRule(other)),
    }
}

fn pipeline_from_inner(pair: Pair<Rule>) -> Result<Pipeline> {
    let rule = pair.as_rule();
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::pipeline)
        .map(parse_pipeline)
        .unwrap_or(Err(ParseError::UnexpectedRule(rule)))
}

fn parse_pipeline(pair: Pair<Rule>) -> Result<Pipeline> {
    let mut decl = None;
    let mut commands = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::declaration => decl = Some(parse_declaration(inner)),
            Rule::command => commands.push(parse_command(inner)?),
            other => return Err(ParseError::UnexpectedRule(other)),
        }
    }

    Ok(Pipeline { decl, commands })
}

fn parse_declaration(pair: Pair<Rule>) -> Declaration {
    let mut variable = String::new();
    let mut define = false;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::variable => variable = variable_name(inner.as_str()),
            Rule::define => define = true,
            _ => {}
        }
    }
    Declaration { variable, define }
}

fn parse_command(pair: Pair<Rule>) -> Result<Command> {
    let operands = pair
        .into_inner()
        .map(parse_operand)
        .collect::<Result<Vec<_>>>()?;
    Ok(Command { operands })
}

fn parse_operand(pair: Pair<Rule>) -> Result<Operand> {
    match pair.as_rule() {
        Rule::parenthesized => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or(ParseError::UnexpectedRule(Rule::parenthesized))?;
            Ok(Operand::Parenthesized(Box::new(parse_pipeline(inner)?)))
        }
        Rule::literal => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or(ParseError::UnexpectedRule(Rule::literal))?;
            Ok(Operand::Literal(parse_literal(inner)?))
        }
        Rule::field_chain => Ok(Operand::Field(split_path(pair.as_str()))),
        Rule::variable_field => {
            let text = pair.as_str().trim_start_matches('$');
            let (name, path) = text.split_once('.').unwrap_or((text, ""));
            Ok(Operand::Variable {
                name: name.to_string(),
                path: split_path(path),
            })
        }
        Rule::variable => Ok(Operand::Variable {
            name: variable_name(pair.as_str()),
            path: Vec::new(),
        }),
        Rule::identifier => Ok(Operand::Function(pair.as_str().to_string())),
        other => Err(ParseError::UnexpectedRule(other)),
    }
}

fn variable_name(text: &str) -> String {
    text.trim_start_matches('$').to_string()
}

fn split_path(text: &str) -> Vec<String> {
    text.split('.')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parse_literal(pair: Pair<Rule>) -> Result<Literal> {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::string => Ok(Literal::String(unescape(
            text.strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .ok_or_else(|| ParseError::InvalidString(text.to_string()))?,
        )?)),
        Rule::raw_string => Ok(Literal::String(text.trim_matches('`').to_string())),
        Rule::char_lit => {
            let inner = text
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .ok_or_else(|| ParseError::InvalidString(text.to_string()))?;
            unescape(inner)?
                .chars()
                .next()
                .map(Literal::Char)
                .ok_or_else(|| ParseError::InvalidString(text.to_string()))
        }
        Rule::number => parse_number(text),
        Rule::boolean => Ok(Literal::Bool(text == "true")),
        Rule::nil => Ok(Literal::Nil),
        other => Err(ParseError::UnexpectedRule(other)),
    }
}

fn parse_number(text: &str) -> Result<Literal> {
    let invalid = || ParseError::InvalidNumber(text.to_string());
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        let n = i64::from_str_radix(hex, 16).map_err(|_| invalid())?;
        return Ok(Literal::Int(if negative { -n } else { n }));
    }

    if digits.contains(['.', 'e', 'E']) {
        let n: f64 = text.parse().map_err(|_| invalid())?;
        return Ok(Literal::Float(n));
    }

    let n: i64 = text.parse().map_err(|_| invalid())?;
    Ok(Literal::Int(n))
}

fn unescape(inner: &str) -> Result<String> {
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('\'') => result.push('\''),
            Some(other) => {
                return Err(ParseError::InvalidString(format!("unknown escape \\{}", other)));
            }
            None => return Err(ParseError::InvalidString(inner.to_string())),
        }
    }

    Ok(result)
}

fn parse_range_clause(pair: Pair<Rule>) -> RangeVars {
    let mut vars: Vec<String> = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::variable)
        .map(|p| variable_name(p.as_str()))
        .collect();

    if vars.len() >= 2 {
        let value_var = vars.remove(1);
        RangeVars {
            index_var: Some(vars.remove(0)),
            value_var,
        }
    } else {
        RangeVars {
            index_var: None,
            value_var: vars.pop().unwrap_or_default(),
        }
    }
}

enum Item {
    Text(String),
    Action(ActionBody),
}

/// Action that closes the list being built
enum Terminator {
    End,
    Else,
    ElseIf(Pipeline),
}

impl Terminator {
    fn keyword(&self) -> &'static str {
        match self {
            Terminator::End => "{{end}}",
            Terminator::Else => "{{else}}",
            Terminator::ElseIf(_) => "{{else if}}",
        }
    }
}

struct TreeBuilder {
    items: std::vec::IntoIter<Item>,
}

type ListResult = std::result::Result<(Vec<TemplateNode>, Option<Terminator>), EngineError>;

impl TreeBuilder {
    fn list(&mut self) -> ListResult {
        let mut nodes = Vec::new();

        while let Some(item) = self.items.next() {
            let action = match item {
                Item::Text(text) => {
                    nodes.push(TemplateNode::Text(text));
                    continue;
                }
                Item::Action(action) => action,
            };

            match action {
                ActionBody::End => return Ok((nodes, Some(Terminator::End))),
                ActionBody::Else => return Ok((nodes, Some(Terminator::Else))),
                ActionBody::ElseIf(p) => return Ok((nodes, Some(Terminator::ElseIf(p)))),
                ActionBody::Comment(_) => {}
                ActionBody::Pipeline(p) => nodes.push(TemplateNode::Output(p)),
                ActionBody::If(p) => nodes.push(self.if_block(p)?),
                ActionBody::Range { vars, pipeline } => {
                    let (body, otherwise) = self.block_with_else("range")?;
                    nodes.push(TemplateNode::Range {
                        vars,
                        pipeline,
                        body,
                        otherwise,
                    });
                }
                ActionBody::With(pipeline) => {
                    let (body, otherwise) = self.block_with_else("with")?;
                    nodes.push(TemplateNode::With {
                        pipeline,
                        body,
                        otherwise,
                    });
                }
            }
        }

        Ok((nodes, None))
    }

    fn if_block(&mut self, condition: Pipeline) -> std::result::Result<TemplateNode, EngineError> {
        let mut branches = Vec::new();
        let mut condition = condition;

        loop {
            let (body, terminator) = self.list()?;
            branches.push((condition, body));
            match terminator {
                Some(Terminator::End) => {
                    return Ok(TemplateNode::If {
                        branches,
                        otherwise: Vec::new(),
                    });
                }
                Some(Terminator::ElseIf(next)) => condition = next,
                Some(Terminator::Else) => {
                    let otherwise = self.closing_list("if")?;
                    return Ok(TemplateNode::If {
                        branches,
                        otherwise,
                    });
                }
                None => return Err(unclosed("if")),
            }
        }
    }

    fn block_with_else(
        &mut self,
        block: &str,
    ) -> std::result::Result<(Vec<TemplateNode>, Vec<TemplateNode>), EngineError> {
        let (body, terminator) = self.list()?;
        match terminator {
            Some(Terminator::End) => Ok((body, Vec::new())),
            Some(Terminator::Else) => Ok((body, self.closing_list(block)?)),
            Some(other) => Err(EngineError::UnexpectedKeyword {
                keyword: format!("{} in {}", other.keyword(), block),
            }),
            None => Err(unclosed(block)),
        }
    }

    /// A list that must be closed by `end`
    fn closing_list(&mut self, block: &str) -> std::result::Result<Vec<TemplateNode>, EngineError> {
        let (nodes, terminator) = self.list()?;
        match terminator {
            Some(Terminator::End) => Ok(nodes),
            Some(other) => Err(EngineError::UnexpectedKeyword {
                keyword: format!("{} after else in {}", other.keyword(), block),
            }),
            None => Err(unclosed(block)),
        }
    }
}

fn unclosed(block: &str) -> EngineError {
    EngineError::UnclosedBlock {
        block: block.to_string(),
    }
}
