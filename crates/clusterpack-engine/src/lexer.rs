//! Text/action splitting with runtime delimiters
//!
//! Delimiters are chosen per resource or subtree, so actions are located by
//! scanning rather than by the grammar. Quoted strings, raw strings, character
//! constants and comments inside an action may contain the right delimiter.

use crate::error::{EngineError, Result};

pub const DEFAULT_LEFT: &str = "{{";
pub const DEFAULT_RIGHT: &str = "}}";

/// Left and right action delimiters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub left: String,
    pub right: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            left: DEFAULT_LEFT.to_string(),
            right: DEFAULT_RIGHT.to_string(),
        }
    }
}

impl Delimiters {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Parse a `"<left> <right>"` pair
    pub fn parse(value: &str) -> Result<Self> {
        let tokens: Vec<&str> = value.split_whitespace().collect();
        match tokens.as_slice() {
            [left, right] => Ok(Self::new(*left, *right)),
            _ => Err(EngineError::InvalidDelimiters {
                value: value.to_string(),
            }),
        }
    }

    pub fn is_default(&self) -> bool {
        self.left == DEFAULT_LEFT && self.right == DEFAULT_RIGHT
    }
}

/// A lexed template segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Literal text, already trimmed by neighbouring `-` markers
    Text(&'a str),
    /// Action body between the delimiters, without trim markers
    Action { body: &'a str, offset: usize },
}

/// Split a template into text and action tokens
pub fn tokenize<'a>(input: &'a str, delimiters: &Delimiters) -> Result<Vec<Token<'a>>> {
    let left = delimiters.left.as_str();
    let right = delimiters.right.as_str();

    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    while pos < input.len() {
        let rest = &input[pos..];
        let Some(found) = rest.find(left) else {
            push_text(&mut tokens, rest, trim_next, false);
            break;
        };

        let open = pos + found;
        let mut body_start = open + left.len();
        let trim_left = has_left_trim(&input[body_start..]);
        if trim_left {
            body_start += 1;
        }
        push_text(&mut tokens, &input[pos..open], trim_next, trim_left);

        let close = find_close(input, body_start, right)
            .ok_or(EngineError::UnclosedAction { offset: open })?;

        let mut body = &input[body_start..close];
        let trim_right = has_right_trim(body);
        if trim_right {
            body = &body[..body.len() - 1];
        }

        tokens.push(Token::Action { body, offset: open });
        trim_next = trim_right;
        pos = close + right.len();
    }

    Ok(tokens)
}

fn push_text<'a>(tokens: &mut Vec<Token<'a>>, text: &'a str, trim_start: bool, trim_end: bool) {
    let mut text = text;
    if trim_start {
        text = text.trim_start();
    }
    if trim_end {
        text = text.trim_end();
    }
    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
}

/// `{{- ` requires whitespace after the dash
fn has_left_trim(after_delim: &str) -> bool {
    after_delim
        .strip_prefix('-')
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_whitespace()))
}

/// ` -}}` requires whitespace before the dash
fn has_right_trim(body: &str) -> bool {
    body.strip_suffix('-')
        .is_some_and(|rest| rest.ends_with(|c: char| c.is_ascii_whitespace()))
}

/// Byte offset of the closing delimiter, skipping quoted sections
fn find_close(input: &str, start: usize, right: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = start;

    while i < input.len() {
        let rest = &input[i..];
        if rest.starts_with(right) {
            return Some(i);
        }
        i = match bytes[i] {
            b'"' => skip_quoted(bytes, i, b'"')?,
            b'\'' => skip_quoted(bytes, i, b'\'')?,
            b'`' => i + 1 + rest[1..].find('`')? + 1,
            b'/' if rest.starts_with("/*") => i + 2 + rest[2..].find("*/")? + 2,
            _ => i + rest.chars().next().map_or(1, char::len_utf8),
        };
    }

    None
}

/// Offset just past the closing quote, honouring backslash escapes
fn skip_quoted(bytes: &[u8], open: usize, quote: u8) -> Option<usize> {
    let mut j = open + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b if b == quote => return Some(j + 1),
            _ => j += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token<'_>> {
        tokenize(input, &Delimiters::default()).unwrap()
    }

    #[test]
    fn test_delimiters_parse() {
        assert_eq!(Delimiters::parse("[[ ]]").unwrap(), Delimiters::new("[[", "]]"));
        assert_eq!(Delimiters::parse("  <%   %>  ").unwrap(), Delimiters::new("<%", "%>"));
        for bad in ["[[", "", "a b c"] {
            assert!(matches!(
                Delimiters::parse(bad),
                Err(EngineError::InvalidDelimiters { .. })
            ));
        }
    }

    #[test]
    fn test_text_and_actions() {
        let tokens = lex("a {{ .x }} b");
        assert_eq!(
            tokens,
            vec![
                Token::Text("a "),
                Token::Action {
                    body: " .x ",
                    offset: 2
                },
                Token::Text(" b"),
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        let tokens = lex("a  {{- .x -}}  b");
        assert_eq!(tokens[0], Token::Text("a"));
        assert!(matches!(tokens[1], Token::Action { body: " .x ", .. }));
        assert_eq!(tokens[2], Token::Text("b"));
    }

    #[test]
    fn test_dash_without_space_is_not_trim() {
        let tokens = lex("a {{-3}}");
        assert_eq!(tokens[0], Token::Text("a "));
        assert!(matches!(tokens[1], Token::Action { body: "-3", .. }));
    }

    #[test]
    fn test_delimiter_inside_string() {
        let tokens = lex(r#"{{ print "}}" `}}` '}' }}!"#);
        assert!(matches!(
            tokens[0],
            Token::Action {
                body: r#" print "}}" `}}` '}' "#,
                ..
            }
        ));
        assert_eq!(tokens[1], Token::Text("!"));
    }

    #[test]
    fn test_comment_may_contain_delimiter() {
        let tokens = lex("{{/* }} */}}x");
        assert!(matches!(tokens[0], Token::Action { body: "/* }} */", .. }));
    }

    #[test]
    fn test_custom_delimiters_leave_braces_alone() {
        let delims = Delimiters::new("[[", "]]");
        let tokens = tokenize("{{ keep }} [[ .x ]]", &delims).unwrap();
        assert_eq!(tokens[0], Token::Text("{{ keep }} "));
        assert!(matches!(tokens[1], Token::Action { body: " .x ", .. }));
    }

    #[test]
    fn test_unclosed_action() {
        let err = tokenize("ok {{ .x", &Delimiters::default()).unwrap_err();
        assert!(matches!(err, EngineError::UnclosedAction { offset: 3 }));

        let err = tokenize(r#"{{ "}} }}"#, &Delimiters::default()).unwrap_err();
        assert!(matches!(err, EngineError::UnclosedAction { .. }));
    }
}
