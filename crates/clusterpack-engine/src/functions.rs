//! Template functions
//!
//! Go's built-in functions plus the subset of the sprig library used by
//! packages. Arguments arrive in call order with any piped value last, so
//! sprig's "subject last" convention (`.x | trimPrefix "-"`) works unchanged.
//!
//! `and`, `or` and the package primitives (`value`, `render`, `args`,
//! `nargs`) need the interpreter and are handled there.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::value::Value;

/// Largest string `repeat`, `indent` and `nindent` will build, in bytes
pub const MAX_GENERATED_LEN: usize = 1 << 20;

/// A helper receives its evaluated arguments; errors are plain messages
pub type HelperFn = fn(&[Value]) -> Result<Value, String>;

static FUNCTIONS: Lazy<HashMap<&'static str, HelperFn>> = Lazy::new(|| {
    let entries: Vec<(&'static str, HelperFn)> = vec![
        // Built-ins
        ("not", not),
        ("eq", eq),
        ("ne", ne),
        ("lt", lt),
        ("le", le),
        ("gt", gt),
        ("ge", ge),
        ("len", len),
        ("index", index),
        ("print", print),
        ("printf", printf),
        ("println", println),
        // Strings
        ("upper", upper),
        ("lower", lower),
        ("title", title),
        ("untitle", untitle),
        ("camelcase", camelcase),
        ("kebabcase", kebabcase),
        ("snakecase", snakecase),
        ("trim", trim),
        ("trimAll", trim_all),
        ("trimPrefix", trim_prefix),
        ("trimSuffix", trim_suffix),
        ("replace", replace),
        ("contains", contains),
        ("hasPrefix", has_prefix),
        ("hasSuffix", has_suffix),
        ("repeat", repeat),
        ("substr", substr),
        ("trunc", trunc),
        ("quote", quote),
        ("squote", squote),
        ("cat", cat),
        ("indent", indent),
        ("nindent", nindent),
        ("nospace", nospace),
        // Lists
        ("list", list),
        ("join", join),
        ("split", split),
        ("splitList", split_list),
        ("sortAlpha", sort_alpha),
        ("uniq", uniq),
        ("first", first),
        ("last", last),
        ("rest", rest),
        ("initial", initial),
        ("reverse", reverse),
        ("has", has),
        ("compact", compact),
        ("append", append),
        ("prepend", prepend),
        ("concat", concat),
        // Defaults
        ("default", default),
        ("empty", empty),
        ("coalesce", coalesce),
        ("ternary", ternary),
        ("required", required),
        // Encoding
        ("toString", to_string),
        ("toJson", to_json),
        ("b64enc", b64enc),
        ("b64dec", b64dec),
        ("sha256sum", sha256sum),
    ];
    entries.into_iter().collect()
});

/// Look up a helper by name
pub fn lookup(name: &str) -> Option<HelperFn> {
    FUNCTIONS.get(name).copied()
}

/// Every registered helper name, sorted
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = FUNCTIONS.keys().copied().collect();
    names.sort_unstable();
    names
}

// ============ Argument helpers ============

fn arity(args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!(
            "wrong number of args: want {} got {}",
            expected,
            args.len()
        ))
    }
}

fn at_least(args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() >= expected {
        Ok(())
    } else {
        Err(format!(
            "wrong number of args: want at least {} got {}",
            expected,
            args.len()
        ))
    }
}

/// String form of a scalar argument; nil becomes empty
fn text(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        other => other.to_string(),
    }
}

fn int(value: &Value) -> Result<i64, String> {
    match value {
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("expected an integer, got {:?}", s)),
        other => other
            .as_int()
            .ok_or_else(|| format!("expected an integer, got {}", other.type_name())),
    }
}

fn items(value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Nil => Ok(Vec::new()),
        other => Err(format!("expected a list, got {}", other.type_name())),
    }
}

fn strings(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::List(items) => Ok(items.iter().filter(|v| **v != Value::Nil).map(text).collect()),
        Value::Nil => Ok(Vec::new()),
        other => Ok(vec![text(other)]),
    }
}

// ============ Built-ins ============

/// Boolean negation of the argument's truthiness
///
/// Usage: {{ not .x }}
fn not(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Bool(!args[0].is_truthy()))
}

/// True when the first argument equals any of the others
///
/// Usage: {{ eq .x "a" "b" }}
fn eq(args: &[Value]) -> Result<Value, String> {
    at_least(args, 2)?;
    for other in &args[1..] {
        if args[0].basic_eq(other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn ne(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(!args[0].basic_eq(&args[1])?))
}

fn lt(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(args[0].basic_cmp(&args[1])?.is_lt()))
}

fn le(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(args[0].basic_cmp(&args[1])?.is_le()))
}

fn gt(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(args[0].basic_cmp(&args[1])?.is_gt()))
}

fn ge(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(args[0].basic_cmp(&args[1])?.is_ge()))
}

fn len(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    args[0]
        .len()
        .map(|n| Value::Int(n as i64))
        .ok_or_else(|| format!("len of type {}", args[0].type_name()))
}

/// Index into lists by position and maps by key
///
/// Usage: {{ index .Values.hosts 0 }}
fn index(args: &[Value]) -> Result<Value, String> {
    at_least(args, 1)?;
    let mut current = args[0].clone();
    for key in &args[1..] {
        current = match (&current, key) {
            (Value::List(items), _) => {
                let i = int(key)?;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or_else(|| format!("index out of range: {}", i))?
            }
            (Value::Map(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Nil),
            (Value::Nil, _) => return Err("index of untyped nil".to_string()),
            (other, _) => return Err(format!("can't index item of type {}", other.type_name())),
        };
    }
    Ok(current)
}

/// Go `fmt.Sprint`: spaces only between operands when neither is a string
fn print(args: &[Value]) -> Result<Value, String> {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !matches!(arg, Value::String(_)) && !matches!(args[i - 1], Value::String(_)) {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    Ok(Value::String(out))
}

fn println(args: &[Value]) -> Result<Value, String> {
    let mut out = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
    out.push('\n');
    Ok(Value::String(out))
}

/// Go `fmt.Sprintf` for the verbs `%v %s %d %f %q %t %x %X %%`
///
/// Usage: {{ printf "%s-%03d" .name 7 }}
fn printf(args: &[Value]) -> Result<Value, String> {
    at_least(args, 1)?;
    let format = text(&args[0]);
    let mut operands = args[1..].iter();
    let mut out = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut left_align = false;
        let mut zero_pad = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => left_align = true,
                '0' => zero_pad = true,
                '+' | ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }

        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }

        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            precision = Some(digits.parse::<usize>().unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }

        let Some(operand) = operands.next() else {
            let _ = write!(out, "%!{}(MISSING)", verb);
            continue;
        };

        let formatted = match (verb, operand) {
            ('v', v) => v.to_string(),
            ('s', Value::String(s)) => match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            },
            ('s', v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                format!("%!s({}={})", v.type_name(), v)
            }
            ('s', v) => v.to_string(),
            ('d', Value::Int(n)) => n.to_string(),
            ('f' | 'F', Value::Float(x)) => format!("{:.*}", precision.unwrap_or(6), x),
            ('f' | 'F', Value::Int(n)) => format!("%!f(int={})", n),
            ('q', Value::String(s)) => go_quote(s, '"'),
            ('t', Value::Bool(b)) => b.to_string(),
            ('x', Value::Int(n)) => format!("{:x}", n),
            ('X', Value::Int(n)) => format!("{:X}", n),
            ('x', Value::String(s)) => hex::encode(s.as_bytes()),
            ('X', Value::String(s)) => hex::encode_upper(s.as_bytes()),
            (verb, v) => format!("%!{}({}={})", verb, v.type_name(), v),
        };

        let width: usize = width.parse().unwrap_or(0);
        let padding = width.saturating_sub(formatted.chars().count());
        if padding == 0 {
            out.push_str(&formatted);
        } else if left_align {
            out.push_str(&formatted);
            out.push_str(&" ".repeat(padding));
        } else if zero_pad && matches!(operand, Value::Int(_) | Value::Float(_)) {
            match formatted.strip_prefix('-') {
                Some(digits) => {
                    out.push('-');
                    out.push_str(&"0".repeat(padding));
                    out.push_str(digits);
                }
                None => {
                    out.push_str(&"0".repeat(padding));
                    out.push_str(&formatted);
                }
            }
        } else {
            out.push_str(&" ".repeat(padding));
            out.push_str(&formatted);
        }
    }

    let extra: Vec<_> = operands.collect();
    if !extra.is_empty() {
        out.push_str("%!(EXTRA ");
        let rendered: Vec<_> = extra
            .iter()
            .map(|v| format!("{}={}", v.type_name(), v))
            .collect();
        out.push_str(&rendered.join(", "));
        out.push(')');
    }

    Ok(Value::String(out))
}

fn go_quote(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

// ============ Strings ============

fn upper(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(text(&args[0]).to_uppercase()))
}

fn lower(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(text(&args[0]).to_lowercase()))
}

fn map_word_starts(s: &str, f: impl Fn(char) -> String) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_start = true;
    for c in s.chars() {
        if at_start && !c.is_whitespace() {
            out.push_str(&f(c));
        } else {
            out.push(c);
        }
        at_start = c.is_whitespace();
    }
    out
}

/// Upper-case the first letter of every word
///
/// Usage: {{ title "hello world" }}
fn title(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(map_word_starts(&text(&args[0]), |c| {
        c.to_uppercase().collect()
    })))
}

fn untitle(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(map_word_starts(&text(&args[0]), |c| {
        c.to_lowercase().collect()
    })))
}

/// Split identifiers on separators and case changes (`HTTPServer_name` is
/// `HTTP`, `Server`, `name`)
fn words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if matches!(c, '_' | '-' | '.' | ' ' | '\t') {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Usage: {{ camelcase "http_server" }} renders `HttpServer`
fn camelcase(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let s = text(&args[0]);
    let out = s
        .split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    Ok(Value::String(out))
}

/// Usage: {{ kebabcase "FirstName" }} renders `first-name`
fn kebabcase(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let joined = words(&text(&args[0])).join("-").to_lowercase();
    Ok(Value::String(joined))
}

/// Usage: {{ snakecase "FirstName" }} renders `first_name`
fn snakecase(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let joined = words(&text(&args[0])).join("_").to_lowercase();
    Ok(Value::String(joined))
}

fn trim(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(text(&args[0]).trim().to_string()))
}

/// Usage: {{ trimAll "$" "$5.00" }}
fn trim_all(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let cutset: Vec<char> = text(&args[0]).chars().collect();
    Ok(Value::String(
        text(&args[1]).trim_matches(cutset.as_slice()).to_string(),
    ))
}

fn trim_prefix(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let (prefix, s) = (text(&args[0]), text(&args[1]));
    Ok(Value::String(s.strip_prefix(prefix.as_str()).unwrap_or(&s).to_string()))
}

fn trim_suffix(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let (suffix, s) = (text(&args[0]), text(&args[1]));
    Ok(Value::String(s.strip_suffix(suffix.as_str()).unwrap_or(&s).to_string()))
}

/// Usage: {{ .name | replace "-" "_" }}
fn replace(args: &[Value]) -> Result<Value, String> {
    arity(args, 3)?;
    Ok(Value::String(
        text(&args[2]).replace(&text(&args[0]), &text(&args[1])),
    ))
}

fn contains(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(text(&args[1]).contains(&text(&args[0]))))
}

fn has_prefix(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(text(&args[1]).starts_with(&text(&args[0]))))
}

fn has_suffix(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(text(&args[1]).ends_with(&text(&args[0]))))
}

fn repeat(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let count = usize::try_from(int(&args[0])?).map_err(|_| "negative repeat count".to_string())?;
    let s = text(&args[1]);
    check_generated_len(s.len().checked_mul(count))?;
    Ok(Value::String(s.repeat(count)))
}

fn check_generated_len(len: Option<usize>) -> Result<(), String> {
    match len {
        Some(len) if len <= MAX_GENERATED_LEN => Ok(()),
        _ => Err(format!("result would exceed {} bytes", MAX_GENERATED_LEN)),
    }
}

/// Usage: {{ substr 0 5 "hello world" }}
fn substr(args: &[Value]) -> Result<Value, String> {
    arity(args, 3)?;
    let (start, end) = (int(&args[0])?, int(&args[1])?);
    let chars: Vec<char> = text(&args[2]).chars().collect();
    let len = chars.len() as i64;

    let out: String = if start < 0 {
        chars[..end.clamp(0, len) as usize].iter().collect()
    } else if end < 0 || end > len {
        chars[start.min(len) as usize..].iter().collect()
    } else {
        chars[start.min(end) as usize..end as usize].iter().collect()
    };
    Ok(Value::String(out))
}

/// Keep the first n characters, or the last -n when negative
fn trunc(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let n = int(&args[0])?;
    let chars: Vec<char> = text(&args[1]).chars().collect();
    let len = chars.len() as i64;
    let out: String = if n >= 0 {
        chars[..n.min(len) as usize].iter().collect()
    } else {
        chars[(len + n).max(0) as usize..].iter().collect()
    };
    Ok(Value::String(out))
}

fn quote_with(args: &[Value], quote: char) -> Value {
    let quoted: Vec<String> = args
        .iter()
        .filter(|v| **v != Value::Nil)
        .map(|v| match quote {
            '"' => go_quote(&text(v), '"'),
            _ => format!("{}{}{}", quote, text(v), quote),
        })
        .collect();
    Value::String(quoted.join(" "))
}

/// Usage: {{ .name | quote }}
fn quote(args: &[Value]) -> Result<Value, String> {
    Ok(quote_with(args, '"'))
}

fn squote(args: &[Value]) -> Result<Value, String> {
    Ok(quote_with(args, '\''))
}

fn cat(args: &[Value]) -> Result<Value, String> {
    let parts: Vec<String> = args.iter().filter(|v| **v != Value::Nil).map(text).collect();
    Ok(Value::String(parts.join(" ")))
}

fn pad_lines(spaces: i64, s: &str) -> Result<String, String> {
    let spaces = usize::try_from(spaces).unwrap_or(0);
    let lines = s.split('\n').count();
    check_generated_len(
        spaces
            .checked_mul(lines)
            .and_then(|padding| padding.checked_add(s.len())),
    )?;

    let pad = " ".repeat(spaces);
    Ok(s.split('\n')
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Usage: {{ .block | indent 4 }}
fn indent(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::String(pad_lines(int(&args[0])?, &text(&args[1]))?))
}

fn nindent(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::String(format!(
        "\n{}",
        pad_lines(int(&args[0])?, &text(&args[1]))?
    )))
}

fn nospace(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(
        text(&args[0]).chars().filter(|c| !c.is_whitespace()).collect(),
    ))
}

// ============ Lists ============

fn list(args: &[Value]) -> Result<Value, String> {
    Ok(Value::List(args.to_vec()))
}

/// Usage: {{ value "hosts" | join "," }}
fn join(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::String(strings(&args[1])?.join(&text(&args[0]))))
}

/// Sprig `split` returns a map keyed `_0`, `_1`, ...
fn split(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let (sep, s) = (text(&args[0]), text(&args[1]));
    let map: BTreeMap<String, Value> = s
        .split(sep.as_str())
        .enumerate()
        .map(|(i, part)| (format!("_{}", i), Value::from(part)))
        .collect();
    Ok(Value::Map(map))
}

fn split_list(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let (sep, s) = (text(&args[0]), text(&args[1]));
    Ok(Value::List(s.split(sep.as_str()).map(Value::from).collect()))
}

fn sort_alpha(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let mut values = strings(&args[0])?;
    values.sort();
    Ok(Value::from(values))
}

fn uniq(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let mut out: Vec<Value> = Vec::new();
    for item in items(&args[0])? {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    Ok(Value::List(out))
}

fn first(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(items(&args[0])?.into_iter().next().unwrap_or_default())
}

fn last(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(items(&args[0])?.pop().unwrap_or_default())
}

fn rest(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::List(items(&args[0])?.into_iter().skip(1).collect()))
}

fn initial(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let mut values = items(&args[0])?;
    values.pop();
    Ok(Value::List(values))
}

fn reverse(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let mut values = items(&args[0])?;
    values.reverse();
    Ok(Value::List(values))
}

/// Usage: {{ if has "a" .list }}
fn has(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(items(&args[1])?.contains(&args[0])))
}

fn compact(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::List(
        items(&args[0])?.into_iter().filter(Value::is_truthy).collect(),
    ))
}

fn append(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let mut values = items(&args[0])?;
    values.push(args[1].clone());
    Ok(Value::List(values))
}

fn prepend(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let mut values = items(&args[0])?;
    values.insert(0, args[1].clone());
    Ok(Value::List(values))
}

fn concat(args: &[Value]) -> Result<Value, String> {
    let mut out = Vec::new();
    for arg in args {
        out.extend(items(arg)?);
    }
    Ok(Value::List(out))
}

// ============ Defaults ============

/// Usage: {{ .x | default "fallback" }}
fn default(args: &[Value]) -> Result<Value, String> {
    at_least(args, 1)?;
    match args.get(1) {
        Some(given) if given.is_truthy() => Ok(given.clone()),
        _ => Ok(args[0].clone()),
    }
}

fn empty(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Bool(!args[0].is_truthy()))
}

fn coalesce(args: &[Value]) -> Result<Value, String> {
    Ok(args.iter().find(|v| v.is_truthy()).cloned().unwrap_or_default())
}

/// Usage: {{ ternary "yes" "no" .enabled }}
fn ternary(args: &[Value]) -> Result<Value, String> {
    arity(args, 3)?;
    Ok(if args[2].is_truthy() {
        args[0].clone()
    } else {
        args[1].clone()
    })
}

/// Usage: {{ .x | required "x is required" }}
fn required(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    match &args[1] {
        Value::Nil => Err(text(&args[0])),
        Value::String(s) if s.is_empty() => Err(text(&args[0])),
        other => Ok(other.clone()),
    }
}

// ============ Encoding ============

fn to_string(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(text(&args[0])))
}

fn to_json(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    serde_json::to_string(&args[0].to_json())
        .map(Value::String)
        .map_err(|e| e.to_string())
}

fn b64enc(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(BASE64.encode(text(&args[0]))))
}

fn b64dec(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let bytes = BASE64.decode(text(&args[0])).map_err(|e| e.to_string())?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|e| e.to_string())
}

fn sha256sum(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(hex::encode(Sha256::digest(
        text(&args[0]).as_bytes(),
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, String> {
        lookup(name).unwrap_or_else(|| panic!("{} not registered", name))(args)
    }

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    fn strs(values: &[&str]) -> Value {
        Value::List(values.iter().map(|v| s(v)).collect())
    }

    #[test]
    fn test_sort_and_join() {
        let sorted = call("sortAlpha", &[strs(&["example.com", "dead.beef"])]).unwrap();
        assert_eq!(call("join", &[s(","), sorted]).unwrap(), s("dead.beef,example.com"));
    }

    #[test]
    fn test_generated_length_is_capped() {
        assert_eq!(call("repeat", &[Value::Int(3), s("ab")]).unwrap(), s("ababab"));
        assert_eq!(call("indent", &[Value::Int(2), s("a\nb")]).unwrap(), s("  a\n  b"));
        assert_eq!(call("nindent", &[Value::Int(-1), s("a")]).unwrap(), s("\na"));

        let huge = Value::Int(i64::MAX);
        assert!(call("repeat", &[huge.clone(), s("x")]).unwrap_err().contains("exceed"));
        assert!(call("indent", &[huge.clone(), s("x")]).unwrap_err().contains("exceed"));
        assert!(call("nindent", &[huge, s("x")]).unwrap_err().contains("exceed"));
        assert_eq!(call("repeat", &[Value::Int(1 << 40), s("")]).unwrap(), s(""));
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(call("upper", &[s("abc")]).unwrap(), s("ABC"));
        assert_eq!(call("title", &[s("hello wide world")]).unwrap(), s("Hello Wide World"));
        assert_eq!(call("untitle", &[s("Hello World")]).unwrap(), s("hello world"));
        assert_eq!(call("camelcase", &[s("http_server")]).unwrap(), s("HttpServer"));
        assert_eq!(call("kebabcase", &[s("FirstName")]).unwrap(), s("first-name"));
        assert_eq!(call("snakecase", &[s("HTTPServerName")]).unwrap(), s("http_server_name"));
    }

    #[test]
    fn test_trimming_and_substrings() {
        assert_eq!(call("trimAll", &[s("$"), s("$5.00$")]).unwrap(), s("5.00"));
        assert_eq!(call("trimPrefix", &[s("-"), s("-x-")]).unwrap(), s("x-"));
        assert_eq!(call("trimSuffix", &[s("-"), s("-x-")]).unwrap(), s("-x"));
        assert_eq!(call("substr", &[Value::Int(0), Value::Int(5), s("hello world")]).unwrap(), s("hello"));
        assert_eq!(call("trunc", &[Value::Int(-5), s("hello world")]).unwrap(), s("world"));
        assert_eq!(call("replace", &[s("-"), s("_"), s("a-b-c")]).unwrap(), s("a_b_c"));
    }

    #[test]
    fn test_quoting_and_indent() {
        assert_eq!(call("quote", &[s("a\"b")]).unwrap(), s(r#""a\"b""#));
        assert_eq!(call("squote", &[s("a"), s("b")]).unwrap(), s("'a' 'b'"));
        assert_eq!(call("indent", &[Value::Int(2), s("a\nb")]).unwrap(), s("  a\n  b"));
        assert_eq!(call("nindent", &[Value::Int(2), s("a")]).unwrap(), s("\n  a"));
    }

    #[test]
    fn test_lists() {
        let list = strs(&["a", "b", "a", ""]);
        assert_eq!(call("uniq", &[list.clone()]).unwrap(), strs(&["a", "b", ""]));
        assert_eq!(call("compact", &[list.clone()]).unwrap(), strs(&["a", "b", "a"]));
        assert_eq!(call("first", &[list.clone()]).unwrap(), s("a"));
        assert_eq!(call("has", &[s("b"), list.clone()]).unwrap(), Value::Bool(true));
        assert_eq!(call("splitList", &[s(","), s("x,y")]).unwrap(), strs(&["x", "y"]));
        let split = call("split", &[s(","), s("x,y")]).unwrap();
        assert_eq!(call("index", &[split, s("_1")]).unwrap(), s("y"));
        assert_eq!(call("first", &[Value::List(vec![])]).unwrap(), Value::Nil);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(call("default", &[s("d"), s("")]).unwrap(), s("d"));
        assert_eq!(call("default", &[s("d"), s("given")]).unwrap(), s("given"));
        assert_eq!(call("default", &[s("d")]).unwrap(), s("d"));
        assert_eq!(call("coalesce", &[Value::Nil, s(""), s("x")]).unwrap(), s("x"));
        assert_eq!(call("required", &[s("need x"), Value::Nil]).unwrap_err(), "need x");
        assert_eq!(
            call("ternary", &[s("yes"), s("no"), Value::Bool(false)]).unwrap(),
            s("no")
        );
    }

    #[test]
    fn test_printf() {
        assert_eq!(
            call("printf", &[s("%s-%03d|%-4s|%.2f%%"), s("a"), Value::Int(7), s("b"), Value::Float(1.5)]).unwrap(),
            s("a-007|b   |1.50%")
        );
        assert_eq!(call("printf", &[s("%d"), s("x")]).unwrap(), s("%!d(string=x)"));
        assert_eq!(call("printf", &[s("%s %s"), s("x")]).unwrap(), s("x %!s(MISSING)"));
        assert_eq!(call("printf", &[s("%q"), s("x")]).unwrap(), s("\"x\""));
    }

    #[test]
    fn test_print() {
        assert_eq!(call("print", &[s("a"), s("b")]).unwrap(), s("ab"));
        assert_eq!(call("print", &[Value::Int(1), Value::Int(2)]).unwrap(), s("1 2"));
        assert_eq!(call("println", &[s("a"), Value::Int(1)]).unwrap(), s("a 1\n"));
    }

    #[test]
    fn test_encoding() {
        assert_eq!(call("b64enc", &[s("hello")]).unwrap(), s("aGVsbG8="));
        assert_eq!(call("b64dec", &[s("aGVsbG8=")]).unwrap(), s("hello"));
        assert_eq!(
            call("toJson", &[strs(&["a"])]).unwrap(),
            s(r#"["a"]"#)
        );
        assert_eq!(
            call("sha256sum", &[s("")]).unwrap(),
            s("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn test_comparisons_and_len() {
        assert_eq!(call("eq", &[s("a"), s("b"), s("a")]).unwrap(), Value::Bool(true));
        assert_eq!(call("lt", &[Value::Int(1), Value::Int(2)]).unwrap(), Value::Bool(true));
        assert!(call("eq", &[s("1"), Value::Int(1)]).is_err());
        assert_eq!(call("len", &[strs(&["a", "b"])]).unwrap(), Value::Int(2));
        assert!(call("len", &[Value::Int(3)]).is_err());
    }
}
