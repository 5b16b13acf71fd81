// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! A small Go-template compatible expression language.
//!
//! Supported: literal text, `{{ }}` actions with `{{-`/`-}}` trim markers, `{{/* */}}`
//! comments, pipelines (`.a.b | upper`), field chains rooted at `.`, string, integer and
//! boolean literals and the functions listed in [`Function`]. Everything else is rejected
//! when the template is parsed.

use crate::error::{Result, SyncError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Action(Vec<Command>),
}

/// One stage of a pipeline
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Operand(Operand),
    Call(Function, Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Dot,
    Field(Vec<String>),
    Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Index,
    Default,
    B64Enc,
    B64Dec,
    Upper,
    Lower,
    Trim,
    Quote,
    ToJson,
    Printf,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "index" => Function::Index,
            "default" => Function::Default,
            "b64enc" => Function::B64Enc,
            "b64dec" => Function::B64Dec,
            "upper" => Function::Upper,
            "lower" => Function::Lower,
            "trim" => Function::Trim,
            "quote" => Function::Quote,
            "toJson" => Function::ToJson,
            "printf" => Function::Printf,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Function::Index => "index",
            Function::Default => "default",
            Function::B64Enc => "b64enc",
            Function::B64Dec => "b64dec",
            Function::Upper => "upper",
            Function::Lower => "lower",
            Function::Trim => "trim",
            Function::Quote => "quote",
            Function::ToJson => "toJson",
            Function::Printf => "printf",
        }
    }
}

/// Location of one `{{ }}` action in the source
struct Action<'a> {
    start: usize,
    end: usize,
    body: &'a str,
    ltrim: bool,
    rtrim: bool,
    comment: bool,
}

/// Find the next action at or after `from`. Closing delimiters inside string
/// literals and comments do not end the action.
fn next_action(source: &str, from: usize) -> Result<Option<Action<'_>>> {
    let Some(offset) = source[from..].find("{{") else {
        return Ok(None);
    };
    let start = from + offset;
    let bytes = source.as_bytes();

    let mut body_start = start + 2;
    let ltrim = bytes.get(body_start) == Some(&b'-')
        && bytes.get(body_start + 1).is_some_and(u8::is_ascii_whitespace);
    if ltrim {
        body_start += 1;
    }

    let leading = source[body_start..].len() - source[body_start..].trim_start().len();
    if source[body_start + leading..].starts_with("/*") {
        return comment_action(source, start, body_start + leading + 2, ltrim).map(Some);
    }

    let mut quote = None;
    let mut i = body_start;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(b'"') if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'`' => quote = Some(b),
            None if bytes[i..].starts_with(b"}}") => {
                let rtrim = i >= body_start + 2
                    && bytes[i - 1] == b'-'
                    && bytes[i - 2].is_ascii_whitespace();
                let body_end = if rtrim { i - 1 } else { i };
                return Ok(Some(Action {
                    start,
                    end: i + 2,
                    body: &source[body_start..body_end],
                    ltrim,
                    rtrim,
                    comment: false,
                }));
            }
            None => {}
        }
        i += 1;
    }

    Err(error("unclosed action"))
}

fn comment_action(
    source: &str,
    start: usize,
    text_start: usize,
    ltrim: bool,
) -> Result<Action<'_>> {
    let close = source[text_start..]
        .find("*/")
        .map(|i| text_start + i + 2)
        .ok_or_else(|| error("unclosed comment"))?;

    let rest = &source[close..];
    let (rtrim, end) = if rest.starts_with("}}") {
        (false, close + 2)
    } else if rest.starts_with(|c: char| c.is_ascii_whitespace()) && rest[1..].starts_with("-}}")
    {
        (true, close + 4)
    } else {
        return Err(error("comment ends before closing delimiter"));
    };

    Ok(Action {
        start,
        end,
        body: "",
        ltrim,
        rtrim,
        comment: true,
    })
}

fn error(message: impl Into<String>) -> SyncError {
    SyncError::TemplateError(message.into())
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut pos = 0;
        let mut trim_next = false;

        while let Some(action) = next_action(source, pos)? {
            let mut text = &source[pos..action.start];
            if trim_next {
                text = text.trim_start();
            }
            if action.ltrim {
                text = text.trim_end();
            }
            push_text(&mut nodes, text);
            trim_next = action.rtrim;
            pos = action.end;

            if !action.comment {
                nodes.push(Node::Action(parse_pipeline(action.body.trim())?));
            }
        }

        let mut tail = &source[pos..];
        if trim_next {
            tail = tail.trim_start();
        }
        push_text(&mut nodes, tail);

        Ok(Template { nodes })
    }

    /// Render the template with `data` as the root (`.`) value
    pub fn execute(&self, data: &Value) -> Result<String> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action(pipeline) => {
                    let value = eval_pipeline(pipeline, data)?;
                    out.push_str(&to_text(&value)?);
                }
            }
        }
        Ok(out)
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Pipe,
    Word(String),
    Str(String),
}

fn tokenize(body: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '|' {
            chars.next();
            tokens.push(Token::Pipe);
        } else if c == '"' {
            chars.next();
            let mut escaped = false;
            let mut end = None;
            for (i, c) in chars.by_ref() {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    end = Some(i);
                    break;
                }
            }
            let end = end.ok_or_else(|| error(format!("unterminated string in '{}'", body)))?;
            let literal: String = serde_json::from_str(&body[start..=end])
                .map_err(|e| error(format!("invalid string literal: {}", e)))?;
            tokens.push(Token::Str(literal));
        } else if c == '`' {
            chars.next();
            let end = chars
                .by_ref()
                .find(|(_, c)| *c == '`')
                .map(|(i, _)| i)
                .ok_or_else(|| error(format!("unterminated raw string in '{}'", body)))?;
            tokens.push(Token::Str(body[start + 1..end].to_string()));
        } else {
            let mut end = body.len();
            while let Some(&(i, c)) = chars.peek() {
                if c.is_whitespace() || c == '|' || c == '"' || c == '`' {
                    end = i;
                    break;
                }
                chars.next();
            }
            tokens.push(Token::Word(body[start..end].to_string()));
        }
    }

    Ok(tokens)
}

fn parse_pipeline(body: &str) -> Result<Vec<Command>> {
    if body.is_empty() {
        return Err(error("missing value for command"));
    }

    let tokens = tokenize(body)?;
    let mut commands = Vec::new();
    for stage in tokens.split(|t| *t == Token::Pipe) {
        let Some((first, rest)) = stage.split_first() else {
            return Err(error(format!("empty command in pipeline '{}'", body)));
        };

        let command = match first {
            Token::Word(word) if is_identifier(word) && !is_keyword(word) => {
                let function = Function::lookup(word)
                    .ok_or_else(|| error(format!("function \"{}\" not defined", word)))?;
                let args = rest.iter().map(parse_operand).collect::<Result<Vec<_>>>()?;
                Command::Call(function, args)
            }
            _ => {
                if !rest.is_empty() {
                    return Err(error(format!("unexpected arguments in '{}'", body)));
                }
                Command::Operand(parse_operand(first)?)
            }
        };
        commands.push(command);
    }

    for command in commands.iter().skip(1) {
        if let Command::Operand(_) = command {
            return Err(error(format!("non-function in pipeline '{}'", body)));
        }
    }

    Ok(commands)
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_keyword(word: &str) -> bool {
    matches!(word, "true" | "false" | "nil")
}

fn parse_operand(token: &Token) -> Result<Operand> {
    let word = match token {
        Token::Str(s) => return Ok(Operand::Literal(Value::String(s.clone()))),
        Token::Pipe => return Err(error("unexpected '|'")),
        Token::Word(word) => word.as_str(),
    };

    match word {
        "." => Ok(Operand::Dot),
        "true" => Ok(Operand::Literal(Value::Bool(true))),
        "false" => Ok(Operand::Literal(Value::Bool(false))),
        "nil" => Ok(Operand::Literal(Value::Null)),
        _ if word.starts_with('.') => {
            let segments: Vec<String> = word[1..].split('.').map(str::to_string).collect();
            if segments.iter().any(|s| !is_identifier(s)) {
                return Err(error(format!("bad field chain '{}'", word)));
            }
            Ok(Operand::Field(segments))
        }
        _ => word
            .parse::<i64>()
            .map(|n| Operand::Literal(Value::from(n)))
            .map_err(|_| error(format!("unexpected '{}' in operand", word))),
    }
}

fn eval_pipeline(pipeline: &[Command], data: &Value) -> Result<Value> {
    let mut piped: Option<Value> = None;
    for command in pipeline {
        let value = match command {
            Command::Operand(operand) => eval_operand(operand, data)?,
            Command::Call(function, args) => {
                let mut values = args
                    .iter()
                    .map(|a| eval_operand(a, data))
                    .collect::<Result<Vec<_>>>()?;
                if let Some(previous) = piped.take() {
                    values.push(previous);
                }
                call(*function, values)?
            }
        };
        piped = Some(value);
    }
    piped.ok_or_else(|| error("empty pipeline"))
}

static NULL: Value = Value::Null;

/// Missing map keys evaluate to null; walking into a scalar is an error
fn eval_operand(operand: &Operand, data: &Value) -> Result<Value> {
    match operand {
        Operand::Dot => Ok(data.clone()),
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Field(segments) => {
            let mut current = data;
            for segment in segments {
                current = match current {
                    Value::Object(map) => map.get(segment).unwrap_or(&NULL),
                    Value::Null => &NULL,
                    other => {
                        return Err(error(format!(
                            "can't evaluate field {} in type {}",
                            segment,
                            type_name(other)
                        )))
                    }
                };
            }
            Ok(current.clone())
        }
    }
}

fn call(function: Function, args: Vec<Value>) -> Result<Value> {
    let arity = |n: usize| -> Result<()> {
        if args.len() == n {
            Ok(())
        } else {
            Err(error(format!(
                "wrong number of args for {}: want {} got {}",
                function.name(),
                n,
                args.len()
            )))
        }
    };

    match function {
        Function::Index => {
            let Some((collection, keys)) = args.split_first() else {
                return Err(error("wrong number of args for index: want at least 1 got 0"));
            };
            let mut current = collection.clone();
            for key in keys {
                current = match (&current, key) {
                    (Value::Object(map), Value::String(k)) => {
                        map.get(k).cloned().unwrap_or(Value::Null)
                    }
                    (Value::Array(items), Value::Number(n)) => {
                        let i = n
                            .as_u64()
                            .and_then(|i| usize::try_from(i).ok())
                            .filter(|i| *i < items.len())
                            .ok_or_else(|| error(format!("index out of range: {}", n)))?;
                        items[i].clone()
                    }
                    (Value::Null, _) => Value::Null,
                    (c, k) => {
                        return Err(error(format!(
                            "can't index item of type {} with {}",
                            type_name(c),
                            type_name(k)
                        )))
                    }
                };
            }
            Ok(current)
        }
        Function::Default => {
            arity(2)?;
            let mut args = args;
            let given = args.pop().unwrap_or(Value::Null);
            let fallback = args.pop().unwrap_or(Value::Null);
            Ok(if is_empty(&given) { fallback } else { given })
        }
        Function::B64Enc => {
            arity(1)?;
            Ok(Value::String(STANDARD.encode(to_text(&args[0])?)))
        }
        Function::B64Dec => {
            arity(1)?;
            let bytes = STANDARD
                .decode(to_text(&args[0])?)
                .map_err(|e| error(format!("b64dec: {}", e)))?;
            String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|e| error(format!("b64dec: {}", e)))
        }
        Function::Upper => {
            arity(1)?;
            Ok(Value::String(to_text(&args[0])?.to_uppercase()))
        }
        Function::Lower => {
            arity(1)?;
            Ok(Value::String(to_text(&args[0])?.to_lowercase()))
        }
        Function::Trim => {
            arity(1)?;
            Ok(Value::String(to_text(&args[0])?.trim().to_string()))
        }
        Function::Quote => {
            arity(1)?;
            let text = to_text(&args[0])?;
            serde_json::to_string(&text)
                .map(Value::String)
                .map_err(|e| error(format!("quote: {}", e)))
        }
        Function::ToJson => {
            arity(1)?;
            serde_json::to_string(&args[0])
                .map(Value::String)
                .map_err(|e| error(format!("toJson: {}", e)))
        }
        Function::Printf => {
            let Some((format, values)) = args.split_first() else {
                return Err(error("wrong number of args for printf: want at least 1 got 0"));
            };
            printf(&to_text(format)?, values).map(Value::String)
        }
    }
}

fn printf(format: &str, values: &[Value]) -> Result<String> {
    let mut out = String::new();
    let mut values = values.iter();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb @ ('s' | 'v' | 'd')) => {
                let value = values
                    .next()
                    .ok_or_else(|| error(format!("printf: missing argument for %{}", verb)))?;
                if verb == 'd' && !value.is_i64() && !value.is_u64() {
                    return Err(error(format!("printf: %d needs an integer, got {}", value)));
                }
                out.push_str(&to_text(value)?);
            }
            Some(other) => return Err(error(format!("printf: unsupported verb %{}", other))),
            None => return Err(error("printf: trailing %")),
        }
    }

    if values.next().is_some() {
        return Err(error("printf: too many arguments"));
    }
    Ok(out)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Printable form of a value. Null has no printable form.
fn to_text(value: &Value) -> Result<String> {
    match value {
        Value::Null => Err(error("value is missing (no value)")),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => serde_json::to_string(other).map_err(|e| error(e.to_string())),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(source: &str, data: &Value) -> Result<String> {
        Template::parse(source)?.execute(data)
    }

    fn data() -> Value {
        json!({
            "defA": {"user": "a", "pass": "b", "port": 5432, "tls": true},
            "kv2": {"data": {"api-key": "xyz"}, "metadata": {"version": 3}},
            "list": {"hosts": ["h1", "h2"]}
        })
    }

    #[test]
    fn test_field_chain_concatenation() {
        assert_eq!(
            render("{{.defA.user}}:{{.defA.pass}}", &data()).unwrap(),
            "a:b"
        );
    }

    #[test]
    fn test_plain_text_only() {
        assert_eq!(render("static", &data()).unwrap(), "static");
        assert_eq!(render("", &data()).unwrap(), "");
    }

    #[test]
    fn test_numbers_and_bools_print_plainly() {
        assert_eq!(
            render("{{ .defA.port }}/{{ .defA.tls }}", &data()).unwrap(),
            "5432/true"
        );
    }

    #[test]
    fn test_maps_print_as_json() {
        assert_eq!(render("{{ .list.hosts }}", &data()).unwrap(), r#"["h1","h2"]"#);
        assert_eq!(
            render("{{ .defA | toJson }}", &json!({"defA": {"k": "v"}})).unwrap(),
            r#"{"k":"v"}"#
        );
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            render("user:  {{- .defA.user -}}  \n!", &data()).unwrap(),
            "user:a!"
        );
    }

    #[test]
    fn test_comment_is_dropped() {
        assert_eq!(render("a{{/* note */}}b", &data()).unwrap(), "ab");
    }

    #[test]
    fn test_pipeline_appends_previous_value() {
        assert_eq!(render("{{ .defA.user | upper }}", &data()).unwrap(), "A");
        assert_eq!(
            render(r#"{{ .defA.missing | default "fallback" }}"#, &data()).unwrap(),
            "fallback"
        );
        assert_eq!(
            render(r#"{{ .defA.user | default "fallback" }}"#, &data()).unwrap(),
            "a"
        );
    }

    #[test]
    fn test_index_with_dashed_key() {
        assert_eq!(
            render(r#"{{ index .kv2.data "api-key" }}"#, &data()).unwrap(),
            "xyz"
        );
        assert_eq!(render("{{ index .list.hosts 1 }}", &data()).unwrap(), "h2");
    }

    #[test]
    fn test_base64_round_trip() {
        assert_eq!(render("{{ .defA.user | b64enc }}", &data()).unwrap(), "YQ==");
        assert_eq!(render(r#"{{ b64dec "YQ==" }}"#, &data()).unwrap(), "a");
    }

    #[test]
    fn test_quote_trim_lower_printf() {
        assert_eq!(
            render(r#"{{ "  Mixed  " | trim | lower | quote }}"#, &data()).unwrap(),
            r#""mixed""#
        );
        assert_eq!(
            render(
                r#"{{ printf "postgres://%s:%s@db:%d" .defA.user .defA.pass .defA.port }}"#,
                &data()
            )
            .unwrap(),
            "postgres://a:b@db:5432"
        );
    }

    #[test]
    fn test_closing_delimiter_inside_literal() {
        assert_eq!(
            render(r#"{{ printf "%s}}" .defA.user }}"#, &data()).unwrap(),
            "a}}"
        );
        assert_eq!(render("{{ `{{x}}` }}", &data()).unwrap(), "{{x}}");
        assert_eq!(render(r#"{{ "a\"}}" }}"#, &data()).unwrap(), "a\"}}");
        assert_eq!(render("a{{/* }} */}}b", &data()).unwrap(), "ab");
    }

    #[test]
    fn test_raw_string_literal() {
        assert_eq!(render("{{ `a\\b` }}", &data()).unwrap(), "a\\b");
    }

    #[test]
    fn test_missing_value_is_an_error() {
        let err = render("{{ .defA.nope }}", &data()).unwrap_err();
        assert!(matches!(err, SyncError::TemplateError(_)));
        assert!(render("{{ .nothing.at.all }}", &data()).is_err());
    }

    #[test]
    fn test_field_on_scalar_is_an_error() {
        let err = render("{{ .defA.user.name }}", &data()).unwrap_err();
        assert!(err.to_string().contains("can't evaluate field name in type string"));
    }

    #[test]
    fn test_parse_errors() {
        for source in [
            "{{ }}",
            "{{ nosuchfunc .a }}",
            "{{ .a | .b }}",
            "{{ .a .b }}",
            "{{ .a..b }}",
            r#"{{ "unterminated }}"#,
            "{{ .a ",
            "{{/* open }}",
            "{{ .a | }}",
            "{{/* note */ .a }}",
        ] {
            assert!(Template::parse(source).is_err(), "parsed {:?}", source);
        }
    }

    #[test]
    fn test_wrong_arity() {
        assert!(render("{{ upper }}", &data()).is_err());
        assert!(render(r#"{{ default "x" "y" .defA.user }}"#, &data()).is_err());
    }

    #[test]
    fn test_invalid_base64() {
        assert!(render(r#"{{ b64dec "%%%" }}"#, &data()).is_err());
    }

    #[test]
    fn test_deterministic() {
        let template = Template::parse("{{ .defA | toJson }}").unwrap();
        let first = template.execute(&data()).unwrap();
        let second = template.execute(&data()).unwrap();
        assert_eq!(first, second);
    }
}
