//! Python literal evaluation and rendering.
//!
//! Understands the literal subset that appears in test annotations: strings
//! (`'…'`, `"…"`, `r`/`u` prefixes, implicit concatenation), ints, floats,
//! `True`/`False`/`None`, lists, tuples, sets and dicts. Values map onto JSON;
//! tuples and sets become arrays.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LiteralError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("unexpected character '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("'{0}' is not a literal")]
    NotLiteral(String),
    #[error("trailing input at offset {0}")]
    Trailing(usize),
}

/// One argument of a call expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    pub keyword: Option<String>,
    /// `None` when the argument is not a literal.
    pub value: Option<Value>,
}

/// Evaluate `text` as a single Python literal.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let mut cursor = Cursor::new(text);
    let value = cursor.value()?;
    cursor.skip_ws();
    if cursor.pos < cursor.chars.len() {
        return Err(LiteralError::Trailing(cursor.pos));
    }
    Ok(value)
}

/// Split the text between a call's parentheses into arguments.
pub fn parse_call_args(text: &str) -> Vec<CallArg> {
    split_top_level(text)
        .into_iter()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match keyword_split(segment) {
            Some((keyword, rest)) => CallArg {
                keyword: Some(keyword.to_string()),
                value: parse_literal(rest).ok(),
            },
            None => CallArg {
                keyword: None,
                value: parse_literal(segment).ok(),
            },
        })
        .collect()
}

/// Render a JSON value as Python source.
pub fn to_python(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(to_python).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), to_python(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}

/// Double-quoted Python string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// `name=value` → `(name, value)`; `==` comparisons are not keywords.
fn keyword_split(segment: &str) -> Option<(&str, &str)> {
    let eq = segment.find('=')?;
    let name = segment[..eq].trim();
    let rest = &segment[eq + 1..];
    if rest.starts_with('=') || name.is_empty() {
        return None;
    }
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, rest))
}

/// Split on commas that are outside brackets and string literals.
pub(crate) fn split_top_level(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                segments.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&text[start..]);
    segments
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: char) -> Result<(), LiteralError> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c == want => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(LiteralError::Unexpected {
                found,
                offset: self.pos,
            }),
            None => Err(LiteralError::UnexpectedEnd),
        }
    }

    fn value(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        let c = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
        match c {
            '[' => {
                self.pos += 1;
                Ok(Value::Array(self.sequence(']')?.0))
            }
            '(' => {
                self.pos += 1;
                let (items, saw_comma) = self.sequence(')')?;
                // `(x)` is grouping, `(x,)` is a tuple.
                if items.len() == 1 && !saw_comma {
                    Ok(items.into_iter().next().unwrap_or(Value::Null))
                } else {
                    Ok(Value::Array(items))
                }
            }
            '{' => {
                self.pos += 1;
                self.dict_or_set()
            }
            '\'' | '"' => self.strings(),
            'r' | 'R' | 'u' | 'U' if matches!(self.chars.get(self.pos + 1), Some('\'' | '"')) => {
                self.strings()
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            c if c.is_alphabetic() || c == '_' => {
                let word = self.word();
                match word.as_str() {
                    "True" => Ok(Value::Bool(true)),
                    "False" => Ok(Value::Bool(false)),
                    "None" => Ok(Value::Null),
                    _ => Err(LiteralError::NotLiteral(word)),
                }
            }
            found => Err(LiteralError::Unexpected {
                found,
                offset: self.pos,
            }),
        }
    }

    /// Items up to `close`; also reports whether any comma was seen.
    fn sequence(&mut self, close: char) -> Result<(Vec<Value>, bool), LiteralError> {
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok((items, saw_comma));
                }
                None => return Err(LiteralError::UnexpectedEnd),
                _ => {}
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    saw_comma = true;
                    self.pos += 1;
                }
                Some(c) if c == close => {}
                Some(found) => {
                    return Err(LiteralError::Unexpected {
                        found,
                        offset: self.pos,
                    })
                }
                None => return Err(LiteralError::UnexpectedEnd),
            }
        }
    }

    fn dict_or_set(&mut self) -> Result<Value, LiteralError> {
        self.skip_ws();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(Value::Object(Map::new()));
        }
        let first = self.value()?;
        self.skip_ws();
        if self.peek() != Some(':') {
            // Set literal: the first element is already consumed.
            let mut items = vec![first];
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    items.extend(self.sequence('}')?.0);
                }
                _ => self.expect('}')?,
            }
            return Ok(Value::Array(items));
        }

        let mut map = Map::new();
        let mut key = first;
        loop {
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key_string(key), value);
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    self.skip_ws();
                    if self.peek() == Some('}') {
                        self.pos += 1;
                        return Ok(Value::Object(map));
                    }
                    key = self.value()?;
                }
                _ => {
                    self.expect('}')?;
                    return Ok(Value::Object(map));
                }
            }
        }
    }

    /// One or more adjacent string literals, concatenated.
    fn strings(&mut self) -> Result<Value, LiteralError> {
        let mut out = self.string()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            match self.peek() {
                Some('\'' | '"') => out.push_str(&self.string()?),
                Some('r' | 'R' | 'u' | 'U') if matches!(self.chars.get(self.pos + 1), Some('\'' | '"')) => {
                    out.push_str(&self.string()?)
                }
                _ => {
                    self.pos = save;
                    return Ok(Value::String(out));
                }
            }
        }
    }

    fn string(&mut self) -> Result<String, LiteralError> {
        let mut raw = false;
        if let Some(prefix @ ('r' | 'R' | 'u' | 'U')) = self.peek() {
            raw = matches!(prefix, 'r' | 'R');
            self.pos += 1;
        }
        let quote = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
        self.pos += 1;

        let mut out = String::new();
        loop {
            let c = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
            self.pos += 1;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let next = self.peek().ok_or(LiteralError::UnexpectedEnd)?;
            self.pos += 1;
            if raw {
                out.push('\\');
                out.push(next);
                continue;
            }
            match next {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' | '\'' | '"' => out.push(next),
                '\n' => {}
                'x' => out.push(self.hex_escape(2)?),
                'u' => out.push(self.hex_escape(4)?),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
        let end = (self.pos + digits).min(self.chars.len());
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or(LiteralError::InvalidNumber(hex))
    }

    fn number(&mut self) -> Result<Value, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            let prev = if self.pos > start { self.chars[self.pos - 1] } else { ' ' };
            let sign_in_exponent = (c == '-' || c == '+') && (prev == 'e' || prev == 'E');
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || sign_in_exponent {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let cleaned = text.replace('_', "");
        let is_float = cleaned.contains(['.', 'e', 'E']) && !cleaned.contains(['x', 'X']);

        if !is_float {
            if let Ok(i) = cleaned.parse::<i64>() {
                return Ok(Value::from(i));
            }
        }
        cleaned
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or(LiteralError::InvalidNumber(text))
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '.') {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        other => to_python(&other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(parse_literal("42"), Ok(json!(42)));
        assert_eq!(parse_literal("-3"), Ok(json!(-3)));
        assert_eq!(parse_literal("2.5"), Ok(json!(2.5)));
        assert_eq!(parse_literal("1e3"), Ok(json!(1000.0)));
        assert_eq!(parse_literal("True"), Ok(json!(true)));
        assert_eq!(parse_literal("None"), Ok(Value::Null));
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(parse_literal(r#""a\"b\n""#), Ok(json!("a\"b\n")));
        assert_eq!(parse_literal(r"'it\'s'"), Ok(json!("it's")));
        assert_eq!(parse_literal(r"r'\d+'"), Ok(json!(r"\d+")));
        assert_eq!(parse_literal(r#""ab" 'cd'"#), Ok(json!("abcd")));
    }

    #[test]
    fn containers() {
        assert_eq!(parse_literal("['a', 'b',]"), Ok(json!(["a", "b"])));
        assert_eq!(parse_literal("(1, 2)"), Ok(json!([1, 2])));
        assert_eq!(parse_literal("(1,)"), Ok(json!([1])));
        assert_eq!(parse_literal("(1)"), Ok(json!(1)));
        assert_eq!(parse_literal("{'k': [1, {'n': None}]}"), Ok(json!({"k": [1, {"n": null}]})));
        assert_eq!(parse_literal("{1, 2}"), Ok(json!([1, 2])));
        assert_eq!(parse_literal("{}"), Ok(json!({})));
        assert_eq!(parse_literal("[\n  1,\n  2\n]"), Ok(json!([1, 2])));
    }

    #[test]
    fn non_literals_rejected() {
        assert!(matches!(parse_literal("some_fixture"), Err(LiteralError::NotLiteral(_))));
        assert!(matches!(parse_literal("[1, 2"), Err(LiteralError::UnexpectedEnd)));
        assert!(matches!(parse_literal("1 2"), Err(LiteralError::Trailing(_))));
    }

    #[test]
    fn call_args_split() {
        let args = parse_call_args(r#"id="TC-1", scenario="a, b", steps=['x', 'y'], other=make()"#);
        assert_eq!(args.len(), 4);
        assert_eq!(args[0].keyword.as_deref(), Some("id"));
        assert_eq!(args[0].value, Some(json!("TC-1")));
        assert_eq!(args[1].value, Some(json!("a, b")));
        assert_eq!(args[2].value, Some(json!(["x", "y"])));
        assert_eq!(args[3].keyword.as_deref(), Some("other"));
        assert_eq!(args[3].value, None);
    }

    #[test]
    fn positional_call_args() {
        let args = parse_call_args(r#""username", ["a", "b"]"#);
        assert_eq!(args[0], CallArg { keyword: None, value: Some(json!("username")) });
        assert_eq!(args[1].value, Some(json!(["a", "b"])));
    }

    #[test]
    fn render_python() {
        assert_eq!(to_python(&json!(["a", 1, 2.5, true, null])), r#"["a", 1, 2.5, True, None]"#);
        assert_eq!(to_python(&json!({"k": [false]})), r#"{"k": [False]}"#);
        assert_eq!(to_python(&json!("say \"hi\"\n")), r#""say \"hi\"\n""#);
    }

    #[test]
    fn control_characters_escaped() {
        assert_eq!(quote("a\0b\u{1b}"), r#""a\x00b\x1b""#);
        assert_eq!(quote("tab\there"), r#""tab\there""#);
        assert_eq!(parse_literal(&quote("nul\0\u{7f}")), Ok(json!("nul\0\u{7f}")));
    }

    #[test]
    fn rendered_values_parse_back() {
        let value = json!({"name": "x\\y", "values": [1, -2.5, "q'uote", [true]]});
        assert_eq!(parse_literal(&to_python(&value)), Ok(value));
    }
}
