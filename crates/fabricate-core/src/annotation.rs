//! Raw type annotations and their compact textual grammar.
//!
//! Annotations are what an adapter hands over for each declared field. They
//! are deliberately unresolved: `Model("Node")` only names a structured type,
//! and the resolver decides whether anything can build it.
//!
//! ```text
//! int(minimum=0, maximum=10)
//! str@email
//! list[Node]
//! dict[str, float(minimum=0.0)](max_length=4)
//! Address | None
//! literal["a", "b", "c"]
//! ```

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Serialize};

use crate::constraints::Constraints;
use crate::error::{Error, Result};
use crate::value::Value;

/// Scalar categories every provider registry understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    #[serde(rename = "str")]
    Text,
    Bytes,
    Uuid,
    Date,
    Time,
    DateTime,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 9] = [
        ScalarKind::Bool,
        ScalarKind::Int,
        ScalarKind::Float,
        ScalarKind::Text,
        ScalarKind::Bytes,
        ScalarKind::Uuid,
        ScalarKind::Date,
        ScalarKind::Time,
        ScalarKind::DateTime,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bool" => Some(Self::Bool),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "str" => Some(Self::Text),
            "bytes" => Some(Self::Bytes),
            "uuid" => Some(Self::Uuid),
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "datetime" => Some(Self::DateTime),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "str",
            Self::Bytes => "bytes",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Kinds whose values carry a length (text and binary).
    pub fn has_length(self) -> bool {
        matches!(self, Self::Text | Self::Bytes)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw, unresolved type annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Annotation {
    /// Scalar with an optional semantic tag (`str@email`).
    Scalar {
        kind: ScalarKind,
        tag: Option<String>,
    },
    /// The null type; only meaningful as a union member.
    None,
    List(Box<Annotation>),
    Set(Box<Annotation>),
    Tuple(Vec<Annotation>),
    Map(Box<Annotation>, Box<Annotation>),
    Optional(Box<Annotation>),
    /// Alternatives in declaration order; never contains `None` (see `Optional`).
    Union(Vec<Annotation>),
    /// Enumerated literal choices.
    Literal(Vec<Value>),
    /// Structured type referenced by name.
    Model(String),
    /// Element-level restrictions attached to an inner annotation.
    Constrained {
        inner: Box<Annotation>,
        constraints: Constraints,
    },
}

impl Annotation {
    pub fn scalar(kind: ScalarKind) -> Self {
        Annotation::Scalar { kind, tag: None }
    }

    pub fn tagged(kind: ScalarKind, tag: impl Into<String>) -> Self {
        Annotation::Scalar {
            kind,
            tag: Some(tag.into()),
        }
    }

    pub fn list(inner: Annotation) -> Self {
        Annotation::List(Box::new(inner))
    }

    pub fn set(inner: Annotation) -> Self {
        Annotation::Set(Box::new(inner))
    }

    pub fn map(key: Annotation, value: Annotation) -> Self {
        Annotation::Map(Box::new(key), Box::new(value))
    }

    pub fn optional(inner: Annotation) -> Self {
        match inner {
            Annotation::Optional(_) | Annotation::None => inner,
            other => Annotation::Optional(Box::new(other)),
        }
    }

    pub fn model(name: impl Into<String>) -> Self {
        Annotation::Model(name.into())
    }

    pub fn constrained(inner: Annotation, constraints: Constraints) -> Self {
        if constraints.is_empty() {
            return inner;
        }
        Annotation::Constrained {
            inner: Box::new(inner),
            constraints,
        }
    }

    /// Build a union, folding `None` members into an `Optional`.
    pub fn union(members: Vec<Annotation>) -> Self {
        let mut nullable = false;
        let mut rest = Vec::with_capacity(members.len());
        for member in members {
            match member {
                Annotation::None => nullable = true,
                Annotation::Optional(inner) => {
                    nullable = true;
                    rest.push(*inner);
                }
                other => rest.push(other),
            }
        }
        let inner = match rest.len() {
            0 => return Annotation::None,
            1 => rest.remove(0),
            _ => Annotation::Union(rest),
        };
        if nullable {
            Annotation::optional(inner)
        } else {
            inner
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let tokens = lex(text)?;
        let mut parser = Parser {
            text,
            tokens,
            pos: 0,
        };
        let annotation = parser.parse_union()?;
        if let Some((_, offset)) = parser.tokens.get(parser.pos) {
            return Err(parser.error(*offset, "unexpected trailing input"));
        }
        Ok(annotation)
    }

    /// Names of every structured type referenced anywhere in this annotation.
    pub fn model_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_model_refs(&mut refs);
        refs
    }

    fn collect_model_refs<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Annotation::Model(name) => refs.push(name),
            Annotation::List(inner) | Annotation::Set(inner) | Annotation::Optional(inner) => {
                inner.collect_model_refs(refs)
            }
            Annotation::Constrained { inner, .. } => inner.collect_model_refs(refs),
            Annotation::Map(key, value) => {
                key.collect_model_refs(refs);
                value.collect_model_refs(refs);
            }
            Annotation::Tuple(members) | Annotation::Union(members) => {
                for member in members {
                    member.collect_model_refs(refs);
                }
            }
            Annotation::Scalar { .. } | Annotation::None | Annotation::Literal(_) => {}
        }
    }
}

impl FromStr for Annotation {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Annotation::parse(text)
    }
}

impl TryFrom<String> for Annotation {
    type Error = Error;

    fn try_from(text: String) -> Result<Self> {
        Annotation::parse(&text)
    }
}

impl From<Annotation> for String {
    fn from(annotation: Annotation) -> Self {
        annotation.to_string()
    }
}

impl JsonSchema for Annotation {
    fn schema_name() -> String {
        "Annotation".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::Scalar { kind, tag: None } => write!(f, "{kind}"),
            Annotation::Scalar {
                kind,
                tag: Some(tag),
            } => write!(f, "{kind}@{tag}"),
            Annotation::None => f.write_str("None"),
            Annotation::List(inner) => write!(f, "list[{inner}]"),
            Annotation::Set(inner) => write!(f, "set[{inner}]"),
            Annotation::Optional(inner) => write!(f, "optional[{inner}]"),
            Annotation::Map(key, value) => write!(f, "dict[{key}, {value}]"),
            Annotation::Tuple(members) => {
                f.write_str("tuple[")?;
                write_joined(f, members)?;
                f.write_str("]")
            }
            Annotation::Union(members) => {
                f.write_str("union[")?;
                write_joined(f, members)?;
                f.write_str("]")
            }
            Annotation::Literal(values) => {
                f.write_str("literal[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, value)?;
                }
                f.write_str("]")
            }
            Annotation::Model(name) => f.write_str(name),
            Annotation::Constrained { inner, constraints } => {
                write!(f, "{inner}")?;
                write_constraints(f, constraints)
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, members: &[Annotation]) -> fmt::Result {
    for (idx, member) in members.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{member}")?;
    }
    Ok(())
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => f.write_str("None"),
        Value::Bool(value) => write!(f, "{value}"),
        Value::Int(value) => write!(f, "{value}"),
        Value::Float(value) => write!(f, "{value:?}"),
        Value::Text(value) => write_quoted(f, value),
        other => write!(f, "{}", other.to_json()),
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in value.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            other => write!(f, "{other}")?,
        }
    }
    f.write_str("\"")
}

// `choices` has no textual form; literal[...] covers enumerations.
fn write_constraints(f: &mut fmt::Formatter<'_>, constraints: &Constraints) -> fmt::Result {
    let mut parts: Vec<String> = Vec::new();
    if let Some(minimum) = constraints.minimum {
        parts.push(format!("minimum={minimum:?}"));
    }
    if let Some(maximum) = constraints.maximum {
        parts.push(format!("maximum={maximum:?}"));
    }
    if let Some(min_length) = constraints.min_length {
        parts.push(format!("min_length={min_length}"));
    }
    if let Some(max_length) = constraints.max_length {
        parts.push(format!("max_length={max_length}"));
    }
    if parts.is_empty() && constraints.pattern.is_none() {
        return Ok(());
    }
    f.write_str("(")?;
    f.write_str(&parts.join(", "))?;
    if let Some(pattern) = &constraints.pattern {
        if !parts.is_empty() {
            f.write_str(", ")?;
        }
        f.write_str("pattern=")?;
        write_quoted(f, pattern)?;
    }
    f.write_str(")")
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Pipe,
    At,
    Eq,
}

fn lex(text: &str) -> Result<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(offset, ch)) = chars.peek() {
        let simple = match ch {
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '|' => Some(Token::Pipe),
            '@' => Some(Token::At),
            '=' => Some(Token::Eq),
            _ => None,
        };
        if let Some(token) = simple {
            tokens.push((token, offset));
            chars.next();
            continue;
        }
        if ch.is_whitespace() {
            chars.next();
        } else if ch.is_alphabetic() || ch == '_' {
            let mut ident = String::new();
            while let Some(&(_, ch)) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    ident.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push((Token::Ident(ident), offset));
        } else if ch.is_ascii_digit() || ch == '-' {
            let mut number = String::new();
            number.push(ch);
            chars.next();
            while let Some(&(_, ch)) = chars.peek() {
                let exponent_sign = (ch == '-' || ch == '+')
                    && number.ends_with(|last: char| last == 'e' || last == 'E');
                if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exponent_sign {
                    number.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push((Token::Num(number), offset));
        } else if ch == '"' || ch == '\'' {
            let quote = ch;
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                match ch {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => value.push('\n'),
                        Some((_, 't')) => value.push('\t'),
                        Some((_, escaped)) => value.push(escaped),
                        None => break,
                    },
                    ch if ch == quote => {
                        closed = true;
                        break;
                    }
                    ch => value.push(ch),
                }
            }
            if !closed {
                return Err(Error::Annotation {
                    text: text.to_string(),
                    offset,
                    message: "unterminated string literal".to_string(),
                });
            }
            tokens.push((Token::Str(value), offset));
        } else {
            return Err(Error::Annotation {
                text: text.to_string(),
                offset,
                message: format!("unexpected character '{ch}'"),
            });
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, offset: usize, message: impl Into<String>) -> Error {
        Error::Annotation {
            text: self.text.to_string(),
            offset,
            message: message.into(),
        }
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.text.len())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let item = self.tokens.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        let offset = self.offset();
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(offset, format!("expected {what}")))
        }
    }

    fn parse_union(&mut self) -> Result<Annotation> {
        let mut members = vec![self.parse_primary()?];
        while self.eat(&Token::Pipe) {
            members.push(self.parse_primary()?);
        }
        if members.len() == 1 {
            return Ok(members.remove(0));
        }
        Ok(Annotation::union(members))
    }

    fn parse_primary(&mut self) -> Result<Annotation> {
        let base = self.parse_base()?;
        if self.peek() == Some(&Token::LParen) {
            let constraints = self.parse_constraints()?;
            return Ok(Annotation::constrained(base, constraints));
        }
        Ok(base)
    }

    fn parse_base(&mut self) -> Result<Annotation> {
        let offset = self.offset();
        let name = match self.next() {
            Some((Token::Ident(name), _)) => name,
            _ => return Err(self.error(offset, "expected a type name")),
        };

        if name == "None" {
            return Ok(Annotation::None);
        }

        if let Some(kind) = ScalarKind::parse(&name) {
            if self.eat(&Token::At) {
                let tag_offset = self.offset();
                return match self.next() {
                    Some((Token::Ident(tag), _)) => Ok(Annotation::tagged(kind, tag)),
                    _ => Err(self.error(tag_offset, "expected a semantic tag after '@'")),
                };
            }
            return Ok(Annotation::scalar(kind));
        }

        match name.as_str() {
            "list" | "set" | "optional" => {
                let args = self.parse_args()?;
                let [inner] = <[Annotation; 1]>::try_from(args)
                    .map_err(|_| self.error(offset, format!("{name} takes exactly one parameter")))?;
                Ok(match name.as_str() {
                    "list" => Annotation::list(inner),
                    "set" => Annotation::set(inner),
                    _ => Annotation::optional(inner),
                })
            }
            "dict" => {
                let args = self.parse_args()?;
                let [key, value] = <[Annotation; 2]>::try_from(args)
                    .map_err(|_| self.error(offset, "dict takes exactly two parameters"))?;
                Ok(Annotation::map(key, value))
            }
            "tuple" => Ok(Annotation::Tuple(self.parse_args()?)),
            "union" => Ok(Annotation::union(self.parse_args()?)),
            "literal" => self.parse_literals(),
            _ => Ok(Annotation::Model(name)),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Annotation>> {
        self.expect(Token::LBracket, "'['")?;
        let mut args = vec![self.parse_union()?];
        while self.eat(&Token::Comma) {
            args.push(self.parse_union()?);
        }
        self.expect(Token::RBracket, "']'")?;
        Ok(args)
    }

    fn parse_literals(&mut self) -> Result<Annotation> {
        self.expect(Token::LBracket, "'['")?;
        let mut values = vec![self.parse_literal()?];
        while self.eat(&Token::Comma) {
            values.push(self.parse_literal()?);
        }
        self.expect(Token::RBracket, "']'")?;
        Ok(Annotation::Literal(values))
    }

    fn parse_literal(&mut self) -> Result<Value> {
        let offset = self.offset();
        match self.next() {
            Some((Token::Str(value), _)) => Ok(Value::Text(value)),
            Some((Token::Num(number), _)) => self.number(&number, offset),
            Some((Token::Ident(ident), _)) => match ident.as_str() {
                "true" | "True" => Ok(Value::Bool(true)),
                "false" | "False" => Ok(Value::Bool(false)),
                "None" => Ok(Value::Null),
                _ => Err(self.error(offset, format!("'{ident}' is not a literal"))),
            },
            _ => Err(self.error(offset, "expected a literal value")),
        }
    }

    fn number(&self, number: &str, offset: usize) -> Result<Value> {
        if let Ok(value) = number.parse::<i64>() {
            return Ok(Value::Int(value));
        }
        number
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| self.error(offset, format!("invalid number '{number}'")))
    }

    fn parse_constraints(&mut self) -> Result<Constraints> {
        self.expect(Token::LParen, "'('")?;
        let mut constraints = Constraints::default();
        loop {
            let offset = self.offset();
            let key = match self.next() {
                Some((Token::Ident(key), _)) => key,
                _ => return Err(self.error(offset, "expected a constraint name")),
            };
            self.expect(Token::Eq, "'='")?;
            let value_offset = self.offset();
            let value = self.parse_literal()?;
            match key.as_str() {
                "minimum" | "maximum" => {
                    let bound = value.as_f64().ok_or_else(|| {
                        self.error(value_offset, format!("{key} must be a number"))
                    })?;
                    if key == "minimum" {
                        constraints.minimum = Some(bound);
                    } else {
                        constraints.maximum = Some(bound);
                    }
                }
                "min_length" | "max_length" => {
                    let length = value
                        .as_i64()
                        .and_then(|raw| usize::try_from(raw).ok())
                        .ok_or_else(|| {
                            self.error(value_offset, format!("{key} must be a non-negative integer"))
                        })?;
                    if key == "min_length" {
                        constraints.min_length = Some(length);
                    } else {
                        constraints.max_length = Some(length);
                    }
                }
                "pattern" => match value {
                    Value::Text(pattern) => constraints.pattern = Some(pattern),
                    _ => return Err(self.error(value_offset, "pattern must be a string")),
                },
                _ => return Err(self.error(offset, format!("unknown constraint '{key}'"))),
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok(constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_generics() {
        let parsed = Annotation::parse("dict[str, list[Node]]").expect("parse");
        assert_eq!(
            parsed,
            Annotation::map(
                Annotation::scalar(ScalarKind::Text),
                Annotation::list(Annotation::model("Node")),
            )
        );
    }

    #[test]
    fn pipe_none_becomes_optional() {
        let parsed = Annotation::parse("Address | None").expect("parse");
        assert_eq!(parsed, Annotation::optional(Annotation::model("Address")));

        let parsed = Annotation::parse("int | str | None").expect("parse");
        assert_eq!(
            parsed,
            Annotation::optional(Annotation::Union(vec![
                Annotation::scalar(ScalarKind::Int),
                Annotation::scalar(ScalarKind::Text),
            ]))
        );
    }

    #[test]
    fn parses_tags_and_constraints() {
        let parsed = Annotation::parse("str@email(max_length=40)").expect("parse");
        assert_eq!(
            parsed,
            Annotation::constrained(
                Annotation::tagged(ScalarKind::Text, "email"),
                Constraints::max_length(40),
            )
        );
    }

    #[test]
    fn display_round_trips() {
        for text in [
            "list[int(minimum=0.0, maximum=10.0)]",
            "optional[union[int, str]]",
            "literal[\"a\", 1, 2.5, true, None]",
            "tuple[uuid, date, datetime]",
            "set[str(max_length=3, pattern=\"^[a-z]+$\")]",
        ] {
            let parsed = Annotation::parse(text).expect("parse");
            assert_eq!(parsed.to_string(), text);
            assert_eq!(Annotation::parse(&parsed.to_string()).expect("reparse"), parsed);
        }
    }

    #[test]
    fn reports_offset_of_bad_input() {
        let err = Annotation::parse("list[int").expect_err("unterminated");
        match err {
            Error::Annotation { offset, .. } => assert_eq!(offset, 8),
            other => panic!("unexpected error: {other}"),
        }
        assert!(Annotation::parse("dict[str]").is_err());
        assert!(Annotation::parse("int(bogus=1)").is_err());
        assert!(Annotation::parse("int $").is_err());
    }

    #[test]
    fn collects_model_references() {
        let parsed = Annotation::parse("dict[str, Order] | list[Item | None]").expect("parse");
        assert_eq!(parsed.model_refs(), vec!["Order", "Item"]);
    }
}
