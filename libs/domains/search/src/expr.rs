//! Boolean filter expressions over scalar fields.
//!
//! Supported syntax (Milvus-style):
//! - Comparisons: `status == 1`, `score >= 0.5`, `title != "draft"`
//! - Membership: `id in [1, 2, 3]`, `lang not in ["de", "fr"]`
//! - Connectives: `and` / `&&`, `or` / `||`, `not` / `!`, parentheses
//!
//! Expressions are parsed once into an [`Expr`] tree. The tree renders back to
//! canonical backend syntax through `Display` and can be evaluated against a
//! record's scalar values.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::iter::Peekable;
use std::str::{Chars, FromStr};

use thiserror::Error;

use crate::error::VectorError;
use crate::models::FieldValue;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("expected {expected}, found {found}")]
    Unexpected { expected: String, found: String },
}

impl From<ExprError> for VectorError {
    fn from(err: ExprError) -> Self {
        VectorError::Validation(format!("invalid expression: {}", err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// The operator with its operands swapped (`1 < x` is `x > 1`)
    fn flipped(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Parsed filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        field: String,
        op: CompareOp,
        value: FieldValue,
    },
    In {
        field: String,
        values: Vec<FieldValue>,
        negated: bool,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    pub fn parse(input: &str) -> Result<Self, ExprError> {
        let tokens = Lexer::new(input).tokenize()?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }

        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExprError::Unexpected {
                expected: "end of expression".to_string(),
                found: token.to_string(),
            }),
        }
    }

    /// Field names referenced anywhere in the expression
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Compare { field, .. } | Expr::In { field, .. } => {
                out.insert(field.as_str());
            }
            Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
            Expr::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Evaluate against a record. Missing fields and type mismatches never match.
    pub fn matches(&self, record: &HashMap<String, FieldValue>) -> bool {
        match self {
            Expr::Compare { field, op, value } => record
                .get(field)
                .and_then(|actual| compare_values(actual, value))
                .is_some_and(|ordering| op.accepts(ordering)),
            Expr::In {
                field,
                values,
                negated,
            } => match record.get(field) {
                Some(actual) => {
                    let found = values
                        .iter()
                        .any(|v| compare_values(actual, v) == Some(Ordering::Equal));
                    found != *negated
                }
                None => false,
            },
            Expr::And(l, r) => l.matches(record) && r.matches(record),
            Expr::Or(l, r) => l.matches(record) || r.matches(record),
            Expr::Not(inner) => !inner.matches(record),
        }
    }
}

impl FromStr for Expr {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expr::parse(s)
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::Int(x), FieldValue::Int(y)) => Some(x.cmp(y)),
        (FieldValue::Int(x), FieldValue::Float(y)) => (*x as f64).partial_cmp(y),
        (FieldValue::Float(x), FieldValue::Int(y)) => x.partial_cmp(&(*y as f64)),
        (FieldValue::Float(x), FieldValue::Float(y)) => x.partial_cmp(y),
        (FieldValue::String(x), FieldValue::String(y)) => Some(x.cmp(y)),
        (FieldValue::Bool(x), FieldValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &FieldValue) -> fmt::Result {
    match value {
        FieldValue::Bool(b) => write!(f, "{}", b),
        FieldValue::Int(i) => write!(f, "{}", i),
        FieldValue::Float(x) => write!(f, "{:?}", x),
        FieldValue::String(s) => {
            f.write_str("\"")?;
            for ch in s.chars() {
                match ch {
                    '"' => f.write_str("\\\"")?,
                    '\\' => f.write_str("\\\\")?,
                    c => write!(f, "{}", c)?,
                }
            }
            f.write_str("\"")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Compare { field, op, value } => {
                write!(f, "{} {} ", field, op.as_str())?;
                write_literal(f, value)
            }
            Expr::In {
                field,
                values,
                negated,
            } => {
                let keyword = if *negated { "not in" } else { "in" };
                write!(f, "{} {} [", field, keyword)?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_literal(f, value)?;
                }
                f.write_str("]")
            }
            Expr::And(l, r) => write!(f, "({} and {})", l, r),
            Expr::Or(l, r) => write!(f, "({} or {})", l, r),
            Expr::Not(inner) => write!(f, "not ({})", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(FieldValue),
    Op(CompareOp),
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Literal(value) => {
                f.write_str("literal ")?;
                write_literal(f, value)
            }
            Token::Op(op) => write!(f, "'{}'", op.as_str()),
            Token::And => f.write_str("'and'"),
            Token::Or => f.write_str("'or'"),
            Token::Not => f.write_str("'not'"),
            Token::In => f.write_str("'in'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            pos: 0,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        self.pos += 1;
        Some(ch)
    }

    fn bump_if(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();

        while let Some(&ch) = self.chars.peek() {
            let start = self.pos;
            let token = match ch {
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                '[' => self.single(Token::LBracket),
                ']' => self.single(Token::RBracket),
                ',' => self.single(Token::Comma),
                '=' => {
                    self.bump();
                    if !self.bump_if('=') {
                        return Err(ExprError::UnexpectedChar { ch: '=', pos: start });
                    }
                    Token::Op(CompareOp::Eq)
                }
                '!' => {
                    self.bump();
                    if self.bump_if('=') {
                        Token::Op(CompareOp::Ne)
                    } else {
                        Token::Not
                    }
                }
                '<' => {
                    self.bump();
                    if self.bump_if('=') {
                        Token::Op(CompareOp::Le)
                    } else {
                        Token::Op(CompareOp::Lt)
                    }
                }
                '>' => {
                    self.bump();
                    if self.bump_if('=') {
                        Token::Op(CompareOp::Ge)
                    } else {
                        Token::Op(CompareOp::Gt)
                    }
                }
                '&' | '|' => {
                    self.bump();
                    if !self.bump_if(ch) {
                        return Err(ExprError::UnexpectedChar { ch, pos: start });
                    }
                    if ch == '&' { Token::And } else { Token::Or }
                }
                '"' | '\'' => self.string(ch)?,
                c if c.is_ascii_digit() || c == '-' || c == '.' => self.number()?,
                c if c.is_alphabetic() || c == '_' => self.word(),
                c => return Err(ExprError::UnexpectedChar { ch: c, pos: start }),
            };
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn string(&mut self, quote: char) -> Result<Token, ExprError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ExprError::UnterminatedString(start)),
                Some('\\') => match self.bump() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(ExprError::UnterminatedString(start)),
                },
                Some(c) if c == quote => break,
                Some(c) => out.push(c),
            }
        }
        Ok(Token::Literal(FieldValue::String(out)))
    }

    fn number(&mut self) -> Result<Token, ExprError> {
        let mut raw = String::new();
        if self.bump_if('-') {
            raw.push('-');
        }
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E') {
                raw.push(c);
                self.bump();
            } else if matches!(c, '+' | '-') && raw.ends_with(['e', 'E']) {
                raw.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Token::Literal(FieldValue::Int(i)));
        }
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| Token::Literal(FieldValue::Float(f)))
            .ok_or(ExprError::InvalidNumber(raw))
    }

    fn word(&mut self) -> Token {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }

        match word.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "true" => Token::Literal(FieldValue::Bool(true)),
            "false" => Token::Literal(FieldValue::Bool(false)),
            _ => Token::Ident(word),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(expected: &str, found: Option<Token>) -> ExprError {
        ExprError::Unexpected {
            expected: expected.to_string(),
            found: found
                .map(|t| t.to_string())
                .unwrap_or_else(|| "end of expression".to_string()),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(Self::unexpected(&expected.to_string(), other)),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(field)) => self.parse_predicate(field),
            Some(Token::Literal(value)) => {
                // reversed comparison: `10 < count`
                let op = match self.next() {
                    Some(Token::Op(op)) => op,
                    other => return Err(Self::unexpected("comparison operator", other)),
                };
                match self.next() {
                    Some(Token::Ident(field)) => Ok(Expr::Compare {
                        field,
                        op: op.flipped(),
                        value,
                    }),
                    other => Err(Self::unexpected("field name", other)),
                }
            }
            other => Err(Self::unexpected("field name or '('", other)),
        }
    }

    fn parse_predicate(&mut self, field: String) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Op(op)) => {
                let value = self.parse_literal()?;
                Ok(Expr::Compare { field, op, value })
            }
            Some(Token::In) => Ok(Expr::In {
                field,
                values: self.parse_list()?,
                negated: false,
            }),
            Some(Token::Not) => {
                self.expect(Token::In)?;
                Ok(Expr::In {
                    field,
                    values: self.parse_list()?,
                    negated: true,
                })
            }
            other => Err(Self::unexpected("comparison operator or 'in'", other)),
        }
    }

    fn parse_literal(&mut self) -> Result<FieldValue, ExprError> {
        match self.next() {
            Some(Token::Literal(value)) => Ok(value),
            other => Err(Self::unexpected("literal value", other)),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<FieldValue>, ExprError> {
        self.expect(Token::LBracket)?;
        let mut values = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.next();
            return Ok(values);
        }
        loop {
            values.push(self.parse_literal()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                other => return Err(Self::unexpected("',' or ']'", other)),
            }
        }
        Ok(values)
    }
}
