//! Inclusion predicates for sensors and collections.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | primary
//! primary := "(" expr ")" | "all" | "name" "in" "{" name ("," name)* "}"
//!          | "index" op integer
//! op      := "<" | "<=" | ">" | ">=" | "==" | "!="
//! ```
//!
//! `index` compares the item name read as an integer (collection keys are
//! usually `"0"`, `"1"`, ...); names that are not integers never satisfy it.

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    #[default]
    All,
    NameIn(Vec<String>),
    Index { op: CmpOp, value: i64 },
    Not(Box<Selector>),
    And(Box<Selector>, Box<Selector>),
    Or(Box<Selector>, Box<Selector>),
}

impl Selector {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Selector::All => true,
            Selector::NameIn(names) => names.iter().any(|n| n == name),
            Selector::Index { op, value } => name
                .parse::<i64>()
                .map(|index| op.apply(index, *value))
                .unwrap_or(false),
            Selector::Not(inner) => !inner.matches(name),
            Selector::And(a, b) => a.matches(name) && b.matches(name),
            Selector::Or(a, b) => a.matches(name) || b.matches(name),
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or()?;
        ensure!(
            parser.pos == parser.tokens.len(),
            "unexpected {:?} in selection {input:?}",
            parser.tokens[parser.pos]
        );
        Ok(expr)
    }
}

impl FromStr for Selector {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => f.write_str("all"),
            Selector::NameIn(names) => write!(f, "name in {{{}}}", names.join(", ")),
            Selector::Index { op, value } => write!(f, "index {} {value}", op.symbol()),
            Selector::Not(inner) => write!(f, "!({inner})"),
            Selector::And(a, b) => write!(f, "({a} && {b})"),
            Selector::Or(a, b) => write!(f, "({a} || {b})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Not,
    And,
    Or,
    Op(CmpOp),
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        let token = match (c, next) {
            (c, _) if c.is_whitespace() => continue,
            ('(', _) => Token::LParen,
            (')', _) => Token::RParen,
            ('{', _) => Token::LBrace,
            ('}', _) => Token::RBrace,
            (',', _) => Token::Comma,
            ('&', Some('&')) => {
                chars.next();
                Token::And
            }
            ('|', Some('|')) => {
                chars.next();
                Token::Or
            }
            ('!', Some('=')) | ('=', Some('=')) | ('<', Some('=')) | ('>', Some('=')) => {
                chars.next();
                Token::Op(match c {
                    '!' => CmpOp::Ne,
                    '=' => CmpOp::Eq,
                    '<' => CmpOp::Le,
                    _ => CmpOp::Ge,
                })
            }
            ('!', _) => Token::Not,
            ('<', _) => Token::Op(CmpOp::Lt),
            ('>', _) => Token::Op(CmpOp::Gt),
            (c, _) if is_word_char(c) => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, n)) = chars.peek() {
                    if !is_word_char(n) {
                        break;
                    }
                    end = j + n.len_utf8();
                    chars.next();
                }
                Token::Word(input[i..end].to_string())
            }
            _ => bail!("unexpected character {c:?} at offset {i} in selection {input:?}"),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token.ok_or_else(|| anyhow::anyhow!("selection ends unexpectedly"))
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let token = self.next()?;
        ensure!(token == expected, "expected {expected:?}, found {token:?}");
        Ok(())
    }

    fn or(&mut self) -> Result<Selector> {
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            lhs = Selector::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Selector> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            lhs = Selector::And(Box::new(lhs), Box::new(self.unary()?));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Selector> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Selector::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Selector> {
        match self.next()? {
            Token::LParen => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Word(w) if w == "all" => Ok(Selector::All),
            Token::Word(w) if w == "name" => {
                self.expect(Token::Word("in".into()))?;
                self.expect(Token::LBrace)?;
                let mut names = Vec::new();
                loop {
                    match self.next()? {
                        Token::Word(name) => names.push(name),
                        Token::RBrace if names.is_empty() => break,
                        other => bail!("expected a name, found {other:?}"),
                    }
                    match self.next()? {
                        Token::Comma => continue,
                        Token::RBrace => break,
                        other => bail!("expected ',' or '}}', found {other:?}"),
                    }
                }
                Ok(Selector::NameIn(names))
            }
            Token::Word(w) if w == "index" => {
                let Token::Op(op) = self.next()? else {
                    bail!("expected a comparison after 'index'");
                };
                let Token::Word(value) = self.next()? else {
                    bail!("expected an integer after 'index {}'", op.symbol());
                };
                let value = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("{value:?} is not an integer"))?;
                Ok(Selector::Index { op, value })
            }
            other => bail!("unexpected {other:?} in selection"),
        }
    }
}
