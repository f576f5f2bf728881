//! Condition expressions attached to recipe declarations.
//!
//! Patches, dependencies, toolchain constraints, environment tweaks,
//! configure flags and variants may all carry a `when` condition. Conditions
//! are written as small boolean expressions:
//!
//! ```text
//! with python3 and not head
//! os == macos and os_version < 10.9
//! compiler == clang or stdlib(boost) == libcxx
//! feature(openmp)
//! ```
//!
//! Expressions are parsed once when the recipe is loaded; evaluation is a
//! pure function of the resolved options, the source channel and the host.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::core::host::{CompilerFamily, HostFacts, OsFamily};
use crate::core::version::DottedVersion;

/// Error produced when a condition cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid condition `{input}`: {message}")]
pub struct PredicateError {
    pub input: String,
    pub message: String,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn is_equality(&self) -> bool {
        matches!(self, CmpOp::Eq | CmpOp::Ne)
    }

    fn compare<T: Ord>(&self, lhs: &T, rhs: &T) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }

    /// Compare against a host fact that may be unknown.
    ///
    /// An unknown fact equals nothing: only `!=` holds.
    fn compare_known<T: Ord>(&self, lhs: Option<&T>, rhs: &T) -> bool {
        match lhs {
            Some(lhs) => self.compare(lhs, rhs),
            None => *self == CmpOp::Ne,
        }
    }
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Const(bool),
    /// Option is enabled
    With(String),
    /// Option is disabled
    Without(String),
    /// Building from the head source
    Head,
    /// Building from the stable source
    Stable,
    Os(CmpOp, OsFamily),
    OsVersion(CmpOp, DottedVersion),
    Compiler(CmpOp, CompilerFamily),
    CompilerVersion(CmpOp, DottedVersion),
    /// C++ standard library an installed dependency was built against
    Stdlib {
        dependency: String,
        op: CmpOp,
        value: String,
    },
    /// Compiler capability such as `openmp`
    Feature(String),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

/// Inputs a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub options: &'a BTreeMap<String, bool>,
    pub head: bool,
    pub host: &'a HostFacts,
}

impl Predicate {
    pub fn parse(input: &str) -> Result<Self, PredicateError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(parser.error(format!("unexpected `{}`", tok)));
        }
        Ok(expr)
    }

    pub fn eval(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Predicate::Const(b) => *b,
            Predicate::With(name) => ctx.options.get(name).copied().unwrap_or(false),
            Predicate::Without(name) => !ctx.options.get(name).copied().unwrap_or(false),
            Predicate::Head => ctx.head,
            Predicate::Stable => !ctx.head,
            Predicate::Os(op, os) => op.compare(&ctx.host.os, os),
            Predicate::OsVersion(op, v) => op.compare_known(ctx.host.os_version.as_ref(), v),
            Predicate::Compiler(op, family) => op.compare(&ctx.host.compiler.family, family),
            Predicate::CompilerVersion(op, v) => op.compare(&ctx.host.compiler.version, v),
            Predicate::Stdlib {
                dependency,
                op,
                value,
            } => {
                let actual = ctx
                    .host
                    .installed
                    .get(dependency)
                    .and_then(|i| i.stdlib.as_ref());
                op.compare_known(actual, value)
            }
            Predicate::Feature(name) => ctx.host.compiler.has_feature(name),
            Predicate::Not(inner) => !inner.eval(ctx),
            Predicate::And(a, b) => a.eval(ctx) && b.eval(ctx),
            Predicate::Or(a, b) => a.eval(ctx) || b.eval(ctx),
        }
    }

    /// Option names referenced by `with`/`without` atoms.
    pub fn referenced_options(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_options(&mut out);
        out
    }

    fn collect_options<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::With(name) | Predicate::Without(name) => out.push(name),
            Predicate::Not(inner) => inner.collect_options(out),
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_options(out);
                b.collect_options(out);
            }
            _ => {}
        }
    }
}

impl FromStr for Predicate {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predicate::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Const(b) => write!(f, "{}", b),
            Predicate::With(name) => write!(f, "with {}", name),
            Predicate::Without(name) => write!(f, "without {}", name),
            Predicate::Head => f.write_str("head"),
            Predicate::Stable => f.write_str("stable"),
            Predicate::Os(op, os) => write!(f, "os {} {}", op.as_str(), os),
            Predicate::OsVersion(op, v) => write!(f, "os_version {} {}", op.as_str(), v),
            Predicate::Compiler(op, c) => write!(f, "compiler {} {}", op.as_str(), c),
            Predicate::CompilerVersion(op, v) => {
                write!(f, "compiler_version {} {}", op.as_str(), v)
            }
            Predicate::Stdlib {
                dependency,
                op,
                value,
            } => write!(f, "stdlib({}) {} {}", dependency, op.as_str(), value),
            Predicate::Feature(name) => write!(f, "feature({})", name),
            Predicate::Not(inner) => match **inner {
                Predicate::And(..) | Predicate::Or(..) => write!(f, "not ({})", inner),
                _ => write!(f, "not {}", inner),
            },
            Predicate::And(a, b) => {
                write_operand(f, a, true)?;
                f.write_str(" and ")?;
                write_operand(f, b, true)
            }
            Predicate::Or(a, b) => {
                write_operand(f, a, false)?;
                f.write_str(" or ")?;
                write_operand(f, b, false)
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, p: &Predicate, in_and: bool) -> fmt::Result {
    if in_and && matches!(p, Predicate::Or(..)) {
        write!(f, "({})", p)
    } else {
        write!(f, "{}", p)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Op(CmpOp),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => f.write_str(w),
            Token::Op(op) => f.write_str(op.as_str()),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+')
}

fn tokenize(input: &str) -> Result<Vec<Token>, PredicateError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let eq_follows = matches!(chars.peek(), Some(&(_, '=')));
                if eq_follows {
                    chars.next();
                }
                let op = match (c, eq_follows) {
                    ('=', true) => CmpOp::Eq,
                    ('!', true) => CmpOp::Ne,
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    ('>', false) => CmpOp::Gt,
                    ('>', true) => CmpOp::Ge,
                    _ => {
                        return Err(PredicateError {
                            input: input.to_string(),
                            message: format!("unknown operator at offset {}", start),
                        })
                    }
                };
                tokens.push(Token::Op(op));
            }
            c if is_word_char(c) => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Word(input[start..end].to_string()));
            }
            other => {
                return Err(PredicateError {
                    input: input.to_string(),
                    message: format!("unexpected character `{}`", other),
                })
            }
        }
    }

    if tokens.is_empty() {
        return Err(PredicateError {
            input: input.to_string(),
            message: "empty condition".to_string(),
        });
    }

    Ok(tokens)
}

/// Deepest nesting of `not` and parentheses a condition may use.
const MAX_NESTING: usize = 64;

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> PredicateError {
        PredicateError {
            input: self.input.to_string(),
            message: message.into(),
        }
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, PredicateError>,
    ) -> Result<T, PredicateError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("nested more than {} levels deep", MAX_NESTING)));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w == keyword)
    }

    fn expect(&mut self, expected: Token) -> Result<(), PredicateError> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(self.error(format!("expected `{}`, found `{}`", expected, tok))),
            None => Err(self.error(format!("expected `{}`, found end of input", expected))),
        }
    }

    fn word(&mut self, what: &str) -> Result<String, PredicateError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            Some(tok) => Err(self.error(format!("expected {}, found `{}`", what, tok))),
            None => Err(self.error(format!("expected {}, found end of input", what))),
        }
    }

    fn op(&mut self) -> Result<CmpOp, PredicateError> {
        match self.next() {
            Some(Token::Op(op)) => Ok(op),
            Some(tok) => Err(self.error(format!("expected a comparison, found `{}`", tok))),
            None => Err(self.error("expected a comparison, found end of input")),
        }
    }

    fn equality_op(&mut self, subject: &str) -> Result<CmpOp, PredicateError> {
        let op = self.op()?;
        if !op.is_equality() {
            return Err(self.error(format!(
                "`{}` only supports `==` and `!=`",
                subject
            )));
        }
        Ok(op)
    }

    fn version(&mut self) -> Result<DottedVersion, PredicateError> {
        let word = self.word("a version")?;
        word.parse().map_err(|e: crate::core::version::VersionParseError| self.error(e.to_string()))
    }

    fn parse_or(&mut self) -> Result<Predicate, PredicateError> {
        let mut lhs = self.parse_and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Predicate::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Predicate, PredicateError> {
        let mut lhs = self.parse_unary()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Predicate::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Predicate, PredicateError> {
        if self.peek_keyword("not") {
            self.pos += 1;
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Predicate, PredicateError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.nested(Self::parse_or)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Word(w)) => self.parse_atom(&w),
            Some(tok) => Err(self.error(format!("unexpected `{}`", tok))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_atom(&mut self, keyword: &str) -> Result<Predicate, PredicateError> {
        match keyword {
            "true" => Ok(Predicate::Const(true)),
            "false" => Ok(Predicate::Const(false)),
            "head" => Ok(Predicate::Head),
            "stable" => Ok(Predicate::Stable),
            "with" => Ok(Predicate::With(self.word("an option name")?)),
            "without" => Ok(Predicate::Without(self.word("an option name")?)),
            "feature" => {
                self.expect(Token::LParen)?;
                let name = self.word("a feature name")?;
                self.expect(Token::RParen)?;
                Ok(Predicate::Feature(name))
            }
            "stdlib" => {
                self.expect(Token::LParen)?;
                let dependency = self.word("a dependency name")?;
                self.expect(Token::RParen)?;
                let op = self.equality_op("stdlib")?;
                let value = self.word("a standard library name")?;
                Ok(Predicate::Stdlib {
                    dependency,
                    op,
                    value,
                })
            }
            "os" => {
                let op = self.equality_op("os")?;
                let os = self.word("an os name")?;
                let os = os.parse().map_err(|e: String| self.error(e))?;
                Ok(Predicate::Os(op, os))
            }
            "os_version" => {
                let op = self.op()?;
                Ok(Predicate::OsVersion(op, self.version()?))
            }
            "compiler" => {
                let op = self.equality_op("compiler")?;
                let family = self.word("a compiler name")?;
                let family = family.parse().map_err(|e: String| self.error(e))?;
                Ok(Predicate::Compiler(op, family))
            }
            "compiler_version" => {
                let op = self.op()?;
                Ok(Predicate::CompilerVersion(op, self.version()?))
            }
            other => Err(self.error(format!("unknown condition `{}`", other))),
        }
    }
}
