//! Probability formulas
//!
//! Formulas are configuration-driven callables over `(pt, eta, phi, e)`.
//! The table only depends on the [`Formula`] trait; [`ExpressionCompiler`]
//! is the built-in compiler for small arithmetic expressions such as
//! `(abs(eta) <= 2.5) * (pt > 0.1) * 0.95`. Comparisons and logical
//! operators evaluate to 1 or 0.

use std::fmt;
use std::sync::Arc;

use crate::PidError;

pub trait Formula: Send + Sync {
    fn evaluate(&self, pt: f64, eta: f64, phi: f64, e: f64) -> f64;
}

/// Turns expression text into formulas; compile errors are fatal at startup
pub trait FormulaCompiler {
    fn compile(&self, expression: &str) -> Result<Arc<dyn Formula>, PidError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantFormula(pub f64);

impl Formula for ConstantFormula {
    fn evaluate(&self, _pt: f64, _eta: f64, _phi: f64, _e: f64) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        let truth = |v: bool| if v { 1.0 } else { 0.0 };
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
            Self::Lt => truth(a < b),
            Self::Le => truth(a <= b),
            Self::Gt => truth(a > b),
            Self::Ge => truth(a >= b),
            Self::Eq => truth(a == b),
            Self::Ne => truth(a != b),
            Self::And => truth(a != 0.0 && b != 0.0),
            Self::Or => truth(a != 0.0 || b != 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Abs,
    Sqrt,
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tan,
    Tanh,
    Min,
    Max,
    Pow,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        let func = match name {
            "abs" | "fabs" => Self::Abs,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "log" => Self::Log,
            "log10" => Self::Log10,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "tanh" => Self::Tanh,
            "min" => Self::Min,
            "max" => Self::Max,
            "pow" => Self::Pow,
            _ => return None,
        };
        Some(func)
    }

    fn arity(self) -> usize {
        match self {
            Self::Min | Self::Max | Self::Pow => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            Self::Abs => args[0].abs(),
            Self::Sqrt => args[0].sqrt(),
            Self::Exp => args[0].exp(),
            Self::Log => args[0].ln(),
            Self::Log10 => args[0].log10(),
            Self::Sin => args[0].sin(),
            Self::Cos => args[0].cos(),
            Self::Tan => args[0].tan(),
            Self::Tanh => args[0].tanh(),
            Self::Min => args[0].min(args[1]),
            Self::Max => args[0].max(args[1]),
            Self::Pow => args[0].powf(args[1]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Const(f64),
    /// Index into (pt, eta, phi, e)
    Var(usize),
    Neg(Box<Node>),
    Not(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

impl Node {
    fn eval(&self, vars: &[f64; 4]) -> f64 {
        match self {
            Node::Const(v) => *v,
            Node::Var(i) => vars[*i],
            Node::Neg(inner) => -inner.eval(vars),
            Node::Not(inner) => {
                if inner.eval(vars) == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Node::Binary(op, a, b) => op.apply(a.eval(vars), b.eval(vars)),
            Node::Call(func, args) => {
                let values: Vec<f64> = args.iter().map(|arg| arg.eval(vars)).collect();
                func.apply(&values)
            }
        }
    }

    fn is_constant(&self) -> bool {
        match self {
            Node::Const(_) => true,
            Node::Var(_) => false,
            Node::Neg(inner) | Node::Not(inner) => inner.is_constant(),
            Node::Binary(_, a, b) => a.is_constant() && b.is_constant(),
            Node::Call(_, args) => args.iter().all(Node::is_constant),
        }
    }
}

/// Compiled arithmetic expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, PidError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let root = parser.expression()?;
        if let Some(tok) = parser.peek() {
            return Err(parser.error(tok.offset, format!("unexpected {}", tok.kind)));
        }
        Ok(Self { root })
    }

    /// Value of an expression without variables
    pub fn constant_value(&self) -> Option<f64> {
        self.root
            .is_constant()
            .then(|| self.root.eval(&[0.0; 4]))
    }
}

impl Formula for Expression {
    fn evaluate(&self, pt: f64, eta: f64, phi: f64, e: f64) -> f64 {
        self.root.eval(&[pt, eta, phi, e])
    }
}

/// Built-in compiler; constant expressions become [`ConstantFormula`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionCompiler;

impl FormulaCompiler for ExpressionCompiler {
    fn compile(&self, expression: &str) -> Result<Arc<dyn Formula>, PidError> {
        let parsed = Expression::parse(expression)?;
        match parsed.constant_value() {
            Some(value) => Ok(Arc::new(ConstantFormula(value))),
            None => Ok(Arc::new(parsed)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(v) => write!(f, "number {v}"),
            TokenKind::Ident(name) => write!(f, "identifier '{name}'"),
            TokenKind::Op(op) => write!(f, "operator '{op}'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::Comma => f.write_str("','"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

const OPERATORS: [&str; 16] = [
    "<=", ">=", "==", "!=", "&&", "||", "+", "-", "*", "/", "^", "<", ">", "!", "&", "|",
];

fn formula_error(source: &str, offset: usize, message: impl Into<String>) -> PidError {
    PidError::Formula {
        expression: source.to_string(),
        offset,
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, PidError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = if c.is_ascii_digit() || c == b'.' {
            i = scan_number(bytes, i);
            let text = &source[start..i];
            let value = text
                .parse::<f64>()
                .map_err(|_| formula_error(source, start, format!("bad number '{text}'")))?;
            TokenKind::Number(value)
        } else if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            TokenKind::Ident(source[start..i].to_ascii_lowercase())
        } else if c == b'(' {
            i += 1;
            TokenKind::LParen
        } else if c == b')' {
            i += 1;
            TokenKind::RParen
        } else if c == b',' {
            i += 1;
            TokenKind::Comma
        } else {
            let rest = &source[i..];
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| formula_error(source, start, format!("unexpected character '{}'", c as char)))?;
            i += op.len();
            // single & and | read as their logical forms
            TokenKind::Op(match *op {
                "&" => "&&",
                "|" => "||",
                other => other,
            })
        };

        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    Ok(tokens)
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            return j;
        }
    }
    i
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> PidError {
        formula_error(self.source, offset, message)
    }

    fn end_offset(&self) -> usize {
        self.source.len()
    }

    fn eat_op(&mut self, candidates: &[&'static str]) -> Option<&'static str> {
        if let Some(Token {
            kind: TokenKind::Op(op),
            ..
        }) = self.peek()
        {
            let op = *op;
            if candidates.contains(&op) {
                self.pos += 1;
                return Some(op);
            }
        }
        None
    }

    fn expect(&mut self, expected: TokenKind) -> Result<(), PidError> {
        match self.peek() {
            Some(tok) if tok.kind == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(tok) => Err(self.error(tok.offset, format!("expected {expected}, found {}", tok.kind))),
            None => Err(self.error(self.end_offset(), format!("expected {expected}, found end of input"))),
        }
    }

    fn binary_level(
        &mut self,
        ops: &[&'static str],
        next: fn(&mut Self) -> Result<Node, PidError>,
    ) -> Result<Node, PidError> {
        let mut lhs = next(self)?;
        while let Some(op) = self.eat_op(ops) {
            let rhs = next(self)?;
            lhs = Node::Binary(binop(op), Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn expression(&mut self) -> Result<Node, PidError> {
        self.binary_level(&["||"], Self::conjunction)
    }

    fn conjunction(&mut self) -> Result<Node, PidError> {
        self.binary_level(&["&&"], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Node, PidError> {
        self.binary_level(&["<", "<=", ">", ">=", "==", "!="], Self::additive)
    }

    fn additive(&mut self) -> Result<Node, PidError> {
        self.binary_level(&["+", "-"], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Node, PidError> {
        self.binary_level(&["*", "/"], Self::unary)
    }

    fn unary(&mut self) -> Result<Node, PidError> {
        match self.eat_op(&["-", "+", "!"]) {
            Some("-") => Ok(Node::Neg(Box::new(self.unary()?))),
            Some("!") => Ok(Node::Not(Box::new(self.unary()?))),
            Some(_) => self.unary(),
            None => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node, PidError> {
        let base = self.primary()?;
        if self.eat_op(&["^"]).is_some() {
            // right associative, binds tighter than unary minus on the left
            let exponent = self.unary()?;
            return Ok(Node::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node, PidError> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.error(self.end_offset(), "unexpected end of input"));
        };
        self.pos += 1;

        match tok.kind {
            TokenKind::Number(v) => Ok(Node::Const(v)),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                let is_call = matches!(self.peek(), Some(Token { kind: TokenKind::LParen, .. }));
                if is_call {
                    self.call(&name, tok.offset)
                } else {
                    self.variable(&name, tok.offset)
                }
            }
            other => Err(self.error(tok.offset, format!("unexpected {other}"))),
        }
    }

    fn variable(&self, name: &str, offset: usize) -> Result<Node, PidError> {
        let node = match name {
            "pt" | "x" => Node::Var(0),
            "eta" | "y" => Node::Var(1),
            "phi" | "z" => Node::Var(2),
            "e" | "t" => Node::Var(3),
            "pi" => Node::Const(std::f64::consts::PI),
            _ => return Err(self.error(offset, format!("unknown variable '{name}'"))),
        };
        Ok(node)
    }

    fn call(&mut self, name: &str, offset: usize) -> Result<Node, PidError> {
        let func = Func::lookup(name)
            .ok_or_else(|| self.error(offset, format!("unknown function '{name}'")))?;
        self.expect(TokenKind::LParen)?;

        let mut args = vec![self.expression()?];
        while matches!(self.peek(), Some(Token { kind: TokenKind::Comma, .. })) {
            self.pos += 1;
            args.push(self.expression()?);
        }
        self.expect(TokenKind::RParen)?;

        if args.len() != func.arity() {
            return Err(self.error(
                offset,
                format!("{name} takes {} argument(s), got {}", func.arity(), args.len()),
            ));
        }
        Ok(Node::Call(func, args))
    }
}

fn binop(op: &str) -> BinOp {
    match op {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "&&" => BinOp::And,
        _ => BinOp::Or,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(source: &str, pt: f64, eta: f64) -> f64 {
        Expression::parse(source)
            .expect("expression should parse")
            .evaluate(pt, eta, 0.0, 10.0)
    }

    #[test]
    fn test_constants_fold() {
        let formula = Expression::parse("1.0").unwrap();
        assert_eq!(formula.constant_value(), Some(1.0));
        let formula = Expression::parse("0.5 * (1 - 0.2)").unwrap();
        assert_relative_eq!(formula.constant_value().unwrap(), 0.4);
        assert_eq!(Expression::parse("pt").unwrap().constant_value(), None);
    }

    #[test]
    fn test_precedence() {
        assert_relative_eq!(eval("1 + 2 * 3", 0.0, 0.0), 7.0);
        assert_relative_eq!(eval("(1 + 2) * 3", 0.0, 0.0), 9.0);
        assert_relative_eq!(eval("2 ^ 3 ^ 2", 0.0, 0.0), 512.0);
        assert_relative_eq!(eval("-2 ^ 2", 0.0, 0.0), -4.0);
        assert_relative_eq!(eval("8 / 4 / 2", 0.0, 0.0), 1.0);
        assert_relative_eq!(eval("1.5e-1 + 2E1", 0.0, 0.0), 20.15);
    }

    #[test]
    fn test_piecewise_efficiency() {
        let src = "(pt <= 0.1) * (0.00) + (abs(eta) <= 2.5) * (pt > 0.1) * (0.95) + (abs(eta) > 2.5) * (0.00)";
        assert_relative_eq!(eval(src, 0.05, 0.0), 0.0);
        assert_relative_eq!(eval(src, 1.0, -1.2), 0.95);
        assert_relative_eq!(eval(src, 1.0, 3.0), 0.0);
    }

    #[test]
    fn test_logic_and_functions() {
        assert_eq!(eval("pt > 1 && abs(eta) < 1", 2.0, 0.5), 1.0);
        assert_eq!(eval("pt > 1 & abs(eta) < 1", 2.0, 1.5), 0.0);
        assert_eq!(eval("pt > 1 || eta > 1", 0.5, 1.5), 1.0);
        assert_eq!(eval("!(pt > 1)", 0.5, 0.0), 1.0);
        assert_relative_eq!(eval("max(pt, 0.3) + min(eta, 0)", 0.1, 2.0), 0.3);
        assert_relative_eq!(eval("sqrt(pow(pt, 2) + pow(eta, 2))", 3.0, 4.0), 5.0);
        assert_relative_eq!(eval("x * y + t", 2.0, 3.0), 16.0);
        assert_relative_eq!(eval("exp(-pt/e)", 10.0, 0.0), (-1.0f64).exp());
    }

    #[test]
    fn test_compiler_returns_constant_for_literals() {
        let formula = ExpressionCompiler.compile("0.8").unwrap();
        assert_eq!(formula.evaluate(1.0, 2.0, 3.0, 4.0), 0.8);
    }

    #[test]
    fn test_malformed_expressions() {
        for (src, offset) in [
            ("", 0),
            ("1 +", 3),
            ("(pt", 3),
            ("pt $ 2", 3),
            ("foo + 1", 0),
            ("sqrt(1, 2)", 0),
            ("nosuch(1)", 0),
            ("1 2", 2),
        ] {
            match Expression::parse(src) {
                Err(PidError::Formula {
                    expression,
                    offset: got,
                    ..
                }) => {
                    assert_eq!(expression, src);
                    assert_eq!(got, offset, "offset for '{src}'");
                }
                other => panic!("expected formula error for '{src}', got {other:?}"),
            }
        }
    }
}
